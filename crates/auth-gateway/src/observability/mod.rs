//! Observability for the gateway.
//!
//! Provides metrics definitions and the structured request/response log records.

pub mod log_records;
pub mod metrics;
