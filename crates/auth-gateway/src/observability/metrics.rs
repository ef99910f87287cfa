//! Metrics definitions for the gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gateway_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! The gateway proxies arbitrary paths, so paths are never used as labels.
//! - `method`: 9 values max (unknown methods become `OTHER`)
//! - `status`: 3 values (success, error, timeout)
//! - `reason`: bounded by the auth failure variants
//! - `outcome`: bounded by code (success, connect_error, read_error)

use metrics::{counter, histogram};
use std::time::Duration;

// ============================================================================
// Request Metrics
// ============================================================================

/// Record completion of a request through the pipeline, short-circuits included.
///
/// Metric: `gateway_requests_total`, `gateway_request_duration_seconds`
/// Labels: `method`, `status_code` / `status`
pub fn record_request(method: &str, status_code: u16, duration: Duration) {
    let method = normalize_method(method);
    let status = categorize_status_code(status_code);

    histogram!("gateway_request_duration_seconds",
        "method" => method,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("gateway_requests_total",
        "method" => method,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=399 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

fn normalize_method(method: &str) -> &'static str {
    match method {
        "GET" => "GET",
        "POST" => "POST",
        "PUT" => "PUT",
        "PATCH" => "PATCH",
        "DELETE" => "DELETE",
        "HEAD" => "HEAD",
        "OPTIONS" => "OPTIONS",
        "CONNECT" => "CONNECT",
        "TRACE" => "TRACE",
        _ => "OTHER",
    }
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record a rejected credential.
///
/// Metric: `gateway_auth_failures_total`
/// Labels: `reason` (`missing_header`, `malformed_header`, a verify error
/// label, or an identity error label)
pub fn record_auth_failure(reason: &'static str) {
    counter!("gateway_auth_failures_total", "reason" => reason).increment(1);
}

// ============================================================================
// Upstream Metrics
// ============================================================================

/// Record one upstream round trip.
///
/// Metric: `gateway_upstream_requests_total`
/// Labels: `outcome`
pub fn record_upstream(outcome: &'static str) {
    counter!("gateway_upstream_requests_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // These run against the global no-op recorder; they only check the calls
    // don't panic and that label normalization is bounded.

    #[test]
    fn test_record_request() {
        record_request("GET", 200, Duration::from_millis(5));
        record_request("POST", 400, Duration::from_millis(1));
        record_request("PUT", 401, Duration::from_millis(2));
        record_request("PROPFIND", 502, Duration::from_millis(30));
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(304), "success");
        assert_eq!(categorize_status_code(401), "error");
        assert_eq!(categorize_status_code(502), "error");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
    }

    #[test]
    fn test_normalize_method() {
        assert_eq!(normalize_method("PATCH"), "PATCH");
        assert_eq!(normalize_method("PROPFIND"), "OTHER");
        assert_eq!(normalize_method("get"), "OTHER");
    }

    #[test]
    fn test_record_auth_and_upstream() {
        record_auth_failure("missing_header");
        record_auth_failure("expired");
        record_upstream("success");
        record_upstream("connect_error");
    }
}
