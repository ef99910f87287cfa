//! In-memory capture of the gateway's JSON log output.
//!
//! Installs a `tracing_subscriber` JSON formatter writing to a shared buffer so
//! tests can assert on the structured records the gateway emits.

use std::io;
use std::sync::{Arc, Mutex};

/// Shared buffer of JSON log lines.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .expect("log capture buffer poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A JSON subscriber writing into this capture.
    ///
    /// Install it with `tracing::subscriber::set_default` on a current-thread
    /// runtime so every task of the test logs through it.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        let buffer = Arc::clone(&self.buffer);
        tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || CaptureWriter(Arc::clone(&buffer)))
            .finish()
    }

    /// Every captured line, in emission order.
    pub fn lines(&self) -> Vec<serde_json::Value> {
        let buffer = self.buffer.lock().expect("log capture buffer poisoned");
        String::from_utf8_lossy(&buffer)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// The parsed `record` field of every line logged under `target`.
    pub fn records(&self, target: &str) -> Vec<serde_json::Value> {
        self.lines()
            .into_iter()
            .filter(|line| line["target"] == target)
            .filter_map(|line| {
                line["fields"]["record"]
                    .as_str()
                    .and_then(|record| serde_json::from_str(record).ok())
            })
            .collect()
    }

    /// Raw captured output, for substring checks.
    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().expect("log capture buffer poisoned");
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_records_by_target() {
        let capture = LogCapture::new();
        tracing::subscriber::with_default(capture.subscriber(), || {
            tracing::info!(target: "gateway.access", record = %r#"{"requestId":"a"}"#, "request");
            tracing::info!(target: "gateway.pipeline", "Finished with request");
        });

        let records = capture.records("gateway.access");
        assert_eq!(records, vec![serde_json::json!({"requestId": "a"})]);
        assert_eq!(capture.lines().len(), 2);
    }
}
