//! Size-bounded JSON-lines event sink.
//!
//! # Responsibilities
//! - Append one JSON object per line to the event log
//! - Rotate the file (rename with a timestamp suffix, reopen) once it
//!   exceeds the configured size
//!
//! # Design Decisions
//! - A sink failure degrades to stderr and never reaches the request path

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

struct SinkInner {
    file: File,
    written: u64,
}

/// File-backed telemetry sink with size-based rotation.
pub struct RotatingLogSink {
    path: PathBuf,
    max_bytes: u64,
    inner: Mutex<SinkInner>,
}

impl RotatingLogSink {
    /// Open (or create) the log file in append mode.
    pub fn open(path: &Path, max_bytes: u64) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            path: path.to_path_buf(),
            max_bytes,
            inner: Mutex::new(SinkInner { file, written }),
        })
    }

    /// Write one event line. Failures are reported to stderr and swallowed.
    pub fn write_event(&self, event: &serde_json::Value) {
        let mut line = event.to_string();
        line.push('\n');

        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if inner.written + line.len() as u64 > self.max_bytes {
            if let Err(e) = self.rotate(&mut inner) {
                eprintln!(
                    "api-gateway: telemetry log rotation failed for {}: {e}",
                    self.path.display()
                );
            }
        }

        match inner.file.write_all(line.as_bytes()) {
            Ok(()) => inner.written += line.len() as u64,
            Err(e) => eprintln!(
                "api-gateway: telemetry log write failed for {}: {e}",
                self.path.display()
            ),
        }
    }

    fn rotate(&self, inner: &mut SinkInner) -> std::io::Result<()> {
        let suffix = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
        let rotated = PathBuf::from(format!("{}.{suffix}", self.path.display()));
        std::fs::rename(&self.path, &rotated)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        tracing::info!(rotated = %rotated.display(), "Telemetry log rotated");
        inner.file = file;
        inner.written = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let sink = RotatingLogSink::open(&path, 1024 * 1024).unwrap();

        sink.write_event(&serde_json::json!({"event": "received", "request_id": 1}));
        sink.write_event(&serde_json::json!({"event": "responded", "request_id": 1}));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "received");
    }

    #[test]
    fn rotates_past_size_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let sink = RotatingLogSink::open(&path, 64).unwrap();

        for i in 0..20 {
            sink.write_event(&serde_json::json!({"event": "received", "request_id": i}));
        }

        let rotated: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("events.log."))
            .collect();
        assert!(!rotated.is_empty(), "expected at least one rotated file");
        // The active file stays under the threshold after rotation.
        assert!(std::fs::metadata(&path).unwrap().len() <= 128);
    }
}
