use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;

/// Transfer event sink. Every hook defaults to a no-op.
pub trait Logger: Send + Sync {
    fn connected(&self, _role: &str, _peer: &SocketAddr) {}
    fn file_done(&self, _name: &str, _bytes: u64, _seconds: f64) {}
    fn file_failed(&self, _name: &str, _msg: &str) {}
    fn reconnect(&self, _reason: &str) {}
    fn done(&self, _files: u64, _bytes: u64, _seconds: f64, _stop: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

#[derive(Serialize, Debug)]
#[serde(tag = "event", rename_all = "snake_case")]
enum LogEvent<'a> {
    Connected { role: &'a str, peer: String },
    FileDone { name: &'a str, bytes: u64, seconds: f64 },
    FileFailed { name: &'a str, error: &'a str },
    Reconnect { reason: &'a str },
    Done { files: u64, bytes: u64, seconds: f64, stop: &'a str },
}

#[derive(Serialize, Debug)]
struct LogRecord<'a> {
    timestamp: String,
    run_id: &'a str,
    #[serde(flatten)]
    event: LogEvent<'a>,
}

/// Appends one JSON object per line
pub struct JsonLogger {
    file: Mutex<File>,
    run_id: String,
}

impl JsonLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
            run_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    fn record(&self, event: LogEvent<'_>) {
        let rec = LogRecord {
            timestamp: Utc::now().to_rfc3339(),
            run_id: &self.run_id,
            event,
        };
        if let Ok(line) = serde_json::to_string(&rec) {
            let mut f = self.file.lock();
            let _ = writeln!(f, "{}", line);
        }
    }
}

impl Logger for JsonLogger {
    fn connected(&self, role: &str, peer: &SocketAddr) {
        self.record(LogEvent::Connected {
            role,
            peer: peer.to_string(),
        });
    }
    fn file_done(&self, name: &str, bytes: u64, seconds: f64) {
        self.record(LogEvent::FileDone {
            name,
            bytes,
            seconds,
        });
    }
    fn file_failed(&self, name: &str, msg: &str) {
        self.record(LogEvent::FileFailed { name, error: msg });
    }
    fn reconnect(&self, reason: &str) {
        self.record(LogEvent::Reconnect { reason });
    }
    fn done(&self, files: u64, bytes: u64, seconds: f64, stop: &str) {
        self.record(LogEvent::Done {
            files,
            bytes,
            seconds,
            stop,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn json_logger_writes_one_record_per_line() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logs/folan.jsonl");
        let logger = JsonLogger::new(&path).unwrap();
        logger.file_done("a.txt", 1024, 0.5);
        logger.reconnect("connection closed by peer");
        logger.done(1, 1024, 0.7, "limit reached");

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["event"], "file_done");
        assert_eq!(lines[0]["name"], "a.txt");
        assert_eq!(lines[0]["bytes"], 1024);
        assert_eq!(lines[1]["event"], "reconnect");
        assert_eq!(lines[2]["stop"], "limit reached");
        assert_eq!(lines[0]["run_id"], lines[2]["run_id"]);
    }
}
