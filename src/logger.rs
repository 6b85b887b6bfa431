use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

/// Append-only JSON-lines log of every hub exchange, for protocol debugging
/// against unfamiliar firmware.
pub(crate) struct MessageLogger {
    file: File,
}

impl MessageLogger {
    pub fn new(path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }

    pub fn log_exchange(&mut self, command: &Value, outcome: &str, reply: Option<&Value>) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "command": command,
            "outcome": outcome,
            "reply": reply,
        });
        self.write_line(&entry);
    }

    fn write_line(&mut self, entry: &Value) {
        if let Err(e) = writeln!(self.file, "{entry}") {
            warn!(error = %e, "failed to write message log entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exchanges.log");
        let path_str = path.to_str().unwrap();

        let mut logger = MessageLogger::new(path_str).unwrap();
        logger.log_exchange(
            &json!({"INFO": 0}),
            "ok",
            Some(&json!({"devices": []})),
        );
        logger.log_exchange(&json!({"SET_TEMP": [20.0, "Lounge"]}), "hub error: nope", None);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["command"]["INFO"], 0);
        assert_eq!(first["outcome"], "ok");
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert!(second["reply"].is_null());
    }
}
