//! Request audit log: the last [`RETAINED_ENTRIES`] records kept in memory, optionally
//! appended to a JSONL file. Messages and context strings are redacted on construction.
//!
//! Diagnostics go through `tracing`; this log records what the gateway did per request.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sanitize::sanitize_message;

pub const RETAINED_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl AuditEntry {
    pub fn new(level: LogLevel, component: &str, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            component: component.to_string(),
            message: sanitize_message(message),
            context: None,
        }
    }

    pub fn with_context(self, context: Value) -> Self {
        Self {
            context: Some(redact(context)),
            ..self
        }
    }
}

fn redact(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_message(&s)),
        Value::Array(items) => items.into_iter().map(redact).collect(),
        Value::Object(fields) => Value::Object(fields.into_iter().map(|(k, v)| (k, redact(v))).collect()),
        scalar => scalar,
    }
}

enum Sink {
    Memory,
    File { path: PathBuf, writer: BufWriter<File> },
}

struct AuditLog {
    entries: VecDeque<AuditEntry>,
    sink: Sink,
}

impl AuditLog {
    fn open(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let entries = if path.exists() { read_tail(path)? } else { VecDeque::new() };
        Ok(Self {
            entries,
            sink: Sink::File {
                path: path.to_path_buf(),
                writer: BufWriter::new(open_append(path)?),
            },
        })
    }

    fn retain(&mut self, entry: AuditEntry) {
        if self.entries.len() == RETAINED_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    fn append(&mut self, entry: AuditEntry) {
        if let Sink::File { writer, .. } = &mut self.sink {
            // A full disk must not fail the request being audited
            if let Ok(line) = serde_json::to_string(&entry) {
                let _ = writeln!(writer, "{line}").and_then(|()| writer.flush());
            }
        }
        self.retain(entry);
    }

    fn compact(&mut self) -> io::Result<()> {
        let Sink::File { path, writer } = &mut self.sink else {
            return Ok(());
        };
        let mut rewritten = BufWriter::new(File::create(&*path)?);
        for entry in &self.entries {
            serde_json::to_writer(&mut rewritten, entry)?;
            rewritten.write_all(b"\n")?;
        }
        rewritten.flush()?;
        *writer = BufWriter::new(open_append(path)?);
        Ok(())
    }
}

/// Last [`RETAINED_ENTRIES`] parseable lines of an existing log. Corrupt lines are skipped.
fn read_tail(path: &Path) -> io::Result<VecDeque<AuditEntry>> {
    let mut tail = VecDeque::new();
    for line in BufReader::new(File::open(path)?).lines() {
        let Ok(entry) = serde_json::from_str::<AuditEntry>(&line?) else {
            continue;
        };
        if tail.len() == RETAINED_ENTRIES {
            tail.pop_front();
        }
        tail.push_back(entry);
    }
    Ok(tail)
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Cloneable handle to the audit log, shared by the gateway and the HTTP layer.
#[derive(Clone)]
pub struct SharedLogger(Arc<Mutex<AuditLog>>);

impl SharedLogger {
    /// Open or create a JSONL log file, reloading its most recent entries.
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::wrap(AuditLog::open(path.as_ref())?))
    }

    pub fn in_memory() -> Self {
        Self::wrap(AuditLog {
            entries: VecDeque::new(),
            sink: Sink::Memory,
        })
    }

    fn wrap(log: AuditLog) -> Self {
        Self(Arc::new(Mutex::new(log)))
    }

    fn with_log<T>(&self, f: impl FnOnce(&mut AuditLog) -> T) -> T {
        let mut log = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut log)
    }

    pub fn log(&self, entry: AuditEntry) {
        self.with_log(|log| log.append(entry));
    }

    pub fn info(&self, component: &str, message: impl AsRef<str>) {
        self.log(AuditEntry::new(LogLevel::Info, component, message.as_ref()));
    }

    pub fn warn(&self, component: &str, message: impl AsRef<str>) {
        self.log(AuditEntry::new(LogLevel::Warn, component, message.as_ref()));
    }

    pub fn error(&self, component: &str, message: impl AsRef<str>) {
        self.log(AuditEntry::new(LogLevel::Error, component, message.as_ref()));
    }

    pub fn log_with_context(&self, level: LogLevel, component: &str, message: impl AsRef<str>, context: Value) {
        self.log(AuditEntry::new(level, component, message.as_ref()).with_context(context));
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.with_log(|log| log.entries.iter().rev().take(limit).cloned().collect())
    }

    /// Rewrite the backing file so it holds only the retained entries.
    pub fn compact(&self) -> io::Result<()> {
        self.with_log(AuditLog::compact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_messages_and_context_are_redacted() {
        let logger = SharedLogger::in_memory();
        logger.log_with_context(
            LogLevel::Warn,
            "gateway",
            "auth failed for sk-abcdefghijklmnopqrstuvwx",
            json!({"headers": {"authorization": "Bearer abc.def.ghi"}, "attempts": [1, "sk-0123456789abcdefghij"]}),
        );

        let entry = &logger.recent(1)[0];
        assert_eq!(entry.message, "auth failed for [REDACTED]");
        let ctx = entry.context.as_ref().unwrap();
        assert_eq!(ctx["headers"]["authorization"], "Bearer [REDACTED]");
        assert_eq!(ctx["attempts"][0], 1);
        assert_eq!(ctx["attempts"][1], "[REDACTED]");
    }

    #[test]
    fn test_recent_is_newest_first() {
        let logger = SharedLogger::in_memory();
        logger.info("a", "first");
        logger.error("a", "second");
        let recent = logger.recent(5);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "second");
        assert_eq!(recent[0].level, LogLevel::Error);
        assert_eq!(logger.recent(1).len(), 1);
    }

    #[test]
    fn test_file_reload_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.jsonl");

        let logger = SharedLogger::new(&path).unwrap();
        logger.info("server", "started");
        logger.warn("gateway", "slow backend");
        drop(logger);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();
        drop(file);

        let reloaded = SharedLogger::new(&path).unwrap();
        let recent = reloaded.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "slow backend");

        reloaded.compact().unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);

        reloaded.info("server", "after compact");
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_compact_in_memory_is_noop() {
        let logger = SharedLogger::in_memory();
        logger.info("a", "x");
        logger.compact().unwrap();
        assert_eq!(logger.recent(10).len(), 1);
    }
}
