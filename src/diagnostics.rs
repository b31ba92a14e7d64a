//! Rotating JSON-lines operational log.
//!
//! One always-on operational stream shared by the runner, probes and
//! notifiers. Rotation is size-triggered with a gzip archive via `flate2`
//! and a cross-process exclusive lock via `fs2` during rotation; messages
//! pass through a secret-redaction guardrail before they ever reach disk,
//! covering notifier tokens as well as debug output.

use chrono::Local;
use flate2::write::GzEncoder;
use flate2::Compression;
use fs2::FileExt;
use regex::Regex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

const ROTATION_SIZE_BYTES: u64 = 8 * 1024 * 1024;
const MAX_ARCHIVES: u32 = 5;
const ROTATION_CHECK_INTERVAL: u32 = 200;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

#[derive(Serialize, Debug, Clone)]
struct LogEntry {
    timestamp: String,
    level: &'static str,
    component: String,
    message: String,
}

struct RotatingLogger {
    log_path: PathBuf,
    write_count: AtomicU32,
}

impl RotatingLogger {
    fn new(log_path: PathBuf) -> Self {
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Self {
            log_path,
            write_count: AtomicU32::new(0),
        }
    }

    fn write_with_rotation(&self, json_line: &str) -> std::io::Result<()> {
        if self.write_count.fetch_add(1, Ordering::Relaxed) % ROTATION_CHECK_INTERVAL == 0 {
            let _ = self.rotate_if_needed();
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.log_path)?;
        writeln!(file, "{}", json_line)
    }

    fn needs_rotation(&self) -> std::io::Result<bool> {
        match std::fs::metadata(&self.log_path) {
            Ok(meta) => Ok(meta.len() >= ROTATION_SIZE_BYTES),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn rotate_if_needed(&self) -> std::io::Result<()> {
        if !self.needs_rotation()? {
            return Ok(());
        }
        let lock_path = self.log_path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&lock_path)?;
        if lock_file.try_lock_exclusive().is_err() {
            // Another process is already rotating; skip this round.
            return Ok(());
        }
        if !self.needs_rotation()? {
            FileExt::unlock(&lock_file)?;
            return Ok(());
        }

        self.shift_archives()?;
        let archive_path = self.log_path.with_extension("log.1.gz");
        let source = File::open(&self.log_path)?;
        let mut reader = BufReader::new(source);
        let archive = File::create(&archive_path)?;
        let mut encoder = GzEncoder::new(archive, Compression::default());
        std::io::copy(&mut reader, &mut encoder)?;
        encoder.finish()?;
        std::fs::remove_file(&self.log_path)?;

        FileExt::unlock(&lock_file)?;
        let _ = std::fs::remove_file(&lock_path);
        Ok(())
    }

    fn shift_archives(&self) -> std::io::Result<()> {
        for n in (1..MAX_ARCHIVES).rev() {
            let from = self.log_path.with_extension(format!("log.{n}.gz"));
            let to = self.log_path.with_extension(format!("log.{}.gz", n + 1));
            if from.exists() {
                let _ = std::fs::rename(&from, &to);
            }
        }
        let oldest = self.log_path.with_extension(format!("log.{MAX_ARCHIVES}.gz"));
        let _ = std::fs::remove_file(oldest);
        Ok(())
    }
}

/// Shared operational logger. One instance is built at startup and threaded
/// through `World` behind an `Arc`.
pub struct Diagnostics {
    logger: Mutex<RotatingLogger>,
    redaction_patterns: Vec<Regex>,
}

impl Diagnostics {
    pub fn new(log_path: PathBuf) -> Self {
        Self {
            logger: Mutex::new(RotatingLogger::new(log_path)),
            redaction_patterns: compile_redaction_patterns(),
        }
    }

    pub fn log(&self, level: Level, component: &str, message: &str) {
        let redacted = self.redact(message);
        let entry = LogEntry {
            timestamp: Local::now().to_rfc3339(),
            level: level.as_str(),
            component: component.to_string(),
            message: redacted,
        };
        if let Ok(json) = serde_json::to_string(&entry) {
            let logger = self.logger.lock().unwrap_or_else(|e| e.into_inner());
            let _ = logger.write_with_rotation(&json);
        }
    }

    pub fn warn(&self, component: &str, message: &str) {
        self.log(Level::Warn, component, message);
    }

    pub fn error(&self, component: &str, message: &str) {
        self.log(Level::Error, component, message);
    }

    pub fn info(&self, component: &str, message: &str) {
        self.log(Level::Info, component, message);
    }

    fn redact(&self, text: &str) -> String {
        let mut redacted = text.to_string();
        for pattern in &self.redaction_patterns {
            redacted = pattern.replace_all(&redacted, "[REDACTED]").to_string();
        }
        redacted
    }
}

fn compile_redaction_patterns() -> Vec<Regex> {
    [
        r"(?i)authorization[:\s]+[^\s\n]+",
        r"(?i)bearer[:\s]+[^\s\n]+",
        r"(?i)token[:\s=]+[^\s\n&]+",
        r"(?i)password[:\s]+[^\s\n]+",
        r"(?i)api[_-]?key[:\s]+[^\s\n]+",
        r"(?i)secret[:\s]+[^\s\n]+",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_bearer_tokens() {
        let diag = Diagnostics::new(PathBuf::from("/tmp/simplomon-test-does-not-exist.jsonl"));
        let redacted = diag.redact("Authorization: Bearer abc123xyz");
        assert!(!redacted.contains("abc123xyz"));
    }

    #[test]
    fn writes_and_rotates() {
        let dir = std::env::temp_dir().join(format!("simplomon-diag-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("ops.jsonl");
        let logger = RotatingLogger::new(path.clone());
        for _ in 0..10 {
            logger.write_with_rotation("{\"x\":1}").unwrap();
        }
        assert!(path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
