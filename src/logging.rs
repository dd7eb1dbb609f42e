//! Structured logging module for Solace
//!
//! Writes logs to ~/.solace/logs/ with categories:
//! - GATEWAY: Completion API calls and failures
//! - REFLECTION: Guided session lifecycle (start, answer, complete)
//! - CONVERSATION: Chat lifecycle (select, send, migrate, bookmark)
//! - INSIGHT: Saved-insight ledger changes
//! - ERROR: Errors and fallbacks

use chrono::{Local, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Log categories for structured logging
#[derive(Debug, Clone, Copy)]
pub enum LogCategory {
    Gateway,      // Completion API calls and failures
    Reflection,   // Guided session lifecycle
    Conversation, // Chat lifecycle
    Insight,      // Saved-insight ledger changes
    Error,        // Errors and fallbacks
}

impl LogCategory {
    fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Gateway => "GATEWAY",
            LogCategory::Reflection => "REFLECTION",
            LogCategory::Conversation => "CONVERSATION",
            LogCategory::Insight => "INSIGHT",
            LogCategory::Error => "ERROR",
        }
    }
}

/// Get the log directory path
fn get_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".solace/logs")
}

/// Get today's log file path
fn get_log_file_path() -> PathBuf {
    let today = Local::now().format("%Y-%m-%d").to_string();
    get_log_dir().join(format!("solace-{}.log", today))
}

/// Initialize the logging system - creates log directory if needed
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = get_log_dir();

    if !log_dir.exists() {
        fs::create_dir_all(&log_dir)?;
    }

    log(LogCategory::Conversation, None, "Solace logging initialized");

    Ok(())
}

/// First characters of a context id, enough to correlate log lines.
/// Ids are not guaranteed ASCII, so truncation counts characters, not bytes.
fn short_context(id: &str) -> String {
    id.chars().take(8).collect()
}

/// Log a message with category and optional conversation/session context
pub fn log(category: LogCategory, context_id: Option<&str>, message: &str) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let context = context_id
        .map(|id| format!("context={} | ", short_context(id)))
        .unwrap_or_default();

    let log_line = format!(
        "[{}] [{}] {}{}\n",
        timestamp,
        category.as_str(),
        context,
        message
    );

    // Always print to console (for dev)
    print!("{}", log_line);

    // Write to file
    let log_path = get_log_file_path();
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        let _ = file.write_all(log_line.as_bytes());
    }
}

/// Log a completion gateway event (request issued, failure, empty reply)
pub fn log_gateway(context_id: Option<&str>, message: &str) {
    log(LogCategory::Gateway, context_id, message);
}

/// Log a reflection session lifecycle event
pub fn log_reflection(session_id: Option<&str>, message: &str) {
    log(LogCategory::Reflection, session_id, message);
}

/// Log a conversation lifecycle event
pub fn log_conversation(conversation_id: Option<&str>, message: &str) {
    log(LogCategory::Conversation, conversation_id, message);
}

/// Log a saved-insight ledger change
pub fn log_insight(user_id: Option<&str>, message: &str) {
    log(LogCategory::Insight, user_id, message);
}

/// Log an error
pub fn log_error(context_id: Option<&str>, message: &str) {
    log(LogCategory::Error, context_id, message);
}

/// Clean up old log files (keep last 7 days)
pub fn cleanup_old_logs() -> Result<usize, Box<dyn std::error::Error>> {
    let log_dir = get_log_dir();
    let mut deleted = 0;

    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(7);

    for entry in fs::read_dir(&log_dir)? {
        let entry = entry?;
        let path = entry.path();

        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                let modified_time: chrono::DateTime<Utc> = modified.into();
                if modified_time < cutoff {
                    if fs::remove_file(&path).is_ok() {
                        deleted += 1;
                    }
                }
            }
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_context_truncates_on_char_boundaries() {
        assert_eq!(short_context("0a1b2c3d-4e5f"), "0a1b2c3d");
        assert_eq!(short_context("abc"), "abc");
        // Byte 8 of this id falls inside the two-byte 'ü'.
        assert_eq!(short_context("journalüser"), "journalü");
    }

    #[test]
    fn test_log_accepts_multibyte_context_ids() {
        log(LogCategory::Insight, Some("journalüser"), "saved");
        log(LogCategory::Conversation, Some("日記アプリのユーザー"), "selected");
    }
}
