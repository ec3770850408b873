//! Append-only conversation log.
//!
//! Every answered question becomes one CSV row `user,assistant,topic,timestamp`.
//! The header row is written when the file is created; rows are quoted per
//! RFC 4180 so answers may contain commas, quotes and newlines.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use utoipa::ToSchema;

use crate::provider::classifier::Topic;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Log task failed: {0}")]
    Task(String),
}

pub type LogResult<T> = Result<T, LogError>;

/// One logged exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LogEntry {
    /// The question as asked
    pub user: String,
    /// The full generated answer
    pub assistant: String,
    pub topic: Topic,
    /// ISO-8601 local time without offset
    pub timestamp: String,
}

impl LogEntry {
    /// Builds an entry stamped with the current local time.
    pub fn now(user: impl Into<String>, assistant: impl Into<String>, topic: Topic) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
            topic,
            timestamp: local_timestamp(),
        }
    }
}

/// Current local time as `YYYY-MM-DDTHH:MM:SS.ffffff`.
pub fn local_timestamp() -> String {
    Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

pub struct ConversationLogger {
    path: PathBuf,
    // appends from concurrent invocations go through one at a time
    lock: Mutex<()>,
}

impl ConversationLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[tracing::instrument(skip(self, entry), fields(topic = %entry.topic))]
    pub async fn append(&self, entry: &LogEntry) -> LogResult<()> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let entry = entry.clone();
        tokio::task::spawn_blocking(move || append_row(&path, &entry))
            .await
            .map_err(|e| LogError::Task(e.to_string()))??;
        debug!("conversation logged");
        Ok(())
    }

    /// The last `limit` entries, oldest first.
    pub async fn recent(&self, limit: usize) -> LogResult<Vec<LogEntry>> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let mut entries = tokio::task::spawn_blocking(move || read_rows(&path))
            .await
            .map_err(|e| LogError::Task(e.to_string()))??;
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
        Ok(entries)
    }
}

fn append_row(path: &Path, entry: &LogEntry) -> LogResult<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let needs_header = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    writer.serialize(entry)?;
    writer.flush()?;
    Ok(())
}

fn read_rows(path: &Path) -> LogResult<Vec<LogEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path)?;
    let entries = reader
        .deserialize::<LogEntry>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_header_written_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conversation_log.csv");
        let logger = ConversationLogger::new(&path);

        logger
            .append(&LogEntry::now("What is a function?", "A named block.", Topic::OnTopic))
            .await
            .unwrap();
        logger
            .append(&LogEntry::now("Weather?", "Let's talk Python.", Topic::OffTopic))
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "user,assistant,topic,timestamp");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("What is a function?,A named block.,on-topic,"));
        assert!(lines[2].contains(",off-topic,"));
    }

    #[tokio::test]
    async fn test_fields_are_quoted() {
        let dir = tempdir().unwrap();
        let logger = ConversationLogger::new(dir.path().join("log.csv"));
        let entry = LogEntry::now(
            "Why, \"exactly\"?",
            "Line one\nline two, with comma",
            Topic::OnTopic,
        );
        logger.append(&entry).await.unwrap();

        let contents = std::fs::read_to_string(logger.path()).unwrap();
        assert!(contents.contains("\"Why, \"\"exactly\"\"?\""));

        let entries = logger.recent(10).await.unwrap();
        assert_eq!(entries, vec![entry]);
    }

    #[tokio::test]
    async fn test_recent_returns_latest_entries() {
        let dir = tempdir().unwrap();
        let logger = ConversationLogger::new(dir.path().join("log.csv"));
        assert!(logger.recent(5).await.unwrap().is_empty());

        for i in 0..4 {
            logger
                .append(&LogEntry::now(format!("q{}", i), "a", Topic::OnTopic))
                .await
                .unwrap();
        }
        let recent = logger.recent(2).await.unwrap();
        assert_eq!(
            recent.iter().map(|e| e.user.as_str()).collect::<Vec<_>>(),
            vec!["q2", "q3"]
        );
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_rows_intact() {
        let dir = tempdir().unwrap();
        let logger = Arc::new(ConversationLogger::new(dir.path().join("log.csv")));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let logger = logger.clone();
                tokio::spawn(async move {
                    logger
                        .append(&LogEntry::now(format!("q{}", i), "answer", Topic::OnTopic))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(logger.recent(100).await.unwrap().len(), 16);
    }

    #[test]
    fn test_timestamp_is_iso_local() {
        let ts = local_timestamp();
        assert!(chrono::NaiveDateTime::parse_from_str(&ts, "%Y-%m-%dT%H:%M:%S%.6f").is_ok());
    }

    #[tokio::test]
    async fn test_unwritable_path_is_error() {
        let dir = tempdir().unwrap();
        // a directory where the file should be
        let logger = ConversationLogger::new(dir.path());
        let result = logger
            .append(&LogEntry::now("q", "a", Topic::OnTopic))
            .await;
        assert!(result.is_err());
    }
}
