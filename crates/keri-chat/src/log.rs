use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use keri_chat_core::event::Citation;
use serde::{Deserialize, Serialize};
use tokio::task::spawn_blocking;

/// One answered question, as stored in the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the answer was received.
    pub timestamp: DateTime<Utc>,
    /// The question as asked.
    pub question: String,
    /// The full answer text.
    pub answer: String,
    /// The cited sources.
    pub citations: Vec<Citation>,
}

/// An append-only JSON Lines log of questions and answers.
#[derive(Clone, Debug)]
pub struct AskLog {
    path: PathBuf,
}

impl AskLog {
    /// Creates a log writing to `path`. Nothing is touched until the first
    /// entry is appended.
    #[inline]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path of the log file.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends an entry, creating the file and its directory if needed.
    pub fn append(&self, entry: &LogEntry) -> io::Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }

    /// Appends an entry on the blocking thread pool, logging failures
    /// instead of returning them.
    pub async fn record(
        &self,
        question: &str,
        answer: &str,
        citations: &[Citation],
    ) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            question: question.to_owned(),
            answer: answer.to_owned(),
            citations: citations.to_vec(),
        };
        let log = self.clone();
        match spawn_blocking(move || log.append(&entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!("failed to write to {}: {err}", self.path.display());
            }
            Err(err) => {
                warn!("log writer for {} failed: {err}", self.path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append() {
        let dir = tempfile::tempdir().unwrap();
        let log = AskLog::new(dir.path().join("nested").join("log.jsonl"));

        let citation = Citation {
            number: 1,
            content: "Pre-rotation commits to the next key.".to_owned(),
            source: "keri.md".to_owned(),
        };
        log.record("What is pre-rotation?", "It is [1].", &[citation.clone()])
            .await;
        log.record("And witnesses?", "No idea.", &[]).await;

        let content = fs::read_to_string(log.path()).unwrap();
        let entries: Vec<LogEntry> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].question, "What is pre-rotation?");
        assert_eq!(entries[0].citations, vec![citation]);
        assert_eq!(entries[1].answer, "No idea.");
        assert!(entries[0].timestamp <= entries[1].timestamp);
    }

    #[tokio::test]
    async fn test_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // The log path is a directory, so opening it as a file fails.
        let log = AskLog::new(dir.path());
        assert!(log.append(&LogEntry {
            timestamp: Utc::now(),
            question: "q".to_owned(),
            answer: "a".to_owned(),
            citations: vec![],
        })
        .is_err());
        log.record("q", "a", &[]).await;
    }
}
