use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct TranscriptEntry {
    pub(crate) thread_id: String,
    pub(crate) role: String,
    pub(crate) text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) meta: Option<serde_json::Value>,
    pub(crate) ts_utc: i64,
}

pub(crate) fn transcript_path(dir: &Path) -> PathBuf {
    dir.join(format!("session-{}.jsonl", Utc::now().format("%Y-%m-%d")))
}

pub(crate) fn append_entry(
    dir: &Path,
    entry: &TranscriptEntry,
) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(dir)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(transcript_path(dir))?;
    writeln!(file, "{}", serde_json::to_string(entry)?)?;
    Ok(())
}

/// Per-session JSONL transcript. Disabled when no directory is configured.
pub(crate) struct Transcript {
    dir: Option<PathBuf>,
    thread_id: String,
}

impl Transcript {
    pub(crate) fn new(dir: Option<PathBuf>, thread_id: impl Into<String>) -> Self {
        Self {
            dir,
            thread_id: thread_id.into(),
        }
    }

    pub(crate) fn record(&self, role: &str, text: &str, meta: Option<serde_json::Value>) {
        let Some(dir) = &self.dir else {
            return;
        };
        let entry = TranscriptEntry {
            thread_id: self.thread_id.clone(),
            role: role.to_string(),
            text: text.to_string(),
            meta,
            ts_utc: Utc::now().timestamp(),
        };
        if let Err(err) = append_entry(dir, &entry) {
            warn!(dir = %dir.display(), error = %err, "failed to append transcript entry");
        }
    }
}
