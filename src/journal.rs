//! Append-only conversation log (`memory.log`).
//!
//! One line per turn: `[2025-01-31 14:02:11] [SCRIPTOR USER] text`.

use crate::brain::Brain;
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const JOURNAL_FILE: &str = "memory.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Ai,
}

impl Speaker {
    fn tag(&self) -> &'static str {
        match self {
            Speaker::User => "USER",
            Speaker::Ai => "AI",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Journal at `<dir>/memory.log`, creating `dir` if needed.
    pub fn in_dir(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self::new(dir.join(JOURNAL_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, brain: Brain, speaker: Speaker, text: &str) -> io::Result<()> {
        let line = format_entry(
            &Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            brain,
            speaker,
            text,
        );
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }

    /// Append, logging instead of failing: a journal problem never blocks a turn.
    pub fn record(&self, brain: Brain, speaker: Speaker, text: &str) {
        if let Err(err) = self.append(brain, speaker, text) {
            tracing::warn!(path = %self.path.display(), error = %err, "journal append failed");
        }
    }
}

fn format_entry(timestamp: &str, brain: Brain, speaker: Speaker, text: &str) -> String {
    format!("[{timestamp}] [{} {}] {text}\n", brain.tag(), speaker.tag())
}
