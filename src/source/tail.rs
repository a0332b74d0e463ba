use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Tracks the byte offset of an append-only JSONL file so each read only
/// returns what was appended since the last one.
///
/// # Functional Core Principle
/// The struct holds pure data (path, offset). `read_new_lines` is the only
/// imperative part.
#[derive(Debug, Clone)]
pub struct TailState {
    path: PathBuf,
    offset: u64,
}

impl TailState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read complete lines appended since the last call.
    ///
    /// A trailing line without its newline is left for the next call, so a
    /// writer caught mid-line never yields half a message.
    ///
    /// # Truncation Detection
    /// If the file shrank below the stored offset it was truncated or
    /// rotated: start again from the beginning.
    pub fn read_new_lines(&mut self) -> io::Result<String> {
        let mut file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();

        if file_len < self.offset {
            self.offset = 0;
        }

        file.seek(SeekFrom::Start(self.offset))?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;

        let complete = match content.rfind('\n') {
            Some(idx) => idx + 1,
            None => 0,
        };
        content.truncate(complete);
        self.offset += complete as u64;

        Ok(content)
    }

    pub fn reset(&mut self) {
        self.offset = 0;
    }
}
