//! Session log sinks.
//!
//! A channel log receives every byte the transport produced, before any
//! normalization, so a session can be replayed exactly as the device sent it.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Destination for raw session bytes.
pub trait ChannelLog: Send {
    /// Append bytes to the log.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush and release the sink.
    fn close(&mut self) -> io::Result<()>;
}

/// How [`FileChannelLog`] opens an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogMode {
    /// Keep existing content and write after it.
    Append,
    /// Truncate the file on open.
    #[default]
    Overwrite,
}

/// Channel log backed by a file.
#[derive(Debug)]
pub struct FileChannelLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileChannelLog {
    /// Open (or create) `path` in the given mode.
    pub fn open(path: impl AsRef<Path>, mode: LogMode) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            LogMode::Append => options.append(true),
            LogMode::Overwrite => options.write(true).truncate(true),
        };
        let file = options.open(&path)?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChannelLog for FileChannelLog {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write_all(data),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "channel log closed")),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

/// In-memory channel log, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryChannelLog {
    data: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

impl MemoryChannelLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything logged so far.
    pub fn contents(&self) -> Vec<u8> {
        self.data
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl ChannelLog for MemoryChannelLog {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.data
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ferrocli-{}-{}.log", name, std::process::id()))
    }

    #[test]
    fn test_overwrite_then_append() {
        let path = temp_path("modes");

        let mut log = FileChannelLog::open(&path, LogMode::Overwrite).unwrap();
        log.write(b"first\r\n").unwrap();
        log.close().unwrap();

        let mut log = FileChannelLog::open(&path, LogMode::Append).unwrap();
        log.write(b"second").unwrap();
        log.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"first\r\nsecond");

        let mut log = FileChannelLog::open(&path, LogMode::Overwrite).unwrap();
        log.write(b"third").unwrap();
        log.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"third");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_after_close_fails() {
        let path = temp_path("closed");
        let mut log = FileChannelLog::open(&path, LogMode::Overwrite).unwrap();
        log.close().unwrap();
        assert!(log.write(b"late").is_err());
        assert!(log.close().is_ok());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_memory_log_shares_clones() {
        let log = MemoryChannelLog::new();
        let mut sink = log.clone();
        sink.write(b"abc").unwrap();
        assert_eq!(log.contents(), b"abc");
    }
}
