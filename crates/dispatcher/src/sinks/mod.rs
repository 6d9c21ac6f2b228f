//! Sink implementations
//!
//! Contains LogSink, HexFileSink and JsonlSink.

mod hex_file;
mod jsonl;
mod log;

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;

pub use self::hex_file::HexFileSink;
pub use self::jsonl::JsonlSink;
pub use self::log::LogSink;

/// Output file settings shared by the file sinks
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    pub path: PathBuf,
    /// Append to an existing file instead of truncating it
    pub append: bool,
}

impl FileSinkConfig {
    /// Build from sink params (`path`, optional `append = "true"`)
    pub fn from_params(params: &HashMap<String, String>) -> io::Result<Self> {
        let path = params
            .get("path")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "missing 'path' param"))?;
        let append = params.get("append").is_some_and(|v| v == "true");
        Ok(Self { path, append })
    }

    fn open(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .write(true)
            .append(self.append)
            .truncate(!self.append)
            .open(&self.path)
    }
}
