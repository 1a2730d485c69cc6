//! Newline-delimited JSON feed of agent activity.
//!
//! Hooks append one `{"path": ..., "timestamp": ...}` object per line;
//! [`EventLog`] reads whatever was appended since the previous call.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use tracing::warn;

use crate::error::{Error, Result};
use crate::overlay::ActivityEvent;

pub fn parse_event_line(line: &str) -> Result<ActivityEvent> {
    Ok(serde_json::from_str(line.trim())?)
}

/// Incremental reader over an append-only event file.
pub struct EventLog {
    path: PathBuf,
    offset: u64,
    /// Bytes of a line still being written.
    partial: Vec<u8>,
}

impl EventLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            partial: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Events appended since the last call, in file order.
    ///
    /// A missing file yields no events. If the file shrank (rotated or
    /// truncated), reading restarts from the top. Malformed lines, including
    /// ones that are not UTF-8, are skipped.
    pub fn read_new(&mut self) -> Result<Vec<ActivityEvent>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata()?.len();
        if len < self.offset {
            self.offset = 0;
            self.partial.clear();
        }
        file.seek(SeekFrom::Start(self.offset))?;

        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                break;
            }
            self.offset += read as u64;

            if line.last() != Some(&b'\n') {
                self.partial.extend_from_slice(&line);
                break;
            }
            let complete = if self.partial.is_empty() {
                std::mem::take(&mut line)
            } else {
                let mut joined = std::mem::take(&mut self.partial);
                joined.extend_from_slice(&line);
                joined
            };
            let text = match String::from_utf8(complete) {
                Ok(text) => text,
                Err(e) => {
                    warn!(file = %self.path.display(), error = %e, "non UTF-8 event line skipped");
                    continue;
                }
            };
            if text.trim().is_empty() {
                continue;
            }
            match parse_event_line(&text) {
                Ok(event) => events.push(event),
                Err(e) => warn!(file = %self.path.display(), error = %e, "malformed event line skipped"),
            }
        }

        Ok(events)
    }
}

/// Whether a notification path names the log file.
///
/// Only the parent directory is watched, so the file name alone identifies
/// the log regardless of how either side spells the directory.
fn names_log(event_path: &Path, log_name: &OsStr) -> bool {
    event_path.file_name() == Some(log_name)
}

/// Watch `path` for modifications.
///
/// The receiver gets a unit message per filesystem notification; keep the
/// returned watcher alive for as long as notifications are wanted. The parent
/// directory is watched so the file may be created later. Relative paths are
/// resolved against the current directory.
pub fn watch_event_log(path: &Path) -> Result<(RecommendedWatcher, Receiver<()>)> {
    let log_name = path
        .file_name()
        .map(OsStr::to_os_string)
        .ok_or_else(|| Error::Config(format!("event log {} has no file name", path.display())))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let dir = dir.canonicalize()?;

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) if event.paths.iter().any(|p| names_log(p, &log_name)) => {
                let _ = tx.send(());
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "event log watch error"),
        }
    })?;

    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    Ok((watcher, rx))
}
