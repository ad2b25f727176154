//! JSON-lines file sink: one append-only file per candidate.

use crate::core::Event;
use crate::sink::{newest_first, EventSink, SinkError};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Writes events to `<dir>/<candidate>.jsonl`.
///
/// Writes to one file are serialized; writes to different files are not,
/// so a slow append for one candidate never holds up another.
#[derive(Debug)]
pub struct JsonlSink {
    dir: PathBuf,
    file_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl JsonlSink {
    /// Create a sink rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| SinkError::Io(e.to_string()))?;
        Ok(Self {
            dir,
            file_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding a candidate's events.
    pub fn path_for(&self, candidate_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", file_stem(candidate_id)))
    }

    /// Candidates that have an event file, as file stems.
    pub fn candidates(&self) -> Result<Vec<String>, SinkError> {
        let mut stems: Vec<String> = std::fs::read_dir(&self.dir)
            .map_err(|e| SinkError::Io(e.to_string()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "jsonl").unwrap_or(false))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
            .collect();
        stems.sort();
        Ok(stems)
    }

    /// Lock guarding appends to `path`. Colliding file stems share one.
    fn file_lock(&self, path: &Path) -> Result<Arc<Mutex<()>>, SinkError> {
        let mut locks = self
            .file_locks
            .lock()
            .map_err(|_| SinkError::Io("file lock table poisoned".to_string()))?;
        Ok(Arc::clone(locks.entry(path.to_path_buf()).or_default()))
    }

    fn read_all(&self, candidate_id: &str) -> Result<Vec<Event>, SinkError> {
        let path = self.path_for(candidate_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = std::fs::File::open(&path).map_err(|e| SinkError::Io(e.to_string()))?;
        let mut events = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| SinkError::Io(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(&line) {
                // file stems can collide after sanitizing, so filter on the id
                Ok(event) if event.candidate_id == candidate_id => events.push(event),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = ?path, line = index + 1, "skipping unreadable event: {e}");
                }
            }
        }
        Ok(events)
    }
}

impl EventSink for JsonlSink {
    fn append(&self, candidate_id: &str, event: &Event) -> Result<(), SinkError> {
        let mut line =
            serde_json::to_string(event).map_err(|e| SinkError::Serialization(e.to_string()))?;
        line.push('\n');

        let path = self.path_for(candidate_id);
        let lock = self.file_lock(&path)?;
        let _guard = lock
            .lock()
            .map_err(|_| SinkError::Io("write lock poisoned".to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SinkError::Io(e.to_string()))?;
        file.write_all(line.as_bytes())
            .map_err(|e| SinkError::Io(e.to_string()))?;
        Ok(())
    }

    fn query(&self, candidate_id: &str, limit: usize) -> Result<Vec<Event>, SinkError> {
        Ok(newest_first(self.read_all(candidate_id)?, limit))
    }
}

/// Reduce a candidate id to characters safe in a file name.
fn file_stem(candidate_id: &str) -> String {
    let stem: String = candidate_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "_".to_string()
    } else {
        stem
    }
}
