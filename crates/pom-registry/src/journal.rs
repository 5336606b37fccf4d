//! Append-only JSON-lines journal
//!
//! Every registry mutation appends the full record. Replay keeps the last
//! line per record id. A torn final line (crash mid-write) is dropped and
//! truncated away; corruption anywhere else is an error.
//!
//! Appends sync to disk on the calling thread, so the journal suits proof
//! workflows (a few writes per proof), not bulk ingest.

use chrono::{DateTime, Utc};
use pom_core::{ProofError, ProofRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    seq: u64,
    written_at: DateTime<Utc>,
    record: ProofRecord,
}

#[derive(Debug)]
struct JournalFile {
    file: File,
    next_seq: u64,
    /// Length of the file up to the last complete entry
    len: u64,
}

impl JournalFile {
    /// Cut anything past the last complete entry, e.g. the remains of a
    /// failed write.
    fn trim_to_last_entry(&mut self, path: &Path) -> Result<(), ProofError> {
        let actual = self.file.metadata().map_err(|e| storage(path, e))?.len();
        if actual > self.len {
            tracing::warn!(
                path = %path.display(),
                bytes = actual - self.len,
                "truncating partial journal write"
            );
            self.file.set_len(self.len).map_err(|e| storage(path, e))?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    inner: Mutex<JournalFile>,
}

impl Journal {
    /// Open (or create) the journal at `path` and replay it.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<ProofRecord>), ProofError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| storage(&path, e))?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| storage(&path, e))?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| storage(&path, e))?;

        let mut records: HashMap<Uuid, ProofRecord> = HashMap::new();
        let mut max_seq = 0u64;
        let mut valid_len = 0usize;
        let mut offset = 0usize;
        let mut missing_newline = false;

        let segments: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();
        let last = segments.len().saturating_sub(1);
        for (index, segment) in segments.iter().enumerate() {
            let terminated = index < last;
            let end = offset + segment.len() + usize::from(terminated);

            if segment.iter().all(u8::is_ascii_whitespace) {
                if terminated {
                    valid_len = end;
                }
                offset = end;
                continue;
            }

            match serde_json::from_slice::<JournalEntry>(segment) {
                Ok(entry) => {
                    max_seq = max_seq.max(entry.seq);
                    records.insert(entry.record.id, entry.record);
                    valid_len = end;
                    missing_newline = !terminated;
                }
                Err(e) if !terminated => {
                    tracing::warn!(
                        path = %path.display(),
                        bytes = segment.len(),
                        error = %e,
                        "dropping torn journal tail"
                    );
                }
                Err(e) => {
                    return Err(ProofError::Storage(format!(
                        "{} line {}: {}",
                        path.display(),
                        index + 1,
                        e
                    )));
                }
            }
            offset = end;
        }

        if valid_len < bytes.len() {
            file.set_len(valid_len as u64).map_err(|e| storage(&path, e))?;
        }
        let mut len = valid_len as u64;
        if missing_newline {
            file.write_all(b"\n").map_err(|e| storage(&path, e))?;
            len += 1;
        }

        let mut replayed: Vec<ProofRecord> = records.into_values().collect();
        replayed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        tracing::info!(path = %path.display(), records = replayed.len(), last_seq = max_seq, "journal replayed");

        Ok((
            Self {
                path,
                inner: Mutex::new(JournalFile {
                    file,
                    next_seq: max_seq + 1,
                    len,
                }),
            },
            replayed,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record` and sync it to disk. On failure the file is cut back
    /// to the previous entry so the next append starts on a line boundary.
    pub fn append(&self, record: &ProofRecord) -> Result<u64, ProofError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| ProofError::Storage("journal lock poisoned".to_string()))?;
        let seq = inner.next_seq;
        let entry = JournalEntry {
            seq,
            written_at: Utc::now(),
            record: record.clone(),
        };
        let mut line = serde_json::to_vec(&entry)
            .map_err(|e| ProofError::Storage(format!("encode journal entry: {}", e)))?;
        line.push(b'\n');

        inner.trim_to_last_entry(&self.path)?;
        let written = match inner.file.write_all(&line) {
            Ok(()) => inner.file.sync_data(),
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(trim) = inner.trim_to_last_entry(&self.path) {
                tracing::error!(error = %trim, "journal left with a partial entry");
            }
            return Err(storage(&self.path, e));
        }
        inner.len += line.len() as u64;
        inner.next_seq += 1;
        Ok(seq)
    }
}

fn storage(path: &Path, e: std::io::Error) -> ProofError {
    ProofError::Storage(format!("{}: {}", path.display(), e))
}
