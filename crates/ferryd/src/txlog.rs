//! Transaction log — durable record of in-flight transfers.
//!
//! A single JSON file mapping the source's content hash to the target path
//! and the bytes committed so far. The whole map is rewritten atomically on
//! every mutation, so a process restart always observes the last completed
//! insert or remove. An unreadable or unparseable file degrades to an empty
//! log and is overwritten on the first write.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Per-transfer record, keyed by the source file's full-content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Target path on the server.
    pub path: String,
    /// Bytes committed at the last finalize; the next run resumes from the
    /// file's actual on-disk size, this is bookkeeping for inspection.
    pub bytes: u64,
}

pub struct TransactionLog {
    path: PathBuf,
    records: BTreeMap<String, TransactionRecord>,
}

/// All mutators take the one lock; writes rewrite the whole file.
pub type SharedLog = Arc<Mutex<TransactionLog>>;

impl TransactionLog {
    /// Load the log at `path`, or start empty when the file is missing or
    /// corrupt.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e,
                        "transaction log unparseable, starting empty");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self { path, records }
    }

    pub fn shared(path: impl Into<PathBuf>) -> SharedLog {
        Arc::new(Mutex::new(Self::open(path)))
    }

    pub fn lookup(&self, hash: &str) -> Option<&TransactionRecord> {
        self.records.get(hash)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or replace the record for `hash` and persist before returning.
    pub fn insert(&mut self, hash: &str, record: TransactionRecord) -> io::Result<()> {
        self.records.insert(hash.to_string(), record);
        self.persist()
    }

    /// Remove the record for `hash`, persisting only if it existed.
    pub fn remove(&mut self, hash: &str) -> io::Result<()> {
        if self.records.remove(hash).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    /// Rewrite the whole file: serialize to a sibling temp file, then rename
    /// over the log so readers never observe a half-written map.
    fn persist(&self) -> io::Result<()> {
        let data = serde_json::to_vec_pretty(&self.records).map_err(io::Error::other)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
