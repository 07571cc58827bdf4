//! Offset persistence: the driver boundary's `offset_reader(partition)`
//! contract, plus a file-backed implementation for the reference binary.
//!
//! The core only ever reads through this trait, and only at `start` (§6).
//! Writing updated offsets back to storage is the external driver
//! framework's concern in general, but the reference binary wires the same
//! file store into `commit` so the demo is resumable end to end.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use otlp_ingress_common::{OffsetKey, PartitionKey};
use serde::{Deserialize, Serialize};

/// Reads a persisted offset for a partition. `None` and an empty/absent
/// store mean the same thing: start the signal from zero (§9 Design
/// Notes).
pub trait OffsetReader {
    fn read(&self, partition: &PartitionKey) -> Option<OffsetKey>;
}

/// Mirrors [`OffsetReader`] for the half of the contract the reference
/// binary also needs: persisting what `commit` observed.
pub trait OffsetWriter {
    fn write(&self, partition: &PartitionKey, offset: &OffsetKey);
}

fn partition_map_key(partition: &PartitionKey) -> String {
    format!("{}/{}", partition.connector_name, partition.signal_name)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OffsetFile(BTreeMap<String, OffsetKey>);

/// A JSON file on disk holding one offset record per `{connector_name,
/// signal_name}` partition, read whole and rewritten whole on each write —
/// adequate for three records, not a design meant to scale past that.
pub struct FileOffsetStore {
    path: PathBuf,
    state: Mutex<OffsetFile>,
}

impl FileOffsetStore {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            if text.trim().is_empty() {
                OffsetFile::default()
            } else {
                serde_json::from_str(&text)?
            }
        } else {
            OffsetFile::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    fn persist(&self, state: &OffsetFile) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(state)?;
        if let Some(parent) = Path::new(&self.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

impl OffsetReader for FileOffsetStore {
    fn read(&self, partition: &PartitionKey) -> Option<OffsetKey> {
        let state = self.state.lock().ok()?;
        state.0.get(&partition_map_key(partition)).cloned()
    }
}

impl OffsetWriter for FileOffsetStore {
    fn write(&self, partition: &PartitionKey, offset: &OffsetKey) {
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(_) => return,
        };
        state.0.insert(partition_map_key(partition), offset.clone());
        if let Err(e) = self.persist(&state) {
            tracing::warn!(error = %e, "failed to persist offset store");
        }
    }
}

/// An offset reader with nothing persisted; every signal starts at zero.
/// Useful for tests and for a first run with no store configured.
pub struct NullOffsetStore;

impl OffsetReader for NullOffsetStore {
    fn read(&self, _partition: &PartitionKey) -> Option<OffsetKey> {
        None
    }
}

impl OffsetWriter for NullOffsetStore {
    fn write(&self, _partition: &PartitionKey, _offset: &OffsetKey) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offsets.json");

        let partition = PartitionKey {
            connector_name: "otlp-ingress".to_string(),
            signal_name: "TRACES".to_string(),
        };
        let offset = OffsetKey {
            session_id: "session-a".to_string(),
            signal_name: "TRACES".to_string(),
            sequence: 42,
        };

        {
            let store = FileOffsetStore::open(&path).unwrap();
            store.write(&partition, &offset);
        }

        let reopened = FileOffsetStore::open(&path).unwrap();
        let read_back = reopened.read(&partition).unwrap();
        assert_eq!(read_back.sequence, 42);
        assert_eq!(read_back.session_id, "session-a");
    }

    #[test]
    fn absent_partition_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileOffsetStore::open(dir.path().join("offsets.json")).unwrap();
        let partition = PartitionKey {
            connector_name: "c".to_string(),
            signal_name: "LOGS".to_string(),
        };
        assert!(store.read(&partition).is_none());
    }
}
