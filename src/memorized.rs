// src/memorized.rs - Persistent store for memorized attribute values
//
// Values survive restarts: they are kept in one JSON document keyed by device
// name and attribute name, rewritten atomically on every change.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::DeviceError;

type Document = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Debug, Default)]
pub struct MemorizedStore {
    path: Option<PathBuf>,
    values: Mutex<Document>,
}

impl MemorizedStore {
    /// Store that forgets everything on exit.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the store backed by `path`. A missing file starts out empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DeviceError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => Document::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                DeviceError::Memorized(format!("cannot parse {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No memorized values at {}, starting empty", path.display());
                Document::new()
            }
            Err(e) => {
                return Err(DeviceError::Memorized(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };
        Ok(Self {
            path: Some(path),
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, device: &str, attribute: &str) -> Option<Value> {
        let values = self.values.lock().ok()?;
        values.get(device)?.get(attribute).cloned()
    }

    pub fn get_bool(&self, device: &str, attribute: &str) -> Option<bool> {
        self.get(device, attribute)?.as_bool()
    }

    /// Remember a value and write the store back to disk.
    pub fn set(&self, device: &str, attribute: &str, value: impl Into<Value>) -> Result<(), DeviceError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| DeviceError::Memorized("store lock poisoned".to_string()))?;
        let mut updated = values.clone();
        updated
            .entry(device.to_string())
            .or_default()
            .insert(attribute.to_string(), value.into());
        if let Some(path) = &self.path {
            write_atomically(path, &updated)?;
        }
        *values = updated;
        Ok(())
    }
}

fn write_atomically(path: &Path, values: &Document) -> Result<(), DeviceError> {
    let fail = |e: &dyn std::fmt::Display| {
        warn!("Failed to persist memorized values to {}: {}", path.display(), e);
        DeviceError::Memorized(format!("cannot write {}: {e}", path.display()))
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let json = serde_json::to_string_pretty(values).map_err(|e| fail(&e))?;
    let mut file = NamedTempFile::new_in(dir).map_err(|e| fail(&e))?;
    file.write_all(json.as_bytes()).map_err(|e| fail(&e))?;
    file.persist(path).map_err(|e| fail(&e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_in_memory_store() {
        let store = MemorizedStore::in_memory();
        assert_eq!(store.get_bool("lab/hexapod/x", "inverted"), None);
        store.set("lab/hexapod/x", "inverted", true).unwrap();
        assert_eq!(store.get_bool("lab/hexapod/x", "inverted"), Some(true));
        assert!(store.path().is_none());
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memorized.json");
        {
            let store = MemorizedStore::open(&path).unwrap();
            store.set("lab/hexapod/x", "inverted", true).unwrap();
            store.set("lab/hexapod/y", "inverted", false).unwrap();
        }
        let store = MemorizedStore::open(&path).unwrap();
        assert_eq!(store.get_bool("lab/hexapod/x", "inverted"), Some(true));
        assert_eq!(store.get_bool("lab/hexapod/y", "inverted"), Some(false));
    }

    #[test]
    fn test_failed_write_keeps_previous_value() {
        let dir = tempdir().unwrap();
        let gone = dir.path().join("gone");
        std::fs::create_dir(&gone).unwrap();
        let store = MemorizedStore::open(gone.join("memorized.json")).unwrap();
        store.set("lab/hexapod/x", "inverted", false).unwrap();
        std::fs::remove_dir_all(&gone).unwrap();

        assert!(matches!(
            store.set("lab/hexapod/x", "inverted", true),
            Err(DeviceError::Memorized(_))
        ));
        assert_eq!(store.get_bool("lab/hexapod/x", "inverted"), Some(false));
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memorized.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(MemorizedStore::open(&path), Err(DeviceError::Memorized(_))));
    }
}
