//! Descriptor persistence
//!
//! One small JSON file per logical service, at a path derived from the
//! service id alone, so any process on the host can find it without prior
//! coordination. The file is advisory: it tells clients where to dial, while
//! the worker's `isHealthy` answer stays authoritative.

use serde_json::{Map, Value as JsonValue};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::descriptor::{DescriptorPatch, WorkerDescriptor};
use crate::error::{CoreError, CoreResult};

/// Directory under the per-user state directory that holds descriptor files
pub const DESCRIPTOR_DIR_NAME: &str = "__workers-service-process-info__";

/// Reads and merge-writes the descriptor of one service
#[derive(Debug, Clone)]
pub struct WorkerDescriptorStore {
    service_id: String,
    path: PathBuf,
}

impl WorkerDescriptorStore {
    /// Create a store rooted at an explicit state directory
    pub fn new(state_dir: impl AsRef<Path>, service_id: impl Into<String>) -> Self {
        let service_id = service_id.into();
        let path = state_dir
            .as_ref()
            .join(DESCRIPTOR_DIR_NAME)
            .join(format!("{}.json", service_id));

        Self { service_id, path }
    }

    /// Per-user state directory for a tool namespace
    pub fn user_state_dir(tool_namespace: &str) -> CoreResult<PathBuf> {
        let home = dirs::home_dir().ok_or(CoreError::HomeDirUnavailable)?;
        Ok(home.join(format!(".{}", tool_namespace)))
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the descriptor file
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Read the descriptor.
    ///
    /// Never fails: a missing, unreadable or malformed file reads as the
    /// empty descriptor.
    pub fn read(&self) -> WorkerDescriptor {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    debug!("Failed to read descriptor {:?}: {}", self.path, e);
                }
                return WorkerDescriptor::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                debug!("Ignoring malformed descriptor {:?}: {}", self.path, e);
                WorkerDescriptor::default()
            }
        }
    }

    /// Merge a partial update onto the on-disk object and persist it.
    ///
    /// Fields not named in the patch (including keys this crate does not know)
    /// survive the write. Returns the descriptor as written.
    pub fn write(&self, patch: &DescriptorPatch) -> CoreResult<WorkerDescriptor> {
        let mut object = self.read_object();
        patch.apply_to(&mut object);

        let value = JsonValue::Object(object);
        let content = serde_json::to_string_pretty(&value)?;

        fs::create_dir_all(self.directory())?;

        // Readers never observe a half-written file
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, content)?;
        fs::rename(&staging, &self.path)?;

        debug!("Wrote descriptor for {} to {:?}", self.service_id, self.path);
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    /// Delete the descriptor file. Returns whether a file was removed.
    pub fn remove(&self) -> CoreResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed descriptor {:?}", self.path);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn read_object(&self) -> Map<String, JsonValue> {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return Map::new();
        };

        match serde_json::from_str::<JsonValue>(&content) {
            Ok(JsonValue::Object(object)) => object,
            Ok(_) | Err(_) => {
                warn!(
                    "Descriptor {:?} is not a JSON object, overwriting it",
                    self.path
                );
                Map::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, WorkerDescriptorStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = WorkerDescriptorStore::new(temp_dir.path(), "svc");
        (temp_dir, store)
    }

    #[test]
    fn test_path_is_derived_from_service_id() {
        let (temp_dir, store) = store();
        assert_eq!(
            store.path(),
            temp_dir.path().join(DESCRIPTOR_DIR_NAME).join("svc.json")
        );
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let (_temp_dir, store) = store();
        assert!(store.read().is_empty());
    }

    #[test]
    fn test_malformed_file_reads_empty() {
        let (_temp_dir, store) = store();
        fs::create_dir_all(store.directory()).unwrap();
        fs::write(store.path(), "{ not json").unwrap();
        assert!(store.read().is_empty());

        fs::write(store.path(), r#"{"port": "three thousand"}"#).unwrap();
        assert!(store.read().is_empty());
    }

    #[test]
    fn test_write_merges_with_existing_fields() {
        let (_temp_dir, store) = store();
        store
            .write(&DescriptorPatch::new().service_id("svc").version("2.0.0"))
            .unwrap();

        let written = store.write(&DescriptorPatch::new().port(4000)).unwrap();
        assert_eq!(written.port, Some(4000));

        let on_disk = store.read();
        assert_eq!(on_disk.service_id.as_deref(), Some("svc"));
        assert_eq!(on_disk.version.as_deref(), Some("2.0.0"));
        assert_eq!(on_disk.port, Some(4000));
    }

    #[test]
    fn test_write_preserves_unknown_keys() {
        let (_temp_dir, store) = store();
        fs::create_dir_all(store.directory()).unwrap();
        fs::write(store.path(), r#"{"owner": "someone", "pid": 7}"#).unwrap();

        store.write(&DescriptorPatch::new().port(4100)).unwrap();

        let raw: JsonValue =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["owner"], "someone");
        assert_eq!(raw["pid"], 7);
        assert_eq!(raw["port"], 4100);
    }

    #[test]
    fn test_boot_then_started_lifecycle() {
        let (_temp_dir, store) = store();
        store
            .write(
                &DescriptorPatch::new()
                    .service_id("svc")
                    .port(3600)
                    .pid(10)
                    .version("1.0.0")
                    .starting_now(),
            )
            .unwrap();
        assert!(store.read().is_starting());

        store.write(&DescriptorPatch::new().started()).unwrap();
        let started = store.read();
        assert!(!started.is_starting());
        assert_eq!(started.pid, Some(10));
    }

    #[test]
    fn test_remove() {
        let (_temp_dir, store) = store();
        assert!(!store.remove().unwrap());

        store.write(&DescriptorPatch::new().port(3600)).unwrap();
        assert!(store.remove().unwrap());
        assert!(store.read().is_empty());
    }
}
