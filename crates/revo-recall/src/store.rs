use std::fs::{self, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::entry::MemoryEntry;

const MEMORY_FILE_NAME: &str = "memories.json";
const MEMORY_TMP_FILE_NAME: &str = "memories.json.tmp";
const LOCK_NAME: &str = "memories";
const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct MemoryDocument {
    #[serde(default = "default_version")]
    version: u32,
    entries: Vec<MemoryEntry>,
}

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

/// Whole-file JSON persistence for memory entries.
///
/// Every write replaces `memories.json` via a temp file and rename while an
/// exclusive flock on `locks/memories.lock` is held, so writers in other
/// processes are serialised and readers never see a half-written file.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    base_dir: PathBuf,
    file_path: PathBuf,
    lock_timeout: Duration,
}

impl MemoryStore {
    pub fn new(base_dir: PathBuf, lock_timeout: Duration) -> Self {
        Self {
            file_path: base_dir.join(MEMORY_FILE_NAME),
            base_dir,
            lock_timeout,
        }
    }

    pub fn load_all(&self) -> Result<Vec<MemoryEntry>> {
        if !self.file_path.exists() {
            return Ok(Vec::new());
        }

        let file = OpenOptions::new()
            .read(true)
            .open(&self.file_path)
            .with_context(|| format!("failed to read memory file: {}", self.file_path.display()))?;
        let document: MemoryDocument = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse memory file: {}", self.file_path.display()))?;
        if document.version > DOCUMENT_VERSION {
            tracing::warn!(
                path = %self.file_path.display(),
                version = document.version,
                "memory file written by a newer version"
            );
        }
        Ok(document.entries)
    }

    /// Read-modify-write under the file lock.
    ///
    /// The closure sees the entries currently on disk (including writes made
    /// by other processes since this one last loaded) and its edits are
    /// persisted before the lock is released. Returns the persisted entries
    /// alongside the closure's output.
    pub fn update<T>(
        &self,
        reason: &str,
        apply: impl FnOnce(&mut Vec<MemoryEntry>) -> Result<T>,
    ) -> Result<(Vec<MemoryEntry>, T)> {
        self.ensure_storage_dir()?;
        let _lock =
            revo_lock::acquire_lock_with_timeout(&self.base_dir, LOCK_NAME, reason, self.lock_timeout)?;

        let mut entries = self.load_all()?;
        let output = apply(&mut entries)?;
        self.write_all(&entries)?;
        Ok((entries, output))
    }

    /// Atomically replace the file contents. Caller must hold the lock.
    fn write_all(&self, entries: &[MemoryEntry]) -> Result<()> {
        let tmp_path = self.base_dir.join(MEMORY_TMP_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("failed to open temp memory file: {}", tmp_path.display()))?;
        set_file_mode_600(&tmp_path)?;

        let document = MemoryDocument {
            version: DOCUMENT_VERSION,
            entries: entries.to_vec(),
        };
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &document)
            .context("failed to serialize memory entries")?;
        writer
            .flush()
            .context("failed to flush rewritten memory file")?;
        writer
            .get_ref()
            .sync_all()
            .context("failed to sync rewritten memory file")?;

        fs::rename(&tmp_path, &self.file_path).with_context(|| {
            format!(
                "failed to atomically replace memory file {}",
                self.file_path.display()
            )
        })?;
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn ensure_storage_dir(&self) -> Result<()> {
        let dir_exists = self.base_dir.exists();
        fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("failed to create memory dir: {}", self.base_dir.display()))?;

        if !dir_exists {
            set_dir_mode_700(&self.base_dir)?;
        }

        Ok(())
    }
}

#[cfg(unix)]
fn set_dir_mode_700(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
        .with_context(|| format!("failed to chmod 700: {}", path.display()))
}

#[cfg(not(unix))]
fn set_dir_mode_700(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_file_mode_600(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("failed to chmod 600: {}", path.display()))
}

#[cfg(not(unix))]
fn set_file_mode_600(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::Map;
    use ulid::Ulid;

    fn make_store(dir: &Path) -> MemoryStore {
        MemoryStore::new(dir.join("recall"), Duration::from_millis(200))
    }

    fn make_entry(content: &str) -> MemoryEntry {
        MemoryEntry {
            id: Ulid::new(),
            timestamp: Utc::now(),
            content: content.to_string(),
            content_type: "note".to_string(),
            tags: Vec::new(),
            context: Map::new(),
            embedding: vec![0.5, 0.5],
            success_score: 0.5,
            usage_count: 0,
            last_accessed: None,
        }
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = make_store(dir.path());
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_update_persists_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = make_store(dir.path());

        let (entries, inserted) = store
            .update("test", |entries| {
                let entry = make_entry("first");
                let id = entry.id;
                entries.push(entry);
                Ok(id)
            })
            .unwrap();
        assert_eq!(entries.len(), 1);

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, inserted);
        assert_eq!(loaded[0].content, "first");
        assert!(!store.base_dir().join(MEMORY_TMP_FILE_NAME).exists());
    }

    #[test]
    fn test_update_sees_writes_from_other_handles() {
        let dir = tempfile::tempdir().unwrap();
        let first = make_store(dir.path());
        let second = make_store(dir.path());

        first
            .update("a", |entries| {
                entries.push(make_entry("from first"));
                Ok(())
            })
            .unwrap();
        let (entries, _) = second
            .update("b", |entries| {
                entries.push(make_entry("from second"));
                Ok(())
            })
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(first.load_all().unwrap().len(), 2);
    }

    #[test]
    fn test_failed_update_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = make_store(dir.path());
        store
            .update("seed", |entries| {
                entries.push(make_entry("keep"));
                Ok(())
            })
            .unwrap();

        let result: Result<(Vec<MemoryEntry>, ())> = store.update("bad", |entries| {
            entries.clear();
            anyhow::bail!("abort")
        });
        assert!(result.is_err());
        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = make_store(dir.path());
        fs::create_dir_all(store.base_dir()).unwrap();
        fs::write(store.file_path(), "{ not json").unwrap();

        let err = store.load_all().unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse memory file"));
    }

    #[test]
    fn test_update_fails_while_locked_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let store = make_store(dir.path());
        fs::create_dir_all(store.base_dir()).unwrap();
        let _held = revo_lock::acquire_lock(store.base_dir(), LOCK_NAME, "other process").unwrap();

        let result = store.update("blocked", |_| Ok(()));
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = make_store(dir.path());
        store
            .update("perm", |entries| {
                entries.push(make_entry("secret"));
                Ok(())
            })
            .unwrap();
        let mode = fs::metadata(store.file_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
