//! Field records and their persistence.
//!
//! The pipeline only needs [`FieldStore::list_pending_fields`] and
//! [`FieldStore::mark_field_done`]; the remaining operations back the
//! field-management commands.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndvimap_core::Boundary;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifacts::ArtifactLayout;

/// Errors from a field store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("field {0} not found")]
    NotFound(i64),

    #[error("field store {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("field store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A submitted field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub boundary: Boundary,
    /// `true` once all artifacts exist
    #[serde(default)]
    pub status: bool,
}

/// Persistence of field records.
pub trait FieldStore: Send + Sync {
    /// Fields whose status is still pending, in id order.
    fn list_pending_fields(&self) -> StoreResult<Vec<Field>>;

    /// Flip a field to done. Marking a done field again is a no-op.
    fn mark_field_done(&self, id: i64) -> StoreResult<()>;

    /// Store a new pending field and return its id.
    fn add_field(&self, name: &str, boundary: Boundary) -> StoreResult<i64>;

    /// All fields, in id order.
    fn list_fields(&self) -> StoreResult<Vec<Field>>;

    /// Remove a field record.
    fn delete_field(&self, id: i64) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct FieldTable {
    next_id: i64,
    fields: Vec<Field>,
}

impl FieldTable {
    fn add(&mut self, name: &str, boundary: Boundary) -> i64 {
        self.next_id = self.next_id.max(self.fields.iter().map(|f| f.id).max().unwrap_or(0)) + 1;
        let id = self.next_id;
        self.fields.push(Field {
            id,
            name: name.to_string(),
            boundary,
            status: false,
        });
        id
    }

    fn mark_done(&mut self, id: i64) -> StoreResult<()> {
        let field = self
            .fields
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(StoreError::NotFound(id))?;
        field.status = true;
        Ok(())
    }

    fn delete(&mut self, id: i64) -> StoreResult<()> {
        let before = self.fields.len();
        self.fields.retain(|f| f.id != id);
        if self.fields.len() == before {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn sorted(&self, pending_only: bool) -> Vec<Field> {
        let mut out: Vec<Field> = self
            .fields
            .iter()
            .filter(|f| !pending_only || !f.status)
            .cloned()
            .collect();
        out.sort_by_key(|f| f.id);
        out
    }
}

/// Field store kept in memory.
#[derive(Debug, Default)]
pub struct MemoryFieldStore {
    table: Mutex<FieldTable>,
}

impl MemoryFieldStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FieldStore for MemoryFieldStore {
    fn list_pending_fields(&self) -> StoreResult<Vec<Field>> {
        Ok(self.table.lock().map_err(|_| StoreError::Poisoned)?.sorted(true))
    }

    fn mark_field_done(&self, id: i64) -> StoreResult<()> {
        self.table.lock().map_err(|_| StoreError::Poisoned)?.mark_done(id)
    }

    fn add_field(&self, name: &str, boundary: Boundary) -> StoreResult<i64> {
        Ok(self
            .table
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .add(name, boundary))
    }

    fn list_fields(&self) -> StoreResult<Vec<Field>> {
        Ok(self.table.lock().map_err(|_| StoreError::Poisoned)?.sorted(false))
    }

    fn delete_field(&self, id: i64) -> StoreResult<()> {
        self.table.lock().map_err(|_| StoreError::Poisoned)?.delete(id)
    }
}

// ---------------------------------------------------------------------------
// JSON file
// ---------------------------------------------------------------------------

/// Field store backed by one JSON file.
///
/// Every mutation rewrites the whole file through a sibling temp file and a
/// rename, so readers never see a half-written table.
#[derive(Debug)]
pub struct JsonFieldStore {
    path: PathBuf,
    artifacts: Option<ArtifactLayout>,
    lock: Mutex<()>,
}

impl JsonFieldStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            artifacts: None,
            lock: Mutex::new(()),
        }
    }

    /// Also remove a field's artifact directory when it is deleted.
    pub fn with_artifacts(mut self, layout: ArtifactLayout) -> Self {
        self.artifacts = Some(layout);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StoreResult<FieldTable> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FieldTable::default()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(FieldTable::default());
        }
        serde_json::from_str(&text).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn save(&self, table: &FieldTable) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(table).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update<R>(&self, f: impl FnOnce(&mut FieldTable) -> StoreResult<R>) -> StoreResult<R> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut table = self.load()?;
        let out = f(&mut table)?;
        self.save(&table)?;
        Ok(out)
    }
}

impl FieldStore for JsonFieldStore {
    fn list_pending_fields(&self) -> StoreResult<Vec<Field>> {
        Ok(self.load()?.sorted(true))
    }

    fn mark_field_done(&self, id: i64) -> StoreResult<()> {
        self.update(|t| t.mark_done(id))
    }

    fn add_field(&self, name: &str, boundary: Boundary) -> StoreResult<i64> {
        self.update(|t| Ok(t.add(name, boundary)))
    }

    fn list_fields(&self) -> StoreResult<Vec<Field>> {
        Ok(self.load()?.sorted(false))
    }

    fn delete_field(&self, id: i64) -> StoreResult<()> {
        self.update(|t| t.delete(id))?;
        if let Some(layout) = &self.artifacts {
            layout.remove(id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn boundary() -> Boundary {
        r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}"#
            .parse()
            .unwrap()
    }

    fn exercise(store: &dyn FieldStore) {
        let a = store.add_field("north", boundary()).unwrap();
        let b = store.add_field("south", boundary()).unwrap();
        assert!(b > a);
        assert_eq!(store.list_pending_fields().unwrap().len(), 2);

        store.mark_field_done(a).unwrap();
        store.mark_field_done(a).unwrap();
        let pending = store.list_pending_fields().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b);
        assert_eq!(pending[0].name, "south");

        assert!(matches!(store.mark_field_done(99), Err(StoreError::NotFound(99))));

        store.delete_field(b).unwrap();
        assert!(matches!(store.delete_field(b), Err(StoreError::NotFound(_))));
        let all = store.list_fields().unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].status);

        // ids are never reused
        let c = store.add_field("east", boundary()).unwrap();
        assert!(c > b);
    }

    #[test]
    fn memory_store() {
        exercise(&MemoryFieldStore::new());
    }

    #[test]
    fn json_store() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFieldStore::open(tmp.path().join("db").join("fields.json"));
        exercise(&store);

        let reopened = JsonFieldStore::open(store.path());
        assert_eq!(reopened.list_fields().unwrap().len(), 2);
        assert!(!tmp.path().join("db").join("fields.json.tmp").exists());
    }

    #[test]
    fn json_store_delete_removes_artifacts() {
        let tmp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(tmp.path().join("map_data"));
        let store = JsonFieldStore::open(tmp.path().join("fields.json")).with_artifacts(layout.clone());

        let id = store.add_field("west", boundary()).unwrap();
        fs::create_dir_all(layout.field_dir(id)).unwrap();
        fs::write(layout.index_path(id), b"x").unwrap();

        store.delete_field(id).unwrap();
        assert!(!layout.field_dir(id).exists());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fields.json");
        fs::write(&path, "{ not json").unwrap();
        let store = JsonFieldStore::open(&path);
        assert!(matches!(store.list_fields(), Err(StoreError::Corrupt { .. })));
    }
}
