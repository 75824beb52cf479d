//! Preset persistence.
//!
//! One pretty-printed JSON document per preset, `<dir>/<id>.json`:
//!
//! ```json
//! { "id": "...", "name": "Stage", "updatedAt": "...",
//!   "fields": [{ "name": "intensity", "path": "/Game/Main.Main:Light_1.Intensity",
//!                "kind": "property", "metadata": {}, "range": [] }] }
//! ```
//!
//! Writes go through [`PresetPersister`], a single worker task, so saves of
//! the same preset land in edit order.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rc_core::codec::json;
use rc_core::{Diagnostics, PresetId, RcError, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::types::{FieldKind, PresetField, RangePoint};

/// Persisted form of a preset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetRecord {
    /// Preset ID, also the file stem.
    pub id: PresetId,
    /// Unique name.
    pub name: String,
    /// RFC 3339 time of the last save.
    #[serde(default)]
    pub updated_at: String,
    /// Fields in exposure order.
    #[serde(default)]
    pub fields: Vec<FieldRecord>,
}

/// Persisted form of a field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    /// Field name.
    pub name: String,
    /// Bound engine address.
    pub path: String,
    /// Property or function.
    pub kind: FieldKind,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: IndexMap<String, String>,
    /// Range mapping points.
    #[serde(default)]
    pub range: Vec<RangeRecord>,
}

/// Persisted range point; `output` uses the text wire form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeRecord {
    /// Protocol input.
    pub input: f64,
    /// Property value at that input.
    pub output: serde_json::Value,
}

impl FieldRecord {
    pub(crate) fn from_field(field: &PresetField) -> Result<Self> {
        let range = field
            .range
            .iter()
            .map(|p| {
                Ok(RangeRecord {
                    input: p.input,
                    output: json::to_json(&p.output)?,
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self {
            name: field.name.clone(),
            path: field.path.clone(),
            kind: field.kind,
            metadata: field.metadata.clone(),
            range,
        })
    }

    pub(crate) fn into_field(self) -> Result<PresetField> {
        let mut diagnostics = Diagnostics::default();
        let range = self
            .range
            .into_iter()
            .map(|r| {
                Ok(RangePoint {
                    input: r.input,
                    output: json::from_json(r.output, &mut diagnostics)?,
                })
            })
            .collect::<Result<_>>()?;
        Ok(PresetField {
            name: self.name,
            path: self.path,
            kind: self.kind,
            metadata: self.metadata,
            range,
        })
    }
}

/// Storage backend for preset records.
#[async_trait]
pub trait PresetStore: Send + Sync {
    /// Every readable record. Unreadable entries are skipped with a warning.
    async fn load_all(&self) -> Result<Vec<PresetRecord>>;

    /// Create or replace a record.
    async fn save(&self, record: &PresetRecord) -> Result<()>;

    /// Remove a record. Missing records are not an error.
    async fn delete(&self, id: &PresetId) -> Result<()>;
}

/// Directory-backed store.
#[derive(Clone, Debug)]
pub struct FsPresetStore {
    dir: PathBuf,
}

impl FsPresetStore {
    /// Store presets under `dir`, created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &PresetId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl PresetStore for FsPresetStore {
    async fn load_all(&self) -> Result<Vec<PresetRecord>> {
        let dir = self.dir.clone();
        blocking(move || load_dir(&dir)).await
    }

    async fn save(&self, record: &PresetRecord) -> Result<()> {
        let path = self.record_path(&record.id);
        let body = serde_json::to_vec_pretty(record)
            .map_err(|e| RcError::internal(format!("failed to serialize preset: {e}")))?;
        blocking(move || write_atomic(&path, &body)).await
    }

    async fn delete(&self, id: &PresetId) -> Result<()> {
        let path = self.record_path(id);
        blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, &e)),
        })
        .await
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RcError::internal(format!("preset I/O task failed: {e}")))?
}

fn load_dir(dir: &Path) -> Result<Vec<PresetRecord>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(?dir, "preset directory not found, starting empty");
            return Ok(Vec::new());
        }
        Err(e) => return Err(io_error(dir, &e)),
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut records = Vec::new();
    for path in paths {
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) => {
                warn!(?path, error = %e, "failed to read preset file, skipping");
                continue;
            }
        };
        match serde_json::from_str::<PresetRecord>(&data) {
            Ok(record) => records.push(record),
            Err(e) => warn!(?path, error = %e, "failed to parse preset file, skipping"),
        }
    }
    debug!(?dir, count = records.len(), "presets loaded");
    Ok(records)
}

/// Write to a temp file in the same directory, then rename over the target.
fn write_atomic(path: &Path, body: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| RcError::internal(format!("preset path has no parent: {}", path.display())))?;
    std::fs::create_dir_all(parent).map_err(|e| io_error(parent, &e))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| io_error(parent, &e))?;
    temp.write_all(body).map_err(|e| io_error(temp.path(), &e))?;
    temp.as_file().sync_all().map_err(|e| io_error(temp.path(), &e))?;
    let _ = temp.persist(path).map_err(|e| io_error(path, &e.error))?;
    Ok(())
}

fn io_error(path: &Path, e: &std::io::Error) -> RcError {
    RcError::internal(format!("preset storage error at {}: {e}", path.display()))
}

/// Store kept in memory; used when autosave is off and in tests.
#[derive(Debug, Default)]
pub struct MemoryPresetStore {
    records: Mutex<IndexMap<PresetId, PresetRecord>>,
}

impl MemoryPresetStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current records.
    pub fn records(&self) -> Vec<PresetRecord> {
        self.records.lock().values().cloned().collect()
    }
}

#[async_trait]
impl PresetStore for MemoryPresetStore {
    async fn load_all(&self) -> Result<Vec<PresetRecord>> {
        Ok(self.records())
    }

    async fn save(&self, record: &PresetRecord) -> Result<()> {
        let _ = self.records.lock().insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &PresetId) -> Result<()> {
        let _ = self.records.lock().shift_remove(id);
        Ok(())
    }
}

enum PersistRequest {
    Save(Box<PresetRecord>),
    Delete(PresetId),
    Flush(oneshot::Sender<()>),
}

/// Serializes preset writes through one background task.
///
/// Requests are queued without waiting, so registry edits never block on I/O.
/// Storage failures are logged; the in-memory registry stays authoritative.
#[derive(Clone)]
pub struct PresetPersister {
    tx: mpsc::UnboundedSender<PersistRequest>,
}

impl PresetPersister {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(store: Arc<dyn PresetStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(tokio::spawn(persist_worker(rx, store)));
        Self { tx }
    }

    /// Queue a save.
    pub fn save(&self, mut record: PresetRecord) {
        record.updated_at = chrono::Utc::now().to_rfc3339();
        self.send(PersistRequest::Save(Box::new(record)));
    }

    /// Queue a delete.
    pub fn delete(&self, id: PresetId) {
        self.send(PersistRequest::Delete(id));
    }

    /// Wait until every request queued so far has been handled.
    pub async fn flush(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PersistRequest::Flush(reply_tx))
            .map_err(|_| RcError::internal("preset persist worker has exited"))?;
        reply_rx
            .await
            .map_err(|_| RcError::internal("preset persist reply dropped"))
    }

    fn send(&self, request: PersistRequest) {
        if self.tx.send(request).is_err() {
            warn!("preset persist worker has exited, change not saved");
        }
    }
}

async fn persist_worker(mut rx: mpsc::UnboundedReceiver<PersistRequest>, store: Arc<dyn PresetStore>) {
    while let Some(request) = rx.recv().await {
        match request {
            PersistRequest::Save(record) => {
                if let Err(e) = store.save(&record).await {
                    warn!(preset = %record.name, error = %e, "failed to save preset");
                }
            }
            PersistRequest::Delete(id) => {
                if let Err(e) = store.delete(&id).await {
                    warn!(preset_id = %id, error = %e, "failed to delete preset file");
                }
            }
            PersistRequest::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rc_core::Value;

    fn record(name: &str) -> PresetRecord {
        let mut field = PresetField::new("intensity", "/Game/L.L:Light.Intensity", FieldKind::Property);
        field.range = vec![RangePoint::new(0.0, 0.0), RangePoint::new(1.0, Value::from("@max"))];
        let _ = field.metadata.insert("units".into(), "lux".into());
        PresetRecord {
            id: PresetId::new(),
            name: name.to_owned(),
            updated_at: String::new(),
            fields: vec![FieldRecord::from_field(&field).unwrap()],
        }
    }

    #[tokio::test]
    async fn fs_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPresetStore::new(dir.path().join("presets"));
        let rec = record("Stage");
        store.save(&rec).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded, vec![rec.clone()]);
        let field = loaded[0].fields[0].clone().into_field().unwrap();
        assert_eq!(field.range[1].output, Value::from("@max"));
        assert_eq!(field.metadata.get("units").map(String::as_str), Some("lux"));

        store.delete(&rec.id).await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
        store.delete(&rec.id).await.unwrap();
    }

    #[tokio::test]
    async fn file_is_pretty_json_named_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPresetStore::new(dir.path());
        let rec = record("Stage");
        store.save(&rec).await.unwrap();

        let text = std::fs::read_to_string(dir.path().join(format!("{}.json", rec.id))).unwrap();
        assert!(text.contains('\n'));
        assert!(text.contains("\"kind\": \"property\""));
    }

    #[test]
    fn unreadable_files_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = record("Good");
        write_atomic(
            &dir.path().join(format!("{}.json", good.id)),
            &serde_json::to_vec_pretty(&good).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let (logs, _guard) = rc_core::logging::capture_logs();
        let loaded = load_dir(dir.path()).unwrap();
        assert_eq!(loaded, vec![good]);
        assert!(logs.has_message("failed to parse preset file"));
    }

    #[test]
    fn atomic_write_replaces_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn missing_dir_is_empty() {
        let store = FsPresetStore::new("/nonexistent/rc-bridge/presets");
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persister_applies_in_order() {
        let store = Arc::new(MemoryPresetStore::new());
        let persister = PresetPersister::spawn(store.clone());
        let mut rec = record("Stage");
        persister.save(rec.clone());
        rec.name = "Renamed".into();
        persister.save(rec.clone());
        persister.flush().await.unwrap();

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Renamed");
        assert!(!records[0].updated_at.is_empty());

        persister.delete(rec.id.clone());
        persister.flush().await.unwrap();
        assert!(store.records().is_empty());
    }
}
