//! The preset registry.
//!
//! Presets are addressed by name or by ID. The preset map sits behind an
//! `RwLock`; each preset's fields sit behind their own `Mutex`, so edits to
//! different presets proceed independently and edits to one preset are
//! serialized. Engine-touching operations take the engine as an argument and
//! must be called from an engine job.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rc_core::{PresetId, RcError, Result, Value};
use rc_engine::executor::{self, ModifyFlags};
use rc_engine::{AliasSource, Handle, Reflection, resolve_engine_path};
use tracing::{debug, info, warn};

use crate::range;
use crate::store::{FieldRecord, PresetPersister, PresetRecord, PresetStore};
use crate::types::{FieldKind, PresetChange, PresetEvent, PresetField, PresetSummary, RangePoint};

/// Callback for registry changes.
pub type PresetListener = Arc<dyn Fn(&PresetEvent) + Send + Sync>;

struct PresetEntry {
    id: PresetId,
    name: String,
    state: Mutex<PresetState>,
}

#[derive(Default)]
struct PresetState {
    fields: IndexMap<String, PresetField>,
    deleted: bool,
}

impl PresetEntry {
    fn record(&self, state: &PresetState) -> Result<PresetRecord> {
        Ok(PresetRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            updated_at: String::new(),
            fields: state.fields.values().map(FieldRecord::from_field).collect::<Result<_>>()?,
        })
    }
}

/// Named collections of exposed fields.
#[derive(Default)]
pub struct PresetRegistry {
    presets: RwLock<IndexMap<PresetId, Arc<PresetEntry>>>,
    persister: Option<PresetPersister>,
    listener: RwLock<Option<PresetListener>>,
}

impl PresetRegistry {
    /// Registry without persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every preset from `store` and save later edits back to it.
    ///
    /// Records that fail to convert are skipped with a warning.
    pub async fn open(store: Arc<dyn PresetStore>) -> Result<Self> {
        let records = store.load_all().await?;
        let mut presets = IndexMap::new();
        for record in records {
            let name = record.name.clone();
            match entry_from_record(record) {
                Ok(entry) if presets.values().any(|e: &Arc<PresetEntry>| e.name == entry.name) => {
                    warn!(preset = %name, "duplicate preset name on disk, skipping");
                }
                Ok(entry) => {
                    let _ = presets.insert(entry.id.clone(), Arc::new(entry));
                }
                Err(e) => warn!(preset = %name, error = %e, "invalid preset record, skipping"),
            }
        }
        info!(count = presets.len(), "preset registry opened");
        Ok(Self {
            presets: RwLock::new(presets),
            persister: Some(PresetPersister::spawn(store)),
            listener: RwLock::new(None),
        })
    }

    /// Install the change listener, replacing any previous one.
    pub fn set_listener(&self, listener: PresetListener) {
        *self.listener.write() = Some(listener);
    }

    /// Wait for queued saves to reach the store.
    pub async fn flush(&self) -> Result<()> {
        match &self.persister {
            Some(p) => p.flush().await,
            None => Ok(()),
        }
    }

    /// Number of presets.
    pub fn len(&self) -> usize {
        self.presets.read().len()
    }

    /// Whether there are no presets.
    pub fn is_empty(&self) -> bool {
        self.presets.read().is_empty()
    }

    /// Create an empty preset. Names are unique.
    pub fn create(&self, name: &str) -> Result<PresetSummary> {
        validate_name("preset", name)?;
        let entry = {
            let mut presets = self.presets.write();
            if presets.values().any(|e| e.name == name) {
                return Err(RcError::AlreadyExists {
                    message: format!("preset '{name}' already exists"),
                });
            }
            let entry = Arc::new(PresetEntry {
                id: PresetId::new(),
                name: name.to_owned(),
                state: Mutex::new(PresetState::default()),
            });
            let _ = presets.insert(entry.id.clone(), Arc::clone(&entry));
            entry
        };
        {
            let state = entry.state.lock();
            self.persist(&entry, &state);
        }
        info!(preset = %name, id = %entry.id, "preset created");
        self.emit(&entry, PresetChange::Created, None);
        Ok(PresetSummary {
            id: entry.id.clone(),
            name: entry.name.clone(),
            field_count: 0,
        })
    }

    /// All presets in creation order.
    pub fn list(&self) -> Vec<PresetSummary> {
        self.presets
            .read()
            .values()
            .map(|e| PresetSummary {
                id: e.id.clone(),
                name: e.name.clone(),
                field_count: e.state.lock().fields.len(),
            })
            .collect()
    }

    /// ID of the preset called `name`.
    pub fn find_by_name(&self, name: &str) -> Option<PresetId> {
        self.presets
            .read()
            .values()
            .find(|e| e.name == name)
            .map(|e| e.id.clone())
    }

    /// Remove a preset.
    pub fn delete(&self, preset: &str) -> Result<PresetId> {
        let entry = {
            let mut presets = self.presets.write();
            let entry = lookup(&presets, preset)?;
            let _ = presets.shift_remove(&entry.id);
            entry
        };
        entry.state.lock().deleted = true;
        if let Some(p) = &self.persister {
            p.delete(entry.id.clone());
        }
        info!(preset = %entry.name, "preset deleted");
        self.emit(&entry, PresetChange::Deleted, None);
        Ok(entry.id.clone())
    }

    /// Expose `path` as `field`. The path must resolve right now.
    pub fn bind(&self, engine: &dyn Reflection, preset: &str, field: &str, path: &str) -> Result<PresetField> {
        validate_name("field", field)?;
        let entry = self.entry(preset)?;
        let bound = {
            let mut state = live_state(&entry)?;
            if state.fields.contains_key(field) {
                return Err(RcError::DuplicateField {
                    preset: entry.name.clone(),
                    field: field.to_owned(),
                });
            }
            let kind = field_kind(engine, path)?;
            let bound = PresetField::new(field, path, kind);
            let _ = state.fields.insert(field.to_owned(), bound.clone());
            self.persist(&entry, &state);
            bound
        };
        debug!(preset = %entry.name, field, path, "field bound");
        self.emit(&entry, PresetChange::FieldBound, Some(field));
        Ok(bound)
    }

    /// Point an existing field at a new path. Metadata is kept; the range
    /// mapping is kept only while the field stays a property.
    pub fn rebind(&self, engine: &dyn Reflection, preset: &str, field: &str, path: &str) -> Result<PresetField> {
        let entry = self.entry(preset)?;
        let rebound = {
            let mut state = live_state(&entry)?;
            let kind = field_kind(engine, path)?;
            let existing = state.fields.get_mut(field).ok_or_else(|| missing_field(&entry, field))?;
            existing.path = path.to_owned();
            existing.kind = kind;
            if kind == FieldKind::Function {
                existing.range.clear();
            }
            let rebound = existing.clone();
            self.persist(&entry, &state);
            rebound
        };
        debug!(preset = %entry.name, field, path, "field rebound");
        self.emit(&entry, PresetChange::FieldRebound, Some(field));
        Ok(rebound)
    }

    /// Remove a field.
    pub fn unbind(&self, preset: &str, field: &str) -> Result<()> {
        let entry = self.entry(preset)?;
        {
            let mut state = live_state(&entry)?;
            if state.fields.shift_remove(field).is_none() {
                return Err(missing_field(&entry, field));
            }
            self.persist(&entry, &state);
        }
        debug!(preset = %entry.name, field, "field unbound");
        self.emit(&entry, PresetChange::FieldUnbound, Some(field));
        Ok(())
    }

    /// Fields in exposure order.
    pub fn list_fields(&self, preset: &str) -> Result<Vec<PresetField>> {
        let entry = self.entry(preset)?;
        let state = live_state(&entry)?;
        Ok(state.fields.values().cloned().collect())
    }

    /// Field names in exposure order.
    pub fn field_names(&self, preset: &str) -> Result<Vec<String>> {
        Ok(self.list_fields(preset)?.into_iter().map(|f| f.name).collect())
    }

    /// One field.
    pub fn field(&self, preset: &str, field: &str) -> Result<PresetField> {
        let entry = self.entry(preset)?;
        let state = live_state(&entry)?;
        state.fields.get(field).cloned().ok_or_else(|| missing_field(&entry, field))
    }

    /// Resolve a field's current binding against the engine.
    pub fn resolve_field(&self, engine: &dyn Reflection, preset: &str, field: &str) -> Result<Handle> {
        let bound = self.field(preset, field)?;
        resolve_engine_path(engine, &bound.path)
    }

    /// Set (`Some`) or remove (`None`) one metadata entry.
    pub fn set_metadata(&self, preset: &str, field: &str, key: &str, value: Option<&str>) -> Result<()> {
        if key.is_empty() {
            return Err(RcError::invalid_request("metadata key must not be empty"));
        }
        let entry = self.entry(preset)?;
        {
            let mut state = live_state(&entry)?;
            let target = state.fields.get_mut(field).ok_or_else(|| missing_field(&entry, field))?;
            match value {
                Some(v) => {
                    let _ = target.metadata.insert(key.to_owned(), v.to_owned());
                }
                None => {
                    let _ = target.metadata.shift_remove(key);
                }
            }
            self.persist(&entry, &state);
        }
        self.emit(&entry, PresetChange::MetadataChanged, Some(field));
        Ok(())
    }

    /// Replace a property field's range mapping. An empty list removes it.
    pub fn set_range_mapping(&self, preset: &str, field: &str, points: Vec<RangePoint>) -> Result<()> {
        range::validate(&points)?;
        let entry = self.entry(preset)?;
        {
            let mut state = live_state(&entry)?;
            let target = state.fields.get_mut(field).ok_or_else(|| missing_field(&entry, field))?;
            if target.kind == FieldKind::Function {
                return Err(RcError::type_mismatch(format!(
                    "field '{field}' is a function and cannot carry a range mapping"
                )));
            }
            target.range = points;
            self.persist(&entry, &state);
        }
        self.emit(&entry, PresetChange::RangeChanged, Some(field));
        Ok(())
    }

    /// Map a protocol input through the field's range and write the result.
    ///
    /// Without a range mapping the input is written as a float. Returns the
    /// value that was written.
    pub fn set_protocol_value(
        &self,
        engine: &mut dyn Reflection,
        preset: &str,
        field: &str,
        input: f64,
        flags: ModifyFlags,
    ) -> Result<Value> {
        let bound = self.field(preset, field)?;
        let value = if bound.range.is_empty() {
            if !input.is_finite() {
                return Err(RcError::invalid_request(format!("protocol input {input} is not finite")));
            }
            Value::Float(input)
        } else {
            range::interpolate(&bound.range, input)?
        };
        let handle = resolve_engine_path(engine, &bound.path)?.into_property()?;
        executor::set(engine, &handle, value, flags)?;
        executor::get(engine, &handle)
    }

    fn entry(&self, key: &str) -> Result<Arc<PresetEntry>> {
        lookup(&self.presets.read(), key)
    }

    fn persist(&self, entry: &PresetEntry, state: &PresetState) {
        let Some(persister) = &self.persister else {
            return;
        };
        match entry.record(state) {
            Ok(record) => persister.save(record),
            Err(e) => warn!(preset = %entry.name, error = %e, "preset not saved"),
        }
    }

    fn emit(&self, entry: &PresetEntry, change: PresetChange, field: Option<&str>) {
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener(&PresetEvent {
                id: entry.id.clone(),
                name: entry.name.clone(),
                change,
                field: field.map(str::to_owned),
            });
        }
    }
}

impl AliasSource for PresetRegistry {
    fn alias(&self, preset: &str, field: &str) -> Option<String> {
        let entry = self.entry(preset).ok()?;
        let state = entry.state.lock();
        if state.deleted {
            return None;
        }
        state.fields.get(field).map(|f| f.path.clone())
    }
}

fn lookup(presets: &IndexMap<PresetId, Arc<PresetEntry>>, key: &str) -> Result<Arc<PresetEntry>> {
    presets
        .get(&PresetId::from(key))
        .or_else(|| presets.values().find(|e| e.name == key))
        .cloned()
        .ok_or_else(|| RcError::NotFound {
            message: format!("preset '{key}' not found"),
            segment: Some(key.to_owned()),
        })
}

fn live_state(entry: &PresetEntry) -> Result<parking_lot::MutexGuard<'_, PresetState>> {
    let state = entry.state.lock();
    if state.deleted {
        return Err(RcError::NotFound {
            message: format!("preset '{}' not found", entry.name),
            segment: Some(entry.name.clone()),
        });
    }
    Ok(state)
}

fn missing_field(entry: &PresetEntry, field: &str) -> RcError {
    RcError::NotFound {
        message: format!("preset '{}' has no field '{field}'", entry.name),
        segment: Some(field.to_owned()),
    }
}

fn field_kind(engine: &dyn Reflection, path: &str) -> Result<FieldKind> {
    match resolve_engine_path(engine, path) {
        Ok(Handle::Property(_)) => Ok(FieldKind::Property),
        Ok(Handle::Function(_)) => Ok(FieldKind::Function),
        Err(e) => Err(RcError::PathUnresolvable {
            path: path.to_owned(),
            reason: e.to_string(),
        }),
    }
}

/// Names become path segments, so they cannot contain path syntax.
fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RcError::invalid_request(format!("{what} name must not be empty")));
    }
    if name.contains(['.', '[', ']', '"']) {
        return Err(RcError::invalid_request(format!(
            "{what} name '{name}' must not contain '.', '[', ']' or '\"'"
        )));
    }
    Ok(())
}

fn entry_from_record(record: PresetRecord) -> Result<PresetEntry> {
    let mut fields = IndexMap::new();
    for field in record.fields {
        let field = field.into_field()?;
        let _ = fields.insert(field.name.clone(), field);
    }
    Ok(PresetEntry {
        id: record.id,
        name: record.name,
        state: Mutex::new(PresetState { fields, deleted: false }),
    })
}
