//! Signatures: reusable lists of member paths that can be stamped onto
//! objects to expose the same fields in a preset for each of them.
//!
//! Signatures live in memory only. Applying one binds ordinary preset
//! fields, and those persist through the preset store as usual.

use indexmap::IndexMap;
use parking_lot::RwLock;
use rc_core::{FieldPath, RcError, Result, SignatureId, Value};
use rc_engine::Reflection;
use rc_engine::resolver::{resolve_member, resolve_object};
use tracing::{debug, info};

use crate::registry::PresetRegistry;

/// One member path a signature exposes.
#[derive(Clone, Debug)]
pub struct SignatureField {
    /// Member path relative to the target object (`Intensity`, `LightColor.R`).
    pub path: String,
    /// Only objects of this class receive the field; `None` matches any class.
    pub supported_class: Option<String>,
    /// Disabled fields are kept but skipped when applying.
    pub enabled: bool,
}

impl SignatureField {
    /// An enabled field for any class.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            supported_class: None,
            enabled: true,
        }
    }

    /// Restrict the field to one class.
    #[must_use]
    pub fn for_class(mut self, class: impl Into<String>) -> Self {
        self.supported_class = Some(class.into());
        self
    }

    /// Description for responses.
    pub fn to_value(&self) -> Value {
        Value::map([
            ("path", Value::from(self.path.as_str())),
            (
                "supportedClass",
                self.supported_class.as_deref().map_or(Value::Null, Value::from),
            ),
            ("enabled", Value::Bool(self.enabled)),
        ])
    }

    fn applies_to(&self, class: &str) -> bool {
        self.supported_class.as_deref().is_none_or(|c| c == class)
    }
}

// Identity ignores `enabled`: re-adding a disabled field is still a duplicate.
impl PartialEq for SignatureField {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.supported_class == other.supported_class
    }
}

impl Eq for SignatureField {}

/// A named set of fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    /// Signature ID.
    pub id: SignatureId,
    /// Unique display name.
    pub name: String,
    /// Fields in insertion order.
    pub fields: Vec<SignatureField>,
    /// Disabled signatures cannot be applied.
    pub enabled: bool,
}

impl Signature {
    /// Description for responses.
    pub fn to_value(&self) -> Value {
        Value::map([
            ("id", Value::from(self.id.as_str())),
            ("name", Value::from(self.name.as_str())),
            ("enabled", Value::Bool(self.enabled)),
            (
                "fields",
                Value::Array(self.fields.iter().map(SignatureField::to_value).collect()),
            ),
        ])
    }
}

/// Outcome of applying a signature.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApplyReport {
    /// Distinct preset fields that now expose a signature path, newly bound
    /// or not.
    pub fields: Vec<String>,
    /// How many of `fields` this call bound.
    pub bound: usize,
}

impl ApplyReport {
    /// Description for responses.
    pub fn to_value(&self) -> Value {
        Value::map([
            (
                "fields",
                Value::Array(self.fields.iter().map(|f| Value::from(f.as_str())).collect()),
            ),
            ("bound", Value::Int(i64::try_from(self.bound).unwrap_or(i64::MAX))),
        ])
    }
}

/// All signatures, addressed by ID or name.
#[derive(Default)]
pub struct SignatureRegistry {
    signatures: RwLock<IndexMap<SignatureId, Signature>>,
}

impl SignatureRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of signatures.
    pub fn len(&self) -> usize {
        self.signatures.read().len()
    }

    /// Whether there are no signatures.
    pub fn is_empty(&self) -> bool {
        self.signatures.read().is_empty()
    }

    /// Create an empty, enabled signature. Names are unique.
    pub fn create(&self, name: &str) -> Result<Signature> {
        if name.trim().is_empty() {
            return Err(RcError::invalid_request("signature name must not be empty"));
        }
        let mut signatures = self.signatures.write();
        if signatures.values().any(|s| s.name == name) {
            return Err(RcError::AlreadyExists {
                message: format!("signature '{name}' already exists"),
            });
        }
        let signature = Signature {
            id: SignatureId::new(),
            name: name.to_owned(),
            fields: Vec::new(),
            enabled: true,
        };
        let _ = signatures.insert(signature.id.clone(), signature.clone());
        info!(signature = %name, id = %signature.id, "signature created");
        Ok(signature)
    }

    /// All signatures in creation order.
    pub fn list(&self) -> Vec<Signature> {
        self.signatures.read().values().cloned().collect()
    }

    /// One signature.
    pub fn get(&self, signature: &str) -> Result<Signature> {
        let signatures = self.signatures.read();
        lookup(&signatures, signature).cloned()
    }

    /// Remove a signature.
    pub fn remove(&self, signature: &str) -> Result<SignatureId> {
        let mut signatures = self.signatures.write();
        let id = lookup(&signatures, signature)?.id.clone();
        let _ = signatures.shift_remove(&id);
        info!(signature = %id, "signature removed");
        Ok(id)
    }

    /// Append fields not already present. Returns how many were added.
    pub fn add_fields(&self, signature: &str, fields: Vec<SignatureField>) -> Result<usize> {
        for field in &fields {
            let _ = FieldPath::parse(&field.path)?;
        }
        let mut signatures = self.signatures.write();
        let entry = lookup_mut(&mut signatures, signature)?;
        let before = entry.fields.len();
        for field in fields {
            if !entry.fields.contains(&field) {
                entry.fields.push(field);
            }
        }
        let added = entry.fields.len() - before;
        debug!(signature = %entry.name, added, "signature fields added");
        Ok(added)
    }

    /// Enable or disable a whole signature.
    pub fn set_enabled(&self, signature: &str, enabled: bool) -> Result<()> {
        let mut signatures = self.signatures.write();
        lookup_mut(&mut signatures, signature)?.enabled = enabled;
        Ok(())
    }

    /// Expose every enabled field of `signature` on each of `objects` in
    /// `preset`.
    ///
    /// Objects that do not resolve and members missing on an object are
    /// skipped. A preset field already bound to the same address is reused
    /// rather than bound twice.
    pub fn apply(
        &self,
        engine: &dyn Reflection,
        presets: &PresetRegistry,
        signature: &str,
        preset: &str,
        objects: &[String],
    ) -> Result<ApplyReport> {
        let signature = self.get(signature)?;
        if !signature.enabled {
            return Err(RcError::invalid_request(format!(
                "signature '{}' is disabled",
                signature.name
            )));
        }
        // fail early on an unknown preset even when nothing would bind
        let mut existing: IndexMap<String, String> = presets
            .list_fields(preset)?
            .into_iter()
            .map(|f| (f.path, f.name))
            .collect();

        let targets: Vec<_> = objects
            .iter()
            .filter_map(|id| match resolve_object(engine, id) {
                Ok(object) => Some((id, object)),
                Err(e) => {
                    debug!(object = %id, error = %e, "signature target skipped");
                    None
                }
            })
            .collect();

        let mut report = ApplyReport::default();
        for field in signature.fields.iter().filter(|f| f.enabled) {
            let Ok(member) = FieldPath::parse(&field.path) else {
                continue;
            };
            for (id, object) in &targets {
                if !field.applies_to(&object.class) || resolve_member(engine, object, &member).is_err() {
                    continue;
                }
                let address = format!("{id}.{}", field.path);
                if let Some(name) = existing.get(&address) {
                    if !report.fields.contains(name) {
                        report.fields.push(name.clone());
                    }
                    continue;
                }
                let name = bind_unique(engine, presets, preset, &field.path, &address)?;
                let _ = existing.insert(address, name.clone());
                report.fields.push(name);
                report.bound += 1;
            }
        }
        info!(
            signature = %signature.name,
            preset,
            bound = report.bound,
            matched = report.fields.len(),
            "signature applied"
        );
        Ok(report)
    }
}

/// Bind `address` under a name derived from `member`, adding `_2`, `_3`, ...
/// until the name is free.
fn bind_unique(
    engine: &dyn Reflection,
    presets: &PresetRegistry,
    preset: &str,
    member: &str,
    address: &str,
) -> Result<String> {
    let base = field_name_for(member);
    let mut suffix = 1;
    loop {
        let name = if suffix == 1 {
            base.clone()
        } else {
            format!("{base}_{suffix}")
        };
        match presets.bind(engine, preset, &name, address) {
            Ok(field) => return Ok(field.name),
            Err(RcError::DuplicateField { .. }) => suffix += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Field names cannot carry path syntax.
fn field_name_for(member: &str) -> String {
    let name: String = member
        .chars()
        .filter(|c| *c != '"')
        .map(|c| if matches!(c, '.' | '[' | ']') { '_' } else { c })
        .collect();
    let name = name.trim_matches('_');
    if name.is_empty() { "Field".to_owned() } else { name.to_owned() }
}

fn lookup<'a>(signatures: &'a IndexMap<SignatureId, Signature>, key: &str) -> Result<&'a Signature> {
    signatures
        .get(&SignatureId::from(key))
        .or_else(|| signatures.values().find(|s| s.name == key))
        .ok_or_else(|| missing(key))
}

fn lookup_mut<'a>(signatures: &'a mut IndexMap<SignatureId, Signature>, key: &str) -> Result<&'a mut Signature> {
    let id = lookup(signatures, key)?.id.clone();
    signatures.get_mut(&id).ok_or_else(|| missing(key))
}

fn missing(key: &str) -> RcError {
    RcError::NotFound {
        message: format!("signature '{key}' not found"),
        segment: Some(key.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rc_core::{PropertyDesc, TypeDesc};
    use rc_engine::SceneGraph;

    const LIGHT_1: &str = "/Game/Main.Main:Light_1";
    const LIGHT_2: &str = "/Game/Main.Main:Light_2";
    const CAMERA: &str = "/Game/Main.Main:Camera";

    fn scene() -> SceneGraph {
        let mut scene = SceneGraph::new();
        for path in [LIGHT_1, LIGHT_2] {
            let _ = scene
                .spawn("PointLight", path)
                .property(PropertyDesc::new("Intensity", TypeDesc::Float), Value::Float(1.0))
                .property(
                    PropertyDesc::new(
                        "LightColor",
                        TypeDesc::structure("LinearColor", [("R", TypeDesc::Float), ("G", TypeDesc::Float)]),
                    ),
                    Value::map([("R", Value::Float(1.0)), ("G", Value::Float(0.5))]),
                )
                .finish();
        }
        let _ = scene
            .spawn("CameraActor", CAMERA)
            .property(PropertyDesc::new("Intensity", TypeDesc::Float), Value::Float(0.0))
            .property(PropertyDesc::new("FocalLength", TypeDesc::Float), Value::Float(35.0))
            .finish();
        scene
    }

    fn objects(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| (*p).to_owned()).collect()
    }

    #[test]
    fn create_rejects_duplicate_names() {
        let signatures = SignatureRegistry::new();
        let _ = signatures.create("Lights").unwrap();
        assert_matches!(signatures.create("Lights"), Err(RcError::AlreadyExists { .. }));
        assert_matches!(signatures.create(" "), Err(RcError::InvalidRequest { .. }));
        assert_eq!(signatures.len(), 1);
    }

    #[test]
    fn lookup_by_id_or_name() {
        let signatures = SignatureRegistry::new();
        let created = signatures.create("Lights").unwrap();
        assert_eq!(signatures.get(created.id.as_str()).unwrap().name, "Lights");
        assert_eq!(signatures.get("Lights").unwrap().id, created.id);
        assert_matches!(signatures.get("Cameras"), Err(RcError::NotFound { .. }));

        let _ = signatures.remove("Lights").unwrap();
        assert!(signatures.is_empty());
        assert_matches!(signatures.remove("Lights"), Err(RcError::NotFound { .. }));
    }

    #[test]
    fn add_fields_skips_duplicates() {
        let signatures = SignatureRegistry::new();
        let _ = signatures.create("Lights").unwrap();
        let added = signatures
            .add_fields(
                "Lights",
                vec![
                    SignatureField::new("Intensity"),
                    SignatureField::new("Intensity"),
                    SignatureField::new("Intensity").for_class("PointLight"),
                ],
            )
            .unwrap();
        assert_eq!(added, 2);

        let mut disabled = SignatureField::new("Intensity");
        disabled.enabled = false;
        assert_eq!(signatures.add_fields("Lights", vec![disabled]).unwrap(), 0);
        assert_eq!(signatures.get("Lights").unwrap().fields.len(), 2);
    }

    #[test]
    fn add_fields_validates_paths() {
        let signatures = SignatureRegistry::new();
        let _ = signatures.create("Lights").unwrap();
        let err = signatures
            .add_fields("Lights", vec![SignatureField::new("Intensity"), SignatureField::new("Tags[")])
            .unwrap_err();
        assert_matches!(err, RcError::InvalidRequest { .. });
        assert!(signatures.get("Lights").unwrap().fields.is_empty());
    }

    #[test]
    fn apply_binds_each_object() {
        let scene = scene();
        let presets = PresetRegistry::new();
        let _ = presets.create("Stage").unwrap();
        let signatures = SignatureRegistry::new();
        let _ = signatures.create("Lights").unwrap();
        let _ = signatures
            .add_fields(
                "Lights",
                vec![SignatureField::new("Intensity"), SignatureField::new("LightColor.R")],
            )
            .unwrap();

        let report = signatures
            .apply(&scene, &presets, "Lights", "Stage", &objects(&[LIGHT_1, LIGHT_2]))
            .unwrap();
        assert_eq!(report.bound, 4);
        assert_eq!(
            report.fields,
            ["Intensity", "Intensity_2", "LightColor_R", "LightColor_R_2"]
        );
        assert_eq!(
            presets.field("Stage", "Intensity_2").unwrap().path,
            format!("{LIGHT_2}.Intensity")
        );
        assert_eq!(
            presets.field("Stage", "LightColor_R").unwrap().path,
            format!("{LIGHT_1}.LightColor.R")
        );
    }

    #[test]
    fn apply_twice_reuses_fields() {
        let scene = scene();
        let presets = PresetRegistry::new();
        let _ = presets.create("Stage").unwrap();
        let signatures = SignatureRegistry::new();
        let _ = signatures.create("Lights").unwrap();
        let _ = signatures.add_fields("Lights", vec![SignatureField::new("Intensity")]).unwrap();

        let first = signatures
            .apply(&scene, &presets, "Lights", "Stage", &objects(&[LIGHT_1]))
            .unwrap();
        let second = signatures
            .apply(&scene, &presets, "Lights", "Stage", &objects(&[LIGHT_1]))
            .unwrap();
        assert_eq!(first.bound, 1);
        assert_eq!(second.bound, 0);
        assert_eq!(second.fields, ["Intensity"]);
        assert_eq!(presets.field_names("Stage").unwrap(), ["Intensity"]);
    }

    #[test]
    fn overlapping_fields_report_once() {
        let scene = scene();
        let presets = PresetRegistry::new();
        let _ = presets.create("Stage").unwrap();
        let signatures = SignatureRegistry::new();
        let _ = signatures.create("Lights").unwrap();
        let _ = signatures
            .add_fields(
                "Lights",
                vec![
                    SignatureField::new("Intensity"),
                    SignatureField::new("Intensity").for_class("PointLight"),
                ],
            )
            .unwrap();

        let report = signatures
            .apply(&scene, &presets, "Lights", "Stage", &objects(&[LIGHT_1]))
            .unwrap();
        assert_eq!(report.bound, 1);
        assert_eq!(report.fields, ["Intensity"]);
    }

    #[test]
    fn apply_respects_class_and_enabled() {
        let scene = scene();
        let presets = PresetRegistry::new();
        let _ = presets.create("Stage").unwrap();
        let signatures = SignatureRegistry::new();
        let _ = signatures.create("Lights").unwrap();
        let mut focal = SignatureField::new("FocalLength");
        focal.enabled = false;
        let _ = signatures
            .add_fields(
                "Lights",
                vec![SignatureField::new("Intensity").for_class("PointLight"), focal],
            )
            .unwrap();

        let report = signatures
            .apply(&scene, &presets, "Lights", "Stage", &objects(&[LIGHT_1, CAMERA]))
            .unwrap();
        assert_eq!(report.fields, ["Intensity"]);
        assert_eq!(presets.field("Stage", "Intensity").unwrap().path, format!("{LIGHT_1}.Intensity"));

        signatures.set_enabled("Lights", false).unwrap();
        assert_matches!(
            signatures.apply(&scene, &presets, "Lights", "Stage", &objects(&[LIGHT_1])),
            Err(RcError::InvalidRequest { .. })
        );
    }

    #[test]
    fn apply_skips_missing_objects_and_members() {
        let scene = scene();
        let presets = PresetRegistry::new();
        let _ = presets.create("Stage").unwrap();
        let signatures = SignatureRegistry::new();
        let _ = signatures.create("Lights").unwrap();
        let _ = signatures
            .add_fields(
                "Lights",
                vec![SignatureField::new("LightColor.R"), SignatureField::new("LightColor.B")],
            )
            .unwrap();

        let report = signatures
            .apply(
                &scene,
                &presets,
                "Lights",
                "Stage",
                &objects(&["/Game/Main.Main:Nothing", CAMERA, LIGHT_2]),
            )
            .unwrap();
        assert_eq!(report.bound, 1);
        assert_eq!(presets.field_names("Stage").unwrap(), ["LightColor_R"]);
    }

    #[test]
    fn apply_to_unknown_preset_fails() {
        let scene = scene();
        let presets = PresetRegistry::new();
        let signatures = SignatureRegistry::new();
        let _ = signatures.create("Lights").unwrap();
        assert_matches!(
            signatures.apply(&scene, &presets, "Lights", "Stage", &objects(&[LIGHT_1])),
            Err(RcError::NotFound { .. })
        );
    }

    #[test]
    fn generated_names_are_valid_field_names() {
        assert_eq!(field_name_for("Intensity"), "Intensity");
        assert_eq!(field_name_for("LightColor.R"), "LightColor_R");
        assert_eq!(field_name_for("Tags[0]"), "Tags_0");
        assert_eq!(field_name_for("Settings[\"key\"].Value"), "Settings_key__Value");
    }
}
