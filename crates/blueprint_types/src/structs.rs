// User-defined structures
//
// Structs are typed data shapes used by blueprint variables and pins. They are
// compiled ahead of the blueprints that use them, and broadcast their status
// changes to subscribers.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{PinType, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Struct Definitions
// ─────────────────────────────────────────────────────────────────────────────

/// A field within a struct definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: PinType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl StructField {
    pub fn new(name: impl Into<String>, field_type: PinType) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: None,
            description: None,
        }
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Compile status of a struct
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructStatus {
    #[default]
    Dirty,
    UpToDate,
    Error,
}

/// A struct definition - a named collection of typed fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDef {
    /// Unique identifier (e.g., "damage-info")
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<StructField>,
    #[serde(skip)]
    pub status: StructStatus,
}

impl StructDef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            fields: Vec::new(),
            status: StructStatus::Dirty,
        }
    }

    pub fn with_field(mut self, field: StructField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check field names are unique, field types are storable and every
    /// default matches its field's type
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                errors.push(format!("Duplicate field: {}", field.name));
            }
            if field.field_type.is_exec() {
                errors.push(format!("Field '{}': exec type cannot hold a value", field.name));
            }
            if let Some(default) = &field.default {
                if let Err(e) = Value::from_json_typed(default, &field.field_type) {
                    errors.push(format!("Field '{}': {}", field.name, e));
                }
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Create a default instance of this struct
    pub fn create_default_instance(&self) -> Value {
        let fields: BTreeMap<String, Value> = self
            .fields
            .iter()
            .map(|field| {
                let value = field
                    .default
                    .as_ref()
                    .and_then(|d| Value::from_json_typed(d, &field.field_type).ok())
                    .unwrap_or_else(|| Value::default_for(&field.field_type));
                (field.name.clone(), value)
            })
            .collect();
        Value::Struct {
            type_id: Some(self.id.clone()),
            fields,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Struct Registry Events
// ─────────────────────────────────────────────────────────────────────────────

/// Events broadcast when the struct registry changes
#[derive(Debug, Clone, PartialEq)]
pub enum StructChange {
    Added(String),
    Updated(String),
    /// A compile pass changed the struct's status
    StatusChanged { struct_id: String, status: StructStatus },
}

/// Errors that can occur when working with the struct registry
#[derive(Debug, Clone, thiserror::Error)]
pub enum StructRegistryError {
    #[error("Struct not found: {0}")]
    StructNotFound(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Struct Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Registry of user-defined structs, shared between the compiler and the host
pub struct StructRegistry {
    structs: DashMap<String, StructDef>,
    change_tx: broadcast::Sender<StructChange>,
}

impl Default for StructRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StructRegistry {
    pub fn new() -> Self {
        let (change_tx, _) = broadcast::channel(256);
        Self {
            structs: DashMap::new(),
            change_tx,
        }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Subscribe to registry changes
    pub fn subscribe(&self) -> broadcast::Receiver<StructChange> {
        self.change_tx.subscribe()
    }

    /// Register or replace a struct; the stored copy is marked dirty
    pub fn register_or_update(&self, mut def: StructDef) {
        def.status = StructStatus::Dirty;
        let id = def.id.clone();
        let is_update = self.structs.contains_key(&id);
        self.structs.insert(id.clone(), def);

        // Ignore send errors - means no subscribers
        let change = if is_update {
            StructChange::Updated(id)
        } else {
            StructChange::Added(id)
        };
        let _ = self.change_tx.send(change);
    }

    pub fn get(&self, id: &str) -> Option<StructDef> {
        self.structs.get(id).map(|r| r.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.structs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.structs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }

    /// Ids of every struct awaiting compilation, sorted
    pub fn dirty_structs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .structs
            .iter()
            .filter(|r| r.value().status == StructStatus::Dirty)
            .map(|r| r.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Record the result of compiling a struct
    pub fn set_status(&self, id: &str, status: StructStatus) -> Result<(), StructRegistryError> {
        let mut entry = self
            .structs
            .get_mut(id)
            .ok_or_else(|| StructRegistryError::StructNotFound(id.to_string()))?;
        entry.status = status;
        drop(entry);

        let _ = self.change_tx.send(StructChange::StatusChanged {
            struct_id: id.to_string(),
            status,
        });
        Ok(())
    }

    /// Create a default instance of a struct
    pub fn create_default_instance(&self, id: &str) -> Option<Value> {
        self.structs.get(id).map(|def| def.create_default_instance())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn damage_info() -> StructDef {
        StructDef::new("damage-info", "Damage Info")
            .with_field(StructField::new("amount", PinType::Real).with_default(serde_json::json!(10.0)))
            .with_field(StructField::new("lethal", PinType::Boolean))
    }

    #[test]
    fn test_struct_def_parsing() {
        let json = r#"{
            "id": "damage-info",
            "name": "Damage Info",
            "fields": [
                { "name": "amount", "type": { "type": "Real" }, "default": 10.0 },
                { "name": "lethal", "type": { "type": "Boolean" } }
            ]
        }"#;

        let def: StructDef = serde_json::from_str(json).unwrap();
        assert_eq!(def.fields.len(), 2);
        assert_eq!(def.status, StructStatus::Dirty);
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let def = StructDef::new("bad", "Bad")
            .with_field(StructField::new("a", PinType::Boolean).with_default(serde_json::json!("x")))
            .with_field(StructField::new("a", PinType::Exec));

        let errors = def.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_default_instance() {
        let instance = damage_info().create_default_instance();
        assert_eq!(instance.get("amount"), Some(&Value::Float(10.0)));
        assert_eq!(instance.get("lethal"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_registry_status_flow() {
        let registry = StructRegistry::new();
        let mut rx = registry.subscribe();

        registry.register_or_update(damage_info());
        assert_eq!(registry.dirty_structs(), vec!["damage-info".to_string()]);
        assert_eq!(rx.try_recv().unwrap(), StructChange::Added("damage-info".into()));

        registry.set_status("damage-info", StructStatus::UpToDate).unwrap();
        assert!(registry.dirty_structs().is_empty());
        assert!(matches!(
            rx.try_recv().unwrap(),
            StructChange::StatusChanged { status: StructStatus::UpToDate, .. }
        ));

        assert!(matches!(
            registry.set_status("missing", StructStatus::Error),
            Err(StructRegistryError::StructNotFound(_))
        ));
    }
}
