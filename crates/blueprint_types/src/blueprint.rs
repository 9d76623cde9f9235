// Blueprint assets
//
// A blueprint is the editable script asset. It is stored as JSON and carries
// transient compile/regeneration state that is never serialized.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ClassId, Graph, LinkerId, NodeKind, ObjectId, PinType, PropertyFlags};

/// Name of the function graph holding the user construction script
pub const USER_CONSTRUCTION_SCRIPT: &str = "UserConstructionScript";

// ─────────────────────────────────────────────────────────────────────────────
// Asset Enums
// ─────────────────────────────────────────────────────────────────────────────

/// What kind of asset this is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlueprintType {
    #[default]
    Normal,
    /// Holds macros only; never produces an executable class
    MacroLibrary,
    /// Declares an interface other blueprints implement
    Interface,
}

/// Compile status of a blueprint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlueprintStatus {
    /// Still being set up; nothing triggers compilation
    BeingCreated,
    /// Edited since the last full compile
    #[default]
    Dirty,
    UpToDate,
    /// Last compile or conformance pass failed
    Error,
}

/// How a regeneration pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegenerationOutcome {
    /// A new class was compiled and integrated
    Success,
    /// Nothing to do, or the asset never produces a class (data-only, macro library)
    NoOp,
    /// Conformance or compilation failed; callers keep the previous class
    Fail,
}

/// Where a blueprint is in the class regeneration state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RegenerationPhase {
    #[default]
    NotRegenerating,
    Preloading,
    Conforming,
    Compiling,
    PatchingLinkerReferences,
    MigratingDefaults,
    Done(RegenerationOutcome),
}

impl RegenerationPhase {
    /// Whether a regeneration pass is running
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            RegenerationPhase::NotRegenerating | RegenerationPhase::Done(_)
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Asset Members
// ─────────────────────────────────────────────────────────────────────────────

/// Member variable declared by a blueprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDef {
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: PinType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub flags: PropertyFlags,
    /// Stable identity across renames
    #[serde(default = "Uuid::new_v4")]
    pub guid: Uuid,
}

impl VariableDef {
    pub fn new(name: impl Into<String>, var_type: PinType) -> Self {
        Self {
            name: name.into(),
            var_type,
            default: None,
            category: None,
            flags: PropertyFlags::EDIT | PropertyFlags::BLUEPRINT_VISIBLE,
            guid: Uuid::new_v4(),
        }
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_flags(mut self, flags: PropertyFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// An interface implemented by a blueprint, with the graphs implementing it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceDescription {
    /// Interface class name
    pub interface: String,
    #[serde(default)]
    pub graphs: Vec<Graph>,
}

impl InterfaceDescription {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            graphs: Vec::new(),
        }
    }
}

/// Template for a default subobject (component) created on the CDO
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentTemplate {
    pub name: String,
    /// Component class name
    pub class: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl ComponentTemplate {
    pub fn new(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }
}

/// Timeline template owned by a blueprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineTemplate {
    pub name: String,
    #[serde(default)]
    pub length: f32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Transient State
// ─────────────────────────────────────────────────────────────────────────────

/// Compile and regeneration bookkeeping that lives only in memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlueprintState {
    pub regeneration: RegenerationPhase,
    /// Set when the asset was loaded and still needs its class regenerated
    pub recompile_on_load: bool,
    pub has_been_regenerated: bool,
    /// Set while the compiler is running on this asset
    pub being_compiled: bool,
    /// Set while a load-time regeneration is running
    pub is_regenerating_on_load: bool,
    pub skeleton_class: Option<ClassId>,
    pub generated_class: Option<ClassId>,
    /// Whether the full class CDO, not the skeleton CDO, holds the true defaults
    pub generated_class_authoritative: bool,
    /// The real previous default object when the skeleton CDO was handed in
    pub innermost_previous_cdo: Option<ObjectId>,
    pub linker: Option<LinkerId>,
    /// Graphs as compiled, kept when the compile asked for intermediate products
    pub intermediate_graphs: Vec<Graph>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Blueprint
// ─────────────────────────────────────────────────────────────────────────────

/// Complete blueprint asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    /// Unique identifier
    pub id: String,
    /// Name; generated classes are named after it
    pub name: String,
    /// Parent class name
    pub parent_class: String,
    #[serde(default)]
    pub blueprint_type: BlueprintType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub variables: Vec<VariableDef>,
    #[serde(default)]
    pub function_graphs: Vec<Graph>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub macro_graphs: Vec<Graph>,
    /// Event graph pages
    #[serde(default)]
    pub event_graphs: Vec<Graph>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delegate_signature_graphs: Vec<Graph>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implemented_interfaces: Vec<InterfaceDescription>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentTemplate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timelines: Vec<TimelineTemplate>,
    #[serde(skip)]
    pub status: BlueprintStatus,
    #[serde(skip)]
    pub state: BlueprintState,
}

impl Blueprint {
    /// Create a blueprint with an empty construction script and event graph
    pub fn new(id: &str, name: &str, parent_class: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            parent_class: parent_class.to_string(),
            blueprint_type: BlueprintType::Normal,
            description: None,
            variables: Vec::new(),
            function_graphs: vec![Graph::function(USER_CONSTRUCTION_SCRIPT, vec![], vec![])],
            macro_graphs: Vec::new(),
            event_graphs: vec![Graph::new("EventGraph")],
            delegate_signature_graphs: Vec::new(),
            implemented_interfaces: Vec::new(),
            components: Vec::new(),
            timelines: Vec::new(),
            status: BlueprintStatus::Dirty,
            state: BlueprintState::default(),
        }
    }

    pub fn with_type(mut self, blueprint_type: BlueprintType) -> Self {
        self.blueprint_type = blueprint_type;
        self
    }

    pub fn with_variable(mut self, variable: VariableDef) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn with_function_graph(mut self, graph: Graph) -> Self {
        self.function_graphs.push(graph);
        self
    }

    pub fn with_event_graph(mut self, graph: Graph) -> Self {
        self.event_graphs.push(graph);
        self
    }

    pub fn with_interface(mut self, interface: InterfaceDescription) -> Self {
        self.implemented_interfaces.push(interface);
        self
    }

    pub fn with_component(mut self, component: ComponentTemplate) -> Self {
        self.components.push(component);
        self
    }

    /// Name of the full generated class
    pub fn generated_class_name(&self) -> String {
        format!("{}_C", self.name)
    }

    /// Name of the skeleton class
    pub fn skeleton_class_name(&self) -> String {
        format!("SKEL_{}_C", self.name)
    }

    pub fn is_interface(&self) -> bool {
        self.blueprint_type == BlueprintType::Interface
    }

    pub fn is_macro_library(&self) -> bool {
        self.blueprint_type == BlueprintType::MacroLibrary
    }

    /// Whether the asset only overrides default values and needs no compile
    pub fn is_data_only(&self) -> bool {
        if self.is_interface() {
            return false;
        }
        if !self.variables.is_empty()
            || self.function_graphs.len() > 1
            || !self.macro_graphs.is_empty()
            || !self.delegate_signature_graphs.is_empty()
            || !self.components.is_empty()
            || !self.timelines.is_empty()
            || !self.implemented_interfaces.is_empty()
        {
            return false;
        }
        if let [construction_script] = self.function_graphs.as_slice() {
            if construction_script.nodes.len() > 1 {
                return false;
            }
        }
        match self.event_graphs.as_slice() {
            [] => true,
            [page] => page.nodes.is_empty(),
            _ => false,
        }
    }

    /// Every graph owned by the asset, interface graphs included
    pub fn all_graphs(&self) -> impl Iterator<Item = &Graph> {
        self.function_graphs
            .iter()
            .chain(self.macro_graphs.iter())
            .chain(self.event_graphs.iter())
            .chain(self.delegate_signature_graphs.iter())
            .chain(self.implemented_interfaces.iter().flat_map(|i| i.graphs.iter()))
    }

    /// Mutable access to every graph owned by the asset
    pub fn all_graphs_mut(&mut self) -> impl Iterator<Item = &mut Graph> {
        self.function_graphs
            .iter_mut()
            .chain(self.macro_graphs.iter_mut())
            .chain(self.event_graphs.iter_mut())
            .chain(self.delegate_signature_graphs.iter_mut())
            .chain(
                self.implemented_interfaces
                    .iter_mut()
                    .flat_map(|i| i.graphs.iter_mut()),
            )
    }

    pub fn function_graph(&self, name: &str) -> Option<&Graph> {
        self.function_graphs.iter().find(|g| g.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDef> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Whether the asset has an event node (of any sort) with the given name
    pub fn has_event(&self, name: &str) -> bool {
        self.event_graphs
            .iter()
            .flat_map(|g| g.nodes.iter())
            .any(|n| n.event_name() == Some(name))
    }

    /// Class names this asset refers to from its graphs, variables and interfaces
    pub fn referenced_class_names(&self) -> Vec<String> {
        let mut names = vec![self.parent_class.clone()];
        let mut push = |name: &str| {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        };
        for interface in &self.implemented_interfaces {
            push(&interface.interface);
        }
        for variable in &self.variables {
            if let Some(class) = variable.var_type.referenced_class() {
                push(class);
            }
        }
        for component in &self.components {
            push(&component.class);
        }
        for node in self.all_graphs().flat_map(|g| g.nodes.iter()) {
            match &node.kind {
                NodeKind::CallFunction { target } | NodeKind::CallParentFunction { target } => {
                    if let Some(owner) = &target.member_parent {
                        push(owner);
                    }
                }
                NodeKind::Event {
                    signature_class: Some(owner),
                    ..
                } => push(owner),
                _ => {}
            }
        }
        names
    }

    /// Atomically enter the regeneration state machine.
    ///
    /// Returns `false` if a regeneration pass is already running on this
    /// asset, which makes the phase a non-reentrant lock.
    pub fn try_begin_regeneration(&mut self) -> bool {
        if self.state.regeneration.is_active() {
            return false;
        }
        self.state.regeneration = RegenerationPhase::Preloading;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Node, NodeKind};

    #[test]
    fn test_blueprint_json_roundtrip() {
        let json = r#"{
            "id": "bp-door",
            "name": "Door",
            "parent_class": "Actor",
            "variables": [
                { "name": "OpenAngle", "type": { "type": "Real" }, "default": 90.0 }
            ],
            "event_graphs": [
                { "name": "EventGraph", "nodes": [
                    { "id": "n1", "kind": "event", "event_name": "ReceiveBeginPlay",
                      "signature_class": "Actor", "override_function": true }
                ] }
            ]
        }"#;

        let bp: Blueprint = serde_json::from_str(json).unwrap();
        assert_eq!(bp.name, "Door");
        assert_eq!(bp.status, BlueprintStatus::Dirty);
        assert_eq!(bp.variables.len(), 1);
        assert!(bp.has_event("ReceiveBeginPlay"));

        let json2 = serde_json::to_string(&bp).unwrap();
        let bp2: Blueprint = serde_json::from_str(&json2).unwrap();
        assert_eq!(bp.variables[0].guid, bp2.variables[0].guid);
    }

    #[test]
    fn test_new_blueprint_is_data_only() {
        let bp = Blueprint::new("bp", "Crate", "Actor");
        assert!(bp.is_data_only());
        assert_eq!(bp.generated_class_name(), "Crate_C");
        assert_eq!(bp.skeleton_class_name(), "SKEL_Crate_C");
    }

    #[test]
    fn test_data_only_rules() {
        let with_var = Blueprint::new("bp", "A", "Actor")
            .with_variable(VariableDef::new("Health", PinType::Real));
        assert!(!with_var.is_data_only());

        let mut with_event = Blueprint::new("bp", "B", "Actor");
        with_event.event_graphs[0]
            .nodes
            .push(Node::override_event("ev", "ReceiveTick", "Actor"));
        assert!(!with_event.is_data_only());

        let interface = Blueprint::new("bp", "I", "Interface").with_type(BlueprintType::Interface);
        assert!(!interface.is_data_only());

        let mut busy_construction = Blueprint::new("bp", "C", "Actor");
        busy_construction.function_graphs[0].nodes.push(Node::new(
            "extra",
            NodeKind::Generic {
                node_type: "Print".into(),
                config: serde_json::Value::Null,
            },
        ));
        assert!(!busy_construction.is_data_only());
    }

    #[test]
    fn test_regeneration_lock_is_not_reentrant() {
        let mut bp = Blueprint::new("bp", "A", "Actor");
        assert!(bp.try_begin_regeneration());
        assert!(!bp.try_begin_regeneration());

        bp.state.regeneration = RegenerationPhase::Done(RegenerationOutcome::Success);
        assert!(bp.try_begin_regeneration());
    }

    #[test]
    fn test_referenced_class_names() {
        let bp = Blueprint::new("bp", "A", "Actor")
            .with_interface(InterfaceDescription::new("Damageable"))
            .with_component(ComponentTemplate::new("Mesh", "MeshComponent"))
            .with_variable(VariableDef::new("Target", PinType::object("Pawn")));
        let names = bp.referenced_class_names();
        assert_eq!(names, vec!["Actor", "Damageable", "Pawn", "MeshComponent"]);
    }
}
