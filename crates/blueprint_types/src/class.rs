//! Class definitions and the class registry
//!
//! Classes are the compiled, reflected side of the system. Native classes are
//! registered by the host; generated classes are produced by the compiler from
//! blueprint assets. A regenerated class never mutates the old one in place:
//! the old class is retired (renamed and flagged) and a fresh class takes over
//! its name.

use std::collections::{BTreeMap, HashMap};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{ClassId, FunctionParam, ObjectId, PinType, Script};

// ─────────────────────────────────────────────────────────────────────────────
// Flags
// ─────────────────────────────────────────────────────────────────────────────

bitflags! {
    /// Class-level flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ClassFlags: u32 {
        const NATIVE = 1 << 0;
        const ABSTRACT = 1 << 1;
        const INTERFACE = 1 << 2;
        const CONST = 1 << 3;
        const CONFIG = 1 << 4;
        const HAS_INSTANCED_REFERENCE = 1 << 5;
        const DEFAULT_TO_INSTANCED = 1 << 6;
        const NOT_PLACEABLE = 1 << 7;
        /// Signature-only class produced by a skeleton compile
        const SKELETON = 1 << 8;
        const COMPILED_FROM_BLUEPRINT = 1 << 9;
        /// Retired class; a regenerated class has replaced it
        const NEWER_VERSION_EXISTS = 1 << 10;

        /// Flags a script class inherits from its parent
        const SCRIPT_INHERIT = Self::CONST.bits()
            | Self::CONFIG.bits()
            | Self::HAS_INSTANCED_REFERENCE.bits()
            | Self::DEFAULT_TO_INSTANCED.bits()
            | Self::NOT_PLACEABLE.bits();
    }
}

impl Default for ClassFlags {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Property-level flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct PropertyFlags: u32 {
        const EDIT = 1 << 0;
        const BLUEPRINT_VISIBLE = 1 << 1;
        /// Never copied between objects
        const TRANSIENT = 1 << 2;
        /// Only meaningful on instances; never copied between default objects
        const INSTANCE_ONLY = 1 << 3;
        /// Holds a subobject owned by the containing object
        const INSTANCED_REFERENCE = 1 << 4;
        const CONFIG = 1 << 5;
    }
}

impl Default for PropertyFlags {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Function-level flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FunctionFlags: u32 {
        const NATIVE = 1 << 0;
        /// Overridable by blueprints
        const BLUEPRINT_EVENT = 1 << 1;
        const BLUEPRINT_CALLABLE = 1 << 2;
        const FINAL = 1 << 3;
        const STATIC = 1 << 4;
        const PURE = 1 << 5;
        const CONST = 1 << 6;
        /// Declared by a custom event node rather than inherited
        const CUSTOM_EVENT = 1 << 7;
    }
}

impl Default for FunctionFlags {
    fn default() -> Self {
        Self::empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Members
// ─────────────────────────────────────────────────────────────────────────────

/// A reflected property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: PinType,
    #[serde(default)]
    pub flags: PropertyFlags,
}

impl PropertyDef {
    pub fn new(name: impl Into<String>, ty: PinType) -> Self {
        Self {
            name: name.into(),
            ty,
            flags: PropertyFlags::EDIT | PropertyFlags::BLUEPRINT_VISIBLE,
        }
    }

    pub fn with_flags(mut self, flags: PropertyFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// A reflected function: signature plus optional compiled body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default)]
    pub params: Vec<FunctionParam>,
    #[serde(default)]
    pub outputs: Vec<FunctionParam>,
    #[serde(default)]
    pub flags: FunctionFlags,
    /// Compiled body; `None` on skeleton classes and native functions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<Script>,
}

impl FunctionDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            outputs: Vec::new(),
            flags: FunctionFlags::BLUEPRINT_CALLABLE,
            script: None,
        }
    }

    /// An overridable event with no return values
    pub fn event(name: impl Into<String>) -> Self {
        Self::new(name).with_flags(FunctionFlags::BLUEPRINT_EVENT)
    }

    pub fn with_flags(mut self, flags: FunctionFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_param(mut self, param: FunctionParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_output(mut self, output: FunctionParam) -> Self {
        self.outputs.push(output);
        self
    }

    /// Whether a derived blueprint may provide its own implementation
    pub fn can_override(&self) -> bool {
        self.flags.contains(FunctionFlags::BLUEPRINT_EVENT)
            && !self.flags.intersects(FunctionFlags::FINAL | FunctionFlags::STATIC)
    }

    /// Whether an override may be expressed as an event node instead of a graph
    pub fn can_be_placed_as_event(&self) -> bool {
        self.can_override()
            && self.outputs.is_empty()
            && !self.flags.contains(FunctionFlags::CONST)
    }

    /// Whether the two functions have the same parameter and return shapes
    pub fn signature_matches(&self, other: &FunctionDef) -> bool {
        fn shape(params: &[FunctionParam]) -> Vec<(&str, &PinType)> {
            params.iter().map(|p| (p.name.as_str(), &p.param_type)).collect()
        }
        shape(&self.params) == shape(&other.params) && shape(&self.outputs) == shape(&other.outputs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Class Definition
// ─────────────────────────────────────────────────────────────────────────────

/// A class in the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    /// Assigned by the registry on registration
    pub id: ClassId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_class: Option<ClassId>,
    #[serde(default)]
    pub flags: ClassFlags,
    /// Interfaces implemented directly by this class
    #[serde(default)]
    pub interfaces: Vec<ClassId>,
    /// Properties declared by this class (inherited ones excluded)
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    /// Functions declared by this class (inherited ones excluded)
    #[serde(default)]
    pub functions: Vec<FunctionDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_object: Option<ObjectId>,
    /// Blueprint asset this class was compiled from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_by: Option<String>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ClassId(0),
            name: name.into(),
            super_class: None,
            flags: ClassFlags::empty(),
            interfaces: Vec::new(),
            properties: Vec::new(),
            functions: Vec::new(),
            default_object: None,
            generated_by: None,
        }
    }

    pub fn with_super(mut self, super_class: ClassId) -> Self {
        self.super_class = Some(super_class);
        self
    }

    pub fn with_flags(mut self, flags: ClassFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_interface(mut self, interface: ClassId) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_function(mut self, function: FunctionDef) -> Self {
        self.functions.push(function);
        self
    }

    pub fn is_native(&self) -> bool {
        self.flags.contains(ClassFlags::NATIVE)
    }

    pub fn is_interface(&self) -> bool {
        self.flags.contains(ClassFlags::INTERFACE)
    }

    pub fn is_retired(&self) -> bool {
        self.flags.contains(ClassFlags::NEWER_VERSION_EXISTS)
    }

    /// Own property by name
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Own function by name
    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut FunctionDef> {
        self.functions.iter_mut().find(|f| f.name == name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Class Registry Error
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur when working with the class registry
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassRegistryError {
    #[error("Class not found: {0}")]
    ClassNotFound(ClassId),
    #[error("No class named {0}")]
    NameNotFound(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Class Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Every class known to the world, with a name index pointing at the current
/// version of each class.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: BTreeMap<ClassId, ClassDef>,
    by_name: HashMap<String, ClassId>,
    next_id: u64,
    retired_count: u64,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class, assigning it a fresh id.
    ///
    /// The name index is pointed at the new class, so registering a class
    /// with the name of an existing one makes the new class current.
    pub fn register(&mut self, mut def: ClassDef) -> ClassId {
        self.next_id += 1;
        let id = ClassId(self.next_id);
        def.id = id;
        self.by_name.insert(def.name.clone(), id);
        self.classes.insert(id, def);
        id
    }

    pub fn get(&self, id: ClassId) -> Option<&ClassDef> {
        self.classes.get(&id)
    }

    pub fn get_mut(&mut self, id: ClassId) -> Option<&mut ClassDef> {
        self.classes.get_mut(&id)
    }

    /// Get a class or fail with `ClassNotFound`
    pub fn expect_class(&self, id: ClassId) -> Result<&ClassDef, ClassRegistryError> {
        self.classes
            .get(&id)
            .ok_or(ClassRegistryError::ClassNotFound(id))
    }

    /// Current class registered under a name
    pub fn find(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn resolve(&self, name: &str) -> Result<ClassId, ClassRegistryError> {
        self.find(name)
            .ok_or_else(|| ClassRegistryError::NameNotFound(name.to_string()))
    }

    /// Name of a class, or an empty string for unknown ids
    pub fn name_of(&self, id: ClassId) -> &str {
        self.classes.get(&id).map(|c| c.name.as_str()).unwrap_or("")
    }

    pub fn contains(&self, id: ClassId) -> bool {
        self.classes.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.classes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Remove a class entirely
    pub fn remove(&mut self, id: ClassId) -> Option<ClassDef> {
        let removed = self.classes.remove(&id)?;
        if self.by_name.get(&removed.name) == Some(&id) {
            self.by_name.remove(&removed.name);
        }
        Some(removed)
    }

    /// Retire a class that is about to be replaced.
    ///
    /// The class keeps its id so existing references still resolve, but it is
    /// renamed `REINST_<name>_<n>`, flagged `NEWER_VERSION_EXISTS`, and removed
    /// from the name index.
    pub fn retire(&mut self, id: ClassId) -> Result<String, ClassRegistryError> {
        self.retired_count += 1;
        let counter = self.retired_count;
        let class = self
            .classes
            .get_mut(&id)
            .ok_or(ClassRegistryError::ClassNotFound(id))?;
        let old_name = std::mem::take(&mut class.name);
        class.name = format!("REINST_{}_{}", old_name, counter);
        class.flags |= ClassFlags::NEWER_VERSION_EXISTS;
        if self.by_name.get(&old_name) == Some(&id) {
            self.by_name.remove(&old_name);
        }
        Ok(old_name)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Hierarchy queries
    // ─────────────────────────────────────────────────────────────────────────

    /// The class followed by its ancestors, nearest first
    pub fn super_chain(&self, id: ClassId) -> Vec<ClassId> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(class_id) = current {
            // Guard against malformed cycles
            if chain.contains(&class_id) {
                break;
            }
            let Some(class) = self.classes.get(&class_id) else {
                break;
            };
            chain.push(class_id);
            current = class.super_class;
        }
        chain
    }

    /// Whether `candidate` is `target` or derives from it
    pub fn is_child_of(&self, candidate: ClassId, target: ClassId) -> bool {
        self.super_chain(candidate).contains(&target)
    }

    /// Every interface implemented by the class or its ancestors
    pub fn implemented_interfaces(&self, id: ClassId) -> Vec<ClassId> {
        let mut interfaces = Vec::new();
        for class_id in self.super_chain(id) {
            if let Some(class) = self.classes.get(&class_id) {
                for interface in &class.interfaces {
                    if !interfaces.contains(interface) {
                        interfaces.push(*interface);
                    }
                }
            }
        }
        interfaces
    }

    /// Whether the class (or an ancestor) implements the interface, directly
    /// or through an interface that derives from it
    pub fn implements_interface(&self, class: ClassId, interface: ClassId) -> bool {
        self.implemented_interfaces(class)
            .into_iter()
            .any(|i| self.is_child_of(i, interface))
    }

    /// The most distant ancestor of `class` (the class itself included) that
    /// implements `interface`, or `None` if nothing in the chain does
    pub fn find_inherited_interface(&self, class: ClassId, interface: ClassId) -> Option<ClassId> {
        self.super_chain(class)
            .into_iter()
            .filter(|class_id| {
                self.classes.get(class_id).is_some_and(|c| {
                    c.interfaces.iter().any(|i| self.is_child_of(*i, interface))
                })
            })
            .last()
    }

    /// Find a function by name on the class or its ancestors; returns the
    /// class that declares it
    pub fn find_function(&self, class: ClassId, name: &str) -> Option<(ClassId, &FunctionDef)> {
        self.super_chain(class).into_iter().find_map(|class_id| {
            self.classes
                .get(&class_id)
                .and_then(|c| c.function(name))
                .map(|f| (class_id, f))
        })
    }

    /// Find a function declared by any interface the class implements
    pub fn find_interface_function(
        &self,
        class: ClassId,
        name: &str,
    ) -> Option<(ClassId, &FunctionDef)> {
        self.implemented_interfaces(class)
            .into_iter()
            .find_map(|interface| self.find_function(interface, name))
    }

    /// Find a property by name on the class or its ancestors
    pub fn find_property(&self, class: ClassId, name: &str) -> Option<(ClassId, &PropertyDef)> {
        self.super_chain(class).into_iter().find_map(|class_id| {
            self.classes
                .get(&class_id)
                .and_then(|c| c.property(name))
                .map(|p| (class_id, p))
        })
    }

    /// All properties of the class, ancestors' first
    pub fn all_properties(&self, class: ClassId) -> Vec<&PropertyDef> {
        let mut chain = self.super_chain(class);
        chain.reverse();
        chain
            .into_iter()
            .filter_map(|class_id| self.classes.get(&class_id))
            .flat_map(|c| c.properties.iter())
            .collect()
    }

    /// All functions visible on the class, nearest declaration first
    pub fn all_functions(&self, class: ClassId) -> Vec<(ClassId, &FunctionDef)> {
        let mut seen = Vec::new();
        let mut functions = Vec::new();
        for class_id in self.super_chain(class) {
            if let Some(def) = self.classes.get(&class_id) {
                for function in &def.functions {
                    if !seen.contains(&function.name.as_str()) {
                        seen.push(function.name.as_str());
                        functions.push((class_id, function));
                    }
                }
            }
        }
        functions
    }

    /// The nearest native class in the chain (the class itself included)
    pub fn find_first_native_class(&self, class: ClassId) -> Option<ClassId> {
        self.super_chain(class)
            .into_iter()
            .find(|id| self.classes.get(id).is_some_and(|c| c.is_native()))
    }

    /// Current (non-retired) classes whose direct parent is `class`
    pub fn direct_children(&self, class: ClassId) -> Vec<ClassId> {
        self.classes
            .values()
            .filter(|c| c.super_class == Some(class) && !c.is_retired())
            .map(|c| c.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> (ClassRegistry, ClassId, ClassId, ClassId, ClassId) {
        let mut registry = ClassRegistry::new();
        let object = registry.register(ClassDef::new("Object").with_flags(ClassFlags::NATIVE));
        let interface = registry.register(
            ClassDef::new("Damageable")
                .with_flags(ClassFlags::INTERFACE | ClassFlags::NATIVE)
                .with_function(FunctionDef::event("TakeDamage")),
        );
        let actor = registry.register(
            ClassDef::new("Actor")
                .with_super(object)
                .with_flags(ClassFlags::NATIVE | ClassFlags::CONFIG)
                .with_interface(interface)
                .with_function(FunctionDef::event("ReceiveBeginPlay")),
        );
        let pawn = registry.register(
            ClassDef::new("Pawn")
                .with_super(actor)
                .with_interface(interface)
                .with_property(PropertyDef::new("Speed", PinType::Real)),
        );
        (registry, object, interface, actor, pawn)
    }

    #[test]
    fn test_is_child_of() {
        let (registry, object, _, actor, pawn) = hierarchy();
        assert!(registry.is_child_of(pawn, object));
        assert!(registry.is_child_of(pawn, pawn));
        assert!(!registry.is_child_of(actor, pawn));
    }

    #[test]
    fn test_find_inherited_interface_returns_highest_ancestor() {
        let (registry, object, interface, actor, pawn) = hierarchy();
        assert_eq!(registry.find_inherited_interface(pawn, interface), Some(actor));
        assert_eq!(registry.find_inherited_interface(object, interface), None);
    }

    #[test]
    fn test_find_function_reports_owner() {
        let (registry, _, _, actor, pawn) = hierarchy();
        let (owner, function) = registry.find_function(pawn, "ReceiveBeginPlay").unwrap();
        assert_eq!(owner, actor);
        assert!(function.can_be_placed_as_event());
        assert!(registry.find_function(pawn, "Missing").is_none());
    }

    #[test]
    fn test_retire_frees_name() {
        let (mut registry, _, _, actor, pawn) = hierarchy();
        let old_name = registry.retire(pawn).unwrap();
        assert_eq!(old_name, "Pawn");
        assert!(registry.find("Pawn").is_none());
        assert!(registry.get(pawn).unwrap().is_retired());
        assert!(registry.get(pawn).unwrap().name.starts_with("REINST_Pawn"));

        let new_pawn = registry.register(ClassDef::new("Pawn").with_super(actor));
        assert_eq!(registry.find("Pawn"), Some(new_pawn));
        assert_eq!(registry.direct_children(actor), vec![new_pawn]);
    }

    #[test]
    fn test_first_native_class() {
        let (registry, _, _, actor, pawn) = hierarchy();
        assert_eq!(registry.find_first_native_class(pawn), Some(actor));
    }

    #[test]
    fn test_can_be_placed_as_event() {
        let with_output = FunctionDef::event("GetValue")
            .with_output(FunctionParam::new("Value", PinType::Integer));
        assert!(with_output.can_override());
        assert!(!with_output.can_be_placed_as_event());
        assert!(!FunctionDef::new("Plain").can_override());
    }

    #[test]
    fn test_script_inherit_mask() {
        let flags = ClassFlags::NATIVE | ClassFlags::CONFIG | ClassFlags::ABSTRACT;
        assert_eq!(flags & ClassFlags::SCRIPT_INHERIT, ClassFlags::CONFIG);
    }
}
