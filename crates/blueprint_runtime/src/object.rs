// Live objects
//
// Objects are owned by the world and addressed by id. Default objects,
// instances and subobjects share one representation; flags tell them apart.

use std::collections::BTreeMap;

use bitflags::bitflags;
use blueprint_types::{ClassId, LinkerId, ObjectId, Value};

bitflags! {
    /// Object-level flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObjectFlags: u32 {
        /// The default object of its class
        const CLASS_DEFAULT_OBJECT = 1 << 0;
        /// Subobject created from a class's default subobject template
        const DEFAULT_SUBOBJECT = 1 << 1;
        /// Serialized state has not been read yet
        const NEED_LOAD = 1 << 2;
        /// Loaded but post-load fixups have not run yet
        const NEED_POST_LOAD = 1 << 3;
        const WAS_LOADED = 1 << 4;
        const TRANSIENT = 1 << 5;

        const LOAD_FLAGS = Self::NEED_LOAD.bits() | Self::NEED_POST_LOAD.bits();
    }
}

impl Default for ObjectFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Position of an object in a linker's export table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkerSlot {
    pub linker: LinkerId,
    pub index: usize,
}

/// A live object
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub id: ObjectId,
    pub name: String,
    /// Owning object; subobjects point at their owner
    pub outer: Option<ObjectId>,
    pub class: ClassId,
    pub flags: ObjectFlags,
    pub properties: BTreeMap<String, Value>,
    /// Serialized values applied when the object is preloaded
    pub pending_properties: BTreeMap<String, Value>,
    pub linker: Option<LinkerSlot>,
}

impl Object {
    pub fn new(id: ObjectId, name: impl Into<String>, class: ClassId) -> Self {
        Self {
            id,
            name: name.into(),
            outer: None,
            class,
            flags: ObjectFlags::empty(),
            properties: BTreeMap::new(),
            pending_properties: BTreeMap::new(),
            linker: None,
        }
    }

    pub fn is_default_object(&self) -> bool {
        self.flags.contains(ObjectFlags::CLASS_DEFAULT_OBJECT)
    }

    pub fn is_default_subobject(&self) -> bool {
        self.flags.contains(ObjectFlags::DEFAULT_SUBOBJECT)
    }

    pub fn needs_load(&self) -> bool {
        self.flags.contains(ObjectFlags::NEED_LOAD)
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.properties.get(property)
    }

    pub fn set(&mut self, property: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(property.into(), value.into());
    }
}

/// Name of the default object of a class
pub fn default_object_name(class_name: &str) -> String {
    format!("Default__{}", class_name)
}
