// Object model contracts
//
// The compiler and the reinstancer only talk to the world through these
// traits. `ObjectWorld` is the in-memory implementation; hosts embedding the
// compiler in another object system implement them over their own storage.

use std::collections::BTreeMap;

use blueprint_types::{ClassId, ClassRegistry, LinkerId, ObjectId};

use crate::{Linker, Object, ObjectFlags, ObjectResult};

/// Map from original objects to their replacements or copies
pub type ObjectMap = BTreeMap<ObjectId, ObjectId>;

/// Enumerates live objects by class
pub trait InstanceRegistry {
    /// Every live object whose class is exactly `class`, default objects included
    fn instances_of(&self, class: ClassId) -> Vec<ObjectId>;
}

/// Options for `copy_properties_for_unrelated_objects`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyOptions {
    /// The new object's default subobjects are authoritative: old default
    /// subobjects without a same-named counterpart are dropped instead of
    /// being carried over
    pub aggressive_default_subobject_replacement: bool,
    /// Rewrite references to the old object's class into the new object's class
    pub replace_class_references: bool,
}

impl CopyOptions {
    /// Options used when migrating one default object into another
    pub fn default_object_migration() -> Self {
        Self {
            aggressive_default_subobject_replacement: true,
            replace_class_references: true,
        }
    }

    /// Options used when carrying an instance over to a new class
    pub fn instance_migration() -> Self {
        Self {
            aggressive_default_subobject_replacement: false,
            replace_class_references: true,
        }
    }
}

/// What a property copy did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    /// Properties carried over
    pub copied: usize,
    /// Properties the new layout has no room for
    pub dropped: Vec<String>,
    /// Old subobjects paired with the new subobjects that replaced them
    pub subobjects: ObjectMap,
}

/// The object world as seen by compilation and reinstancing
pub trait ObjectModel: InstanceRegistry {
    fn classes(&self) -> &ClassRegistry;
    fn classes_mut(&mut self) -> &mut ClassRegistry;

    fn object(&self, id: ObjectId) -> Option<&Object>;
    fn object_mut(&mut self, id: ObjectId) -> Option<&mut Object>;

    /// Every live object id, in creation order
    fn all_objects(&self) -> Vec<ObjectId>;

    /// Objects directly owned by `outer`
    fn objects_with_outer(&self, outer: ObjectId) -> Vec<ObjectId>;

    /// Default subobjects directly owned by `owner`
    fn default_subobjects(&self, owner: ObjectId) -> Vec<ObjectId> {
        self.objects_with_outer(owner)
            .into_iter()
            .filter(|id| self.object(*id).is_some_and(|o| o.is_default_subobject()))
            .collect()
    }

    /// Construct an object of `class` seeded from the class's default object,
    /// with its own copies of the default subobjects
    fn spawn(
        &mut self,
        class: ClassId,
        name: &str,
        outer: Option<ObjectId>,
        flags: ObjectFlags,
    ) -> ObjectResult<ObjectId>;

    /// Create the default object of `class`, seeded from the parent class's
    /// default object, and register it on the class
    fn create_default_object(&mut self, class: ClassId) -> ObjectResult<ObjectId>;

    /// Give `object` a copy of every default subobject its parent class's
    /// default object has and it lacks; returns how many were created
    fn instance_subobject_templates(&mut self, object: ObjectId) -> ObjectResult<usize>;

    /// Remove an object and everything it owns
    fn destroy(&mut self, id: ObjectId);

    /// Deep-copy an object and its subobjects; the returned map includes the root
    fn duplicate(&mut self, source: ObjectId, outer: Option<ObjectId>) -> ObjectResult<ObjectMap>;

    /// Copy state between objects of unrelated classes, matching properties
    /// and default subobjects by name
    fn copy_properties_for_unrelated_objects(
        &mut self,
        old: ObjectId,
        new: ObjectId,
        options: CopyOptions,
    ) -> ObjectResult<CopyReport>;

    /// Apply pending serialized state to an object
    fn preload(&mut self, id: ObjectId) -> ObjectResult<()>;

    /// Rewrite object references (property values and outers) everywhere, or
    /// only inside `scope` and the objects it owns; returns the number rewritten
    fn replace_references(&mut self, map: &ObjectMap, scope: Option<&[ObjectId]>) -> usize;

    /// Rewrite class references held in property values; returns the number rewritten
    fn replace_class_references(&mut self, map: &BTreeMap<ClassId, ClassId>) -> usize;

    fn linker(&self, id: LinkerId) -> Option<&Linker>;

    /// Put `object` in export slot `index` of `linker`
    fn patch_export(&mut self, linker: LinkerId, index: usize, object: ObjectId) -> ObjectResult<()>;
}
