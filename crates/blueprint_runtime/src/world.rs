// In-memory object world
//
// Owns the class registry, every live object and every linker. Single
// threaded: the compiler borrows the world mutably for the duration of a pass.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use blueprint_types::{ClassDef, ClassId, ClassRegistry, LinkerId, ObjectId, PropertyFlags, Value};

use crate::{
    CopyOptions, CopyReport, Export, InstanceRegistry, Linker, LinkerSlot, Object, ObjectError,
    ObjectFlags, ObjectMap, ObjectModel, ObjectResult, default_object_name,
};

/// The in-memory object world
#[derive(Debug, Default)]
pub struct ObjectWorld {
    classes: ClassRegistry,
    objects: BTreeMap<ObjectId, Object>,
    linkers: BTreeMap<LinkerId, Linker>,
    next_object: u64,
    next_linker: u64,
}

impl ObjectWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class and create its default object
    pub fn register_class(&mut self, def: ClassDef) -> ObjectResult<ClassId> {
        let id = self.classes.register(def);
        self.create_default_object(id)?;
        Ok(id)
    }

    /// Create an empty linker for a package
    pub fn create_linker(&mut self, package: &str) -> LinkerId {
        self.next_linker += 1;
        let id = LinkerId(self.next_linker);
        self.linkers.insert(id, Linker::new(id, package));
        id
    }

    /// Append an object to a linker's export table; returns its index
    pub fn add_export(&mut self, linker: LinkerId, object: ObjectId) -> ObjectResult<usize> {
        let name = self
            .objects
            .get(&object)
            .map(|o| o.name.clone())
            .ok_or(ObjectError::ObjectNotFound(object))?;
        let table = self
            .linkers
            .get_mut(&linker)
            .ok_or(ObjectError::LinkerNotFound(linker))?;
        table.exports.push(Export {
            object_name: name,
            object: Some(object),
        });
        let index = table.exports.len() - 1;
        if let Some(obj) = self.objects.get_mut(&object) {
            obj.linker = Some(LinkerSlot { linker, index });
        }
        Ok(index)
    }

    /// Find an object by name and outer
    pub fn find_object(&self, name: &str, outer: Option<ObjectId>) -> Option<ObjectId> {
        self.objects
            .values()
            .find(|o| o.name == name && o.outer == outer)
            .map(|o| o.id)
    }

    /// Default object of a class
    pub fn default_object(&self, class: ClassId) -> Option<ObjectId> {
        self.classes.get(class).and_then(|c| c.default_object)
    }

    pub fn property(&self, object: ObjectId, name: &str) -> Option<&Value> {
        self.objects.get(&object).and_then(|o| o.get(name))
    }

    pub fn set_property(
        &mut self,
        object: ObjectId,
        name: &str,
        value: impl Into<Value>,
    ) -> ObjectResult<()> {
        let obj = self
            .objects
            .get_mut(&object)
            .ok_or(ObjectError::ObjectNotFound(object))?;
        obj.set(name, value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn allocate(&mut self) -> ObjectId {
        self.next_object += 1;
        ObjectId(self.next_object)
    }

    /// The object followed by everything it owns, breadth first
    fn owned_closure(&self, root: ObjectId) -> Vec<ObjectId> {
        let mut closure = Vec::new();
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            if !self.objects.contains_key(&id) || closure.contains(&id) {
                continue;
            }
            closure.push(id);
            queue.extend(self.objects_with_outer(id));
        }
        closure
    }

    /// Object the default subobject templates of `object` come from
    fn template_source(&self, object: &Object) -> Option<ObjectId> {
        if object.is_default_object() {
            self.classes
                .get(object.class)
                .and_then(|c| c.super_class)
                .and_then(|parent| self.default_object(parent))
        } else {
            self.default_object(object.class)
        }
    }
}

impl InstanceRegistry for ObjectWorld {
    fn instances_of(&self, class: ClassId) -> Vec<ObjectId> {
        self.objects
            .values()
            .filter(|o| o.class == class)
            .map(|o| o.id)
            .collect()
    }
}

impl ObjectModel for ObjectWorld {
    fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    fn classes_mut(&mut self) -> &mut ClassRegistry {
        &mut self.classes
    }

    fn object(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    fn object_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(&id)
    }

    fn all_objects(&self) -> Vec<ObjectId> {
        self.objects.keys().copied().collect()
    }

    fn objects_with_outer(&self, outer: ObjectId) -> Vec<ObjectId> {
        self.objects
            .values()
            .filter(|o| o.outer == Some(outer))
            .map(|o| o.id)
            .collect()
    }

    fn spawn(
        &mut self,
        class: ClassId,
        name: &str,
        outer: Option<ObjectId>,
        flags: ObjectFlags,
    ) -> ObjectResult<ObjectId> {
        let cdo = self
            .classes
            .expect_class(class)?
            .default_object
            .ok_or(ObjectError::NoDefaultObject(class))?;
        let properties = self
            .objects
            .get(&cdo)
            .map(|o| o.properties.clone())
            .ok_or(ObjectError::ObjectNotFound(cdo))?;

        let id = self.allocate();
        let mut object = Object::new(id, name, class);
        object.outer = outer;
        object.flags = flags;
        object.properties = properties;
        self.objects.insert(id, object);

        self.instance_subobject_templates(id)?;
        Ok(id)
    }

    fn create_default_object(&mut self, class: ClassId) -> ObjectResult<ObjectId> {
        let def = self.classes.expect_class(class)?;
        let name = default_object_name(&def.name);
        let parent_cdo = def.super_class.and_then(|parent| self.default_object(parent));

        let layout: Vec<(String, Value)> = self
            .classes
            .all_properties(class)
            .into_iter()
            .map(|p| (p.name.clone(), Value::default_for(&p.ty)))
            .collect();

        let mut properties: BTreeMap<String, Value> = parent_cdo
            .and_then(|cdo| self.objects.get(&cdo))
            .map(|o| o.properties.clone())
            .unwrap_or_default();
        properties.retain(|name, _| layout.iter().any(|(n, _)| n == name));
        for (name, zero) in layout {
            properties.entry(name).or_insert(zero);
        }

        let id = self.allocate();
        let mut object = Object::new(id, name, class);
        object.flags = ObjectFlags::CLASS_DEFAULT_OBJECT;
        object.properties = properties;
        self.objects.insert(id, object);

        if let Some(def) = self.classes.get_mut(class) {
            def.default_object = Some(id);
        }
        self.instance_subobject_templates(id)?;
        Ok(id)
    }

    fn instance_subobject_templates(&mut self, object: ObjectId) -> ObjectResult<usize> {
        let target = self
            .objects
            .get(&object)
            .ok_or(ObjectError::ObjectNotFound(object))?;
        let Some(source) = self.template_source(target) else {
            return Ok(0);
        };

        let existing: BTreeMap<String, ObjectId> = self
            .default_subobjects(object)
            .into_iter()
            .filter_map(|id| self.objects.get(&id).map(|o| (o.name.clone(), id)))
            .collect();

        let mut map = ObjectMap::new();
        let mut created = 0;
        for template in self.default_subobjects(source) {
            let Some(template_name) = self.objects.get(&template).map(|o| o.name.clone()) else {
                continue;
            };
            match existing.get(&template_name) {
                Some(own) => {
                    map.insert(template, *own);
                }
                None => {
                    map.extend(self.duplicate(template, Some(object))?);
                    created += 1;
                }
            }
        }

        self.replace_references(&map, Some(&[object]));
        Ok(created)
    }

    fn destroy(&mut self, id: ObjectId) {
        for doomed in self.owned_closure(id) {
            let Some(object) = self.objects.remove(&doomed) else {
                continue;
            };
            if let Some(slot) = object.linker {
                if let Some(export) = self
                    .linkers
                    .get_mut(&slot.linker)
                    .and_then(|l| l.exports.get_mut(slot.index))
                {
                    if export.object == Some(doomed) {
                        export.object = None;
                    }
                }
            }
        }
    }

    fn duplicate(&mut self, source: ObjectId, outer: Option<ObjectId>) -> ObjectResult<ObjectMap> {
        if !self.objects.contains_key(&source) {
            return Err(ObjectError::ObjectNotFound(source));
        }
        let closure = self.owned_closure(source);
        let map: ObjectMap = closure.iter().map(|id| (*id, self.allocate())).collect();

        for original in &closure {
            let Some(mut copy) = self.objects.get(original).cloned() else {
                continue;
            };
            copy.id = map[original];
            copy.outer = if *original == source {
                outer
            } else {
                copy.outer.map(|o| map.get(&o).copied().unwrap_or(o))
            };
            copy.flags.remove(ObjectFlags::LOAD_FLAGS);
            copy.linker = None;
            self.objects.insert(copy.id, copy);
        }

        self.replace_references(&map, Some(&[map[&source]]));
        Ok(map)
    }

    fn copy_properties_for_unrelated_objects(
        &mut self,
        old: ObjectId,
        new: ObjectId,
        options: CopyOptions,
    ) -> ObjectResult<CopyReport> {
        self.preload(old)?;
        let old_object = self
            .objects
            .get(&old)
            .cloned()
            .ok_or(ObjectError::ObjectNotFound(old))?;
        let new_class = self
            .objects
            .get(&new)
            .map(|o| o.class)
            .ok_or(ObjectError::ObjectNotFound(new))?;

        let mut report = CopyReport::default();
        let mut carried = BTreeMap::new();
        for (name, value) in &old_object.properties {
            let old_flags = self
                .classes
                .find_property(old_object.class, name)
                .map(|(_, p)| p.flags)
                .unwrap_or_default();
            let Some((_, property)) = self.classes.find_property(new_class, name) else {
                report.dropped.push(name.clone());
                continue;
            };
            let flags = property.flags | old_flags;
            if flags.contains(PropertyFlags::TRANSIENT)
                || (old_object.is_default_object() && flags.contains(PropertyFlags::INSTANCE_ONLY))
            {
                continue;
            }
            if !value.matches_type(&property.ty) {
                report.dropped.push(name.clone());
                continue;
            }
            carried.insert(name.clone(), value.clone());
        }
        report.copied = carried.len();
        if let Some(target) = self.objects.get_mut(&new) {
            target.properties.extend(carried);
        }

        // Subobjects: default ones pair by name, runtime-created ones move over
        let new_subobjects: BTreeMap<String, ObjectId> = self
            .default_subobjects(new)
            .into_iter()
            .filter_map(|id| self.objects.get(&id).map(|o| (o.name.clone(), id)))
            .collect();
        for owned in self.objects_with_outer(old) {
            let Some(sub) = self.objects.get(&owned).cloned() else {
                continue;
            };
            if !sub.is_default_subobject() {
                if let Some(moved) = self.objects.get_mut(&owned) {
                    moved.outer = Some(new);
                }
                continue;
            }
            match new_subobjects.get(&sub.name) {
                Some(counterpart) => {
                    let nested = self.copy_properties_for_unrelated_objects(owned, *counterpart, options)?;
                    report.subobjects.extend(nested.subobjects);
                    report.subobjects.insert(owned, *counterpart);
                }
                None if !options.aggressive_default_subobject_replacement => {
                    report.subobjects.extend(self.duplicate(owned, Some(new))?);
                }
                None => {
                    tracing::debug!(subobject = %sub.name, "dropping default subobject missing from new layout");
                }
            }
        }

        let mut map = report.subobjects.clone();
        map.insert(old, new);
        self.replace_references(&map, Some(&[new]));

        if options.replace_class_references && old_object.class != new_class {
            let class_map = BTreeMap::from([(old_object.class, new_class)]);
            for id in self.owned_closure(new) {
                if let Some(object) = self.objects.get_mut(&id) {
                    for value in object.properties.values_mut() {
                        value.replace_classes(&class_map);
                    }
                }
            }
        }

        Ok(report)
    }

    fn preload(&mut self, id: ObjectId) -> ObjectResult<()> {
        let object = self
            .objects
            .get_mut(&id)
            .ok_or(ObjectError::ObjectNotFound(id))?;
        if object.needs_load() {
            let pending = std::mem::take(&mut object.pending_properties);
            object.properties.extend(pending);
            object.flags.remove(ObjectFlags::NEED_LOAD);
            object.flags.insert(ObjectFlags::WAS_LOADED);
        }
        Ok(())
    }

    fn replace_references(&mut self, map: &ObjectMap, scope: Option<&[ObjectId]>) -> usize {
        if map.is_empty() {
            return 0;
        }
        let targets: Vec<ObjectId> = match scope {
            Some(roots) => {
                let mut set = BTreeSet::new();
                for root in roots {
                    set.extend(self.owned_closure(*root));
                }
                set.into_iter().collect()
            }
            None => self.all_objects(),
        };

        let mut replaced = 0;
        for id in targets {
            let Some(object) = self.objects.get_mut(&id) else {
                continue;
            };
            for value in object.properties.values_mut() {
                replaced += value.replace_objects(map);
            }
            if let Some(new_outer) = object.outer.and_then(|o| map.get(&o)) {
                object.outer = Some(*new_outer);
                replaced += 1;
            }
        }
        replaced
    }

    fn replace_class_references(&mut self, map: &BTreeMap<ClassId, ClassId>) -> usize {
        self.objects
            .values_mut()
            .flat_map(|o| o.properties.values_mut())
            .map(|v| v.replace_classes(map))
            .sum()
    }

    fn linker(&self, id: LinkerId) -> Option<&Linker> {
        self.linkers.get(&id)
    }

    fn patch_export(&mut self, linker: LinkerId, index: usize, object: ObjectId) -> ObjectResult<()> {
        let table = self
            .linkers
            .get_mut(&linker)
            .ok_or(ObjectError::LinkerNotFound(linker))?;
        let len = table.exports.len();
        let export = table
            .exports
            .get_mut(index)
            .ok_or(ObjectError::ExportOutOfRange { linker, index, len })?;
        let previous = export.object.replace(object);

        let slot = LinkerSlot { linker, index };
        if let Some(prev) = previous.filter(|p| *p != object) {
            if let Some(prev_object) = self.objects.get_mut(&prev) {
                if prev_object.linker == Some(slot) {
                    prev_object.linker = None;
                }
            }
        }
        let target = self
            .objects
            .get_mut(&object)
            .ok_or(ObjectError::ObjectNotFound(object))?;
        target.linker = Some(slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint_types::{ClassFlags, PinType, PropertyDef};

    struct Fixture {
        world: ObjectWorld,
        actor: ClassId,
        component: ClassId,
    }

    fn fixture() -> Fixture {
        let mut world = ObjectWorld::new();
        let component = world
            .register_class(
                ClassDef::new("SceneComponent")
                    .with_flags(ClassFlags::NATIVE)
                    .with_property(PropertyDef::new("Visible", PinType::Boolean)),
            )
            .unwrap();
        let actor = world
            .register_class(
                ClassDef::new("Actor")
                    .with_flags(ClassFlags::NATIVE)
                    .with_property(PropertyDef::new("Health", PinType::Real))
                    .with_property(PropertyDef::new("Root", PinType::object("SceneComponent")))
                    .with_property(
                        PropertyDef::new("Scratch", PinType::Integer)
                            .with_flags(PropertyFlags::TRANSIENT),
                    ),
            )
            .unwrap();

        // Give the actor CDO a default subobject referenced by a property
        let cdo = world.default_object(actor).unwrap();
        let root = world
            .spawn(component, "Root", Some(cdo), ObjectFlags::DEFAULT_SUBOBJECT)
            .unwrap();
        world.set_property(cdo, "Root", root).unwrap();

        Fixture {
            world,
            actor,
            component,
        }
    }

    #[test]
    fn test_register_class_creates_default_object() {
        let f = fixture();
        let cdo = f.world.default_object(f.actor).unwrap();
        let object = f.world.object(cdo).unwrap();
        assert_eq!(object.name, "Default__Actor");
        assert!(object.is_default_object());
        assert_eq!(object.get("Health"), Some(&Value::Float(0.0)));
    }

    #[test]
    fn test_spawn_instances_own_subobjects() {
        let mut f = fixture();
        let cdo = f.world.default_object(f.actor).unwrap();
        let cdo_root = f.world.property(cdo, "Root").and_then(Value::as_object).unwrap();

        let instance = f.world.spawn(f.actor, "Actor_0", None, ObjectFlags::empty()).unwrap();
        let root = f.world.property(instance, "Root").and_then(Value::as_object).unwrap();

        assert_ne!(root, cdo_root);
        assert_eq!(f.world.object(root).unwrap().outer, Some(instance));
        assert_eq!(f.world.object(root).unwrap().class, f.component);
    }

    #[test]
    fn test_child_cdo_inherits_parent_defaults_and_subobjects() {
        let mut f = fixture();
        let cdo = f.world.default_object(f.actor).unwrap();
        f.world.set_property(cdo, "Health", 100.0).unwrap();

        let pawn = f
            .world
            .register_class(
                ClassDef::new("Pawn")
                    .with_super(f.actor)
                    .with_property(PropertyDef::new("Speed", PinType::Real)),
            )
            .unwrap();
        let pawn_cdo = f.world.default_object(pawn).unwrap();

        assert_eq!(f.world.property(pawn_cdo, "Health"), Some(&Value::Float(100.0)));
        assert_eq!(f.world.property(pawn_cdo, "Speed"), Some(&Value::Float(0.0)));
        assert_eq!(f.world.default_subobjects(pawn_cdo).len(), 1);
    }

    #[test]
    fn test_duplicate_is_deep() {
        let mut f = fixture();
        let instance = f.world.spawn(f.actor, "Actor_0", None, ObjectFlags::empty()).unwrap();
        let map = f.world.duplicate(instance, None).unwrap();
        let copy = map[&instance];

        let original_root = f.world.property(instance, "Root").and_then(Value::as_object).unwrap();
        let copied_root = f.world.property(copy, "Root").and_then(Value::as_object).unwrap();
        assert_eq!(map.get(&original_root), Some(&copied_root));
        assert_eq!(f.world.object(copied_root).unwrap().outer, Some(copy));
    }

    #[test]
    fn test_copy_unrelated_skips_transient_and_drops_missing() {
        let mut f = fixture();
        let other = f
            .world
            .register_class(
                ClassDef::new("Prop")
                    .with_flags(ClassFlags::NATIVE)
                    .with_property(PropertyDef::new("Health", PinType::Real))
                    .with_property(PropertyDef::new("Scratch", PinType::Integer)),
            )
            .unwrap();
        let old = f.world.spawn(f.actor, "A", None, ObjectFlags::empty()).unwrap();
        f.world.set_property(old, "Health", 42.0).unwrap();
        f.world.set_property(old, "Scratch", 7).unwrap();
        let new = f.world.spawn(other, "B", None, ObjectFlags::empty()).unwrap();

        let report = f
            .world
            .copy_properties_for_unrelated_objects(old, new, CopyOptions::instance_migration())
            .unwrap();

        assert_eq!(f.world.property(new, "Health"), Some(&Value::Float(42.0)));
        assert_eq!(f.world.property(new, "Scratch"), Some(&Value::Int(0)));
        assert_eq!(report.dropped, vec!["Root".to_string()]);
    }

    #[test]
    fn test_preload_applies_pending_state() {
        let mut f = fixture();
        let cdo = f.world.default_object(f.actor).unwrap();
        {
            let object = f.world.object_mut(cdo).unwrap();
            object.flags |= ObjectFlags::NEED_LOAD;
            object.pending_properties.insert("Health".into(), Value::Float(5.0));
        }
        f.world.preload(cdo).unwrap();
        let object = f.world.object(cdo).unwrap();
        assert!(!object.needs_load());
        assert_eq!(object.get("Health"), Some(&Value::Float(5.0)));
    }

    #[test]
    fn test_destroy_removes_owned_and_clears_export() {
        let mut f = fixture();
        let instance = f.world.spawn(f.actor, "Actor_0", None, ObjectFlags::empty()).unwrap();
        let linker = f.world.create_linker("/Game/Level");
        f.world.add_export(linker, instance).unwrap();
        let before = f.world.len();

        f.world.destroy(instance);
        assert_eq!(f.world.len(), before - 2);
        assert_eq!(f.world.linker(linker).unwrap().exports[0].object, None);
    }
}
