// Instance reinstancing
//
// When a class is regenerated every live object of the old class is replaced
// by an object of the new class carrying the same state. Default objects are
// migrated separately (they are not replaced, the compiler creates the new
// one), and compiled scripts referring to the old class are rebound.

use std::collections::{BTreeMap, BTreeSet};

use blueprint_types::{ClassId, ObjectId, Value};

use crate::{
    CopyOptions, CopyReport, ObjectError, ObjectFlags, ObjectMap, ObjectModel, ObjectResult,
    patch_new_cdo_into_linker,
};

/// Name of the native root class of placeable actors
pub const ACTOR_CLASS: &str = "Actor";
/// Actor property computed by the compiler from the presence of a tick event
pub const PROP_CAN_EVER_TICK: &str = "CanEverTick";
pub const PROP_CAN_BE_DAMAGED: &str = "CanBeDamaged";

// ─────────────────────────────────────────────────────────────────────────────
// Reports
// ─────────────────────────────────────────────────────────────────────────────

/// What a reinstancing pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReinstanceReport {
    /// Old instance to its replacement
    pub replaced: ObjectMap,
    /// Object references rewritten across the world
    pub references_rewritten: usize,
}

/// What a bytecode fixup pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BytecodeFixupReport {
    pub rebound: usize,
    /// `Class::member` references the new class has no member for
    pub unresolved: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Instance Reinstancer
// ─────────────────────────────────────────────────────────────────────────────

/// Replaces the live instances of one class with instances of its successor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceReinstancer {
    old_class: ClassId,
    new_class: ClassId,
}

impl InstanceReinstancer {
    pub fn new(old_class: ClassId, new_class: ClassId) -> Self {
        Self {
            old_class,
            new_class,
        }
    }

    pub fn old_class(&self) -> ClassId {
        self.old_class
    }

    pub fn new_class(&self) -> ClassId {
        self.new_class
    }

    /// Replace every instance of the old class.
    ///
    /// The instance set is staged before anything is mutated. Each instance is
    /// duplicated into a template, a replacement with the same name and outer
    /// is constructed under the new class, the template's state is copied into
    /// it, and the old instance and template are discarded. References to the
    /// old instances (and their subobjects) are then rewritten everywhere.
    pub fn reinstance_objects(&self, world: &mut dyn ObjectModel) -> ObjectResult<ReinstanceReport> {
        let mut report = ReinstanceReport::default();
        if self.old_class == self.new_class {
            return Ok(report);
        }

        let instances: BTreeSet<ObjectId> = world
            .instances_of(self.old_class)
            .into_iter()
            .filter(|id| world.object(*id).is_some_and(|o| !o.is_default_object()))
            .collect();
        if instances.is_empty() {
            return Ok(report);
        }

        // Outers before the instances they own, so an owner's replacement
        // exists by the time its nested instances are replaced
        let mut staged: Vec<(usize, ObjectId, bool)> = instances
            .iter()
            .map(|id| {
                let chain = outer_chain(&*world, *id);
                let nested = chain.iter().any(|outer| instances.contains(outer));
                (chain.len(), *id, nested)
            })
            .collect();
        staged.sort();

        // Nested instances are replaced on their own: detach them so their
        // owner's template and teardown leave them alone
        let mut detached = BTreeMap::new();
        for (_, id, nested) in &staged {
            if *nested {
                let object = world.object_mut(*id).ok_or(ObjectError::ObjectNotFound(*id))?;
                detached.insert(*id, object.outer.take());
            }
        }

        let mut reference_map = ObjectMap::new();
        let mut discard = Vec::with_capacity(staged.len() * 2);
        for (_, old_instance, _) in staged {
            let (name, outer, flags, linker) = {
                let object = world
                    .object(old_instance)
                    .ok_or(ObjectError::ObjectNotFound(old_instance))?;
                (
                    object.name.clone(),
                    detached.get(&old_instance).copied().unwrap_or(object.outer),
                    object.flags - ObjectFlags::LOAD_FLAGS,
                    object.linker,
                )
            };
            let outer = outer.map(|o| reference_map.get(&o).copied().unwrap_or(o));

            world.preload(old_instance)?;
            let template_map = world.duplicate(old_instance, None)?;
            let template = template_map[&old_instance];

            let replacement = world.spawn(self.new_class, &name, outer, flags)?;
            let copy = world.copy_properties_for_unrelated_objects(
                template,
                replacement,
                CopyOptions::instance_migration(),
            )?;

            // old -> template -> replacement
            for (original, copied) in &template_map {
                let target = if *copied == template {
                    replacement
                } else {
                    copy.subobjects.get(copied).copied().unwrap_or(*copied)
                };
                reference_map.insert(*original, target);
            }

            if let Some(slot) = linker {
                world.patch_export(slot.linker, slot.index, replacement)?;
            }

            tracing::debug!(%old_instance, %replacement, name = %name, "reinstanced object");
            report.replaced.insert(old_instance, replacement);
            discard.push(old_instance);
            discard.push(template);
        }

        for id in discard {
            world.destroy(id);
        }
        report.references_rewritten = world.replace_references(&reference_map, None);

        tracing::info!(
            old_class = %self.old_class,
            new_class = %self.new_class,
            instances = report.replaced.len(),
            "reinstanced live objects"
        );
        Ok(report)
    }

    /// Rebind compiled scripts from the old class to the new one
    pub fn update_bytecode_references(&self, world: &mut dyn ObjectModel) -> BytecodeFixupReport {
        update_bytecode_references(world, self.old_class, self.new_class)
    }

    /// Point classes deriving from the old class at the new one and bring
    /// their default objects and instances in line with the new layout
    pub fn reparent_child_classes(&self, world: &mut dyn ObjectModel) -> ObjectResult<Vec<ClassId>> {
        reparent_child_classes(world, self.old_class, self.new_class)
    }
}

/// Owners of an object, innermost first
fn outer_chain(world: &dyn ObjectModel, object: ObjectId) -> Vec<ObjectId> {
    let mut chain = Vec::new();
    let mut current = world.object(object).and_then(|o| o.outer);
    while let Some(outer) = current {
        if chain.contains(&outer) {
            break;
        }
        chain.push(outer);
        current = world.object(outer).and_then(|o| o.outer);
    }
    chain
}

// ─────────────────────────────────────────────────────────────────────────────
// Default Object Migration
// ─────────────────────────────────────────────────────────────────────────────

/// Actor properties the compiler computes and a default-object copy must not
/// overwrite
#[derive(Debug, Clone, PartialEq)]
struct SavedActorFlags {
    can_ever_tick: Option<Value>,
    can_be_damaged: Option<Value>,
}

impl SavedActorFlags {
    /// Capture the flags if the object's nearest native ancestor is the actor root
    fn capture(world: &dyn ObjectModel, object: ObjectId) -> Option<Self> {
        let target = world.object(object)?;
        let classes = world.classes();
        let native = classes.find_first_native_class(target.class)?;
        if classes.name_of(native) != ACTOR_CLASS {
            return None;
        }
        Some(Self {
            can_ever_tick: target.get(PROP_CAN_EVER_TICK).cloned(),
            can_be_damaged: target.get(PROP_CAN_BE_DAMAGED).cloned(),
        })
    }

    fn restore(self, world: &mut dyn ObjectModel, object: ObjectId) -> ObjectResult<()> {
        let target = world
            .object_mut(object)
            .ok_or(ObjectError::ObjectNotFound(object))?;
        if let Some(value) = self.can_ever_tick {
            target.set(PROP_CAN_EVER_TICK, value);
        }
        if let Some(value) = self.can_be_damaged {
            target.set(PROP_CAN_BE_DAMAGED, value);
        }
        Ok(())
    }
}

/// Carry state from the previous default object into the new one.
///
/// Default subobjects are replaced aggressively and matched by name. For
/// actor classes the compiler-computed tick and damage flags on the new
/// object survive the copy.
pub fn migrate_default_object(
    world: &mut dyn ObjectModel,
    old_cdo: ObjectId,
    new_cdo: ObjectId,
) -> ObjectResult<CopyReport> {
    let saved = SavedActorFlags::capture(world, new_cdo);
    let report = world.copy_properties_for_unrelated_objects(
        old_cdo,
        new_cdo,
        CopyOptions::default_object_migration(),
    )?;
    if let Some(saved) = saved {
        saved.restore(world, new_cdo)?;
    }
    tracing::debug!(
        %old_cdo,
        %new_cdo,
        copied = report.copied,
        dropped = report.dropped.len(),
        "migrated default object"
    );
    Ok(report)
}

/// Overlay the defaults of every blueprint-generated ancestor onto a new
/// default object, least derived first
pub fn propagate_parent_blueprint_defaults(
    world: &mut dyn ObjectModel,
    new_cdo: ObjectId,
) -> ObjectResult<usize> {
    let class = world
        .object(new_cdo)
        .map(|o| o.class)
        .ok_or(ObjectError::ObjectNotFound(new_cdo))?;

    let mut ancestors: Vec<ObjectId> = world
        .classes()
        .super_chain(class)
        .into_iter()
        .skip(1)
        .filter_map(|id| world.classes().get(id))
        .filter(|c| c.generated_by.is_some())
        .filter_map(|c| c.default_object)
        .collect();
    ancestors.reverse();

    let options = CopyOptions {
        aggressive_default_subobject_replacement: false,
        replace_class_references: false,
    };
    let mut copied = 0;
    for ancestor_cdo in ancestors {
        copied += world
            .copy_properties_for_unrelated_objects(ancestor_cdo, new_cdo, options)?
            .copied;
    }
    Ok(copied)
}

/// Pair the default subobjects of two objects by name, move export slots from
/// the old subobjects to their counterparts and rewrite references old -> new.
///
/// Old subobjects without a counterpart are left to die with their owner; new
/// ones without a counterpart keep their compiled defaults.
pub fn patch_default_subobjects(
    world: &mut dyn ObjectModel,
    old_owner: ObjectId,
    new_owner: ObjectId,
    loaded_objects: &mut Vec<ObjectId>,
) -> ObjectResult<ObjectMap> {
    let new_by_name: BTreeMap<String, ObjectId> = world
        .default_subobjects(new_owner)
        .into_iter()
        .filter_map(|id| world.object(id).map(|o| (o.name.clone(), id)))
        .collect();

    let mut map = ObjectMap::new();
    for old_sub in world.default_subobjects(old_owner) {
        let Some((name, linker)) = world.object(old_sub).map(|o| (o.name.clone(), o.linker)) else {
            continue;
        };
        let Some(new_sub) = new_by_name.get(&name).copied() else {
            tracing::debug!(subobject = %name, "no counterpart for default subobject");
            continue;
        };
        if let Some(slot) = linker {
            patch_new_cdo_into_linker(world, new_sub, slot.linker, slot.index, loaded_objects)?;
        }
        map.insert(old_sub, new_sub);
    }

    world.replace_references(&map, None);
    Ok(map)
}

// ─────────────────────────────────────────────────────────────────────────────
// Bytecode Fixup
// ─────────────────────────────────────────────────────────────────────────────

/// Rebind every compiled reference to `old_class` onto `new_class` by member
/// name. References to members the new class lacks are reported and left alone.
pub fn update_bytecode_references(
    world: &mut dyn ObjectModel,
    old_class: ClassId,
    new_class: ClassId,
) -> BytecodeFixupReport {
    let mut report = BytecodeFixupReport::default();
    if old_class == new_class {
        return report;
    }

    let registry = world.classes_mut();
    let targets: Vec<ClassId> = registry
        .ids()
        .filter(|id| *id != old_class)
        .filter(|id| registry.get(*id).is_some_and(|c| !c.is_retired()))
        .collect();

    for class_id in targets {
        let Some(mut functions) = registry
            .get_mut(class_id)
            .map(|c| std::mem::take(&mut c.functions))
        else {
            continue;
        };

        for function in &mut functions {
            let Some(script) = function.script.as_mut() else {
                continue;
            };
            for op in &mut script.ops {
                if op.class() != Some(old_class) {
                    continue;
                }
                let resolved = match op.member() {
                    None => true,
                    Some(member) if op.references_function() => {
                        registry.find_function(new_class, member).is_some()
                    }
                    Some(member) => registry.find_property(new_class, member).is_some(),
                };
                if resolved {
                    op.set_class(new_class);
                    report.rebound += 1;
                } else {
                    let member = op.member().unwrap_or_default();
                    let missing = format!("{}::{}", registry.name_of(new_class), member);
                    tracing::warn!(
                        function = %function.name,
                        member = %missing,
                        "compiled reference has no counterpart on regenerated class"
                    );
                    report.unresolved.push(missing);
                }
            }
        }

        if let Some(class) = registry.get_mut(class_id) {
            class.functions = functions;
        }
    }
    report
}

// ─────────────────────────────────────────────────────────────────────────────
// Child Classes
// ─────────────────────────────────────────────────────────────────────────────

/// Repoint direct children of `old_class` at `new_class`, then conform the
/// default objects and instances of every descendant to the new layout.
pub fn reparent_child_classes(
    world: &mut dyn ObjectModel,
    old_class: ClassId,
    new_class: ClassId,
) -> ObjectResult<Vec<ClassId>> {
    if old_class == new_class {
        return Ok(Vec::new());
    }
    let children: Vec<ClassId> = world
        .classes()
        .direct_children(old_class)
        .into_iter()
        .filter(|id| *id != new_class)
        .collect();
    for child in &children {
        if let Some(class) = world.classes_mut().get_mut(*child) {
            class.super_class = Some(new_class);
        }
    }

    // Parents before children so inherited defaults are already conformed
    let mut descendants: Vec<(usize, ClassId)> = world
        .classes()
        .ids()
        .filter(|id| *id != new_class)
        .filter(|id| world.classes().get(*id).is_some_and(|c| !c.is_retired()))
        .filter(|id| world.classes().is_child_of(*id, new_class))
        .map(|id| (world.classes().super_chain(id).len(), id))
        .collect();
    descendants.sort();

    for (_, class) in descendants {
        let parent_cdo = world
            .classes()
            .get(class)
            .and_then(|c| c.super_class)
            .and_then(|parent| world.classes().get(parent))
            .and_then(|p| p.default_object);
        let own_cdo = world.classes().get(class).and_then(|c| c.default_object);

        if let Some(cdo) = own_cdo {
            conform_object_to_layout(world, cdo, parent_cdo)?;
            world.instance_subobject_templates(cdo)?;
        }
        for instance in world.instances_of(class) {
            if Some(instance) != own_cdo {
                conform_object_to_layout(world, instance, own_cdo)?;
            }
        }
    }

    if !children.is_empty() {
        tracing::info!(%old_class, %new_class, children = children.len(), "reparented child classes");
    }
    Ok(children)
}

/// Point every current class implementing `old_class` at `new_class`
pub fn repoint_interface_references(
    world: &mut dyn ObjectModel,
    old_class: ClassId,
    new_class: ClassId,
) -> usize {
    let registry = world.classes_mut();
    let implementers: Vec<ClassId> = registry
        .ids()
        .filter(|id| {
            registry
                .get(*id)
                .is_some_and(|c| !c.is_retired() && c.interfaces.contains(&old_class))
        })
        .collect();
    for id in &implementers {
        if let Some(class) = registry.get_mut(*id) {
            for interface in &mut class.interfaces {
                if *interface == old_class {
                    *interface = new_class;
                }
            }
        }
    }
    implementers.len()
}

/// Drop properties the object's class no longer has and add the ones it
/// gained, taking values from `defaults` when it has them
fn conform_object_to_layout(
    world: &mut dyn ObjectModel,
    object: ObjectId,
    defaults: Option<ObjectId>,
) -> ObjectResult<()> {
    let class = world
        .object(object)
        .map(|o| o.class)
        .ok_or(ObjectError::ObjectNotFound(object))?;
    let layout: Vec<(String, Value)> = world
        .classes()
        .all_properties(class)
        .into_iter()
        .map(|p| (p.name.clone(), Value::default_for(&p.ty)))
        .collect();
    let default_values = defaults
        .and_then(|d| world.object(d))
        .map(|d| d.properties.clone())
        .unwrap_or_default();

    let target = world
        .object_mut(object)
        .ok_or(ObjectError::ObjectNotFound(object))?;
    target
        .properties
        .retain(|name, _| layout.iter().any(|(n, _)| n == name));
    for (name, zero) in layout {
        if !target.properties.contains_key(&name) {
            let value = default_values.get(&name).cloned().unwrap_or(zero);
            target.properties.insert(name, value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InstanceRegistry, ObjectWorld};
    use blueprint_types::{
        ClassDef, ClassFlags, FunctionDef, PinType, PropertyDef, Script, ScriptOp,
    };

    struct Fixture {
        world: ObjectWorld,
        actor: ClassId,
        component: ClassId,
    }

    fn fixture() -> Fixture {
        let mut world = ObjectWorld::new();
        let object = world
            .register_class(ClassDef::new("Object").with_flags(ClassFlags::NATIVE))
            .unwrap();
        let component = world
            .register_class(
                ClassDef::new("SceneComponent")
                    .with_super(object)
                    .with_flags(ClassFlags::NATIVE)
                    .with_property(PropertyDef::new("Visible", PinType::Boolean)),
            )
            .unwrap();
        let actor = world
            .register_class(
                ClassDef::new(ACTOR_CLASS)
                    .with_super(object)
                    .with_flags(ClassFlags::NATIVE)
                    .with_property(PropertyDef::new(PROP_CAN_EVER_TICK, PinType::Boolean))
                    .with_property(PropertyDef::new(PROP_CAN_BE_DAMAGED, PinType::Boolean)),
            )
            .unwrap();
        Fixture {
            world,
            actor,
            component,
        }
    }

    /// Register a generated class `name` under `parent` with one component
    fn generated(f: &mut Fixture, name: &str, props: &[(&str, PinType)]) -> ClassId {
        let mut def = ClassDef::new(name)
            .with_super(f.actor)
            .with_flags(ClassFlags::COMPILED_FROM_BLUEPRINT);
        def.generated_by = Some(format!("bp-{}", name));
        for (prop, ty) in props {
            def = def.with_property(PropertyDef::new(*prop, ty.clone()));
        }
        let class = f.world.register_class(def).unwrap();
        let cdo = f.world.default_object(class).unwrap();
        f.world
            .spawn(f.component, "Mesh", Some(cdo), ObjectFlags::DEFAULT_SUBOBJECT)
            .unwrap();
        class
    }

    #[test]
    fn test_reinstance_preserves_state_and_references() {
        let mut f = fixture();
        let old = generated(&mut f, "Door_C", &[("Angle", PinType::Real), ("Gone", PinType::Integer)]);
        let a = f.world.spawn(old, "Door_A", None, ObjectFlags::empty()).unwrap();
        let b = f.world.spawn(old, "Door_B", None, ObjectFlags::empty()).unwrap();
        f.world.set_property(a, "Angle", 45.0).unwrap();

        // Something outside the class points at an instance
        let holder = f
            .world
            .register_class(
                ClassDef::new("Holder")
                    .with_flags(ClassFlags::NATIVE)
                    .with_property(PropertyDef::new("Target", PinType::object("Door_C"))),
            )
            .unwrap();
        let holder_obj = f.world.spawn(holder, "H", None, ObjectFlags::empty()).unwrap();
        f.world.set_property(holder_obj, "Target", a).unwrap();

        f.world.classes_mut().retire(old).unwrap();
        let new = generated(&mut f, "Door_C", &[("Angle", PinType::Real), ("Extra", PinType::Boolean)]);

        let report = InstanceReinstancer::new(old, new)
            .reinstance_objects(&mut f.world)
            .unwrap();

        assert_eq!(report.replaced.len(), 2);
        let new_a = report.replaced[&a];
        assert!(f.world.object(a).is_none());
        assert!(f.world.object(b).is_none());
        assert_eq!(f.world.object(new_a).unwrap().name, "Door_A");
        assert_eq!(f.world.object(new_a).unwrap().class, new);
        assert_eq!(f.world.property(new_a, "Angle"), Some(&Value::Float(45.0)));
        assert_eq!(f.world.property(new_a, "Extra"), Some(&Value::Bool(false)));
        assert!(f.world.property(new_a, "Gone").is_none());
        assert_eq!(f.world.property(holder_obj, "Target"), Some(&Value::Object(Some(new_a))));
        assert!(f.world.instances_of(old).iter().all(|id| {
            f.world.object(*id).is_some_and(|o| o.is_default_object())
        }));

        // Second run has nothing left to do
        let again = InstanceReinstancer::new(old, new)
            .reinstance_objects(&mut f.world)
            .unwrap();
        assert!(again.replaced.is_empty());
    }

    #[test]
    fn test_nested_instances_are_replaced_under_their_new_owner() {
        let mut f = fixture();
        let props = [("Angle", PinType::Real), ("Inner", PinType::object("Door_C"))];
        let old = generated(&mut f, "Door_C", &props);
        let outer = f.world.spawn(old, "Outer", None, ObjectFlags::empty()).unwrap();
        let inner = f.world.spawn(old, "Inner", Some(outer), ObjectFlags::empty()).unwrap();
        f.world.set_property(inner, "Angle", 30.0).unwrap();
        f.world.set_property(outer, "Inner", inner).unwrap();

        f.world.classes_mut().retire(old).unwrap();
        let new = generated(&mut f, "Door_C", &[props[0].clone(), props[1].clone(), ("Locked", PinType::Boolean)]);

        let report = InstanceReinstancer::new(old, new)
            .reinstance_objects(&mut f.world)
            .unwrap();

        assert_eq!(report.replaced.len(), 2);
        let new_outer = report.replaced[&outer];
        let new_inner = report.replaced[&inner];
        let replaced_inner = f.world.object(new_inner).unwrap();
        assert_eq!(replaced_inner.name, "Inner");
        assert_eq!(replaced_inner.class, new);
        assert_eq!(replaced_inner.outer, Some(new_outer));
        assert_eq!(f.world.property(new_inner, "Angle"), Some(&Value::Float(30.0)));
        assert_eq!(f.world.property(new_outer, "Inner"), Some(&Value::Object(Some(new_inner))));

        // No stale copies of the old class, and nothing under the new owner twice
        assert!(f.world.instances_of(old).iter().all(|id| {
            f.world.object(*id).is_some_and(|o| o.is_default_object())
        }));
        let live: Vec<ObjectId> = f
            .world
            .instances_of(new)
            .into_iter()
            .filter(|id| f.world.object(*id).is_some_and(|o| !o.is_default_object()))
            .collect();
        assert_eq!(live.len(), 2);
        let owned_doors = f
            .world
            .objects_with_outer(new_outer)
            .into_iter()
            .filter(|id| f.world.object(*id).is_some_and(|o| o.class == new))
            .count();
        assert_eq!(owned_doors, 1);
    }

    #[test]
    fn test_migrate_default_object_keeps_compiled_actor_flags() {
        let mut f = fixture();
        let old = generated(&mut f, "Turret_C", &[("Range", PinType::Real)]);
        let old_cdo = f.world.default_object(old).unwrap();
        f.world.set_property(old_cdo, "Range", 900.0).unwrap();
        f.world.set_property(old_cdo, PROP_CAN_EVER_TICK, false).unwrap();

        f.world.classes_mut().retire(old).unwrap();
        let new = generated(&mut f, "Turret_C", &[("Range", PinType::Real)]);
        let new_cdo = f.world.default_object(new).unwrap();
        f.world.set_property(new_cdo, PROP_CAN_EVER_TICK, true).unwrap();

        migrate_default_object(&mut f.world, old_cdo, new_cdo).unwrap();

        assert_eq!(f.world.property(new_cdo, "Range"), Some(&Value::Float(900.0)));
        assert_eq!(f.world.property(new_cdo, PROP_CAN_EVER_TICK), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_flags_not_preserved_outside_actor_hierarchy() {
        let mut f = fixture();
        let thing = f
            .world
            .register_class(
                ClassDef::new("Thing")
                    .with_flags(ClassFlags::NATIVE)
                    .with_property(PropertyDef::new(PROP_CAN_EVER_TICK, PinType::Boolean)),
            )
            .unwrap();
        let old_cdo = f.world.default_object(thing).unwrap();
        let new_cdo = f.world.create_default_object(thing).unwrap();
        f.world.set_property(old_cdo, PROP_CAN_EVER_TICK, true).unwrap();

        migrate_default_object(&mut f.world, old_cdo, new_cdo).unwrap();
        assert_eq!(f.world.property(new_cdo, PROP_CAN_EVER_TICK), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_components_pair_by_name() {
        let mut f = fixture();
        let old = generated(&mut f, "Lamp_C", &[]);
        let old_cdo = f.world.default_object(old).unwrap();
        let old_mesh = f.world.default_subobjects(old_cdo)[0];
        f.world.set_property(old_mesh, "Visible", true).unwrap();
        let linker = f.world.create_linker("/Game/Lamp");
        f.world.add_export(linker, old_mesh).unwrap();

        f.world.classes_mut().retire(old).unwrap();
        let new = generated(&mut f, "Lamp_C", &[]);
        let new_cdo = f.world.default_object(new).unwrap();
        let new_mesh = f.world.default_subobjects(new_cdo)[0];

        migrate_default_object(&mut f.world, old_cdo, new_cdo).unwrap();
        let mut loaded = Vec::new();
        let map = patch_default_subobjects(&mut f.world, old_cdo, new_cdo, &mut loaded).unwrap();

        assert_eq!(map.get(&old_mesh), Some(&new_mesh));
        assert_eq!(f.world.property(new_mesh, "Visible"), Some(&Value::Bool(true)));
        assert_eq!(f.world.linker(linker).unwrap().exports[0].object, Some(new_mesh));
    }

    #[test]
    fn test_bytecode_rebinds_by_name() {
        let mut f = fixture();
        let old = generated(&mut f, "Target_C", &[("Armor", PinType::Real)]);
        f.world
            .classes_mut()
            .get_mut(old)
            .unwrap()
            .functions
            .push(FunctionDef::new("Hit"));

        let mut caller_fn = FunctionDef::new("Attack");
        caller_fn.script = Some(Script::new(vec![
            ScriptOp::CallFunction {
                class: old,
                function: "Hit".into(),
            },
            ScriptOp::ReadVariable {
                class: old,
                property: "Armor".into(),
            },
            ScriptOp::LoadClass { class: old },
        ]));
        let caller = f
            .world
            .register_class(ClassDef::new("Caller_C").with_function(caller_fn))
            .unwrap();

        f.world.classes_mut().retire(old).unwrap();
        let new = generated(&mut f, "Target_C", &[("Shield", PinType::Real)]);
        f.world
            .classes_mut()
            .get_mut(new)
            .unwrap()
            .functions
            .push(FunctionDef::new("Hit"));

        let report = update_bytecode_references(&mut f.world, old, new);
        assert_eq!(report.rebound, 2);
        assert_eq!(report.unresolved, vec!["Target_C::Armor".to_string()]);

        let ops = &f.world.classes().get(caller).unwrap().functions[0]
            .script
            .as_ref()
            .unwrap()
            .ops;
        assert_eq!(ops[0].class(), Some(new));
        assert_eq!(ops[1].class(), Some(old));
        assert_eq!(ops[2].class(), Some(new));
    }

    #[test]
    fn test_reparent_child_conforms_layout() {
        let mut f = fixture();
        let old_parent = generated(&mut f, "Base_C", &[("Old", PinType::Integer)]);
        let child = f
            .world
            .register_class(
                ClassDef::new("Child_C")
                    .with_super(old_parent)
                    .with_property(PropertyDef::new("Own", PinType::Real)),
            )
            .unwrap();
        let child_instance = f.world.spawn(child, "Child_0", None, ObjectFlags::empty()).unwrap();

        f.world.classes_mut().retire(old_parent).unwrap();
        let new_parent = generated(&mut f, "Base_C", &[("Fresh", PinType::Integer)]);
        let new_parent_cdo = f.world.default_object(new_parent).unwrap();
        f.world.set_property(new_parent_cdo, "Fresh", 3).unwrap();

        let children = reparent_child_classes(&mut f.world, old_parent, new_parent).unwrap();
        assert_eq!(children, vec![child]);
        assert_eq!(f.world.classes().get(child).unwrap().super_class, Some(new_parent));

        let child_cdo = f.world.default_object(child).unwrap();
        assert_eq!(f.world.property(child_cdo, "Fresh"), Some(&Value::Int(3)));
        assert!(f.world.property(child_cdo, "Old").is_none());
        assert_eq!(f.world.property(child_instance, "Fresh"), Some(&Value::Int(3)));
        assert!(f.world.property(child_instance, "Old").is_none());
    }

    #[test]
    fn test_interface_implementers_follow_regenerated_interface() {
        let mut f = fixture();
        let old_interface = f
            .world
            .register_class(ClassDef::new("Usable_C").with_flags(ClassFlags::INTERFACE))
            .unwrap();
        let lever = f
            .world
            .register_class(ClassDef::new("Lever_C").with_super(f.actor).with_interface(old_interface))
            .unwrap();

        f.world.classes_mut().retire(old_interface).unwrap();
        let new_interface = f
            .world
            .register_class(ClassDef::new("Usable_C").with_flags(ClassFlags::INTERFACE))
            .unwrap();

        assert_eq!(repoint_interface_references(&mut f.world, old_interface, new_interface), 1);
        assert!(f.world.classes().implements_interface(lever, new_interface));
    }

    #[test]
    fn test_propagate_parent_blueprint_defaults() {
        let mut f = fixture();
        let base = generated(&mut f, "Base_C", &[("Speed", PinType::Real)]);
        let base_cdo = f.world.default_object(base).unwrap();
        let mut def = ClassDef::new("Fast_C").with_super(base);
        def.generated_by = Some("bp-fast".into());
        let fast = f.world.register_class(def).unwrap();
        let fast_cdo = f.world.default_object(fast).unwrap();

        f.world.set_property(base_cdo, "Speed", 600.0).unwrap();
        let copied = propagate_parent_blueprint_defaults(&mut f.world, fast_cdo).unwrap();
        assert!(copied > 0);
        assert_eq!(f.world.property(fast_cdo, "Speed"), Some(&Value::Float(600.0)));
    }
}
