//! Class regeneration
//!
//! `ClassRegenerator::regenerate` is the load-time entry point: it decides
//! whether an asset needs its class rebuilt, runs the conformance passes and
//! the compile, and records the outcome on the asset. `integrate` swaps a
//! freshly compiled class into the world and is shared with explicit compiles.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use blueprint_runtime::{
    InstanceReinstancer, LinkerSlot, ObjectError, ObjectModel, migrate_default_object, patch_default_subobjects,
    patch_new_cdo_into_linker, propagate_parent_blueprint_defaults, repoint_interface_references,
};
use blueprint_types::{
    Blueprint, BlueprintStatus, ClassFlags, ClassId, CompilerResultsLog, ObjectId, RegenerationOutcome,
    RegenerationPhase, Value,
};

use crate::{BlueprintError, BlueprintResult, CompileOrchestrator, ConformancePass, apply_asset_defaults, refresh_all_nodes};

// ─────────────────────────────────────────────────────────────────────────────
// Previous Class
// ─────────────────────────────────────────────────────────────────────────────

/// The class a compile replaces, captured before anything is compiled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviousClass {
    pub class: Option<ClassId>,
    /// Default object the new default object takes its state from
    pub cdo: Option<ObjectId>,
    /// Export slots occupied by the previous default objects
    pub export_slots: Vec<LinkerSlot>,
}

impl PreviousClass {
    /// Capture `class` and the default object handed in by the loader, which
    /// wins over the class's own default object when both exist
    pub fn capture(world: &dyn ObjectModel, class: Option<ClassId>, previous_cdo: Option<ObjectId>) -> Self {
        let class_cdo = class
            .and_then(|c| world.classes().get(c))
            .and_then(|c| c.default_object);

        let mut export_slots = Vec::new();
        for object in [class_cdo, previous_cdo].into_iter().flatten() {
            if let Some(slot) = world.object(object).and_then(|o| o.linker) {
                if !export_slots.contains(&slot) {
                    export_slots.push(slot);
                }
            }
        }

        Self {
            class,
            cdo: previous_cdo.or(class_cdo),
            export_slots,
        }
    }
}

/// What integrating a new class did to the world
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrationReport {
    /// Instances replaced by instances of the new class
    pub replaced: usize,
    /// Compiled references rebound to the new class
    pub rebound: usize,
    pub unresolved: Vec<String>,
    /// Classes that now derive from the new class
    pub reparented: Vec<ClassId>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Class Regenerator
// ─────────────────────────────────────────────────────────────────────────────

/// Regenerates the class of a loaded asset
pub struct ClassRegenerator<'a> {
    orchestrator: &'a CompileOrchestrator,
}

impl<'a> ClassRegenerator<'a> {
    pub fn new(orchestrator: &'a CompileOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Bring a loaded asset's class up to date.
    ///
    /// Returns the class callers should use from now on: the new class on
    /// success, the existing class for assets that need no compile, and
    /// `None` when compilation failed (the previous class stays alive).
    pub fn regenerate(
        &self,
        blueprint: &mut Blueprint,
        world: &mut dyn ObjectModel,
        old_class: Option<ClassId>,
        previous_cdo: Option<ObjectId>,
        loaded_objects: &mut Vec<ObjectId>,
        log: &mut CompilerResultsLog,
    ) -> BlueprintResult<Option<ClassId>> {
        let settings = self.orchestrator.settings();
        let should_regenerate = !settings.force_disable_compile_on_load
            && blueprint.state.recompile_on_load
            && !blueprint.state.has_been_regenerated;

        if !should_regenerate || !blueprint.try_begin_regeneration() {
            tracing::debug!(blueprint = %blueprint.id, "regeneration skipped");
            if !blueprint.state.regeneration.is_active() {
                blueprint.state.regeneration = RegenerationPhase::Done(RegenerationOutcome::NoOp);
            }
            let current_cdo = blueprint
                .state
                .generated_class
                .and_then(|c| world.classes().get(c))
                .and_then(|c| c.default_object);
            if let (Some(previous), Some(current)) = (previous_cdo, current_cdo) {
                if previous != current && world.object(previous).is_some() {
                    migrate_default_object(world, previous, current)?;
                }
            }
            return Ok(blueprint.state.generated_class);
        }

        blueprint.state.is_regenerating_on_load = true;
        let result = self.run(blueprint, world, old_class, previous_cdo, loaded_objects, log);
        let outcome = match &result {
            Ok((outcome, _)) => *outcome,
            Err(err) => {
                tracing::error!(blueprint = %blueprint.id, error = %err, "regeneration failed");
                blueprint.state.being_compiled = false;
                blueprint.status = BlueprintStatus::Error;
                RegenerationOutcome::Fail
            }
        };

        blueprint.state.has_been_regenerated =
            !blueprint.is_data_only() || blueprint.state.generated_class.is_some();
        blueprint.state.is_regenerating_on_load = false;
        blueprint.state.recompile_on_load = false;
        blueprint.state.regeneration = RegenerationPhase::Done(outcome);
        tracing::info!(blueprint = %blueprint.id, ?outcome, "class regeneration finished");

        result.map(|(_, class)| class)
    }

    fn run(
        &self,
        blueprint: &mut Blueprint,
        world: &mut dyn ObjectModel,
        old_class: Option<ClassId>,
        previous_cdo: Option<ObjectId>,
        loaded_objects: &mut Vec<ObjectId>,
        log: &mut CompilerResultsLog,
    ) -> BlueprintResult<(RegenerationOutcome, Option<ClassId>)> {
        let previous = PreviousClass::capture(world, old_class.or(blueprint.state.generated_class), previous_cdo);
        let preloaded = preload_dependencies(blueprint, world, &previous)?;
        tracing::debug!(blueprint = %blueprint.id, preloaded, "preloaded dependencies");

        blueprint.state.regeneration = RegenerationPhase::Conforming;
        if blueprint.is_macro_library() {
            refresh_all_nodes(blueprint, world, self.orchestrator, log)?;
            return Ok((RegenerationOutcome::NoOp, None));
        }

        if blueprint.is_data_only() {
            let Some(class) = blueprint.state.generated_class else {
                return Ok((RegenerationOutcome::NoOp, None));
            };
            conform_flags_and_components(blueprint, world, class, log)?;
            self.migrate_data_only_defaults(blueprint, world, class, previous_cdo)?;
            return Ok((RegenerationOutcome::NoOp, Some(class)));
        }

        let report = ConformancePass::new(world.classes()).run(blueprint, log)?;
        if report.structurally_modified {
            tracing::debug!(blueprint = %blueprint.id, "conformance changed the asset");
        }
        refresh_all_nodes(blueprint, world, self.orchestrator, log)?;

        blueprint.state.regeneration = RegenerationPhase::Compiling;
        let class = self
            .orchestrator
            .compile_full(blueprint, world, previous, loaded_objects, log)?;
        let outcome = if class.is_some() {
            RegenerationOutcome::Success
        } else {
            RegenerationOutcome::Fail
        };
        Ok((outcome, class))
    }

    /// Data-only assets keep their class; only the previous default values
    /// are carried over
    fn migrate_data_only_defaults(
        &self,
        blueprint: &mut Blueprint,
        world: &mut dyn ObjectModel,
        class: ClassId,
        previous_cdo: Option<ObjectId>,
    ) -> BlueprintResult<()> {
        let generated_cdo = world.classes().get(class).and_then(|c| c.default_object);
        let skeleton_cdo = blueprint
            .state
            .skeleton_class
            .and_then(|c| world.classes().get(c))
            .and_then(|c| c.default_object);

        // The skeleton's default object is stale when the full class holds
        // the real defaults
        if blueprint.state.generated_class_authoritative && previous_cdo.is_some() && previous_cdo == skeleton_cdo {
            blueprint.state.innermost_previous_cdo = generated_cdo;
        }

        blueprint.state.regeneration = RegenerationPhase::MigratingDefaults;
        let source = blueprint.state.innermost_previous_cdo.take().or(previous_cdo);
        if let (Some(source), Some(target)) = (source, generated_cdo) {
            if source != target && world.object(source).is_some() {
                migrate_default_object(world, source, target)?;
            }
        }
        Ok(())
    }

    /// Swap a freshly compiled class into the world.
    ///
    /// The new default object takes over the export slots of the previous
    /// ones, inherits blueprint-parent and previous default values, and the
    /// asset's own defaults are applied on top. Live instances of the
    /// previous class are then replaced, compiled references rebound and
    /// subclasses moved under the new class.
    pub fn integrate(
        blueprint: &mut Blueprint,
        world: &mut dyn ObjectModel,
        previous: PreviousClass,
        new_class: ClassId,
        loaded_objects: &mut Vec<ObjectId>,
        log: &mut CompilerResultsLog,
    ) -> BlueprintResult<IntegrationReport> {
        let tracked = blueprint.state.regeneration.is_active();
        let enter = |blueprint: &mut Blueprint, phase: RegenerationPhase| {
            if tracked {
                blueprint.state.regeneration = phase;
            }
        };
        let new_cdo = world
            .classes()
            .expect_class(new_class)?
            .default_object
            .ok_or(ObjectError::NoDefaultObject(new_class))?;

        enter(blueprint, RegenerationPhase::PatchingLinkerReferences);
        for slot in &previous.export_slots {
            patch_new_cdo_into_linker(world, new_cdo, slot.linker, slot.index, loaded_objects).map_err(|err| match err {
                ObjectError::ExportOutOfRange { .. } => BlueprintError::InvariantViolation(err.to_string()),
                other => other.into(),
            })?;
        }

        enter(blueprint, RegenerationPhase::MigratingDefaults);
        propagate_parent_blueprint_defaults(world, new_cdo)?;
        let source = blueprint.state.innermost_previous_cdo.take().or(previous.cdo);
        if let Some(old_cdo) = source.filter(|o| *o != new_cdo && world.object(*o).is_some()) {
            migrate_default_object(world, old_cdo, new_cdo)?;
            patch_default_subobjects(world, old_cdo, new_cdo, loaded_objects)?;
            let mut reapplied = CompilerResultsLog::info_only();
            apply_asset_defaults(world, blueprint, new_cdo, &mut reapplied)?;
        }

        let mut report = IntegrationReport::default();
        if let Some(old_class) = previous.class.filter(|c| *c != new_class) {
            let reinstancer = InstanceReinstancer::new(old_class, new_class);
            report.replaced = reinstancer.reinstance_objects(world)?.replaced.len();
            let fixup = reinstancer.update_bytecode_references(world);
            report.rebound = fixup.rebound;
            report.unresolved = fixup.unresolved;
            report.reparented = reinstancer.reparent_child_classes(world)?;
            repoint_interface_references(world, old_class, new_class);
            world.replace_class_references(&BTreeMap::from([(old_class, new_class)]));
        }

        if !report.unresolved.is_empty() {
            log.note(format!(
                "{} compiled references to {} could not be rebound",
                report.unresolved.len(),
                blueprint.generated_class_name()
            ));
        }
        tracing::info!(
            blueprint = %blueprint.id,
            class = %new_class,
            replaced = report.replaced,
            rebound = report.rebound,
            "class regenerated"
        );
        Ok(report)
    }
}

/// Load every object the regeneration reads: the previous default objects,
/// interface and component class defaults, and everything they own
fn preload_dependencies(
    blueprint: &Blueprint,
    world: &mut dyn ObjectModel,
    previous: &PreviousClass,
) -> BlueprintResult<usize> {
    let mut roots: Vec<ObjectId> = previous.cdo.into_iter().collect();
    roots.extend(
        previous
            .class
            .and_then(|c| world.classes().get(c))
            .and_then(|c| c.default_object),
    );
    let referenced = blueprint
        .implemented_interfaces
        .iter()
        .map(|i| i.interface.as_str())
        .chain(blueprint.components.iter().map(|c| c.class.as_str()));
    for name in referenced {
        roots.extend(
            world
                .classes()
                .find(name)
                .and_then(|id| world.classes().get(id))
                .and_then(|c| c.default_object),
        );
    }

    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from(roots);
    let mut loaded = 0;
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        if world.object(id).is_some_and(|o| o.needs_load()) {
            world.preload(id)?;
            loaded += 1;
        }
        queue.extend(world.objects_with_outer(id));
    }
    Ok(loaded)
}

/// Bring a data-only class in line with its parent without compiling: class
/// flags, super class, inherited property layout and default subobjects
fn conform_flags_and_components(
    blueprint: &mut Blueprint,
    world: &mut dyn ObjectModel,
    class: ClassId,
    log: &mut CompilerResultsLog,
) -> BlueprintResult<()> {
    let Some(parent) = world.classes().find(&blueprint.parent_class) else {
        log.error(format!(
            "Parent class {} of {} not found",
            blueprint.parent_class, blueprint.name
        ));
        blueprint.status = BlueprintStatus::Error;
        return Ok(());
    };
    let parent_flags = world.classes().expect_class(parent)?.flags;

    let (reparented, cdo) = {
        let def = world
            .classes_mut()
            .get_mut(class)
            .ok_or(blueprint_types::ClassRegistryError::ClassNotFound(class))?;
        let reparented = def.super_class != Some(parent);
        def.flags = (def.flags - ClassFlags::SCRIPT_INHERIT) | (parent_flags & ClassFlags::SCRIPT_INHERIT);
        def.super_class = Some(parent);
        (reparented, def.default_object)
    };
    let Some(cdo) = cdo else {
        return Ok(());
    };

    if reparented {
        log.note(format!("{} now derives from {}", blueprint.name, blueprint.parent_class));
        let layout: Vec<_> = world
            .classes()
            .all_properties(class)
            .into_iter()
            .map(|p| (p.name.clone(), p.ty.clone()))
            .collect();
        let inherited: BTreeMap<String, Value> = world
            .classes()
            .get(parent)
            .and_then(|p| p.default_object)
            .and_then(|o| world.object(o))
            .map(|o| o.properties.clone())
            .unwrap_or_default();
        let object = world.object_mut(cdo).ok_or(ObjectError::ObjectNotFound(cdo))?;
        object
            .properties
            .retain(|name, _| layout.iter().any(|(n, _)| n == name));
        for (name, ty) in &layout {
            if !object.properties.contains_key(name) {
                let value = inherited.get(name).cloned().unwrap_or_else(|| Value::default_for(ty));
                object.properties.insert(name.clone(), value);
            }
        }
    }

    let created = world.instance_subobject_templates(cdo)?;
    if created > 0 {
        tracing::debug!(blueprint = %blueprint.id, created, "instanced inherited components");
    }
    Ok(())
}
