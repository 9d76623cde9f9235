//! Compile orchestration
//!
//! Picks the compile mode, sequences the backend calls and owns the status
//! transitions of the asset being compiled.

use std::sync::Arc;

use blueprint_runtime::{ObjectModel, update_bytecode_references};
use blueprint_types::{
    Blueprint, BlueprintStatus, ClassId, CompileOptions, CompileType, CompilerResultsLog, ObjectId, StructRegistry,
    StructStatus,
};

use crate::{BlueprintError, BlueprintResult, ClassRegenerator, CompilerBackend, CompilerSettings, PreviousClass};

/// Drives a `CompilerBackend` and integrates what it produces
pub struct CompileOrchestrator {
    backend: Box<dyn CompilerBackend>,
    structs: Arc<StructRegistry>,
    settings: CompilerSettings,
}

impl CompileOrchestrator {
    pub fn new(backend: impl CompilerBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            structs: StructRegistry::new_shared(),
            settings: CompilerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: CompilerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share a struct registry with the host
    pub fn with_structs(mut self, structs: Arc<StructRegistry>) -> Self {
        self.structs = structs;
        self
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    pub fn structs(&self) -> &Arc<StructRegistry> {
        &self.structs
    }

    pub fn backend(&self) -> &dyn CompilerBackend {
        self.backend.as_ref()
    }

    /// Signature-only compile; the asset's skeleton class is replaced
    pub fn compile_skeleton(
        &self,
        blueprint: &mut Blueprint,
        world: &mut dyn ObjectModel,
        log: &mut CompilerResultsLog,
    ) -> Option<ClassId> {
        let output = self
            .backend
            .compile(blueprint, &CompileOptions::skeleton_only(), log, world);
        if output.skeleton_class.is_some() {
            blueprint.state.skeleton_class = output.skeleton_class;
        }
        output.skeleton_class
    }

    /// Compile every dirty user-defined structure. Does nothing unless
    /// structure editing is enabled; returns how many were compiled.
    pub fn compile_structures(&self, log: &mut CompilerResultsLog) -> usize {
        if !self.settings.structure_editing_enabled {
            return 0;
        }
        let mut compiled = 0;
        for id in self.structs.dirty_structs() {
            let Some(def) = self.structs.get(&id) else {
                continue;
            };
            let status = if self.backend.compile_user_defined_structure(&def, log) {
                StructStatus::UpToDate
            } else {
                StructStatus::Error
            };
            match self.structs.set_status(&id, status) {
                Ok(()) => compiled += 1,
                Err(err) => tracing::warn!(error = %err, "structure vanished while compiling"),
            }
        }
        if compiled > 0 {
            tracing::debug!(compiled, "compiled user-defined structures");
        }
        compiled
    }

    /// Full compile followed by integration of the new class.
    ///
    /// A class is generated and integrated unless the backend itself logs an
    /// error; the previous class then stays in place. Errors already in the
    /// log (conformance drift the pass could not repair) still leave the
    /// asset in `Error`, but do not block the compile.
    pub fn compile_full(
        &self,
        blueprint: &mut Blueprint,
        world: &mut dyn ObjectModel,
        previous: PreviousClass,
        loaded_objects: &mut Vec<ObjectId>,
        log: &mut CompilerResultsLog,
    ) -> BlueprintResult<Option<ClassId>> {
        self.compile_full_with(blueprint, world, previous, &CompileOptions::full(), loaded_objects, log)
    }

    /// Full compile with explicit options. The compile type is always full.
    ///
    /// A duplication-instigated compile never integrates against `previous`:
    /// the class it names belongs to the asset that was duplicated.
    pub fn compile_full_with(
        &self,
        blueprint: &mut Blueprint,
        world: &mut dyn ObjectModel,
        previous: PreviousClass,
        options: &CompileOptions,
        loaded_objects: &mut Vec<ObjectId>,
        log: &mut CompilerResultsLog,
    ) -> BlueprintResult<Option<ClassId>> {
        let options = CompileOptions {
            compile_type: CompileType::Full,
            ..*options
        };
        let previous = if options.is_duplication_instigated {
            PreviousClass::default()
        } else {
            previous
        };

        tracing::info!(blueprint = %blueprint.id, "full compile started");
        blueprint.state.being_compiled = true;
        let errors_before = log.num_errors;
        let output = self.backend.compile(blueprint, &options, log, world);
        let compiled = log.num_errors == errors_before;
        if output.skeleton_class.is_some() {
            blueprint.state.skeleton_class = output.skeleton_class;
        }

        let result = match output.generated_class {
            Some(class) if compiled => {
                blueprint.state.generated_class = Some(class);
                ClassRegenerator::integrate(blueprint, world, previous, class, loaded_objects, log)
                    .map(|_| Some(class))
            }
            _ => Ok(None),
        };
        blueprint.state.being_compiled = false;
        blueprint.status = match &result {
            Ok(Some(_)) if !log.has_errors() => BlueprintStatus::UpToDate,
            _ => BlueprintStatus::Error,
        };
        blueprint.state.intermediate_graphs = if options.save_intermediate_products {
            blueprint.all_graphs().cloned().collect()
        } else {
            Vec::new()
        };

        tracing::info!(
            blueprint = %blueprint.id,
            status = ?blueprint.status,
            errors = log.num_errors,
            warnings = log.num_warnings,
            "full compile finished"
        );
        result
    }

    /// Regenerate function bodies against the existing generated class.
    ///
    /// The class keeps its identity. References the bodies still hold to
    /// retired classes are rebound to the current version afterwards.
    pub fn compile_bytecode(
        &self,
        blueprint: &mut Blueprint,
        world: &mut dyn ObjectModel,
        log: &mut CompilerResultsLog,
    ) -> BlueprintResult<Option<ClassId>> {
        if blueprint.state.generated_class.is_none() {
            return Err(BlueprintError::MissingGeneratedClass(blueprint.id.clone()));
        }
        blueprint.state.being_compiled = true;
        let output = self
            .backend
            .compile(blueprint, &CompileOptions::bytecode_only(), log, world);
        blueprint.state.being_compiled = false;

        let Some(class) = output.generated_class else {
            blueprint.status = BlueprintStatus::Error;
            return Ok(None);
        };
        let rebound = rebind_retired_references(world, class);
        tracing::debug!(blueprint = %blueprint.id, rebound, "bytecode recompiled");
        Ok(Some(class))
    }
}

/// Point references from `class`'s bodies at retired classes to the current
/// class of the same name
fn rebind_retired_references(world: &mut dyn ObjectModel, class: ClassId) -> usize {
    let Some(def) = world.classes().get(class) else {
        return 0;
    };
    let mut stale: Vec<ClassId> = def
        .functions
        .iter()
        .filter_map(|f| f.script.as_ref())
        .flat_map(|s| s.ops.iter().filter_map(|op| op.class()))
        .filter(|id| world.classes().get(*id).is_some_and(|c| c.is_retired()))
        .collect();
    stale.sort();
    stale.dedup();

    let mut rebound = 0;
    for retired in stale {
        let current = world
            .classes()
            .get(retired)
            .and_then(|c| retired_class_name(&c.name))
            .and_then(|name| world.classes().find(name));
        if let Some(current) = current {
            rebound += update_bytecode_references(world, retired, current).rebound;
        }
    }
    rebound
}

/// Original name of a retired class (`REINST_<name>_<n>`)
fn retired_class_name(name: &str) -> Option<&str> {
    name.strip_prefix("REINST_")
        .and_then(|rest| rest.rsplit_once('_'))
        .map(|(original, _)| original)
}
