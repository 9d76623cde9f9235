//! Blueprint Manager - Owns the loaded assets and the live object world
//!
//! Editing entry points (`mark_structurally_modified`, `mark_modified`,
//! `compile`) and the load-time `regenerate_class` all go through here.
//! Observers subscribe to a broadcast channel of `BlueprintChange`s.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use blueprint_runtime::{ObjectFlags, ObjectModel, ObjectWorld};
use blueprint_types::{
    Blueprint, BlueprintStatus, ClassId, CompileOptions, CompilerResultsLog, ObjectId, StructRegistry,
};
use tokio::sync::broadcast;

use crate::{
    BlueprintError, BlueprintResult, ClassRegenerator, CompileOrchestrator, CompilerBackend, CompilerSettings,
    ConformancePass, DependencyNotifier, PreviousClass, refresh_all_nodes,
};

/// Change notifications for observers (editors, the watcher host)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlueprintChange {
    Added(String),
    Removed(String),
    /// Signature-level change; the skeleton class was recompiled
    StructurallyModified(String),
    StatusChanged { id: String, status: BlueprintStatus },
    Compiled { id: String, class: ClassId },
}

/// Owns blueprint assets, the object world they generate classes into and
/// the compile pipeline
pub struct BlueprintManager<W: ObjectModel = ObjectWorld> {
    assets: BTreeMap<String, Blueprint>,
    world: W,
    orchestrator: CompileOrchestrator,
    notifier: DependencyNotifier,
    change_tx: broadcast::Sender<BlueprintChange>,
}

impl<W: ObjectModel> BlueprintManager<W> {
    pub fn new(world: W, backend: impl CompilerBackend + 'static) -> Self {
        let (change_tx, _) = broadcast::channel(256);
        Self {
            assets: BTreeMap::new(),
            world,
            orchestrator: CompileOrchestrator::new(backend),
            notifier: DependencyNotifier::new(),
            change_tx,
        }
    }

    pub fn with_settings(mut self, settings: CompilerSettings) -> Self {
        self.orchestrator = self.orchestrator.with_settings(settings);
        self
    }

    pub fn with_structs(mut self, structs: Arc<StructRegistry>) -> Self {
        self.orchestrator = self.orchestrator.with_structs(structs);
        self
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<BlueprintChange> {
        self.change_tx.subscribe()
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn orchestrator(&self) -> &CompileOrchestrator {
        &self.orchestrator
    }

    pub fn get(&self, id: &str) -> Option<&Blueprint> {
        self.assets.get(id)
    }

    pub fn blueprint_mut(&mut self, id: &str) -> Option<&mut Blueprint> {
        self.assets.get_mut(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Bytecode recompiles waiting for `flush_pending_recompiles`
    pub fn pending_recompiles(&self) -> &[String] {
        self.notifier.pending()
    }

    fn notify(&self, change: BlueprintChange) {
        // No subscribers is fine
        let _ = self.change_tx.send(change);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Asset set
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_blueprint(&mut self, blueprint: Blueprint) {
        let id = blueprint.id.clone();
        tracing::debug!(blueprint = %id, "added blueprint");
        self.assets.insert(id.clone(), blueprint);
        self.notify(BlueprintChange::Added(id));
    }

    /// Swap in new content for an existing asset. Its classes and
    /// regeneration state are kept, so the next compile replaces them.
    pub fn replace_blueprint(&mut self, mut blueprint: Blueprint) -> BlueprintResult<()> {
        let existing = self
            .assets
            .get_mut(&blueprint.id)
            .ok_or_else(|| BlueprintError::UnknownBlueprint(blueprint.id.clone()))?;
        blueprint.state = std::mem::take(&mut existing.state);
        blueprint.status = BlueprintStatus::Dirty;
        *existing = blueprint;
        Ok(())
    }

    pub fn remove_blueprint(&mut self, id: &str) -> Option<Blueprint> {
        let removed = self.assets.remove(id)?;
        self.notify(BlueprintChange::Removed(id.to_string()));
        Some(removed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Editing entry points
    // ─────────────────────────────────────────────────────────────────────────

    /// Conform the asset and recompile its skeleton after a signature change.
    ///
    /// Nothing happens while the asset is being created or compiled.
    /// Observers are notified once.
    pub fn mark_structurally_modified(&mut self, id: &str) -> BlueprintResult<CompilerResultsLog> {
        let mut log = CompilerResultsLog::new();
        let blueprint = self
            .assets
            .get_mut(id)
            .ok_or_else(|| BlueprintError::UnknownBlueprint(id.to_string()))?;
        if blueprint.status == BlueprintStatus::BeingCreated || blueprint.state.being_compiled {
            return Ok(log);
        }

        ConformancePass::new(self.world.classes()).run(blueprint, &mut log)?;
        self.orchestrator.compile_skeleton(blueprint, &mut self.world, &mut log);
        blueprint.status = if log.has_errors() {
            BlueprintStatus::Error
        } else {
            BlueprintStatus::Dirty
        };
        tracing::debug!(blueprint = %id, "structurally modified");
        self.notify(BlueprintChange::StructurallyModified(id.to_string()));
        Ok(log)
    }

    /// Flag the asset as needing a compile without compiling anything
    pub fn mark_modified(&mut self, id: &str) -> BlueprintResult<()> {
        let blueprint = self
            .assets
            .get_mut(id)
            .ok_or_else(|| BlueprintError::UnknownBlueprint(id.to_string()))?;
        if blueprint.status == BlueprintStatus::BeingCreated {
            return Ok(());
        }
        blueprint.status = BlueprintStatus::Dirty;
        self.notify(BlueprintChange::StatusChanged {
            id: id.to_string(),
            status: BlueprintStatus::Dirty,
        });
        Ok(())
    }

    /// Full compile of one asset: structure pre-pass, conformance, node
    /// refresh, class generation and integration, then the dependency
    /// cascade
    pub fn compile(&mut self, id: &str) -> BlueprintResult<CompilerResultsLog> {
        self.compile_with(id, &CompileOptions::full())
    }

    /// Full compile with explicit options
    pub fn compile_with(&mut self, id: &str, options: &CompileOptions) -> BlueprintResult<CompilerResultsLog> {
        // Structure errors are reported with the asset but do not decide its status
        let mut structure_log = CompilerResultsLog::new();
        self.orchestrator.compile_structures(&mut structure_log);

        let mut log = CompilerResultsLog::new();
        let blueprint = self
            .assets
            .get_mut(id)
            .ok_or_else(|| BlueprintError::UnknownBlueprint(id.to_string()))?;
        if options.is_duplication_instigated {
            // Copied class ids still name the source asset's classes
            blueprint.state.skeleton_class = None;
            blueprint.state.generated_class = None;
            blueprint.state.linker = None;
        }
        ConformancePass::new(self.world.classes()).run(blueprint, &mut log)?;
        refresh_all_nodes(blueprint, &mut self.world, &self.orchestrator, &mut log)?;

        let previous = PreviousClass::capture(&self.world, blueprint.state.generated_class, None);
        let mut loaded = Vec::new();
        let class =
            self.orchestrator
                .compile_full_with(blueprint, &mut self.world, previous, options, &mut loaded, &mut log)?;
        let status = blueprint.status;
        self.post_load(&loaded)?;

        self.notify(BlueprintChange::StatusChanged {
            id: id.to_string(),
            status,
        });
        if let Some(class) = class {
            self.notify(BlueprintChange::Compiled {
                id: id.to_string(),
                class,
            });
            self.cascade(id, class, &mut log)?;
        }
        log.append(structure_log);
        Ok(log)
    }

    /// Copy an asset under a new id and name, then compile the copy.
    ///
    /// The copy starts out with the source's transient state, as a shallow
    /// duplicate would; the duplication-instigated compile gives it classes
    /// of its own and leaves the source's classes and instances alone.
    pub fn duplicate_blueprint(&mut self, source: &str, id: &str, name: &str) -> BlueprintResult<CompilerResultsLog> {
        let mut copy = self
            .assets
            .get(source)
            .cloned()
            .ok_or_else(|| BlueprintError::UnknownBlueprint(source.to_string()))?;
        copy.id = id.to_string();
        copy.name = name.to_string();
        copy.status = BlueprintStatus::Dirty;
        tracing::debug!(blueprint = %id, source = %source, "duplicated blueprint");
        self.add_blueprint(copy);
        self.compile_with(id, &CompileOptions::full().duplication_instigated())
    }

    /// Regenerate function bodies only; the class layout must still match
    pub fn recompile_bytecode(&mut self, id: &str) -> BlueprintResult<Option<ClassId>> {
        let mut log = CompilerResultsLog::new();
        let blueprint = self
            .assets
            .get_mut(id)
            .ok_or_else(|| BlueprintError::UnknownBlueprint(id.to_string()))?;
        let class = self
            .orchestrator
            .compile_bytecode(blueprint, &mut self.world, &mut log)?;
        if class.is_none() {
            self.notify(BlueprintChange::StatusChanged {
                id: id.to_string(),
                status: BlueprintStatus::Error,
            });
        }
        Ok(class)
    }

    /// Load-time regeneration of an asset's class.
    ///
    /// `old_class` and `previous_cdo` are what the loader found in storage;
    /// default objects that still need post-load are appended to
    /// `loaded_objects`.
    pub fn regenerate_class(
        &mut self,
        id: &str,
        old_class: Option<ClassId>,
        previous_cdo: Option<ObjectId>,
        loaded_objects: &mut Vec<ObjectId>,
    ) -> BlueprintResult<Option<ClassId>> {
        let mut log = self.orchestrator.settings().load_results_log();
        let blueprint = self
            .assets
            .get_mut(id)
            .ok_or_else(|| BlueprintError::UnknownBlueprint(id.to_string()))?;
        let before = blueprint.state.generated_class;
        let class = ClassRegenerator::new(&self.orchestrator).regenerate(
            blueprint,
            &mut self.world,
            old_class,
            previous_cdo,
            loaded_objects,
            &mut log,
        )?;
        let status = blueprint.status;

        if let Some(class) = class.filter(|c| before != Some(*c)) {
            self.notify(BlueprintChange::StatusChanged {
                id: id.to_string(),
                status,
            });
            self.notify(BlueprintChange::Compiled {
                id: id.to_string(),
                class,
            });
        }
        Ok(class)
    }

    /// Run every queued bytecode recompile; returns how many succeeded
    pub fn flush_pending_recompiles(&mut self) -> BlueprintResult<usize> {
        let mut recompiled = 0;
        for id in self.notifier.take_pending() {
            let compiled = self
                .assets
                .get(&id)
                .is_some_and(|bp| bp.state.generated_class.is_some());
            if !compiled {
                continue;
            }
            if self.recompile_bytecode(&id)?.is_some() {
                recompiled += 1;
            }
        }
        Ok(recompiled)
    }

    /// Compile every asset, parents and interfaces before the assets that
    /// use them. Returns the resulting status of each asset.
    pub fn compile_all(&mut self) -> BlueprintResult<BTreeMap<String, BlueprintStatus>> {
        let mut statuses = BTreeMap::new();
        for id in self.compile_order() {
            let log = self.compile(&id)?;
            let status = self.assets.get(&id).map(|bp| bp.status).unwrap_or_default();
            tracing::info!(
                blueprint = %id,
                ?status,
                errors = log.num_errors,
                warnings = log.num_warnings,
                "compiled"
            );
            statuses.insert(id, status);
        }
        let flushed = self.flush_pending_recompiles()?;
        if flushed > 0 {
            tracing::debug!(flushed, "flushed dependent recompiles");
        }
        Ok(statuses)
    }

    /// Instantiate an asset's generated class
    pub fn spawn(&mut self, id: &str, name: &str) -> BlueprintResult<ObjectId> {
        let class = self
            .assets
            .get(id)
            .ok_or_else(|| BlueprintError::UnknownBlueprint(id.to_string()))?
            .state
            .generated_class
            .ok_or_else(|| BlueprintError::MissingGeneratedClass(id.to_string()))?;
        Ok(self.world.spawn(class, name, None, ObjectFlags::empty())?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    /// Refresh interface dependents and queue bytecode recompiles of every
    /// dependent of a regenerated class
    fn cascade(&mut self, id: &str, class: ClassId, log: &mut CompilerResultsLog) -> BlueprintResult<()> {
        if self.orchestrator.settings().refresh_dependents_on_interface_change {
            let dependents = self
                .notifier
                .find_interface_dependents(self.assets.values(), &self.world, class);
            for dependent in dependents {
                if let Some(blueprint) = self.assets.get_mut(&dependent) {
                    refresh_all_nodes(blueprint, &mut self.world, &self.orchestrator, log)?;
                }
            }
        }

        let dependents = self.notifier.find_dependents(self.assets.values(), &self.world, class);
        for dependent in dependents {
            self.notifier.queue_bytecode_recompile(dependent);
        }
        tracing::debug!(blueprint = %id, queued = self.notifier.pending().len(), "dependency cascade");
        Ok(())
    }

    /// Finish loading default objects that took over linker slots
    fn post_load(&mut self, loaded: &[ObjectId]) -> BlueprintResult<()> {
        for id in loaded {
            self.world.preload(*id)?;
            if let Some(object) = self.world.object_mut(*id) {
                object.flags.remove(ObjectFlags::NEED_POST_LOAD);
            }
        }
        Ok(())
    }

    /// Asset ids with every asset after the assets its parent and interfaces
    /// are generated by
    fn compile_order(&self) -> Vec<String> {
        let by_class: BTreeMap<String, &str> = self
            .assets
            .values()
            .map(|bp| (bp.generated_class_name(), bp.id.as_str()))
            .collect();

        let mut order = Vec::new();
        let mut visited = BTreeSet::new();
        for id in self.assets.keys() {
            self.visit(id, &by_class, &mut visited, &mut order);
        }
        order
    }

    fn visit(&self, id: &str, by_class: &BTreeMap<String, &str>, visited: &mut BTreeSet<String>, order: &mut Vec<String>) {
        if !visited.insert(id.to_string()) {
            return;
        }
        if let Some(blueprint) = self.assets.get(id) {
            let requirements = std::iter::once(&blueprint.parent_class)
                .chain(blueprint.implemented_interfaces.iter().map(|i| &i.interface));
            for name in requirements {
                if let Some(dependency) = by_class.get(name.as_str()) {
                    self.visit(dependency, by_class, visited, order);
                }
            }
        }
        order.push(id.to_string());
    }
}
