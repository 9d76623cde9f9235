//! Dependent-asset tracking
//!
//! An asset depends on a class when it names that class, or one of its
//! subclasses, as parent, interface, call target, event signature or
//! variable type. Dependents of a regenerated class get their bytecode
//! recompiled so they call into the new layout.

use blueprint_runtime::ObjectModel;
use blueprint_types::{Blueprint, ClassId};

/// Finds the assets affected by a regenerated class and queues their
/// bytecode recompiles
#[derive(Debug, Default)]
pub struct DependencyNotifier {
    pending: Vec<String>,
}

impl DependencyNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of the assets that refer to `changed` (or a class derived from it),
    /// excluding the asset that generates `changed`
    pub fn find_dependents<'b>(
        &self,
        assets: impl IntoIterator<Item = &'b Blueprint>,
        world: &dyn ObjectModel,
        changed: ClassId,
    ) -> Vec<String> {
        let classes = world.classes();
        let owner = classes.get(changed).and_then(|c| c.generated_by.clone());
        assets
            .into_iter()
            .filter(|bp| owner.as_deref() != Some(bp.id.as_str()))
            .filter(|bp| {
                bp.referenced_class_names().iter().any(|name| {
                    classes
                        .find(name)
                        .filter(|id| classes.get(*id).is_some_and(|c| !c.is_retired()))
                        .is_some_and(|id| classes.is_child_of(id, changed))
                })
            })
            .map(|bp| bp.id.clone())
            .collect()
    }

    /// Dependents of an interface whose nodes must be refreshed.
    ///
    /// For an interface that is the assets referring to it. For a class
    /// implementing interfaces it is the assets referring to any of those
    /// interfaces, other than the implementer's own asset. Any other class
    /// has none.
    pub fn find_interface_dependents<'b>(
        &self,
        assets: impl IntoIterator<Item = &'b Blueprint>,
        world: &dyn ObjectModel,
        changed: ClassId,
    ) -> Vec<String> {
        let classes = world.classes();
        let interfaces = if classes.get(changed).is_some_and(|c| c.is_interface()) {
            vec![changed]
        } else {
            classes.implemented_interfaces(changed)
        };
        if interfaces.is_empty() {
            return Vec::new();
        }

        let owner = classes.get(changed).and_then(|c| c.generated_by.clone());
        let assets: Vec<&Blueprint> = assets
            .into_iter()
            .filter(|bp| owner.as_deref() != Some(bp.id.as_str()))
            .collect();
        let mut dependents: Vec<String> = Vec::new();
        for interface in interfaces {
            for id in self.find_dependents(assets.iter().copied(), world, interface) {
                if !dependents.contains(&id) {
                    dependents.push(id);
                }
            }
        }
        dependents
    }

    /// Queue a bytecode-only recompile; an asset is queued at most once
    pub fn queue_bytecode_recompile(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.pending.contains(&id) {
            return false;
        }
        tracing::debug!(blueprint = %id, "queued bytecode recompile");
        self.pending.push(id);
        true
    }

    /// Drain the queue in the order assets were queued
    pub fn take_pending(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }
}
