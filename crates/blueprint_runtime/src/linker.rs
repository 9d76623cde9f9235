// Linkers - persistent-storage indices
//
// A linker lists the objects an asset package exports. Regeneration swaps new
// default objects into the export slots the old ones occupied, so later loads
// resolve to the new objects.

use blueprint_types::{LinkerId, ObjectId};

use crate::{ObjectError, ObjectFlags, ObjectModel, ObjectResult};

/// One entry in a linker's export table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub object_name: String,
    /// Object currently occupying the slot
    pub object: Option<ObjectId>,
}

/// Export table of one loaded package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linker {
    pub id: LinkerId,
    pub package: String,
    pub exports: Vec<Export>,
}

impl Linker {
    pub fn new(id: LinkerId, package: impl Into<String>) -> Self {
        Self {
            id,
            package: package.into(),
            exports: Vec::new(),
        }
    }

    /// Index of the export with the given object name
    pub fn find_export(&self, object_name: &str) -> Option<usize> {
        self.exports.iter().position(|e| e.object_name == object_name)
    }
}

/// Put a freshly created default object into the export slot of the one it
/// replaces.
///
/// The new object inherits the old object's flags and pending serialized
/// state. The old object loses its load flags and its linker. If the old
/// object still needed post-load, the new one is appended to
/// `loaded_objects` so the caller runs post-load on it instead.
pub fn patch_new_cdo_into_linker(
    world: &mut dyn ObjectModel,
    new_cdo: ObjectId,
    linker: LinkerId,
    export_index: usize,
    loaded_objects: &mut Vec<ObjectId>,
) -> ObjectResult<()> {
    let previous = {
        let table = world.linker(linker).ok_or(ObjectError::LinkerNotFound(linker))?;
        table
            .exports
            .get(export_index)
            .ok_or(ObjectError::ExportOutOfRange {
                linker,
                index: export_index,
                len: table.exports.len(),
            })?
            .object
    };

    if let Some(old_cdo) = previous.filter(|old| *old != new_cdo) {
        let (old_flags, pending) = {
            let old = world
                .object_mut(old_cdo)
                .ok_or(ObjectError::ObjectNotFound(old_cdo))?;
            let flags = old.flags;
            old.flags.remove(ObjectFlags::LOAD_FLAGS);
            old.linker = None;
            (flags, std::mem::take(&mut old.pending_properties))
        };

        let new = world
            .object_mut(new_cdo)
            .ok_or(ObjectError::ObjectNotFound(new_cdo))?;
        new.flags |= old_flags;
        new.pending_properties.extend(pending);

        if old_flags.contains(ObjectFlags::NEED_POST_LOAD) {
            loaded_objects.push(new_cdo);
        }
        tracing::debug!(%old_cdo, %new_cdo, %linker, export_index, "patched default object into linker");
    }

    world.patch_export(linker, export_index, new_cdo)
}
