//! Object model errors.

use blueprint_types::{ClassId, ClassRegistryError, LinkerId, ObjectId};

/// Errors raised by the object world and the reinstancer
#[derive(Debug, Clone, thiserror::Error)]
pub enum ObjectError {
    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),
    #[error(transparent)]
    Class(#[from] ClassRegistryError),
    #[error("Class {0} has no default object")]
    NoDefaultObject(ClassId),
    #[error("Linker not found: {0}")]
    LinkerNotFound(LinkerId),
    #[error("Export index {index} out of range for {linker} ({len} exports)")]
    ExportOutOfRange {
        linker: LinkerId,
        index: usize,
        len: usize,
    },
}

pub type ObjectResult<T> = Result<T, ObjectError>;
