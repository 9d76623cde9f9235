//! Compiler errors.
//!
//! Script-authoring problems never surface here; they go to the results log
//! and the asset's status. These errors are contract violations and failures
//! of the object world.

use blueprint_runtime::ObjectError;
use blueprint_types::ClassRegistryError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum BlueprintError {
    #[error("Blueprint not found: {0}")]
    UnknownBlueprint(String),
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    #[error("Blueprint {0} has no generated class to recompile")]
    MissingGeneratedClass(String),
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error(transparent)]
    Class(#[from] ClassRegistryError),
}

pub type BlueprintResult<T> = Result<T, BlueprintError>;
