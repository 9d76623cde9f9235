//! Blueprint Runtime - Live object world and reinstancing
//!
//! This crate owns the objects instantiated from generated classes: default
//! objects, instances, subobjects and the linkers that export them. When a
//! class is regenerated the reinstancer migrates all of them to the new class.

pub use blueprint_types;

mod error;
mod linker;
mod model;
mod object;
mod reinstancer;
mod world;

pub use error::*;
pub use linker::*;
pub use model::*;
pub use object::*;
pub use reinstancer::*;
pub use world::*;
