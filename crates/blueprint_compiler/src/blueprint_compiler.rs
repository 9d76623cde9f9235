//! Blueprint Compiler - Recompilation and live class regeneration
//!
//! Turns blueprint assets into generated classes and swaps regenerated
//! classes into a running object world:
//!
//! - `conform`: repairs an asset against its current parent and interfaces
//! - `orchestrator`: picks the compile mode and drives the backend
//! - `regenerator`: the load-time regeneration state machine and the
//!   integration of a freshly compiled class
//! - `dependency`: finds dependents and queues their recompiles
//! - `manager`: owns the assets and exposes the editing entry points

pub use blueprint_runtime;
pub use blueprint_types;

mod backend;
mod conform;
mod dependency;
mod error;
mod manager;
mod nodes;
mod orchestrator;
mod refresh;
mod regenerator;
mod settings;

pub use backend::*;
pub use conform::*;
pub use dependency::*;
pub use error::*;
pub use manager::*;
pub use nodes::*;
pub use orchestrator::*;
pub use refresh::*;
pub use regenerator::*;
pub use settings::*;
