//! Blueprint Types - Core data structures for blueprint compilation
//!
//! This crate contains the pure data shared by the compiler and the object
//! runtime: the editable graph model, blueprint assets, reflected classes,
//! property values, compiled bytecode and compiler diagnostics.

mod blueprint;
mod class;
mod diagnostics;
mod ids;
mod options;
mod script;
mod structs;
mod types;
mod value;

pub use blueprint::*;
pub use class::*;
pub use diagnostics::*;
pub use ids::*;
pub use options::*;
pub use script::*;
pub use structs::*;
pub use types::*;
pub use value::*;
