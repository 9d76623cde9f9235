//! bpregen - Blueprint recompilation host
//!
//! Loads a project of blueprint assets into an in-memory object world,
//! compiles them, and keeps live instances current while the assets change
//! on disk:
//! - Project manifest, asset loading and file watching
//! - The native class set blueprints derive from
//! - A session tying the compiler to spawned instances

pub use blueprint_compiler;

// Native classes
pub mod natives;

// Project management
pub mod project;

// Compile session
pub mod session;
