//! Project Management
//!
//! Handles loading and watching project files on disk.

mod config;
mod loader;
mod watcher;

pub use config::*;
pub use loader::*;
pub use watcher::*;
