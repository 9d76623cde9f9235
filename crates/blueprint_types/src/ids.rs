//! Identifiers for classes, objects and linkers.
//!
//! Identifiers are plain integers handed out by whoever owns the arena
//! (the class registry or the object world). They are never reused, so a
//! stale id simply fails to resolve.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Identifies a class in the class registry
    ClassId,
    "class"
);

define_id!(
    /// Identifies a live object (instance, CDO or subobject)
    ObjectId,
    "object"
);

define_id!(
    /// Identifies the persistent-storage index an asset was loaded from
    LinkerId,
    "linker"
);
