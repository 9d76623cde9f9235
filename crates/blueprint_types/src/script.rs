//! Compiled function bodies.
//!
//! Bytecode is symbolic: every op that touches another class names that
//! class by id and the member by name. When a class is regenerated the
//! reinstancer rebinds these references by name to the new class.

use serde::{Deserialize, Serialize};

use crate::ClassId;

/// A single compiled operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptOp {
    /// Jump into the named event or function body of this script
    Entry { event: String },
    /// Call a function on an object of `class`
    CallFunction { class: ClassId, function: String },
    /// Call the parent implementation of a function
    CallParent { class: ClassId, function: String },
    /// Read a property declared by `class`
    ReadVariable { class: ClassId, property: String },
    /// Write a property declared by `class`
    WriteVariable { class: ClassId, property: String },
    /// Push a class reference
    LoadClass { class: ClassId },
    /// Opaque operation evaluated by the VM
    Native { node_type: String },
}

impl ScriptOp {
    /// Class referenced by this op, if any
    pub fn class(&self) -> Option<ClassId> {
        match self {
            ScriptOp::CallFunction { class, .. }
            | ScriptOp::CallParent { class, .. }
            | ScriptOp::ReadVariable { class, .. }
            | ScriptOp::WriteVariable { class, .. }
            | ScriptOp::LoadClass { class } => Some(*class),
            ScriptOp::Entry { .. } | ScriptOp::Native { .. } => None,
        }
    }

    /// Member name referenced alongside the class, if any
    pub fn member(&self) -> Option<&str> {
        match self {
            ScriptOp::CallFunction { function, .. } | ScriptOp::CallParent { function, .. } => {
                Some(function)
            }
            ScriptOp::ReadVariable { property, .. } | ScriptOp::WriteVariable { property, .. } => {
                Some(property)
            }
            _ => None,
        }
    }

    /// Whether the member is a function (as opposed to a property)
    pub fn references_function(&self) -> bool {
        matches!(
            self,
            ScriptOp::CallFunction { .. } | ScriptOp::CallParent { .. }
        )
    }

    /// Point the op at a different class
    pub fn set_class(&mut self, new_class: ClassId) {
        match self {
            ScriptOp::CallFunction { class, .. }
            | ScriptOp::CallParent { class, .. }
            | ScriptOp::ReadVariable { class, .. }
            | ScriptOp::WriteVariable { class, .. }
            | ScriptOp::LoadClass { class } => *class = new_class,
            ScriptOp::Entry { .. } | ScriptOp::Native { .. } => {}
        }
    }
}

/// Compiled body of one function
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub ops: Vec<ScriptOp>,
}

impl Script {
    pub fn new(ops: Vec<ScriptOp>) -> Self {
        Self { ops }
    }

    /// Whether any op references the given class
    pub fn references_class(&self, class: ClassId) -> bool {
        self.ops.iter().any(|op| op.class() == Some(class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_class_only_touches_class_ops() {
        let mut call = ScriptOp::CallFunction {
            class: ClassId(1),
            function: "Fire".into(),
        };
        call.set_class(ClassId(2));
        assert_eq!(call.class(), Some(ClassId(2)));
        assert_eq!(call.member(), Some("Fire"));

        let mut native = ScriptOp::Native {
            node_type: "math/Add".into(),
        };
        native.set_class(ClassId(2));
        assert_eq!(native.class(), None);
    }

    #[test]
    fn test_references_class() {
        let script = Script::new(vec![
            ScriptOp::Entry {
                event: "ReceiveTick".into(),
            },
            ScriptOp::LoadClass { class: ClassId(7) },
        ]);
        assert!(script.references_class(ClassId(7)));
        assert!(!script.references_class(ClassId(8)));
    }
}
