//! Compile options.

use serde::{Deserialize, Serialize};

/// Which parts of the class a compile produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileType {
    /// Signatures and properties only; no function bodies
    SkeletonOnly,
    /// Function bodies only, against an existing class layout
    BytecodeOnly,
    /// Layout, bodies and default object
    #[default]
    Full,
}

/// Options handed to the compiler backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    pub compile_type: CompileType,
    /// Keep intermediate graphs around for debugging
    #[serde(default)]
    pub save_intermediate_products: bool,
    /// The compile was triggered by duplicating an asset
    #[serde(default)]
    pub is_duplication_instigated: bool,
}

impl CompileOptions {
    pub fn new(compile_type: CompileType) -> Self {
        Self {
            compile_type,
            ..Self::default()
        }
    }

    pub fn skeleton_only() -> Self {
        Self::new(CompileType::SkeletonOnly)
    }

    pub fn bytecode_only() -> Self {
        Self::new(CompileType::BytecodeOnly)
    }

    pub fn full() -> Self {
        Self::new(CompileType::Full)
    }

    pub fn with_intermediate_products(mut self) -> Self {
        self.save_intermediate_products = true;
        self
    }

    pub fn duplication_instigated(mut self) -> Self {
        self.is_duplication_instigated = true;
        self
    }

    /// Whether the compile regenerates the class layout
    pub fn regenerates_layout(&self) -> bool {
        self.compile_type != CompileType::BytecodeOnly
    }

    /// Whether the compile emits function bodies
    pub fn emits_bytecode(&self) -> bool {
        self.compile_type != CompileType::SkeletonOnly
    }
}
