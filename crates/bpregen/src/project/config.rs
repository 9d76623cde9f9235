//! Project configuration types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};

use blueprint_compiler::CompilerSettings;
use blueprint_types::{Blueprint, StructDef};

/// Environment prefix for configuration overrides
pub const ENV_PREFIX: &str = "BPREGEN_";

/// Project manifest (project.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectManifest {
    pub project: ProjectInfo,
    #[serde(default)]
    pub compiler: CompilerSettings,
}

impl ProjectManifest {
    /// Layer the manifest text with `BPREGEN_COMPILER__*` environment
    /// overrides, e.g. `BPREGEN_COMPILER__FORCE_DISABLE_COMPILE_ON_LOAD=true`.
    /// Other `BPREGEN_*` variables belong to the CLI and are not read here.
    pub fn figment(manifest: &str) -> Figment {
        Figment::new().merge(Toml::string(manifest)).merge(
            Env::prefixed(ENV_PREFIX)
                .filter(|key| key.as_str().to_ascii_lowercase().starts_with("compiler__"))
                .split("__"),
        )
    }

    pub fn from_toml(manifest: &str) -> Result<Self, figment::Error> {
        Self::figment(manifest).extract()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// Loaded project with all assets
#[derive(Debug, Clone)]
pub struct Project {
    /// Project root path
    pub path: PathBuf,
    pub manifest: ProjectManifest,
    /// Blueprint assets by id
    pub blueprints: BTreeMap<String, Blueprint>,
    /// User-defined structures by id
    pub structs: BTreeMap<String, StructDef>,
}

impl Project {
    pub fn id(&self) -> &str {
        &self.manifest.project.id
    }

    pub fn name(&self) -> &str {
        &self.manifest.project.name
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.manifest.compiler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_defaults() {
        let manifest = ProjectManifest::from_toml(
            r#"
            [project]
            id = "demo"
            name = "Demo"
            "#,
        )
        .unwrap();
        assert_eq!(manifest.project.version, "0.1.0");
        assert_eq!(manifest.compiler, CompilerSettings::default());
    }

    #[test]
    fn test_manifest_compiler_section() {
        let manifest = ProjectManifest::from_toml(
            r#"
            [project]
            id = "demo"
            name = "Demo"

            [compiler]
            log_info_only_on_load = true
            refresh_dependents_on_interface_change = false
            "#,
        )
        .unwrap();
        assert!(manifest.compiler.log_info_only_on_load);
        assert!(!manifest.compiler.refresh_dependents_on_interface_change);
        assert!(manifest.compiler.structure_editing_enabled);
    }

    #[test]
    fn test_environment_overrides_manifest() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("BPREGEN_COMPILER__FORCE_DISABLE_COMPILE_ON_LOAD", "true");
            jail.set_env("BPREGEN_PROJECT", "./elsewhere");
            let manifest = ProjectManifest::from_toml(
                r#"
                [project]
                id = "demo"
                name = "Demo"
                "#,
            )?;
            assert!(manifest.compiler.force_disable_compile_on_load);
            assert_eq!(manifest.project.id, "demo");
            Ok(())
        });
    }
}
