//! Project Loader
//!
//! Loads the manifest, user-defined structures and blueprint assets from
//! disk. Assets live in `blueprints/<id>.bp.json`, structures in
//! `structs/<id>.struct.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use blueprint_types::{Blueprint, StructDef};

use super::config::*;

pub const MANIFEST_FILE: &str = "project.toml";
pub const BLUEPRINTS_DIR: &str = "blueprints";
pub const BLUEPRINT_EXTENSION: &str = ".bp.json";
pub const STRUCTS_DIR: &str = "structs";
pub const STRUCT_EXTENSION: &str = ".struct.json";

/// Error type for project loading
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Project path does not exist: {0}")]
    PathNotFound(PathBuf),

    #[error("Project manifest not found: {0}")]
    ManifestNotFound(PathBuf),

    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to read configuration: {0}")]
    ConfigError(#[from] figment::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParseError(#[from] serde_json::Error),
}

/// Project loader
pub struct ProjectLoader;

impl ProjectLoader {
    /// Load a project from the given path
    pub async fn load(path: impl AsRef<Path>) -> Result<Project, LoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(LoadError::PathNotFound(path.to_path_buf()));
        }

        info!("Loading project from: {}", path.display());

        let manifest_path = path.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(LoadError::ManifestNotFound(manifest_path));
        }

        let manifest_content = fs::read_to_string(&manifest_path).await?;
        let manifest = ProjectManifest::from_toml(&manifest_content)?;
        info!("Loaded project manifest: {} ({})", manifest.project.name, manifest.project.id);

        let structs = Self::load_structs(path).await?;
        info!("Loaded {} structs", structs.len());

        let blueprints = Self::load_blueprints(path).await?;
        info!("Loaded {} blueprints", blueprints.len());

        Ok(Project {
            path: path.to_path_buf(),
            manifest,
            blueprints,
            structs,
        })
    }

    /// Path of the asset file for a blueprint id
    pub fn blueprint_path(project_path: &Path, id: &str) -> PathBuf {
        project_path
            .join(BLUEPRINTS_DIR)
            .join(format!("{}{}", id, BLUEPRINT_EXTENSION))
    }

    /// Re-read one asset after a change on disk. `None` means the file is gone.
    pub async fn reload_blueprint(project_path: &Path, id: &str) -> Result<Option<Blueprint>, LoadError> {
        let path = Self::blueprint_path(project_path, id);
        if !path.exists() {
            return Ok(None);
        }
        Self::load_blueprint(&path).await.map(Some)
    }

    /// Re-read one structure after a change on disk
    pub async fn reload_struct(project_path: &Path, id: &str) -> Result<Option<StructDef>, LoadError> {
        let path = project_path
            .join(STRUCTS_DIR)
            .join(format!("{}{}", id, STRUCT_EXTENSION));
        if !path.exists() {
            return Ok(None);
        }
        Self::load_struct(&path).await.map(Some)
    }

    /// Load all blueprints from the blueprints/ directory
    async fn load_blueprints(project_path: &Path) -> Result<BTreeMap<String, Blueprint>, LoadError> {
        let blueprints_dir = project_path.join(BLUEPRINTS_DIR);
        let mut blueprints = BTreeMap::new();

        if !blueprints_dir.exists() {
            debug!("No blueprints directory found");
            return Ok(blueprints);
        }

        let mut entries = fs::read_dir(&blueprints_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if let Some(stem) = name.strip_suffix(BLUEPRINT_EXTENSION) {
                    match Self::load_blueprint(&path).await {
                        Ok(blueprint) => {
                            if blueprint.id != stem {
                                warn!(
                                    "Blueprint {} is stored in {}; file changes will not be matched to it",
                                    blueprint.id, name
                                );
                            }
                            debug!("Loaded blueprint: {}", blueprint.id);
                            blueprints.insert(blueprint.id.clone(), blueprint);
                        }
                        Err(e) => {
                            warn!("Failed to load blueprint from {}: {}", path.display(), e);
                        }
                    }
                }
            }
        }

        Ok(blueprints)
    }

    /// Load a single blueprint asset
    async fn load_blueprint(path: &Path) -> Result<Blueprint, LoadError> {
        let content = fs::read_to_string(path).await?;
        let blueprint: Blueprint = serde_json::from_str(&content)?;
        Ok(blueprint)
    }

    /// Load all user-defined structures from the structs/ directory
    async fn load_structs(project_path: &Path) -> Result<BTreeMap<String, StructDef>, LoadError> {
        let structs_dir = project_path.join(STRUCTS_DIR);
        let mut structs = BTreeMap::new();

        if !structs_dir.exists() {
            debug!("No structs directory found");
            return Ok(structs);
        }

        let mut entries = fs::read_dir(&structs_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.ends_with(STRUCT_EXTENSION) {
                    match Self::load_struct(&path).await {
                        Ok(def) => {
                            debug!("Loaded struct: {}", def.id);
                            structs.insert(def.id.clone(), def);
                        }
                        Err(e) => {
                            warn!("Failed to load struct from {}: {}", path.display(), e);
                        }
                    }
                }
            }
        }

        Ok(structs)
    }

    /// Load a single structure definition
    async fn load_struct(path: &Path) -> Result<StructDef, LoadError> {
        let content = fs::read_to_string(path).await?;
        let def: StructDef = serde_json::from_str(&content)?;
        Ok(def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint_types::{BlueprintStatus, NodeKind};
    use tempfile::TempDir;
    use tokio::fs;

    async fn create_test_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let path = dir.path();

        fs::write(
            path.join(MANIFEST_FILE),
            r#"
[project]
id = "test-project"
name = "Test Project"
version = "1.0.0"

[compiler]
log_info_only_on_load = true
"#,
        )
        .await
        .unwrap();

        fs::create_dir(path.join(BLUEPRINTS_DIR)).await.unwrap();
        let door = serde_json::json!({
            "id": "door",
            "name": "Door",
            "parent_class": "Actor",
            "variables": [
                { "name": "OpenAngle", "type": { "type": "Real" }, "default": 90.0 }
            ],
            "event_graphs": [{
                "name": "EventGraph",
                "nodes": [
                    { "id": "begin", "kind": "event", "event_name": "ReceiveBeginPlay",
                      "signature_class": "Actor", "override_function": true }
                ]
            }]
        });
        fs::write(
            path.join("blueprints/door.bp.json"),
            serde_json::to_string_pretty(&door).unwrap(),
        )
        .await
        .unwrap();
        fs::write(path.join("blueprints/broken.bp.json"), "{ not json").await.unwrap();
        fs::write(path.join("blueprints/notes.txt"), "ignored").await.unwrap();

        fs::create_dir(path.join(STRUCTS_DIR)).await.unwrap();
        fs::write(
            path.join("structs/hit.struct.json"),
            r#"{ "id": "hit", "name": "Hit", "fields": [] }"#,
        )
        .await
        .unwrap();

        dir
    }

    #[tokio::test]
    async fn test_load_project() {
        let dir = create_test_project().await;
        let project = ProjectLoader::load(dir.path()).await.unwrap();

        assert_eq!(project.id(), "test-project");
        assert_eq!(project.name(), "Test Project");
        assert_eq!(project.manifest.project.version, "1.0.0");
        assert!(project.settings().log_info_only_on_load);
        assert_eq!(project.blueprints.len(), 1);
        assert!(project.structs.contains_key("hit"));
    }

    #[tokio::test]
    async fn test_load_blueprint() {
        let dir = create_test_project().await;
        let project = ProjectLoader::load(dir.path()).await.unwrap();

        let door = &project.blueprints["door"];
        assert_eq!(door.parent_class, "Actor");
        assert_eq!(door.variables[0].name, "OpenAngle");
        assert_eq!(door.status, BlueprintStatus::Dirty);
        assert!(matches!(
            &door.event_graphs[0].nodes[0].kind,
            NodeKind::Event { event_name, .. } if event_name == "ReceiveBeginPlay"
        ));
    }

    #[tokio::test]
    async fn test_reload_missing_blueprint() {
        let dir = create_test_project().await;
        let reloaded = ProjectLoader::reload_blueprint(dir.path(), "door").await.unwrap();
        assert!(reloaded.is_some());

        fs::remove_file(ProjectLoader::blueprint_path(dir.path(), "door"))
            .await
            .unwrap();
        let gone = ProjectLoader::reload_blueprint(dir.path(), "door").await.unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn test_missing_project() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = ProjectLoader::load(&missing).await.unwrap_err();
        assert!(matches!(err, LoadError::PathNotFound(_)));

        let err = ProjectLoader::load(dir.path()).await.unwrap_err();
        assert!(matches!(err, LoadError::ManifestNotFound(_)));
    }
}
