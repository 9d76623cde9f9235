//! Compile Session
//!
//! Owns the `BlueprintManager` for a loaded project. The watcher feeds it
//! edited assets; every edit goes through the same path an editor would
//! take: structural modification, full compile, then the dependent
//! recompile queue.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use blueprint_compiler::{BlueprintError, BlueprintManager, LayoutCompiler};
use blueprint_runtime::{InstanceRegistry, ObjectError, ObjectModel};
use blueprint_types::{Blueprint, BlueprintStatus, CompilerResultsLog, ObjectId, StructDef, StructRegistry};

use crate::natives::native_world;
use crate::project::{LoadError, Project, ProjectLoader};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Blueprint(#[from] BlueprintError),

    #[error(transparent)]
    Object(#[from] ObjectError),
}

/// Per-asset summary printed by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetReport {
    pub id: String,
    pub status: BlueprintStatus,
    /// Generated class name, once compiled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Live instances of the generated class, default object excluded
    pub instances: usize,
}

/// A loaded project and the live world compiled from it
pub struct Session {
    project_path: PathBuf,
    manager: BlueprintManager,
    spawned: usize,
}

impl Session {
    /// Build the native world, register structures and add every asset
    pub fn new(project: Project) -> Result<Self, SessionError> {
        let structs = StructRegistry::new_shared();
        for def in project.structs.into_values() {
            structs.register_or_update(def);
        }

        let mut manager = BlueprintManager::new(native_world()?, LayoutCompiler::new())
            .with_settings(project.manifest.compiler)
            .with_structs(structs);
        for blueprint in project.blueprints.into_values() {
            manager.add_blueprint(blueprint);
        }

        Ok(Self {
            project_path: project.path,
            manager,
            spawned: 0,
        })
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn manager(&self) -> &BlueprintManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut BlueprintManager {
        &mut self.manager
    }

    /// Compile every asset, parents first
    pub fn compile_all(&mut self) -> Result<Vec<AssetReport>, SessionError> {
        let statuses = self.manager.compile_all()?;
        let failed = statuses.values().filter(|s| **s == BlueprintStatus::Error).count();
        info!(compiled = statuses.len(), failed, "compiled project");
        Ok(self.reports())
    }

    /// Spawn one instance of an asset's generated class
    pub fn spawn(&mut self, id: &str) -> Result<ObjectId, SessionError> {
        let name = self
            .manager
            .get(id)
            .map(|bp| bp.name.clone())
            .ok_or_else(|| BlueprintError::UnknownBlueprint(id.to_string()))?;
        self.spawned += 1;
        let object = self.manager.spawn(id, &format!("{}_{}", name, self.spawned))?;
        info!(blueprint = %id, object = %object, "spawned instance");
        Ok(object)
    }

    /// Add or replace an asset and recompile it, then its dependents
    pub fn apply_blueprint(&mut self, blueprint: Blueprint) -> Result<CompilerResultsLog, SessionError> {
        let id = blueprint.id.clone();
        if self.manager.get(&id).is_some() {
            self.manager.replace_blueprint(blueprint)?;
        } else {
            self.manager.add_blueprint(blueprint);
        }

        let mut log = self.manager.mark_structurally_modified(&id)?;
        log.append(self.manager.compile(&id)?);
        let dependents = self.manager.flush_pending_recompiles()?;

        if let Some(report) = self.report(&id) {
            info!(
                blueprint = %id,
                status = ?report.status,
                instances = report.instances,
                dependents,
                errors = log.num_errors,
                warnings = log.num_warnings,
                "recompiled"
            );
        }
        Ok(log)
    }

    /// Drop an asset. Its class and instances stay in the world.
    pub fn remove_blueprint(&mut self, id: &str) -> bool {
        let removed = self.manager.remove_blueprint(id).is_some();
        if removed {
            warn!(blueprint = %id, "blueprint removed; live instances keep their class");
        }
        removed
    }

    /// Register an edited structure and recompile the project against it
    pub fn apply_struct(&mut self, def: StructDef) -> Result<Vec<AssetReport>, SessionError> {
        info!(structure = %def.id, "structure changed");
        self.manager.orchestrator().structs().register_or_update(def);
        self.compile_all()
    }

    /// Re-read an asset from disk and apply it
    pub async fn reload_blueprint(&mut self, id: &str) -> Result<(), SessionError> {
        match ProjectLoader::reload_blueprint(&self.project_path, id).await? {
            Some(blueprint) => {
                self.apply_blueprint(blueprint)?;
            }
            None => {
                self.remove_blueprint(id);
            }
        }
        Ok(())
    }

    /// Re-read a structure from disk and apply it
    pub async fn reload_struct(&mut self, id: &str) -> Result<(), SessionError> {
        if let Some(def) = ProjectLoader::reload_struct(&self.project_path, id).await? {
            self.apply_struct(def)?;
        }
        Ok(())
    }

    pub fn report(&self, id: &str) -> Option<AssetReport> {
        let blueprint = self.manager.get(id)?;
        let world = self.manager.world();
        let class = blueprint.state.generated_class;
        let instances = class.map_or(0, |class| {
            let cdo = world.default_object(class);
            world
                .instances_of(class)
                .into_iter()
                .filter(|o| Some(*o) != cdo)
                .count()
        });
        Some(AssetReport {
            id: id.to_string(),
            status: blueprint.status,
            class: class.map(|c| world.classes().name_of(c).to_string()),
            instances,
        })
    }

    pub fn reports(&self) -> Vec<AssetReport> {
        self.manager.ids().filter_map(|id| self.report(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectManifest;
    use blueprint_types::{PinType, Value, VariableDef};
    use std::collections::BTreeMap;

    fn project(blueprints: Vec<Blueprint>) -> Project {
        let manifest = ProjectManifest::from_toml(
            r#"
            [project]
            id = "test"
            name = "Test"
            "#,
        )
        .unwrap();
        Project {
            path: PathBuf::from("."),
            manifest,
            blueprints: blueprints.into_iter().map(|bp| (bp.id.clone(), bp)).collect(),
            structs: BTreeMap::new(),
        }
    }

    fn door() -> Blueprint {
        Blueprint::new("door", "Door", "Actor").with_variable(VariableDef::new("Open", PinType::Boolean))
    }

    fn sliding_door() -> Blueprint {
        Blueprint::new("sliding", "SlidingDoor", "Door")
    }

    #[test]
    fn test_compile_all_reports_every_asset() {
        let mut session = Session::new(project(vec![sliding_door(), door()])).unwrap();
        let reports = session.compile_all().unwrap();

        assert_eq!(reports.len(), 2);
        for report in &reports {
            assert_eq!(report.status, BlueprintStatus::UpToDate, "{}", report.id);
            assert!(report.class.is_some());
            assert_eq!(report.instances, 0);
        }
    }

    #[test]
    fn test_edit_reinstances_spawned_objects() {
        let mut session = Session::new(project(vec![door()])).unwrap();
        session.compile_all().unwrap();
        let instance = session.spawn("door").unwrap();
        session.manager_mut().world_mut().set_property(instance, "Open", true).unwrap();
        let old_class = session.manager().get("door").unwrap().state.generated_class;

        let edited = door().with_variable(VariableDef::new("Locked", PinType::Boolean));
        let log = session.apply_blueprint(edited).unwrap();
        assert!(!log.has_errors());

        let report = session.report("door").unwrap();
        assert_eq!(report.instances, 1);
        assert_eq!(report.status, BlueprintStatus::UpToDate);
        let new_class = session.manager().get("door").unwrap().state.generated_class;
        assert_ne!(old_class, new_class);

        let world = session.manager().world();
        let live = world.instances_of(new_class.unwrap());
        let replaced = live
            .iter()
            .copied()
            .find(|o| world.object(*o).is_some_and(|o| o.name == "Door_1"))
            .unwrap();
        assert_eq!(world.property(replaced, "Open"), Some(&Value::Bool(true)));
        assert_eq!(world.property(replaced, "Locked"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_new_asset_and_removal() {
        let mut session = Session::new(project(vec![door()])).unwrap();
        session.compile_all().unwrap();

        session.apply_blueprint(sliding_door()).unwrap();
        assert_eq!(session.report("sliding").unwrap().status, BlueprintStatus::UpToDate);

        assert!(session.remove_blueprint("sliding"));
        assert!(!session.remove_blueprint("sliding"));
        assert!(session.report("sliding").is_none());
    }

    #[test]
    fn test_spawn_before_compile_fails() {
        let mut session = Session::new(project(vec![door()])).unwrap();
        let err = session.spawn("door").unwrap_err();
        assert!(matches!(
            err,
            SessionError::Blueprint(BlueprintError::MissingGeneratedClass(_))
        ));
        assert!(matches!(
            session.spawn("ghost").unwrap_err(),
            SessionError::Blueprint(BlueprintError::UnknownBlueprint(_))
        ));
    }

    #[test]
    fn test_demo_project_compiles() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/project");
        let project = tokio_test::block_on(ProjectLoader::load(&path)).unwrap();
        let mut session = Session::new(project).unwrap();
        let reports = session.compile_all().unwrap();

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.status == BlueprintStatus::UpToDate));

        let sliding = session.manager().get("sliding_door").unwrap().state.generated_class.unwrap();
        let world = session.manager().world();
        let cdo = world.default_object(sliding).unwrap();
        assert_eq!(world.property(cdo, blueprint_runtime::PROP_CAN_EVER_TICK), Some(&Value::Bool(true)));
        assert_eq!(world.property(cdo, "OpenAngle"), Some(&Value::Float(90.0)));
    }

    #[tokio::test]
    async fn test_reload_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path();
        tokio::fs::write(path.join("project.toml"), "[project]\nid = \"t\"\nname = \"T\"\n")
            .await
            .unwrap();
        tokio::fs::create_dir(path.join("blueprints")).await.unwrap();
        let file = ProjectLoader::blueprint_path(path, "door");
        tokio::fs::write(&file, serde_json::to_string(&door()).unwrap()).await.unwrap();

        let project = ProjectLoader::load(path).await.unwrap();
        let mut session = Session::new(project).unwrap();
        session.compile_all().unwrap();
        session.spawn("door").unwrap();

        let edited = door().with_variable(VariableDef::new("Locked", PinType::Boolean));
        tokio::fs::write(&file, serde_json::to_string(&edited).unwrap()).await.unwrap();
        session.reload_blueprint("door").await.unwrap();

        let door = session.manager().get("door").unwrap();
        assert_eq!(door.variables.len(), 2);
        assert_eq!(session.report("door").unwrap().instances, 1);

        tokio::fs::remove_file(&file).await.unwrap();
        session.reload_blueprint("door").await.unwrap();
        assert!(session.manager().get("door").is_none());
    }

    #[test]
    fn test_report_serializes() {
        let mut session = Session::new(project(vec![door()])).unwrap();
        session.compile_all().unwrap();
        let json = serde_json::to_value(session.reports()).unwrap();
        assert_eq!(json[0]["id"], "door");
        assert_eq!(json[0]["instances"], 0);
    }
}
