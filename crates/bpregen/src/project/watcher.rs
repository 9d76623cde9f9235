//! Project File Watcher
//!
//! Watches project files and feeds edited assets into the compile session.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::loader::{BLUEPRINT_EXTENSION, BLUEPRINTS_DIR, MANIFEST_FILE, STRUCT_EXTENSION, STRUCTS_DIR};
use crate::session::Session;

/// File change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    /// A blueprint file was created, modified or removed
    BlueprintChanged(String),
    /// A structure file was created, modified or removed
    StructChanged(String),
    /// The project manifest was modified
    ManifestChanged,
}

/// Project file watcher
pub struct ProjectWatcher {
    /// Path to the project
    project_path: PathBuf,
    /// Channel receiver for file events
    rx: mpsc::Receiver<FileChange>,
    /// The underlying watcher (kept alive)
    _watcher: RecommendedWatcher,
}

impl ProjectWatcher {
    /// Create a new project watcher
    pub fn new(project_path: impl AsRef<Path>) -> Result<Self, notify::Error> {
        // Absolute path so event paths can be stripped reliably
        let project_path = project_path
            .as_ref()
            .canonicalize()
            .unwrap_or_else(|_| project_path.as_ref().to_path_buf());
        let (tx, rx) = mpsc::channel(100);

        let project_path_clone = project_path.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                if let Some(change) = event_to_change(&project_path_clone, &event) {
                    let _ = tx.blocking_send(change);
                }
            }
            Err(e) => {
                error!("File watcher error: {}", e);
            }
        })?;

        watcher.watch(&project_path, RecursiveMode::Recursive)?;
        info!("Watching project directory: {}", project_path.display());

        Ok(Self {
            project_path,
            rx,
            _watcher: watcher,
        })
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    /// Run the watcher loop until the channel closes
    pub async fn run(mut self, session: &mut Session) {
        info!("Starting file watcher loop");

        while let Some(first) = self.rx.recv().await {
            // Editors save in bursts; handle each file once per burst
            let mut batch = vec![first];
            while let Ok(change) = self.rx.try_recv() {
                if !batch.contains(&change) {
                    batch.push(change);
                }
            }
            for change in batch {
                handle_change(session, change).await;
            }
        }

        info!("File watcher loop ended");
    }
}

/// Convert a notify event to our FileChange type
pub(crate) fn event_to_change(project_path: &Path, event: &Event) -> Option<FileChange> {
    match event.kind {
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_) => {}
        _ => {
            debug!("Ignoring event kind: {:?}", event.kind);
            return None;
        }
    }

    let path = event.paths.first()?;
    let rel_path = path.strip_prefix(project_path).ok()?;
    let parent = rel_path.parent()?.to_string_lossy();
    let file_name = rel_path.file_name()?.to_string_lossy();

    debug!("File change detected: {}", rel_path.display());

    if rel_path == Path::new(MANIFEST_FILE) {
        Some(FileChange::ManifestChanged)
    } else if parent == BLUEPRINTS_DIR {
        let id = file_name.strip_suffix(BLUEPRINT_EXTENSION)?;
        Some(FileChange::BlueprintChanged(id.to_string()))
    } else if parent == STRUCTS_DIR {
        let id = file_name.strip_suffix(STRUCT_EXTENSION)?;
        Some(FileChange::StructChanged(id.to_string()))
    } else {
        None
    }
}

/// Handle a file change
async fn handle_change(session: &mut Session, change: FileChange) {
    match change {
        FileChange::BlueprintChanged(id) => {
            info!("Blueprint changed: {}", id);
            if let Err(e) = session.reload_blueprint(&id).await {
                warn!("Failed to reload blueprint {}: {}", id, e);
            }
        }
        FileChange::StructChanged(id) => {
            info!("Struct changed: {}", id);
            if let Err(e) = session.reload_struct(&id).await {
                warn!("Failed to reload struct {}: {}", id, e);
            }
        }
        FileChange::ManifestChanged => {
            warn!("Project manifest changed; restart to apply compiler settings");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from("/project").join(path))
    }

    #[test]
    fn test_blueprint_changes() {
        let root = Path::new("/project");
        assert_eq!(
            event_to_change(root, &event(EventKind::Modify(ModifyKind::Any), "blueprints/door.bp.json")),
            Some(FileChange::BlueprintChanged("door".into()))
        );
        assert_eq!(
            event_to_change(root, &event(EventKind::Remove(RemoveKind::File), "blueprints/door.bp.json")),
            Some(FileChange::BlueprintChanged("door".into()))
        );
        assert_eq!(
            event_to_change(root, &event(EventKind::Create(CreateKind::File), "structs/hit.struct.json")),
            Some(FileChange::StructChanged("hit".into()))
        );
    }

    #[test]
    fn test_ignored_changes() {
        let root = Path::new("/project");
        assert_eq!(
            event_to_change(root, &event(EventKind::Modify(ModifyKind::Any), "blueprints/door.bp.json.swp")),
            None
        );
        assert_eq!(
            event_to_change(root, &event(EventKind::Modify(ModifyKind::Any), "blueprints/old/door.bp.json")),
            None
        );
        assert_eq!(
            event_to_change(root, &event(EventKind::Access(notify::event::AccessKind::Any), "project.toml")),
            None
        );
        assert!(event_to_change(root, &Event::new(EventKind::Modify(ModifyKind::Any))).is_none());
    }

    #[test]
    fn test_manifest_change() {
        let root = Path::new("/project");
        assert_eq!(
            event_to_change(root, &event(EventKind::Modify(ModifyKind::Any), "project.toml")),
            Some(FileChange::ManifestChanged)
        );
    }
}
