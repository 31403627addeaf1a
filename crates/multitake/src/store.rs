//! Project persistence: one JSON file per project under the projects
//! directory, rewritten atomically (temp + rename) under a store-level
//! mutex.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use uuid::Uuid;

use cf_domain::error::{Error, Result};

use crate::model::Project;

pub struct ProjectStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl ProjectStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    pub fn save(&self, project: &Project) -> Result<()> {
        let _guard = self.write_lock.lock();
        let path = self.path_for(&project.id);
        let raw = serde_json::to_string_pretty(project)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, raw.as_bytes())?;
        std::fs::rename(&tmp, &path)?;
        tracing::debug!(project = %project.id, "project persisted");
        Ok(())
    }

    pub fn load(&self, id: &Uuid) -> Result<Project> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(Error::ProjectNotFound(id.to_string()));
        }
        let raw = std::fs::read_to_string(&path)?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("project file {}: {e}", path.display())))
    }

    /// Parse a project id that may arrive as a UUID string from tool
    /// arguments.
    pub fn load_by_str(&self, id: &str) -> Result<Project> {
        let uuid = Uuid::parse_str(id).map_err(|_| Error::ProjectNotFound(id.to_string()))?;
        self.load(&uuid)
    }

    /// All persisted projects, newest first.
    pub fn list(&self) -> Result<Vec<Project>> {
        let mut projects = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let raw = std::fs::read_to_string(&path)?;
                match serde_json::from_str::<Project>(&raw) {
                    Ok(p) => projects.push(p),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable project file")
                    }
                }
            }
        }
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    /// Delete the project record. Files on disk under the project root are
    /// retained.
    pub fn delete(&self, id: &Uuid) -> Result<()> {
        let _guard = self.write_lock.lock();
        let path = self.path_for(id);
        if !path.exists() {
            return Err(Error::ProjectNotFound(id.to_string()));
        }
        std::fs::remove_file(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(dir: &Path) -> Project {
        Project::new("demo".into(), "Hello there.\n\nSecond part.", dir.join("demo")).unwrap()
    }

    #[test]
    fn save_load_save_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path().join("projects")).unwrap();
        let p = project(dir.path());
        store.save(&p).unwrap();

        let first = std::fs::read(store.dir().join(format!("{}.json", p.id))).unwrap();
        let loaded = store.load(&p.id).unwrap();
        store.save(&loaded).unwrap();
        let second = std::fs::read(store.dir().join(format!("{}.json", p.id))).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_project_is_a_distinct_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path().to_path_buf()).unwrap();
        let err = store.load(&Uuid::new_v4()).unwrap_err();
        assert_eq!(err.kind(), "project_not_found");
    }

    #[test]
    fn list_orders_newest_first_and_delete_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path().join("projects")).unwrap();
        let a = project(dir.path());
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = project(dir.path());
        store.save(&a).unwrap();
        store.save(&b).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, b.id);

        store.delete(&a.id).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
        assert!(store.load(&a.id).is_err());
    }
}
