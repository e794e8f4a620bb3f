use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::store::error::{StoreError, StoreResult};
use crate::store::models::{FileNode, NodeKind, Project};
use crate::store::service::SessionStore;

/// Pass-through file operations scoped to a project's `files/` area.
impl SessionStore {
    pub async fn read_file(&self, project_id: &str, path: &str) -> StoreResult<String> {
        let project = self.require_project(project_id).await?;
        let target = resolve_in(&project, path)?;
        fs::read_to_string(&target)
            .await
            .map_err(|e| StoreError::storage(&target, e))
    }

    /// Writes `content`, creating missing parent directories first.
    pub async fn write_file(&self, project_id: &str, path: &str, content: &str) -> StoreResult<()> {
        let (project, _project_guard) = self.lock_project(project_id).await?;
        let target = resolve_in(&project, path)?;
        create_parent(&target).await?;
        fs::write(&target, content)
            .await
            .map_err(|e| StoreError::storage(&target, e))?;

        debug!("Wrote {} bytes to {}", content.len(), target.display());
        Ok(())
    }

    /// Like `write_file`, but fails with `AlreadyExists` if the file is there.
    pub async fn create_file(&self, project_id: &str, path: &str, content: &str) -> StoreResult<()> {
        let (project, _project_guard) = self.lock_project(project_id).await?;
        let target = resolve_in(&project, path)?;
        create_parent(&target).await?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
            .map_err(|e| StoreError::storage(&target, e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StoreError::storage(&target, e))?;
        file.flush()
            .await
            .map_err(|e| StoreError::storage(&target, e))?;

        debug!("Created {}", target.display());
        Ok(())
    }

    /// Deletes a file or a whole directory. Missing paths are a no-op.
    pub async fn delete_file(&self, project_id: &str, path: &str) -> StoreResult<()> {
        let (project, _project_guard) = self.lock_project(project_id).await?;
        let target = resolve_in(&project, path)?;
        let meta = match fs::metadata(&target).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StoreError::storage(&target, e)),
        };

        let result = if meta.is_dir() {
            fs::remove_dir_all(&target).await
        } else {
            fs::remove_file(&target).await
        };
        result.map_err(|e| StoreError::storage(&target, e))?;

        debug!("Deleted {}", target.display());
        Ok(())
    }

    /// Recursive listing of the project's files area, sorted by name at every
    /// level. Unknown projects yield an empty tree.
    pub async fn list_file_tree(&self, project_id: &str) -> StoreResult<Vec<FileNode>> {
        let Some(project) = self.get_project(project_id).await? else {
            return Ok(Vec::new());
        };

        let root = project.files_dir();
        let walk_root = root.clone();
        tokio::task::spawn_blocking(move || read_tree(&walk_root, ""))
            .await
            .map_err(|e| StoreError::storage(&root, io::Error::other(e)))?
            .map_err(|e| StoreError::storage(&root, e))
    }
}

fn resolve_in(project: &Project, path: &str) -> StoreResult<PathBuf> {
    let root = project.files_dir();
    scoped_path(&root, path).ok_or_else(|| {
        StoreError::storage(
            root.join(path),
            io::Error::new(
                io::ErrorKind::PermissionDenied,
                "path escapes the project files area",
            ),
        )
    })
}

async fn create_parent(target: &Path) -> StoreResult<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::storage(parent, e))?;
    }
    Ok(())
}

/// Joins a relative path onto `root`, refusing absolute paths and `..`.
fn scoped_path(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    let mut depth = 0;
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (depth > 0).then_some(resolved)
}

fn read_tree(dir: &Path, prefix: &str) -> io::Result<Vec<FileNode>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut nodes = Vec::new();
    for entry in entries {
        let entry = entry?;
        let meta = entry.metadata()?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", prefix, name)
        };
        let modified = meta.modified().ok().map(DateTime::<Utc>::from);

        let node = if meta.is_dir() {
            FileNode {
                children: read_tree(&entry.path(), &path)?,
                name,
                path,
                kind: NodeKind::Directory,
                size: 0,
                modified,
            }
        } else {
            FileNode {
                name,
                path,
                kind: NodeKind::File,
                size: meta.len(),
                modified,
                children: Vec::new(),
            }
        };
        nodes.push(node);
    }

    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_path_rejects_escapes() {
        let root = Path::new("/data/p/files");
        assert_eq!(
            scoped_path(root, "src/main.rs"),
            Some(PathBuf::from("/data/p/files/src/main.rs"))
        );
        assert_eq!(
            scoped_path(root, "./a.txt"),
            Some(PathBuf::from("/data/p/files/a.txt"))
        );
        assert_eq!(scoped_path(root, "../secret"), None);
        assert_eq!(scoped_path(root, "a/../../b"), None);
        assert_eq!(scoped_path(root, "/etc/passwd"), None);
        assert_eq!(scoped_path(root, ""), None);
    }
}
