use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::fs;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::store::error::{StoreError, StoreResult};
use crate::store::json;
use crate::store::models::{Message, NewMessage, Project, Session, StorageInfo};

const INDEX_FILE: &str = "projects.json";

/// File-backed repository of projects, sessions and messages.
///
/// Layout under `base_dir`:
///
/// ```text
/// projects.json                      project index
/// projects/<project_id>/sessions/    one <session_id>.json per session
/// projects/<project_id>/files/       user file tree
/// ```
///
/// Every mutation inside a project holds that project's lock shared, and
/// `delete_project` holds it exclusively, so nothing is written into a project
/// while it is being removed. Writes to one session record are further
/// serialized through a per-session mutex, and writes to the index through a
/// store-wide one. Nothing coordinates between two `SessionStore` instances
/// pointed at the same directory.
pub struct SessionStore {
    base_dir: PathBuf,
    projects_dir: PathBuf,
    index_lock: Mutex<()>,
    project_locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
    session_locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl SessionStore {
    pub async fn open(config: &StorageConfig) -> StoreResult<Self> {
        Self::open_at(&config.base_dir).await
    }

    pub async fn open_at(base_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let projects_dir = base_dir.join("projects");

        fs::create_dir_all(&projects_dir)
            .await
            .map_err(|e| StoreError::storage(&projects_dir, e))?;

        info!("Session store initialized at {}", base_dir.display());

        Ok(Self {
            base_dir,
            projects_dir,
            index_lock: Mutex::new(()),
            project_locks: Mutex::new(HashMap::new()),
            session_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    // --- Project Operations ---

    pub async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let path = self.index_path();
        let projects = json::read(&path)
            .await
            .map_err(|e| StoreError::storage(&path, e))?;
        Ok(projects.unwrap_or_default())
    }

    pub async fn get_project(&self, id: &str) -> StoreResult<Option<Project>> {
        let projects = self.list_projects().await?;
        Ok(projects.into_iter().find(|p| p.id == id))
    }

    pub async fn create_project(&self, name: &str) -> StoreResult<Project> {
        let id = format!("project_{}", Uuid::new_v4().simple());
        let path = self.projects_dir.join(&id);
        let now = Utc::now();

        let project = Project {
            id,
            name: name.to_string(),
            path,
            created_at: now,
            updated_at: now,
        };

        for dir in [project.sessions_dir(), project.files_dir()] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| StoreError::storage(&dir, e))?;
        }

        let _guard = self.index_lock.lock().await;
        let mut projects = self.list_projects().await?;
        projects.push(project.clone());
        self.write_record(&self.index_path(), &projects).await?;

        info!("Created project {} ({})", project.name, project.id);
        Ok(project)
    }

    /// Removes the project directory and its index entry. Unknown ids are a no-op.
    pub async fn delete_project(&self, id: &str) -> StoreResult<()> {
        let lock = self.project_lock(id).await;
        let result = {
            let _exclusive = lock.write().await;
            self.remove_project(id).await
        };

        self.session_locks
            .lock()
            .await
            .retain(|(project_id, _), _| project_id != id);
        self.release_project_lock(id, lock).await;
        result
    }

    async fn remove_project(&self, id: &str) -> StoreResult<()> {
        let _guard = self.index_lock.lock().await;
        let projects = self.list_projects().await?;

        let Some(project) = projects.iter().find(|p| p.id == id) else {
            debug!("delete_project: {} not in index", id);
            return Ok(());
        };

        match fs::remove_dir_all(&project.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::storage(&project.path, e)),
        }

        let remaining: Vec<Project> = projects.iter().filter(|p| p.id != id).cloned().collect();
        self.write_record(&self.index_path(), &remaining).await?;

        info!("Deleted project {}", id);
        Ok(())
    }

    // --- Session Operations ---

    pub async fn create_session(&self, project_id: &str, name: &str) -> StoreResult<Session> {
        let (project, _project_guard) = self.lock_project(project_id).await?;

        let session = Session {
            id: format!("session_{}", Uuid::new_v4().simple()),
            project_id: project.id.clone(),
            name: name.to_string(),
            created_at: Utc::now(),
            messages: Vec::new(),
        };

        let sessions_dir = project.sessions_dir();
        if !fs::try_exists(&sessions_dir)
            .await
            .map_err(|e| StoreError::storage(&sessions_dir, e))?
        {
            return Err(StoreError::NotFound(format!("project {}", project_id)));
        }
        self.write_record(&session_path(&project, &session.id), &session)
            .await?;

        info!("Created session {} in project {}", session.id, project.id);
        Ok(session)
    }

    /// Returns `Ok(None)` when the project or the session record does not exist.
    pub async fn get_session(
        &self,
        project_id: &str,
        session_id: &str,
    ) -> StoreResult<Option<Session>> {
        if !is_valid_id(session_id) {
            return Ok(None);
        }
        let Some(project) = self.get_project(project_id).await? else {
            return Ok(None);
        };
        self.read_record(&session_path(&project, session_id)).await
    }

    /// All sessions of a project, newest first. Unreadable records are skipped.
    pub async fn list_sessions(&self, project_id: &str) -> StoreResult<Vec<Session>> {
        let Some(project) = self.get_project(project_id).await? else {
            return Ok(Vec::new());
        };

        let dir = project.sessions_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::storage(&dir, e)),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::storage(&dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_record::<Session>(&path).await {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable session record: {}", e),
            }
        }

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    pub async fn delete_session(&self, project_id: &str, session_id: &str) -> StoreResult<()> {
        if !is_valid_id(session_id) {
            return Ok(());
        }
        let (project, _project_guard) = match self.lock_project(project_id).await {
            Ok(locked) => locked,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };

        let lock = self.session_lock(project_id, session_id).await;
        {
            let _guard = lock.lock().await;
            let path = session_path(&project, session_id);
            match fs::remove_file(&path).await {
                Ok(()) => info!("Deleted session {}", session_id),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::storage(&path, e)),
            }
        }

        let key = (project_id.to_string(), session_id.to_string());
        let mut locks = self.session_locks.lock().await;
        if locks.get(&key).is_some_and(|l| Arc::ptr_eq(l, &lock)) {
            locks.remove(&key);
        }
        Ok(())
    }

    // --- Message Operations ---

    /// Appends a message by rewriting the whole session record.
    pub async fn append_message(
        &self,
        project_id: &str,
        session_id: &str,
        message: NewMessage,
    ) -> StoreResult<Message> {
        let (project, _project_guard) = self.lock_project(project_id).await?;
        if !is_valid_id(session_id) {
            return Err(StoreError::NotFound(format!("session {}", session_id)));
        }

        let lock = self.session_lock(project_id, session_id).await;
        let _guard = lock.lock().await;

        let path = session_path(&project, session_id);
        let mut session: Session = self
            .read_record(&path)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("session {}", session_id)))?;

        let message = Message {
            id: format!("msg_{}", Uuid::new_v4().simple()),
            role: message.role,
            content: message.content,
            images: message.images,
            timestamp: Utc::now(),
        };
        session.messages.push(message.clone());

        self.write_record(&path, &session).await?;

        debug!(
            "Appended {} message to session {} ({} total)",
            message.role,
            session_id,
            session.messages.len()
        );
        Ok(message)
    }

    // --- Storage Info ---

    pub async fn storage_info(&self) -> StoreResult<StorageInfo> {
        let project_count = self.list_projects().await?.len();
        let base_dir = self.base_dir.clone();

        let walk_root = base_dir.clone();
        let total_size = tokio::task::spawn_blocking(move || dir_size(&walk_root))
            .await
            .map_err(|e| StoreError::storage(&base_dir, io::Error::other(e)))?
            .map_err(|e| StoreError::storage(&base_dir, e))?;

        Ok(StorageInfo {
            base_dir,
            total_size,
            project_count,
        })
    }

    pub(crate) async fn require_project(&self, id: &str) -> StoreResult<Project> {
        self.get_project(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("project {}", id)))
    }

    /// Looks the project up while holding its lock shared. The guard must be
    /// kept for the whole mutation.
    pub(crate) async fn lock_project(
        &self,
        id: &str,
    ) -> StoreResult<(Project, OwnedRwLockReadGuard<()>)> {
        let lock = self.project_lock(id).await;
        let guard = Arc::clone(&lock).read_owned().await;

        match self.get_project(id).await {
            Ok(Some(project)) => Ok((project, guard)),
            Ok(None) => {
                drop(guard);
                self.release_project_lock(id, lock).await;
                Err(StoreError::NotFound(format!("project {}", id)))
            }
            Err(e) => {
                drop(guard);
                self.release_project_lock(id, lock).await;
                Err(e)
            }
        }
    }

    async fn project_lock(&self, id: &str) -> Arc<RwLock<()>> {
        let mut locks = self.project_locks.lock().await;
        locks.entry(id.to_string()).or_default().clone()
    }

    /// Drops the map entry once only the map and the caller still hold it.
    /// Clones are only taken under the map mutex, so the count is stable here.
    async fn release_project_lock(&self, id: &str, lock: Arc<RwLock<()>>) {
        let mut locks = self.project_locks.lock().await;
        if locks.get(id).is_some_and(|l| Arc::ptr_eq(l, &lock)) && Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> (usize, usize) {
        (
            self.project_locks.lock().await.len(),
            self.session_locks.lock().await.len(),
        )
    }

    async fn session_lock(&self, project_id: &str, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks
            .entry((project_id.to_string(), session_id.to_string()))
            .or_default()
            .clone()
    }

    async fn read_record<T: serde::de::DeserializeOwned>(
        &self,
        path: &Path,
    ) -> StoreResult<Option<T>> {
        json::read(path)
            .await
            .map_err(|e| StoreError::storage(path, e))
    }

    async fn write_record<T: serde::Serialize>(&self, path: &Path, value: &T) -> StoreResult<()> {
        json::write_atomic(path, value)
            .await
            .map_err(|e| StoreError::storage(path, e))
    }

    fn index_path(&self) -> PathBuf {
        self.base_dir.join(INDEX_FILE)
    }
}

fn session_path(project: &Project, session_id: &str) -> PathBuf {
    project.sessions_dir().join(format!("{}.json", session_id))
}

/// Ids end up in file names, so only a conservative alphabet is accepted.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn dir_size(path: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}
