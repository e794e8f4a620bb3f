#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gempocket::store::{InlineImage, NewMessage, NodeKind, Role, SessionStore, StoreError};
    use tempfile::TempDir;

    async fn open_store() -> (TempDir, SessionStore) {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open_at(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_create_session_and_append() {
        let (_dir, store) = open_store().await;

        let demo = store.create_project("demo").await.unwrap();
        let s1 = store.create_session(&demo.id, "s1").await.unwrap();
        store
            .append_message(&demo.id, &s1.id, NewMessage::user("hi"))
            .await
            .unwrap();

        let session = store.get_session(&demo.id, &s1.id).await.unwrap().unwrap();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].content, "hi");
        assert_eq!(session.messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_appends_keep_call_order() {
        let (_dir, store) = open_store().await;
        let project = store.create_project("ordered").await.unwrap();
        let session = store.create_session(&project.id, "chat").await.unwrap();

        for i in 0..5 {
            let message = if i % 2 == 0 {
                NewMessage::user(format!("turn {}", i))
            } else {
                NewMessage::assistant(format!("turn {}", i))
            };
            store
                .append_message(&project.id, &session.id, message)
                .await
                .unwrap();
        }

        let session = store
            .get_session(&project.id, &session.id)
            .await
            .unwrap()
            .unwrap();
        let contents: Vec<_> = session.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["turn 0", "turn 1", "turn 2", "turn 3", "turn 4"]);
        assert_eq!(session.messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_images_survive_reload() {
        let dir = TempDir::new().unwrap();
        let (project_id, session_id) = {
            let store = SessionStore::open_at(dir.path()).await.unwrap();
            let project = store.create_project("pics").await.unwrap();
            let session = store.create_session(&project.id, "s").await.unwrap();
            let image = InlineImage::from_bytes("image/png", &[0x89, b'P', b'N', b'G']);
            store
                .append_message(
                    &project.id,
                    &session.id,
                    NewMessage::user("look").with_images(vec![image]),
                )
                .await
                .unwrap();
            (project.id, session.id)
        };

        let store = SessionStore::open_at(dir.path()).await.unwrap();
        let session = store
            .get_session(&project_id, &session_id)
            .await
            .unwrap()
            .unwrap();
        let images = &session.messages[0].images;
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime_type, "image/png");
        assert_eq!(images[0].decode().unwrap(), vec![0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_serialized() {
        let (_dir, store) = open_store().await;
        let store = Arc::new(store);
        let project = store.create_project("busy").await.unwrap();
        let session = store.create_session(&project.id, "chat").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            let project_id = project.id.clone();
            let session_id = session.id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append_message(&project_id, &session_id, NewMessage::user(format!("m{}", i)))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let session = store
            .get_session(&project.id, &session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.messages.len(), 20);
    }

    #[tokio::test]
    async fn test_unknown_project_is_not_found() {
        let (_dir, store) = open_store().await;

        let err = store.create_session("project_missing", "s").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let err = store
            .append_message("project_missing", "session_x", NewMessage::user("hi"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_missing_session_reads_as_none() {
        let (_dir, store) = open_store().await;
        let project = store.create_project("p").await.unwrap();

        assert!(store
            .get_session(&project.id, "session_nope")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get_session("project_nope", "session_nope")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get_session(&project.id, "../../projects")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_and_delete_sessions() {
        let (_dir, store) = open_store().await;
        let project = store.create_project("p").await.unwrap();
        let first = store.create_session(&project.id, "first").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.create_session(&project.id, "second").await.unwrap();

        let sessions = store.list_sessions(&project.id).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, second.id);

        store.delete_session(&project.id, &first.id).await.unwrap();
        store.delete_session(&project.id, &first.id).await.unwrap();

        let sessions = store.list_sessions(&project.id).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].name, "second");
    }

    #[tokio::test]
    async fn test_delete_project_cascades_and_is_idempotent() {
        let (_dir, store) = open_store().await;
        let keep = store.create_project("keep").await.unwrap();
        let gone = store.create_project("gone").await.unwrap();
        let session = store.create_session(&gone.id, "s").await.unwrap();
        store
            .write_file(&gone.id, "src/main.rs", "fn main() {}")
            .await
            .unwrap();

        store.delete_project(&gone.id).await.unwrap();
        store.delete_project(&gone.id).await.unwrap();

        assert!(!gone.path.exists());
        assert!(store.get_project(&gone.id).await.unwrap().is_none());
        assert!(store
            .get_session(&gone.id, &session.id)
            .await
            .unwrap()
            .is_none());

        let projects = store.list_projects().await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, keep.id);
    }

    #[tokio::test]
    async fn test_file_operations() {
        let (_dir, store) = open_store().await;
        let project = store.create_project("files").await.unwrap();

        store
            .write_file(&project.id, "src/lib.rs", "pub fn f() {}")
            .await
            .unwrap();
        store
            .create_file(&project.id, "README.md", "# files")
            .await
            .unwrap();
        assert_eq!(
            store.read_file(&project.id, "src/lib.rs").await.unwrap(),
            "pub fn f() {}"
        );

        let err = store
            .create_file(&project.id, "README.md", "again")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Storage { .. }));

        let tree = store.list_file_tree(&project.id).await.unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].name, "README.md");
        assert_eq!(tree[0].kind, NodeKind::File);
        assert_eq!(tree[0].size, 7);
        assert_eq!(tree[1].name, "src");
        assert_eq!(tree[1].kind, NodeKind::Directory);
        assert_eq!(tree[1].children[0].path, "src/lib.rs");

        store.delete_file(&project.id, "src").await.unwrap();
        store.delete_file(&project.id, "src").await.unwrap();
        let tree = store.list_file_tree(&project.id).await.unwrap();
        assert_eq!(tree.len(), 1);

        assert!(store.read_file(&project.id, "src/lib.rs").await.is_err());
    }

    #[tokio::test]
    async fn test_file_paths_cannot_escape_project() {
        let (_dir, store) = open_store().await;
        let project = store.create_project("jail").await.unwrap();

        for path in ["../projects.json", "/etc/passwd", "a/../../b", ""] {
            let err = store
                .write_file(&project.id, path, "x")
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::Storage { .. }), "{}", path);
        }
        assert!(store.read_file(&project.id, "../../projects.json").await.is_err());
    }

    #[tokio::test]
    async fn test_storage_info() {
        let (dir, store) = open_store().await;
        let project = store.create_project("sized").await.unwrap();
        store
            .write_file(&project.id, "data.txt", "0123456789")
            .await
            .unwrap();

        let info = store.storage_info().await.unwrap();
        assert_eq!(info.project_count, 1);
        assert_eq!(info.base_dir, dir.path());
        assert!(info.total_size >= 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_delete_project_racing_session_writes_leaves_no_orphans() {
        let (_dir, store) = open_store().await;
        let store = Arc::new(store);

        for _ in 0..50 {
            let project = store.create_project("racy").await.unwrap();
            let seeded = store.create_session(&project.id, "seed").await.unwrap();

            let creator = {
                let store = store.clone();
                let id = project.id.clone();
                tokio::spawn(async move { store.create_session(&id, "late").await })
            };
            let appender = {
                let store = store.clone();
                let id = project.id.clone();
                let session_id = seeded.id.clone();
                tokio::spawn(async move {
                    store
                        .append_message(&id, &session_id, NewMessage::user("late"))
                        .await
                })
            };
            let deleter = {
                let store = store.clone();
                let id = project.id.clone();
                tokio::spawn(async move { store.delete_project(&id).await })
            };

            deleter.await.unwrap().unwrap();
            if let Err(e) = creator.await.unwrap() {
                assert!(e.is_not_found(), "{}", e);
            }
            if let Err(e) = appender.await.unwrap() {
                assert!(e.is_not_found(), "{}", e);
            }

            assert!(store.get_project(&project.id).await.unwrap().is_none());
            assert!(!project.path.exists(), "project directory came back");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_create_file_has_one_winner() {
        let (_dir, store) = open_store().await;
        let store = Arc::new(store);
        let project = store.create_project("files").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let id = project.id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .create_file(&id, "notes/todo.md", &format!("writer {}", i))
                    .await
            }));
        }

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => created += 1,
                Err(e) => assert!(matches!(e, StoreError::Storage { .. })),
            }
        }
        assert_eq!(created, 1);
        assert!(store
            .read_file(&project.id, "notes/todo.md")
            .await
            .unwrap()
            .starts_with("writer "));
    }
}
