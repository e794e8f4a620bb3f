pub mod commands;

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::cli::commands::{Commands, FilesAction, ProjectAction, SessionAction, TasksAction};
use crate::config::AppConfig;
use crate::llm::{ChatClient, GeminiProvider, LlmError};
use crate::notify::LogNotifier;
use crate::store::{FileNode, InlineImage, NodeKind, SessionStore, StoreError};
use crate::tasks::{IntervalScheduler, TaskError, TaskTracker, WakeScheduler};
use crate::turn::TurnRunner;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

struct Services {
    store: Arc<SessionStore>,
    client: Arc<ChatClient>,
    tracker: Arc<TaskTracker>,
}

async fn open_services(config: &AppConfig) -> Result<Services, CliError> {
    let store = Arc::new(SessionStore::open(&config.storage).await?);
    let provider = Arc::new(GeminiProvider::from_config(&config.gemini));
    let client = Arc::new(ChatClient::new(store.clone(), provider));
    let tracker = Arc::new(
        TaskTracker::open(&config.storage.base_dir, &config.tasks, Arc::new(LogNotifier)).await?,
    );
    Ok(Services {
        store,
        client,
        tracker,
    })
}

pub async fn run_cli(command: Commands, config_path: String) -> Result<(), CliError> {
    let config = AppConfig::load(&config_path)?;
    let services = open_services(&config).await?;
    let store = &services.store;

    match command {
        Commands::Project { action } => match action {
            ProjectAction::Create { name } => {
                let project = store.create_project(&name).await?;
                println!("Created Project: {} ({})", project.name, project.id);
            }
            ProjectAction::List => {
                let projects = store.list_projects().await?;
                if projects.is_empty() {
                    println!("No projects found.");
                } else {
                    println!("{:<42} | {:<25} | {}", "ID", "Created At", "Name");
                    println!("{:-<42}-+-{:-<25}-+-{:-<20}", "", "", "");
                    for p in projects {
                        println!(
                            "{:<42} | {:<25} | {}",
                            p.id,
                            p.created_at.format("%Y-%m-%d %H:%M:%S"),
                            p.name
                        );
                    }
                }
            }
            ProjectAction::Delete { id } => {
                store.delete_project(&id).await?;
                println!("Deleted project {}", id);
            }
        },
        Commands::Session { action } => match action {
            SessionAction::Create { project, name } => {
                let session = store.create_session(&project, &name).await?;
                println!("Created Session: {} ({})", session.name, session.id);
            }
            SessionAction::List { project } => {
                let sessions = store.list_sessions(&project).await?;
                if sessions.is_empty() {
                    println!("No sessions found.");
                } else {
                    println!("{:<42} | {:<8} | {}", "ID", "Messages", "Name");
                    println!("{:-<42}-+-{:-<8}-+-{:-<20}", "", "", "");
                    for s in sessions {
                        println!("{:<42} | {:<8} | {}", s.id, s.messages.len(), s.name);
                    }
                }
            }
            SessionAction::Show { project, id } => {
                let session = store
                    .get_session(&project, &id)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(format!("session {}", id)))?;
                println!("Session: {}", session.name);
                println!("Created At: {}", session.created_at);
                println!("---");
                for m in session.messages {
                    println!("[{}]: {}", m.role.as_str().to_uppercase(), m.content);
                    for image in &m.images {
                        println!("  <image {} ({} base64 chars)>", image.mime_type, image.data.len());
                    }
                    println!("---");
                }
            }
            SessionAction::Delete { project, id } => {
                store.delete_session(&project, &id).await?;
                println!("Deleted session {}", id);
            }
        },
        Commands::Files { action } => match action {
            FilesAction::Tree { project } => {
                let tree = store.list_file_tree(&project).await?;
                if tree.is_empty() {
                    println!("(empty)");
                }
                print_tree(&tree, 0);
            }
            FilesAction::Read { project, path } => {
                print!("{}", store.read_file(&project, &path).await?);
            }
            FilesAction::Write {
                project,
                path,
                content,
            } => {
                store.write_file(&project, &path, &content).await?;
                println!("Wrote {}", path);
            }
            FilesAction::Rm { project, path } => {
                store.delete_file(&project, &path).await?;
                println!("Deleted {}", path);
            }
        },
        Commands::Tasks { action } => match action {
            TasksAction::List => {
                let tasks = services.tracker.active_tasks().await?;
                if tasks.is_empty() {
                    println!("No active tasks.");
                }
                for t in tasks {
                    println!(
                        "{} | {:<9} | started {} | {}",
                        t.id,
                        t.status,
                        t.start_time.format("%Y-%m-%d %H:%M:%S"),
                        t.label()
                    );
                }
            }
            TasksAction::Clear => {
                let cleared = services.tracker.clear_completed_tasks().await?;
                println!("Cleared {} tasks", cleared);
            }
            TasksAction::Wake => {
                let sent = services.tracker.on_wake().await?;
                println!("Sent {} progress notifications", sent);
            }
        },
        Commands::Info => {
            let info = store.storage_info().await?;
            println!("Base dir: {}", info.base_dir.display());
            println!("Projects: {}", info.project_count);
            println!("Total size: {} bytes", info.total_size);
        }
        Commands::Exec {
            project,
            session,
            command,
        } => {
            let runner = TurnRunner::new(services.client.clone(), services.tracker.clone());
            runner
                .run_command(&project, &session, &command, |delta| {
                    print!("{}", delta);
                    let _ = io::stdout().flush();
                })
                .await?;
            println!();
        }
        Commands::Chat { project, session } => {
            run_repl(&services, &config, &project, &session).await?;
        }
    }

    Ok(())
}

async fn run_repl(
    services: &Services,
    config: &AppConfig,
    project_id: &str,
    session_id: &str,
) -> Result<(), CliError> {
    // Verify session
    if services
        .store
        .get_session(project_id, session_id)
        .await?
        .is_none()
    {
        return Err(StoreError::NotFound(format!("session {}", session_id)).into());
    }

    let scheduler = IntervalScheduler::new();
    services.tracker.initialize(
        &scheduler,
        std::time::Duration::from_secs(config.tasks.wake_interval_secs),
    );
    let runner = TurnRunner::new(services.client.clone(), services.tracker.clone());

    println!("--- Gemini Terminal Chat ---");
    println!("Connected to Session: {}", session_id);
    println!("Type /image <path|data URL> to attach an image, /exit to quit.");
    println!("----------------------------");

    let mut images: Vec<InlineImage> = Vec::new();
    loop {
        print!("\nUser> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let text = input.trim();

        if text.is_empty() {
            continue;
        }
        if text == "/exit" || text == "/quit" {
            break;
        }
        if let Some(source) = text.strip_prefix("/image ") {
            match load_image(source.trim()) {
                Ok(image) => {
                    println!("Attached {} for the next message", image.mime_type);
                    images.push(image);
                }
                Err(e) => eprintln!("Could not attach image: {}", e),
            }
            continue;
        }

        print!("Gemini> ");
        io::stdout().flush()?;

        let result = runner
            .run(project_id, session_id, text, std::mem::take(&mut images), |delta| {
                print!("{}", delta);
                let _ = io::stdout().flush();
            })
            .await;
        println!();

        if let Err(e) = result {
            eprintln!("Error: {}", e);
        }
    }

    scheduler.unregister();
    Ok(())
}

/// Accepts either a `data:` URL or a path to a local image file.
fn load_image(source: &str) -> io::Result<InlineImage> {
    if source.starts_with("data:") {
        return InlineImage::from_data_url(source).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "malformed data URL")
        });
    }

    let path = Path::new(source);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let mime = match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported image type",
            ))
        }
    };
    let bytes = std::fs::read(path)?;
    Ok(InlineImage::from_bytes(mime, &bytes))
}

fn print_tree(nodes: &[FileNode], depth: usize) {
    for node in nodes {
        let indent = "  ".repeat(depth);
        match node.kind {
            NodeKind::Directory => {
                println!("{}{}/", indent, node.name);
                print_tree(&node.children, depth + 1);
            }
            NodeKind::File => println!("{}{} ({} bytes)", indent, node.name, node.size),
        }
    }
}
