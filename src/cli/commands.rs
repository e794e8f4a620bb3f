use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gempocket", version, about = "Gemini coding assistant: projects, sessions and streaming chat", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enter interactive chat REPL mode
    Chat {
        #[arg(short, long)]
        project: String,
        #[arg(short, long)]
        session: String,
    },

    /// Ask the model to execute a command against the project
    Exec {
        #[arg(short, long)]
        project: String,
        #[arg(short, long)]
        session: String,
        /// The command line to run
        command: String,
    },

    /// Manage projects
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Manage chat sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Manage project files
    Files {
        #[command(subcommand)]
        action: FilesAction,
    },

    /// Inspect background generation tasks
    Tasks {
        #[command(subcommand)]
        action: TasksAction,
    },

    /// Show storage location and usage
    Info,
}

#[derive(Subcommand)]
pub enum ProjectAction {
    /// Create a new project
    Create {
        #[arg(short, long)]
        name: String,
    },

    /// List all projects
    List,

    /// Delete a project with all its sessions and files
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Create a new session
    Create {
        #[arg(short, long)]
        project: String,
        #[arg(short, long)]
        name: String,
    },

    /// List the sessions of a project
    List {
        #[arg(short, long)]
        project: String,
    },

    /// Print a session transcript
    Show {
        #[arg(short, long)]
        project: String,
        id: String,
    },

    /// Delete a session
    Delete {
        #[arg(short, long)]
        project: String,
        id: String,
    },
}

#[derive(Subcommand)]
pub enum FilesAction {
    /// Print the project file tree
    Tree {
        #[arg(short, long)]
        project: String,
    },

    /// Print a file
    Read {
        #[arg(short, long)]
        project: String,
        path: String,
    },

    /// Write a file, creating parent directories
    Write {
        #[arg(short, long)]
        project: String,
        path: String,
        content: String,
    },

    /// Delete a file or directory
    Rm {
        #[arg(short, long)]
        project: String,
        path: String,
    },
}

#[derive(Subcommand)]
pub enum TasksAction {
    /// List active tasks
    List,

    /// Drop completed and failed tasks
    Clear,

    /// Run one wake pass, as an external scheduler would
    Wake,
}
