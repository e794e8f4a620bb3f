pub mod cli;
pub mod config;
pub mod llm;
pub mod notify;
pub mod store;
pub mod tasks;
pub mod turn;
