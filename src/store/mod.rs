pub mod error;
pub mod files;
pub(crate) mod json;
pub mod models;
pub mod service;

pub use error::{StoreError, StoreResult};
pub use models::*;
pub use service::SessionStore;
