//! Repositories combining the API client with local state

pub mod auth;
pub mod files;
pub mod offline;

pub use auth::AuthRepository;
pub use files::{FileRepository, UploadProgress};
pub use offline::OfflineChatStore;
