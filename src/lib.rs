//! # Kundli Chat - persistence core for a Vedic chart chat assistant
//!
//! A user enters birth details, an external library turns them into a chart,
//! and the user talks to an LLM about it. This crate owns everything that has
//! to be remembered between those steps.
//!
//! Kundli Chat provides:
//! - User accounts with salted password hashes
//! - Saved birth profiles that can be reloaded later
//! - Conversations and their chat turns
//! - Two interchangeable backends: embedded SQLite or remote SurrealDB
//! - A session context that drives a chat turn through the store

pub mod auth;
pub mod model;
pub mod storage;
pub mod session;
pub mod config;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use model::{ChatTurn, Conversation, ConversationId, Profile, Role, User};
pub use storage::{BackendKind, ChatStore, SqliteBackend, Store, SurrealBackend};
pub use session::{Advisor, Session};

/// Result type alias for Kundli Chat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Kundli Chat operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Remote store error: {0}")]
    Remote(#[from] surrealdb::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Remote store timed out during {0}")]
    Timeout(&'static str),

    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chart error: {0}")]
    Chart(String),

    #[error("No user is signed in")]
    NotSignedIn,

    #[error("No birth chart has been generated for this session")]
    NoChart,

    #[error("Chat is disabled: no LLM credential configured")]
    ChatDisabled,

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
