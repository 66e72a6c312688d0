//! Storage Layer - one contract, two backends
//!
//! Both backends persist the same four collections:
//! - users(username, password_hash)
//! - profiles(username, profile_name, dob, tob, city)
//! - conversations(id, username, title, created_at)
//! - chats(username, role, content, conversation_id, timestamp)
//!
//! The backend is picked once at startup and handed around as a `Store`.

pub mod schema;
pub mod document_schema;
pub mod sqlite;
pub mod surreal;
pub mod store;

pub use sqlite::SqliteBackend;
pub use surreal::SurrealBackend;
pub use store::{BackendKind, ChatStore, Store};
