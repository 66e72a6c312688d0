//! Storage contract and the facade the rest of the crate talks to

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RemoteConfig;
use crate::model::{ChatTurn, Conversation, ConversationId, DEFAULT_TITLE, Profile, Role, User};
use crate::Result;
use super::{SqliteBackend, SurrealBackend};

/// Which backend a `Store` ended up with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Embedded SQLite file
    Sqlite,
    /// Remote SurrealDB instance
    Surreal,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::Surreal => "surrealdb",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persistence operations every backend provides.
///
/// Implementations must return identifiers as `ConversationId` strings and
/// treat deletes of unknown or malformed ids as a no-op.
#[async_trait]
pub trait ChatStore: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Create the collections if they are missing. Safe to call repeatedly.
    async fn ensure_schema(&self) -> Result<()>;

    /// Register a user. Returns `false` when the username is taken.
    async fn add_user(&self, username: &str, password: &str) -> Result<bool>;

    /// The user record, only when the username exists and the password verifies.
    async fn login(&self, username: &str, password: &str) -> Result<Option<User>>;

    async fn save_profile(&self, username: &str, profile: &Profile) -> Result<()>;

    /// Saved profiles of a user, in no particular order.
    async fn list_profiles(&self, username: &str) -> Result<Vec<Profile>>;

    async fn create_conversation(&self, username: &str, title: &str) -> Result<ConversationId>;

    /// Conversations of a user, most recent first.
    async fn list_conversations(&self, username: &str) -> Result<Vec<Conversation>>;

    /// Delete a conversation together with its messages.
    async fn delete_conversation(&self, id: &ConversationId) -> Result<()>;

    async fn save_chat(
        &self,
        username: &str,
        role: Role,
        content: &str,
        conversation: &ConversationId,
    ) -> Result<()>;

    /// Messages of a conversation in chronological order.
    async fn get_chat_history(&self, conversation: &ConversationId) -> Result<Vec<ChatTurn>>;

    /// Not supported by either backend; always `Error::Unsupported`.
    async fn clear_chat_history(&self, username: &str) -> Result<()>;
}

/// Handle to the backend chosen at startup.
///
/// Cheap to clone; all clones share the same backend.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn ChatStore>,
}

impl Store {
    pub fn new(backend: Arc<dyn ChatStore>) -> Self {
        Self { backend }
    }

    /// A remote handle wins when present; otherwise the local file is used.
    pub fn select(remote: Option<SurrealBackend>, local: SqliteBackend) -> Self {
        match remote {
            Some(remote) => Self::new(Arc::new(remote)),
            None => Self::new(Arc::new(local)),
        }
    }

    /// Build the store for a session.
    ///
    /// A configured remote store is tried once; if it cannot be reached the
    /// session falls back to SQLite for its whole lifetime.
    pub async fn connect(database: &Path, remote: Option<&RemoteConfig>) -> Result<Self> {
        let local = SqliteBackend::open(database)?;

        let remote = match remote {
            Some(config) => {
                config.validate()?;
                match SurrealBackend::connect(config).await {
                    Ok(backend) => Some(backend),
                    Err(e) => {
                        tracing::warn!("Remote store unavailable, using SQLite: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        let store = Self::select(remote, local);
        tracing::info!("Using {} backend", store.kind());
        Ok(store)
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        self.backend.ensure_schema().await
    }

    pub async fn add_user(&self, username: &str, password: &str) -> Result<bool> {
        tracing::debug!(backend = %self.kind(), username, "add_user");
        self.backend.add_user(username, password).await
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Option<User>> {
        tracing::debug!(backend = %self.kind(), username, "login");
        self.backend.login(username, password).await
    }

    pub async fn save_profile(&self, username: &str, profile: &Profile) -> Result<()> {
        tracing::debug!(backend = %self.kind(), username, profile = %profile.name, "save_profile");
        self.backend.save_profile(username, profile).await
    }

    pub async fn list_profiles(&self, username: &str) -> Result<Vec<Profile>> {
        self.backend.list_profiles(username).await
    }

    /// Create a conversation; `None` gets the default title.
    pub async fn create_conversation(&self, username: &str, title: Option<&str>) -> Result<ConversationId> {
        let title = title.filter(|t| !t.trim().is_empty()).unwrap_or(DEFAULT_TITLE);
        let id = self.backend.create_conversation(username, title).await?;
        tracing::debug!(backend = %self.kind(), username, %id, "create_conversation");
        Ok(id)
    }

    pub async fn list_conversations(&self, username: &str) -> Result<Vec<Conversation>> {
        self.backend.list_conversations(username).await
    }

    /// Deleting an empty, malformed or unknown id does nothing.
    pub async fn delete_conversation(&self, id: &ConversationId) -> Result<()> {
        if id.is_empty() {
            return Ok(());
        }
        tracing::debug!(backend = %self.kind(), %id, "delete_conversation");
        self.backend.delete_conversation(id).await
    }

    pub async fn save_chat(
        &self,
        username: &str,
        role: Role,
        content: &str,
        conversation: &ConversationId,
    ) -> Result<()> {
        tracing::debug!(backend = %self.kind(), username, %role, %conversation, "save_chat");
        self.backend.save_chat(username, role, content, conversation).await
    }

    pub async fn get_chat_history(&self, conversation: &ConversationId) -> Result<Vec<ChatTurn>> {
        if conversation.is_empty() {
            return Ok(Vec::new());
        }
        self.backend.get_chat_history(conversation).await
    }

    pub async fn clear_chat_history(&self, username: &str) -> Result<()> {
        self.backend.clear_chat_history(username).await
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("backend", &self.kind()).finish()
    }
}
