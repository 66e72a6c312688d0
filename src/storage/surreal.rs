//! SurrealDB storage implementation
//!
//! Documents mirror the SQLite columns. Conversations are keyed by ULIDs,
//! which sort in creation order, and chat messages reference their
//! conversation by the plain key string.

use std::future::IntoFuture;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

use crate::auth;
use crate::config::RemoteConfig;
use crate::model::{ChatTurn, Conversation, ConversationId, Profile, Role, User};
use crate::{Error, Result};
use super::document_schema;
use super::store::{BackendKind, ChatStore};

#[derive(Debug, Deserialize)]
struct AccountDoc {
    username: String,
    password_hash: String,
}

#[derive(Debug, Deserialize)]
struct ProfileDoc {
    profile_name: String,
    dob: String,
    tob: String,
    city: String,
}

#[derive(Debug, Deserialize)]
struct KeyDoc {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ConversationDoc {
    id: String,
    title: String,
    created_at: String,
}

#[derive(Debug, Deserialize)]
struct ChatDoc {
    role: String,
    content: String,
}

/// Tries for a signup CREATE that lost a write conflict
const CREATE_ATTEMPTS: usize = 3;

/// Document-store backend over a shared SurrealDB connection
#[derive(Clone)]
pub struct SurrealBackend {
    db: Surreal<Any>,
    query_timeout: Duration,
}

impl SurrealBackend {
    /// Connect, authenticate, select namespace/database and define the schema.
    ///
    /// The whole handshake is bounded by the configured connect timeout.
    pub async fn connect(config: &RemoteConfig) -> Result<Self> {
        config.validate()?;

        let handshake = async {
            let db = any::connect(config.url.as_str()).await?;
            if let (Some(username), Some(password)) = (&config.username, &config.password) {
                db.signin(Root {
                    username: username.as_str(),
                    password: password.as_str(),
                })
                .await?;
            }
            db.use_ns(config.namespace.as_str())
                .use_db(config.database.as_str())
                .await?;
            db.health().await?;
            Ok::<_, Error>(db)
        };

        let db = tokio::time::timeout(config.connect_timeout(), handshake)
            .await
            .map_err(|_| Error::Timeout("connect"))??;

        tracing::info!("Connected to SurrealDB at {}", config.url);

        let backend = Self {
            db,
            query_timeout: config.query_timeout(),
        };
        backend.ensure_schema().await?;
        Ok(backend)
    }

    /// Await a query under the per-query timeout
    async fn run<Q, T>(&self, op: &'static str, query: Q) -> Result<T>
    where
        Q: IntoFuture<Output = surrealdb::Result<T>>,
    {
        tokio::time::timeout(self.query_timeout, query)
            .await
            .map_err(|_| Error::Timeout(op))?
            .map_err(Into::into)
    }
}

impl std::fmt::Debug for SurrealBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurrealBackend")
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}

/// Duplicate record ids surface as a statement error. Embedded engines and
/// remote connections wrap it differently, so match on the message.
fn is_record_exists(e: &surrealdb::Error) -> bool {
    e.to_string().contains("already exists")
}

/// Concurrent writes to one key abort all but one transaction.
fn is_retryable_conflict(e: &surrealdb::Error) -> bool {
    e.to_string().contains("can be retried")
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::InvalidValue(format!("timestamp {:?}: {}", s, e)))
}

#[async_trait]
impl ChatStore for SurrealBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Surreal
    }

    async fn ensure_schema(&self) -> Result<()> {
        for stmt in document_schema::all_schema_statements() {
            self.run("ensure_schema", self.db.query(stmt)).await?.check()?;
        }
        Ok(())
    }

    // ========== User Operations ==========

    async fn add_user(&self, username: &str, password: &str) -> Result<bool> {
        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || auth::hash_password(&password)).await??;

        // The record id is the username, so a second CREATE fails inside the
        // store and there is no window between a lookup and the insert.
        for attempt in 1..=CREATE_ATTEMPTS {
            let response = self
                .run(
                    "add_user",
                    self.db
                        .query("CREATE type::thing('account', $username) SET username = $username, password_hash = $hash")
                        .bind(("username", username.to_string()))
                        .bind(("hash", hash.clone())),
                )
                .await?;

            match response.check() {
                Ok(_) => return Ok(true),
                Err(e) if is_record_exists(&e) => {
                    tracing::debug!("Username {} already taken", username);
                    return Ok(false);
                }
                Err(e) if is_retryable_conflict(&e) && attempt < CREATE_ATTEMPTS => {
                    tracing::debug!("Signup for {} raced another write, retrying", username);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::InvalidValue(format!("signup for {} kept conflicting", username)))
    }

    async fn login(&self, username: &str, password: &str) -> Result<Option<User>> {
        let mut response = self
            .run(
                "login",
                self.db
                    .query("SELECT username, password_hash FROM type::thing('account', $username)")
                    .bind(("username", username.to_string())),
            )
            .await?;
        let account: Option<AccountDoc> = response.take(0)?;
        let Some(account) = account else {
            return Ok(None);
        };

        let password = password.to_string();
        let stored = account.password_hash.clone();
        let verified =
            tokio::task::spawn_blocking(move || auth::verify_password(&password, &stored)).await?;

        Ok(verified.then(|| User {
            username: account.username,
            password_hash: account.password_hash,
        }))
    }

    // ========== Profile Operations ==========

    async fn save_profile(&self, username: &str, profile: &Profile) -> Result<()> {
        self.run(
            "save_profile",
            self.db
                .query("CREATE profile SET username = $username, profile_name = $name, dob = $dob, tob = $tob, city = $city")
                .bind(("username", username.to_string()))
                .bind(("name", profile.name.clone()))
                .bind(("dob", profile.dob_text()))
                .bind(("tob", profile.tob_text()))
                .bind(("city", profile.birth_city.clone())),
        )
        .await?
        .check()?;
        Ok(())
    }

    async fn list_profiles(&self, username: &str) -> Result<Vec<Profile>> {
        let mut response = self
            .run(
                "list_profiles",
                self.db
                    .query("SELECT profile_name, dob, tob, city FROM profile WHERE username = $username")
                    .bind(("username", username.to_string())),
            )
            .await?;
        let docs: Vec<ProfileDoc> = response.take(0)?;

        docs.into_iter()
            .map(|d| Profile::from_stored(d.profile_name, &d.dob, &d.tob, d.city))
            .collect()
    }

    // ========== Conversation Operations ==========

    async fn create_conversation(&self, username: &str, title: &str) -> Result<ConversationId> {
        let mut response = self
            .run(
                "create_conversation",
                self.db
                    .query(
                        "CREATE conversation:ulid() SET username = $username, title = $title, created_at = time::now() \
                         RETURN meta::id(id) AS id",
                    )
                    .bind(("username", username.to_string()))
                    .bind(("title", title.to_string())),
            )
            .await?;
        let created: Option<KeyDoc> = response.take(0)?;

        created
            .map(|k| ConversationId::new(k.id))
            .ok_or_else(|| Error::InvalidValue("conversation create returned no record".to_string()))
    }

    async fn list_conversations(&self, username: &str) -> Result<Vec<Conversation>> {
        let mut response = self
            .run(
                "list_conversations",
                self.db
                    .query(
                        "SELECT meta::id(id) AS id, title, <string> created_at AS created_at \
                         FROM conversation WHERE username = $username ORDER BY id DESC",
                    )
                    .bind(("username", username.to_string())),
            )
            .await?;
        let docs: Vec<ConversationDoc> = response.take(0)?;

        docs.into_iter()
            .map(|d| {
                Ok(Conversation {
                    id: ConversationId::new(d.id),
                    title: d.title,
                    created_at: parse_datetime(&d.created_at)?,
                })
            })
            .collect()
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<()> {
        // Unknown keys match nothing, so the statements are a no-op for them.
        self.run(
            "delete_conversation",
            self.db
                .query(
                    "BEGIN TRANSACTION; \
                     DELETE chat WHERE conversation_id = $id; \
                     DELETE type::thing('conversation', $id); \
                     COMMIT TRANSACTION;",
                )
                .bind(("id", id.as_str().to_string())),
        )
        .await?
        .check()?;
        Ok(())
    }

    // ========== Chat Operations ==========

    async fn save_chat(
        &self,
        username: &str,
        role: Role,
        content: &str,
        conversation: &ConversationId,
    ) -> Result<()> {
        self.run(
            "save_chat",
            self.db
                .query(
                    "CREATE chat SET username = $username, role = $role, content = $content, \
                     conversation_id = $conversation_id, timestamp = time::now()",
                )
                .bind(("username", username.to_string()))
                .bind(("role", role.as_str()))
                .bind(("content", content.to_string()))
                .bind(("conversation_id", conversation.as_str().to_string())),
        )
        .await?
        .check()?;
        Ok(())
    }

    async fn get_chat_history(&self, conversation: &ConversationId) -> Result<Vec<ChatTurn>> {
        let mut response = self
            .run(
                "get_chat_history",
                self.db
                    .query(
                        "SELECT role, content, timestamp FROM chat \
                         WHERE conversation_id = $conversation_id ORDER BY timestamp ASC",
                    )
                    .bind(("conversation_id", conversation.as_str().to_string())),
            )
            .await?;
        let docs: Vec<ChatDoc> = response.take(0)?;

        docs.into_iter()
            .map(|d| Ok(ChatTurn::new(d.role.parse()?, d.content)))
            .collect()
    }

    async fn clear_chat_history(&self, _username: &str) -> Result<()> {
        Err(Error::Unsupported("clear_chat_history"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_backend() -> SurrealBackend {
        SurrealBackend::connect(&RemoteConfig::new("mem://")).await.unwrap()
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let backend = memory_backend().await;
        backend.ensure_schema().await.unwrap();
        backend.ensure_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_user_crud() {
        let backend = memory_backend().await;

        assert!(backend.add_user("asha", "pw").await.unwrap());
        assert!(!backend.add_user("asha", "pw2").await.unwrap());
        assert!(backend.login("asha", "pw").await.unwrap().is_some());
        assert!(backend.login("asha", "pw2").await.unwrap().is_none());
        assert!(backend.login("ghost", "pw").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_account_create_is_recognised() {
        let backend = memory_backend().await;
        let create = "CREATE account:dup SET username = 'dup', password_hash = 'x'";

        backend.db.query(create).await.unwrap().check().unwrap();
        let err = backend.db.query(create).await.unwrap().check().unwrap_err();
        assert!(is_record_exists(&err), "{}", err);
    }

    #[tokio::test]
    async fn test_concurrent_signups_admit_one() {
        let backend = memory_backend().await;

        let (a, b) = tokio::join!(backend.add_user("asha", "one"), backend.add_user("asha", "two"));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(a ^ b, "exactly one signup wins: {} {}", a, b);

        let winner = if a { "one" } else { "two" };
        assert!(backend.login("asha", winner).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_conversation_keys_are_strings() {
        let backend = memory_backend().await;

        let id = backend.create_conversation("asha", "Career").await.unwrap();
        assert!(!id.is_empty());
        assert!(!id.as_str().contains(':'));

        let listed = backend.list_conversations("asha").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].title, "Career");
    }

    #[tokio::test]
    async fn test_delete_malformed_id_is_noop() {
        let backend = memory_backend().await;
        let id = backend.create_conversation("asha", "Keep").await.unwrap();
        backend.save_chat("asha", Role::User, "hello", &id).await.unwrap();

        backend
            .delete_conversation(&ConversationId::new("definitely not ⟨a key⟩"))
            .await
            .unwrap();

        assert_eq!(backend.list_conversations("asha").await.unwrap().len(), 1);
        assert_eq!(backend.get_chat_history(&id).await.unwrap().len(), 1);
    }

    #[test]
    fn test_parse_datetime() {
        let ts = parse_datetime("2024-03-01T10:20:30.123456789Z").unwrap();
        assert_eq!(ts.timestamp(), 1709288430);
        assert!(parse_datetime("2024-03-01 10:20:30").is_err());
    }
}
