//! SQLite storage implementation
//!
//! Every operation opens its own connection, does its work, commits and
//! closes. Nothing is pooled and no transaction outlives a call.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use crate::auth;
use crate::model::{ChatTurn, Conversation, ConversationId, Profile, Role, User};
use crate::{Error, Result};
use super::schema;
use super::store::{BackendKind, ChatStore};

/// Format of `CURRENT_TIMESTAMP` columns
const SQLITE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed storage over a single database file
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    path: PathBuf,
}

impl SqliteBackend {
    /// Open a database file (creates it and its schema if missing)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let backend = Self { path };
        let conn = backend.connection()?;
        initialize_schema(&conn)?;
        Ok(backend)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connection(&self) -> Result<Connection> {
        open_connection(&self.path)
    }

    /// Run `f` against a fresh connection on the blocking pool
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = open_connection(&path)?;
            f(&mut conn)
        })
        .await?
    }
}

/// Foreign keys are declared but not enforced, matching the document store,
/// which has no way to enforce them. The bundled SQLite enables them by default.
fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "foreign_keys", false)?;
    Ok(conn)
}

/// Initialize the database schema
fn initialize_schema(conn: &Connection) -> Result<()> {
    for stmt in schema::all_schema_statements() {
        conn.execute(stmt, [])?;
    }
    Ok(())
}

/// SQLite ids are integers; anything else cannot name a row.
fn parse_row_id(id: &ConversationId) -> Option<i64> {
    id.as_str().trim().parse().ok()
}

fn conversion_error(column: usize, e: Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

/// Helper to convert a row to a Profile
fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<Profile> {
    let dob: String = row.get(1)?;
    let tob: String = row.get(2)?;
    Profile::from_stored(row.get(0)?, &dob, &tob, row.get(3)?).map_err(|e| conversion_error(1, e))
}

/// Helper to convert a row to a Conversation
fn row_to_conversation(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
    let id: i64 = row.get(0)?;
    let created_at: String = row.get(2)?;
    let created_at = parse_timestamp(&created_at).map_err(|e| conversion_error(2, e))?;

    Ok(Conversation {
        id: ConversationId::from(id),
        title: row.get(1)?,
        created_at,
    })
}

/// Helper to convert a row to a ChatTurn
fn row_to_turn(row: &rusqlite::Row) -> rusqlite::Result<ChatTurn> {
    let role: String = row.get(0)?;
    let role: Role = role.parse().map_err(|e| conversion_error(0, e))?;
    Ok(ChatTurn::new(role, row.get::<_, String>(1)?))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, SQLITE_TIMESTAMP)
        .map(|t| t.and_utc())
        .map_err(|e| Error::InvalidValue(format!("timestamp {:?}: {}", s, e)))
}

#[async_trait]
impl ChatStore for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.run(|conn| initialize_schema(conn)).await
    }

    // ========== User Operations ==========

    async fn add_user(&self, username: &str, password: &str) -> Result<bool> {
        let username = username.to_string();
        let password = password.to_string();

        self.run(move |conn| {
            let hash = auth::hash_password(&password)?;
            match conn.execute(
                "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
                params![username, hash],
            ) {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                    tracing::debug!("Username {} already taken", username);
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn login(&self, username: &str, password: &str) -> Result<Option<User>> {
        let username = username.to_string();
        let password = password.to_string();
        self.run(move |conn| {
            let user = conn
                .query_row(
                    "SELECT username, password_hash FROM users WHERE username = ?1",
                    [&username],
                    |row| {
                        Ok(User {
                            username: row.get(0)?,
                            password_hash: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(user.filter(|u| auth::verify_password(&password, &u.password_hash)))
        })
        .await
    }

    // ========== Profile Operations ==========

    async fn save_profile(&self, username: &str, profile: &Profile) -> Result<()> {
        let username = username.to_string();
        let profile = profile.clone();

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO profiles (username, profile_name, dob, tob, city) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    username,
                    profile.name,
                    profile.dob_text(),
                    profile.tob_text(),
                    profile.birth_city,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_profiles(&self, username: &str) -> Result<Vec<Profile>> {
        let username = username.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT profile_name, dob, tob, city FROM profiles WHERE username = ?1",
            )?;
            let profiles = stmt
                .query_map([&username], row_to_profile)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(profiles)
        })
        .await
    }

    // ========== Conversation Operations ==========

    async fn create_conversation(&self, username: &str, title: &str) -> Result<ConversationId> {
        let username = username.to_string();
        let title = title.to_string();

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO conversations (username, title) VALUES (?1, ?2)",
                params![username, title],
            )?;
            Ok(ConversationId::from(conn.last_insert_rowid()))
        })
        .await
    }

    async fn list_conversations(&self, username: &str) -> Result<Vec<Conversation>> {
        let username = username.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, created_at FROM conversations WHERE username = ?1 ORDER BY id DESC",
            )?;
            let conversations = stmt
                .query_map([&username], row_to_conversation)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(conversations)
        })
        .await
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<()> {
        let Some(row_id) = parse_row_id(id) else {
            tracing::debug!("Ignoring delete of non-numeric conversation id {:?}", id.as_str());
            return Ok(());
        };

        self.run(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM chats WHERE conversation_id = ?1", [row_id])?;
            tx.execute("DELETE FROM conversations WHERE id = ?1", [row_id])?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    // ========== Chat Operations ==========

    async fn save_chat(
        &self,
        username: &str,
        role: Role,
        content: &str,
        conversation: &ConversationId,
    ) -> Result<()> {
        let row_id = parse_row_id(conversation).ok_or_else(|| {
            Error::InvalidValue(format!("conversation id {:?}", conversation.as_str()))
        })?;
        let username = username.to_string();
        let content = content.to_string();

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO chats (username, role, content, conversation_id) VALUES (?1, ?2, ?3, ?4)",
                params![username, role.as_str(), content, row_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_chat_history(&self, conversation: &ConversationId) -> Result<Vec<ChatTurn>> {
        let Some(row_id) = parse_row_id(conversation) else {
            return Ok(Vec::new());
        };

        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT role, content FROM chats WHERE conversation_id = ?1 ORDER BY id ASC",
            )?;
            let turns = stmt
                .query_map([row_id], row_to_turn)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(turns)
        })
        .await
    }

    async fn clear_chat_history(&self, _username: &str) -> Result<()> {
        Err(Error::Unsupported("clear_chat_history"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn temp_backend() -> (tempfile::TempDir, SqliteBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::open(dir.path().join("kundli.db")).unwrap();
        (dir, backend)
    }

    fn sample_profile(name: &str) -> Profile {
        Profile::new(
            name,
            NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            "New Delhi, India",
        )
    }

    #[tokio::test]
    async fn test_open_creates_parent_dir_and_schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".kundli").join("kundli.db");

        let backend = SqliteBackend::open(&path).unwrap();
        assert!(path.exists());

        backend.ensure_schema().await.unwrap();
        backend.ensure_schema().await.unwrap();
        SqliteBackend::open(&path).unwrap();
    }

    #[tokio::test]
    async fn test_user_crud() {
        let (_dir, backend) = temp_backend();

        assert!(backend.add_user("asha", "pw").await.unwrap());
        assert!(!backend.add_user("asha", "other").await.unwrap());

        let user = backend.login("asha", "pw").await.unwrap().unwrap();
        assert_eq!(user.username, "asha");
        assert_ne!(user.password_hash, "pw");

        assert!(backend.login("asha", "wrong").await.unwrap().is_none());
        assert!(backend.login("nobody", "pw").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_legacy_hash_rows_log_in() {
        let (_dir, backend) = temp_backend();
        let conn = backend.connection().unwrap();
        conn.execute(
            "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
            params!["old", auth::legacy_digest("pw")],
        )
        .unwrap();

        assert!(backend.login("old", "pw").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_profile_duplicates_are_kept() {
        let (_dir, backend) = temp_backend();

        backend.save_profile("asha", &sample_profile("Me")).await.unwrap();
        backend.save_profile("asha", &sample_profile("Me")).await.unwrap();
        backend.save_profile("ravi", &sample_profile("Ravi")).await.unwrap();

        let profiles = backend.list_profiles("asha").await.unwrap();
        assert_eq!(profiles.len(), 2);
        assert!(profiles.iter().all(|p| p.name == "Me"));
    }

    #[tokio::test]
    async fn test_conversation_ids_are_sequential_and_listed_newest_first() {
        let (_dir, backend) = temp_backend();

        let first = backend.create_conversation("asha", "First").await.unwrap();
        let second = backend.create_conversation("asha", "Second").await.unwrap();
        assert_eq!(first.as_str(), "1");
        assert_eq!(second.as_str(), "2");

        let listed = backend.list_conversations("asha").await.unwrap();
        let titles: Vec<_> = listed.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["Second", "First"]);
    }

    #[tokio::test]
    async fn test_delete_ignores_non_numeric_ids() {
        let (_dir, backend) = temp_backend();
        let id = backend.create_conversation("asha", "Keep").await.unwrap();

        backend.delete_conversation(&ConversationId::new("not-a-number")).await.unwrap();
        backend.delete_conversation(&ConversationId::new("999")).await.unwrap();

        assert_eq!(backend.list_conversations("asha").await.unwrap().len(), 1);
        assert_eq!(backend.list_conversations("asha").await.unwrap()[0].id, id);
    }

    #[tokio::test]
    async fn test_writes_for_unregistered_username_are_accepted() {
        let (_dir, backend) = temp_backend();

        let enforced: bool = backend
            .connection()
            .unwrap()
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert!(!enforced);

        backend.save_profile("ghost", &sample_profile("Ghost")).await.unwrap();
        let id = backend.create_conversation("ghost", "Orphan").await.unwrap();
        backend.save_chat("ghost", Role::User, "anyone there?", &id).await.unwrap();

        assert_eq!(backend.list_profiles("ghost").await.unwrap().len(), 1);
        assert_eq!(backend.get_chat_history(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_chat_rejects_foreign_ids() {
        let (_dir, backend) = temp_backend();
        let err = backend
            .save_chat("asha", Role::User, "hello", &ConversationId::new("abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("2024-03-01 10:20:30").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T10:20:30+00:00");
        assert!(parse_timestamp("yesterday").is_err());
    }
}
