//! Domain types shared by both storage backends
//!
//! Backends convert their native rows/documents into these types before
//! returning, so callers never see a SQLite rowid or a SurrealDB record id.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Storage format of `Profile::date_of_birth`
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Storage format of `Profile::time_of_birth`
pub const TIME_FORMAT: &str = "%H:%M";

/// Title given to conversations created without one
pub const DEFAULT_TITLE: &str = "New Chat";

/// A registered account. The hash is whatever `auth::hash_password` produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password_hash: String,
}

/// Saved birth details a user can reload to regenerate a chart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub time_of_birth: NaiveTime,
    pub birth_city: String,
}

impl Profile {
    pub fn new(
        name: impl Into<String>,
        date_of_birth: NaiveDate,
        time_of_birth: NaiveTime,
        birth_city: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            date_of_birth,
            time_of_birth,
            birth_city: birth_city.into(),
        }
    }

    /// Build a profile from the text columns both backends store.
    pub fn from_stored(name: String, dob: &str, tob: &str, city: String) -> Result<Self> {
        let date_of_birth = NaiveDate::parse_from_str(dob, DATE_FORMAT)
            .map_err(|e| Error::InvalidValue(format!("date of birth {:?}: {}", dob, e)))?;
        let time_of_birth = NaiveTime::parse_from_str(tob, TIME_FORMAT)
            .map_err(|e| Error::InvalidValue(format!("time of birth {:?}: {}", tob, e)))?;
        Ok(Self::new(name, date_of_birth, time_of_birth, city))
    }

    pub fn dob_text(&self) -> String {
        self.date_of_birth.format(DATE_FORMAT).to_string()
    }

    pub fn tob_text(&self) -> String {
        self.time_of_birth.format(TIME_FORMAT).to_string()
    }
}

/// Backend-neutral conversation identifier.
///
/// SQLite hands out integers and SurrealDB hands out ULID keys; both are
/// carried as their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ConversationId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A conversation as listed for its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Who produced a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(Error::InvalidValue(format!("Unknown role: {}", s))),
        }
    }
}

/// One message in a conversation's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("Assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert!("system".parse::<Role>().is_err());
        for alias in ["human", "ai", "model"] {
            assert!(alias.parse::<Role>().is_err(), "{}", alias);
        }
    }

    #[test]
    fn test_profile_text_formats() {
        let profile = Profile::from_stored(
            "Asha".to_string(),
            "1990-01-01",
            "12:00",
            "New Delhi, India".to_string(),
        )
        .unwrap();

        assert_eq!(profile.dob_text(), "1990-01-01");
        assert_eq!(profile.tob_text(), "12:00");
        assert!(Profile::from_stored("x".into(), "01/01/1990", "12:00", "y".into()).is_err());
    }

    #[test]
    fn test_conversation_id_empty() {
        assert!(ConversationId::new("").is_empty());
        assert!(ConversationId::new("  ").is_empty());
        assert_eq!(ConversationId::from(42).as_str(), "42");
    }
}
