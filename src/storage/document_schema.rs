//! SurrealQL definitions for the document backend
//!
//! Tables are schemaless; only the lookup indexes are declared. Accounts are
//! keyed by username (`account:<username>`), so uniqueness comes from the
//! record id itself.

pub const DEFINE_TABLES: &str = r#"
DEFINE TABLE IF NOT EXISTS account SCHEMALESS;
DEFINE TABLE IF NOT EXISTS profile SCHEMALESS;
DEFINE TABLE IF NOT EXISTS conversation SCHEMALESS;
DEFINE TABLE IF NOT EXISTS chat SCHEMALESS;
"#;

pub const DEFINE_INDEXES: &str = r#"
DEFINE INDEX IF NOT EXISTS idx_profile_username ON profile FIELDS username;
DEFINE INDEX IF NOT EXISTS idx_conversation_username ON conversation FIELDS username;
DEFINE INDEX IF NOT EXISTS idx_chat_conversation ON chat FIELDS conversation_id;
DEFINE INDEX IF NOT EXISTS idx_chat_timestamp ON chat FIELDS timestamp;
"#;

/// All schema statements, in the order they must run
pub fn all_schema_statements() -> [&'static str; 2] {
    [DEFINE_TABLES, DEFINE_INDEXES]
}
