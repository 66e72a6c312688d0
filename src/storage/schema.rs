//! Database schema definitions

/// SQL to create the users table
pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    username TEXT PRIMARY KEY,
    password_hash TEXT NOT NULL
)
"#;

/// SQL to create the profiles table
/// No uniqueness: a user may save the same profile name more than once
pub const CREATE_PROFILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    profile_name TEXT NOT NULL,
    dob TEXT NOT NULL,
    tob TEXT NOT NULL,
    city TEXT NOT NULL,
    FOREIGN KEY(username) REFERENCES users(username)
)
"#;

/// SQL to create the conversations table
pub const CREATE_CONVERSATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    title TEXT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY(username) REFERENCES users(username)
)
"#;

/// SQL to create the chats table
pub const CREATE_CHATS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS chats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    conversation_id INTEGER NOT NULL,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY(username) REFERENCES users(username),
    FOREIGN KEY(conversation_id) REFERENCES conversations(id)
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_profiles_username ON profiles(username)",
    "CREATE INDEX IF NOT EXISTS idx_conversations_username ON conversations(username)",
    "CREATE INDEX IF NOT EXISTS idx_chats_conversation ON chats(conversation_id)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_USERS_TABLE,
        CREATE_PROFILES_TABLE,
        CREATE_CONVERSATIONS_TABLE,
        CREATE_CHATS_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
