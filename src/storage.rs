//! SQLite storage layer.
//!
//! Provides the relational persistence behind the REST API: users,
//! conversations, conversation membership, and messages.  Handles schema
//! creation and cursor pagination.  The relay never touches this layer;
//! durable writes happen only through the API handlers.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    NotFound(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StorageError::NotFound(msg) => write!(f, "not found: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite(e)
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// User row.  Provisioned through the upsert endpoint; identity itself is an
/// external collaborator, so this is a mirror, not a credential store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub username: String,
    pub email: Option<String>,
    pub image: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Conversation row; `name` is set for groups only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRow {
    pub id: String,
    pub is_group: bool,
    pub name: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Membership row.  Direct conversations have exactly two `member` rows;
/// group creators get `admin`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMemberRow {
    pub conversation_id: String,
    pub user_id: String,
    pub role: String,
    pub joined_at: i64,
}

/// Message row.  `created_at` / `updated_at` are epoch milliseconds; the
/// pagination cursor is the `created_at` of the last row in a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub message_type: String,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A member joined with its user row (when the user still exists).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberWithUser {
    pub member: ConversationMemberRow,
    pub user: Option<UserRow>,
}

/// A conversation with its full member list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationWithMembers {
    pub conversation: ConversationRow,
    pub members: Vec<MemberWithUser>,
}

/// One page of messages, newest first, plus the cursor for the next page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesPage {
    pub messages: Vec<MessageRow>,
    pub next_cursor: Option<i64>,
}

/// Which pool of users `list_other_users` should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserMode {
    /// Candidates for a new DM: exclude the caller and anyone already
    /// sharing a direct conversation with the caller.
    Direct,
    /// Candidates for a group: everyone except the caller.
    Group,
}

/// Maximum page size for message listing.
pub const MAX_MESSAGE_PAGE: u32 = 50;

// ---------------------------------------------------------------------------
// Storage handle
// ---------------------------------------------------------------------------

/// Main storage handle wrapping a SQLite connection.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create a database at the given path. Creates schema if needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    /// Create an in-memory database.  Used by tests and by servers that do
    /// not need durability across restarts.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                username    TEXT NOT NULL,
                email       TEXT,
                image       TEXT,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS conversations (
                id          TEXT PRIMARY KEY,
                is_group    INTEGER NOT NULL DEFAULT 0,
                name        TEXT,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS conversation_members (
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                user_id         TEXT NOT NULL,
                role            TEXT NOT NULL DEFAULT 'member',
                joined_at       INTEGER NOT NULL,
                PRIMARY KEY (conversation_id, user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_members_user
                ON conversation_members(user_id);

            CREATE TABLE IF NOT EXISTS messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                sender_id       TEXT NOT NULL,
                content         TEXT NOT NULL,
                message_type    TEXT NOT NULL DEFAULT 'text',
                is_deleted      INTEGER NOT NULL DEFAULT 0,
                created_at      INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, created_at);
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users CRUD
    // -----------------------------------------------------------------------

    pub fn upsert_user(&self, row: &UserRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO users (id, name, username, email, image, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                username = excluded.username,
                email = excluded.email,
                image = excluded.image,
                updated_at = excluded.updated_at",
            params![
                row.id,
                row.name,
                row.username,
                row.email,
                row.image,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<UserRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, username, email, image, created_at, updated_at
             FROM users WHERE id = ?1",
        )?;
        let row = stmt
            .query_row(params![user_id], |row| {
                Ok(UserRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    username: row.get(2)?,
                    email: row.get(3)?,
                    image: row.get(4)?,
                    created_at: row.get(5)?,
                    updated_at: row.get(6)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    pub fn delete_user(&self, user_id: &str) -> Result<bool, StorageError> {
        let affected = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
        Ok(affected > 0)
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, username, email, image, created_at, updated_at
             FROM users ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], map_user_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Users available to start a new chat with, per [`UserMode`].
    pub fn list_other_users(
        &self,
        user_id: &str,
        mode: UserMode,
    ) -> Result<Vec<UserRow>, StorageError> {
        let sql = match mode {
            UserMode::Group => {
                "SELECT id, name, username, email, image, created_at, updated_at
                 FROM users WHERE id != ?1 ORDER BY created_at, id"
            }
            // Exclude anyone who already shares a direct (non-group)
            // conversation with the caller, so the picker only offers
            // pairings that would create a new conversation.
            UserMode::Direct => {
                "SELECT id, name, username, email, image, created_at, updated_at
                 FROM users
                 WHERE id != ?1
                   AND id NOT IN (
                       SELECT other.user_id
                       FROM conversation_members mine
                       JOIN conversations c
                         ON c.id = mine.conversation_id AND c.is_group = 0
                       JOIN conversation_members other
                         ON other.conversation_id = mine.conversation_id
                       WHERE mine.user_id = ?1 AND other.user_id != ?1
                   )
                 ORDER BY created_at, id"
            }
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![user_id], map_user_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Conversations CRUD
    // -----------------------------------------------------------------------

    pub fn insert_conversation(&self, row: &ConversationRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO conversations (id, is_group, name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.id,
                row.is_group as i32,
                row.name,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, is_group, name, created_at, updated_at
             FROM conversations WHERE id = ?1",
        )?;
        let row = stmt
            .query_row(params![conversation_id], map_conversation_row)
            .optional()?;
        Ok(row)
    }

    pub fn insert_member(&self, row: &ConversationMemberRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO conversation_members (conversation_id, user_id, role, joined_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![row.conversation_id, row.user_id, row.role, row.joined_at],
        )?;
        Ok(())
    }

    /// Members of one conversation, each joined with its user row.
    pub fn list_members(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<MemberWithUser>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT m.conversation_id, m.user_id, m.role, m.joined_at,
                    u.id, u.name, u.username, u.email, u.image, u.created_at, u.updated_at
             FROM conversation_members m
             LEFT JOIN users u ON u.id = m.user_id
             WHERE m.conversation_id = ?1
             ORDER BY m.joined_at, m.user_id",
        )?;
        let rows = stmt.query_map(params![conversation_id], map_member_with_user)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// All conversations the user belongs to, each with its full member list.
    pub fn list_conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationWithMembers>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.is_group, c.name, c.created_at, c.updated_at
             FROM conversations c
             JOIN conversation_members m ON m.conversation_id = c.id
             WHERE m.user_id = ?1
             ORDER BY c.updated_at DESC, c.id",
        )?;
        let rows = stmt.query_map(params![user_id], map_conversation_row)?;
        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }

        let mut result = Vec::new();
        for conversation in conversations {
            let members = self.list_members(&conversation.id)?;
            result.push(ConversationWithMembers {
                conversation,
                members,
            });
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Messages CRUD
    // -----------------------------------------------------------------------

    pub fn insert_message(&self, row: &MessageRow) -> Result<(), StorageError> {
        if self.get_conversation(&row.conversation_id)?.is_none() {
            return Err(StorageError::NotFound(format!(
                "conversation {}",
                row.conversation_id
            )));
        }
        self.conn.execute(
            "INSERT INTO messages
             (id, conversation_id, sender_id, content, message_type,
              is_deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.id,
                row.conversation_id,
                row.sender_id,
                row.content,
                row.message_type,
                row.is_deleted as i32,
                row.created_at,
                row.updated_at,
            ],
        )?;
        self.conn.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![row.created_at, row.conversation_id],
        )?;
        Ok(())
    }

    pub fn get_message(&self, message_id: &str) -> Result<Option<MessageRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, conversation_id, sender_id, content, message_type,
                    is_deleted, created_at, updated_at
             FROM messages WHERE id = ?1",
        )?;
        let row = stmt
            .query_row(params![message_id], map_message_row)
            .optional()?;
        Ok(row)
    }

    /// One page of messages for a conversation, newest first.
    ///
    /// Fetches `limit + 1` rows (limit capped at [`MAX_MESSAGE_PAGE`]); when
    /// the extra row exists it is popped and its `created_at` becomes the
    /// opaque cursor for the next page.  The cursor is inclusive (the next
    /// page begins at the popped row), so no row is skipped at a page
    /// boundary; rows sharing the boundary timestamp may repeat across
    /// pages, which the client's id-keyed dedup absorbs.
    pub fn list_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        before: Option<i64>,
    ) -> Result<MessagesPage, StorageError> {
        let limit = limit.clamp(1, MAX_MESSAGE_PAGE) as i64;
        let mut stmt = self.conn.prepare(
            "SELECT id, conversation_id, sender_id, content, message_type,
                    is_deleted, created_at, updated_at
             FROM messages
             WHERE conversation_id = ?1
               AND (?2 IS NULL OR created_at <= ?2)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![conversation_id, before, limit + 1], map_message_row)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }

        let next_cursor = if messages.len() as i64 > limit {
            messages.pop().map(|extra| extra.created_at)
        } else {
            None
        };

        Ok(MessagesPage {
            messages,
            next_cursor,
        })
    }
}

// ---------------------------------------------------------------------------
// Row mappers
// ---------------------------------------------------------------------------

fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        username: row.get(2)?,
        email: row.get(3)?,
        image: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn map_conversation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        is_group: row.get::<_, i32>(1)? != 0,
        name: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        message_type: row.get(4)?,
        is_deleted: row.get::<_, i32>(5)? != 0,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn map_member_with_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemberWithUser> {
    let member = ConversationMemberRow {
        conversation_id: row.get(0)?,
        user_id: row.get(1)?,
        role: row.get(2)?,
        joined_at: row.get(3)?,
    };
    let user = match row.get::<_, Option<String>>(4)? {
        Some(id) => Some(UserRow {
            id,
            name: row.get(5)?,
            username: row.get(6)?,
            email: row.get(7)?,
            image: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        }),
        None => None,
    };
    Ok(MemberWithUser { member, user })
}
