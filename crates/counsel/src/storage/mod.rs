//! SQLite-backed persistence
//!
//! Wraps a single `rusqlite::Connection` behind a `tokio::sync::Mutex`; the
//! schema is created idempotently on open. Timestamps are stored as RFC 3339
//! text.

mod models;

pub use models::{
    ArticleFilter, Comment, CommentView, Conversation, Discussion, DiscussionFilter,
    DiscussionSummary, LegalArticle, NewArticle, NewUser, StoredMessage, User, UserProfile,
};

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tokio::sync::Mutex;

use crate::error::Result;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  email TEXT NOT NULL UNIQUE,
  username TEXT NOT NULL UNIQUE,
  password_digest TEXT NOT NULL,
  salt TEXT NOT NULL,
  full_name TEXT,
  is_active INTEGER NOT NULL DEFAULT 1,
  is_admin INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS sessions (
  token TEXT PRIMARY KEY,
  user_id INTEGER NOT NULL REFERENCES users(id),
  expires_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS conversations (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id INTEGER NOT NULL REFERENCES users(id),
  title TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS messages (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
  ord INTEGER NOT NULL,
  role TEXT NOT NULL,
  content TEXT NOT NULL,
  timestamp TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS legal_articles (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  title TEXT NOT NULL,
  content TEXT NOT NULL,
  source TEXT NOT NULL,
  article_number TEXT NOT NULL,
  category TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT
);
CREATE TABLE IF NOT EXISTS discussions (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  title TEXT NOT NULL,
  content TEXT NOT NULL,
  user_id INTEGER NOT NULL REFERENCES users(id),
  legal_article_id INTEGER REFERENCES legal_articles(id),
  created_at TEXT NOT NULL,
  updated_at TEXT
);
CREATE TABLE IF NOT EXISTS comments (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  content TEXT NOT NULL,
  user_id INTEGER NOT NULL REFERENCES users(id),
  discussion_id INTEGER NOT NULL REFERENCES discussions(id),
  created_at TEXT NOT NULL,
  updated_at TEXT
);
CREATE TABLE IF NOT EXISTS user_profiles (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id INTEGER NOT NULL UNIQUE REFERENCES users(id),
  bio TEXT,
  avatar_url TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT
);
";

/// SQLite-backed store for accounts, sessions, conversations, and the forum
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create a database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Create an in-memory database (used by tests)
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub async fn create_user(&self, new: NewUser) -> Result<User> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO users (email, username, password_digest, salt, full_name)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new.email,
                new.username,
                new.password_digest,
                new.salt,
                new.full_name
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(User {
            id,
            email: new.email,
            username: new.username,
            password_digest: new.password_digest,
            salt: new.salt,
            full_name: new.full_name,
            is_active: true,
            is_admin: false,
        })
    }

    pub async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        Ok(conn
            .query_row(
                &format!("{USER_COLUMNS} WHERE username = ?1"),
                [username],
                row_to_user,
            )
            .optional()?)
    }

    pub async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        Ok(conn
            .query_row(
                &format!("{USER_COLUMNS} WHERE email = ?1"),
                [email],
                row_to_user,
            )
            .optional()?)
    }

    /// Admin flag bootstrap hook (no self-service path exists)
    pub async fn set_admin(&self, user_id: i64, is_admin: bool) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE users SET is_admin = ?1 WHERE id = ?2",
            params![is_admin, user_id],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub async fn create_session(
        &self,
        token: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![token, user_id, expires_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Resolve a bearer token into its account, honoring expiry
    pub async fn session_user(&self, token: &str, now: DateTime<Utc>) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        Ok(conn
            .query_row(
                "SELECT u.id, u.email, u.username, u.password_digest, u.salt,
                        u.full_name, u.is_active, u.is_admin
                 FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.token = ?1 AND s.expires_at > ?2",
                params![token, now.to_rfc3339()],
                row_to_user,
            )
            .optional()?)
    }

    /// Drop sessions past their expiry; returns how many were removed
    pub async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().await;
        Ok(conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            [now.to_rfc3339()],
        )?)
    }

    // ------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------

    /// Store a finished message sequence as a conversation. `turns` are
    /// `(role, content)` pairs in conversation order.
    pub async fn create_conversation(
        &self,
        user_id: i64,
        title: Option<String>,
        turns: &[(String, String)],
    ) -> Result<i64> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO conversations (user_id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![user_id, title, now],
        )?;
        let conversation_id = tx.last_insert_rowid();

        for (ord, (role, content)) in turns.iter().enumerate() {
            tx.execute(
                "INSERT INTO messages (conversation_id, ord, role, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![conversation_id, ord as i64, role, content, now],
            )?;
        }

        tx.commit()?;
        Ok(conversation_id)
    }

    /// All conversations of one account, newest first
    pub async fn conversations_for_user(&self, user_id: i64) -> Result<Vec<Conversation>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, title, created_at, updated_at FROM conversations
             WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map([user_id], row_to_conversation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// One conversation with its ordered messages; `None` when absent or
    /// owned by a different account
    pub async fn conversation(
        &self,
        user_id: i64,
        id: i64,
    ) -> Result<Option<(Conversation, Vec<StoredMessage>)>> {
        let conn = self.conn.lock().await;
        let conversation = conn
            .query_row(
                "SELECT id, title, created_at, updated_at FROM conversations
                 WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                row_to_conversation,
            )
            .optional()?;

        let Some(conversation) = conversation else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT id, role, content, ord, timestamp FROM messages
             WHERE conversation_id = ?1 ORDER BY ord",
        )?;
        let messages = stmt
            .query_map([id], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some((conversation, messages)))
    }

    /// Delete a conversation and its messages; `false` when absent or owned
    /// by a different account
    pub async fn delete_conversation(&self, user_id: i64, id: i64) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM messages WHERE conversation_id = ?1", [id])?;
        let deleted = tx.execute(
            "DELETE FROM conversations WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    // ------------------------------------------------------------------
    // Legal articles
    // ------------------------------------------------------------------

    pub async fn create_article(&self, new: NewArticle) -> Result<LegalArticle> {
        let conn = self.conn.lock().await;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO legal_articles (title, content, source, article_number, category, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.title,
                new.content,
                new.source,
                new.article_number,
                new.category,
                now.to_rfc3339()
            ],
        )?;
        Ok(LegalArticle {
            id: conn.last_insert_rowid(),
            title: new.title,
            content: new.content,
            source: new.source,
            article_number: new.article_number,
            category: new.category,
            created_at: now,
            updated_at: None,
        })
    }

    pub async fn articles(&self, filter: &ArticleFilter) -> Result<Vec<LegalArticle>> {
        let conn = self.conn.lock().await;
        let mut sql = String::from(
            "SELECT id, title, content, source, article_number, category, created_at, updated_at
             FROM legal_articles WHERE 1=1",
        );
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(category) = &filter.category {
            sql.push_str(" AND category = ?");
            args.push(Box::new(category.clone()));
        }
        if let Some(source) = &filter.source {
            sql.push_str(" AND source = ?");
            args.push(Box::new(source.clone()));
        }
        if let Some(keyword) = &filter.keyword {
            sql.push_str(" AND (title LIKE ? OR content LIKE ? OR article_number LIKE ?)");
            let pattern = format!("%{keyword}%");
            args.push(Box::new(pattern.clone()));
            args.push(Box::new(pattern.clone()));
            args.push(Box::new(pattern));
        }
        sql.push_str(" ORDER BY id LIMIT ? OFFSET ?");
        args.push(Box::new(filter.limit));
        args.push(Box::new(filter.skip));

        let params: Vec<&dyn ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(&params[..], row_to_article)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn article(&self, id: i64) -> Result<Option<LegalArticle>> {
        let conn = self.conn.lock().await;
        Ok(conn
            .query_row(
                "SELECT id, title, content, source, article_number, category, created_at, updated_at
                 FROM legal_articles WHERE id = ?1",
                [id],
                row_to_article,
            )
            .optional()?)
    }

    // ------------------------------------------------------------------
    // Discussions
    // ------------------------------------------------------------------

    pub async fn create_discussion(
        &self,
        user_id: i64,
        title: String,
        content: String,
        legal_article_id: Option<i64>,
    ) -> Result<Discussion> {
        let conn = self.conn.lock().await;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO discussions (title, content, user_id, legal_article_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![title, content, user_id, legal_article_id, now.to_rfc3339()],
        )?;
        Ok(Discussion {
            id: conn.last_insert_rowid(),
            title,
            content,
            user_id,
            legal_article_id,
            created_at: now,
            updated_at: None,
        })
    }

    pub async fn discussions(&self, filter: &DiscussionFilter) -> Result<Vec<DiscussionSummary>> {
        let conn = self.conn.lock().await;
        let mut sql = String::from(
            "SELECT d.id, d.title, d.content, d.user_id, d.legal_article_id,
                    d.created_at, d.updated_at, u.username,
                    (SELECT COUNT(*) FROM comments c WHERE c.discussion_id = d.id)
             FROM discussions d JOIN users u ON u.id = d.user_id WHERE 1=1",
        );
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(article_id) = filter.legal_article_id {
            sql.push_str(" AND d.legal_article_id = ?");
            args.push(Box::new(article_id));
        }
        if let Some(user_id) = filter.user_id {
            sql.push_str(" AND d.user_id = ?");
            args.push(Box::new(user_id));
        }
        if let Some(keyword) = &filter.keyword {
            sql.push_str(" AND (d.title LIKE ? OR d.content LIKE ?)");
            let pattern = format!("%{keyword}%");
            args.push(Box::new(pattern.clone()));
            args.push(Box::new(pattern));
        }
        sql.push_str(" ORDER BY d.created_at DESC, d.id DESC LIMIT ? OFFSET ?");
        args.push(Box::new(filter.limit));
        args.push(Box::new(filter.skip));

        let params: Vec<&dyn ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(&params[..], row_to_discussion_summary)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn discussion(&self, id: i64) -> Result<Option<DiscussionSummary>> {
        let conn = self.conn.lock().await;
        Ok(conn
            .query_row(
                "SELECT d.id, d.title, d.content, d.user_id, d.legal_article_id,
                        d.created_at, d.updated_at, u.username,
                        (SELECT COUNT(*) FROM comments c WHERE c.discussion_id = d.id)
                 FROM discussions d JOIN users u ON u.id = d.user_id WHERE d.id = ?1",
                [id],
                row_to_discussion_summary,
            )
            .optional()?)
    }

    // ------------------------------------------------------------------
    // Comments
    // ------------------------------------------------------------------

    /// Add a comment and bump the discussion's update time. `None` when the
    /// discussion does not exist.
    pub async fn create_comment(
        &self,
        user_id: i64,
        discussion_id: i64,
        content: String,
    ) -> Result<Option<Comment>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let now = Utc::now();

        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM discussions WHERE id = ?1",
                [discussion_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }

        tx.execute(
            "INSERT INTO comments (content, user_id, discussion_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![content, user_id, discussion_id, now.to_rfc3339()],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE discussions SET updated_at = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), discussion_id],
        )?;
        tx.commit()?;

        Ok(Some(Comment {
            id,
            content,
            user_id,
            discussion_id,
            created_at: now,
            updated_at: None,
        }))
    }

    /// Comments of a discussion, oldest first. `None` when the discussion
    /// does not exist.
    pub async fn comments(
        &self,
        discussion_id: i64,
        skip: i64,
        limit: i64,
    ) -> Result<Option<Vec<CommentView>>> {
        let conn = self.conn.lock().await;

        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM discussions WHERE id = ?1",
                [discussion_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }

        let mut stmt = conn.prepare(
            "SELECT c.id, c.content, c.user_id, c.discussion_id, c.created_at, c.updated_at,
                    u.username
             FROM comments c JOIN users u ON u.id = c.user_id
             WHERE c.discussion_id = ?1 ORDER BY c.created_at, c.id LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![discussion_id, limit, skip], |row| {
                Ok(CommentView {
                    comment: Comment {
                        id: row.get(0)?,
                        content: row.get(1)?,
                        user_id: row.get(2)?,
                        discussion_id: row.get(3)?,
                        created_at: ts(row, 4)?,
                        updated_at: opt_ts(row, 5)?,
                    },
                    username: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Some(rows))
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    /// Fetch a profile, creating an empty one on first access
    pub async fn profile_for_user(&self, user_id: i64) -> Result<UserProfile> {
        let conn = self.conn.lock().await;
        let existing = conn
            .query_row(
                "SELECT id, user_id, bio, avatar_url, created_at, updated_at
                 FROM user_profiles WHERE user_id = ?1",
                [user_id],
                row_to_profile,
            )
            .optional()?;

        if let Some(profile) = existing {
            return Ok(profile);
        }

        let now = Utc::now();
        conn.execute(
            "INSERT INTO user_profiles (user_id, created_at) VALUES (?1, ?2)",
            params![user_id, now.to_rfc3339()],
        )?;
        Ok(UserProfile {
            id: conn.last_insert_rowid(),
            user_id,
            bio: None,
            avatar_url: None,
            created_at: now,
            updated_at: None,
        })
    }

    /// Patch profile fields (and the account's full name); absent fields are
    /// left untouched
    pub async fn update_profile(
        &self,
        user_id: i64,
        full_name: Option<String>,
        bio: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<UserProfile> {
        // Ensure the row exists before patching
        let profile = self.profile_for_user(user_id).await?;

        let conn = self.conn.lock().await;
        let now = Utc::now();

        if let Some(full_name) = &full_name {
            conn.execute(
                "UPDATE users SET full_name = ?1 WHERE id = ?2",
                params![full_name, user_id],
            )?;
        }
        if let Some(bio) = &bio {
            conn.execute(
                "UPDATE user_profiles SET bio = ?1 WHERE user_id = ?2",
                params![bio, user_id],
            )?;
        }
        if let Some(avatar_url) = &avatar_url {
            conn.execute(
                "UPDATE user_profiles SET avatar_url = ?1 WHERE user_id = ?2",
                params![avatar_url, user_id],
            )?;
        }
        conn.execute(
            "UPDATE user_profiles SET updated_at = ?1 WHERE user_id = ?2",
            params![now.to_rfc3339(), user_id],
        )?;

        Ok(UserProfile {
            bio: bio.or(profile.bio),
            avatar_url: avatar_url.or(profile.avatar_url),
            updated_at: Some(now),
            ..profile
        })
    }

    /// Number of discussions and comments authored by one account
    pub async fn user_activity_counts(&self, user_id: i64) -> Result<(i64, i64)> {
        let conn = self.conn.lock().await;
        let discussions: i64 = conn.query_row(
            "SELECT COUNT(*) FROM discussions WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        let comments: i64 = conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        Ok((discussions, comments))
    }
}

const USER_COLUMNS: &str = "SELECT id, email, username, password_digest, salt, full_name, \
                            is_active, is_admin FROM users";

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        password_digest: row.get(3)?,
        salt: row.get(4)?,
        full_name: row.get(5)?,
        is_active: row.get(6)?,
        is_admin: row.get(7)?,
    })
}

fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: ts(row, 2)?,
        updated_at: ts(row, 3)?,
    })
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<StoredMessage> {
    Ok(StoredMessage {
        id: row.get(0)?,
        role: row.get(1)?,
        content: row.get(2)?,
        ord: row.get(3)?,
        timestamp: ts(row, 4)?,
    })
}

fn row_to_article(row: &Row<'_>) -> rusqlite::Result<LegalArticle> {
    Ok(LegalArticle {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        source: row.get(3)?,
        article_number: row.get(4)?,
        category: row.get(5)?,
        created_at: ts(row, 6)?,
        updated_at: opt_ts(row, 7)?,
    })
}

fn row_to_discussion_summary(row: &Row<'_>) -> rusqlite::Result<DiscussionSummary> {
    Ok(DiscussionSummary {
        discussion: Discussion {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            user_id: row.get(3)?,
            legal_article_id: row.get(4)?,
            created_at: ts(row, 5)?,
            updated_at: opt_ts(row, 6)?,
        },
        username: row.get(7)?,
        comments_count: row.get(8)?,
    })
}

fn row_to_profile(row: &Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        bio: row.get(2)?,
        avatar_url: row.get(3)?,
        created_at: ts(row, 4)?,
        updated_at: opt_ts(row, 5)?,
    })
}

fn ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    match text {
        None => Ok(None),
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            }),
    }
}
