//! Persisted entities and query filters

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A registered account
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub password_digest: String,
    pub salt: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_admin: bool,
}

/// Fields required to insert a new account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_digest: String,
    pub salt: String,
    pub full_name: Option<String>,
}

/// A stored chat conversation (messages fetched separately)
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: i64,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One persisted message of a conversation
#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: i64,
    pub role: String,
    pub content: String,
    #[serde(rename = "order")]
    pub ord: i64,
    pub timestamp: DateTime<Utc>,
}

/// A statutory provision entry
#[derive(Debug, Clone, Serialize)]
pub struct LegalArticle {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub source: String,
    pub article_number: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fields required to insert a legal article
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    pub source: String,
    pub article_number: String,
    pub category: String,
}

/// A forum discussion
#[derive(Debug, Clone)]
pub struct Discussion {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub user_id: i64,
    pub legal_article_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A discussion joined with its author name and comment count
#[derive(Debug, Clone)]
pub struct DiscussionSummary {
    pub discussion: Discussion,
    pub username: String,
    pub comments_count: i64,
}

/// A comment on a discussion
#[derive(Debug, Clone)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub user_id: i64,
    pub discussion_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A comment joined with its author name
#[derive(Debug, Clone)]
pub struct CommentView {
    pub comment: Comment,
    pub username: String,
}

/// Extended profile attached to an account, created on first access
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: i64,
    pub user_id: i64,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Filters and pagination for the article listing
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub category: Option<String>,
    pub source: Option<String>,
    pub keyword: Option<String>,
    pub skip: i64,
    pub limit: i64,
}

/// Filters and pagination for the discussion listing
#[derive(Debug, Clone, Default)]
pub struct DiscussionFilter {
    pub legal_article_id: Option<i64>,
    pub user_id: Option<i64>,
    pub keyword: Option<String>,
    pub skip: i64,
    pub limit: i64,
}
