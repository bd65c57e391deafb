//! Legal article, discussion, and comment handlers

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::CounselError;
use crate::storage::{
    ArticleFilter, CommentView, DiscussionFilter, DiscussionSummary, LegalArticle, NewArticle,
};

use super::{AppState, error_response};

// ----------------------------------------------------------------------
// Legal articles
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ArticleCreate {
    pub title: String,
    pub content: String,
    pub source: String,
    pub article_number: String,
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct ArticleListQuery {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_article_limit")]
    pub limit: i64,
}

fn default_article_limit() -> i64 {
    100
}

pub async fn create_article(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<ArticleCreate>,
) -> Result<Response, CounselError> {
    if !user.is_admin {
        return Ok(error_response(
            StatusCode::FORBIDDEN,
            "admin_only",
            "Only administrators can create legal articles",
        ));
    }

    let article = state
        .store
        .create_article(NewArticle {
            title: request.title,
            content: request.content,
            source: request.source,
            article_number: request.article_number,
            category: request.category,
        })
        .await?;

    Ok(Json(article).into_response())
}

pub async fn list_articles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ArticleListQuery>,
) -> Result<Json<Vec<LegalArticle>>, CounselError> {
    let filter = ArticleFilter {
        category: query.category,
        source: query.source,
        keyword: query.keyword,
        skip: query.skip,
        limit: query.limit,
    };
    Ok(Json(state.store.articles(&filter).await?))
}

pub async fn get_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, CounselError> {
    match state.store.article(id).await? {
        Some(article) => Ok(Json(article).into_response()),
        None => Ok(error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            "Legal article not found",
        )),
    }
}

// ----------------------------------------------------------------------
// Discussions
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DiscussionCreate {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub legal_article_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DiscussionListQuery {
    #[serde(default)]
    pub legal_article_id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_discussion_limit")]
    pub limit: i64,
}

fn default_discussion_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct DiscussionResponse {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub legal_article_id: Option<i64>,
    pub user_id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub comments_count: i64,
}

impl From<DiscussionSummary> for DiscussionResponse {
    fn from(summary: DiscussionSummary) -> Self {
        Self {
            id: summary.discussion.id,
            title: summary.discussion.title,
            content: summary.discussion.content,
            legal_article_id: summary.discussion.legal_article_id,
            user_id: summary.discussion.user_id,
            username: summary.username,
            created_at: summary.discussion.created_at,
            updated_at: summary.discussion.updated_at,
            comments_count: summary.comments_count,
        }
    }
}

pub async fn create_discussion(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<DiscussionCreate>,
) -> Result<Response, CounselError> {
    if let Some(article_id) = request.legal_article_id {
        if state.store.article(article_id).await?.is_none() {
            return Ok(error_response(
                StatusCode::NOT_FOUND,
                "not_found",
                "Referenced legal article not found",
            ));
        }
    }

    let discussion = state
        .store
        .create_discussion(
            user.id,
            request.title,
            request.content,
            request.legal_article_id,
        )
        .await?;

    Ok(Json(DiscussionResponse {
        id: discussion.id,
        title: discussion.title,
        content: discussion.content,
        legal_article_id: discussion.legal_article_id,
        user_id: user.id,
        username: user.username,
        created_at: discussion.created_at,
        updated_at: discussion.updated_at,
        comments_count: 0,
    })
    .into_response())
}

pub async fn list_discussions(
    State(state): State<Arc<AppState>>,
    AuthUser(_user): AuthUser,
    Query(query): Query<DiscussionListQuery>,
) -> Result<Json<Vec<DiscussionResponse>>, CounselError> {
    let filter = DiscussionFilter {
        legal_article_id: query.legal_article_id,
        user_id: query.user_id,
        keyword: query.keyword,
        skip: query.skip,
        limit: query.limit,
    };
    let summaries = state.store.discussions(&filter).await?;
    Ok(Json(summaries.into_iter().map(Into::into).collect()))
}

pub async fn get_discussion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, CounselError> {
    match state.store.discussion(id).await? {
        Some(summary) => Ok(Json(DiscussionResponse::from(summary)).into_response()),
        None => Ok(error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            "Discussion not found",
        )),
    }
}

// ----------------------------------------------------------------------
// Comments
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CommentCreate {
    pub content: String,
    pub discussion_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CommentListQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_comment_limit")]
    pub limit: i64,
}

fn default_comment_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: i64,
    pub content: String,
    pub discussion_id: i64,
    pub user_id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<CommentView> for CommentResponse {
    fn from(view: CommentView) -> Self {
        Self {
            id: view.comment.id,
            content: view.comment.content,
            discussion_id: view.comment.discussion_id,
            user_id: view.comment.user_id,
            username: view.username,
            created_at: view.comment.created_at,
            updated_at: view.comment.updated_at,
        }
    }
}

pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<CommentCreate>,
) -> Result<Response, CounselError> {
    match state
        .store
        .create_comment(user.id, request.discussion_id, request.content)
        .await?
    {
        Some(comment) => Ok(Json(CommentResponse {
            id: comment.id,
            content: comment.content,
            discussion_id: comment.discussion_id,
            user_id: user.id,
            username: user.username,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        })
        .into_response()),
        None => Ok(error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            "Discussion not found",
        )),
    }
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<CommentListQuery>,
) -> Result<Response, CounselError> {
    match state.store.comments(id, query.skip, query.limit).await? {
        Some(comments) => Ok(Json(
            comments
                .into_iter()
                .map(CommentResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response()),
        None => Ok(error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            "Discussion not found",
        )),
    }
}
