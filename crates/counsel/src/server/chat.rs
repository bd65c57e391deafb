//! AI consultation and conversation handlers
//!
//! `/ai/chat` drives the relay in buffered or streaming mode depending on the
//! request's `stream` flag. Relay failures are delivered as conversational
//! content, never as transport faults; finished exchanges are persisted for
//! the caller fire-and-forget.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthUser;
use crate::error::CounselError;
use crate::relay::{ChatTurn, GenerationConfig, RelayOutcome, Role, StreamEvent, UsageStats};
use crate::storage::{Conversation, StoredMessage};

use super::{AppState, error_response};

/// Longest auto-generated conversation title, in characters
const TITLE_MAX_CHARS: usize = 30;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
    #[serde(flatten)]
    pub config: GenerationConfig,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub usage: UsageStats,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<ChatRequest>,
) -> Response {
    let ChatRequest { messages, config } = request;

    if config.stream {
        stream_chat(state, user.id, messages, config)
    } else {
        buffered_chat(state, user.id, messages, config).await
    }
}

/// Buffered mode: one aggregated answer, failures folded into the same shape
async fn buffered_chat(
    state: Arc<AppState>,
    user_id: i64,
    messages: Vec<ChatTurn>,
    config: GenerationConfig,
) -> Response {
    match state.relay.complete(&messages, &config).await {
        RelayOutcome::Aggregated { text, usage } => {
            if !text.is_empty() {
                let state = state.clone();
                let history = messages.clone();
                let assistant = text.clone();
                tokio::spawn(async move {
                    persist_exchange(&state, user_id, &history, &assistant).await;
                });
            }
            Json(ChatResponse {
                response: text,
                usage,
            })
            .into_response()
        }
        RelayOutcome::Failure { kind, message } => {
            tracing::debug!(?kind, "Relay failure delivered as chat content");
            Json(ChatResponse {
                response: message,
                usage: UsageStats::default(),
            })
            .into_response()
        }
    }
}

/// Streaming mode: content deltas as SSE data events, terminated by a
/// `[DONE]` event. Failures arrive in-band as a final text fragment.
fn stream_chat(
    state: Arc<AppState>,
    user_id: i64,
    messages: Vec<ChatTurn>,
    config: GenerationConfig,
) -> Response {
    let relay_stream = state.relay.stream(messages.clone(), config);

    let sse_stream = async_stream::stream! {
        futures::pin_mut!(relay_stream);

        let mut assistant = String::new();
        let mut failed = false;

        while let Some(event) = relay_stream.next().await {
            match event {
                StreamEvent::Delta(delta) => {
                    assistant.push_str(&delta);
                    yield Ok::<Event, Infallible>(Event::default().data(delta));
                }
                StreamEvent::Failure { kind, message } => {
                    tracing::debug!(?kind, "Relay failure delivered in-band");
                    failed = true;
                    yield Ok(Event::default().data(message));
                }
                StreamEvent::Done => {
                    if !failed && !assistant.is_empty() {
                        persist_exchange(&state, user_id, &messages, &assistant).await;
                    }
                    yield Ok(Event::default().data("[DONE]"));
                    break;
                }
            }
        }
    };

    Sse::new(sse_stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}

/// Store a finished exchange as a conversation for the caller. Persistence is
/// fire-and-forget: failures are logged and never affect the response.
async fn persist_exchange(state: &AppState, user_id: i64, history: &[ChatTurn], assistant: &str) {
    let mut turns: Vec<(String, String)> = history
        .iter()
        .map(|turn| (turn.role.as_str().to_string(), turn.content.clone()))
        .collect();
    turns.push((Role::Assistant.as_str().to_string(), assistant.to_string()));

    let title = default_title(history);
    if let Err(e) = state
        .store
        .create_conversation(user_id, title, &turns)
        .await
    {
        tracing::warn!(error = %e, "Failed to persist finished exchange");
    }
}

/// Derive a conversation title from the first user turn
fn default_title(history: &[ChatTurn]) -> Option<String> {
    history
        .iter()
        .find(|turn| turn.role == Role::User)
        .map(|turn| turn.content.chars().take(TITLE_MAX_CHARS).collect())
}

// ----------------------------------------------------------------------
// Mock consultation
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MockChatRequest {
    pub messages: Vec<ChatTurn>,
}

/// Canned keyword-matched answers for testing without an upstream call
pub async fn mock_chat(
    AuthUser(_user): AuthUser,
    Json(request): Json<MockChatRequest>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "response": mock_response(&request.messages) }))
}

fn mock_response(messages: &[ChatTurn]) -> &'static str {
    let last = messages
        .last()
        .map(|turn| turn.content.to_lowercase())
        .unwrap_or_default();

    if last.contains("contract") {
        "On contract questions, keep the following in mind:\n\n\
         1. A contract is only valid if both parties have full capacity for civil conduct\n\
         2. Contract terms should be unambiguous\n\
         3. The content must not violate mandatory provisions of law\n\n\
         Consider consulting a lawyer before signing to make sure your interests are protected."
    } else if last.contains("tort") || last.contains("infringement") {
        "A tort claim requires four elements:\n\n\
         1. The actor committed a harmful act\n\
         2. The victim's lawful rights and interests were damaged\n\
         3. A causal link exists between the act and the damage\n\
         4. The actor was at fault\n\n\
         If you believe your rights were infringed, collect evidence and seek legal aid."
    } else if last.contains("labor") || last.contains("employment") || last.contains("work") {
        "Under the Labor Law of the People's Republic of China, workers enjoy:\n\n\
         1. Equal employment and free choice of occupation\n\
         2. Remuneration for their labor\n\
         3. Rest and statutory holidays\n\
         4. Occupational safety and health protection\n\
         5. Vocational skills training\n\
         6. Social insurance and welfare\n\
         7. The right to submit labor disputes for resolution\n\n\
         If your labor rights were violated, complain to the labor inspectorate or apply for arbitration."
    } else if last.contains("marriage") || last.contains("divorce") {
        "On marriage and family matters, the Civil Code of the People's Republic of China provides:\n\n\
         1. Marriage requires the full and free consent of both parties\n\
         2. Property acquired during the marriage is jointly owned by the spouses\n\
         3. Divorce proceeds either by agreement or through litigation\n\
         4. Child custody, property division, and debt allocation are the main issues to settle\n\n\
         Consult a lawyer about your specific situation."
    } else {
        "Hello, I am your legal AI assistant. I can answer questions about contracts, torts, \
         labor law, marriage and family, and more. Please describe your problem in detail and \
         I will do my best to give professional advice. Note that my answers are for reference \
         only; consult a practicing lawyer for complex matters."
    }
}

// ----------------------------------------------------------------------
// Conversations
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MessageIn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ConversationCreate {
    pub messages: Vec<MessageIn>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub id: i64,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<StoredMessage>,
}

impl ConversationResponse {
    fn from_parts(conversation: Conversation, messages: Vec<StoredMessage>) -> Self {
        Self {
            id: conversation.id,
            title: conversation.title,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            messages,
        }
    }
}

pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<ConversationCreate>,
) -> Result<Response, CounselError> {
    let turns: Vec<(String, String)> = request
        .messages
        .iter()
        .map(|m| (m.role.clone(), m.content.clone()))
        .collect();

    let title = request.title.or_else(|| {
        request
            .messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.content.chars().take(TITLE_MAX_CHARS).collect())
    });

    let id = state.store.create_conversation(user.id, title, &turns).await?;
    let Some((conversation, messages)) = state.store.conversation(user.id, id).await? else {
        return Ok(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Conversation vanished after insert",
        ));
    };

    Ok(Json(ConversationResponse::from_parts(conversation, messages)).into_response())
}

pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Conversation>>, CounselError> {
    Ok(Json(state.store.conversations_for_user(user.id).await?))
}

pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Response, CounselError> {
    match state.store.conversation(user.id, id).await? {
        Some((conversation, messages)) => {
            Ok(Json(ConversationResponse::from_parts(conversation, messages)).into_response())
        }
        None => Ok(error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            "Conversation not found",
        )),
    }
}

pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Response, CounselError> {
    if state.store.delete_conversation(user.id, id).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            "Conversation not found",
        ))
    }
}
