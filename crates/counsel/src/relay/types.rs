//! Core data types for one relay invocation
//!
//! All of these are request-scoped: built at request entry, dropped when the
//! upstream exchange finishes. Nothing here outlives the relay call.

use serde::{Deserialize, Serialize};

/// Role of a single conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One immutable turn of a conversation, replayed verbatim upstream
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
}

impl Role {
    /// Wire/storage name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Per-request generation parameters, carried straight through upstream.
///
/// Semantic validation (temperature bounds and the like) is left to the
/// upstream provider's own error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub stream: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            stream: false,
        }
    }
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

/// Token accounting passed through from upstream when present
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// How a relay invocation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No upstream credential configured - degrades to the mock response
    ConfigurationMissing,
    /// Upstream returned a non-2xx status
    UpstreamError,
    /// The exchange exceeded the wall-clock ceiling
    Timeout,
    /// Connection could not be established or was reset
    NetworkError,
    /// Anything else - never allowed to escape as an unhandled fault
    Unknown,
}

/// Result of one buffered (non-streaming) relay invocation.
///
/// Failures carry a human-readable message that is delivered to the caller
/// through the same channel as a successful answer; the relay never raises a
/// transport fault past its own boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    Aggregated { text: String, usage: UsageStats },
    Failure { kind: FailureKind, message: String },
}

/// One item of a streaming relay invocation, in upstream arrival order.
///
/// Failures arrive in-band as a terminal event; the stream always ends with
/// [`StreamEvent::Done`].
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Delta(String),
    Failure { kind: FailureKind, message: String },
    Done,
}
