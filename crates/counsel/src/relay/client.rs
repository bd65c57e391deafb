//! Transport driver for the upstream AI provider
//!
//! Issues the upstream call (buffered or streaming) and classifies every
//! outcome into a [`RelayOutcome`] or an in-band [`StreamEvent`]. The driver
//! never lets a transport fault escape uncaught: callers always receive a
//! well-formed textual result, because a legal-advice chat surface degrading
//! to an error message beats a broken connection.

use std::time::Duration;

use futures::{Stream, StreamExt};
use serde_json::Value;
use url::Url;

use crate::config::RelayConfig;
use crate::error::{CounselError, Result};

use super::composer::compose_request;
use super::decoder::{FrameDecoder, FrameEvent};
use super::types::{ChatTurn, FailureKind, GenerationConfig, RelayOutcome, StreamEvent, UsageStats};

/// Placeholder answer returned when no upstream credential is configured.
/// Guards local development without a provisioned key; not an error.
pub const MOCK_ASSISTANT_NOTICE: &str = "I am a mock AI assistant. No upstream \
API key is configured, so I cannot provide a real AI answer. Please ask the \
administrator to configure the API credential.";

/// Client for one upstream chat-completions endpoint.
///
/// The credential and endpoint are resolved once at construction and
/// read-only afterwards; each relay invocation drives exactly one upstream
/// call. Cloning is cheap (the underlying connection pool is shared).
#[derive(Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    api_url: Url,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl RelayClient {
    /// Build a client from the relay configuration. The whole exchange,
    /// including time to first byte of a streamed body, is bounded by the
    /// configured ceiling.
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let api_url = Url::parse(&config.api_url).map_err(|e| {
            CounselError::Config(format!("Invalid upstream URL '{}': {e}", config.api_url))
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CounselError::Relay(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_url,
            api_key: config.resolve_api_key(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Whether an upstream credential is configured
    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// Buffered (non-streaming) relay invocation.
    ///
    /// Every failure mode is folded into [`RelayOutcome::Failure`]; the
    /// caller decides how to render it, but nothing is raised.
    pub async fn complete(
        &self,
        history: &[ChatTurn],
        config: &GenerationConfig,
    ) -> RelayOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            return RelayOutcome::Aggregated {
                text: MOCK_ASSISTANT_NOTICE.to_string(),
                usage: UsageStats::default(),
            };
        };

        let request = compose_request(
            history,
            &GenerationConfig {
                stream: false,
                ..config.clone()
            },
        );

        let response = match self
            .http
            .post(self.api_url.clone())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let (kind, message) = classify_transport_error(&e, self.timeout_secs);
                tracing::warn!(error = %e, "Upstream request failed");
                return RelayOutcome::Failure { kind, message };
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "Upstream returned an error response");
            return RelayOutcome::Failure {
                kind: FailureKind::UpstreamError,
                message: upstream_error_message(&body),
            };
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                return RelayOutcome::Failure {
                    kind: FailureKind::Unknown,
                    message: format!("An error occurred: {e}"),
                };
            }
        };

        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let usage = body
            .get("usage")
            .and_then(|u| serde_json::from_value::<UsageStats>(u.clone()).ok())
            .unwrap_or_default();

        RelayOutcome::Aggregated { text, usage }
    }

    /// Streaming relay invocation.
    ///
    /// Yields content deltas strictly in upstream arrival order, terminated
    /// by [`StreamEvent::Done`]. Failures arrive in-band as a terminal
    /// [`StreamEvent::Failure`] rather than aborting the stream. Dropping the
    /// returned stream tears down the upstream connection.
    pub fn stream(
        &self,
        history: Vec<ChatTurn>,
        config: GenerationConfig,
    ) -> impl Stream<Item = StreamEvent> + Send + 'static {
        let client = self.clone();

        async_stream::stream! {
            let Some(api_key) = client.api_key.clone() else {
                yield StreamEvent::Delta(MOCK_ASSISTANT_NOTICE.to_string());
                yield StreamEvent::Done;
                return;
            };

            let request = compose_request(
                &history,
                &GenerationConfig { stream: true, ..config },
            );

            let response = match client
                .http
                .post(client.api_url.clone())
                .bearer_auth(&api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    let (kind, message) = classify_transport_error(&e, client.timeout_secs);
                    tracing::warn!(error = %e, "Upstream stream request failed");
                    yield StreamEvent::Failure { kind, message };
                    yield StreamEvent::Done;
                    return;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(%status, "Upstream returned an error response");
                yield StreamEvent::Failure {
                    kind: FailureKind::UpstreamError,
                    message: upstream_error_message(&body),
                };
                yield StreamEvent::Done;
                return;
            }

            let mut decoder = FrameDecoder::new();
            let mut pending = String::new();
            let mut frames = response.bytes_stream();

            while let Some(chunk) = frames.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let (kind, message) =
                            classify_transport_error(&e, client.timeout_secs);
                        tracing::warn!(error = %e, "Upstream stream interrupted");
                        yield StreamEvent::Failure { kind, message };
                        yield StreamEvent::Done;
                        return;
                    }
                };

                pending.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(newline) = pending.find('\n') {
                    let line: String = pending.drain(..=newline).collect();
                    match decoder.decode_line(line.trim_end_matches(['\r', '\n'])) {
                        FrameEvent::Delta(delta) => yield StreamEvent::Delta(delta),
                        FrameEvent::Done => {
                            if decoder.skipped() > 0 {
                                tracing::debug!(
                                    skipped = decoder.skipped(),
                                    "Stream finished with malformed frames discarded"
                                );
                            }
                            yield StreamEvent::Done;
                            return;
                        }
                        FrameEvent::Skip => {}
                    }
                }
            }

            // Upstream closed without the sentinel; end the caller's stream
            // cleanly anyway.
            yield StreamEvent::Done;
        }
    }
}

/// Classify a transport-level failure into a failure kind plus the
/// human-readable message delivered to the caller.
fn classify_transport_error(e: &reqwest::Error, timeout_secs: u64) -> (FailureKind, String) {
    if e.is_timeout() {
        (
            FailureKind::Timeout,
            format!("The AI service did not answer within {timeout_secs} seconds. Please try again."),
        )
    } else if e.is_connect() {
        (
            FailureKind::NetworkError,
            format!("Could not reach the AI service: {e}"),
        )
    } else {
        (FailureKind::Unknown, format!("An error occurred: {e}"))
    }
}

/// Best-effort extraction of the upstream error message: the provider's
/// `error.message` field when parseable, else the raw body, else a generic
/// fallback. Never a hard schema dependency.
fn upstream_error_message(body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| "Unknown error".to_string());

    format!("API request error: {detail}")
}
