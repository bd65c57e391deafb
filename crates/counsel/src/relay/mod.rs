//! The AI relay: request composition, upstream transport, frame decoding
//!
//! One cohesive core with three responsibilities: the composer builds the
//! upstream payload (fixed legal directive + caller turns + generation
//! parameters), the client drives the upstream call and classifies every
//! outcome, and the decoder turns the streamed byte feed into discrete
//! content deltas.

mod client;
mod composer;
mod decoder;
mod types;

pub use client::{MOCK_ASSISTANT_NOTICE, RelayClient};
pub use composer::{LEGAL_SYSTEM_DIRECTIVE, UpstreamRequest, compose_request};
pub use decoder::{FrameDecoder, FrameEvent};
pub use types::{
    ChatTurn, FailureKind, GenerationConfig, RelayOutcome, Role, StreamEvent, UsageStats,
};
