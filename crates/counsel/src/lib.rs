//! Counsel - legal consultation backend
//!
//! Accounts, chat conversations, a legal-article forum, and a streaming AI
//! relay that proxies consultations to an upstream chat-completions provider.

pub mod auth;
pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod storage;

pub use error::CounselError;
