//! Chat orchestration for the legal assistant.
//!
//! This module composes session storage, the retry engine and the streaming
//! service into a conversation. It supports:
//!
//! - Streaming answers written in place into a placeholder message
//! - Rate-limit retries and user-facing error categories
//! - Feedback with pending-state retries, sharing and recovery
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: the per-turn state machine and backend interaction
//! - [`store`]: the ordered message buffer
//! - [`classify`]: error categories and their Polish copy
//! - [`notice`]: notifications for the user
//! - [`commands`]: slash command parsing
//! - [`render`]: terminal observer

pub mod classify;
pub mod commands;
pub mod config;
pub mod notice;
pub mod render;
pub mod session;
pub mod store;

pub use classify::{ErrorCategory, FALLBACK_RESPONSE};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
pub use notice::{Notice, NoticeLevel};
pub use render::TerminalObserver;
pub use session::{ChatObserver, ChatSession, TurnOutcome, TurnState};
pub use store::MessageStore;
