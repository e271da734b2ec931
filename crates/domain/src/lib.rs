//! Shared domain types for the agora debate engine.
//!
//! Everything here is plain data: no IO, no async runtime. The other crates
//! (`agora-providers`, `agora-sessions`, `agora-engine`) all depend on this
//! one and nothing else inside the workspace.

pub mod chat;
pub mod clock;
pub mod config;
pub mod debate;
pub mod error;
pub mod event;
pub mod intervention;
pub mod quality;
pub mod stream;
pub mod utterance;
