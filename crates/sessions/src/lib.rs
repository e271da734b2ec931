//! Store gateway: persistence for debates, utterances, interventions, and
//! diagnostic system events.
//!
//! The engine writes through the [`Store`] trait only. Two implementations
//! ship here: [`MemoryStore`] for tests and embedded use, and [`JsonlStore`]
//! for durable append-only files.

mod jsonl;
mod store;

pub use jsonl::JsonlStore;
pub use store::{DebateRecord, DebateStatus, MemoryStore, Store};
