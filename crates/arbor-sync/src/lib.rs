#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

//! Replication and persistence core for the Arbor outliner.
//!
//! Thoughts and lexemes each live in their own CRDT document, persisted
//! through a local document store and synchronized through a relay. A
//! workspace-wide *doclog* document carries the unified append-only change
//! stream that tells other devices which entity documents to open or drop.
//!
//! The [`Engine`] ties it together: a registry of live documents per entity
//! kind, the codec between plain entity records and their CRDT shape, the
//! doclog, and a bounded task queue servicing remote changes.

mod codec;
mod doclog;
mod engine;
pub mod mutex;
mod prelude;
mod registry;
mod replicator;
pub mod task_queue;
mod update_set;

pub use doclog::{LEXEME_LOG, LogEntry, THOUGHT_LOG};
pub use engine::{Engine, EngineConfig, LexemeUpdates, ThoughtUpdates};

// vim: ts=4
