//! Shared types, adapter traits, and core utilities for the Arbor replication
//! core.
//!
//! This crate contains the foundational types shared between the sync engine
//! and all adapter implementations. Extracting these into a separate crate
//! allows adapter crates to compile in parallel with the engine.

pub mod doc_store_adapter;
pub mod docname;
pub mod error;
pub mod prelude;
pub mod push_adapter;
pub mod relay_adapter;
pub mod state_adapter;
pub mod types;

// vim: ts=4
