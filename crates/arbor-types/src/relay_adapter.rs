//! Relay transport adapter interface.
//!
//! The relay bidirectionally synchronizes a named document across devices
//! over a shared workspace connection. Implementations are constructed with
//! the workspace socket address and access token; the engine only addresses
//! documents by name. Subscribers receive the known update history first,
//! then live updates, and are expected to skip events carrying their own
//! client id.

use async_trait::async_trait;
use futures_core::Stream;
use std::pin::Pin;

use crate::doc_store_adapter::DocUpdate;
use crate::prelude::*;

/// An update that arrived for a subscribed document.
#[derive(Debug, Clone)]
pub struct RelayEvent {
	pub doc_name: Box<str>,
	pub update: DocUpdate,
}

pub type RelayStream = Pin<Box<dyn Stream<Item = RelayEvent> + Send>>;

#[async_trait]
pub trait RelayAdapter: Send + Sync {
	/// Send a local update to the relay.
	async fn publish(&self, doc_name: &str, update: DocUpdate) -> ArResult<()>;

	/// Subscribe to a document. Replays stored history, then streams live
	/// updates until the stream is dropped.
	async fn subscribe(&self, doc_name: &str) -> ArResult<RelayStream>;
}

// vim: ts=4
