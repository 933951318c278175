//! In-process Relay Adapter
//!
//! Implements the RelayAdapter trait with a per-document broadcast channel,
//! standing in for the workspace websocket. Publishing appends to the
//! document's history and fans out to live subscribers; subscribing replays
//! the history first, then streams live updates.
//!
//! Engines sharing one instance of this adapter converge the same way they
//! would through a real relay, which is what the end-to-end tests rely on.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use arbor_types::doc_store_adapter::DocUpdate;
use arbor_types::prelude::*;
use arbor_types::relay_adapter::{RelayAdapter, RelayEvent, RelayStream};

const BROADCAST_CAPACITY: usize = 1024;

/// Per-document fan-out state.
#[derive(Debug)]
struct DocChannel {
	broadcaster: broadcast::Sender<RelayEvent>,
	history: std::sync::Mutex<Vec<RelayEvent>>,
}

/// Relay hub shared by every engine in the process.
#[derive(Debug, Default)]
pub struct RelayAdapterMem {
	docs: DashMap<Box<str>, Arc<DocChannel>>,
}

impl RelayAdapterMem {
	pub fn new() -> Self {
		Self::default()
	}

	fn channel(&self, doc_name: &str) -> Arc<DocChannel> {
		if let Some(channel) = self.docs.get(doc_name) {
			return Arc::clone(&channel);
		}
		let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
		let channel =
			Arc::new(DocChannel { broadcaster: tx, history: std::sync::Mutex::new(Vec::new()) });
		self.docs.insert(doc_name.into(), Arc::clone(&channel));
		channel
	}

	/// Number of updates published for a document so far.
	pub fn published_count(&self, doc_name: &str) -> usize {
		self.docs
			.get(doc_name)
			.map(|channel| match channel.history.lock() {
				Ok(history) => history.len(),
				Err(poisoned) => poisoned.into_inner().len(),
			})
			.unwrap_or(0)
	}
}

#[async_trait]
impl RelayAdapter for RelayAdapterMem {
	async fn publish(&self, doc_name: &str, update: DocUpdate) -> ArResult<()> {
		let channel = self.channel(doc_name);
		let event = RelayEvent { doc_name: doc_name.into(), update };
		match channel.history.lock() {
			Ok(mut history) => history.push(event.clone()),
			Err(poisoned) => poisoned.into_inner().push(event.clone()),
		}
		// No live subscribers is fine; they catch up from history.
		let _ = channel.broadcaster.send(event);
		trace!("Published update for {}", doc_name);
		Ok(())
	}

	async fn subscribe(&self, doc_name: &str) -> ArResult<RelayStream> {
		let channel = self.channel(doc_name);
		// Subscribe before snapshotting so no event falls between the two;
		// an event landing in both is harmless (updates apply idempotently).
		let mut rx = channel.broadcaster.subscribe();
		let snapshot: Vec<RelayEvent> = match channel.history.lock() {
			Ok(history) => history.clone(),
			Err(poisoned) => poisoned.into_inner().clone(),
		};
		let doc_name: Box<str> = doc_name.into();
		let stream = async_stream::stream! {
			for event in snapshot {
				yield event;
			}
			loop {
				match rx.recv().await {
					Ok(event) => yield event,
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						warn!("Relay subscriber for {} lagged by {} events", doc_name, skipped);
					}
					Err(broadcast::error::RecvError::Closed) => break,
				}
			}
		};
		Ok(Box::pin(stream))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::StreamExt;

	#[tokio::test]
	async fn test_subscribe_replays_history_then_streams_live() {
		let relay = RelayAdapterMem::new();
		relay.publish("ws/doclog", DocUpdate::new(vec![1])).await.unwrap();

		let mut stream = relay.subscribe("ws/doclog").await.unwrap();
		let replayed = stream.next().await.unwrap();
		assert_eq!(replayed.update.data, vec![1]);

		relay.publish("ws/doclog", DocUpdate::new(vec![2])).await.unwrap();
		let live = stream.next().await.unwrap();
		assert_eq!(live.update.data, vec![2]);
	}

	#[tokio::test]
	async fn test_documents_are_isolated() {
		let relay = RelayAdapterMem::new();
		relay.publish("ws/thought/a", DocUpdate::new(vec![1])).await.unwrap();

		let mut stream = relay.subscribe("ws/thought/b").await.unwrap();
		relay.publish("ws/thought/b", DocUpdate::new(vec![2])).await.unwrap();
		let event = stream.next().await.unwrap();
		assert_eq!(&*event.doc_name, "ws/thought/b");
		assert_eq!(event.update.data, vec![2]);
	}

	#[tokio::test]
	async fn test_published_count() {
		let relay = RelayAdapterMem::new();
		assert_eq!(relay.published_count("ws/doclog"), 0);
		relay.publish("ws/doclog", DocUpdate::new(vec![1])).await.unwrap();
		relay.publish("ws/doclog", DocUpdate::new(vec![2])).await.unwrap();
		assert_eq!(relay.published_count("ws/doclog"), 2);
	}
}

// vim: ts=4
