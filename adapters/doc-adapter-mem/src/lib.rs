//! In-memory Document Store Adapter
//!
//! Implements the DocStoreAdapter trait with a process-local map of update
//! logs. Nothing survives the process; intended for tests and ephemeral
//! sessions.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use arbor_types::doc_store_adapter::{DocStoreAdapter, DocUpdate};
use arbor_types::prelude::*;

/// Document store keeping all updates in memory.
#[derive(Debug, Default)]
pub struct DocAdapterMem {
	docs: DashMap<Box<str>, Vec<DocUpdate>>,
}

impl DocAdapterMem {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of stored updates for a document (0 for unknown names).
	pub fn update_count(&self, doc_name: &str) -> usize {
		self.docs.get(doc_name).map(|updates| updates.len()).unwrap_or(0)
	}

	/// Whether any updates are stored under this name.
	pub fn contains_doc(&self, doc_name: &str) -> bool {
		self.docs.contains_key(doc_name)
	}
}

#[async_trait]
impl DocStoreAdapter for DocAdapterMem {
	async fn get_updates(&self, doc_name: &str) -> ArResult<Vec<DocUpdate>> {
		Ok(self.docs.get(doc_name).map(|updates| updates.clone()).unwrap_or_default())
	}

	async fn store_update(&self, doc_name: &str, update: DocUpdate) -> ArResult<()> {
		trace!("Storing update for {} ({} bytes)", doc_name, update.data.len());
		self.docs.entry(doc_name.into()).or_default().push(update);
		Ok(())
	}

	async fn delete_doc(&self, doc_name: &str) -> ArResult<()> {
		self.docs.remove(doc_name);
		Ok(())
	}

	async fn list_docs(&self) -> ArResult<Vec<Box<str>>> {
		Ok(self.docs.iter().map(|entry| entry.key().clone()).collect())
	}
}


// vim: ts=4
