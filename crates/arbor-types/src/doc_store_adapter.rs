//! Document store adapter interface.
//!
//! The local document store persists binary CRDT updates keyed by document
//! name. The engine builds sync-on-open semantics on top of `get_updates`:
//! a document is considered synced once every stored update has been applied
//! to it. Every committed transaction is written through as one more update.

use async_trait::async_trait;

use crate::prelude::*;

/// A binary CRDT update, optionally tagged with the client that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocUpdate {
	pub data: Vec<u8>,
	pub client_id: Option<Box<str>>,
}

impl DocUpdate {
	pub fn new(data: Vec<u8>) -> Self {
		Self { data, client_id: None }
	}

	pub fn with_client(data: Vec<u8>, client_id: impl Into<Box<str>>) -> Self {
		Self { data, client_id: Some(client_id.into()) }
	}
}

/// Local persistence for CRDT documents, one logical database per document
/// name. Deleting a document by name must succeed even if the document was
/// never opened in this process.
#[async_trait]
pub trait DocStoreAdapter: Send + Sync {
	/// All stored updates for a document, oldest first. Unknown names yield
	/// an empty list.
	async fn get_updates(&self, doc_name: &str) -> ArResult<Vec<DocUpdate>>;

	/// Append one update to a document's log.
	async fn store_update(&self, doc_name: &str, update: DocUpdate) -> ArResult<()>;

	/// Drop the backing database for a document name.
	async fn delete_doc(&self, doc_name: &str) -> ArResult<()>;

	/// Names of all documents with stored updates.
	async fn list_docs(&self) -> ArResult<Vec<Box<str>>>;
}

// vim: ts=4
