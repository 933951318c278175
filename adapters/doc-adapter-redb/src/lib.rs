//! Redb-based Document Store Adapter
//!
//! Implements the DocStoreAdapter trait using redb for persistent storage of
//! binary CRDT updates.
//!
//! # Storage Layout
//!
//! One redb file (`docs.db`) holds every logical database; documents are
//! separated by their names, which already carry the workspace:
//! - `updates` - Stores binary CRDT updates indexed by (doc_name, update_seq)
//! - `docs` - Tracks the next update sequence per document and doubles as
//!   the document listing
//!
//! Update keys are `<doc_name>\0<seq>` with a zero-padded sequence so a
//! range scan over one document yields its updates oldest first. The NUL
//! separator keeps a document name that is a prefix of another from leaking
//! into the wrong range.

use async_trait::async_trait;
use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

use arbor_types::doc_store_adapter::{DocStoreAdapter, DocUpdate};
use arbor_types::error::{ArResult, Error as ArError};

mod error;
pub use error::Error;

/// Stores binary CRDT updates: (doc_name, update_seq) -> update_bytes
const TABLE_UPDATES: TableDefinition<&str, &[u8]> = TableDefinition::new("updates");

/// Stores the next update sequence per document: doc_name -> next_seq
const TABLE_DOCS: TableDefinition<&str, u64> = TableDefinition::new("docs");

/// Document store adapter using redb for storage
pub struct DocAdapterRedb {
	/// Base storage directory
	storage_path: PathBuf,

	db: Arc<redb::Database>,
}

impl DocAdapterRedb {
	/// Create a new document store adapter with redb storage
	pub async fn new(storage_path: impl AsRef<Path>) -> ArResult<Self> {
		let storage_path = storage_path.as_ref().to_path_buf();

		std::fs::create_dir_all(&storage_path).map_err(|e| {
			ArError::from(Error::IoError(format!("Failed to create storage directory: {}", e)))
		})?;

		debug!("Initializing document store at {:?}", storage_path);

		let db = redb::Database::create(storage_path.join("docs.db")).map_err(|e| {
			ArError::from(Error::DbError(format!("Failed to open database: {}", e)))
		})?;

		// Create tables if they don't exist
		let tx = db.begin_write().map_err(|e| {
			ArError::from(Error::DbError(format!("Failed to begin write transaction: {}", e)))
		})?;
		let _ = tx.open_table(TABLE_UPDATES);
		let _ = tx.open_table(TABLE_DOCS);
		tx.commit().map_err(|e| {
			ArError::from(Error::DbError(format!("Failed to commit table creation: {}", e)))
		})?;

		Ok(Self { storage_path, db: Arc::new(db) })
	}

	/// Build a key for storing updates (doc_name + sequence number). The
	/// padded sequence keeps range scans in append order.
	fn make_update_key(doc_name: &str, seq: u64) -> String {
		format!("{}\0{:016}", doc_name, seq)
	}

	fn key_prefix(doc_name: &str) -> String {
		format!("{}\0", doc_name)
	}
}

#[async_trait]
impl DocStoreAdapter for DocAdapterRedb {
	async fn get_updates(&self, doc_name: &str) -> ArResult<Vec<DocUpdate>> {
		let tx = self.db.begin_read().map_err(|e| {
			ArError::from(Error::DbError(format!("Failed to begin read transaction: {}", e)))
		})?;

		let updates_table = tx.open_table(TABLE_UPDATES).map_err(|e| {
			ArError::from(Error::DbError(format!("Failed to open updates table: {}", e)))
		})?;

		let mut updates = Vec::new();
		let prefix = Self::key_prefix(doc_name);
		let range = updates_table
			.range(prefix.as_str()..)
			.map_err(|e| ArError::from(Error::DbError(format!("Failed to read updates: {}", e))))?;

		for item in range {
			let (key, value) = item.map_err(|e| {
				ArError::from(Error::DbError(format!("Failed to iterate updates: {}", e)))
			})?;

			if !key.value().starts_with(&prefix) {
				break;
			}
			updates.push(DocUpdate::new(value.value().to_vec()));
		}

		trace!("Got {} updates for doc {}", updates.len(), doc_name);
		Ok(updates)
	}

	async fn store_update(&self, doc_name: &str, update: DocUpdate) -> ArResult<()> {
		let tx = self.db.begin_write().map_err(|e| {
			ArError::from(Error::DbError(format!("Failed to begin write transaction: {}", e)))
		})?;

		let seq = {
			let mut updates_table = tx.open_table(TABLE_UPDATES).map_err(|e| {
				ArError::from(Error::DbError(format!("Failed to open updates table: {}", e)))
			})?;
			let mut docs_table = tx.open_table(TABLE_DOCS).map_err(|e| {
				ArError::from(Error::DbError(format!("Failed to open docs table: {}", e)))
			})?;

			let seq = docs_table
				.get(doc_name)
				.map_err(|e| {
					ArError::from(Error::DbError(format!("Failed to read doc sequence: {}", e)))
				})?
				.map(|value| value.value())
				.unwrap_or(0);

			let key = Self::make_update_key(doc_name, seq);
			updates_table.insert(key.as_str(), update.data.as_slice()).map_err(|e| {
				ArError::from(Error::DbError(format!("Failed to insert update: {}", e)))
			})?;
			docs_table.insert(doc_name, seq + 1).map_err(|e| {
				ArError::from(Error::DbError(format!("Failed to update doc sequence: {}", e)))
			})?;
			seq
		};

		tx.commit().map_err(|e| {
			ArError::from(Error::DbError(format!("Failed to commit update: {}", e)))
		})?;

		trace!("Stored update for doc {} (seq={})", doc_name, seq);
		Ok(())
	}

	async fn delete_doc(&self, doc_name: &str) -> ArResult<()> {
		let tx = self.db.begin_write().map_err(|e| {
			ArError::from(Error::DbError(format!("Failed to begin write transaction: {}", e)))
		})?;

		{
			let mut updates_table = tx.open_table(TABLE_UPDATES).map_err(|e| {
				ArError::from(Error::DbError(format!("Failed to open updates table: {}", e)))
			})?;
			let mut docs_table = tx.open_table(TABLE_DOCS).map_err(|e| {
				ArError::from(Error::DbError(format!("Failed to open docs table: {}", e)))
			})?;

			// Collect keys first to avoid borrow conflicts
			let prefix = Self::key_prefix(doc_name);
			let mut keys_to_delete = Vec::new();
			{
				let range = updates_table.range(prefix.as_str()..).map_err(|e| {
					ArError::from(Error::DbError(format!("Failed to read updates: {}", e)))
				})?;

				for item in range {
					let (key, _) = item.map_err(|e| {
						ArError::from(Error::DbError(format!("Failed to iterate updates: {}", e)))
					})?;

					if !key.value().starts_with(&prefix) {
						break;
					}
					keys_to_delete.push(key.value().to_string());
				}
			}

			for key in keys_to_delete {
				updates_table.remove(key.as_str()).map_err(|e| {
					ArError::from(Error::DbError(format!("Failed to delete update: {}", e)))
				})?;
			}

			docs_table.remove(doc_name).map_err(|e| {
				ArError::from(Error::DbError(format!("Failed to delete doc entry: {}", e)))
			})?;
		}

		tx.commit().map_err(|e| {
			ArError::from(Error::DbError(format!("Failed to commit deletion: {}", e)))
		})?;

		debug!("Deleted document {}", doc_name);
		Ok(())
	}

	async fn list_docs(&self) -> ArResult<Vec<Box<str>>> {
		let tx = self.db.begin_read().map_err(|e| {
			ArError::from(Error::DbError(format!("Failed to begin read transaction: {}", e)))
		})?;

		let docs_table = tx.open_table(TABLE_DOCS).map_err(|e| {
			ArError::from(Error::DbError(format!("Failed to open docs table: {}", e)))
		})?;

		let mut doc_names = Vec::new();
		let range = docs_table
			.iter()
			.map_err(|e| ArError::from(Error::DbError(format!("Failed to read docs: {}", e))))?;

		for item in range {
			let (key, _) = item.map_err(|e| {
				ArError::from(Error::DbError(format!("Failed to iterate docs: {}", e)))
			})?;
			doc_names.push(key.value().into());
		}

		Ok(doc_names)
	}
}

impl std::fmt::Debug for DocAdapterRedb {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DocAdapterRedb").field("storage_path", &self.storage_path).finish()
	}
}

// vim: ts=4
