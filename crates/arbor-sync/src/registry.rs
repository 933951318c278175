//! Live CRDT document registry and provider glue.
//!
//! One handle per open document: the yrs doc, its root map, the local
//! persistence binding, and the relay transport binding. Exactly one live
//! handle exists per id at any instant; teardown detaches the change
//! observer before the handle (and with it the document) goes away.

use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use yrs::updates::decoder::Decode;
use yrs::{Doc, MapRef, Origin, Subscription, Transact, Update};

use crate::prelude::*;
use arbor_types::doc_store_adapter::{DocStoreAdapter, DocUpdate};
use arbor_types::relay_adapter::RelayAdapter;

/// Origin tag for updates applied from the local document store.
pub(crate) const STORE_ORIGIN: &str = "store";
/// Origin tag for updates applied from the relay.
pub(crate) const RELAY_ORIGIN: &str = "relay";

/// A live CRDT document with its providers.
pub(crate) struct DocHandle {
	pub doc: Doc,
	pub root: MapRef,
	pub doc_name: Box<str>,
	/// Origin used for local transactions: the document's own client id.
	pub origin: Origin,
	pub client_id: Box<str>,
	pub persistence: Option<Arc<LocalPersistence>>,
	transport: std::sync::Mutex<Option<RemoteTransport>>,
	observer: std::sync::Mutex<Option<Subscription>>,
}

impl DocHandle {
	pub fn set_observer(&self, subscription: Subscription) {
		*guard(&self.observer) = Some(subscription);
	}

	/// Detach the observer and stop the transport. After this the document
	/// can no longer reach back into the engine.
	fn detach(&self) {
		guard(&self.observer).take();
		guard(&self.transport).take();
	}
}

/// Create a document bound to its providers. In a test-mode configuration
/// both providers may be omitted.
pub(crate) fn open_doc(
	doc_name: &str,
	root_name: &str,
	store: Option<&Arc<dyn DocStoreAdapter>>,
	relay: Option<&Arc<dyn RelayAdapter>>,
) -> Arc<DocHandle> {
	let doc = Doc::with_options(yrs::Options { guid: doc_name.into(), ..yrs::Options::default() });
	let root = doc.get_or_insert_map(root_name);
	let client_id: Box<str> = doc.client_id().to_string().into();
	let origin: Origin = client_id.as_ref().into();

	let persistence = store.map(|store| LocalPersistence::open(&doc, doc_name, Arc::clone(store)));
	let transport = relay.map(|relay| {
		RemoteTransport::connect(&doc, doc_name, &client_id, Arc::clone(relay), persistence.clone())
	});

	Arc::new(DocHandle {
		doc,
		root,
		doc_name: doc_name.into(),
		origin,
		client_id,
		persistence,
		transport: std::sync::Mutex::new(transport),
		observer: std::sync::Mutex::new(None),
	})
}

/// In-memory table of live documents for one entity kind.
pub(crate) struct DocRegistry {
	docs: std::sync::Mutex<HashMap<Box<str>, Arc<DocHandle>>>,
}

impl DocRegistry {
	pub fn new() -> Self {
		Self { docs: std::sync::Mutex::new(HashMap::new()) }
	}

	pub fn get(&self, id: &str) -> Option<Arc<DocHandle>> {
		guard(&self.docs).get(id).cloned()
	}

	/// Return the handle registered under `id`, creating it under the
	/// registry lock so at most one live document exists per id. The second
	/// element is `true` when the handle was just created.
	pub fn ensure(
		&self,
		id: &str,
		create: impl FnOnce() -> Arc<DocHandle>,
	) -> (Arc<DocHandle>, bool) {
		let mut docs = guard(&self.docs);
		if let Some(handle) = docs.get(id) {
			return (Arc::clone(handle), false);
		}
		let handle = create();
		docs.insert(id.into(), Arc::clone(&handle));
		(handle, true)
	}

	/// Remove and detach the handle. Does not delete the backing local
	/// database; the caller does that separately by name.
	pub fn remove(&self, id: &str) -> Option<Arc<DocHandle>> {
		let handle = guard(&self.docs).remove(id)?;
		handle.detach();
		Some(handle)
	}

	pub fn ids(&self) -> Vec<Box<str>> {
		guard(&self.docs).keys().cloned().collect()
	}

	pub fn contains(&self, id: &str) -> bool {
		guard(&self.docs).contains_key(id)
	}

	pub fn len(&self) -> usize {
		guard(&self.docs).len()
	}
}

fn guard<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
	match mutex.lock() {
		Ok(guard) => guard,
		Err(poisoned) => {
			error!("Mutex poisoned: registry (recovering)");
			poisoned.into_inner()
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
enum SyncState {
	Loading,
	Synced,
	Failed(String),
}

/// Binds a document to the local store: applies stored updates on open,
/// resolves `when_synced` after the first load, and write-through persists
/// committed transactions.
pub(crate) struct LocalPersistence {
	doc_name: Box<str>,
	store: Arc<dyn DocStoreAdapter>,
	synced: watch::Receiver<SyncState>,
}

impl LocalPersistence {
	pub fn open(doc: &Doc, doc_name: &str, store: Arc<dyn DocStoreAdapter>) -> Arc<Self> {
		let (tx, rx) = watch::channel(SyncState::Loading);
		let this = Arc::new(Self { doc_name: doc_name.into(), store, synced: rx });

		let doc = doc.clone();
		let loader = Arc::clone(&this);
		tokio::spawn(async move {
			let state = match loader.load(&doc).await {
				Ok(count) => {
					trace!("Synced {} stored updates into {}", count, loader.doc_name);
					SyncState::Synced
				}
				Err(err) => {
					error!("Failed to load document {}: {}", loader.doc_name, err);
					SyncState::Failed(err.to_string())
				}
			};
			let _ = tx.send(state);
		});
		this
	}

	async fn load(&self, doc: &Doc) -> ArResult<usize> {
		let updates = self.store.get_updates(&self.doc_name).await?;
		let count = updates.len();
		let mut txn = doc.transact_mut_with(STORE_ORIGIN);
		for stored in updates {
			match Update::decode_v1(&stored.data) {
				Ok(update) => {
					if let Err(err) = txn.apply_update(update) {
						warn!("Skipping malformed stored update for {}: {}", self.doc_name, err);
					}
				}
				Err(err) => {
					warn!("Skipping undecodable stored update for {}: {}", self.doc_name, err);
				}
			}
		}
		Ok(count)
	}

	/// Resolves once the first load from the store has finished.
	pub async fn when_synced(&self) -> ArResult<()> {
		let mut synced = self.synced.clone();
		let state = synced
			.wait_for(|state| *state != SyncState::Loading)
			.await
			.map(|state| state.clone())
			.map_err(|_| Error::Internal("persistence loader dropped".into()))?;
		match state {
			SyncState::Failed(message) => Err(Error::DbError(message)),
			_ => Ok(()),
		}
	}

	/// Write-through one committed update.
	pub async fn write(&self, update: DocUpdate) -> ArResult<()> {
		self.store.store_update(&self.doc_name, update).await
	}
}

/// Binds a document to the relay: subscribes, applies updates from other
/// clients, and persists them locally. The subscription task aborts when the
/// transport is dropped.
pub(crate) struct RemoteTransport {
	task: tokio::task::JoinHandle<()>,
}

impl RemoteTransport {
	pub fn connect(
		doc: &Doc,
		doc_name: &str,
		client_id: &str,
		relay: Arc<dyn RelayAdapter>,
		persistence: Option<Arc<LocalPersistence>>,
	) -> Self {
		let doc = doc.clone();
		let doc_name: Box<str> = doc_name.into();
		let client_id: Box<str> = client_id.into();
		let task = tokio::spawn(async move {
			let mut stream = match relay.subscribe(&doc_name).await {
				Ok(stream) => stream,
				Err(err) => {
					// Recoverable: convergence catches up on the next connect.
					warn!("Relay subscription failed for {}: {}", doc_name, err);
					return;
				}
			};
			while let Some(event) = stream.next().await {
				if event.update.client_id.as_deref() == Some(client_id.as_ref()) {
					continue; // our own update echoed back
				}
				match Update::decode_v1(&event.update.data) {
					Ok(update) => {
						let mut txn = doc.transact_mut_with(RELAY_ORIGIN);
						if let Err(err) = txn.apply_update(update) {
							warn!("Failed to apply relay update for {}: {}", doc_name, err);
						}
					}
					Err(err) => {
						warn!("Undecodable relay update for {}: {}", doc_name, err);
						continue;
					}
				}
				if let Some(persistence) = &persistence {
					if let Err(err) = persistence.write(event.update.clone()).await {
						warn!("Failed to persist relay update for {}: {}", doc_name, err);
					}
				}
			}
			debug!("Relay stream ended for {}", doc_name);
		});
		Self { task }
	}
}

impl Drop for RemoteTransport {
	fn drop(&mut self) {
		self.task.abort();
	}
}

// vim: ts=4
