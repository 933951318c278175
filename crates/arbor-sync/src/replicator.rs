//! Replication operations.
//!
//! Opens entity documents on first need, folds local mutations into them,
//! feeds the doclog, and reacts to remote doclog insertions by enqueuing
//! replication work on the task queue.
//!
//! Entity observers run synchronously inside transaction commit. They filter
//! self-origin events, check the registration invariant, project through the
//! commit's own read view, and defer the actual dispatch to a spawned task so
//! it cannot reenter a running reducer.

use std::sync::Arc;
use yrs::types::map::MapEvent;
use yrs::{Observable, Origin, ReadTxn, Transact, TransactionMut};

use crate::codec;
use crate::doclog::{DocLog, LogEntry, dedupe_newest_first};
use crate::engine::{EngineInner, LexemeUpdates, ThoughtUpdates};
use crate::prelude::*;
use crate::registry::{DocHandle, open_doc};
use crate::task_queue::Task;
use arbor_types::doc_store_adapter::DocUpdate;
use arbor_types::docname::{doclog_doc_name, lexeme_doc_name, parse_doc_name, thought_doc_name};
use arbor_types::state_adapter::IndexUpdates;

impl EngineInner {
	// ==================== Entity documents ====================

	fn ensure_thought(self: &Arc<Self>, id: &ThoughtId) -> Arc<DocHandle> {
		let doc_name = thought_doc_name(&self.workspace, id);
		let (handle, created) = self.thoughts.ensure(id.as_str(), || {
			debug!("Opening thought document {}", doc_name);
			open_doc(&doc_name, codec::THOUGHT_ROOT, self.store.as_ref(), self.relay.as_ref())
		});
		if created {
			let weak = Arc::downgrade(self);
			let id = id.clone();
			let doc_name: Box<str> = handle.doc_name.clone();
			let origin = handle.origin.clone();
			let subscription = handle.root.observe(move |txn, event| {
				if let Some(inner) = weak.upgrade() {
					inner.on_thought_event(&id, &doc_name, &origin, txn, event);
				}
			});
			handle.set_observer(subscription);
		}
		handle
	}

	fn ensure_lexeme(self: &Arc<Self>, key: &LexemeKey) -> Arc<DocHandle> {
		let doc_name = lexeme_doc_name(&self.workspace, key);
		let (handle, created) = self.lexemes.ensure(key.as_str(), || {
			debug!("Opening lexeme document {}", doc_name);
			open_doc(&doc_name, codec::LEXEME_ROOT, self.store.as_ref(), self.relay.as_ref())
		});
		if created {
			let weak = Arc::downgrade(self);
			let key = key.clone();
			let doc_name: Box<str> = handle.doc_name.clone();
			let origin = handle.origin.clone();
			let subscription = handle.root.observe(move |txn, event| {
				if let Some(inner) = weak.upgrade() {
					inner.on_lexeme_event(&key, &doc_name, &origin, txn, event);
				}
			});
			handle.set_observer(subscription);
		}
		handle
	}

	// ==================== Entity observers ====================

	fn on_thought_event(
		&self,
		id: &ThoughtId,
		doc_name: &str,
		origin: &Origin,
		txn: &TransactionMut<'_>,
		event: &MapEvent,
	) {
		if txn.origin() == Some(origin) {
			return;
		}
		// Recover the id from the document name; the document registered
		// under it must be the one this event fired on. Anything else is an
		// observer leak.
		let registered = match parse_doc_name(doc_name) {
			Ok(parsed) => parsed.id.and_then(|id| self.thoughts.get(&id)),
			Err(_) => None,
		};
		assert!(
			registered.is_some_and(|handle| handle.root == *event.target()),
			"observer fired for a document not registered under {}",
			doc_name,
		);

		let Some(thought) = codec::read_thought(txn, event.target()) else {
			return;
		};
		// Only dispatch when the thought or its parent is already visible in
		// application state; otherwise background loading picks it up later.
		// Out-of-order remote arrivals can make this gate skip a legitimate
		// update.
		let visible = self.state.has_thought(id)
			|| thought.parent_id.as_ref().is_some_and(|parent| self.state.has_thought(parent));
		if !visible {
			return;
		}

		let state = Arc::clone(&self.state);
		let id = id.clone();
		tokio::spawn(async move {
			state.dispatch(IndexUpdates::replicated_thought(id, Some(thought)));
		});
	}

	fn on_lexeme_event(
		&self,
		key: &LexemeKey,
		doc_name: &str,
		origin: &Origin,
		txn: &TransactionMut<'_>,
		event: &MapEvent,
	) {
		if txn.origin() == Some(origin) {
			return;
		}
		let registered = match parse_doc_name(doc_name) {
			Ok(parsed) => parsed.id.and_then(|key| self.lexemes.get(&key)),
			Err(_) => None,
		};
		assert!(
			registered.is_some_and(|handle| handle.root == *event.target()),
			"observer fired for a document not registered under {}",
			doc_name,
		);

		let Some(lexeme) = codec::read_lexeme(txn, event.target()) else {
			return;
		};
		let visible = self.state.has_lexeme(key)
			|| lexeme.contexts.iter().any(|context| self.state.has_thought(context));
		if !visible {
			return;
		}

		let state = Arc::clone(&self.state);
		let key = key.clone();
		tokio::spawn(async move {
			state.dispatch(IndexUpdates::replicated_lexeme(key, Some(lexeme)));
		});
	}

	// ==================== Replication ====================

	pub(crate) async fn replicate_thought(self: &Arc<Self>, id: &ThoughtId) {
		let handle = self.ensure_thought(id);
		if let Some(persistence) = &handle.persistence {
			if let Err(err) = persistence.when_synced().await {
				error!("Failed first sync of thought {}: {}", id, err);
				self.state.alert("Error loading thought");
			}
		}
		if id.as_str() == HOME_TOKEN {
			self.resolve_root(&handle);
		}
	}

	/// Resolve the root gate if the root thought document has content.
	fn resolve_root(&self, handle: &DocHandle) {
		let txn = handle.doc.transact();
		if let Some(root) = codec::read_thought(&txn, &handle.root) {
			self.root_gate.resolve(root);
		}
	}

	pub(crate) async fn replicate_lexeme(self: &Arc<Self>, key: &LexemeKey) {
		let handle = self.ensure_lexeme(key);
		if let Some(persistence) = &handle.persistence {
			if let Err(err) = persistence.when_synced().await {
				error!("Failed first sync of lexeme {}: {}", key, err);
				self.state.alert("Error loading lexeme");
			}
		}
	}

	pub(crate) async fn get_thought(self: &Arc<Self>, id: &ThoughtId) -> Option<Thought> {
		self.replicate_thought(id).await;
		let handle = self.thoughts.get(id.as_str())?;
		let txn = handle.doc.transact();
		codec::read_thought(&txn, &handle.root)
	}

	pub(crate) async fn get_lexeme(self: &Arc<Self>, key: &LexemeKey) -> Option<Lexeme> {
		self.replicate_lexeme(key).await;
		let handle = self.lexemes.get(key.as_str())?;
		let txn = handle.doc.transact();
		codec::read_lexeme(&txn, &handle.root)
	}

	// ==================== Local mutation ====================

	/// Fold a batch of mutations into the shared documents, then append one
	/// doclog entry per input id (updates and deletes alike, in input
	/// order), then run the deletes.
	pub(crate) async fn update(
		self: &Arc<Self>,
		thoughts: ThoughtUpdates,
		lexemes: LexemeUpdates,
		schema_version: u32,
	) {
		trace!(
			"Updating {} thoughts, {} lexemes (schema v{})",
			thoughts.len(),
			lexemes.len(),
			schema_version
		);
		let thought_log: Vec<LogEntry> = thoughts
			.iter()
			.map(|(id, update)| LogEntry::new(id.as_str(), action_of(update.is_some())))
			.collect();
		let lexeme_log: Vec<LogEntry> = lexemes
			.iter()
			.map(|(key, update)| LogEntry::new(key.as_str(), action_of(update.is_some())))
			.collect();

		let mut thought_deletes = Vec::new();
		for (id, update) in &thoughts {
			match update {
				Some(thought) => self.update_thought(id, thought).await,
				None => thought_deletes.push(id.clone()),
			}
		}
		let mut lexeme_deletes = Vec::new();
		for (key, update) in &lexemes {
			match update {
				Some(lexeme) => self.update_lexeme(key, lexeme).await,
				None => lexeme_deletes.push(key.clone()),
			}
		}

		self.append_log(thought_log, lexeme_log).await;

		for id in &thought_deletes {
			self.delete_thought(id).await;
		}
		for key in &lexeme_deletes {
			self.delete_lexeme(key).await;
		}
	}

	async fn update_thought(self: &Arc<Self>, id: &ThoughtId, thought: &Thought) {
		self.replicate_thought(id).await;
		let Some(handle) = self.thoughts.get(id.as_str()) else {
			return;
		};
		self.pushed.enqueue(&handle.doc_name);
		let before = handle.doc.transact().state_vector();
		{
			let mut txn = handle.doc.transact_mut_with(handle.origin.clone());
			codec::write_thought(&mut txn, &handle.root, thought);
		}
		// The in-memory commit happened on transaction drop; the flush to
		// store and relay settles in the background.
		let delta = handle.doc.transact().encode_state_as_update_v1(&before);
		if id.as_str() == HOME_TOKEN {
			self.resolve_root(&handle);
		}
		self.flush(handle, delta, "Error saving thought");
	}

	async fn update_lexeme(self: &Arc<Self>, key: &LexemeKey, lexeme: &Lexeme) {
		self.replicate_lexeme(key).await;
		let Some(handle) = self.lexemes.get(key.as_str()) else {
			return;
		};
		self.pushed.enqueue(&handle.doc_name);
		let before = handle.doc.transact().state_vector();
		{
			let mut txn = handle.doc.transact_mut_with(handle.origin.clone());
			codec::write_lexeme(&mut txn, &handle.root, lexeme);
		}
		let delta = handle.doc.transact().encode_state_as_update_v1(&before);
		self.flush(handle, delta, "Error saving lexeme");
	}

	fn flush(self: &Arc<Self>, handle: Arc<DocHandle>, delta: Vec<u8>, alert: &'static str) {
		let inner = Arc::clone(self);
		tokio::spawn(async move {
			let update = DocUpdate::with_client(delta, handle.client_id.clone());
			if let Some(persistence) = &handle.persistence {
				if let Err(err) = persistence.write(update.clone()).await {
					error!("Failed to persist update for {}: {}", handle.doc_name, err);
					inner.state.alert(alert);
				}
			}
			if let Some(relay) = &inner.relay {
				if let Err(err) = relay.publish(&handle.doc_name, update).await {
					warn!("Failed to publish update for {}: {}", handle.doc_name, err);
				}
			}
			// Dequeue unconditionally so is_pushing cannot stick.
			inner.pushed.dequeue(&handle.doc_name);
		});
	}

	// ==================== Deletion ====================

	pub(crate) async fn delete_thought(self: &Arc<Self>, id: &ThoughtId) {
		let doc_name = thought_doc_name(&self.workspace, id);
		self.pushed.enqueue(&doc_name);
		if let Some(handle) = self.thoughts.remove(id.as_str()) {
			debug!("Destroyed thought document {}", handle.doc_name);
		}
		// The backing database can exist even if the document was never
		// opened in this process; delete by name regardless.
		if let Some(store) = &self.store {
			if let Err(err) = store.delete_doc(&doc_name).await {
				error!("Failed to delete database {}: {}", doc_name, err);
				self.state.alert("Error deleting thought");
			}
		}
		self.pushed.dequeue(&doc_name);
	}

	pub(crate) async fn delete_lexeme(self: &Arc<Self>, key: &LexemeKey) {
		let doc_name = lexeme_doc_name(&self.workspace, key);
		self.pushed.enqueue(&doc_name);
		if let Some(handle) = self.lexemes.remove(key.as_str()) {
			debug!("Destroyed lexeme document {}", handle.doc_name);
		}
		if let Some(store) = &self.store {
			if let Err(err) = store.delete_doc(&doc_name).await {
				error!("Failed to delete database {}: {}", doc_name, err);
				self.state.alert("Error deleting lexeme");
			}
		}
		self.pushed.dequeue(&doc_name);
	}

	// ==================== Doclog ====================

	pub(crate) fn init_doclog(self: &Arc<Self>) -> Arc<DocLog> {
		let doc_name = doclog_doc_name(&self.workspace);
		let doclog = Arc::new(DocLog::open(&doc_name, self.store.as_ref(), self.relay.as_ref()));

		let on_thoughts = {
			let weak = Arc::downgrade(self);
			move |entries| {
				if let Some(inner) = weak.upgrade() {
					inner.handle_thought_log(entries);
				}
			}
		};
		let on_lexemes = {
			let weak = Arc::downgrade(self);
			move |entries| {
				if let Some(inner) = weak.upgrade() {
					inner.handle_lexeme_log(entries);
				}
			}
		};
		doclog.observe(on_thoughts, on_lexemes);

		if let Some(persistence) = doclog.persistence.clone() {
			let state = Arc::clone(&self.state);
			tokio::spawn(async move {
				if let Err(err) = persistence.when_synced().await {
					error!("Failed first sync of doclog: {}", err);
					state.alert("Error loading doclog");
				}
			});
		}
		doclog
	}

	async fn append_log(self: &Arc<Self>, thoughts: Vec<LogEntry>, lexemes: Vec<LogEntry>) {
		if thoughts.is_empty() && lexemes.is_empty() {
			return;
		}
		let Some(doclog) = self.doclog() else {
			return;
		};
		let Some(delta) = doclog.append(thoughts, lexemes) else {
			return;
		};
		let update = DocUpdate::with_client(delta, doclog.client_id.clone());
		if let Some(persistence) = &doclog.persistence {
			if let Err(err) = persistence.write(update.clone()).await {
				error!("Failed to persist doclog for {}: {}", self.workspace, err);
				self.state.alert("Error saving doclog");
			}
		}
		if let Some(relay) = &self.relay {
			if let Err(err) = relay.publish(&doclog.doc_name, update).await {
				warn!("Failed to publish doclog for {}: {}", self.workspace, err);
			}
		}
	}

	/// React to remote thought-log insertions: keep only the newest action
	/// per id and enqueue one replication task each. Task building is
	/// deferred past the commit that fired the observer.
	fn handle_thought_log(self: &Arc<Self>, entries: Vec<LogEntry>) {
		let inner = Arc::clone(self);
		tokio::spawn(async move {
			let entries = dedupe_newest_first(entries);
			let mut tasks: Vec<Task> = Vec::with_capacity(entries.len());
			for entry in entries {
				let id = ThoughtId(entry.id);
				let engine = Arc::clone(&inner);
				let task: Task = match entry.action {
					DocAction::Update => Box::pin(async move {
						engine.replicate_thought(&id).await;
					}),
					DocAction::Delete => Box::pin(async move {
						engine.state.dispatch(IndexUpdates::replicated_thought(id.clone(), None));
						engine.delete_thought(&id).await;
					}),
				};
				tasks.push(task);
			}
			inner.queue.add(tasks).await;
		});
	}

	fn handle_lexeme_log(self: &Arc<Self>, entries: Vec<LogEntry>) {
		let inner = Arc::clone(self);
		tokio::spawn(async move {
			let entries = dedupe_newest_first(entries);
			let mut tasks: Vec<Task> = Vec::with_capacity(entries.len());
			for entry in entries {
				let key = LexemeKey(entry.id);
				let engine = Arc::clone(&inner);
				let task: Task = match entry.action {
					DocAction::Update => Box::pin(async move {
						engine.replicate_lexeme(&key).await;
					}),
					DocAction::Delete => Box::pin(async move {
						engine.state.dispatch(IndexUpdates::replicated_lexeme(key.clone(), None));
						engine.delete_lexeme(&key).await;
					}),
				};
				tasks.push(task);
			}
			inner.queue.add(tasks).await;
		});
	}
}

fn action_of(present: bool) -> DocAction {
	if present { DocAction::Update } else { DocAction::Delete }
}

// vim: ts=4
