//! Engine assembly: configuration, process-wide state, and the public API.
//!
//! One [`Engine`] value per workspace owns everything the replication core
//! keeps alive between operations: the two document registries, the doclog,
//! the replication task queue, the in-flight update set, and the root sync
//! gate. Tests instantiate independent engines; there is no implicit global.

use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::doclog::{DocLog, LogEntry};
use crate::prelude::*;
use crate::registry::DocRegistry;
use crate::task_queue::{DEFAULT_CONCURRENCY, TaskQueue};
use crate::update_set::UpdateSet;
use arbor_types::doc_store_adapter::DocStoreAdapter;
use arbor_types::docname::doclog_doc_name;
use arbor_types::push_adapter::{PushAdapter, PushStatus};
use arbor_types::relay_adapter::RelayAdapter;
use arbor_types::state_adapter::StateAdapter;

/// Batch of thought mutations in input order; `None` deletes.
pub type ThoughtUpdates = IndexMap<ThoughtId, Option<Thought>>;
/// Batch of lexeme mutations in input order; `None` deletes.
pub type LexemeUpdates = IndexMap<LexemeKey, Option<Lexeme>>;

/// Engine construction parameters. Both providers may be omitted for a
/// purely in-memory (test-mode) engine.
pub struct EngineConfig {
	pub workspace: WorkspaceId,
	pub store: Option<Arc<dyn DocStoreAdapter>>,
	pub relay: Option<Arc<dyn RelayAdapter>>,
	pub state: Arc<dyn StateAdapter>,
	pub push: Arc<dyn PushAdapter>,
	pub concurrency: usize,
}

impl EngineConfig {
	pub fn new(
		workspace: WorkspaceId,
		state: Arc<dyn StateAdapter>,
		push: Arc<dyn PushAdapter>,
	) -> Self {
		Self { workspace, store: None, relay: None, state, push, concurrency: DEFAULT_CONCURRENCY }
	}

	pub fn with_store(mut self, store: Arc<dyn DocStoreAdapter>) -> Self {
		self.store = Some(store);
		self
	}

	pub fn with_relay(mut self, relay: Arc<dyn RelayAdapter>) -> Self {
		self.relay = Some(relay);
		self
	}

	pub fn with_concurrency(mut self, concurrency: usize) -> Self {
		self.concurrency = concurrency;
		self
	}
}

/// One-shot signal resolved when the root thought document has finished its
/// first sync from local persistence with content.
pub(crate) struct RootGate {
	tx: watch::Sender<Option<Thought>>,
}

impl RootGate {
	fn new() -> Self {
		let (tx, _rx) = watch::channel(None);
		Self { tx }
	}

	/// Resolve with the projected root thought. Later calls are no-ops.
	pub fn resolve(&self, thought: Thought) {
		self.tx.send_if_modified(|current| {
			if current.is_some() {
				return false;
			}
			*current = Some(thought);
			true
		});
	}

	pub async fn wait(&self) -> Thought {
		let mut rx = self.tx.subscribe();
		match rx.wait_for(|value| value.is_some()).await {
			Ok(value) => value.clone().unwrap_or_else(Thought::home),
			// The sender lives as long as the engine; this arm is only
			// reachable during teardown mid-wait.
			Err(_) => Thought::home(),
		}
	}
}

pub(crate) struct EngineInner {
	pub(crate) workspace: WorkspaceId,
	pub(crate) store: Option<Arc<dyn DocStoreAdapter>>,
	pub(crate) relay: Option<Arc<dyn RelayAdapter>>,
	pub(crate) state: Arc<dyn StateAdapter>,
	pub(crate) thoughts: DocRegistry,
	pub(crate) lexemes: DocRegistry,
	pub(crate) pushed: UpdateSet,
	pub(crate) queue: Arc<TaskQueue>,
	pub(crate) doclog: std::sync::Mutex<Option<Arc<DocLog>>>,
	pub(crate) root_gate: RootGate,
}

impl EngineInner {
	pub(crate) fn doclog(&self) -> Option<Arc<DocLog>> {
		match self.doclog.lock() {
			Ok(guard) => guard.clone(),
			Err(poisoned) => poisoned.into_inner().clone(),
		}
	}

	fn set_doclog(&self, doclog: Option<Arc<DocLog>>) {
		match self.doclog.lock() {
			Ok(mut guard) => *guard = doclog,
			Err(poisoned) => *poisoned.into_inner() = doclog,
		}
	}

	/// Bulk teardown: drop the doclog, delete every registered entity and
	/// its backing database, then re-initialize with the default initial
	/// state so subsequent observers still find a root thought.
	pub(crate) async fn clear(self: &Arc<Self>) {
		info!(
			"Clearing workspace {} ({} thoughts, {} lexemes)",
			self.workspace,
			self.thoughts.len(),
			self.lexemes.len()
		);
		// Dropping the doclog detaches its observers and transport.
		self.set_doclog(None);

		for id in self.thoughts.ids() {
			self.delete_thought(&ThoughtId(id)).await;
		}
		for key in self.lexemes.ids() {
			self.delete_lexeme(&LexemeKey(key)).await;
		}
		if let Some(store) = &self.store {
			let doc_name = doclog_doc_name(&self.workspace);
			if let Err(err) = store.delete_doc(&doc_name).await {
				error!("Failed to delete database {}: {}", doc_name, err);
				self.state.alert("Error deleting doclog");
			}
		}

		self.set_doclog(Some(self.init_doclog()));

		let mut thoughts = ThoughtUpdates::new();
		thoughts.insert(ThoughtId::from(HOME_TOKEN), Some(Thought::home()));
		self.update(thoughts, LexemeUpdates::new(), SCHEMA_VERSION).await;
	}
}

/// The replication engine for one workspace.
#[derive(Clone)]
pub struct Engine {
	inner: Arc<EngineInner>,
}

impl Engine {
	/// Build an engine and open its doclog. Must be called on a tokio
	/// runtime; provider bindings run as background tasks.
	pub fn new(config: EngineConfig) -> Self {
		let EngineConfig { workspace, store, relay, state, push, concurrency } = config;

		let step_push = Arc::clone(&push);
		let end_push = Arc::clone(&push);
		let queue = TaskQueue::new(
			concurrency,
			Some(Arc::new(move |complete, total| {
				step_push.update(PushStatus::progress(complete as f64 / total as f64));
			})),
			Some(Arc::new(move || end_push.update(PushStatus::progress(1.0)))),
		);

		let inner = Arc::new(EngineInner {
			workspace,
			store,
			relay,
			state,
			thoughts: DocRegistry::new(),
			lexemes: DocRegistry::new(),
			pushed: UpdateSet::new(push),
			queue,
			doclog: std::sync::Mutex::new(None),
			root_gate: RootGate::new(),
		});
		let doclog = inner.init_doclog();
		inner.set_doclog(Some(doclog));
		Self { inner }
	}

	pub fn workspace(&self) -> &WorkspaceId {
		&self.inner.workspace
	}

	/// Open the thought document and wait for its first local sync. Never
	/// fails; persistence errors surface as dispatcher alerts.
	pub async fn replicate_thought(&self, id: &ThoughtId) {
		self.inner.replicate_thought(id).await;
	}

	pub async fn replicate_thoughts(&self, ids: &[ThoughtId]) {
		for id in ids {
			self.inner.replicate_thought(id).await;
		}
	}

	pub async fn replicate_lexeme(&self, key: &LexemeKey) {
		self.inner.replicate_lexeme(key).await;
	}

	pub async fn replicate_lexemes(&self, keys: &[LexemeKey]) {
		for key in keys {
			self.inner.replicate_lexeme(key).await;
		}
	}

	pub async fn get_thought_by_id(&self, id: &ThoughtId) -> Option<Thought> {
		self.inner.get_thought(id).await
	}

	pub async fn get_thoughts_by_ids(&self, ids: &[ThoughtId]) -> Vec<Option<Thought>> {
		let mut thoughts = Vec::with_capacity(ids.len());
		for id in ids {
			thoughts.push(self.inner.get_thought(id).await);
		}
		thoughts
	}

	pub async fn get_lexeme_by_key(&self, key: &LexemeKey) -> Option<Lexeme> {
		self.inner.get_lexeme(key).await
	}

	pub async fn get_lexemes_by_keys(&self, keys: &[LexemeKey]) -> Vec<Option<Lexeme>> {
		let mut lexemes = Vec::with_capacity(keys.len());
		for key in keys {
			lexemes.push(self.inner.get_lexeme(key).await);
		}
		lexemes
	}

	/// Fold a batch of local mutations into the shared documents and append
	/// the corresponding doclog entries. Resolves once every in-memory
	/// commit and every delete has settled; persistence flushes continue in
	/// the background and are tracked through `is_pushing`.
	pub async fn update_thoughts(
		&self,
		thoughts: ThoughtUpdates,
		lexemes: LexemeUpdates,
		schema_version: u32,
	) {
		self.inner.update(thoughts, lexemes, schema_version).await;
	}

	pub async fn delete_thought(&self, id: &ThoughtId) {
		self.inner.delete_thought(id).await;
	}

	pub async fn delete_lexeme(&self, key: &LexemeKey) {
		self.inner.delete_lexeme(key).await;
	}

	/// Tear everything down and re-initialize to the default initial state.
	pub async fn clear(&self) {
		self.inner.clear().await;
	}

	/// Resolves exactly once, when the root thought document first syncs
	/// from local persistence with content.
	pub async fn root_synced(&self) -> Thought {
		self.inner.root_gate.wait().await
	}

	pub fn is_pushing(&self) -> bool {
		self.inner.pushed.is_pushing()
	}

	pub fn has_thought_doc(&self, id: &ThoughtId) -> bool {
		self.inner.thoughts.contains(id.as_str())
	}

	pub fn has_lexeme_doc(&self, key: &LexemeKey) -> bool {
		self.inner.lexemes.contains(key.as_str())
	}

	/// Current doclog contents `(thought_log, lexeme_log)`, oldest first.
	pub fn log_snapshot(&self) -> (Vec<LogEntry>, Vec<LogEntry>) {
		match self.inner.doclog() {
			Some(doclog) => doclog.snapshot(),
			None => (Vec::new(), Vec::new()),
		}
	}
}

// vim: ts=4
