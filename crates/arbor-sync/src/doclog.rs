//! The unified append-only change stream.
//!
//! A single CRDT document per workspace holds two arrays, `thoughtLog` and
//! `lexemeLog`, of `{ id, action }` entries. Local batches append inside one
//! transaction originated with the doclog's own client id. The per-array
//! observers react to everything else, flatten the delta to its insertions,
//! and hand them to the engine, which deduplicates newest-first and enqueues
//! replication work.
//!
//! The log is append-only. The only trimming is the head-equals-tail rule:
//! an append whose first entry equals the current tail drops that entry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use yrs::types::Change;
use yrs::{
	Any, Array, ArrayRef, Doc, Observable, Origin, Out, ReadTxn, Subscription, Transact,
	TransactionMut,
};

use crate::prelude::*;
use crate::registry::{LocalPersistence, RemoteTransport};
use arbor_types::doc_store_adapter::DocStoreAdapter;
use arbor_types::relay_adapter::RelayAdapter;

/// Name of the thought change array inside the doclog document.
pub const THOUGHT_LOG: &str = "thoughtLog";
/// Name of the lexeme change array inside the doclog document.
pub const LEXEME_LOG: &str = "lexemeLog";

/// One `(id, action)` pair in a log array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
	pub id: Box<str>,
	pub action: DocAction,
}

impl LogEntry {
	pub fn new(id: impl Into<Box<str>>, action: DocAction) -> Self {
		Self { id: id.into(), action }
	}

	fn to_any(&self) -> Any {
		let mut entry = HashMap::new();
		entry.insert("id".to_string(), Any::from(self.id.as_ref()));
		entry.insert("action".to_string(), Any::from(self.action.as_str()));
		Any::from(entry)
	}

	fn from_out(value: &Out) -> Option<Self> {
		let Out::Any(Any::Map(entry)) = value else {
			return None;
		};
		let id = match entry.get("id") {
			Some(Any::String(id)) => id.to_string(),
			_ => return None,
		};
		let action = match entry.get("action") {
			Some(Any::String(action)) => DocAction::parse(action)?,
			_ => return None,
		};
		Some(Self::new(id, action))
	}
}

/// Keep only the newest entry per id: later entries win, so the list is
/// walked in reverse and the first occurrence of each id survives.
pub(crate) fn dedupe_newest_first(entries: Vec<LogEntry>) -> Vec<LogEntry> {
	let mut seen = HashSet::new();
	entries.into_iter().rev().filter(|entry| seen.insert(entry.id.clone())).collect()
}

/// The workspace-wide change stream document.
pub(crate) struct DocLog {
	pub doc: Doc,
	pub doc_name: Box<str>,
	pub thought_log: ArrayRef,
	pub lexeme_log: ArrayRef,
	/// Origin for local appends: the doclog's own client id.
	pub origin: Origin,
	pub client_id: Box<str>,
	pub persistence: Option<Arc<LocalPersistence>>,
	_transport: Option<RemoteTransport>,
	observers: std::sync::Mutex<Vec<Subscription>>,
}

impl DocLog {
	pub fn open(
		doc_name: &str,
		store: Option<&Arc<dyn DocStoreAdapter>>,
		relay: Option<&Arc<dyn RelayAdapter>>,
	) -> Self {
		let doc =
			Doc::with_options(yrs::Options { guid: doc_name.into(), ..yrs::Options::default() });
		let thought_log = doc.get_or_insert_array(THOUGHT_LOG);
		let lexeme_log = doc.get_or_insert_array(LEXEME_LOG);
		let client_id: Box<str> = doc.client_id().to_string().into();
		let origin: Origin = client_id.as_ref().into();

		let persistence =
			store.map(|store| LocalPersistence::open(&doc, doc_name, Arc::clone(store)));
		let transport = relay.map(|relay| {
			RemoteTransport::connect(&doc, doc_name, &client_id, Arc::clone(relay), persistence.clone())
		});

		Self {
			doc,
			doc_name: doc_name.into(),
			thought_log,
			lexeme_log,
			origin,
			client_id,
			persistence,
			_transport: transport,
			observers: std::sync::Mutex::new(Vec::new()),
		}
	}

	/// Attach insertion observers to both arrays. Each callback receives the
	/// inserted entries, oldest first, for any change not originated by this
	/// doclog's own client id.
	pub fn observe(
		&self,
		on_thoughts: impl Fn(Vec<LogEntry>) + Send + Sync + 'static,
		on_lexemes: impl Fn(Vec<LogEntry>) + Send + Sync + 'static,
	) {
		let subs = vec![
			Self::attach(&self.thought_log, self.origin.clone(), on_thoughts),
			Self::attach(&self.lexeme_log, self.origin.clone(), on_lexemes),
		];
		match self.observers.lock() {
			Ok(mut observers) => *observers = subs,
			Err(poisoned) => *poisoned.into_inner() = subs,
		}
	}

	fn attach(
		array: &ArrayRef,
		origin: Origin,
		callback: impl Fn(Vec<LogEntry>) + Send + Sync + 'static,
	) -> Subscription {
		array.observe(move |txn, event| {
			if txn.origin() == Some(&origin) {
				return;
			}
			// The arrays are append-only, so only insertions are meaningful.
			let mut inserted = Vec::new();
			for change in event.delta(txn) {
				if let Change::Added(values) = change {
					for value in values {
						match LogEntry::from_out(value) {
							Some(entry) => inserted.push(entry),
							None => warn!("Skipping malformed doclog entry"),
						}
					}
				}
			}
			if !inserted.is_empty() {
				callback(inserted);
			}
		})
	}

	/// Append both batches inside one transaction, eliding a head that
	/// equals the current tail of its array. Returns the encoded delta, or
	/// `None` when nothing was appended.
	pub fn append(&self, thoughts: Vec<LogEntry>, lexemes: Vec<LogEntry>) -> Option<Vec<u8>> {
		let before = self.doc.transact().state_vector();
		let appended = {
			let mut txn = self.doc.transact_mut_with(self.origin.clone());
			let appended_thoughts = Self::append_array(&mut txn, &self.thought_log, thoughts);
			let appended_lexemes = Self::append_array(&mut txn, &self.lexeme_log, lexemes);
			appended_thoughts || appended_lexemes
		};
		if !appended {
			return None;
		}
		Some(self.doc.transact().encode_state_as_update_v1(&before))
	}

	fn append_array(
		txn: &mut TransactionMut<'_>,
		array: &ArrayRef,
		mut entries: Vec<LogEntry>,
	) -> bool {
		if let (Some(first), Some(tail)) = (entries.first(), Self::tail(&*txn, array)) {
			if *first == tail {
				entries.remove(0);
			}
		}
		if entries.is_empty() {
			return false;
		}
		for entry in entries {
			array.push_back(txn, entry.to_any());
		}
		true
	}

	fn tail<T: ReadTxn>(txn: &T, array: &ArrayRef) -> Option<LogEntry> {
		let len = array.len(txn);
		if len == 0 {
			return None;
		}
		array.get(txn, len - 1).and_then(|value| LogEntry::from_out(&value))
	}

	/// Current contents of both arrays, oldest first.
	pub fn snapshot(&self) -> (Vec<LogEntry>, Vec<LogEntry>) {
		let txn = self.doc.transact();
		(Self::entries(&txn, &self.thought_log), Self::entries(&txn, &self.lexeme_log))
	}

	fn entries<T: ReadTxn>(txn: &T, array: &ArrayRef) -> Vec<LogEntry> {
		array.iter(txn).filter_map(|value| LogEntry::from_out(&value)).collect()
	}
}


// vim: ts=4
