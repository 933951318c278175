//! Projection between plain entity records and their CRDT document shape.
//!
//! A thought document holds a single root map named `"thought"`; a lexeme
//! document one named `"lexeme"`. Scalar fields are stored as plain values
//! and overwritten on every write. `childrenMap` and `contexts` are nested
//! CRDT maps mutated per entry and never replaced wholesale, so concurrent
//! insertions and deletions merge per child.
//!
//! On read, a nested value may come back either as a live CRDT map or as a
//! plain serialized map depending on how the update arrived; both shapes
//! normalize to the same projection.

use serde_json::{Map as JsonMap, Value as JsonValue};
use yrs::{Any, Map, MapPrelim, MapRef, Out, ReadTxn, TransactionMut};

use crate::prelude::*;

/// Root map name inside a thought document.
pub(crate) const THOUGHT_ROOT: &str = "thought";
/// Root map name inside a lexeme document.
pub(crate) const LEXEME_ROOT: &str = "lexeme";

const CHILDREN_KEY: &str = "childrenMap";
const CONTEXTS_KEY: &str = "contexts";

/// Overwrite the root map from a thought record within an open transaction.
pub(crate) fn write_thought(txn: &mut TransactionMut<'_>, root: &MapRef, thought: &Thought) {
	root.insert(txn, "id", thought.id.as_str());
	match &thought.parent_id {
		Some(parent) => {
			root.insert(txn, "parentId", parent.as_str());
		}
		None => {
			root.insert(txn, "parentId", Any::Null);
		}
	}
	root.insert(txn, "value", thought.value.as_str());
	root.insert(txn, "rank", thought.rank);
	root.insert(txn, "lastUpdated", thought.last_updated.0);
	root.insert(txn, "updatedBy", thought.updated_by.as_ref());
	match thought.archived {
		Some(at) => {
			root.insert(txn, "archived", at.0);
		}
		None => {
			root.insert(txn, "archived", Any::Null);
		}
	}

	let children = nested_map(txn, root, CHILDREN_KEY);
	let existing: Vec<String> = children.iter(txn).map(|(key, _)| key.to_string()).collect();
	for key in &existing {
		if !thought.children.contains_key(key.as_str()) {
			children.remove(txn, key);
		}
	}
	for (key, child) in &thought.children {
		let current = match children.get(txn, key) {
			Some(Out::Any(Any::String(id))) => Some(id.to_string()),
			_ => None,
		};
		if current.as_deref() != Some(child.as_str()) {
			children.insert(txn, key.as_ref(), child.as_str());
		}
	}
}

/// Project the root map back into a thought. `None` when the map is empty
/// (the document has no content yet) or does not form a valid thought.
pub(crate) fn read_thought<T: ReadTxn>(txn: &T, root: &MapRef) -> Option<Thought> {
	if root.len(txn) == 0 {
		return None;
	}
	let mut json = JsonMap::new();
	for (key, value) in root.iter(txn) {
		json.insert(key.to_string(), out_to_json(txn, &value));
	}
	match serde_json::from_value(JsonValue::Object(json)) {
		Ok(thought) => Some(thought),
		Err(err) => {
			warn!("Failed to project thought document: {}", err);
			None
		}
	}
}

/// Overwrite the root map from a lexeme record within an open transaction.
pub(crate) fn write_lexeme(txn: &mut TransactionMut<'_>, root: &MapRef, lexeme: &Lexeme) {
	root.insert(txn, "created", lexeme.created.0);
	root.insert(txn, "lastUpdated", lexeme.last_updated.0);
	root.insert(txn, "updatedBy", lexeme.updated_by.as_ref());

	let contexts = nested_map(txn, root, CONTEXTS_KEY);
	let existing: Vec<String> = contexts.iter(txn).map(|(key, _)| key.to_string()).collect();
	for key in &existing {
		if !lexeme.contexts.iter().any(|id| id.as_str() == key) {
			contexts.remove(txn, key);
		}
	}
	for id in &lexeme.contexts {
		if !existing.iter().any(|key| key == id.as_str()) {
			contexts.insert(txn, id.as_str(), true);
		}
	}
}

/// Project the root map back into a lexeme. The `contexts` map becomes the
/// (unordered) sequence of its keys.
pub(crate) fn read_lexeme<T: ReadTxn>(txn: &T, root: &MapRef) -> Option<Lexeme> {
	if root.len(txn) == 0 {
		return None;
	}
	let mut json = JsonMap::new();
	for (key, value) in root.iter(txn) {
		let key = key.to_string();
		let mut value = out_to_json(txn, &value);
		if key == CONTEXTS_KEY {
			value = match value {
				JsonValue::Object(contexts) => JsonValue::Array(
					contexts.into_iter().map(|(id, _)| JsonValue::String(id)).collect(),
				),
				other => other,
			};
		}
		json.insert(key, value);
	}
	match serde_json::from_value(JsonValue::Object(json)) {
		Ok(lexeme) => Some(lexeme),
		Err(err) => {
			warn!("Failed to project lexeme document: {}", err);
			None
		}
	}
}

/// The nested CRDT map under `key`, created on demand. An absent entry (or a
/// plain value left by an older writer) is replaced with a fresh CRDT map;
/// an existing CRDT map is reused so per-entry edits merge.
fn nested_map(txn: &mut TransactionMut<'_>, root: &MapRef, key: &str) -> MapRef {
	match root.get(txn, key) {
		Some(Out::YMap(map)) => map,
		_ => root.insert(txn, key, MapPrelim::default()),
	}
}

fn out_to_json<T: ReadTxn>(txn: &T, value: &Out) -> JsonValue {
	match value {
		Out::Any(any) => any_to_json(any),
		Out::YMap(map) => {
			let mut json = JsonMap::new();
			for (key, value) in map.iter(txn) {
				json.insert(key.to_string(), out_to_json(txn, &value));
			}
			JsonValue::Object(json)
		}
		other => {
			warn!("Unexpected shared type in entity document: {}", other);
			JsonValue::Null
		}
	}
}

fn any_to_json(any: &Any) -> JsonValue {
	match any {
		Any::Null | Any::Undefined => JsonValue::Null,
		Any::Bool(value) => JsonValue::Bool(*value),
		Any::Number(value) => serde_json::Number::from_f64(*value)
			.map(JsonValue::Number)
			.unwrap_or(JsonValue::Null),
		Any::BigInt(value) => JsonValue::Number((*value).into()),
		Any::String(value) => JsonValue::String(value.to_string()),
		Any::Buffer(_) => JsonValue::Null,
		Any::Array(values) => JsonValue::Array(values.iter().map(any_to_json).collect()),
		Any::Map(entries) => JsonValue::Object(
			entries.iter().map(|(key, value)| (key.clone(), any_to_json(value))).collect(),
		),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use yrs::updates::decoder::Decode;
	use yrs::{Doc, StateVector, Transact, Update};

	fn sample_thought() -> Thought {
		let mut thought = Thought {
			id: "t1".into(),
			parent_id: Some(HOME_TOKEN.into()),
			value: "hello".into(),
			rank: 1.5,
			children: std::collections::BTreeMap::new(),
			last_updated: Timestamp(1700000000),
			updated_by: "device-a".into(),
			archived: None,
		};
		thought.children.insert("c1".into(), "child-1".into());
		thought
	}

	fn write(doc: &Doc, thought: &Thought) {
		let root = doc.get_or_insert_map(THOUGHT_ROOT);
		let mut txn = doc.transact_mut();
		write_thought(&mut txn, &root, thought);
	}

	fn read(doc: &Doc) -> Option<Thought> {
		let root = doc.get_or_insert_map(THOUGHT_ROOT);
		let txn = doc.transact();
		read_thought(&txn, &root)
	}

	#[test]
	fn test_thought_round_trip() {
		let doc = Doc::new();
		let thought = sample_thought();
		write(&doc, &thought);
		assert_eq!(read(&doc), Some(thought));
	}

	#[test]
	fn test_empty_document_projects_to_none() {
		let doc = Doc::new();
		assert_eq!(read(&doc), None);

		let root = doc.get_or_insert_map(LEXEME_ROOT);
		let txn = doc.transact();
		assert_eq!(read_lexeme(&txn, &root), None);
	}

	#[test]
	fn test_rewrite_is_idempotent() {
		let doc = Doc::new();
		let thought = sample_thought();
		write(&doc, &thought);
		write(&doc, &thought);
		assert_eq!(read(&doc), Some(thought));
	}

	#[test]
	fn test_applying_the_same_update_twice_is_idempotent() {
		let source = Doc::new();
		write(&source, &sample_thought());
		let update = {
			let txn = source.transact();
			txn.encode_state_as_update_v1(&StateVector::default())
		};

		let doc = Doc::new();
		for _ in 0..2 {
			let mut txn = doc.transact_mut();
			txn.apply_update(Update::decode_v1(&update).unwrap()).unwrap();
		}
		assert_eq!(read(&doc), Some(sample_thought()));
	}

	#[test]
	fn test_children_removed_and_inserted_per_entry() {
		let doc = Doc::new();
		let mut thought = sample_thought();
		write(&doc, &thought);

		thought.children.remove("c1");
		thought.children.insert("c2".into(), "child-2".into());
		write(&doc, &thought);

		let read_back = read(&doc).unwrap();
		assert_eq!(read_back.children.len(), 1);
		assert_eq!(read_back.children.get("c2").map(ThoughtId::as_str), Some("child-2"));
	}

	#[test]
	fn test_children_map_accepts_plain_map_shape() {
		// The underlying library can hand back a serialized map where a
		// nested CRDT map is expected; projection must accept both.
		let doc = Doc::new();
		let root = doc.get_or_insert_map(THOUGHT_ROOT);
		{
			let mut txn = doc.transact_mut();
			root.insert(&mut txn, "id", "t1");
			root.insert(&mut txn, "value", "hello");
			let mut children = HashMap::new();
			children.insert("c1".to_string(), Any::from("child-1"));
			root.insert(&mut txn, CHILDREN_KEY, Any::from(children));
		}
		let thought = read(&doc).unwrap();
		assert_eq!(thought.children.get("c1").map(ThoughtId::as_str), Some("child-1"));
	}

	#[test]
	fn test_concurrent_children_merge() {
		let doc_a = Doc::new();
		let doc_b = Doc::new();
		let base = sample_thought();

		// Both devices start from the same synced state.
		write(&doc_a, &base);
		let update = {
			let txn = doc_a.transact();
			txn.encode_state_as_update_v1(&StateVector::default())
		};
		{
			let mut txn = doc_b.transact_mut();
			txn.apply_update(Update::decode_v1(&update).unwrap()).unwrap();
		}

		// Concurrently add distinct children on each device.
		let sv_a = doc_a.transact().state_vector();
		let sv_b = doc_b.transact().state_vector();
		let mut on_a = base.clone();
		on_a.children.insert("ca".into(), "child-a".into());
		write(&doc_a, &on_a);
		let mut on_b = base.clone();
		on_b.children.insert("cb".into(), "child-b".into());
		write(&doc_b, &on_b);

		let delta_a = doc_a.transact().encode_state_as_update_v1(&sv_a);
		let delta_b = doc_b.transact().encode_state_as_update_v1(&sv_b);
		{
			let mut txn = doc_a.transact_mut();
			txn.apply_update(Update::decode_v1(&delta_b).unwrap()).unwrap();
		}
		{
			let mut txn = doc_b.transact_mut();
			txn.apply_update(Update::decode_v1(&delta_a).unwrap()).unwrap();
		}

		for doc in [&doc_a, &doc_b] {
			let merged = read(doc).unwrap();
			assert_eq!(merged.children.get("c1").map(ThoughtId::as_str), Some("child-1"));
			assert_eq!(merged.children.get("ca").map(ThoughtId::as_str), Some("child-a"));
			assert_eq!(merged.children.get("cb").map(ThoughtId::as_str), Some("child-b"));
		}
	}

	#[test]
	fn test_lexeme_round_trip_and_contexts_normalization() {
		let doc = Doc::new();
		let root = doc.get_or_insert_map(LEXEME_ROOT);
		let lexeme = Lexeme {
			created: Timestamp(1700000000),
			last_updated: Timestamp(1700000100),
			updated_by: "device-a".into(),
			contexts: vec!["t1".into(), "t2".into()],
		};
		{
			let mut txn = doc.transact_mut();
			write_lexeme(&mut txn, &root, &lexeme);
		}
		let txn = doc.transact();
		let mut read_back = read_lexeme(&txn, &root).unwrap();
		read_back.contexts.sort();
		assert_eq!(read_back, lexeme);
	}

	#[test]
	fn test_lexeme_context_removal() {
		let doc = Doc::new();
		let root = doc.get_or_insert_map(LEXEME_ROOT);
		let mut lexeme = Lexeme {
			contexts: vec!["t1".into(), "t2".into()],
			..Lexeme::default()
		};
		{
			let mut txn = doc.transact_mut();
			write_lexeme(&mut txn, &root, &lexeme);
		}
		lexeme.contexts = vec!["t2".into()];
		{
			let mut txn = doc.transact_mut();
			write_lexeme(&mut txn, &root, &lexeme);
		}
		let txn = doc.transact();
		assert_eq!(read_lexeme(&txn, &root).unwrap().contexts, vec![ThoughtId::from("t2")]);
	}
}

// vim: ts=4
