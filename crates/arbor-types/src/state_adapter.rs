//! Application state adapter.
//!
//! The reducer host the engine dispatches entity updates into. The engine
//! also queries it to decide whether a replicated entity is already visible
//! in application state (and should therefore be dispatched) or can be left
//! for background loading.

use std::collections::HashMap;

use crate::prelude::*;

/// A batch of entity index updates. `None` removes the entity.
#[derive(Debug, Clone, Default)]
pub struct IndexUpdates {
	pub thoughts: HashMap<ThoughtId, Option<Thought>>,
	pub lexemes: HashMap<LexemeKey, Option<Lexeme>>,
	pub local: bool,
	pub remote: bool,
	pub repair_cursor: bool,
}

impl IndexUpdates {
	/// An update originating from replication rather than user editing:
	/// not local, not remote-authoritative, and the cursor may need repair.
	fn replicated() -> Self {
		Self { local: false, remote: false, repair_cursor: true, ..Self::default() }
	}

	pub fn replicated_thought(id: ThoughtId, thought: Option<Thought>) -> Self {
		let mut updates = Self::replicated();
		updates.thoughts.insert(id, thought);
		updates
	}

	pub fn replicated_lexeme(key: LexemeKey, lexeme: Option<Lexeme>) -> Self {
		let mut updates = Self::replicated();
		updates.lexemes.insert(key, lexeme);
		updates
	}
}

pub trait StateAdapter: Send + Sync {
	/// Push an entity index update into the application state.
	fn dispatch(&self, updates: IndexUpdates);

	/// Surface a user-visible error message.
	fn alert(&self, message: &str);

	/// Whether the thought is currently present in application state.
	fn has_thought(&self, id: &ThoughtId) -> bool;

	/// Whether the lexeme is currently present in application state.
	fn has_lexeme(&self, key: &LexemeKey) -> bool;
}

// vim: ts=4
