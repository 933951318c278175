//! Core entity types: thoughts, lexemes, and their identifiers.
//!
//! A **thought** is a node in the outliner tree; its children are kept in a
//! map so that concurrent insertions and deletions merge per child. A
//! **lexeme** is a value-indexed record pointing back at every thought whose
//! value matches a given key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of the root thought. The document holding it is the first one
/// replicated when a workspace opens.
pub const HOME_TOKEN: &str = "__HOME__";

/// Application schema version, passed through batch updates. The core does
/// not interpret it.
pub const SCHEMA_VERSION: u32 = 1;

macro_rules! str_id {
	($(#[$doc:meta])* $name:ident) => {
		$(#[$doc])*
		#[derive(
			Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
		)]
		#[serde(transparent)]
		pub struct $name(pub Box<str>);

		impl $name {
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl std::fmt::Display for $name {
			fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<&str> for $name {
			fn from(value: &str) -> Self {
				Self(value.into())
			}
		}

		impl From<String> for $name {
			fn from(value: String) -> Self {
				Self(value.into())
			}
		}
	};
}

str_id!(
	/// Opaque identifier of a thought.
	ThoughtId
);
str_id!(
	/// Key of a lexeme (derived from the normalized thought value).
	LexemeKey
);
str_id!(
	/// Opaque identifier scoping all documents of one user's data set.
	WorkspaceId
);

/// Unix timestamp in seconds.
#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Self {
		let secs = std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.map(|d| d.as_secs())
			.unwrap_or_default();
		Self(i64::try_from(secs).unwrap_or(i64::MAX))
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Change stream action tag. Distinguishes presence from absence in the log,
/// so missing remote data is never misread as deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocAction {
	Update,
	Delete,
}

impl DocAction {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Update => "update",
			Self::Delete => "delete",
		}
	}

	pub fn parse(value: &str) -> Option<Self> {
		match value {
			"update" => Some(Self::Update),
			"delete" => Some(Self::Delete),
			_ => None,
		}
	}
}

impl std::fmt::Display for DocAction {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// A node in the outliner tree.
///
/// Field names follow the application wire format (camelCase). `children`
/// maps a child key to the child's thought id; inside a CRDT document it is
/// kept as a nested map so concurrent child insertions merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thought {
	pub id: ThoughtId,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parent_id: Option<ThoughtId>,
	#[serde(default)]
	pub value: String,
	#[serde(default)]
	pub rank: f64,
	#[serde(default, rename = "childrenMap")]
	pub children: BTreeMap<Box<str>, ThoughtId>,
	#[serde(default)]
	pub last_updated: Timestamp,
	#[serde(default)]
	pub updated_by: Box<str>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub archived: Option<Timestamp>,
}

impl Thought {
	/// The root thought of a fresh workspace.
	pub fn home() -> Self {
		Self {
			id: HOME_TOKEN.into(),
			parent_id: None,
			value: HOME_TOKEN.into(),
			rank: 0.0,
			children: BTreeMap::new(),
			last_updated: Timestamp::now(),
			updated_by: "".into(),
			archived: None,
		}
	}
}

/// A value-indexed reverse reference record.
///
/// `contexts` lists every thought whose value matches this lexeme's key. The
/// CRDT representation is a nested map `ThoughtId → true`; the external
/// representation is this (unordered) sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lexeme {
	#[serde(default)]
	pub created: Timestamp,
	#[serde(default)]
	pub last_updated: Timestamp,
	#[serde(default)]
	pub updated_by: Box<str>,
	#[serde(default)]
	pub contexts: Vec<ThoughtId>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_thought_wire_format() {
		let mut thought = Thought::home();
		thought.children.insert("c1".into(), ThoughtId::from("child-1"));

		let json = serde_json::to_value(&thought).unwrap();
		assert_eq!(json["id"], HOME_TOKEN);
		assert_eq!(json["childrenMap"]["c1"], "child-1");
		assert!(json.get("parentId").is_none());

		let back: Thought = serde_json::from_value(json).unwrap();
		assert_eq!(back, thought);
	}

	#[test]
	fn test_thought_missing_id_rejected() {
		let json = serde_json::json!({ "value": "orphan" });
		assert!(serde_json::from_value::<Thought>(json).is_err());
	}

	#[test]
	fn test_doc_action_round_trip() {
		assert_eq!(DocAction::parse("update"), Some(DocAction::Update));
		assert_eq!(DocAction::parse("delete"), Some(DocAction::Delete));
		assert_eq!(DocAction::parse("merge"), None);
		assert_eq!(DocAction::Update.as_str(), "update");
	}

	#[test]
	fn test_lexeme_defaults() {
		let lexeme: Lexeme = serde_json::from_value(serde_json::json!({})).unwrap();
		assert!(lexeme.contexts.is_empty());
		assert_eq!(lexeme.created, Timestamp(0));
	}
}

// vim: ts=4
