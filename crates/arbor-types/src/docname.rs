//! Document name encoding and parsing.
//!
//! Every CRDT document is addressed by a flat name in both the local document
//! store and the relay:
//!
//! - `<workspace>/thought/<id>`
//! - `<workspace>/lexeme/<key>`
//! - `<workspace>/doclog`
//!
//! The encoding is bijective: a parsed name reproduces the original exactly.
//! Workspace ids never contain `/`; thought ids and lexeme keys may.

use crate::prelude::*;

/// Kind of document a name addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
	Thought,
	Lexeme,
	Doclog,
}

impl std::fmt::Display for DocKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			DocKind::Thought => write!(f, "thought"),
			DocKind::Lexeme => write!(f, "lexeme"),
			DocKind::Doclog => write!(f, "doclog"),
		}
	}
}

/// A parsed document name. `id` is absent for the doclog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocName {
	pub workspace: WorkspaceId,
	pub kind: DocKind,
	pub id: Option<Box<str>>,
}

pub fn thought_doc_name(workspace: &WorkspaceId, id: &ThoughtId) -> String {
	format!("{}/thought/{}", workspace, id)
}

pub fn lexeme_doc_name(workspace: &WorkspaceId, key: &LexemeKey) -> String {
	format!("{}/lexeme/{}", workspace, key)
}

pub fn doclog_doc_name(workspace: &WorkspaceId) -> String {
	format!("{}/doclog", workspace)
}

/// Parse a document name produced by one of the encoders above.
pub fn parse_doc_name(name: &str) -> ArResult<DocName> {
	let (workspace, rest) = name
		.split_once('/')
		.ok_or_else(|| Error::ValidationError(format!("invalid document name: {}", name)))?;
	if workspace.is_empty() {
		return Err(Error::ValidationError(format!("document name has empty workspace: {}", name)));
	}

	if rest == "doclog" {
		return Ok(DocName { workspace: workspace.into(), kind: DocKind::Doclog, id: None });
	}

	let (kind, id) = rest
		.split_once('/')
		.ok_or_else(|| Error::ValidationError(format!("invalid document name: {}", name)))?;
	let kind = match kind {
		"thought" => DocKind::Thought,
		"lexeme" => DocKind::Lexeme,
		_ => {
			return Err(Error::ValidationError(format!(
				"unknown document kind '{}' in name: {}",
				kind, name
			)));
		}
	};
	if id.is_empty() {
		return Err(Error::ValidationError(format!("document name missing id: {}", name)));
	}

	Ok(DocName { workspace: workspace.into(), kind, id: Some(id.into()) })
}


// vim: ts=4
