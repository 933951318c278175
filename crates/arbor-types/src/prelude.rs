pub use crate::error::{ArResult, Error};
pub use crate::types::{
	DocAction, HOME_TOKEN, Lexeme, LexemeKey, SCHEMA_VERSION, Thought, ThoughtId, Timestamp,
	WorkspaceId,
};

pub use tracing::{debug, debug_span, error, error_span, info, info_span, trace, warn, warn_span};

// vim: ts=4
