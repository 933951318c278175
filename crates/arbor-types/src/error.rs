//! Error handling subsystem. Implements a custom Error type.

use crate::prelude::*;

pub type ArResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	// Core errors
	NotFound,
	DbError(String),
	Parse,

	// Input validation and constraints
	ValidationError(String),

	// Network and external services
	NetworkError(String),

	// System
	Internal(String), // Internal invariant violations, for debugging

	// externals
	Io(std::io::Error),
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		warn!("io error: {}", err);
		Self::Io(err)
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "{:?}", self)
	}
}

impl std::error::Error for Error {}

impl From<std::num::ParseIntError> for Error {
	fn from(_err: std::num::ParseIntError) -> Self {
		warn!("parse int error: {}", _err);
		Error::Parse
	}
}

impl From<serde_json::Error> for Error {
	fn from(_err: serde_json::Error) -> Self {
		warn!("json error: {}", _err);
		Error::Parse
	}
}

/// Helper macro for locking mutexes with automatic internal error handling.
///
/// Simplifies the common pattern of locking a mutex and converting poisoning
/// errors to `Error::Internal`, optionally with context about which mutex was
/// poisoned.
///
/// ```ignore
/// let mut data = lock!(my_mutex)?;
/// let mut data = lock!(my_mutex, "task_queue")?;
/// ```
#[macro_export]
macro_rules! lock {
	// Simple version without context
	($mutex:expr) => {
		$mutex
			.lock()
			.map_err(|_| $crate::error::Error::Internal("mutex poisoned".into()))
	};
	// Version with context description
	($mutex:expr, $context:expr) => {
		$mutex
			.lock()
			.map_err(|_| $crate::error::Error::Internal(format!("mutex poisoned: {}", $context)))
	};
}

// vim: ts=4
