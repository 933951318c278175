//! In-flight update tracking.
//!
//! Holds the set of document names with pending pushes and drives the
//! `is_pushing` flag on the push adapter. The flag only changes on
//! empty-transition edges, so overlapping enqueues never make it flap.

use std::collections::HashSet;
use std::sync::Arc;

use arbor_types::push_adapter::{PushAdapter, PushStatus};

pub(crate) struct UpdateSet {
	keys: std::sync::Mutex<HashSet<Box<str>>>,
	push: Arc<dyn PushAdapter>,
}

impl UpdateSet {
	pub fn new(push: Arc<dyn PushAdapter>) -> Self {
		Self { keys: std::sync::Mutex::new(HashSet::new()), push }
	}

	pub fn enqueue(&self, key: &str) {
		// The push update happens under the lock so edge reports stay ordered.
		let mut keys = self.keys();
		let was_empty = keys.is_empty();
		keys.insert(key.into());
		if was_empty {
			self.push.update(PushStatus::pushing(true));
		}
	}

	pub fn dequeue(&self, key: &str) {
		let mut keys = self.keys();
		if keys.remove(key) && keys.is_empty() {
			self.push.update(PushStatus::pushing(false));
		}
	}

	pub fn is_pushing(&self) -> bool {
		!self.keys().is_empty()
	}

	fn keys(&self) -> std::sync::MutexGuard<'_, HashSet<Box<str>>> {
		match self.keys.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Default)]
	struct PushRecorder {
		statuses: std::sync::Mutex<Vec<PushStatus>>,
	}

	impl PushAdapter for PushRecorder {
		fn update(&self, status: PushStatus) {
			self.statuses.lock().unwrap().push(status);
		}
	}

	#[test]
	fn test_is_pushing_tracks_emptiness() {
		let push = Arc::new(PushRecorder::default());
		let set = UpdateSet::new(Arc::clone(&push) as Arc<dyn PushAdapter>);

		assert!(!set.is_pushing());
		set.enqueue("a");
		assert!(set.is_pushing());
		set.enqueue("b");
		set.dequeue("a");
		assert!(set.is_pushing());
		set.dequeue("b");
		assert!(!set.is_pushing());

		let statuses = push.statuses.lock().unwrap();
		assert_eq!(
			*statuses,
			vec![PushStatus::pushing(true), PushStatus::pushing(false)],
			"flag must only change on empty-transition edges"
		);
	}

	#[test]
	fn test_duplicate_keys_do_not_flap() {
		let push = Arc::new(PushRecorder::default());
		let set = UpdateSet::new(Arc::clone(&push) as Arc<dyn PushAdapter>);

		set.enqueue("a");
		set.enqueue("a");
		set.dequeue("a");
		assert!(!set.is_pushing());
		set.dequeue("a");

		let statuses = push.statuses.lock().unwrap();
		assert_eq!(*statuses, vec![PushStatus::pushing(true), PushStatus::pushing(false)]);
	}
}

// vim: ts=4
