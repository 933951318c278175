//! Single-slot asynchronous lock.
//!
//! `lock()` suspends while the slot is held; `unlock()` hands the slot to the
//! oldest waiter. The FIFO waiter queue keeps any one caller from starving
//! under steady churn.

use futures::channel::oneshot;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct Mutex {
	state: std::sync::Mutex<MutexState>,
}

#[derive(Debug, Default)]
struct MutexState {
	locked: bool,
	waiters: VecDeque<oneshot::Sender<()>>,
}

impl Mutex {
	pub fn new() -> Self {
		Self::default()
	}

	/// Acquire the slot, suspending until it is free.
	pub async fn lock(&self) {
		let waiter = {
			let mut state = self.state();
			if state.locked {
				let (tx, rx) = oneshot::channel();
				state.waiters.push_back(tx);
				Some(rx)
			} else {
				state.locked = true;
				None
			}
		};
		if let Some(rx) = waiter {
			// The sender only disappears if the mutex itself is dropped.
			let _ = rx.await;
		}
	}

	/// Release the slot, waking the oldest waiter if any.
	pub fn unlock(&self) {
		let mut state = self.state();
		loop {
			match state.waiters.pop_front() {
				Some(waiter) => {
					// A waiter whose future was dropped is skipped.
					if waiter.send(()).is_ok() {
						return;
					}
				}
				None => {
					state.locked = false;
					return;
				}
			}
		}
	}

	fn state(&self) -> std::sync::MutexGuard<'_, MutexState> {
		match self.state.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		}
	}
}


// vim: ts=4
