//! Bounded-concurrency task runner for replication work.
//!
//! Tasks are boxed futures; up to `concurrency` of them run at once. The
//! queue pops from the *tail*, so tasks added later run first. This pairs
//! with the doclog observer, which reverses incoming deltas so that the
//! newest entries are serviced first.
//!
//! Completion is reported through `on_step(complete, total)` after each task
//! and `on_end` when the queue drains. There is no cancellation; a submitted
//! task runs to completion, and a failing task handles its own errors. The
//! queue itself never rejects.

use std::pin::Pin;
use std::sync::Arc;

use crate::mutex::Mutex;
use crate::prelude::*;

pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type StepCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;
pub type EndCallback = Arc<dyn Fn() + Send + Sync>;

pub const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Default)]
struct QueueState {
	queue: Vec<Task>,
	running: usize,
	complete: usize,
	total: usize,
}

pub struct TaskQueue {
	concurrency: usize,
	on_step: Option<StepCallback>,
	on_end: Option<EndCallback>,
	/// Serializes batch appends so `total` and the queue move together.
	add_gate: Mutex,
	state: std::sync::Mutex<QueueState>,
}

impl TaskQueue {
	pub fn new(
		concurrency: usize,
		on_step: Option<StepCallback>,
		on_end: Option<EndCallback>,
	) -> Arc<Self> {
		Arc::new(Self {
			concurrency: if concurrency == 0 { DEFAULT_CONCURRENCY } else { concurrency },
			on_step,
			on_end,
			add_gate: Mutex::new(),
			state: std::sync::Mutex::new(QueueState::default()),
		})
	}

	/// Append tasks atomically and run them as slots free up.
	pub async fn add(self: &Arc<Self>, tasks: Vec<Task>) {
		if tasks.is_empty() {
			return;
		}
		self.add_gate.lock().await;
		{
			let mut state = self.state();
			state.total += tasks.len();
			state.queue.extend(tasks);
		}
		self.add_gate.unlock();
		self.pump();
	}

	/// Tasks submitted since creation.
	pub fn total(&self) -> usize {
		self.state().total
	}

	/// Tasks finished since creation.
	pub fn complete(&self) -> usize {
		self.state().complete
	}

	fn pump(self: &Arc<Self>) {
		loop {
			let task = {
				let mut state = self.state();
				if state.running >= self.concurrency {
					return;
				}
				match state.queue.pop() {
					Some(task) => {
						state.running += 1;
						task
					}
					None => return,
				}
			};
			let queue = Arc::clone(self);
			tokio::spawn(async move {
				task.await;
				queue.finish_one();
				queue.pump();
			});
		}
	}

	fn finish_one(&self) {
		// Callbacks run under the state lock so progress reports stay
		// ordered; they must not call back into the queue.
		let mut state = self.state();
		state.running -= 1;
		state.complete += 1;
		if let Some(on_step) = &self.on_step {
			on_step(state.complete, state.total);
		}
		if state.running == 0 && state.queue.is_empty() {
			if let Some(on_end) = &self.on_end {
				on_end();
			}
		}
	}

	fn state(&self) -> std::sync::MutexGuard<'_, QueueState> {
		match self.state.lock() {
			Ok(guard) => guard,
			Err(poisoned) => {
				error!("Mutex poisoned: task_queue (recovering)");
				poisoned.into_inner()
			}
		}
	}
}


// vim: ts=4
