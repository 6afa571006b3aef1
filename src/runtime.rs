use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::graph::{Graph, NodeId};

thread_local! {
	static RUNTIME: Runtime = Runtime::new();
}

pub(crate) fn with<R>(func: impl FnOnce(&Runtime) -> R) -> R {
	RUNTIME.with(func)
}

/// Like [`with`], but does nothing once the thread is tearing down.
pub(crate) fn try_with(func: impl FnOnce(&Runtime)) {
	let _ = RUNTIME.try_with(func);
}

/// Knobs of the per-thread engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
	/// Rounds a single batch may take before it is treated as runaway.
	pub max_rounds: usize,
	/// Edge lists at or below this length are never compacted.
	pub compact_min_edges: usize,
	/// Compact once fewer than one in `compact_ratio` slots is active.
	pub compact_ratio: usize,
}

impl Default for Limits {
	fn default() -> Self {
		Limits {
			max_rounds: 100_000,
			compact_min_edges: 10,
			compact_ratio: 4,
		}
	}
}

/// Replaces the limits of the engine running on this thread.
pub fn set_limits(limits: Limits) {
	with(|rt| rt.limits.set(limits))
}

pub fn limits() -> Limits {
	with(|rt| rt.limits.get())
}

/// A source write waiting for the next round.
pub(crate) trait Pending {
	fn node(&self) -> NodeId;

	/// Moves the pending value into place.
	fn commit(&self);

	/// Drops the pending value of an aborted batch.
	fn discard(&self);
}

/// The part of the execution state every reentrant entry point saves and
/// restores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub(crate) struct Context {
	pub updating: Option<NodeId>,
	pub sampling: bool,
	pub disposing: bool,
}

impl Context {
	pub fn running(node: NodeId) -> Self {
		Context {
			updating: Some(node),
			sampling: false,
			disposing: false,
		}
	}
}

pub(crate) struct Runtime {
	pub(crate) graph: RefCell<Graph>,
	clock: Cell<u64>,
	batching: Cell<bool>,
	updating: Cell<Option<NodeId>>,
	sampling: Cell<bool>,
	disposing: Cell<bool>,
	pub(crate) changes: RefCell<Vec<Rc<dyn Pending>>>,
	pub(crate) spare: RefCell<Vec<Rc<dyn Pending>>>,
	pub(crate) disposes: RefCell<Vec<NodeId>>,
	released: RefCell<Vec<NodeId>>,
	limits: Cell<Limits>,
}

impl Runtime {
	fn new() -> Self {
		Runtime {
			graph: RefCell::new(Graph::default()),
			clock: Cell::new(1),
			batching: Cell::new(false),
			updating: Cell::new(None),
			sampling: Cell::new(false),
			disposing: Cell::new(false),
			changes: RefCell::new(Vec::new()),
			spare: RefCell::new(Vec::new()),
			disposes: RefCell::new(Vec::new()),
			released: RefCell::new(Vec::new()),
			limits: Cell::new(Limits::default()),
		}
	}

	pub fn clock(&self) -> u64 {
		self.clock.get()
	}

	pub fn tick(&self) -> u64 {
		let next = self.clock.get() + 1;
		self.clock.set(next);
		next
	}

	pub fn limits(&self) -> Limits {
		self.limits.get()
	}

	pub fn in_batch(&self) -> bool {
		self.batching.get()
	}

	pub fn updating(&self) -> Option<NodeId> {
		self.updating.get()
	}

	pub fn is_disposing(&self) -> bool {
		self.disposing.get()
	}

	pub fn context(&self) -> Context {
		Context {
			updating: self.updating.get(),
			sampling: self.sampling.get(),
			disposing: self.disposing.get(),
		}
	}

	fn restore(&self, context: Context) {
		self.updating.set(context.updating);
		self.sampling.set(context.sampling);
		self.disposing.set(context.disposing);
	}

	/// Switches to `context` until the guard is dropped.
	pub fn enter(&self, context: Context) -> ContextGuard<'_> {
		let saved = self.context();
		self.restore(context);
		ContextGuard { rt: self, saved }
	}

	/// Opens the outermost batch. The engine flags are reset if the returned
	/// guard is dropped without [`Flush::complete`].
	pub fn open_batch(&self) -> Flush<'_> {
		let flush = Flush {
			rt: self,
			saved: self.context(),
			completed: false,
		};
		self.batching.set(true);
		flush
	}

	/// Registers a read of `node` by the running computation.
	pub fn track(&self, node: NodeId) {
		if self.sampling.get() {
			return;
		}

		if let Some(reader) = self.updating.get() {
			let clock = self.clock.get();
			self.graph.borrow_mut().add_edge(node, reader, clock);
		}
	}

	pub fn enqueue(&self, change: Rc<dyn Pending>) {
		self.changes.borrow_mut().push(change);
	}

	/// Source handles release their node lazily: the drop may happen while the
	/// graph is borrowed.
	pub fn release(&self, node: NodeId) {
		self.released.borrow_mut().push(node);
	}

	fn collect_released(&self) {
		if self.released.try_borrow().map_or(true, |released| released.is_empty()) {
			return;
		}

		let released = match self.released.try_borrow_mut() {
			Ok(mut released) => std::mem::take(&mut *released),
			Err(_) => return,
		};

		let limits = self.limits.get();
		let removed: Vec<_> = match self.graph.try_borrow_mut() {
			Ok(mut graph) => released.iter().filter_map(|node| graph.remove(*node, &limits)).collect(),
			Err(_) => {
				self.released.borrow_mut().extend(released);
				return;
			}
		};

		tracing::trace!(count = removed.len(), "released dropped sources");
	}
}

pub(crate) struct ContextGuard<'a> {
	rt: &'a Runtime,
	saved: Context,
}

impl Drop for ContextGuard<'_> {
	fn drop(&mut self) {
		self.rt.restore(self.saved);
	}
}

pub(crate) struct Flush<'a> {
	rt: &'a Runtime,
	saved: Context,
	completed: bool,
}

impl Flush<'_> {
	pub fn complete(mut self) {
		self.completed = true;
	}
}

impl Drop for Flush<'_> {
	fn drop(&mut self) {
		let rt = self.rt;
		rt.batching.set(false);

		if self.completed {
			rt.restore(self.saved);
		} else {
			rt.restore(Context::default());

			// whatever the failed tick queued is discarded with it
			let changes = std::mem::take(&mut *rt.changes.borrow_mut());
			let disposes = std::mem::take(&mut *rt.disposes.borrow_mut());
			for change in &changes {
				change.discard();
			}
			tracing::debug!(
				changes = changes.len(),
				disposes = disposes.len(),
				"batch aborted, engine state reset"
			);
			drop(changes);
		}

		rt.collect_released();
	}
}
