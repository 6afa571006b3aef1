//! The mark / update / clear / backtrack traversal and the resolve loop.
//!
//! A tick starts by marking everything downstream of the changed sources:
//! each node counts how many times it was reached (`marks`). The update pass
//! then walks the marked edges again and a node runs only once every one of
//! its marks has arrived (`updates == marks`), which is what makes a diamond
//! evaluate its sink once. A node that holds its value sends `clear` instead,
//! withdrawing the marks it caused downstream. Reading a node that is still
//! waiting for marks goes through `backtrack`, which resolves it from its
//! upstream edges first.

use smallvec::SmallVec;

use crate::computation::Step;
use crate::error::{Error, Result};
use crate::graph::{Kind, NodeId, Pass, Visit};
use crate::runtime::{Context, Runtime};
use crate::scope::Teardown;

impl Runtime {
	pub(crate) fn mark(&self, node: NodeId) -> Result<()> {
		let children = {
			let clock = self.clock();
			let mut graph = self.graph.borrow_mut();
			let Some(n) = graph.node_mut(node) else {
				return Ok(());
			};

			if n.age == clock {
				if n.emitter.as_ref().map_or(false, |emitter| emitter.emitting) {
					tracing::error!(%node, "circular dependency");
					return Err(Error::CircularDependency { node });
				}
				n.marks += 1;
				return Ok(());
			}

			n.age = clock;
			n.marks = 1;
			n.updates = 0;
			n.children.clone()
		};

		// children settle before their parent counts as updated
		for child in children {
			self.mark(child)?;
		}

		self.emit_mark(node)
	}

	/// Marks every dependent of `from`.
	pub(crate) fn emit_mark(&self, from: NodeId) -> Result<()> {
		let Some(previous) = self.graph.borrow_mut().begin_emit(from) else {
			return Ok(());
		};

		let mut result = Ok(());
		let mut index = 0;
		loop {
			let visit = self.graph.borrow_mut().visit(from, index, Pass::Mark);
			match visit {
				Visit::End => break,
				Visit::Skip => {}
				Visit::Target(to) => {
					if let Err(err) = self.mark(to) {
						result = Err(err);
						break;
					}
				}
			}
			index += 1;
		}

		self.graph.borrow_mut().end_emit(from, previous);
		result
	}

	/// Runs `op` over the dependents of `from` reached by a marked edge.
	pub(crate) fn emit_marked(&self, from: NodeId, op: fn(&Runtime, NodeId)) {
		let Some(previous) = self.graph.borrow_mut().begin_emit(from) else {
			return;
		};

		let mut index = 0;
		loop {
			let visit = self.graph.borrow_mut().visit(from, index, Pass::Marked);
			match visit {
				Visit::End => break,
				Visit::Skip => {}
				Visit::Target(to) => op(self, to),
			}
			index += 1;
		}

		self.graph.borrow_mut().end_emit(from, previous);
	}

	/// One of the marks of `node` has been delivered.
	pub(crate) fn update(&self, node: NodeId) {
		let ready = {
			let mut graph = self.graph.borrow_mut();
			match graph.node_mut(node) {
				Some(n) if !n.disposed => {
					n.updates += 1;
					n.updates == n.marks
				}
				_ => false,
			}
		};

		if ready {
			self.execute(node);
		}
	}

	/// One of the marks of `node` has been withdrawn.
	pub(crate) fn clear(&self, node: NodeId) {
		let (settled, pending, children) = {
			let mut graph = self.graph.borrow_mut();
			let Some(n) = graph.node_mut(node) else {
				return;
			};
			if n.disposed {
				return;
			}

			n.marks = n.marks.saturating_sub(1);
			(n.marks == n.updates, n.marks > 0, n.children.clone())
		};

		if !settled {
			return;
		}

		if pending {
			// the remaining marks were all real updates
			self.execute(node);
		} else {
			self.emit_marked(node, Runtime::clear);
			for child in children {
				self.clear(child);
			}
		}
	}

	/// Re-runs a settled node and passes the outcome downstream.
	pub(crate) fn execute(&self, node: NodeId) {
		let _context = self.enter(Context::running(node));

		self.teardown(node, Teardown::Rerun);

		let body = match self.graph.borrow().node(node) {
			Some(n) if !n.disposed => n.body.clone(),
			_ => None,
		};
		let Some(body) = body else {
			return;
		};

		match body() {
			Step::Value(()) => {
				self.emit_marked(node, Runtime::update);

				let (clock, limits) = (self.clock(), self.limits());
				self.graph.borrow_mut().prune_receiver(node, clock, &limits);
			}
			Step::Hold => self.emit_marked(node, Runtime::clear),
		}
	}

	/// Brings a node that is read mid-tick up to date by resolving its marked
	/// inbound edges first.
	pub(crate) fn backtrack(&self, node: NodeId) {
		tracing::debug!(%node, "backtracking stale read");
		let _context = self.enter(Context {
			sampling: false,
			..self.context()
		});
		self.walk_back(node);
	}

	fn walk_back(&self, node: NodeId) {
		let sources = self.graph.borrow().marked_sources(node);

		for source in sources {
			let settled = self
				.graph
				.borrow()
				.node(source)
				.map(|n| n.is_settled());

			match settled {
				// the source, or a computation that already ran, still owes
				// this node its update
				Some(true) => self.emit_marked(source, Runtime::update),
				Some(false) => self.walk_back(source),
				None => {}
			}
		}
	}

	/// Disposes owned children and runs cleanups registered by the last run.
	pub(crate) fn teardown(&self, node: NodeId, teardown: Teardown) {
		let (children, cleanups) = {
			let mut graph = self.graph.borrow_mut();
			let Some(n) = graph.node_mut(node) else {
				return;
			};
			(std::mem::take(&mut n.children), std::mem::take(&mut n.cleanups))
		};

		for child in children {
			self.dispose(child);
		}

		for cleanup in cleanups {
			cleanup(teardown);
		}
	}

	pub(crate) fn dispose(&self, node: NodeId) {
		let (stale, body) = {
			let clock = self.clock();
			let mut graph = self.graph.borrow_mut();
			let Some(n) = graph.node_mut(node) else {
				return;
			};
			if n.disposed || n.kind != Kind::Computation {
				return;
			}

			n.disposed = true;
			n.traits = std::rc::Rc::from([]);
			(n.is_stale(clock), n.body.take())
		};
		drop(body);

		tracing::debug!(%node, "disposing computation");

		// whoever waits on this node will not hear from it again
		if stale {
			self.emit_marked(node, Runtime::clear);
		}

		self.teardown(node, Teardown::Dispose);

		let limits = self.limits();
		let removed = self.graph.borrow_mut().remove(node, &limits);
		drop(removed);
	}

	fn run_disposes(&self) {
		let disposes = std::mem::take(&mut *self.disposes.borrow_mut());
		for node in disposes {
			self.dispose(node);
		}
	}

	/// Runs rounds until the batch stops producing changes. `change` is a
	/// source that was already committed outside of any batch.
	pub(crate) fn resolve(&self, change: Option<NodeId>) -> Result<()> {
		if let Some(source) = change {
			self.tick();
			self.emit_mark(source)?;
			self.emit_marked(source, Runtime::update);
			self.run_disposes();
		}

		let max_rounds = self.limits().max_rounds;
		let mut rounds = 0;

		while !self.changes.borrow().is_empty() {
			self.tick();

			// rotate the buffers: writes made during this round land in the
			// other one
			let mut batch = std::mem::take(&mut *self.spare.borrow_mut());
			std::mem::swap(&mut batch, &mut *self.changes.borrow_mut());

			tracing::trace!(round = rounds, changes = batch.len(), clock = self.clock(), "resolving round");

			let nodes: SmallVec<[NodeId; 8]> = batch.iter().map(|change| change.node()).collect();
			for change in &batch {
				change.commit();
			}
			for node in &nodes {
				self.emit_mark(*node)?;
			}
			for node in &nodes {
				self.emit_marked(*node, Runtime::update);
			}

			batch.clear();
			*self.spare.borrow_mut() = batch;

			self.run_disposes();

			rounds += 1;
			if rounds >= max_rounds && !self.changes.borrow().is_empty() {
				tracing::error!(rounds, "runaway updates");
				return Err(Error::RunawayUpdate { rounds });
			}
		}

		// disposals requested outside of any round
		self.run_disposes();
		if !self.changes.borrow().is_empty() {
			return self.resolve(None);
		}

		Ok(())
	}

	/// Commits a source written outside of any batch and propagates it.
	pub(crate) fn flush(&self, change: NodeId) -> Result<()> {
		let flush = self.open_batch();
		self.resolve(Some(change))?;
		flush.complete();
		Ok(())
	}
}
