use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::graph::NodeId;
use crate::r#trait::{self, Body, Trait};
use crate::runtime::{self, Context, Runtime};

/// Result of one run of a computation body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step<T> {
	/// A new value.
	Value(T),
	/// Nothing new this run: keep the previous value and tell dependents
	/// there is nothing to update.
	Hold,
}

impl<T> From<T> for Step<T> {
	fn from(value: T) -> Self {
		Step::Value(value)
	}
}

/// Where a new computation lands in the ownership tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Placement {
	/// Owned by the computation that creates it: disposed when the creator
	/// re-runs or is disposed.
	#[default]
	Child,
	/// A root of its own, surviving its creator.
	Toplevel,
}

/// A function that re-runs whenever something it read during its last run
/// changes.
///
/// Dropping the handle does not dispose the computation; it lives until its
/// owner re-runs, or until it is disposed through [`crate::dispose`] or
/// [`Computation::dispose`].
pub struct Computation<T> {
	node: NodeId,
	value: Rc<RefCell<T>>,
}

impl<T> Clone for Computation<T> {
	fn clone(&self) -> Self {
		Self {
			node: self.node,
			value: self.value.clone(),
		}
	}
}

impl<T: 'static> Computation<T> {
	/// Creates a computation and runs it once, through its traits.
	///
	/// Outside of a batch the first run is wrapped in its own batch, so any
	/// writes it makes are settled before this returns. If an inherited trait
	/// holds that first run there is no value to start from, and this fails
	/// with [`Error::Usage`].
	pub fn new(func: impl Fn() -> T + 'static) -> Result<Self> {
		Builder::default().run(func)
	}

	/// Creates a computation whose body may [`Step::Hold`]. `seed` is the value
	/// until the body produces one.
	pub fn holding(seed: T, func: impl Fn() -> Step<T> + 'static) -> Result<Self> {
		Builder::default().holding(seed, func)
	}

	pub fn id(&self) -> NodeId {
		self.node
	}

	/// Returns the current value.
	///
	/// Inside a computation this creates a dependency, and a value that is
	/// still waiting on this tick's changes is brought up to date first.
	/// Inside a [`crate::dispose`] scope the computation is disposed instead.
	pub fn get(&self) -> T
	where
		T: Clone,
	{
		runtime::with(|rt| rt.read(self.node));
		self.value.borrow().clone()
	}

	/// Returns the current value without creating a dependency.
	pub fn get_untracked(&self) -> T
	where
		T: Clone,
	{
		crate::scope::sample(|| self.get())
	}

	/// Disposes the computation: children are disposed, cleanups run, and the
	/// body never runs again. Within a batch this happens at the end of the
	/// round.
	pub fn dispose(&self) {
		crate::scope::dispose(|| runtime::with(|rt| rt.read(self.node)))
	}

	pub fn is_disposed(&self) -> bool {
		runtime::with(|rt| rt.graph.borrow().node(self.node).map_or(true, |node| node.disposed))
	}
}

/// Creates a computation that is not owned by the one currently running, so
/// it survives its creator's re-runs.
pub fn toplevel<T: 'static>(func: impl Fn() -> T + 'static) -> Result<Computation<T>> {
	Builder::default().toplevel().run(func)
}

impl<T> Debug for Computation<T>
where
	T: Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Computation")
			.field("node", &self.node)
			.field("value", &*self.value.borrow())
			.finish()
	}
}

/// Options for a new computation.
#[derive(Default, Clone, Debug)]
#[must_use]
pub struct Builder {
	placement: Placement,
	traits: Vec<Trait>,
}

/// Where a body run stores its value: staged until the computation's first
/// execution completes, then straight into the shared cell.
enum Slot<T> {
	Staged(Option<T>),
	Ready(Rc<RefCell<T>>),
}

impl Builder {
	pub fn new() -> Self {
		Builder::default()
	}

	pub fn placement(mut self, placement: Placement) -> Self {
		self.placement = placement;
		self
	}

	/// Promotes the computation to a root of the ownership tree.
	pub fn toplevel(self) -> Self {
		self.placement(Placement::Toplevel)
	}

	/// Adds a trait to this computation and everything created inside it.
	pub fn with_trait(mut self, t: impl Into<Trait>) -> Self {
		self.traits.push(t.into());
		self
	}

	pub fn run<T: 'static>(self, func: impl Fn() -> T + 'static) -> Result<Computation<T>> {
		self.start(None, move || Step::Value(func()))
	}

	pub fn holding<T: 'static>(self, seed: T, func: impl Fn() -> Step<T> + 'static) -> Result<Computation<T>> {
		self.start(Some(seed), func)
	}

	fn start<T: 'static>(self, seed: Option<T>, func: impl Fn() -> Step<T> + 'static) -> Result<Computation<T>> {
		let Builder { placement, traits } = self;

		runtime::with(|rt| {
			let parent = rt.updating();
			let inherited = parent
				.and_then(|parent| rt.graph.borrow().node(parent).map(|node| node.traits.clone()))
				.unwrap_or_else(|| Rc::from([]));
			let chain = r#trait::chain(&inherited, traits);

			let clock = rt.clock();
			let node = rt.graph.borrow_mut().add_computation(clock, chain.clone());

			let slot = Rc::new(RefCell::new(Slot::Staged(None)));
			let body: Body = {
				let slot = slot.clone();
				Rc::new(move || match func() {
					Step::Value(next) => {
						match &mut *slot.borrow_mut() {
							Slot::Ready(value) => *value.borrow_mut() = next,
							Slot::Staged(staged) => *staged = Some(next),
						}
						Step::Value(())
					}
					Step::Hold => Step::Hold,
				})
			};
			let body = r#trait::wrap(&chain, body);

			if let Some(n) = rt.graph.borrow_mut().node_mut(node) {
				n.body = Some(body.clone());
			}

			if let Err(err) = rt.bootstrap(node, || body()) {
				rt.dispose(node);
				return Err(err);
			}

			let staged = match &mut *slot.borrow_mut() {
				Slot::Staged(staged) => staged.take(),
				Slot::Ready(_) => None,
			};
			let Some(initial) = staged.or(seed) else {
				rt.dispose(node);
				return Err(Error::Usage("the first run of a computation without a seed must produce a value"));
			};

			let value = Rc::new(RefCell::new(initial));
			*slot.borrow_mut() = Slot::Ready(value.clone());

			if let (Placement::Child, Some(parent)) = (placement, parent) {
				rt.adopt(parent, node);
			}

			Ok(Computation { node, value })
		})
	}
}

impl Runtime {
	/// Runs the first execution of `node`. Outside of a batch this opens one
	/// and resolves the writes the run made.
	fn bootstrap<R>(&self, node: NodeId, first: impl FnOnce() -> R) -> Result<R> {
		if self.in_batch() {
			let _context = self.enter(Context::running(node));
			return Ok(first());
		}

		let flush = self.open_batch();
		self.tick();

		let result = {
			let _context = self.enter(Context::running(node));
			first()
		};

		self.resolve(None)?;
		flush.complete();

		Ok(result)
	}

	fn adopt(&self, parent: NodeId, child: NodeId) {
		if let Some(node) = self.graph.borrow_mut().node_mut(parent) {
			node.children.push(child);
		}
	}

	/// What reading a computation handle does, apart from returning the value.
	pub(crate) fn read(&self, node: NodeId) {
		if self.is_disposing() {
			if self.in_batch() {
				self.disposes.borrow_mut().push(node);
			} else {
				self.dispose(node);
			}
			return;
		}

		let stale = match self.graph.borrow().node(node) {
			Some(n) if !n.disposed => n.is_stale(self.clock()),
			_ => return,
		};

		if stale {
			self.backtrack(node);
		}

		self.track(node);
	}
}
