use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::graph::NodeId;
use crate::runtime::{self, Pending, Runtime};

/// Storage shared by [`Data`] and [`Accumulator`].
struct Source<T> {
	node: NodeId,
	value: RefCell<T>,
	pending: RefCell<Option<T>>,
	/// Tick of the last write.
	age: Cell<u64>,
}

impl<T: 'static> Source<T> {
	fn new(value: T) -> Rc<Self> {
		let node = runtime::with(|rt| rt.graph.borrow_mut().add_source());
		Rc::new(Source {
			node,
			value: RefCell::new(value),
			pending: RefCell::new(None),
			age: Cell::new(0),
		})
	}

	fn get(&self) -> T
	where
		T: Clone,
	{
		runtime::with(|rt| rt.track(self.node));
		self.value.borrow().clone()
	}

	fn get_untracked(&self) -> T
	where
		T: Clone,
	{
		self.value.borrow().clone()
	}

	fn written_this_tick(&self, rt: &Runtime) -> bool {
		self.age.get() == rt.clock() && self.pending.borrow().is_some()
	}

	/// Commits `value` right away and propagates it to dependents.
	fn write_now(&self, rt: &Runtime, value: T) -> Result<()> {
		self.age.set(rt.clock());
		*self.value.borrow_mut() = value;

		let has_dependents = rt.graph.borrow().has_dependents(self.node);
		if has_dependents {
			rt.flush(self.node)
		} else {
			Ok(())
		}
	}

	fn write_later(self: &Rc<Self>, rt: &Runtime, value: T) {
		self.age.set(rt.clock());
		*self.pending.borrow_mut() = Some(value);
		rt.enqueue(self.clone());
	}
}

impl<T: 'static> Pending for Source<T> {
	fn node(&self) -> NodeId {
		self.node
	}

	fn commit(&self) {
		if let Some(value) = self.pending.borrow_mut().take() {
			*self.value.borrow_mut() = value;
		}
	}

	fn discard(&self) {
		self.pending.borrow_mut().take();
	}
}

impl<T> Drop for Source<T> {
	fn drop(&mut self) {
		let node = self.node;
		runtime::try_with(|rt| rt.release(node));
	}
}

/// A reactive value cell.
///
/// Reading it inside a computation makes that computation depend on it.
/// Writing it outside of a batch propagates immediately; inside a batch the
/// value is committed at the start of the next round, and a second, different
/// write in the same round is a [`Error::Conflict`].
pub struct Data<T> {
	source: Rc<Source<T>>,
}

impl<T> Clone for Data<T> {
	fn clone(&self) -> Self {
		Self {
			source: self.source.clone(),
		}
	}
}

impl<T> Default for Data<T>
where
	T: Default + 'static,
{
	fn default() -> Self {
		Data::new(Default::default())
	}
}

impl<T: 'static> Data<T> {
	pub fn new(value: T) -> Self {
		Data {
			source: Source::new(value),
		}
	}

	pub fn id(&self) -> NodeId {
		self.source.node
	}

	#[inline]
	pub fn get(&self) -> T
	where
		T: Clone,
	{
		self.source.get()
	}

	/// Reads the committed value without creating a dependency.
	#[inline]
	pub fn get_untracked(&self) -> T
	where
		T: Clone,
	{
		self.source.get_untracked()
	}

	/// The value waiting for the next round, if any.
	pub fn pending(&self) -> Option<T>
	where
		T: Clone,
	{
		self.source.pending.borrow().clone()
	}

	pub fn set(&self, value: T) -> Result<()>
	where
		T: PartialEq,
	{
		runtime::with(|rt| {
			if !rt.in_batch() {
				return self.source.write_now(rt, value);
			}

			if self.source.written_this_tick(rt) {
				return match &*self.source.pending.borrow() {
					Some(pending) if *pending == value => Ok(()),
					_ => Err(Error::Conflict {
						node: self.source.node,
					}),
				};
			}

			self.source.write_later(rt, value);
			Ok(())
		})
	}
}

impl<T> Debug for Data<T>
where
	T: Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.source.value.borrow().fmt(f)
	}
}

/// A value cell written through updater functions.
///
/// Several updates within one round compose: each updater sees the result of
/// the previous one instead of raising a conflict.
pub struct Accumulator<T> {
	source: Rc<Source<T>>,
}

impl<T> Clone for Accumulator<T> {
	fn clone(&self) -> Self {
		Self {
			source: self.source.clone(),
		}
	}
}

impl<T: 'static> Accumulator<T> {
	pub fn new(value: T) -> Self {
		Accumulator {
			source: Source::new(value),
		}
	}

	pub fn id(&self) -> NodeId {
		self.source.node
	}

	#[inline]
	pub fn get(&self) -> T
	where
		T: Clone,
	{
		self.source.get()
	}

	#[inline]
	pub fn get_untracked(&self) -> T
	where
		T: Clone,
	{
		self.source.get_untracked()
	}

	pub fn update(&self, func: impl FnOnce(&T) -> T) -> Result<()> {
		runtime::with(|rt| {
			if !rt.in_batch() {
				let next = func(&self.source.value.borrow());
				return self.source.write_now(rt, next);
			}

			if self.source.written_this_tick(rt) {
				let next = match &*self.source.pending.borrow() {
					Some(pending) => func(pending),
					None => func(&self.source.value.borrow()),
				};
				*self.source.pending.borrow_mut() = Some(next);
				return Ok(());
			}

			let next = func(&self.source.value.borrow());
			self.source.write_later(rt, next);
			Ok(())
		})
	}
}

impl<T> Debug for Accumulator<T>
where
	T: Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.source.value.borrow().fmt(f)
	}
}
