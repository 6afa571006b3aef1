use std::rc::Rc;

use crate::computation::Computation;
use crate::data::{Accumulator, Data};

/// Uniform read access over anything that holds a reactive value.
pub trait Access<T> {
	/// Reads the value, creating a dependency inside a computation.
	fn get(&self) -> T;

	fn get_untracked(&self) -> T;
}

/// A read-only handle erasing whether the value comes from a source or a
/// computation.
pub struct Value<T> {
	value: Rc<dyn Access<T>>,
}

impl<T> Clone for Value<T> {
	fn clone(&self) -> Self {
		Value {
			value: self.value.clone(),
		}
	}
}

impl<T> Value<T>
where
	T: 'static,
{
	pub fn new(value: Rc<dyn Access<T>>) -> Self {
		Value { value }
	}

	/// A value that never changes.
	pub fn constant(value: T) -> Self
	where
		T: Clone,
	{
		Value::new(Rc::new(Constant(value)))
	}

	pub fn get(&self) -> T {
		self.value.get()
	}

	pub fn get_untracked(&self) -> T {
		self.value.get_untracked()
	}
}

struct Constant<T>(T);

impl<T: Clone> Access<T> for Constant<T> {
	fn get(&self) -> T {
		self.0.clone()
	}

	fn get_untracked(&self) -> T {
		self.0.clone()
	}
}

impl<T: Clone + 'static> Access<T> for Data<T> {
	fn get(&self) -> T {
		Data::get(self)
	}

	fn get_untracked(&self) -> T {
		Data::get_untracked(self)
	}
}

impl<T: Clone + 'static> Access<T> for Accumulator<T> {
	fn get(&self) -> T {
		Accumulator::get(self)
	}

	fn get_untracked(&self) -> T {
		Accumulator::get_untracked(self)
	}
}

impl<T: Clone + 'static> Access<T> for Computation<T> {
	fn get(&self) -> T {
		Computation::get(self)
	}

	fn get_untracked(&self) -> T {
		Computation::get_untracked(self)
	}
}

impl<T: Clone + 'static> From<Data<T>> for Value<T> {
	fn from(data: Data<T>) -> Self {
		Value::new(Rc::new(data))
	}
}

impl<T: Clone + 'static> From<Accumulator<T>> for Value<T> {
	fn from(acc: Accumulator<T>) -> Self {
		Value::new(Rc::new(acc))
	}
}

impl<T: Clone + 'static> From<Computation<T>> for Value<T> {
	fn from(computation: Computation<T>) -> Self {
		Value::new(Rc::new(computation))
	}
}
