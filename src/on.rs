use std::cell::{Cell, RefCell};

use crate::computation::Computation;
use crate::error::Result;
use crate::scope::sample;

/// A computation that depends only on what `deps` reads.
///
/// `func` runs untracked on every execution, including the first.
pub fn on<D, T>(deps: impl Fn() -> D + 'static, func: impl Fn() -> T + 'static) -> Result<Computation<T>>
where
	T: 'static,
{
	Computation::new(move || {
		deps();
		sample(&func)
	})
}

/// A computation folding `func` over its own previous value every time
/// something `deps` reads changes.
///
/// The first execution yields `seed` without calling `func`.
pub fn on_reduce<D, T>(
	deps: impl Fn() -> D + 'static,
	seed: T,
	func: impl Fn(&T) -> T + 'static,
) -> Result<Computation<T>>
where
	T: Clone + 'static,
{
	on_reduce_with(deps, seed, (), move |value, _| func(value))
}

/// Like [`on_reduce`], with a constant `state` handed to every call.
pub fn on_reduce_with<D, T, S>(
	deps: impl Fn() -> D + 'static,
	seed: T,
	state: S,
	func: impl Fn(&T, &S) -> T + 'static,
) -> Result<Computation<T>>
where
	T: Clone + 'static,
	S: 'static,
{
	let first = Cell::new(true);
	let acc = RefCell::new(seed);

	Computation::new(move || {
		deps();
		if first.replace(false) {
			return acc.borrow().clone();
		}

		let next = sample(|| func(&acc.borrow(), &state));
		*acc.borrow_mut() = next.clone();
		next
	})
}

#[macro_export]
macro_rules! on {
    (( $($d_tt:tt)* ) $deps:expr => $($b:tt)*) => {
        $crate::on(
            $crate::macros::enclose!(($( $d_tt )*) move || { $deps; }),
            $crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }),
        )
    };
}
