use crate::computation::Step;
use crate::error::{Error, Result};
use crate::runtime::{self, Context};

/// Why a cleanup is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Teardown {
	/// The owning computation is about to run again.
	Rerun,
	/// The owning computation is being disposed.
	Dispose,
}

/// Runs `func` without recording any of its reads as dependencies of the
/// running computation.
pub fn sample<R>(func: impl FnOnce() -> R) -> R {
	runtime::with(|rt| {
		let context = rt.context();
		if context.updating.is_none() || context.sampling {
			return func();
		}

		let _sampling = rt.enter(Context {
			sampling: true,
			..context
		});
		func()
	})
}

/// Runs `func` in a scope where reading a computation disposes it instead.
///
/// Inside a batch the disposals are deferred to the end of the round.
pub fn dispose<R>(func: impl FnOnce() -> R) -> R {
	runtime::with(|rt| {
		let _disposing = rt.enter(Context {
			disposing: true,
			..rt.context()
		});
		func()
	})
}

/// Registers `func` to run before the running computation re-runs or is
/// disposed.
pub fn cleanup(func: impl FnOnce(Teardown) + 'static) -> Result<()> {
	runtime::with(|rt| {
		let Some(node) = rt.updating() else {
			return Err(Error::Usage("cleanup() must be called from within a computation"));
		};

		let unregistered = match rt.graph.borrow_mut().node_mut(node) {
			Some(n) if !n.disposed => {
				n.cleanups.push(Box::new(func));
				None
			}
			_ => Some(func),
		};

		// the owner is already gone
		if let Some(func) = unregistered {
			func(Teardown::Dispose);
		}
		Ok(())
	})
}

/// Keeps the current value of a computation and tells its dependents nothing
/// changed.
#[inline]
pub fn hold<T>() -> Step<T> {
	Step::Hold
}
