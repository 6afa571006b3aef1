use crate::error::Result;
use crate::runtime;

pub fn in_batch() -> bool {
	runtime::with(|rt| rt.in_batch())
}

/// Runs `func` as one batch: every write it makes is committed together at
/// the start of the next round, and computations see all of them at once.
///
/// Nested inside another batch (or a computation) `func` simply runs; the
/// outer batch resolves its writes.
pub fn event<R>(func: impl FnOnce() -> R) -> Result<R> {
	runtime::with(|rt| {
		if rt.in_batch() {
			return Ok(func());
		}

		let flush = rt.open_batch();
		rt.tick();
		let result = func();
		rt.resolve(None)?;
		flush.complete();

		Ok(result)
	})
}
