use std::cell::Cell;
use std::rc::Rc;

use crate::computation::Step;
use crate::data::Accumulator;
use crate::error::Result;
use crate::r#trait::{Body, Trait};
use crate::scope::sample;

/// Handle passed to an async scheduler to let deferred computations run.
#[derive(Clone)]
pub struct Ready {
	signals: Accumulator<u64>,
}

impl Ready {
	/// Lets every computation that is waiting on this policy run once.
	pub fn signal(&self) -> Result<()> {
		self.signals.update(|count| count + 1)
	}
}

impl std::fmt::Debug for Ready {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Ready").field("signals", &self.signals.get_untracked()).finish()
	}
}

/// Called every time a deferred computation starts waiting.
pub type Tick = Rc<dyn Fn()>;

/// A scheduling policy that defers re-executions until the scheduler signals
/// [`Ready`].
///
/// Use it as a trait: `Builder::new().with_trait(Async::new(...))`. The first
/// run is never deferred; later runs hold the value until the next signal.
/// Every computation created inside it inherits the same policy.
#[derive(Clone)]
pub struct Async {
	signals: Accumulator<u64>,
	tick: Option<Tick>,
}

impl Async {
	/// `scheduler` receives the ready handle and may return a callback that is
	/// invoked whenever a computation begins to wait.
	pub fn new(scheduler: impl FnOnce(Ready) -> Option<Tick>) -> Self {
		let signals = Accumulator::new(0);
		let tick = scheduler(Ready {
			signals: signals.clone(),
		});
		Async { signals, tick }
	}

	/// Signals readiness from a JS microtask as soon as a computation starts
	/// waiting.
	#[cfg(target_arch = "wasm32")]
	pub fn microtask() -> Self {
		Async::new(|ready| {
			let tick: Tick = Rc::new(move || {
				let ready = ready.clone();
				queue_microtask(move || {
					if let Err(err) = ready.signal() {
						tracing::warn!(%err, "microtask signal rejected");
					}
				})
			});
			Some(tick)
		})
	}

	fn defer(&self, body: Body) -> Body {
		let Async { signals, tick } = self.clone();
		let first = Cell::new(true);
		// last signal this computation consumed
		let seen = Cell::new(signals.get_untracked());

		Rc::new(move || {
			if first.replace(false) {
				return body();
			}

			let current = sample(|| signals.get());
			if current != seen.get() {
				seen.set(current);
				return body();
			}

			// subscribe to the next signal
			signals.get();
			if let Some(tick) = &tick {
				tick();
			}
			Step::Hold
		})
	}
}

impl From<Async> for Trait {
	fn from(policy: Async) -> Self {
		Trait::new(move |body| policy.defer(body))
	}
}

impl std::fmt::Debug for Async {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Async")
			.field("signals", &self.signals)
			.field("tick", &self.tick.is_some())
			.finish()
	}
}

#[cfg(target_arch = "wasm32")]
fn queue_microtask(func: impl FnOnce() + 'static) {
	use wasm_bindgen::prelude::*;

	#[wasm_bindgen]
	extern "C" {
		#[wasm_bindgen(js_name = queueMicrotask)]
		fn queue(closure: &JsValue);
	}

	queue(&Closure::once_into_js(func));
}
