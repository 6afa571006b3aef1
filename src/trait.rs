use std::rc::Rc;

use crate::computation::Step;

/// Type-erased re-execution of a computation. Produces `Step::Value(())` after
/// storing a new value, or `Step::Hold` when the previous value stays.
pub type Body = Rc<dyn Fn() -> Step<()>>;

/// A composable transform over a computation's body.
///
/// Traits attach to the computation they are built with and are inherited by
/// every computation created inside it. Every run of the computation,
/// including the first, goes through the chain.
#[derive(Clone)]
pub struct Trait {
	transform: Rc<dyn Fn(Body) -> Body>,
}

impl Trait {
	pub fn new(transform: impl Fn(Body) -> Body + 'static) -> Self {
		Trait {
			transform: Rc::new(transform),
		}
	}

	pub fn apply(&self, body: Body) -> Body {
		(self.transform)(body)
	}
}

impl std::fmt::Debug for Trait {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Trait").finish_non_exhaustive()
	}
}

/// Inherited traits come first and wrap outermost.
pub(crate) fn chain(inherited: &[Trait], own: Vec<Trait>) -> Rc<[Trait]> {
	if own.is_empty() {
		return inherited.into();
	}

	inherited.iter().cloned().chain(own).collect()
}

pub(crate) fn wrap(chain: &[Trait], body: Body) -> Body {
	chain.iter().rev().fold(body, |body, t| t.apply(body))
}
