use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tickflow::{cleanup, dispose, event, Computation, Data, Error, Teardown};

#[test]
fn cleanup_outside_computation_is_a_usage_error() {
	assert!(matches!(cleanup(|_| {}), Err(Error::Usage(_))));
}

#[test]
fn cleanups_run_before_each_rerun_and_on_dispose() {
	let trigger = Data::new(0);
	let log = Rc::new(RefCell::new(Vec::new()));

	let c = Computation::new({
		let (trigger, log) = (trigger.clone(), log.clone());
		move || {
			let v = trigger.get();
			log.borrow_mut().push(format!("run {v}"));
			let log = log.clone();
			cleanup(move |teardown| log.borrow_mut().push(format!("cleanup {v} {teardown:?}"))).unwrap();
		}
	})
	.unwrap();

	trigger.set(1).unwrap();
	c.dispose();
	trigger.set(2).unwrap();

	assert_eq!(
		&*log.borrow(),
		&["run 0", "cleanup 0 Rerun", "run 1", "cleanup 1 Dispose"]
	);
	assert!(c.is_disposed());
}

#[test]
fn dispose_scope_tears_down_read_computations() {
	let trigger = Data::new(0);
	let runs = Rc::new(Cell::new(0));

	let c = Computation::new({
		let (trigger, runs) = (trigger.clone(), runs.clone());
		move || {
			trigger.get();
			runs.set(runs.get() + 1);
		}
	})
	.unwrap();

	dispose(|| {
		c.get();
		// reentrant
		dispose(|| c.get());
	});

	trigger.set(1).unwrap();
	assert_eq!(runs.get(), 1);
	assert!(c.is_disposed());
}

#[test]
fn disposing_a_parent_disposes_every_child_once() {
	let trigger = Data::new(0);
	let disposed = Rc::new(Cell::new(0));
	let child_runs = Rc::new(Cell::new(0));

	let parent = Computation::new({
		let (trigger, disposed, child_runs) = (trigger.clone(), disposed.clone(), child_runs.clone());
		move || {
			for _ in 0..3 {
				let (trigger, disposed, child_runs) = (trigger.clone(), disposed.clone(), child_runs.clone());
				Computation::new(move || {
					trigger.get();
					child_runs.set(child_runs.get() + 1);
					let disposed = disposed.clone();
					cleanup(move |teardown| {
						if teardown == Teardown::Dispose {
							disposed.set(disposed.get() + 1);
						}
					})
					.unwrap();
				})
				.unwrap();
			}
		}
	})
	.unwrap();
	assert_eq!(child_runs.get(), 3);

	parent.dispose();
	parent.dispose();
	assert_eq!(disposed.get(), 3);

	trigger.set(1).unwrap();
	assert_eq!(child_runs.get(), 3);
	assert_eq!(disposed.get(), 3);
}

#[test]
fn disposal_inside_batch_waits_for_round_end() {
	let trigger = Data::new(0);
	let runs = Rc::new(Cell::new(0));

	let c = Computation::new({
		let (trigger, runs) = (trigger.clone(), runs.clone());
		move || {
			trigger.get();
			runs.set(runs.get() + 1);
		}
	})
	.unwrap();

	event(|| {
		c.dispose();
		assert!(!c.is_disposed());
		trigger.set(1).unwrap();
	})
	.unwrap();

	// the change committed in the same round still reached it
	assert_eq!(runs.get(), 2);
	assert!(c.is_disposed());

	trigger.set(2).unwrap();
	assert_eq!(runs.get(), 2);
}

#[test]
fn computation_can_dispose_a_sibling_mid_update() {
	let trigger = Data::new(0);
	let victim_runs = Rc::new(Cell::new(0));
	let cleanups = Rc::new(Cell::new(0));

	let victim = Computation::new({
		let (trigger, victim_runs, cleanups) = (trigger.clone(), victim_runs.clone(), cleanups.clone());
		move || {
			trigger.get();
			victim_runs.set(victim_runs.get() + 1);
			let cleanups = cleanups.clone();
			cleanup(move |_| cleanups.set(cleanups.get() + 1)).unwrap();
		}
	})
	.unwrap();

	let _killer = Computation::new({
		let (trigger, victim) = (trigger.clone(), victim.clone());
		move || {
			if trigger.get() > 0 {
				victim.dispose();
			}
		}
	})
	.unwrap();

	trigger.set(1).unwrap();
	assert!(victim.is_disposed());
	assert_eq!(cleanups.get(), 2);

	trigger.set(2).unwrap();
	assert_eq!(victim_runs.get(), 2);
	assert_eq!(cleanups.get(), 2);
}

#[test]
fn cleanup_sees_final_disposal() {
	let ran = Rc::new(Cell::new(None));

	let host = Computation::new({
		let ran = ran.clone();
		move || {
			let ran = ran.clone();
			cleanup(move |teardown| ran.set(Some(teardown))).unwrap();
		}
	})
	.unwrap();
	assert_eq!(ran.get(), None);

	host.dispose();
	assert_eq!(ran.get(), Some(Teardown::Dispose));

	host.dispose();
	assert!(host.is_disposed());
}
