use tickflow::{event, Accumulator, Computation, Data, Error};

use crate::mock::{self, Spy};

#[test]
fn write_outside_batch_propagates_immediately() {
	let a = Data::new(10);
	assert_eq!(a.get(), 10);

	let b = Computation::new({
		let a = a.clone();
		move || a.get() + 10
	})
	.unwrap();
	assert_eq!(b.get(), 20);

	a.set(20).unwrap();
	assert_eq!(a.get(), 20);
	assert_eq!(b.get(), 30);
}

#[test]
fn same_value_outside_batch_still_propagates() {
	let a = Data::new(1u64);
	let mock = mock::SharedMock::new();

	mock.get().expect_observe().times(1).return_const(());
	let _reaction = Computation::new({
		let a = a.clone();
		let mock = mock.clone();
		move || mock.get().observe(a.get())
	})
	.unwrap();
	mock.get().checkpoint();

	mock.get().expect_observe().withf(|v| *v == 1).times(1).return_const(());
	a.set(1).unwrap();
	mock.get().checkpoint();
}

#[test]
fn repeated_equal_writes_in_batch_are_a_no_op() {
	let a = Data::new(10u64);
	let mock = mock::SharedMock::new();

	mock.get().expect_observe().times(1).return_const(());
	let _reaction = Computation::new({
		let a = a.clone();
		let mock = mock.clone();
		move || mock.get().observe(a.get())
	})
	.unwrap();
	mock.get().checkpoint();

	mock.get().expect_observe().withf(|v| *v == 20).times(1).return_const(());
	event(|| {
		a.set(20).unwrap();
		a.set(20).unwrap();
		a.set(20).unwrap();
		assert_eq!(a.get(), 10);
		assert_eq!(a.pending(), Some(20));
	})
	.unwrap();
	mock.get().checkpoint();

	assert_eq!(a.get(), 20);
	assert_eq!(a.pending(), None);
}

#[test]
fn conflicting_writes_in_batch_fail() {
	let a = Data::new(1);

	let result = event(|| {
		a.set(2)?;
		a.set(3)
	})
	.unwrap();

	assert_eq!(result, Err(Error::Conflict { node: a.id() }));
}

#[test]
fn accumulator_updates_compose_within_a_tick() {
	let total = Accumulator::new(0);
	let seen = Computation::new({
		let total = total.clone();
		move || total.get()
	})
	.unwrap();

	event(|| {
		total.update(|v| v + 1).unwrap();
		total.update(|v| v + 10).unwrap();
		total.update(|v| v * 2).unwrap();
		assert_eq!(total.get(), 0);
	})
	.unwrap();

	assert_eq!(total.get(), 22);
	assert_eq!(seen.get(), 22);

	total.update(|v| v - 2).unwrap();
	assert_eq!(seen.get(), 20);
}

#[test]
fn get_untracked_does_not_subscribe() {
	let a = Data::new(1);
	let b = Data::new(100);

	let sum = Computation::new({
		let a = a.clone();
		let b = b.clone();
		move || a.get() + b.get_untracked()
	})
	.unwrap();
	assert_eq!(sum.get(), 101);

	b.set(200).unwrap();
	assert_eq!(sum.get(), 101);

	a.set(2).unwrap();
	assert_eq!(sum.get(), 202);
}

#[test]
fn dropped_sources_leave_dependents_working() {
	let keep = Data::new(1);
	let reads = std::rc::Rc::new(std::cell::Cell::new(0));

	let sum = {
		let temp = Data::new(5);
		let sum = Computation::new({
			let keep = keep.clone();
			let reads = reads.clone();
			move || {
				reads.set(reads.get() + 1);
				keep.get()
			}
		})
		.unwrap();
		temp.set(6).unwrap();
		sum
	};

	keep.set(2).unwrap();
	assert_eq!(sum.get(), 2);
	assert_eq!(reads.get(), 2);
}
