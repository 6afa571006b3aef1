use std::fmt;
use std::marker::PhantomData;

/// Generation-checked index into an [`Arena`].
///
/// A key outlives the slot it points to: once the slot is freed and reused,
/// the generation no longer matches and lookups return `None`.
pub struct Key<T> {
	index: u32,
	generation: u32,
	_marker: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
	fn new(index: u32, generation: u32) -> Self {
		Key {
			index,
			generation,
			_marker: PhantomData,
		}
	}
}

impl<T> Clone for Key<T> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<T> Copy for Key<T> {}

impl<T> PartialEq for Key<T> {
	fn eq(&self, other: &Self) -> bool {
		self.index == other.index && self.generation == other.generation
	}
}

impl<T> Eq for Key<T> {}

impl<T> std::hash::Hash for Key<T> {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		state.write_u32(self.index);
		state.write_u32(self.generation);
	}
}

impl<T> fmt::Debug for Key<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}v{}", self.index, self.generation)
	}
}

impl<T> fmt::Display for Key<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}v{}", self.index, self.generation)
	}
}

enum Slot<T> {
	Occupied { generation: u32, value: T },
	Vacant { generation: u32, next_free: Option<u32> },
}

pub struct Arena<T> {
	slots: Vec<Slot<T>>,
	free: Option<u32>,
	len: usize,
}

impl<T> Default for Arena<T> {
	fn default() -> Self {
		Arena::new()
	}
}

impl<T> Arena<T> {
	pub fn new() -> Self {
		Arena {
			slots: Vec::new(),
			free: None,
			len: 0,
		}
	}

	pub fn len(&self) -> usize {
		self.len
	}

	pub fn insert(&mut self, value: T) -> Key<T> {
		self.len += 1;
		match self.free {
			Some(index) => {
				let slot = &mut self.slots[index as usize];
				let (generation, next_free) = match slot {
					Slot::Vacant {
						generation,
						next_free,
					} => (generation.wrapping_add(1), *next_free),
					Slot::Occupied { .. } => unreachable!("free list points at an occupied slot"),
				};
				*slot = Slot::Occupied { generation, value };
				self.free = next_free;
				Key::new(index, generation)
			}
			None => {
				let index = self.slots.len() as u32;
				self.slots.push(Slot::Occupied {
					generation: 0,
					value,
				});
				Key::new(index, 0)
			}
		}
	}

	pub fn remove(&mut self, key: Key<T>) -> Option<T> {
		let slot = self.slots.get_mut(key.index as usize)?;
		match slot {
			Slot::Occupied { generation, .. } if *generation == key.generation => {
				let vacant = Slot::Vacant {
					generation: key.generation,
					next_free: self.free,
				};
				let Slot::Occupied { value, .. } = std::mem::replace(slot, vacant) else {
					unreachable!()
				};
				self.free = Some(key.index);
				self.len -= 1;
				Some(value)
			}
			_ => None,
		}
	}

	pub fn contains(&self, key: Key<T>) -> bool {
		self.get(key).is_some()
	}

	pub fn get(&self, key: Key<T>) -> Option<&T> {
		match self.slots.get(key.index as usize)? {
			Slot::Occupied { generation, value } if *generation == key.generation => Some(value),
			_ => None,
		}
	}

	pub fn get_mut(&mut self, key: Key<T>) -> Option<&mut T> {
		match self.slots.get_mut(key.index as usize)? {
			Slot::Occupied { generation, value } if *generation == key.generation => Some(value),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stale_key_misses_after_reuse() {
		let mut arena = Arena::new();
		let a = arena.insert("a");
		assert_eq!(arena.remove(a), Some("a"));

		let b = arena.insert("b");
		assert_eq!(arena.get(b), Some(&"b"));
		assert_eq!(arena.get(a), None);
		assert_eq!(arena.remove(a), None);
		assert_eq!(arena.len(), 1);
	}

	#[test]
	fn free_list_reuses_slots() {
		let mut arena = Arena::new();
		let keys: Vec<_> = (0..4).map(|i| arena.insert(i)).collect();
		arena.remove(keys[1]);
		arena.remove(keys[2]);

		let c = arena.insert(10);
		let d = arena.insert(11);
		let e = arena.insert(12);

		assert_eq!(arena.len(), 5);
		assert_eq!(arena.get(c), Some(&10));
		assert_eq!(arena.get(d), Some(&11));
		assert_eq!(arena.get(e), Some(&12));
		assert_eq!(arena.get(keys[3]), Some(&3));
	}
}
