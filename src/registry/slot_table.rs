use crate::{Handle, VkalError};

struct Slot<T> {
    value: Option<T>,
    generation: u32,
}

/// A fixed-capacity table of objects addressed by generational handles.
///
/// Insertion takes the lowest free slot. Removal bumps the slot's generation
/// so stale handles are rejected rather than aliasing the next occupant.
pub struct SlotTable<T> {
    kind: &'static str,
    slots: Vec<Slot<T>>,
    live: usize,
}

impl<T> SlotTable<T> {
    /// Create an empty table.
    ///
    /// # Params
    ///
    /// * `kind` - a short name for the stored object, used in errors and logs
    /// * `capacity` - the maximum number of live entries
    pub fn new(kind: &'static str, capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot {
            value: None,
            generation: 0,
        });
        Self {
            kind,
            slots,
            live: 0,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Store a value in the first free slot.
    pub fn insert(&mut self, value: T) -> Result<Handle<T>, VkalError> {
        let full = VkalError::RegistryFull {
            kind: self.kind,
            capacity: self.slots.len(),
        };
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.value.is_none())
            .ok_or(full)?;
        slot.value = Some(value);
        self.live += 1;
        log::trace!(
            "{} slot {} taken (generation {})",
            self.kind,
            index,
            slot.generation
        );
        Ok(Handle::new(index as u32, slot.generation))
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_ok()
    }

    pub fn get(&self, handle: Handle<T>) -> Result<&T, VkalError> {
        self.slots
            .get(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.value.as_ref())
            .ok_or_else(|| self.stale(handle))
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Result<&mut T, VkalError> {
        let stale = self.stale(handle);
        self.slots
            .get_mut(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.value.as_mut())
            .ok_or(stale)
    }

    /// Take the value out of its slot and make the slot reusable.
    pub fn remove(&mut self, handle: Handle<T>) -> Result<T, VkalError> {
        let stale = self.stale(handle);
        let slot = self
            .slots
            .get_mut(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .ok_or(stale)?;
        let value = slot.value.take().ok_or(VkalError::StaleHandle {
            kind: self.kind,
            index: handle.index(),
            generation: handle.generation(),
        })?;
        slot.generation = slot.generation.wrapping_add(1);
        self.live -= 1;
        log::trace!("{} slot {} released", self.kind, handle.index());
        Ok(value)
    }

    /// Every live entry with its handle, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let handle = Handle::new(index as u32, slot.generation);
            slot.value.as_ref().map(|value| (handle, value))
        })
    }

    /// Remove every live entry, invalidating all outstanding handles.
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.live);
        for slot in self.slots.iter_mut() {
            if let Some(value) = slot.value.take() {
                slot.generation = slot.generation.wrapping_add(1);
                values.push(value);
            }
        }
        self.live = 0;
        values
    }

    fn stale(&self, handle: Handle<T>) -> VkalError {
        VkalError::StaleHandle {
            kind: self.kind,
            index: handle.index(),
            generation: handle.generation(),
        }
    }
}

#[cfg(test)]
mod test {
    use {super::*, pretty_assertions::assert_eq};

    #[test]
    fn insert_takes_lowest_free_slot() {
        let mut table = SlotTable::new("thing", 4);
        let a = table.insert('a').unwrap();
        let b = table.insert('b').unwrap();
        let c = table.insert('c').unwrap();
        assert_eq!((a.index(), b.index(), c.index()), (0, 1, 2));

        table.remove(b).unwrap();
        let d = table.insert('d').unwrap();
        assert_eq!(d.index(), 1);
        assert_eq!(d.generation(), 1);
    }

    #[test]
    fn stale_handles_do_not_alias_reused_slots() {
        let mut table = SlotTable::new("thing", 2);
        let old = table.insert(10).unwrap();
        table.remove(old).unwrap();
        let new = table.insert(20).unwrap();

        assert_eq!(old.index(), new.index());
        assert!(matches!(
            table.get(old),
            Err(VkalError::StaleHandle { kind: "thing", .. })
        ));
        assert_eq!(*table.get(new).unwrap(), 20);
        assert!(table.remove(old).is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn full_table_is_an_error() {
        let mut table = SlotTable::new("thing", 1);
        table.insert(()).unwrap();
        assert!(matches!(
            table.insert(()),
            Err(VkalError::RegistryFull {
                kind: "thing",
                capacity: 1
            })
        ));
    }

    #[test]
    fn out_of_range_handles_are_stale() {
        let table: SlotTable<u8> = SlotTable::new("thing", 1);
        assert!(table.get(Handle::new(7, 0)).is_err());
    }

    #[test]
    fn drain_invalidates_everything() {
        let mut table = SlotTable::new("thing", 3);
        let a = table.insert(1).unwrap();
        table.insert(2).unwrap();
        let mut drained = table.drain();
        drained.sort();
        assert_eq!(drained, vec![1, 2]);
        assert!(table.is_empty());
        assert!(!table.contains(a));
    }

    #[test]
    fn live_handles_never_exceed_capacity() {
        let mut table = SlotTable::new("thing", 8);
        let mut live = vec![];
        for step in 0..1000_u32 {
            if step % 3 == 2 && !live.is_empty() {
                let handle = live.remove((step as usize * 7) % live.len());
                table.remove(handle).unwrap();
            } else if let Ok(handle) = table.insert(step) {
                live.push(handle);
            } else {
                assert_eq!(table.len(), table.capacity());
            }
            assert!(table.len() <= table.capacity());
            assert_eq!(table.len(), live.len());
        }
        for handle in live {
            assert!(table.contains(handle));
        }
    }
}
