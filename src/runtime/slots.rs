//! Fixed-capacity slot table for client connections.
//!
//! Slots are addressed by index and reused for the life of the process.
//! Free and occupied are tracked by the slot's own tag, so no descriptor
//! value doubles as a "free" marker.

/// Maximum number of concurrently served clients.
pub const MAX_CLIENTS: usize = 2;

/// State of a single pool position.
#[derive(Debug)]
enum Slot<T> {
    Free,
    Occupied(T),
}

/// Registry of client slots with lowest-free-index placement.
#[derive(Debug)]
pub struct SlotTable<T> {
    slots: Vec<Slot<T>>,
}

impl<T> SlotTable<T> {
    /// Create a table with `capacity` free slots.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot::Free);
        Self { slots }
    }

    /// Lowest-index free slot, or `None` if the table is full.
    pub fn find_free(&self) -> Option<usize> {
        self.slots.iter().position(|s| matches!(s, Slot::Free))
    }

    /// Install `value` into the lowest free slot.
    ///
    /// Hands the value back if the table is full.
    pub fn insert(&mut self, value: T) -> Result<usize, T> {
        match self.find_free() {
            Some(idx) => {
                self.slots[idx] = Slot::Occupied(value);
                Ok(idx)
            }
            None => Err(value),
        }
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        match self.slots.get_mut(idx) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    /// Free a slot, returning what it held.
    pub fn release(&mut self, idx: usize) -> Option<T> {
        let slot = self.slots.get_mut(idx)?;
        match std::mem::replace(slot, Slot::Free) {
            Slot::Occupied(value) => Some(value),
            Slot::Free => None,
        }
    }

    /// Occupied slots in ascending index order.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots.iter().enumerate().filter_map(|(idx, s)| match s {
            Slot::Occupied(value) => Some((idx, value)),
            Slot::Free => None,
        })
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.occupied().count()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_until_full() {
        let mut table = SlotTable::new(2);
        assert_eq!(table.capacity(), 2);
        assert_eq!(table.find_free(), Some(0));

        assert_eq!(table.insert(10), Ok(0));
        assert_eq!(table.insert(11), Ok(1));
        assert_eq!(table.find_free(), None);

        // Full table hands the value back
        assert_eq!(table.insert(12), Err(12));
        assert_eq!(table.len(), 2);
        assert_eq!(table.get_mut(0), Some(&mut 10));
        assert_eq!(table.get_mut(1), Some(&mut 11));
    }

    #[test]
    fn test_release_reuses_lowest_index() {
        let mut table = SlotTable::new(3);
        table.insert("a").unwrap();
        table.insert("b").unwrap();
        table.insert("c").unwrap();

        assert_eq!(table.release(2), Some("c"));
        assert_eq!(table.release(0), Some("a"));
        assert!(table.get_mut(0).is_none());

        // Lowest free index wins, not the most recently freed
        assert_eq!(table.insert("d"), Ok(0));
        assert_eq!(table.insert("e"), Ok(2));
    }

    #[test]
    fn test_release_free_or_out_of_range() {
        let mut table: SlotTable<u8> = SlotTable::new(1);
        assert_eq!(table.release(0), None);
        assert_eq!(table.release(5), None);
        assert!(table.get_mut(5).is_none());
    }

    #[test]
    fn test_occupied_in_index_order() {
        let mut table = SlotTable::new(4);
        for v in [1, 2, 3, 4] {
            table.insert(v).unwrap();
        }
        table.release(1);

        let seen: Vec<_> = table.occupied().map(|(idx, v)| (idx, *v)).collect();
        assert_eq!(seen, vec![(0, 1), (2, 3), (3, 4)]);
    }

    #[test]
    fn test_default_capacity() {
        let table: SlotTable<()> = SlotTable::new(MAX_CLIENTS);
        assert_eq!(table.capacity(), 2);
        assert_eq!(table.len(), 0);
    }
}
