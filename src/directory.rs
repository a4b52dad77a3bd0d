use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use crate::debug_delay;
use crate::list::Entry;

/// An immutable directory snapshot: a power-of-two array of atomic
/// entry pointers that serves as a jump table into the hash-sorted
/// list. A slot, once set, points at or before the smallest-hash
/// entry of its bucket, so a walk starting from it can never miss a
/// key that lives in the bucket. Snapshots are replaced wholesale by
/// a resize and retired through epoch-based reclamation; the only
/// in-place mutation after publication is [`Directory::install`],
/// which exclusively moves slots to entries with smaller hashes.
pub(crate) struct Directory<K, V> {
    slots: Box<[AtomicPtr<Entry<K, V>>]>,
    shift: u32,
    count: AtomicU64,
}

impl<K, V> Directory<K, V> {
    /// Allocates an empty snapshot with `size` slots, rounded up to a
    /// power of two and clamped to at least 2 so that the bucket
    /// shift stays within the width of the hash.
    pub(crate) fn new(size: u64) -> Directory<K, V> {
        let slot_count = size.next_power_of_two().max(2);
        let slots: Vec<AtomicPtr<Entry<K, V>>> = (0..slot_count)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();

        Directory {
            slots: slots.into_boxed_slice(),
            shift: 64 - slot_count.trailing_zeros(),
            count: AtomicU64::new(0),
        }
    }

    pub(crate) fn slot_count(&self) -> u64 {
        self.slots.len() as u64
    }

    /// Occupied slots, not entries.
    pub(crate) fn occupied(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) fn bucket_index(&self, key_hash: u64) -> usize {
        (key_hash >> self.shift) as usize
    }

    /// The entry point for walks targeting `key_hash`. Null means the
    /// bucket has not been populated in this snapshot.
    pub(crate) fn bucket(&self, key_hash: u64) -> *mut Entry<K, V> {
        self.slots[self.bucket_index(key_hash)].load(Ordering::Acquire)
    }

    /// Registers `entry` as its bucket's entry point if the slot is
    /// empty or currently points at a larger hash. Returns the new
    /// occupied-slot count when this install claimed an empty slot,
    /// and 0 otherwise.
    pub(crate) fn install(&self, entry: *mut Entry<K, V>) -> u64 {
        let key_hash = unsafe { &*entry }.key_hash;
        let slot = &self.slots[self.bucket_index(key_hash)];

        loop {
            let current = slot.load(Ordering::Acquire);

            if current.is_null() {
                if debug_delay() {
                    continue;
                }
                if slot
                    .compare_exchange(current, entry, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return self.count.fetch_add(1, Ordering::AcqRel) + 1;
                }
                continue;
            }

            if unsafe { &*current }.key_hash > key_hash {
                // the bucket has a better entry point now
                if slot
                    .compare_exchange(current, entry, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    continue;
                }
            }

            return 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Prehashed;

    #[test]
    fn sizes_round_up() {
        let directory = Directory::<Prehashed, u64>::new(0);
        assert_eq!(directory.slot_count(), 2);
        let directory = Directory::<Prehashed, u64>::new(3);
        assert_eq!(directory.slot_count(), 4);
        let directory = Directory::<Prehashed, u64>::new(8);
        assert_eq!(directory.slot_count(), 8);
    }

    #[test]
    fn bucket_index_uses_high_bits() {
        let directory = Directory::<Prehashed, u64>::new(16);
        assert_eq!(directory.bucket_index(0), 0);
        assert_eq!(directory.bucket_index(1 << 60), 1);
        assert_eq!(directory.bucket_index(15 << 60), 15);
        assert_eq!(directory.bucket_index(u64::MAX), 15);
    }

    #[test]
    fn install_prefers_smaller_hashes() {
        let directory = Directory::<Prehashed, u64>::new(2);
        let bigger = Entry::allocate(Prehashed(40), 40, 0);
        let smaller = Entry::allocate(Prehashed(20), 20, 0);

        assert_eq!(directory.install(bigger), 1);
        assert_eq!(directory.bucket(40), bigger);

        // same bucket, smaller hash: slot moves, count does not
        assert_eq!(directory.install(smaller), 0);
        assert_eq!(directory.bucket(40), smaller);

        // reinstalling the larger entry is a no-op
        assert_eq!(directory.install(bigger), 0);
        assert_eq!(directory.bucket(40), smaller);
        assert_eq!(directory.occupied(), 1);

        drop(unsafe { Box::from_raw(bigger) });
        drop(unsafe { Box::from_raw(smaller) });
    }
}
