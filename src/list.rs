use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

use ebr::Guard;

use crate::debug_delay;
use crate::hash::Hash64;
use crate::Deferred;

/// One key/value pair in the hash-sorted list.
///
/// An entry is heap-allocated exactly once and never moves or gets
/// freed while the map is alive, which is what makes it safe for the
/// directory to point into the middle of the list. Deletion is a
/// logical tombstone; the value box is replaced atomically and the
/// previous box is retired through epoch-based reclamation so that a
/// concurrent reader holding a loaded pointer never observes a free.
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) key_hash: u64,
    pub(crate) value: AtomicPtr<V>,
    pub(crate) deleted: AtomicBool,
    pub(crate) next: AtomicPtr<Entry<K, V>>,
}

impl<K, V> Entry<K, V> {
    pub(crate) fn allocate(key: K, key_hash: u64, value: V) -> *mut Entry<K, V> {
        Box::into_raw(Box::new(Entry {
            key,
            key_hash,
            value: AtomicPtr::new(Box::into_raw(Box::new(value))),
            deleted: AtomicBool::new(false),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }
}

impl<K, V> Drop for Entry<K, V> {
    fn drop(&mut self) {
        let value = *self.value.get_mut();
        if !value.is_null() {
            drop(unsafe { Box::from_raw(value) });
        }
    }
}

/// Takes the value box out of an unpublished candidate entry.
fn take_value<K, V>(candidate: *mut Entry<K, V>) -> *mut V {
    unsafe { &*candidate }.value.swap(ptr::null_mut(), Ordering::AcqRel)
}

/// Frees an unpublished candidate entry, along with its value box if
/// it still holds one.
fn discard<K, V>(candidate: *mut Entry<K, V>) {
    drop(unsafe { Box::from_raw(candidate) });
}

/// Result of [`List::add`].
pub(crate) enum AddOutcome<K, V> {
    /// The candidate was spliced into the list as a new entry.
    Linked,
    /// The key was already live; its value box was replaced.
    Overwrote,
    /// The key existed as a tombstone and was brought back to life.
    /// Carries the existing entry so the caller can re-register it in
    /// the directory.
    Resurrected(*mut Entry<K, V>),
    /// A concurrent splice moved the predecessor. The caller must
    /// re-resolve the entry point and retry; the candidate is
    /// untouched.
    Contended,
}

/// Result of [`List::cas`].
pub(crate) enum CasOutcome<K, V> {
    /// The key was absent and the candidate was spliced in
    /// (`expected` was `None`).
    Linked,
    /// The live entry's value matched `expected` and was swapped.
    Swapped,
    /// The key was a tombstone, `expected` was `None`, and this call
    /// won the resurrection.
    Resurrected(*mut Entry<K, V>),
    /// The expectation did not hold; the candidate has been freed.
    Failed,
    /// Same as [`AddOutcome::Contended`]; the candidate is untouched.
    Contended,
}

/// Singly linked list of entries ordered by ascending `key_hash`.
/// Hash ties (true collisions) form a contiguous run ordered by
/// insertion. The head pointer and every `next` pointer are only ever
/// mutated through compare-and-swap, and entries are never unlinked,
/// so a walk can always continue from wherever it happens to stand.
pub(crate) struct List<K, V> {
    head: AtomicPtr<Entry<K, V>>,
    len: AtomicU64,
}

impl<K, V> Default for List<K, V> {
    fn default() -> List<K, V> {
        List {
            head: AtomicPtr::new(ptr::null_mut()),
            len: AtomicU64::new(0),
        }
    }
}

impl<K, V> Drop for List<K, V> {
    fn drop(&mut self) {
        let mut cursor = *self.head.get_mut();
        while !cursor.is_null() {
            let mut entry = unsafe { Box::from_raw(cursor) };
            cursor = *entry.next.get_mut();
            drop(entry);
        }
    }
}

impl<K, V> List<K, V>
where
    K: 'static + Hash64 + Send + Sync,
    V: 'static + Send + Sync,
{
    /// Number of live (non-tombstoned) entries.
    pub(crate) fn len(&self) -> u64 {
        self.len.load(Ordering::Relaxed)
    }

    /// First entry of the list, tombstones included.
    pub(crate) fn first(&self) -> *mut Entry<K, V> {
        self.head.load(Ordering::Acquire)
    }

    /// Walks from `start` (head when null) and returns the entry
    /// matching `key_hash` and `key`, live or tombstoned. Returns
    /// null once an entry with a greater hash is reached or the list
    /// ends.
    pub(crate) fn find(&self, key_hash: u64, key: &K, start: *mut Entry<K, V>) -> *mut Entry<K, V> {
        let mut cursor = if start.is_null() {
            self.head.load(Ordering::Acquire)
        } else {
            start
        };

        while !cursor.is_null() {
            let entry = unsafe { &*cursor };
            if entry.key_hash == key_hash && entry.key == *key {
                return cursor;
            }
            if entry.key_hash > key_hash {
                return ptr::null_mut();
            }
            cursor = entry.next.load(Ordering::Acquire);
        }
        ptr::null_mut()
    }

    /// Inserts `candidate` at its sorted position, walking from
    /// `start` (head when null). An entry point that sorts after the
    /// candidate cannot reach the splice position, so the walk falls
    /// back to the head; this is the normal case whenever the
    /// candidate becomes the new smallest key of its bucket.
    ///
    /// If the key is already present the candidate's value box is
    /// moved into the existing entry instead and the candidate shell
    /// is freed; a tombstoned entry is resurrected. On
    /// [`AddOutcome::Contended`] the candidate remains owned by the
    /// caller, valid for a retry.
    pub(crate) fn add<const LOCAL_GC_BUFFER_SIZE: usize>(
        &self,
        candidate: *mut Entry<K, V>,
        start: *mut Entry<K, V>,
        guard: &mut Guard<'_, Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
    ) -> AddOutcome<K, V> {
        let cand = unsafe { &*candidate };

        let (mut prev_link, mut cursor) =
            if start.is_null() || unsafe { &*start }.key_hash > cand.key_hash {
                (&self.head, self.head.load(Ordering::Acquire))
            } else {
                let entry = unsafe { &*start };
                if entry.key_hash == cand.key_hash && entry.key == cand.key {
                    return self.replace_value(start, candidate, guard);
                }
                (&entry.next, entry.next.load(Ordering::Acquire))
            };

        loop {
            let past = cursor.is_null() || unsafe { &*cursor }.key_hash > cand.key_hash;
            if past {
                // splice between the predecessor and `cursor`; hash
                // ties end up after their elders, keeping collision
                // runs in insertion order
                cand.next.store(cursor, Ordering::Release);
                if debug_delay() {
                    return AddOutcome::Contended;
                }
                return match prev_link.compare_exchange(
                    cursor,
                    candidate,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        self.len.fetch_add(1, Ordering::Relaxed);
                        AddOutcome::Linked
                    }
                    Err(_) => AddOutcome::Contended,
                };
            }

            let entry = unsafe { &*cursor };
            if entry.key_hash == cand.key_hash && entry.key == cand.key {
                return self.replace_value(cursor, candidate, guard);
            }
            prev_link = &entry.next;
            cursor = entry.next.load(Ordering::Acquire);
        }
    }

    /// Moves the candidate's value box into `existing` and frees the
    /// candidate shell. Clearing the tombstone after the value store
    /// means a reader that observes the entry as live also observes a
    /// current value.
    fn replace_value<const LOCAL_GC_BUFFER_SIZE: usize>(
        &self,
        existing: *mut Entry<K, V>,
        candidate: *mut Entry<K, V>,
        guard: &mut Guard<'_, Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
    ) -> AddOutcome<K, V> {
        let entry = unsafe { &*existing };
        let value = take_value(candidate);
        discard(candidate);

        let replaced = entry.value.swap(value, Ordering::AcqRel);
        guard.defer_drop(Deferred::Value(unsafe { Box::from_raw(replaced) }));

        if entry.deleted.swap(false, Ordering::AcqRel) {
            self.len.fetch_add(1, Ordering::Relaxed);
            AddOutcome::Resurrected(existing)
        } else {
            AddOutcome::Overwrote
        }
    }

    /// Compare-and-swap flavor of [`List::add`].
    ///
    /// The key-present path requires the live entry's current value to
    /// equal `expected` and installs the candidate's value through a
    /// pointer CAS, failing (without retry) when a concurrent writer
    /// got there first. `expected == None` means "only when the key is
    /// absent or tombstoned". On [`CasOutcome::Contended`] the
    /// candidate remains owned by the caller; every other outcome
    /// consumes it.
    pub(crate) fn cas<const LOCAL_GC_BUFFER_SIZE: usize>(
        &self,
        candidate: *mut Entry<K, V>,
        expected: Option<&V>,
        start: *mut Entry<K, V>,
        guard: &mut Guard<'_, Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
    ) -> CasOutcome<K, V>
    where
        V: PartialEq,
    {
        let cand = unsafe { &*candidate };

        let (mut prev_link, mut cursor) =
            if start.is_null() || unsafe { &*start }.key_hash > cand.key_hash {
                (&self.head, self.head.load(Ordering::Acquire))
            } else {
                let entry = unsafe { &*start };
                if entry.key_hash == cand.key_hash && entry.key == cand.key {
                    return self.swap_value(start, candidate, expected, guard);
                }
                (&entry.next, entry.next.load(Ordering::Acquire))
            };

        loop {
            let past = cursor.is_null() || unsafe { &*cursor }.key_hash > cand.key_hash;
            if past {
                if expected.is_some() {
                    // expecting a value on an absent key
                    discard(candidate);
                    return CasOutcome::Failed;
                }
                cand.next.store(cursor, Ordering::Release);
                if debug_delay() {
                    return CasOutcome::Contended;
                }
                return match prev_link.compare_exchange(
                    cursor,
                    candidate,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        self.len.fetch_add(1, Ordering::Relaxed);
                        CasOutcome::Linked
                    }
                    Err(_) => CasOutcome::Contended,
                };
            }

            let entry = unsafe { &*cursor };
            if entry.key_hash == cand.key_hash && entry.key == cand.key {
                return self.swap_value(cursor, candidate, expected, guard);
            }
            prev_link = &entry.next;
            cursor = entry.next.load(Ordering::Acquire);
        }
    }

    /// Key-present half of [`List::cas`].
    fn swap_value<const LOCAL_GC_BUFFER_SIZE: usize>(
        &self,
        existing: *mut Entry<K, V>,
        candidate: *mut Entry<K, V>,
        expected: Option<&V>,
        guard: &mut Guard<'_, Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
    ) -> CasOutcome<K, V>
    where
        V: PartialEq,
    {
        let entry = unsafe { &*existing };

        if entry.is_deleted() {
            if expected.is_some() {
                discard(candidate);
                return CasOutcome::Failed;
            }
            // claim the tombstone first so that exactly one of any
            // number of concurrent resurrectors succeeds
            if entry
                .deleted
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                discard(candidate);
                return CasOutcome::Failed;
            }
            self.len.fetch_add(1, Ordering::Relaxed);
            let value = take_value(candidate);
            discard(candidate);
            let replaced = entry.value.swap(value, Ordering::AcqRel);
            guard.defer_drop(Deferred::Value(unsafe { Box::from_raw(replaced) }));
            return CasOutcome::Resurrected(existing);
        }

        let Some(expected) = expected else {
            discard(candidate);
            return CasOutcome::Failed;
        };

        let current = entry.value.load(Ordering::Acquire);
        if unsafe { &*current } != expected {
            discard(candidate);
            return CasOutcome::Failed;
        }

        let value = take_value(candidate);
        match entry
            .value
            .compare_exchange(current, value, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(replaced) => {
                guard.defer_drop(Deferred::Value(unsafe { Box::from_raw(replaced) }));
                discard(candidate);
                CasOutcome::Swapped
            }
            Err(_) => {
                // a concurrent writer moved the value after our
                // equality check; the caller's expectation is stale
                drop(unsafe { Box::from_raw(value) });
                discard(candidate);
                CasOutcome::Failed
            }
        }
    }

    /// Sets the tombstone flag. The first transition from live to
    /// tombstoned decrements the live count; repeated deletions are
    /// no-ops. The entry stays linked so that directory slots and
    /// in-flight walks remain valid.
    pub(crate) fn delete(&self, entry: &Entry<K, V>) {
        if !entry.deleted.swap(true, Ordering::AcqRel) {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Prehashed;
    use ebr::Ebr;

    fn collect_hashes(list: &List<Prehashed, u64>) -> Vec<u64> {
        let mut out = vec![];
        let mut cursor = list.first();
        while !cursor.is_null() {
            let entry = unsafe { &*cursor };
            out.push(entry.key_hash);
            cursor = entry.next.load(Ordering::Acquire);
        }
        out
    }

    #[test]
    fn add_keeps_hash_order() {
        let ebr: Ebr<Deferred<Prehashed, u64>, 128> = Ebr::default();
        let mut guard = ebr.pin();
        let list = List::default();

        for hash in [7, 3, 9, 1, 5] {
            let candidate = Entry::allocate(Prehashed(hash), hash, hash);
            assert!(matches!(
                list.add(candidate, ptr::null_mut(), &mut guard),
                AddOutcome::Linked
            ));
        }

        assert_eq!(collect_hashes(&list), vec![1, 3, 5, 7, 9]);
        assert_eq!(list.len(), 5);
    }

    #[test]
    fn add_overwrites_in_place() {
        let ebr: Ebr<Deferred<Prehashed, u64>, 128> = Ebr::default();
        let mut guard = ebr.pin();
        let list = List::default();

        let first = Entry::allocate(Prehashed(4), 4, 40);
        assert!(matches!(
            list.add(first, ptr::null_mut(), &mut guard),
            AddOutcome::Linked
        ));
        let second = Entry::allocate(Prehashed(4), 4, 44);
        assert!(matches!(
            list.add(second, ptr::null_mut(), &mut guard),
            AddOutcome::Overwrote
        ));

        assert_eq!(list.len(), 1);
        let entry = unsafe { &*list.first() };
        assert_eq!(unsafe { &*entry.value.load(Ordering::Acquire) }, &44);
    }

    #[test]
    fn delete_then_resurrect() {
        let ebr: Ebr<Deferred<Prehashed, u64>, 128> = Ebr::default();
        let mut guard = ebr.pin();
        let list = List::default();

        let entry = Entry::allocate(Prehashed(8), 8, 80);
        list.add(entry, ptr::null_mut(), &mut guard);
        list.delete(unsafe { &*entry });
        list.delete(unsafe { &*entry });
        assert_eq!(list.len(), 0);

        let replacement = Entry::allocate(Prehashed(8), 8, 88);
        assert!(matches!(
            list.add(replacement, ptr::null_mut(), &mut guard),
            AddOutcome::Resurrected(e) if e == entry
        ));
        assert_eq!(list.len(), 1);
        assert!(!unsafe { &*entry }.is_deleted());
    }

    #[test]
    fn oversized_start_falls_back_to_head() {
        let ebr: Ebr<Deferred<Prehashed, u64>, 128> = Ebr::default();
        let mut guard = ebr.pin();
        let list = List::default();

        let anchor = Entry::allocate(Prehashed(100), 100, 0);
        list.add(anchor, ptr::null_mut(), &mut guard);

        // an entry point with a larger hash cannot reach the
        // candidate's splice position; the walk restarts at the head
        let candidate = Entry::allocate(Prehashed(10), 10, 0);
        assert!(matches!(
            list.add(candidate, anchor, &mut guard),
            AddOutcome::Linked
        ));
        assert_eq!(collect_hashes(&list), vec![10, 100]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn cas_requires_expectation_to_hold() {
        let ebr: Ebr<Deferred<Prehashed, u64>, 128> = Ebr::default();
        let mut guard = ebr.pin();
        let list = List::default();

        let candidate = Entry::allocate(Prehashed(5), 5, 50);
        assert!(matches!(
            list.cas(candidate, None, ptr::null_mut(), &mut guard),
            CasOutcome::Linked
        ));

        // wrong expectation
        let candidate = Entry::allocate(Prehashed(5), 5, 51);
        assert!(matches!(
            list.cas(candidate, Some(&49), ptr::null_mut(), &mut guard),
            CasOutcome::Failed
        ));

        // absent-key expectation on a live key
        let candidate = Entry::allocate(Prehashed(5), 5, 52);
        assert!(matches!(
            list.cas(candidate, None, ptr::null_mut(), &mut guard),
            CasOutcome::Failed
        ));

        // correct expectation
        let candidate = Entry::allocate(Prehashed(5), 5, 53);
        assert!(matches!(
            list.cas(candidate, Some(&50), ptr::null_mut(), &mut guard),
            CasOutcome::Swapped
        ));
        let entry = unsafe { &*list.first() };
        assert_eq!(unsafe { &*entry.value.load(Ordering::Acquire) }, &53);
    }

    #[test]
    fn cas_on_tombstone_needs_null_expectation() {
        let ebr: Ebr<Deferred<Prehashed, u64>, 128> = Ebr::default();
        let mut guard = ebr.pin();
        let list = List::default();

        let entry = Entry::allocate(Prehashed(6), 6, 60);
        list.add(entry, ptr::null_mut(), &mut guard);
        list.delete(unsafe { &*entry });

        let candidate = Entry::allocate(Prehashed(6), 6, 61);
        assert!(matches!(
            list.cas(candidate, Some(&60), ptr::null_mut(), &mut guard),
            CasOutcome::Failed
        ));

        let candidate = Entry::allocate(Prehashed(6), 6, 62);
        assert!(matches!(
            list.cas(candidate, None, ptr::null_mut(), &mut guard),
            CasOutcome::Resurrected(e) if e == entry
        ));
        assert_eq!(list.len(), 1);
    }
}
