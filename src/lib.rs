#![cfg_attr(
    test,
    deny(
        missing_docs,
        future_incompatible,
        nonstandard_style,
        rust_2018_idioms,
        missing_copy_implementations,
        trivial_casts,
        trivial_numeric_casts,
        unused_qualifications,
    )
)]
#![cfg_attr(test, deny(
    clippy::cast_lossless,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::decimal_literal_representation,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::explicit_into_iter_loop,
    clippy::explicit_iter_loop,
    clippy::expl_impl_clone_on_copy,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::get_unwrap,
    clippy::if_not_else,
    clippy::inline_always,
    clippy::invalid_upcast_comparisons,
    clippy::items_after_statements,
    clippy::manual_find_map,
    clippy::map_entry,
    clippy::map_flatten,
    clippy::match_like_matches_macro,
    clippy::match_same_arms,
    clippy::maybe_infinite_iter,
    clippy::mem_forget,
    clippy::multiple_inherent_impl,
    clippy::mut_mut,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::needless_pass_by_value,
    clippy::non_ascii_literal,
    clippy::path_buf_push_overwrite,
    clippy::redundant_closure_for_method_calls,
    clippy::shadow_reuse,
    clippy::shadow_same,
    clippy::shadow_unrelated,
    clippy::single_match_else,
    clippy::string_add,
    clippy::string_add_assign,
    clippy::type_repetition_in_bounds,
    clippy::unicode_not_nfc,
    clippy::unimplemented,
    clippy::unseparated_literal_suffix,
    clippy::used_underscore_binding,
    clippy::wildcard_dependencies,
))]
#![cfg_attr(
    test,
    warn(
        clippy::missing_const_for_fn,
        clippy::multiple_crate_versions,
        clippy::wildcard_enum_match_arm,
    )
)]

//! A lock-free hash map optimized for workloads that are dominated by
//! reads, with occasional inserts, deletes and compare-and-swap
//! updates.
//!
//! Two structures cooperate: a singly linked list holds every entry
//! sorted by its 64-bit key hash, and a power-of-two *directory* of
//! atomic pointers acts as a jump table into that list, addressed by
//! the top bits of the hash. Reads load the current directory
//! snapshot, jump to their bucket's entry point, and walk a handful
//! of `next` pointers; they take no locks and write no shared memory.
//! Writers splice entries into the list with compare-and-swap and
//! then advertise themselves in the directory. When the directory
//! fills past 50% of its slots it is doubled: a fresh snapshot is
//! rebuilt from the list, swapped in atomically, and rebuilt once
//! more to absorb concurrent writers, while readers continue
//! unimpeded on whichever snapshot they already hold. Replaced
//! values and abandoned snapshots are retired through the epoch-based
//! reclamation provided by the `ebr` crate, so readers never touch
//! freed memory.
//!
//! Keys implement the [`Hash64`] capability (provided for bytes,
//! strings, integers and small tuples, or via the [`Prehashed`]
//! wrapper); values only need to be `Clone`, as [`JumpMap::get`]
//! hands out clones rather than references so that no locks have to
//! outlive a lookup. Atomic conditional updates are available through
//! [`JumpMap::cas`].
//!
//! Deleted keys leave a tombstone in the list which readers skip;
//! re-inserting the key revives the tombstone in place. Iteration is
//! a lazy, single pass in hash order that reflects concurrent updates
//! as it encounters them.

mod directory;
mod hash;
mod list;
#[cfg(feature = "serde")]
mod serde;

pub use hash::{Hash64, Prehashed};

use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::{Arc, Mutex};

use ebr::{Ebr, Guard};

use directory::Directory;
use list::{AddOutcome, CasOutcome, Entry, List};

/// Percentage of occupied directory slots that triggers an automatic
/// doubling of the directory on the next insert.
pub const MAX_FILL_RATE: u64 = 50;

const INITIAL_DIRECTORY_SIZE: u64 = 8;

#[cfg(not(feature = "fault_injection"))]
#[inline]
const fn debug_delay() -> bool {
    false
}

/// Induces random jitter into the CAS retry loops, shaking out more
/// interleavings quickly under test. Fully eliminated by the compiler
/// in non-test code.
#[cfg(feature = "fault_injection")]
fn debug_delay() -> bool {
    use std::thread;

    use rand::{thread_rng, Rng};

    let mut rng = thread_rng();

    match rng.gen_range(0..100) {
        0..=98 => false,
        _ => {
            thread::yield_now();
            true
        }
    }
}

/// Allocations that may still be referenced by concurrent readers,
/// queued for epoch-based reclamation.
enum Deferred<K: 'static, V: 'static> {
    Value(Box<V>),
    Directory(Box<Directory<K, V>>),
}

struct Inner<K, V>
where
    K: 'static + Hash64 + Send + Sync,
    V: 'static + Send + Sync,
{
    list: List<K, V>,
    directory: AtomicPtr<Directory<K, V>>,
    // serializes resize attempts; every other operation is lock-free
    resize_lock: Mutex<()>,
}

impl<K, V> Drop for Inner<K, V>
where
    K: 'static + Hash64 + Send + Sync,
    V: 'static + Send + Sync,
{
    fn drop(&mut self) {
        let directory = *self.directory.get_mut();
        drop(unsafe { Box::from_raw(directory) });
    }
}

/// A lock-free, read-optimized concurrent hash map.
///
/// Note that this structure is `Send` but NOT `Sync`, despite being a
/// lock-free map. This is because the inner reclamation system,
/// provided by the `ebr` crate, completely avoids atomic operations
/// in its hot path for efficiency. If you want to share [`JumpMap`]
/// between threads, simply clone it, and this will set up a new
/// efficient thread-local memory reclamation state while sharing the
/// underlying map.
///
/// Lookups, inserts, deletes and [`JumpMap::cas`] are lock-free: a
/// stalled thread can never block another, although writers may retry
/// internally under contention. Only directory resizes serialize,
/// behind a mutex that no other operation touches.
///
/// The `LOCAL_GC_BUFFER_SIZE` const generic must be greater than 0.
/// It controls the granularity of epoch-based reclamation: garbage is
/// buffered in fixed-size thread-local arrays and collected once an
/// array fills up. Lower values release replaced values sooner, at
/// some cost in efficiency.
///
/// # Examples
///
/// ```
/// let map = jump_map::JumpMap::<u64, u64>::default();
///
/// map.insert(1, 10);
/// assert_eq!(map.get(&1), Some(10));
/// assert_eq!(map.len(), 1);
///
/// // overwrites happen in place
/// map.insert(1, 11);
/// assert_eq!(map.get(&1), Some(11));
/// assert_eq!(map.len(), 1);
///
/// // conditional update
/// assert!(map.cas(1, Some(&11), 12));
///
/// map.remove(&1);
/// assert_eq!(map.get(&1), None);
/// ```
///
/// Sharing between threads:
///
/// ```
/// let map = jump_map::JumpMap::<u64, u64>::default();
///
/// let mut handles = vec![];
/// for t in 0..4_u64 {
///     let map = map.clone();
///     handles.push(std::thread::spawn(move || map.insert(t, t)));
/// }
/// for handle in handles {
///     handle.join().unwrap();
/// }
///
/// assert_eq!(map.len(), 4);
/// ```
#[derive(Clone)]
pub struct JumpMap<K, V, const LOCAL_GC_BUFFER_SIZE: usize = 128>
where
    K: 'static + Hash64 + Clone + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    // epoch-based reclamation
    ebr: Ebr<Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
    // the list, the current directory snapshot and the resize mutex,
    // shared by every clone of this handle
    inner: Arc<Inner<K, V>>,
}

impl<K, V, const LOCAL_GC_BUFFER_SIZE: usize> Default for JumpMap<K, V, LOCAL_GC_BUFFER_SIZE>
where
    K: 'static + Hash64 + Clone + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    fn default() -> JumpMap<K, V, LOCAL_GC_BUFFER_SIZE> {
        JumpMap::with_directory_size(INITIAL_DIRECTORY_SIZE)
    }
}

impl<K, V, const LOCAL_GC_BUFFER_SIZE: usize> JumpMap<K, V, LOCAL_GC_BUFFER_SIZE>
where
    K: 'static + Hash64 + Clone + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    /// Creates an empty map with the default directory size of 8.
    ///
    /// # Examples
    /// ```
    /// use jump_map::JumpMap;
    ///
    /// let map: JumpMap<u64, u64> = JumpMap::new();
    /// assert!(map.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty map whose directory has at least `size`
    /// slots, rounded up to the next power of two. Useful to avoid
    /// early resizes when the eventual population is known.
    ///
    /// # Examples
    /// ```
    /// use jump_map::JumpMap;
    ///
    /// let map: JumpMap<u64, u64> = JumpMap::with_directory_size(1000);
    /// map.insert(1, 1);
    /// assert_eq!(map.get(&1), Some(1));
    /// ```
    pub fn with_directory_size(size: u64) -> Self {
        assert!(
            LOCAL_GC_BUFFER_SIZE > 0,
            "LOCAL_GC_BUFFER_SIZE must be greater than 0"
        );

        let directory = Box::into_raw(Box::new(Directory::new(size)));

        JumpMap {
            ebr: Ebr::default(),
            inner: Arc::new(Inner {
                list: List::default(),
                directory: AtomicPtr::new(directory),
                resize_lock: Mutex::new(()),
            }),
        }
    }

    /// Dereferences the current directory snapshot. The caller must
    /// hold `_guard` for as long as the returned reference is used;
    /// the snapshot may be retired by a concurrent resize at any
    /// moment after the load.
    fn current_directory<'a>(
        &'a self,
        _guard: &Guard<'_, Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
    ) -> &'a Directory<K, V> {
        unsafe { &*self.inner.directory.load(Ordering::Acquire) }
    }

    /// Atomically looks up the value associated with `key`, returning
    /// a clone of it.
    ///
    /// # Examples
    /// ```
    /// let map = jump_map::JumpMap::<u64, u64>::default();
    ///
    /// map.insert(1, 1);
    ///
    /// assert_eq!(map.get(&0), None);
    /// assert_eq!(map.get(&1), Some(1));
    /// ```
    pub fn get(&self, key: &K) -> Option<V> {
        let guard = self.ebr.pin();

        let key_hash = key.hash64();
        let directory = self.current_directory(&guard);
        let found = self
            .inner
            .list
            .find(key_hash, key, directory.bucket(key_hash));

        if found.is_null() {
            return None;
        }
        let entry = unsafe { &*found };
        if entry.is_deleted() {
            return None;
        }

        let value = entry.value.load(Ordering::Acquire);
        Some(unsafe { &*value }.clone())
    }

    /// Returns `true` if the map contains the specified key.
    ///
    /// # Examples
    /// ```
    /// let map = jump_map::JumpMap::<u64, u64>::default();
    ///
    /// map.insert(1, 1);
    ///
    /// assert!(map.contains_key(&1));
    /// assert!(!map.contains_key(&2));
    /// ```
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Inserts or overwrites the value stored under `key`.
    ///
    /// An existing entry is updated in place with an atomic pointer
    /// swap; a deleted entry is revived. New entries are spliced into
    /// the hash-sorted list and advertised in the directory, which
    /// may trigger a directory doubling once more than
    /// [`MAX_FILL_RATE`] percent of its slots are occupied.
    ///
    /// # Examples
    /// ```
    /// let map = jump_map::JumpMap::<u64, u64>::default();
    ///
    /// map.insert(1, 10);
    /// map.insert(1, 11);
    ///
    /// assert_eq!(map.get(&1), Some(11));
    /// assert_eq!(map.len(), 1);
    /// ```
    pub fn insert(&self, key: K, value: V) {
        let mut guard = self.ebr.pin();

        let key_hash = key.hash64();
        let candidate = Entry::allocate(key, key_hash, value);

        loop {
            let directory = self.current_directory(&guard);
            let start = directory.bucket(key_hash);

            match self.inner.list.add(candidate, start, &mut guard) {
                AddOutcome::Contended => continue,
                AddOutcome::Overwrote => return,
                AddOutcome::Linked => {
                    self.register(directory, candidate, &mut guard);
                    return;
                }
                AddOutcome::Resurrected(existing) => {
                    self.register(directory, existing, &mut guard);
                    return;
                }
            }
        }
    }

    /// Atomically compares the value stored under `key` with
    /// `expected` and replaces it with `new` if they are equal,
    /// returning whether the swap was performed.
    ///
    /// `expected == None` means "only when the key is absent or
    /// deleted", turning `cas` into an insert-if-absent. A `false`
    /// result means the expectation did not hold at the moment of the
    /// attempt, possibly because a concurrent writer interfered; the
    /// map is unchanged in that case.
    ///
    /// # Examples
    /// ```
    /// let map = jump_map::JumpMap::<u64, u64>::default();
    ///
    /// // create only if absent
    /// assert!(map.cas(1, None, 10));
    /// assert!(!map.cas(1, None, 11));
    ///
    /// // swap 10 for 20
    /// assert!(map.cas(1, Some(&10), 20));
    ///
    /// // the old expectation no longer holds
    /// assert!(!map.cas(1, Some(&10), 30));
    ///
    /// assert_eq!(map.get(&1), Some(20));
    /// ```
    pub fn cas(&self, key: K, expected: Option<&V>, new: V) -> bool
    where
        V: PartialEq,
    {
        let mut guard = self.ebr.pin();

        let key_hash = key.hash64();
        let candidate = Entry::allocate(key, key_hash, new);

        loop {
            let directory = self.current_directory(&guard);
            let start = directory.bucket(key_hash);

            match self.inner.list.cas(candidate, expected, start, &mut guard) {
                CasOutcome::Contended => continue,
                CasOutcome::Failed => return false,
                CasOutcome::Swapped => return true,
                CasOutcome::Linked => {
                    self.register(directory, candidate, &mut guard);
                    return true;
                }
                CasOutcome::Resurrected(existing) => {
                    self.register(directory, existing, &mut guard);
                    return true;
                }
            }
        }
    }

    /// Removes `key` from the map. Removing an absent key is a no-op.
    ///
    /// The entry is tombstoned rather than unlinked, so concurrent
    /// readers and directory slots that point at it stay valid;
    /// re-inserting the key later revives the entry in place.
    ///
    /// # Examples
    /// ```
    /// let map = jump_map::JumpMap::<u64, u64>::default();
    ///
    /// map.insert(1, 1);
    /// map.remove(&1);
    /// map.remove(&2);
    ///
    /// assert_eq!(map.get(&1), None);
    /// assert_eq!(map.len(), 0);
    /// ```
    pub fn remove(&self, key: &K) {
        let guard = self.ebr.pin();

        let key_hash = key.hash64();
        let directory = self.current_directory(&guard);
        let found = self
            .inner
            .list
            .find(key_hash, key, directory.bucket(key_hash));

        if !found.is_null() {
            self.inner.list.delete(unsafe { &*found });
        }
    }

    /// Number of live entries in the map.
    ///
    /// # Examples
    /// ```
    /// let map = jump_map::JumpMap::<u64, u64>::default();
    ///
    /// map.insert(1, 1);
    /// map.insert(1, 2);
    /// assert_eq!(map.len(), 1);
    ///
    /// map.remove(&1);
    /// assert_eq!(map.len(), 0);
    /// ```
    pub fn len(&self) -> u64 {
        self.inner.list.len()
    }

    /// Returns `true` if the map holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Percentage of directory slots that currently hold an entry
    /// pointer. Inserts keep this at or below [`MAX_FILL_RATE`] by
    /// doubling the directory, except transiently while concurrent
    /// writers race a resize.
    ///
    /// # Examples
    /// ```
    /// use jump_map::{JumpMap, Prehashed};
    ///
    /// let map = JumpMap::<Prehashed, u64>::with_directory_size(4);
    /// map.insert(Prehashed(0), 0); // bucket 0
    /// map.insert(Prehashed(1 << 62), 1); // bucket 1
    ///
    /// assert_eq!(map.fill_rate(), 50);
    /// ```
    pub fn fill_rate(&self) -> u64 {
        let guard = self.ebr.pin();
        let directory = self.current_directory(&guard);
        (directory.occupied() * 100) / directory.slot_count()
    }

    /// Rebuilds the directory with at least `size` slots, rounded up
    /// to the next power of two; `0` doubles the current size. The
    /// list is untouched and every live entry remains retrievable.
    /// Readers continue on the previous snapshot until they next load
    /// the directory; the snapshot swap itself is atomic.
    ///
    /// Inserts call this automatically; it only needs to be invoked
    /// directly to pre-size the directory before a bulk load.
    ///
    /// # Examples
    /// ```
    /// let map = jump_map::JumpMap::<u64, u64>::default();
    ///
    /// for i in 0..64 {
    ///     map.insert(i, i);
    /// }
    /// map.grow(4096);
    /// for i in 0..64 {
    ///     assert_eq!(map.get(&i), Some(i));
    /// }
    /// ```
    pub fn grow(&self, size: u64) {
        let mut guard = self.ebr.pin();
        let _resize = match self.inner.resize_lock.lock() {
            Ok(locked) => locked,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.grow_locked(size, &mut guard);
    }

    /// Iterates over the live entries of the map in `key_hash` order,
    /// yielding cloned key/value pairs.
    ///
    /// This is a lazy, single pass over the list, not an atomic
    /// snapshot: entries inserted behind the cursor during iteration
    /// are observed, entries inserted before it are not, and an entry
    /// deleted after being yielded is yielded nonetheless. The
    /// iterator holds an epoch guard, so dropping it mid-way is
    /// cheap and never blocks writers.
    ///
    /// # Examples
    /// ```
    /// use jump_map::{JumpMap, Prehashed};
    ///
    /// let map = JumpMap::<Prehashed, u64>::default();
    /// map.insert(Prehashed(2), 2);
    /// map.insert(Prehashed(1), 1);
    /// map.insert(Prehashed(3), 3);
    /// map.remove(&Prehashed(2));
    ///
    /// let items: Vec<(Prehashed, u64)> = map.iter().collect();
    /// assert_eq!(items, vec![(Prehashed(1), 1), (Prehashed(3), 3)]);
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V, LOCAL_GC_BUFFER_SIZE> {
        let guard = self.ebr.pin();

        Iter {
            cursor: self.inner.list.first(),
            _guard: guard,
        }
    }

    /// Advertises `entry` in the directory and grows the directory
    /// when its fill rate passed the threshold. If a resize swapped
    /// the snapshot while we were installing, the entry is
    /// re-registered with the latest snapshot: the resizer's rebuild
    /// may have walked the list before the entry was linked.
    fn register<'a>(
        &'a self,
        directory: &'a Directory<K, V>,
        entry: *mut Entry<K, V>,
        guard: &mut Guard<'_, Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
    ) {
        let mut directory = directory;
        loop {
            let occupied = directory.install(entry);

            if occupied != 0 {
                let fill_rate = (occupied * 100) / directory.slot_count();
                if fill_rate > MAX_FILL_RATE {
                    let _resize = match self.inner.resize_lock.lock() {
                        Ok(locked) => locked,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    let current = self.inner.directory.load(Ordering::Acquire);
                    if ptr::eq(current, directory) {
                        // nobody else resized since we observed this
                        // snapshot
                        self.grow_locked(0, guard);
                    }
                }
            }

            // orders the entry's link and install before the snapshot
            // load: either the resize's post-swap rebuild observes the
            // entry in the list, or this load observes the swapped
            // snapshot and re-registers
            std::sync::atomic::fence(Ordering::SeqCst);
            let current = self.current_directory(guard);
            if ptr::eq(current, directory) {
                return;
            }
            directory = current;
        }
    }

    /// Replaces the directory with a freshly rebuilt snapshot of at
    /// least `size` slots (`0` doubles). Must be called with the
    /// resize mutex held.
    fn grow_locked(
        &self,
        size: u64,
        guard: &mut Guard<'_, Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
    ) {
        let retired = self.inner.directory.load(Ordering::Acquire);
        let target = if size == 0 {
            unsafe { &*retired }.slot_count() * 2
        } else {
            size
        };

        let replacement = Box::into_raw(Box::new(Directory::new(target)));
        let directory = unsafe { &*replacement };

        // first pass: index every live entry reachable right now
        self.fill_directory(directory);
        self.inner.directory.store(replacement, Ordering::Release);
        // the swap must be visible before the second pass walks the
        // list; pairs with the fence in `register`
        std::sync::atomic::fence(Ordering::SeqCst);
        // second pass: absorb entries that writers linked while the
        // old snapshot was still current; without it they would only
        // be advertised in the snapshot we are about to retire
        self.fill_directory(directory);

        guard.defer_drop(Deferred::Directory(unsafe { Box::from_raw(retired) }));
    }

    /// Walks the list head to tail and installs the first live entry
    /// of every bucket into `directory`.
    fn fill_directory(&self, directory: &Directory<K, V>) {
        let first = self.inner.list.first();
        let mut cursor = first;
        let mut last_index = 0;

        while !cursor.is_null() {
            let entry = unsafe { &*cursor };
            let index = directory.bucket_index(entry.key_hash);
            if cursor == first || index != last_index {
                if !entry.is_deleted() {
                    directory.install(cursor);
                    last_index = index;
                }
            }
            cursor = entry.next.load(Ordering::Acquire);
        }
    }
}

/// An iterator over a [`JumpMap`], created by [`JumpMap::iter`].
///
/// Yields live entries in `key_hash` order. This is not an atomic
/// snapshot of the map; see [`JumpMap::iter`] for the exact
/// visibility contract. The iterator holds an epoch-based reclamation
/// guard, so the map cannot free replaced values until it is dropped.
pub struct Iter<'a, K, V, const LOCAL_GC_BUFFER_SIZE: usize = 128>
where
    K: 'static + Hash64 + Clone + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    cursor: *mut Entry<K, V>,
    _guard: Guard<'a, Deferred<K, V>, LOCAL_GC_BUFFER_SIZE>,
}

impl<K, V, const LOCAL_GC_BUFFER_SIZE: usize> Iterator for Iter<'_, K, V, LOCAL_GC_BUFFER_SIZE>
where
    K: 'static + Hash64 + Clone + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        while !self.cursor.is_null() {
            let entry = unsafe { &*self.cursor };
            self.cursor = entry.next.load(Ordering::Acquire);

            if entry.is_deleted() {
                continue;
            }
            let value = entry.value.load(Ordering::Acquire);
            return Some((entry.key.clone(), unsafe { &*value }.clone()));
        }
        None
    }
}

impl<K, V, const LOCAL_GC_BUFFER_SIZE: usize> fmt::Display for JumpMap<K, V, LOCAL_GC_BUFFER_SIZE>
where
    K: 'static + Hash64 + Clone + Send + Sync + fmt::Display,
    V: 'static + Clone + Send + Sync,
{
    /// Renders the live keys in iteration order.
    ///
    /// # Examples
    /// ```
    /// use jump_map::{JumpMap, Prehashed};
    ///
    /// let map = JumpMap::<Prehashed, &'static str>::default();
    /// assert_eq!(map.to_string(), "[]");
    ///
    /// map.insert(Prehashed(0), "zero");
    /// assert_eq!(map.to_string(), "[0]");
    ///
    /// map.insert(Prehashed(1 << 62), "mid");
    /// assert_eq!(map.to_string(), "[0,4611686018427387904]");
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let _guard = self.ebr.pin();

        write!(f, "[")?;
        let mut cursor = self.inner.list.first();
        let mut first = true;
        while !cursor.is_null() {
            let entry = unsafe { &*cursor };
            if !entry.is_deleted() {
                if !first {
                    write!(f, ",")?;
                }
                write!(f, "{}", entry.key)?;
                first = false;
            }
            cursor = entry.next.load(Ordering::Acquire);
        }
        write!(f, "]")
    }
}

impl<K, V, const LOCAL_GC_BUFFER_SIZE: usize> fmt::Debug for JumpMap<K, V, LOCAL_GC_BUFFER_SIZE>
where
    K: 'static + fmt::Debug + Hash64 + Clone + Send + Sync,
    V: 'static + fmt::Debug + Clone + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JumpMap ")?;
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, const LOCAL_GC_BUFFER_SIZE: usize> PartialEq for JumpMap<K, V, LOCAL_GC_BUFFER_SIZE>
where
    K: 'static + Hash64 + Clone + Send + Sync,
    V: 'static + Clone + Send + Sync + PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }

        let mut other_iter = other.iter();
        for kv in self.iter() {
            if Some(kv) != other_iter.next() {
                return false;
            }
        }
        other_iter.next().is_none()
    }
}

impl<K, V, const LOCAL_GC_BUFFER_SIZE: usize> FromIterator<(K, V)>
    for JumpMap<K, V, LOCAL_GC_BUFFER_SIZE>
where
    K: 'static + Hash64 + Clone + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = JumpMap::default();

        for (k, v) in iter {
            map.insert(k, v);
        }

        map
    }
}

impl<'a, K, V, const LOCAL_GC_BUFFER_SIZE: usize> IntoIterator
    for &'a JumpMap<K, V, LOCAL_GC_BUFFER_SIZE>
where
    K: 'static + Hash64 + Clone + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    type Item = (K, V);
    type IntoIter = Iter<'a, K, V, LOCAL_GC_BUFFER_SIZE>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// This ensures that JumpMap is Send and Clone.
const fn _test_impls() {
    const fn send<T: Send>() {}
    const fn clone<T: Clone>() {}
    send::<JumpMap<u64, u64>>();
    clone::<JumpMap<u64, u64>>();
}

#[test]
fn basic_map() {
    let map = JumpMap::<u64, u64>::default();

    let n = 1024;
    for i in 0..n {
        assert_eq!(map.get(&i), None);
        map.insert(i, i);
        assert_eq!(map.get(&i), Some(i), "failed to get key {i}");
    }
    assert_eq!(map.len(), n);

    // iteration is hash-ordered and sees every live entry
    let hashes: Vec<u64> = map.iter().map(|(k, _v)| k.hash64()).collect();
    assert_eq!(hashes.len(), n as usize);
    let mut sorted = hashes.clone();
    sorted.sort_unstable();
    assert_eq!(hashes, sorted);

    for i in 0..n {
        map.remove(&i);
    }
    assert_eq!(map.len(), 0);
    assert_eq!(map.iter().count(), 0);

    // tombstoned keys can be written again
    for i in 0..n {
        map.insert(i, i * 2);
        assert_eq!(map.get(&i), Some(i * 2), "failed to get key {i}");
    }
    assert_eq!(map.len(), n);
}

#[test]
fn eq_ignores_tombstones() {
    let a = JumpMap::<u64, u64>::default();
    let b = JumpMap::<u64, u64>::default();
    assert_eq!(a, b);

    a.insert(1, 1);
    assert_ne!(a, b);

    b.insert(1, 1);
    assert_eq!(a, b);

    a.insert(2, 2);
    a.remove(&2);
    assert_eq!(a, b);
}

#[test]
fn collected_map_matches_source() {
    let data = vec![(1_u64, 10_u64), (2, 20), (3, 30)];

    let map: JumpMap<u64, u64> = data.iter().copied().collect();

    assert_eq!(map.len(), 3);
    for (k, v) in &data {
        assert_eq!(map.get(k), Some(*v));
    }

    let roundtrip: std::collections::HashMap<u64, u64> = (&map).into_iter().collect();
    assert_eq!(roundtrip, data.into_iter().collect());
}
