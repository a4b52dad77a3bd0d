use std::fmt;
use std::hash::BuildHasher;

use foldhash::fast::FixedState;

// Fixed seed so that hashes, and therefore list order and bucket
// placement, are stable for the lifetime of the process.
const SEED: u64 = 0x9e37_79b9_7f4a_7c15;

fn hash_bytes(bytes: &[u8]) -> u64 {
    FixedState::with_seed(SEED).hash_one(bytes)
}

/// The hashing capability required of every key stored in a
/// [`JumpMap`](crate::JumpMap).
///
/// The returned hash determines an entry's position in the internal
/// hash-sorted list as well as its directory bucket, so it must be
/// stable for the lifetime of the key.
///
/// Implementations must uphold `a == b` implies
/// `a.hash64() == b.hash64()`. Two unequal keys may collide on their
/// hash; the map disambiguates collisions with `Eq`.
///
/// Byte sequences, strings, primitive integers, `bool`, `char` and
/// small tuples of the above already implement this trait, using a
/// seeded [`foldhash`] of their canonical byte encoding. Keys that
/// already distribute well (or that need a precise list position)
/// can use [`Prehashed`], or implement the trait directly:
///
/// ```
/// use jump_map::Hash64;
///
/// #[derive(PartialEq, Eq, Clone)]
/// struct DeviceId(u32, u32);
///
/// impl Hash64 for DeviceId {
///     fn hash64(&self) -> u64 {
///         (u64::from(self.0) << 32) | u64::from(self.1)
///     }
/// }
///
/// let map = jump_map::JumpMap::<DeviceId, &'static str>::default();
/// map.insert(DeviceId(1, 2), "fan");
/// assert_eq!(map.get(&DeviceId(1, 2)), Some("fan"));
/// ```
pub trait Hash64: Eq {
    /// Returns the 64-bit hash of this key.
    fn hash64(&self) -> u64;
}

impl<T: Hash64 + ?Sized> Hash64 for &T {
    fn hash64(&self) -> u64 {
        (**self).hash64()
    }
}

impl Hash64 for [u8] {
    fn hash64(&self) -> u64 {
        hash_bytes(self)
    }
}

impl<const LEN: usize> Hash64 for [u8; LEN] {
    fn hash64(&self) -> u64 {
        hash_bytes(self)
    }
}

impl Hash64 for Vec<u8> {
    fn hash64(&self) -> u64 {
        hash_bytes(self)
    }
}

impl Hash64 for str {
    fn hash64(&self) -> u64 {
        hash_bytes(self.as_bytes())
    }
}

impl Hash64 for String {
    fn hash64(&self) -> u64 {
        hash_bytes(self.as_bytes())
    }
}

macro_rules! impl_le_bytes {
    ($($t:ty),+) => {
        $(
            impl Hash64 for $t {
                fn hash64(&self) -> u64 {
                    hash_bytes(&self.to_le_bytes())
                }
            }
        )*
    }
}

impl_le_bytes!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

impl Hash64 for bool {
    fn hash64(&self) -> u64 {
        hash_bytes(&[u8::from(*self)])
    }
}

impl Hash64 for char {
    fn hash64(&self) -> u64 {
        hash_bytes(&u32::from(*self).to_le_bytes())
    }
}

impl<A: Hash64, B: Hash64> Hash64 for (A, B) {
    fn hash64(&self) -> u64 {
        let mut bytes = [0_u8; 16];
        bytes[..8].copy_from_slice(&self.0.hash64().to_le_bytes());
        bytes[8..].copy_from_slice(&self.1.hash64().to_le_bytes());
        hash_bytes(&bytes)
    }
}

impl<A: Hash64, B: Hash64, C: Hash64> Hash64 for (A, B, C) {
    fn hash64(&self) -> u64 {
        let mut bytes = [0_u8; 24];
        bytes[..8].copy_from_slice(&self.0.hash64().to_le_bytes());
        bytes[8..16].copy_from_slice(&self.1.hash64().to_le_bytes());
        bytes[16..].copy_from_slice(&self.2.hash64().to_le_bytes());
        hash_bytes(&bytes)
    }
}

/// A key that is its own hash.
///
/// The wrapped value is used verbatim as the 64-bit hash, which makes
/// list order and bucket placement fully predictable: the directory
/// bucket for `Prehashed(h)` is `h >> shift`. Useful when keys were
/// already mixed by an upstream hash function, and for tests that
/// need to place keys in specific buckets.
///
/// ```
/// use jump_map::{JumpMap, Prehashed};
///
/// let map = JumpMap::<Prehashed, u64>::default();
/// map.insert(Prehashed(1 << 62), 1);
/// map.insert(Prehashed(0), 0);
///
/// // iteration follows hash order
/// let keys: Vec<Prehashed> = map.iter().map(|(k, _v)| k).collect();
/// assert_eq!(keys, vec![Prehashed(0), Prehashed(1 << 62)]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Prehashed(
    /// The hash, which doubles as the key.
    pub u64,
);

impl Hash64 for Prehashed {
    fn hash64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Prehashed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[test]
fn byte_views_agree() {
    assert_eq!("flamingo".hash64(), "flamingo".to_string().hash64());
    assert_eq!(b"flamingo"[..].hash64(), b"flamingo".to_vec().hash64());
    assert_eq!((*b"flamingo").hash64(), b"flamingo"[..].hash64());
}

#[test]
fn references_delegate() {
    let owned = 77_u64.hash64();
    assert_eq!((&77_u64).hash64(), owned);
    assert_eq!((&&77_u64).hash64(), owned);
}

#[test]
fn prehashed_is_identity() {
    assert_eq!(Prehashed(0).hash64(), 0);
    assert_eq!(Prehashed(u64::MAX).hash64(), u64::MAX);
    assert_eq!(Prehashed(42).to_string(), "42");
}

#[test]
fn integers_spread() {
    // not a distribution test, just a guard against the
    // all-keys-collide failure mode of a broken seed
    let hashes: std::collections::HashSet<u64> = (0_u64..1024).map(|i| i.hash64()).collect();
    assert_eq!(hashes.len(), 1024);
}
