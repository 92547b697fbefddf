//! Ring arithmetic over a fixed-size circular key space.
//!
//! Every position lives in `[0, N)` and all arithmetic wraps modulo `N`, so an
//! arc such as `[300,+90]` on a ring of 360 covers `300..359` followed by
//! `0..29` without any special casing by callers.

use std::fmt;
use std::hash::{BuildHasher, Hash};

use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher;

use crate::error::{Result, TopologyError};

#[derive(Clone, PartialEq, Debug, Default)]
pub struct DefaultHashBuilder;

impl BuildHasher for DefaultHashBuilder {
    type Hasher = SipHasher;

    fn build_hasher(&self) -> Self::Hasher {
        SipHasher::new()
    }
}

/// Circular key space of `N` positions.
///
/// Two [`KeyRange`]s can only be compared when they belong to the same key
/// space, which is the same as having the same ring size.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct KeySpace {
    length: u32,
}

impl KeySpace {
    /// Create a key space with `length` positions.
    pub fn new(length: u32) -> Result<KeySpace> {
        if length == 0 {
            return Err(TopologyError::InvalidRingSize);
        }
        Ok(KeySpace { length })
    }

    /// Number of positions on the ring.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Map a key onto the ring using [`DefaultHashBuilder`].
    ///
    /// The result is stable across processes: SipHash with fixed keys is used
    /// instead of the randomly seeded std hasher.
    pub fn hash<K: Hash + ?Sized>(&self, key: &K) -> u32 {
        self.hash_with(&DefaultHashBuilder, key)
    }

    /// Map a key onto the ring with a custom hash builder.
    pub fn hash_with<S: BuildHasher, K: Hash + ?Sized>(&self, hash_builder: &S, key: &K) -> u32 {
        (hash_builder.hash_one(key) % u64::from(self.length)) as u32
    }

    /// Build a range, validating `start` and `length` against this ring.
    pub fn try_range(&self, start: u32, length: u32) -> Result<KeyRange> {
        if start >= self.length || length == 0 || length > self.length {
            return Err(TopologyError::InvalidRange {
                start,
                length,
                ring: self.length,
            });
        }
        Ok(KeyRange {
            keyspace: *self,
            start,
            length,
        })
    }

    /// Build a range.
    ///
    /// # Panics
    ///
    /// If `start` is outside the ring or `length` is not in `1..=N`.
    pub fn range(&self, start: u32, length: u32) -> KeyRange {
        match self.try_range(start, length) {
            Ok(range) => range,
            Err(e) => panic!("{e}"),
        }
    }

    /// The range covering every position of the ring.
    pub fn full_range(&self) -> KeyRange {
        KeyRange {
            keyspace: *self,
            start: 0,
            length: self.length,
        }
    }

    /// Forward distance from position `from` to position `to`.
    pub fn clockwise(&self, from: u32, to: u32) -> u32 {
        let n = u64::from(self.length);
        ((u64::from(to) % n + n - u64::from(from) % n) % n) as u32
    }
}

impl TryFrom<u32> for KeySpace {
    type Error = TopologyError;

    fn try_from(length: u32) -> Result<Self> {
        KeySpace::new(length)
    }
}

impl From<KeySpace> for u32 {
    fn from(keyspace: KeySpace) -> u32 {
        keyspace.length
    }
}

impl fmt::Display for KeySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0,{})", self.length)
    }
}

/// A contiguous arc of the ring, possibly wrapping past position `N - 1`.
///
/// Covers `{start, start + 1, ..., start + length - 1} mod N`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "KeyRangeRepr", into = "KeyRangeRepr")]
pub struct KeyRange {
    keyspace: KeySpace,
    start: u32,
    length: u32,
}

impl KeyRange {
    pub fn keyspace(&self) -> KeySpace {
        self.keyspace
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    /// Exclusive end position, wrapped onto the ring.
    ///
    /// For a full range this equals `start`.
    pub fn end(&self) -> u32 {
        ((u64::from(self.start) + u64::from(self.length)) % u64::from(self.keyspace.length)) as u32
    }

    pub fn is_full(&self) -> bool {
        self.length == self.keyspace.length
    }

    /// Whether `position` (taken modulo `N`) falls inside this arc.
    pub fn contains(&self, position: u32) -> bool {
        self.keyspace.clockwise(self.start, position) < self.length
    }

    /// Whether `other` lies completely inside this arc.
    pub fn contains_range(&self, other: &KeyRange) -> bool {
        self.check_keyspace(other);
        if self.is_full() {
            return true;
        }
        self.contains(other.start)
            && u64::from(self.keyspace.clockwise(self.start, other.start)) + u64::from(other.length)
                <= u64::from(self.length)
    }

    /// Whether the two arcs share at least one position.
    pub fn overlaps(&self, other: &KeyRange) -> bool {
        self.check_keyspace(other);
        self.contains(other.start) || other.contains(self.start)
    }

    /// Whether the two arcs overlap or one begins right where the other ends.
    pub fn touches(&self, other: &KeyRange) -> bool {
        self.overlaps(other) || self.end() == other.start || other.end() == self.start
    }

    /// Forward distance from this arc's start to `other`'s start.
    ///
    /// Always in `[0, N)`, zero only when both arcs start at the same
    /// position, and not symmetric.
    pub fn clockwise_distance(&self, other: &KeyRange) -> u32 {
        self.check_keyspace(other);
        self.keyspace.clockwise(self.start, other.start)
    }

    /// Smallest arc covering both arcs.
    ///
    /// Meant for arcs that overlap or are adjacent (like the active and
    /// passive range of one node). Disjoint arcs get the shorter of the two
    /// gaps between them bridged.
    pub fn union(&self, other: &KeyRange) -> KeyRange {
        self.check_keyspace(other);
        let n = u64::from(self.keyspace.length);

        let forward = u64::from(self.clockwise_distance(other));
        let from_self = u64::from(self.length).max(forward + u64::from(other.length));

        let backward = u64::from(other.clockwise_distance(self));
        let from_other = u64::from(other.length).max(backward + u64::from(self.length));

        let (start, length) = if from_other < from_self {
            (other.start, from_other)
        } else {
            (self.start, from_self)
        };

        if length >= n {
            return self.keyspace.full_range();
        }
        KeyRange {
            keyspace: self.keyspace,
            start,
            length: length as u32,
        }
    }

    /// Positions shared by both arcs.
    ///
    /// Two arcs can overlap at both of their ends; in that case the longer
    /// shared segment is returned (the one starting at `self` on a tie).
    pub fn intersection(&self, other: &KeyRange) -> Option<KeyRange> {
        self.check_keyspace(other);
        if self.is_full() {
            return Some(*other);
        }
        if other.is_full() {
            return Some(*self);
        }

        let starting_here = other.contains(self.start).then(|| KeyRange {
            keyspace: self.keyspace,
            start: self.start,
            length: self.length.min(other.length - other.clockwise_distance(self)),
        });
        let starting_there = self.contains(other.start).then(|| KeyRange {
            keyspace: self.keyspace,
            start: other.start,
            length: other.length.min(self.length - self.clockwise_distance(other)),
        });

        match (starting_here, starting_there) {
            (Some(here), Some(there)) if there.length > here.length => Some(there),
            (Some(here), _) => Some(here),
            (None, there) => there,
        }
    }

    fn check_keyspace(&self, other: &KeyRange) {
        assert_eq!(
            self.keyspace, other.keyspace,
            "cannot combine key ranges {self} and {other} from different key spaces"
        );
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},+{}]", self.start, self.length)
    }
}

#[derive(Serialize, Deserialize)]
struct KeyRangeRepr {
    keyspace: KeySpace,
    start: u32,
    length: u32,
}

impl TryFrom<KeyRangeRepr> for KeyRange {
    type Error = TopologyError;

    fn try_from(repr: KeyRangeRepr) -> Result<Self> {
        repr.keyspace.try_range(repr.start, repr.length)
    }
}

impl From<KeyRange> for KeyRangeRepr {
    fn from(range: KeyRange) -> Self {
        KeyRangeRepr {
            keyspace: range.keyspace,
            start: range.start,
            length: range.length,
        }
    }
}
