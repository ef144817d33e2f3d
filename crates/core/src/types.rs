//! Core types for fsjournal
//!
//! This module defines the argument shapes captured from intercepted
//! filesystem operations:
//! - Gfid: 16-byte global identifier of a filesystem entry
//! - Loc: path reference (gfid + parent gfid + optional name)
//! - Dict: ordered key/value dictionary (xattrs, extra request data)
//! - StatAttrs: attribute subset carried by setattr/fsetattr
//! - TermRange: first/last journal term pair

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Global identifier of a filesystem entry
///
/// A Gfid is a wrapper around a UUID. Every inode has one, and directory
/// entries are addressed by their parent's gfid plus a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Gfid(Uuid);

impl Gfid {
    /// Create a new random Gfid using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero gfid (unknown / not yet assigned)
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Create a Gfid from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Parse a Gfid from its string representation
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the raw bytes of this Gfid
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Whether this is the nil gfid
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for Gfid {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Display for Gfid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Path reference to a filesystem entry
///
/// Identifies an entry either by its own gfid, or (for entries being
/// created/removed) by its parent directory gfid plus a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Loc {
    /// Gfid of the entry itself (nil when not yet known, e.g. create)
    pub gfid: Gfid,
    /// Gfid of the parent directory
    pub pargfid: Gfid,
    /// Entry name within the parent, if the operation addresses one
    pub name: Option<String>,
}

impl Loc {
    /// Reference an existing entry by gfid only
    pub fn by_gfid(gfid: Gfid) -> Self {
        Loc {
            gfid,
            pargfid: Gfid::nil(),
            name: None,
        }
    }

    /// Reference an entry by parent gfid and name
    pub fn named(pargfid: Gfid, name: impl Into<String>) -> Self {
        Loc {
            gfid: Gfid::nil(),
            pargfid,
            name: Some(name.into()),
        }
    }

    /// Set the entry's own gfid (builder pattern)
    pub fn with_gfid(mut self, gfid: Gfid) -> Self {
        self.gfid = gfid;
        self
    }
}

/// Ordered key/value dictionary
///
/// Used for extended-attribute sets and for the free-form extra data
/// attached to every request. Iteration order is insertion order, which is
/// also the order entries are journaled in. Setting an existing key replaces
/// its value in place.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dict {
    entries: Vec<(String, Vec<u8>)>,
}

impl Dict {
    /// Create an empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry (builder pattern)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace an entry
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Store a u64 in native byte order
    pub fn set_u64(&mut self, key: impl Into<String>, value: u64) {
        self.set(key, value.to_ne_bytes().to_vec());
    }

    /// Get the raw value for a key
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// Get a u64 stored with [`Dict::set_u64`]
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        let bytes: [u8; 8] = self.get(key)?.try_into().ok()?;
        Some(u64::from_ne_bytes(bytes))
    }

    /// Remove an entry, returning its value
    pub fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl<K: Into<String>, V: Into<Vec<u8>>> FromIterator<(K, V)> for Dict {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dict = Dict::new();
        for (k, v) in iter {
            dict.set(k, v);
        }
        dict
    }
}

/// Attributes carried by setattr/fsetattr
///
/// Which of these are meaningful is selected by the operation's `valid`
/// bitmask; all of them are journaled regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatAttrs {
    /// Permission bits (suid/sgid/sticky + rwx triplets)
    pub prot: u32,
    /// Owner uid
    pub uid: u32,
    /// Owner gid
    pub gid: u32,
    /// Access time, seconds
    pub atime: i64,
    /// Access time, nanoseconds
    pub atime_nsec: u32,
    /// Modification time, seconds
    pub mtime: i64,
    /// Modification time, nanoseconds
    pub mtime_nsec: u32,
}

/// Range of journal terms currently on disk for this journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRange {
    /// Term the journal started with in this process
    pub first: u64,
    /// Currently active term
    pub last: u64,
}

impl TermRange {
    /// Number of terms in the range
    pub fn len(&self) -> u64 {
        self.last.saturating_sub(self.first) + 1
    }

    /// A range always holds at least one term
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for TermRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.first, self.last)
    }
}
