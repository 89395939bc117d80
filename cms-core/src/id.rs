//! Typed, time-sortable identifiers.
//!
//! Every entity id is a ULID tagged with a zero-sized kind marker, so an
//! `AssetId` can never be passed where a `ProjectId` is expected. Ids format
//! as 26 lowercase Crockford base32 characters and order by creation time.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::{Generator, Ulid};

use crate::errors::{CmsError, CmsResult};

/// Marker trait for id kinds.
pub trait IdKind: Send + Sync + 'static {
    /// Short entity tag, e.g. `asset`.
    const TAG: &'static str;
}

macro_rules! id_kind {
    ($kind:ident, $alias:ident, $tag:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $kind;

        impl IdKind for $kind {
            const TAG: &'static str = $tag;
        }

        pub type $alias = Id<$kind>;
    };
}

id_kind!(AssetKind, AssetId, "asset");
id_kind!(ProjectKind, ProjectId, "project");
id_kind!(WorkspaceKind, WorkspaceId, "workspace");
id_kind!(UserKind, UserId, "user");
id_kind!(IntegrationKind, IntegrationId, "integration");
id_kind!(EventKind, EventId, "event");
id_kind!(ThreadKind, ThreadId, "thread");
id_kind!(WebhookKind, WebhookId, "webhook");

// Monotonic within a millisecond across the whole process.
static GENERATOR: Lazy<Mutex<Generator>> = Lazy::new(|| Mutex::new(Generator::new()));

fn next_ulid() -> Ulid {
    // The generator only fails when the random part overflows inside one millisecond.
    GENERATOR.lock().generate().unwrap_or_else(|_| Ulid::new())
}

pub struct Id<K: IdKind> {
    ulid: Ulid,
    _kind: PhantomData<fn() -> K>,
}

impl<K: IdKind> Id<K> {
    /// Mint a fresh id.
    pub fn new() -> Self {
        Self::from_ulid(next_ulid())
    }

    /// Mint an id whose timestamp component is `at`.
    pub fn new_at(at: DateTime<Utc>) -> Self {
        Self::from_ulid(Ulid::from_datetime(SystemTime::from(at)))
    }

    pub fn nil() -> Self {
        Self::from_ulid(Ulid::nil())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _kind: PhantomData,
        }
    }

    pub fn parse(s: &str) -> CmsResult<Self> {
        if s.len() != 26 {
            return Err(CmsError::invalid_input(format!("invalid {} id: {:?}", K::TAG, s)));
        }
        Ulid::from_string(s)
            .map(Self::from_ulid)
            .map_err(|e| CmsError::invalid_input(format!("invalid {} id {:?}: {}", K::TAG, s, e)))
    }

    pub fn is_nil(&self) -> bool {
        self.ulid.is_nil()
    }

    pub fn ulid(&self) -> Ulid {
        self.ulid
    }

    pub fn type_tag(&self) -> &'static str {
        K::TAG
    }

    /// Creation time encoded in the id, millisecond precision.
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.ulid.timestamp_ms() as i64).unwrap_or_default()
    }
}

impl<K: IdKind> Default for Id<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: IdKind> Clone for Id<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: IdKind> Copy for Id<K> {}

impl<K: IdKind> PartialEq for Id<K> {
    fn eq(&self, other: &Self) -> bool {
        self.ulid == other.ulid
    }
}

impl<K: IdKind> Eq for Id<K> {}

impl<K: IdKind> Hash for Id<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ulid.hash(state);
    }
}

impl<K: IdKind> PartialOrd for Id<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: IdKind> Ord for Id<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ulid.cmp(&other.ulid)
    }
}

impl<K: IdKind> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ulid.to_string().to_lowercase())
    }
}

impl<K: IdKind> fmt::Debug for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", K::TAG, self)
    }
}

impl<K: IdKind> FromStr for Id<K> {
    type Err = CmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<K: IdKind> Serialize for Id<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de, K: IdKind> Deserialize<'de> for Id<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Ordered list of ids of one kind.
pub struct IdList<K: IdKind>(Vec<Id<K>>);

impl<K: IdKind> IdList<K> {
    pub fn new(ids: Vec<Id<K>>) -> Self {
        Self(ids)
    }

    /// Parse every string, failing on the first malformed one.
    pub fn parse_list<S: AsRef<str>>(raw: &[S]) -> CmsResult<Self> {
        raw.iter()
            .map(|s| Id::parse(s.as_ref()))
            .collect::<CmsResult<Vec<_>>>()
            .map(Self)
    }

    pub fn has(&self, id: &Id<K>) -> bool {
        self.0.contains(id)
    }

    pub fn has_any(&self, ids: &[Id<K>]) -> bool {
        ids.iter().any(|id| self.has(id))
    }

    /// Push `id` unless it is already present.
    pub fn add_unique(&mut self, id: Id<K>) {
        if !self.has(&id) {
            self.0.push(id);
        }
    }

    /// Drop repeated ids, keeping the first occurrence.
    pub fn dedup(&self) -> Self {
        let mut out = Self(Vec::with_capacity(self.0.len()));
        for id in &self.0 {
            out.add_unique(*id);
        }
        out
    }

    pub fn intersect(&self, other: &Self) -> Self {
        Self(self.0.iter().copied().filter(|id| other.has(id)).collect())
    }

    pub fn filter(&self, f: impl Fn(&Id<K>) -> bool) -> Self {
        Self(self.0.iter().copied().filter(|id| f(id)).collect())
    }

    pub fn strings(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Id<K>> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Id<K>] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Id<K>> {
        self.0
    }
}

impl<K: IdKind> Default for IdList<K> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<K: IdKind> Clone for IdList<K> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<K: IdKind> PartialEq for IdList<K> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<K: IdKind> Eq for IdList<K> {}

impl<K: IdKind> fmt::Debug for IdList<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl<K: IdKind> From<Vec<Id<K>>> for IdList<K> {
    fn from(ids: Vec<Id<K>>) -> Self {
        Self(ids)
    }
}

impl<K: IdKind> FromIterator<Id<K>> for IdList<K> {
    fn from_iter<I: IntoIterator<Item = Id<K>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<K: IdKind> IntoIterator for IdList<K> {
    type Item = Id<K>;
    type IntoIter = std::vec::IntoIter<Id<K>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, K: IdKind> IntoIterator for &'a IdList<K> {
    type Item = &'a Id<K>;
    type IntoIter = std::slice::Iter<'a, Id<K>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<K: IdKind> Serialize for IdList<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, K: IdKind> Deserialize<'de> for IdList<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Id<K>>::deserialize(deserializer).map(Self)
    }
}
