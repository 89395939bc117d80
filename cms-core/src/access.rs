//! Read/write scope filters.
//!
//! A filter holds two optional id sets. `None` means unrestricted, an empty
//! list means nothing. Filters are plain values and are copied freely.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{Id, IdKind, ProjectKind, WorkspaceKind};

#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct AccessFilter<K: IdKind> {
    pub readable: Option<Vec<Id<K>>>,
    pub writable: Option<Vec<Id<K>>>,
}

pub type ProjectFilter = AccessFilter<ProjectKind>;
pub type WorkspaceFilter = AccessFilter<WorkspaceKind>;

impl<K: IdKind> AccessFilter<K> {
    /// Filter that permits everything.
    pub fn unrestricted() -> Self {
        Self {
            readable: None,
            writable: None,
        }
    }

    /// Filter that permits nothing.
    pub fn none() -> Self {
        Self {
            readable: Some(Vec::new()),
            writable: Some(Vec::new()),
        }
    }

    pub fn new(readable: Option<Vec<Id<K>>>, writable: Option<Vec<Id<K>>>) -> Self {
        Self { readable, writable }
    }

    pub fn read_only(readable: Vec<Id<K>>) -> Self {
        Self {
            readable: Some(readable),
            writable: Some(Vec::new()),
        }
    }

    pub fn read_write(writable: Vec<Id<K>>) -> Self {
        Self {
            readable: Some(Vec::new()),
            writable: Some(writable),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.readable.is_none() && self.writable.is_none()
    }

    pub fn can_read(&self, target: &Id<K>) -> bool {
        match &self.readable {
            None => true,
            Some(readable) => readable.contains(target) || self.can_write_listed(target),
        }
    }

    pub fn can_write(&self, target: &Id<K>) -> bool {
        match &self.writable {
            None => true,
            Some(writable) => writable.contains(target),
        }
    }

    fn can_write_listed(&self, target: &Id<K>) -> bool {
        self.writable.as_ref().is_some_and(|w| w.contains(target))
    }

    /// Union of both sides; an unrestricted side stays unrestricted.
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            readable: merge_side(&self.readable, &other.readable),
            writable: merge_side(&self.writable, &other.writable),
        }
    }
}

fn merge_side<K: IdKind>(a: &Option<Vec<Id<K>>>, b: &Option<Vec<Id<K>>>) -> Option<Vec<Id<K>>> {
    match (a, b) {
        (Some(a), Some(b)) => {
            let mut out = Vec::with_capacity(a.len() + b.len());
            for id in a.iter().chain(b.iter()) {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
            Some(out)
        }
        _ => None,
    }
}

impl<K: IdKind> Default for AccessFilter<K> {
    fn default() -> Self {
        Self::unrestricted()
    }
}

impl<K: IdKind> Clone for AccessFilter<K> {
    fn clone(&self) -> Self {
        Self {
            readable: self.readable.clone(),
            writable: self.writable.clone(),
        }
    }
}

impl<K: IdKind> PartialEq for AccessFilter<K> {
    fn eq(&self, other: &Self) -> bool {
        self.readable == other.readable && self.writable == other.writable
    }
}

impl<K: IdKind> Eq for AccessFilter<K> {}

impl<K: IdKind> fmt::Debug for AccessFilter<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessFilter")
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ProjectId;
    use proptest::prelude::*;

    #[test]
    fn nil_sides_are_unrestricted() {
        let p = ProjectId::new();
        let f = ProjectFilter::unrestricted();
        assert!(f.can_read(&p));
        assert!(f.can_write(&p));
    }

    #[test]
    fn empty_sides_deny() {
        let p = ProjectId::new();
        let f = ProjectFilter::none();
        assert!(!f.can_read(&p));
        assert!(!f.can_write(&p));
    }

    #[test]
    fn writable_implies_readable() {
        let p = ProjectId::new();
        let f = ProjectFilter::read_write(vec![p]);
        assert!(f.can_read(&p));
        assert!(f.can_write(&p));

        let ro = ProjectFilter::read_only(vec![p]);
        assert!(ro.can_read(&p));
        assert!(!ro.can_write(&p));
    }

    #[test]
    fn merge_concatenates_listed_sides() {
        let (a, b) = (ProjectId::new(), ProjectId::new());
        let merged = ProjectFilter::read_only(vec![a]).merge(&ProjectFilter::read_write(vec![b]));
        assert_eq!(merged.readable, Some(vec![a]));
        assert_eq!(merged.writable, Some(vec![b]));
        assert!(merged.can_read(&b));
    }

    #[test]
    fn merge_with_nil_side_is_nil() {
        let a = ProjectId::new();
        let f = ProjectFilter::new(None, Some(vec![a]));
        let merged = f.merge(&ProjectFilter::read_write(vec![ProjectId::new()]));
        assert!(merged.readable.is_none());
        assert_eq!(merged.writable.as_ref().map(Vec::len), Some(2));
    }

    fn arb_side() -> impl Strategy<Value = Option<Vec<ProjectId>>> {
        prop::option::of(prop::collection::vec(Just(()), 0..5).prop_map(|v| {
            v.into_iter().map(|_| ProjectId::new()).collect()
        }))
    }

    proptest! {
        #[test]
        fn merge_with_self_is_identity(readable in arb_side(), writable in arb_side()) {
            let f = ProjectFilter::new(readable, writable);
            prop_assert_eq!(f.merge(&f), f);
        }

        #[test]
        fn merge_with_unrestricted_is_unrestricted(readable in arb_side(), writable in arb_side()) {
            let f = ProjectFilter::new(readable, writable);
            prop_assert_eq!(f.merge(&ProjectFilter::unrestricted()), ProjectFilter::unrestricted());
        }
    }
}
