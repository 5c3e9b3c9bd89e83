//! Tracking of keys whose cast is in flight, with scoped release.

use core::borrow::Borrow;
use core::cell::RefCell;
use core::hash::{BuildHasher, Hash};
use hashbrown::HashSet;
use std::rc::Rc;

/// The set of keys currently being cast.
///
/// A key enters the set when its cast begins and leaves when the cast
/// finishes, successfully or not. The set is shared behind an [`Rc`] so a
/// [`CastGuard`] can release its key no matter how the cast path exits.
pub(crate) struct ActiveCasts<K, S> {
    set: RefCell<HashSet<K, S>>,
}

impl<K, S> ActiveCasts<K, S>
where
    K: Eq + Hash + Clone,
    S: BuildHasher,
{
    pub(crate) fn with_hasher(hasher: S) -> Self {
        Self {
            set: RefCell::new(HashSet::with_hasher(hasher)),
        }
    }

    pub(crate) fn contains<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.set.borrow().contains(q)
    }

    pub(crate) fn len(&self) -> usize {
        self.set.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.set.borrow().is_empty()
    }

    /// Keys currently mid-cast, in no particular order.
    pub(crate) fn snapshot(&self) -> Vec<K> {
        self.set.borrow().iter().cloned().collect()
    }

    /// Mark `key` as casting. Returns `None` if it already is, leaving the
    /// set untouched; otherwise the returned guard holds the key in the set
    /// until dropped.
    pub(crate) fn begin(casts: &Rc<Self>, key: K) -> Option<CastGuard<K, S>> {
        if !casts.set.borrow_mut().insert(key.clone()) {
            return None;
        }
        Some(CastGuard {
            casts: Rc::clone(casts),
            key,
        })
    }
}

/// Scoped marker for one in-flight cast. Dropping it removes the key from
/// the shared set, on normal return, early error return, and unwind alike.
pub(crate) struct CastGuard<K, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    casts: Rc<ActiveCasts<K, S>>,
    key: K,
}

impl<K, S> Drop for CastGuard<K, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn drop(&mut self) {
        self.casts.set.borrow_mut().remove(&self.key);
    }
}
