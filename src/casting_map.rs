//! CastingMap: lazy, memoized per-key value casting over an ordered store.
//!
//! Entries hold their raw value plus a `casted` flag. The first read of a
//! key runs the map's transform and writes the result back under the same
//! key; later reads return the memoized value without re-running it. Plain
//! writes clear the flag. Keys whose transform is still executing live in a
//! shared [`ActiveCasts`] set; re-entering one of them fails with
//! [`CastError::ReentrantCast`] instead of recursing.

use core::fmt;
use core::hash::{BuildHasher, Hash};
use std::collections::hash_map::RandomState;
use std::rc::Rc;

use crate::error::CastError;
use crate::nillable::Nillable;
use crate::ordered_map::{self, OrderedMap};
use crate::reentrancy::ActiveCasts;

/// Per-entry state: the current value and whether it has been cast.
#[derive(Debug, Clone)]
struct Stored<V> {
    value: V,
    casted: bool,
}

/// The transform applied to raw values on first read.
///
/// `map` is the map being read, mid-cast; reads of *other* keys through it
/// memoize as usual, while reads of `key` itself fail with
/// [`CastError::ReentrantCast`]. `raw` is a clone of the stored value. The
/// returned value is written back under `key` and flagged casted.
///
/// Any `Fn` with the matching signature is a `Caster`; parameters a
/// transform does not need are simply ignored (`|_, _, raw| ...`).
pub trait Caster<K, V, S = RandomState>
where
    K: 'static,
    V: 'static,
    S: 'static,
{
    fn cast(&self, map: &mut CastingMap<K, V, S>, key: &K, raw: V) -> Result<V, CastError<K>>;
}

impl<K, V, S, F> Caster<K, V, S> for F
where
    K: 'static,
    V: 'static,
    S: 'static,
    F: Fn(&mut CastingMap<K, V, S>, &K, V) -> Result<V, CastError<K>>,
{
    fn cast(&self, map: &mut CastingMap<K, V, S>, key: &K, raw: V) -> Result<V, CastError<K>> {
        self(map, key, raw)
    }
}

/// A map whose values are cast lazily, at most once per key.
///
/// Built on [`OrderedMap`], so iteration follows insertion order. The
/// transform is fixed at construction and shared by clones; per-key cast
/// state lives with the entry, which makes "casted implies present"
/// structural. Keys are normalized at every public entry point: arguments
/// are anything `Into<K>`, and all internal state is keyed by the
/// canonical `K`.
///
/// `Rc` fields keep the map single-threaded (`!Send`, `!Sync`); it is a
/// building block for a single logical owner, not a concurrent cache.
pub struct CastingMap<K, V, S = RandomState>
where
    K: 'static,
    V: 'static,
    S: 'static,
{
    store: OrderedMap<K, Stored<V>, S>,
    casting: Rc<ActiveCasts<K, S>>,
    caster: Rc<dyn Caster<K, V, S>>,
}

impl<K, V> CastingMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    /// Empty map over the given transform.
    pub fn new(caster: impl Caster<K, V> + 'static) -> Self {
        Self::with_hasher(caster, RandomState::default())
    }

    /// Map seeded with raw entries. Every entry starts uncast.
    pub fn from_entries<I, T>(entries: I, caster: impl Caster<K, V> + 'static) -> Self
    where
        I: IntoIterator<Item = (T, V)>,
        T: Into<K>,
    {
        let mut map = Self::new(caster);
        map.extend(entries);
        map
    }
}

impl<K, V, S> CastingMap<K, V, S>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
    S: BuildHasher + Clone + Default + 'static,
{
    /// Empty map with an explicit hash-state builder.
    pub fn with_hasher(caster: impl Caster<K, V, S> + 'static, hasher: S) -> Self {
        Self {
            store: OrderedMap::with_hasher(hasher.clone()),
            casting: Rc::new(ActiveCasts::with_hasher(hasher)),
            caster: Rc::new(caster),
        }
    }

    /// Borrow the map's `BuildHasher`.
    pub fn hasher(&self) -> &S {
        self.store.hasher()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Whether the key is present, cast or not.
    pub fn contains_key(&self, key: impl Into<K>) -> bool {
        let key = key.into();
        self.store.contains_key(&key)
    }

    /// Whether the key holds an already-cast value.
    pub fn is_casted(&self, key: impl Into<K>) -> bool {
        let key = key.into();
        self.store.get(&key).map(|s| s.casted).unwrap_or(false)
    }

    /// Whether the key's transform is executing right now. Only ever true
    /// when asked from inside a transform.
    pub fn is_casting(&self, key: impl Into<K>) -> bool {
        let key = key.into();
        self.casting.contains(&key)
    }

    /// Read a key, casting it first if needed.
    ///
    /// Absent keys are `Ok(None)`. A present key is cast on first read and
    /// memoized; the transform is not consulted again until the key is
    /// rewritten.
    pub fn get(&mut self, key: impl Into<K>) -> Result<Option<&V>, CastError<K>> {
        let key = key.into();
        if !self.cast_key(&key)? {
            return Ok(None);
        }
        Ok(self.store.get(&key).map(|stored| &stored.value))
    }

    /// Read a key, failing with [`CastError::KeyNotFound`] when it is
    /// absent or holds a nil-like value.
    ///
    /// A present nil-like value (say a stored `None`) takes the same
    /// fallback path as a missing key, even though the entry exists; the
    /// entry still ends up casted.
    pub fn fetch(&mut self, key: impl Into<K>) -> Result<&V, CastError<K>>
    where
        V: Nillable,
    {
        let key = key.into();
        if self.cast_key(&key)? {
            if let Some(stored) = self.store.get(&key) {
                if !stored.value.is_nil() {
                    return Ok(&stored.value);
                }
            }
        }
        Err(CastError::KeyNotFound { key })
    }

    /// Like [`fetch`](Self::fetch), but an absent or nil-like key yields
    /// `default` instead of an error. Cast failures still propagate.
    pub fn fetch_or(&mut self, key: impl Into<K>, default: V) -> Result<V, CastError<K>>
    where
        V: Nillable,
    {
        let key = key.into();
        if self.cast_key(&key)? {
            if let Some(stored) = self.store.get(&key) {
                if !stored.value.is_nil() {
                    return Ok(stored.value.clone());
                }
            }
        }
        Ok(default)
    }

    /// Cast every key present at the time of the call, stopping at the
    /// first failure. Already-cast keys are skipped; keys a transform
    /// removes mid-pass are skipped too.
    pub fn cast_all(&mut self) -> Result<(), CastError<K>> {
        let keys: Vec<K> = self.store.keys().cloned().collect();
        for key in keys {
            self.cast_key(&key)?;
        }
        Ok(())
    }

    /// Cast everything, then iterate `(&K, &V)` in insertion order.
    pub fn iter(&mut self) -> Result<Iter<'_, K, V>, CastError<K>> {
        self.cast_all()?;
        Ok(Iter {
            inner: self.store.iter(),
        })
    }

    /// Cast everything, then iterate values in insertion order.
    pub fn values(&mut self) -> Result<Values<'_, K, V>, CastError<K>> {
        self.cast_all()?;
        Ok(Values {
            inner: self.store.iter(),
        })
    }

    /// Cast and collect the requested keys, in request order. Absent keys
    /// yield `None` in place.
    pub fn values_at<I, T>(&mut self, keys: I) -> Result<Vec<Option<V>>, CastError<K>>
    where
        I: IntoIterator<Item = T>,
        T: Into<K>,
    {
        let mut out = Vec::new();
        for key in keys {
            let key = key.into();
            if self.cast_key(&key)? {
                out.push(self.store.get(&key).map(|s| s.value.clone()));
            } else {
                out.push(None);
            }
        }
        Ok(out)
    }

    /// Iterate `(&K, &V)` in insertion order, values in their current
    /// raw-or-cast state. No casting happens.
    pub fn iter_raw(&self) -> IterRaw<'_, K, V> {
        IterRaw {
            inner: self.store.iter(),
        }
    }

    /// Iterate keys in insertion order. No casting happens.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys {
            inner: self.store.keys(),
        }
    }

    /// Write a raw value. The entry becomes uncast unconditionally, even
    /// when the value equals the one it replaces. An existing key keeps
    /// its position; a new key is appended. Returns the displaced value.
    pub fn insert(&mut self, key: impl Into<K>, value: V) -> Option<V> {
        self.store
            .insert(
                key.into(),
                Stored {
                    value,
                    casted: false,
                },
            )
            .map(|s| s.value)
    }

    /// Write a value the caller asserts is already in cast form. The entry
    /// is flagged casted, so the transform will not run for it.
    pub fn insert_casted(&mut self, key: impl Into<K>, value: V) -> Option<V> {
        self.store
            .insert(
                key.into(),
                Stored {
                    value,
                    casted: true,
                },
            )
            .map(|s| s.value)
    }

    /// Remove a key, returning its current raw-or-cast value.
    pub fn remove(&mut self, key: impl Into<K>) -> Option<V> {
        let key = key.into();
        self.store.remove(&key).map(|s| s.value)
    }

    /// Overwrite from another casting map, in `other`'s insertion order.
    ///
    /// Each written key takes `other`'s cast state for it: entries `other`
    /// already cast arrive casted (the transform will not re-run), raw
    /// entries arrive raw and clear any cast state this map had for the
    /// key. Existing keys keep their position here; new keys are appended.
    pub fn update(&mut self, other: &CastingMap<K, V, S>) {
        for (key, stored) in other.store.iter() {
            self.store.insert(key.clone(), stored.clone());
        }
    }

    /// Non-destructive [`update`](Self::update): clone, overlay `other`.
    pub fn merge(&self, other: &CastingMap<K, V, S>) -> Self {
        let mut merged = self.clone();
        merged.update(other);
        merged
    }

    /// Duplicate under a different transform. Entries and cast flags are
    /// kept; values already cast stay memoized and never see the new
    /// transform.
    pub fn with_caster(&self, caster: impl Caster<K, V, S> + 'static) -> Self {
        Self {
            store: self.store.clone(),
            casting: Rc::new(ActiveCasts::with_hasher(self.store.hasher().clone())),
            caster: Rc::new(caster),
        }
    }

    /// Duplicate with every key replaced by `f(key)`; values and cast
    /// flags carry over unchanged and nothing is cast. When `f` maps two
    /// keys to the same name, the first occurrence fixes the position and
    /// the last one the value and flag.
    pub fn transform_keys(&self, f: impl Fn(&K) -> K) -> Self {
        let mut store = OrderedMap::with_hasher(self.store.hasher().clone());
        for (key, stored) in self.store.iter() {
            store.insert(f(key), stored.clone());
        }
        Self {
            store,
            casting: Rc::new(ActiveCasts::with_hasher(self.store.hasher().clone())),
            caster: Rc::clone(&self.caster),
        }
    }

    /// Snapshot of the current entries, raw or cast as they stand, in
    /// insertion order. No casting happens.
    pub fn to_map(&self) -> OrderedMap<K, V, S> {
        let mut map = OrderedMap::with_hasher(self.store.hasher().clone());
        for (key, stored) in self.store.iter() {
            map.insert(key.clone(), stored.value.clone());
        }
        map
    }

    /// Snapshot restricted to the entries that are already cast, in
    /// insertion order.
    pub fn casted_map(&self) -> OrderedMap<K, V, S> {
        let mut map = OrderedMap::with_hasher(self.store.hasher().clone());
        for (key, stored) in self.store.iter() {
            if stored.casted {
                map.insert(key.clone(), stored.value.clone());
            }
        }
        map
    }

    /// Consume the map into a plain [`OrderedMap`] of the current values.
    /// No casting, no cloning.
    pub fn into_map(self) -> OrderedMap<K, V, S> {
        let mut map = OrderedMap::with_hasher(self.store.hasher().clone());
        for (key, stored) in self.store {
            map.insert(key, stored.value);
        }
        map
    }

    /// Ensure `key` is cast. `Ok(true)` when the entry exists and is
    /// casted on return, `Ok(false)` when the key is absent.
    fn cast_key(&mut self, key: &K) -> Result<bool, CastError<K>> {
        let raw = match self.store.get(key) {
            None => return Ok(false),
            Some(stored) if stored.casted => return Ok(true),
            Some(stored) => stored.value.clone(),
        };
        let guard = match ActiveCasts::begin(&self.casting, key.clone()) {
            Some(guard) => guard,
            None => return Err(CastError::ReentrantCast { key: key.clone() }),
        };
        let caster = Rc::clone(&self.caster);
        let value = caster.cast(self, key, raw)?;
        // Write back by key: if the transform removed its own entry, the
        // cast result is re-added (appended) rather than lost.
        self.store.insert(
            key.clone(),
            Stored {
                value,
                casted: true,
            },
        );
        drop(guard);
        Ok(true)
    }
}

/// Cloning is the duplicate operation: entries and cast flags are deep
/// copied, the in-flight set starts fresh and empty, and the transform is
/// shared, not copied.
impl<K, V, S> Clone for CastingMap<K, V, S>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
    S: BuildHasher + Clone + Default + 'static,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            casting: Rc::new(ActiveCasts::with_hasher(self.store.hasher().clone())),
            caster: Rc::clone(&self.caster),
        }
    }
}

/// Extending writes raw entries: every written key becomes uncast, the
/// same as repeated [`insert`](CastingMap::insert) calls.
impl<K, V, S, T> Extend<(T, V)> for CastingMap<K, V, S>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
    S: BuildHasher + Clone + Default + 'static,
    T: Into<K>,
{
    fn extend<I: IntoIterator<Item = (T, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K, V, S> fmt::Debug for CastingMap<K, V, S>
where
    K: Eq + Hash + Clone + fmt::Debug + 'static,
    V: Clone + fmt::Debug + 'static,
    S: BuildHasher + Clone + Default + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CastingMap")
            .field("entries", &self.store)
            .field("casting", &self.casting.snapshot())
            .finish_non_exhaustive()
    }
}

// Equality compares current values only, raw or cast as they stand; cast
// flags and transform identity are out of the comparison, like a plain
// map compare.
impl<K, V, S> PartialEq for CastingMap<K, V, S>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + PartialEq + 'static,
    S: BuildHasher + Clone + Default + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        self.store.len() == other.store.len()
            && self.store.iter().all(|(k, s)| {
                other
                    .store
                    .get(k)
                    .map(|o| o.value == s.value)
                    .unwrap_or(false)
            })
    }
}

impl<K, V, S> Eq for CastingMap<K, V, S>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + Eq + 'static,
    S: BuildHasher + Clone + Default + 'static,
{
}

/// Iterator over `(&K, &V)` after a full cast, in insertion order.
pub struct Iter<'a, K, V> {
    inner: ordered_map::Iter<'a, K, Stored<V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, s)| (k, &s.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, K, V> ExactSizeIterator for Iter<'a, K, V> {}

/// Iterator over `&V` after a full cast, in insertion order.
pub struct Values<'a, K, V> {
    inner: ordered_map::Iter<'a, K, Stored<V>>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, s)| &s.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, K, V> ExactSizeIterator for Values<'a, K, V> {}

/// Iterator over `(&K, &V)` in their current raw-or-cast state, in
/// insertion order. Produced without casting.
pub struct IterRaw<'a, K, V> {
    inner: ordered_map::Iter<'a, K, Stored<V>>,
}

impl<'a, K, V> Iterator for IterRaw<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, s)| (k, &s.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, K, V> ExactSizeIterator for IterRaw<'a, K, V> {}

/// Iterator over `&K` in insertion order. Produced without casting.
pub struct Keys<'a, K, V> {
    inner: ordered_map::Keys<'a, K, Stored<V>>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, K, V> ExactSizeIterator for Keys<'a, K, V> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn upcase(
        _map: &mut CastingMap<String, String>,
        _key: &String,
        raw: String,
    ) -> Result<String, CastError<String>> {
        Ok(raw.to_uppercase())
    }

    fn counting_map(calls: &Rc<Cell<usize>>) -> CastingMap<String, i32> {
        let counter = Rc::clone(calls);
        CastingMap::new(
            move |_: &mut CastingMap<String, i32>,
                  _: &String,
                  raw: i32|
                  -> Result<i32, CastError<String>> {
                counter.set(counter.get() + 1);
                Ok(raw + 1)
            },
        )
    }

    /// Invariant: The transform runs once per key; later reads are
    /// memoized.
    #[test]
    fn memoize_runs_transform_once() {
        let calls = Rc::new(Cell::new(0usize));
        let mut map = counting_map(&calls);
        map.insert("v", 1);

        assert_eq!(map.get("v").unwrap(), Some(&2));
        assert_eq!(map.get("v").unwrap(), Some(&2));
        assert_eq!(calls.get(), 1);
        assert!(map.is_casted("v"));
    }

    /// Invariant: Any plain write uncasts the key, even when the written
    /// value equals the current one; the next read re-runs the transform.
    #[test]
    fn insert_invalidates_even_with_equal_value() {
        let calls = Rc::new(Cell::new(0usize));
        let mut map = counting_map(&calls);
        map.insert("v", 1);
        assert_eq!(map.get("v").unwrap(), Some(&2));

        map.insert("v", 1);
        assert!(!map.is_casted("v"));
        assert_eq!(map.get("v").unwrap(), Some(&2));
        assert_eq!(calls.get(), 2);
    }

    /// Invariant: `insert_casted` seeds a value the transform never sees.
    #[test]
    fn insert_casted_skips_transform() {
        let calls = Rc::new(Cell::new(0usize));
        let mut map = counting_map(&calls);
        map.insert_casted("v", 42);

        assert!(map.is_casted("v"));
        assert_eq!(map.get("v").unwrap(), Some(&42));
        assert_eq!(calls.get(), 0);
    }

    /// Invariant: `remove` drops the entry and its cast state; the key
    /// reads as absent afterwards.
    #[test]
    fn remove_clears_entry_and_flag() {
        let calls = Rc::new(Cell::new(0usize));
        let mut map = counting_map(&calls);
        map.insert("v", 1);
        assert_eq!(map.get("v").unwrap(), Some(&2));

        assert_eq!(map.remove("v"), Some(2));
        assert!(!map.contains_key("v"));
        assert!(!map.is_casted("v"));
        assert_eq!(map.get("v").unwrap(), None);
        assert_eq!(map.remove("v"), None);
    }

    /// Invariant: A transform reading its own key gets `ReentrantCast`,
    /// and the failed cast leaves no casting residue behind.
    #[test]
    fn reentrant_self_cast_errors() {
        fn self_referential(
            map: &mut CastingMap<String, i32>,
            key: &String,
            raw: i32,
        ) -> Result<i32, CastError<String>> {
            let nested = map.get(key.clone())?;
            Ok(nested.copied().unwrap_or(raw))
        }

        let mut map = CastingMap::new(self_referential);
        map.insert("loop", 1);

        match map.get("loop") {
            Err(CastError::ReentrantCast { key }) => assert_eq!(key, "loop"),
            other => panic!("expected ReentrantCast, got {other:?}"),
        }
        assert!(!map.is_casting("loop"));
        assert!(!map.is_casted("loop"));
        assert_eq!(map.len(), 1);
    }

    /// Invariant: A failed transform leaves the entry raw and uncast, and
    /// the key is immediately castable again.
    #[test]
    fn failed_cast_leaves_entry_raw_and_unblocked() {
        fn positive_only(
            _map: &mut CastingMap<String, i32>,
            key: &String,
            raw: i32,
        ) -> Result<i32, CastError<String>> {
            if raw < 0 {
                return Err(CastError::Transform(
                    format!("negative value for {key:?}").into(),
                ));
            }
            Ok(raw + 1)
        }

        let mut map = CastingMap::new(positive_only);
        map.insert("n", -5);

        assert!(matches!(map.get("n"), Err(CastError::Transform(_))));
        assert!(!map.is_casting("n"));
        assert!(!map.is_casted("n"));

        map.insert("n", 5);
        assert_eq!(map.get("n").unwrap(), Some(&6));
    }

    /// Invariant: Write-back goes by key, so a transform that removes its
    /// own entry mid-cast still produces a casted entry, appended at the
    /// end.
    #[test]
    fn cast_write_back_survives_self_delete() {
        fn delete_self(
            map: &mut CastingMap<String, i32>,
            key: &String,
            raw: i32,
        ) -> Result<i32, CastError<String>> {
            map.remove(key.clone());
            Ok(raw * 10)
        }

        let mut map = CastingMap::new(delete_self);
        map.insert("a", 1);
        map.insert("b", 2);

        assert_eq!(map.get("a").unwrap(), Some(&10));
        assert!(map.contains_key("a"));
        assert!(map.is_casted("a"));
        let keys: Vec<String> = map.keys().cloned().collect();
        assert_eq!(keys, vec!["b".to_string(), "a".to_string()]);
    }

    /// Invariant: A transform may cast *other* keys through the map; those
    /// casts memoize normally.
    #[test]
    fn nested_casts_of_distinct_keys_memoize() {
        fn summing(
            map: &mut CastingMap<String, i32>,
            key: &String,
            raw: i32,
        ) -> Result<i32, CastError<String>> {
            if key == "total" {
                let a = map.get("a")?.copied().unwrap_or(0);
                let b = map.get("b")?.copied().unwrap_or(0);
                Ok(raw + a + b)
            } else {
                Ok(raw * 2)
            }
        }

        let mut map = CastingMap::new(summing);
        map.insert("a", 1);
        map.insert("b", 2);
        map.insert("total", 100);

        assert_eq!(map.get("total").unwrap(), Some(&106));
        assert!(map.is_casted("a"));
        assert!(map.is_casted("b"));
        assert!(map.is_casted("total"));
        assert_eq!(map.get("a").unwrap(), Some(&2));
    }

    /// Invariant: An unwinding transform releases its casting marker; the
    /// map stays usable and the entry stays raw.
    #[test]
    fn panic_in_transform_releases_casting() {
        fn panicking(
            _map: &mut CastingMap<String, i32>,
            _key: &String,
            _raw: i32,
        ) -> Result<i32, CastError<String>> {
            panic!("transform exploded");
        }

        let mut map = CastingMap::new(panicking);
        map.insert("x", 1);

        let result = catch_unwind(AssertUnwindSafe(|| {
            let _ = map.get("x");
        }));
        assert!(result.is_err());
        assert!(!map.is_casting("x"));
        assert!(!map.is_casted("x"));
        assert!(map.contains_key("x"));
    }

    /// Invariant: `iter_raw` and `keys` read without casting.
    #[test]
    fn iter_raw_and_keys_do_not_cast() {
        let calls = Rc::new(Cell::new(0usize));
        let mut map = counting_map(&calls);
        map.insert("a", 1);
        map.insert("b", 2);

        let pairs: Vec<(String, i32)> =
            map.iter_raw().map(|(k, v)| (k.clone(), *v)).collect();
        assert_eq!(pairs, vec![("a".to_string(), 1), ("b".to_string(), 2)]);

        let keys: Vec<String> = map.keys().cloned().collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

        assert_eq!(calls.get(), 0);
        assert!(!map.is_casted("a"));
        assert!(!map.is_casted("b"));
    }

    /// Invariant: When `transform_keys` collides two keys, the first
    /// occurrence fixes the position and the last one the value and flag.
    #[test]
    fn transform_keys_collision_first_position_last_value() {
        let mut map = CastingMap::new(upcase);
        map.insert_casted("x", "X".to_string());
        map.insert("y", "y".to_string());
        map.insert("z", "z".to_string());

        let collapsed = map.transform_keys(|k| {
            if k == "z" {
                "z".to_string()
            } else {
                "same".to_string()
            }
        });
        assert_eq!(collapsed.len(), 2);
        let keys: Vec<String> = collapsed.keys().cloned().collect();
        assert_eq!(keys, vec!["same".to_string(), "z".to_string()]);
        let raw: Vec<(String, String)> = collapsed
            .iter_raw()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        assert_eq!(raw[0], ("same".to_string(), "y".to_string()));
        assert!(!collapsed.is_casted("same"));
    }

    /// Invariant: `into_map` hands back the current values without casting
    /// anything.
    #[test]
    fn into_map_returns_raw_snapshot() {
        let calls = Rc::new(Cell::new(0usize));
        let mut map = counting_map(&calls);
        map.insert("a", 1);
        map.insert("b", 2);
        assert_eq!(map.get("a").unwrap(), Some(&2));

        let plain = map.into_map();
        assert_eq!(calls.get(), 1);
        let pairs: Vec<(String, i32)> = plain.into_iter().collect();
        assert_eq!(pairs, vec![("a".to_string(), 2), ("b".to_string(), 2)]);
    }

    /// Invariant: Equality compares current values only; cast flags and
    /// transforms are out of the picture.
    #[test]
    fn equality_ignores_cast_flags() {
        let calls = Rc::new(Cell::new(0usize));
        let mut casted = counting_map(&calls);
        casted.insert_casted("a", 2);

        let mut raw = CastingMap::new(
            |_: &mut CastingMap<String, i32>,
             _: &String,
             raw: i32|
             -> Result<i32, CastError<String>> { Ok(raw) },
        );
        raw.insert("a", 2);

        assert_eq!(casted, raw);
        raw.insert("b", 3);
        assert_ne!(casted, raw);
    }
}
