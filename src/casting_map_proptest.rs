#![cfg(test)]

// Property tests for CastingMap: model-based state machine against
// std::collections::HashMap, extended with a casted-flag, call-count, and
// insertion-order model.

use crate::casting_map::CastingMap;
use crate::error::CastError;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::cell::Cell;
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hasher};
use std::rc::Rc;

// Key newtype with From<&str> to exercise normalized lookups.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.to_string())
    }
}

// Pool-indexed operations to improve shrinking: indices shrink to earlier keys,
// pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Insert(usize, i32),
    InsertCasted(usize, i32),
    Remove(usize),
    Get(usize),
    Fetch(usize),
    IsCasted(usize),
    Contains(String),
    CastAll,
    Duplicate,
    Iterate,
}

fn key_from(pool: &[String], i: usize) -> Key {
    Key(pool[i].clone())
}

/// The reference transform: deterministic, injective enough to tell cast
/// values from raw ones in the model.
fn cast_value(raw: i32) -> i32 {
    raw.wrapping_mul(2).wrapping_add(1)
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=8).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Insert(i, v)),
            (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::InsertCasted(i, v)),
            idx.clone().prop_map(OpI::Remove),
            idx.clone().prop_map(OpI::Get),
            idx.clone().prop_map(OpI::Fetch),
            idx.clone().prop_map(OpI::IsCasted),
            prop_oneof![
                contains_pool.prop_map(|s: String| s),
                "[a-z]{0,5}".prop_map(|s| s)
            ]
            .prop_map(OpI::Contains),
            Just(OpI::CastAll),
            Just(OpI::Duplicate),
            Just(OpI::Iterate),
        ];
        proptest::collection::vec(op, 1..60).prop_map(move |ops| (pool.clone(), ops))
    })
}

fn run_scenario<S>(pool: Vec<String>, ops: Vec<OpI>, hasher: S) -> Result<(), TestCaseError>
where
    S: BuildHasher + Clone + Default + 'static,
{
    let calls = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&calls);
    let mut sut: CastingMap<Key, i32, S> = CastingMap::with_hasher(
        move |_: &mut CastingMap<Key, i32, S>,
              _: &Key,
              raw: i32|
              -> Result<i32, CastError<Key>> {
            counter.set(counter.get() + 1);
            Ok(cast_value(raw))
        },
        hasher,
    );

    // Model: current value + casted flag per key, plus insertion order and
    // the expected number of transform runs.
    let mut model: HashMap<Key, (i32, bool)> = HashMap::new();
    let mut order: Vec<Key> = Vec::new();
    let mut expected_calls = 0usize;

    for op in ops {
        match op {
            OpI::Insert(i, v) => {
                let k = key_from(&pool, i);
                let prev = sut.insert(k.clone(), v);
                let model_prev = model.insert(k.clone(), (v, false));
                prop_assert_eq!(prev, model_prev.map(|(pv, _)| pv));
                if model_prev.is_none() {
                    order.push(k);
                }
            }
            OpI::InsertCasted(i, v) => {
                let k = key_from(&pool, i);
                let prev = sut.insert_casted(k.clone(), v);
                let model_prev = model.insert(k.clone(), (v, true));
                prop_assert_eq!(prev, model_prev.map(|(pv, _)| pv));
                if model_prev.is_none() {
                    order.push(k);
                }
            }
            OpI::Remove(i) => {
                let k = key_from(&pool, i);
                let removed = sut.remove(k.clone());
                let model_removed = model.remove(&k);
                prop_assert_eq!(removed, model_removed.map(|(pv, _)| pv));
                order.retain(|ok| ok != &k);
            }
            OpI::Get(i) => {
                let k = key_from(&pool, i);
                let got = sut.get(k.clone());
                match model.get_mut(&k) {
                    None => prop_assert!(matches!(got, Ok(None))),
                    Some(entry) => {
                        if !entry.1 {
                            entry.0 = cast_value(entry.0);
                            entry.1 = true;
                            expected_calls += 1;
                        }
                        let expected = entry.0;
                        match got {
                            Ok(Some(v)) => prop_assert_eq!(*v, expected),
                            other => prop_assert!(false, "expected Ok(Some), got {:?}", other),
                        }
                    }
                }
            }
            OpI::Fetch(i) => {
                let k = key_from(&pool, i);
                let fetched = sut.fetch(k.clone());
                match model.get_mut(&k) {
                    None => match fetched {
                        Err(CastError::KeyNotFound { key }) => prop_assert_eq!(key, k),
                        other => prop_assert!(false, "expected KeyNotFound, got {:?}", other),
                    },
                    Some(entry) => {
                        if !entry.1 {
                            entry.0 = cast_value(entry.0);
                            entry.1 = true;
                            expected_calls += 1;
                        }
                        let expected = entry.0;
                        match fetched {
                            Ok(v) => prop_assert_eq!(*v, expected),
                            other => prop_assert!(false, "expected Ok, got {:?}", other),
                        }
                    }
                }
            }
            OpI::IsCasted(i) => {
                let k = key_from(&pool, i);
                let flag = model.get(&k).map(|e| e.1).unwrap_or(false);
                prop_assert_eq!(sut.is_casted(k), flag);
            }
            OpI::Contains(s) => {
                let has = sut.contains_key(s.as_str());
                let has_model = model.keys().any(|k| k.0 == s);
                prop_assert_eq!(has, has_model);
            }
            OpI::CastAll => {
                prop_assert!(sut.cast_all().is_ok());
                for entry in model.values_mut() {
                    if !entry.1 {
                        entry.0 = cast_value(entry.0);
                        entry.1 = true;
                        expected_calls += 1;
                    }
                }
            }
            OpI::Duplicate => {
                // The duplicate must carry entries, flags, and order, and
                // cast nothing; the parity checks below keep it honest.
                sut = sut.clone();
            }
            OpI::Iterate => {
                let pairs: Vec<(Key, i32)> =
                    sut.iter_raw().map(|(k, v)| (k.clone(), *v)).collect();
                let expected: Vec<(Key, i32)> =
                    order.iter().map(|k| (k.clone(), model[k].0)).collect();
                prop_assert_eq!(pairs, expected);
            }
        }

        // Post-conditions after each op
        // 1) Size and call-count parity with the model
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
        prop_assert_eq!(calls.get(), expected_calls);
        // 2) Iteration order equals insertion order
        let keys_now: Vec<Key> = sut.keys().cloned().collect();
        prop_assert_eq!(&keys_now, &order);
        // 3) The in-flight set is empty outside transforms
        for k in &pool {
            prop_assert!(!sut.is_casting(k.as_str()));
        }
    }
    Ok(())
}

// Property: State-machine equivalence against std::collections::HashMap
// plus a casted-flag, call-count, and insertion-order model. Invariants
// exercised across random operation sequences:
// - `insert`/`insert_casted`/`remove` displaced-value parity with the model.
// - `get`/`fetch` return the cast of the latest raw write; the transform
//   runs exactly once per raw write (call-count parity).
// - `fetch` on an absent key is `KeyNotFound`; `is_casted` parity.
// - `cast_all` casts exactly the uncast entries.
// - `clone` (duplicate) preserves entries, flags, and order, casts nothing.
// - Iteration order equals insertion order after every op; the in-flight
//   set is empty outside transforms; `len`/`is_empty` parity.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run_scenario(pool, ops, RandomState::default())?;
    }
}

// Collision variant using a constant hasher to stress equality resolution.
#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

// Property: Same state-machine invariants as above, under worst-case
// collision behavior (constant hasher). This stresses equality probing
// and collision resolution in the index and the order list.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run_scenario(pool, ops, ConstBuildHasher)?;
    }
}
