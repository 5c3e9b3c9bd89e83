//! casting-map: A single-threaded, insertion-ordered map whose values are
//! cast lazily by a user transform and memoized per key.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: build CastingMap in safe, verifiable layers so each piece can
//!   be reasoned about independently.
//! - Layers:
//!   - OrderedMap<K, V, S>: structural insertion-ordered map; a hash
//!     index over slot storage plus an explicit order list. Knows nothing
//!     about casting.
//!   - CastingMap<K, V, S>: public API over `OrderedMap<K, Stored<V>>`;
//!     per-entry cast flag, a shared transform (`Rc<dyn Caster>`), and a
//!     shared set of keys whose cast is in flight.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` by design (`Rc`-shared state, no
//!   atomics).
//! - Each entry stores a precomputed `u64` hash and indexing always uses
//!   the stored hash; `K: Hash` is never invoked after insertion.
//! - Insertion order is observable: overwrites keep their position, new
//!   keys append, removal closes the gap.
//! - A value is cast at most once per raw write; any plain write clears
//!   the cast state for its key.
//!
//! Reentrancy policy
//! - The transform receives `&mut CastingMap` and may read other keys
//!   (their casts memoize) or mutate the map. Reading the key currently
//!   being cast is reported as `CastError::ReentrantCast` to the inner
//!   caller rather than recursing.
//! - In-flight keys are tracked in a shared set; an RAII guard removes
//!   the key on every exit path, unwind included, so a failed cast never
//!   leaves its key blocked.
//! - OrderedMap itself never calls user code while its internal state is
//!   inconsistent; only `K: Eq/Hash` runs during probing.
//!
//! Error design
//! - `CastError<K>` names the key it refers to. Transform failures pass
//!   through as `CastError::Transform` unchanged; nested cast errors
//!   propagate as themselves. There are no internal retries.
//!
//! Notes and non-goals
//! - Keys are normalized at the public boundary: arguments are anything
//!   `Into<K>`, and all internal state is keyed by the canonical `K`.
//! - `values()`/`iter()` cast everything first; `iter_raw()` and
//!   `keys()` are the side-effect-free walks.
//! - No `get_mut`/`IndexMut`: every write goes through
//!   `insert`/`insert_casted` so cast state stays explicit.
//! - `Clone` is the duplicate operation: deep-copied entries and flags,
//!   fresh in-flight set, shared transform.
//! - No thread-safety and no serialization; `to_map`/`into_map` are the
//!   plain snapshots.

mod casting_map;
mod casting_map_proptest;
pub mod error;
pub mod nillable;
pub mod ordered_map;
mod reentrancy;

// Public surface
pub use casting_map::{Caster, CastingMap, Iter, IterRaw, Keys, Values};
pub use error::CastError;
pub use nillable::Nillable;
pub use ordered_map::OrderedMap;
