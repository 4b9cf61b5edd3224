use std::hash::BuildHasherDefault;

use dashmap::DashMap;
use rustc_hash::FxHasher;

/// Concurrent map keyed with the fx hasher; keys here are short cache keys
/// and source ids, never attacker controlled.
pub type FxDashMap<K, V> = DashMap<K, V, BuildHasherDefault<FxHasher>>;
