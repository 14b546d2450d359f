//! Small, dependency-light utilities shared across the compiler crates:
//! the [`counter`] identifier macro. Nothing in here is specific to any
//! particular compiler stage.

pub mod counter;

pub use fnv::{FnvHashMap, FnvHashSet};

/// Shorthand constructor matching `FnvHashMap::default()`, used pervasively
/// in place of `std::collections::HashMap::new()` since the compiler's maps
/// are almost always keyed by small integers or interned identifiers where
/// FNV's speed matters more than DoS resistance.
pub fn fx_map<K, V>() -> FnvHashMap<K, V> {
    FnvHashMap::default()
}

pub fn fx_set<K>() -> FnvHashSet<K> {
    FnvHashSet::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    counter! {
        name: TestId,
        counter_name: TEST_ID_COUNTER,
        visibility: pub(crate),
    }

    #[test]
    fn counter_allocates_distinct_ids() {
        let a = TestId::new();
        let b = TestId::new();
        assert_ne!(a.index(), b.index());
    }

    #[test]
    fn fx_map_round_trips() {
        let mut map = fx_map::<u32, &str>();
        map.insert(1, "one");
        assert_eq!(map.get(&1), Some(&"one"));
    }
}
