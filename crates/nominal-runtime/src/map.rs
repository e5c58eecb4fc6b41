//! `NomMap`: an insertion-ordered key/value store (spec.md §3).
//!
//! Backed by the same `HashTable` primitive that backs `Scope`, per
//! spec.md §4.2's explicit reuse requirement — here keyed by arbitrary
//! `Value`s, which is why every operation takes a `&Heap`: comparing or
//! hashing a `Value` that happens to be a string requires dereferencing
//! it through the heap (spec.md §4.1).

use crate::error::NominalError;
use crate::hashtable::{HashTable, Iter as TableIter};
use crate::heap::Heap;
use crate::ops::{value_eq, value_hash};
use nominal_core::Value;

#[derive(Debug, Clone)]
pub struct NomMap {
    entries: Vec<(Value, Value)>,
    index: HashTable<Value, usize>,
}

impl Default for NomMap {
    fn default() -> Self {
        Self::new()
    }
}

impl NomMap {
    pub fn new() -> Self {
        NomMap {
            entries: Vec::new(),
            index: HashTable::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insertion-order iteration (spec.md's Map invariant).
    pub fn iter(&self) -> impl Iterator<Item = &(Value, Value)> {
        self.entries.iter()
    }

    pub fn entry_at(&self, index: usize) -> Option<(Value, Value)> {
        self.entries.get(index).copied()
    }
}

fn hash_fn<'h>(heap: &'h Heap) -> impl Fn(&Value) -> u64 + 'h {
    move |v| value_hash(heap, *v)
}

fn eq_fn<'h>(heap: &'h Heap) -> impl Fn(&Value, &Value) -> bool + 'h {
    move |a, b| value_eq(heap, *a, *b)
}

/// `get` per spec.md: returns `nil` for a missing key, never errors.
pub fn map_get(heap: &Heap, map: &NomMap, key: Value) -> Value {
    match map.index.get(&key, hash_fn(heap), eq_fn(heap)) {
        Some(&idx) => map.entries[idx].1,
        None => Value::nil(),
    }
}

pub fn map_contains(heap: &Heap, map: &NomMap, key: Value) -> bool {
    map.index.contains(&key, hash_fn(heap), eq_fn(heap))
}

/// `insert`: fails if `key` is already present.
pub fn map_insert(
    heap: &Heap,
    map: &mut NomMap,
    key: Value,
    value: Value,
) -> Result<(), NominalError> {
    if map_contains(heap, map, key) {
        return Err(NominalError::runtime("key already present in map"));
    }
    let idx = map.entries.len();
    map.entries.push((key, value));
    map.index
        .insert(key, idx, hash_fn(heap), eq_fn(heap))
        .map_err(|_| NominalError::runtime("key already present in map"))
}

/// `set`: fails if `key` is not present.
pub fn map_set(
    heap: &Heap,
    map: &mut NomMap,
    key: Value,
    value: Value,
) -> Result<(), NominalError> {
    match map.index.get(&key, hash_fn(heap), eq_fn(heap)).copied() {
        Some(idx) => {
            map.entries[idx].1 = value;
            Ok(())
        }
        None => Err(NominalError::key_not_found()),
    }
}

/// `insertOrSet`: always succeeds.
pub fn map_insert_or_set(heap: &Heap, map: &mut NomMap, key: Value, value: Value) {
    if let Some(&idx) = map.index.get(&key, hash_fn(heap), eq_fn(heap)) {
        map.entries[idx].1 = value;
        return;
    }
    let idx = map.entries.len();
    map.entries.push((key, value));
    map.index.insert(key, idx, hash_fn(heap), eq_fn(heap)).ok();
}

/// Visits every `(key, value)` pair in insertion order. Unlike
/// `HashTable::move_next`'s unordered-bucket walk, this always matches
/// insertion order, because `Map` iteration is defined over `entries`,
/// not over the acceleration index.
pub fn map_move_next(map: &NomMap, cursor: &mut usize) -> Option<(Value, Value)> {
    let pair = map.entries.get(*cursor).copied();
    if pair.is_some() {
        *cursor += 1;
    }
    pair
}

/// Spare for callers that want the raw table cursor instead (e.g. to
/// exercise `HashTable::move_next` directly in tests).
pub fn map_table_cursor() -> TableIter {
    TableIter::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_roundtrip() {
        let heap = Heap::new();
        let mut map = NomMap::new();
        map_insert(&heap, &mut map, Value::number(1.0), Value::number(10.0)).unwrap();
        assert_eq!(map_get(&heap, &map, Value::number(1.0)).as_f64(), Some(10.0));
        assert_eq!(map_get(&heap, &map, Value::number(2.0)), Value::nil());
    }

    #[test]
    fn insert_twice_fails() {
        let heap = Heap::new();
        let mut map = NomMap::new();
        map_insert(&heap, &mut map, Value::number(1.0), Value::nil()).unwrap();
        assert!(map_insert(&heap, &mut map, Value::number(1.0), Value::nil()).is_err());
    }

    #[test]
    fn set_requires_presence() {
        let heap = Heap::new();
        let mut map = NomMap::new();
        assert!(map_set(&heap, &mut map, Value::number(1.0), Value::nil()).is_err());
        map_insert(&heap, &mut map, Value::number(1.0), Value::number(1.0)).unwrap();
        map_set(&heap, &mut map, Value::number(1.0), Value::number(2.0)).unwrap();
        assert_eq!(map_get(&heap, &map, Value::number(1.0)).as_f64(), Some(2.0));
    }

    #[test]
    fn insert_or_set_never_fails() {
        let heap = Heap::new();
        let mut map = NomMap::new();
        map_insert_or_set(&heap, &mut map, Value::number(1.0), Value::number(1.0));
        map_insert_or_set(&heap, &mut map, Value::number(1.0), Value::number(2.0));
        assert_eq!(map_get(&heap, &map, Value::number(1.0)).as_f64(), Some(2.0));
    }

    #[test]
    fn iteration_order_is_insertion_order() {
        let heap = Heap::new();
        let mut map = NomMap::new();
        for i in 0..5 {
            map_insert(&heap, &mut map, Value::number(i as f64), Value::number(i as f64 * 2.0))
                .unwrap();
        }
        let mut cursor = 0usize;
        let mut seen = Vec::new();
        while let Some((k, _)) = map_move_next(&map, &mut cursor) {
            seen.push(k.as_f64().unwrap());
        }
        assert_eq!(seen, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }
}
