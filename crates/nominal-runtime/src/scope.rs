//! `Scope`: an identifier -> `Value` mapping with a parent link
//! (spec.md §3). Backed by the same `HashTable` that backs `Map`, keyed
//! here by interned-string handles rather than arbitrary `Value`s, so
//! hashing and equality never need to look past the handle itself.

use nominal_core::{Handle, Value};

use crate::hashtable::HashTable;
use crate::heap::Heap;

#[derive(Debug, Clone)]
pub struct Scope {
    bindings: HashTable<Handle, Value>,
    pub parent: Option<Handle>,
}

impl Scope {
    pub fn new(parent: Option<Handle>) -> Self {
        Scope {
            bindings: HashTable::default(),
            parent,
        }
    }

    pub fn bindings(&self) -> &HashTable<Handle, Value> {
        &self.bindings
    }

    /// A snapshot of every binding declared directly in this scope (not
    /// the parent chain) — used by `nom_import` to export an imported
    /// file's top-level bindings as a map.
    pub fn bindings_snapshot(&self) -> Vec<(Handle, Value)> {
        let mut cursor = crate::hashtable::Iter::default();
        let mut out = Vec::with_capacity(self.bindings.len());
        while let Some((&k, &v)) = self.bindings.move_next(&mut cursor) {
            out.push((k, v));
        }
        out
    }
}

fn hash_handle(h: &Handle) -> u64 {
    *h as u64
}

fn eq_handle(a: &Handle, b: &Handle) -> bool {
    a == b
}

/// `:=`: declares `name` in exactly this scope. Fails (`false`) if
/// already declared here — it does not consult the parent chain.
pub fn scope_declare(heap: &mut Heap, scope: Handle, name: Handle, value: Value) -> bool {
    let scope = heap.get_scope_mut(scope);
    scope
        .bindings
        .insert(name, value, hash_handle, eq_handle)
        .is_ok()
}

/// `=`: sets `name` in the nearest enclosing scope (starting at
/// `scope`) that already declares it. Fails (`false`) if no scope in
/// the chain declares it.
pub fn scope_set(heap: &mut Heap, scope: Handle, name: Handle, value: Value) -> bool {
    let mut current = Some(scope);
    let mut value = value;
    while let Some(h) = current {
        let parent;
        {
            let s = heap.get_scope_mut(h);
            match s.bindings.set(&name, value, hash_handle, eq_handle) {
                Ok(()) => return true,
                Err(v) => {
                    value = v;
                    parent = s.parent;
                }
            }
        }
        current = parent;
    }
    false
}

/// Reads `name`, walking the scope chain from `scope` to the global
/// scope. Returns `None` if it is not declared anywhere in the chain.
pub fn scope_get(heap: &Heap, scope: Handle, name: Handle) -> Option<Value> {
    let mut current = Some(scope);
    while let Some(h) = current {
        let s = heap.get_scope(h);
        if let Some(v) = s.bindings.get(&name, hash_handle, eq_handle) {
            return Some(*v);
        }
        current = s.parent;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_then_get_visible_from_child() {
        let mut heap = Heap::new();
        let global = heap.alloc_scope(None);
        let name = heap.intern_string(b"x");
        assert!(scope_declare(&mut heap, global, name, Value::number(1.0)));

        let child = heap.alloc_scope(Some(global));
        assert_eq!(scope_get(&heap, child, name).unwrap().as_f64(), Some(1.0));
    }

    #[test]
    fn redeclare_in_same_scope_fails() {
        let mut heap = Heap::new();
        let global = heap.alloc_scope(None);
        let name = heap.intern_string(b"x");
        assert!(scope_declare(&mut heap, global, name, Value::number(1.0)));
        assert!(!scope_declare(&mut heap, global, name, Value::number(2.0)));
    }

    #[test]
    fn set_mutates_outer_binding_not_child() {
        let mut heap = Heap::new();
        let global = heap.alloc_scope(None);
        let name = heap.intern_string(b"x");
        scope_declare(&mut heap, global, name, Value::number(1.0));

        let child = heap.alloc_scope(Some(global));
        assert!(scope_set(&mut heap, child, name, Value::number(4.0)));
        assert_eq!(scope_get(&heap, global, name).unwrap().as_f64(), Some(4.0));
    }

    #[test]
    fn set_without_declaration_fails() {
        let mut heap = Heap::new();
        let global = heap.alloc_scope(None);
        let name = heap.intern_string(b"y");
        assert!(!scope_set(&mut heap, global, name, Value::number(1.0)));
    }

    #[test]
    fn shadowing_inner_declare_does_not_leak_out() {
        let mut heap = Heap::new();
        let global = heap.alloc_scope(None);
        let x = heap.intern_string(b"x");
        scope_declare(&mut heap, global, x, Value::number(1.0));

        let inner = heap.alloc_scope(Some(global));
        scope_declare(&mut heap, inner, x, Value::number(4.0));
        assert_eq!(scope_get(&heap, inner, x).unwrap().as_f64(), Some(4.0));
        assert_eq!(scope_get(&heap, global, x).unwrap().as_f64(), Some(1.0));
    }
}
