//! Mark-and-sweep collection (spec.md §4.3).
//!
//! Non-generational, stop-the-world, triggered only at allocation
//! points (never mid-dispatch between operand fetches, per spec.md
//! §5). Cycles among maps/scopes/closures are reclaimed because the
//! tracer walks outward from roots rather than counting references.

use nominal_core::{Handle, Value};

use crate::function::Function;
use crate::heap::{Heap, HeapObject};

fn push_value(worklist: &mut Vec<Handle>, value: Value) {
    if let Some(h) = value.handle() {
        if h != 0 {
            worklist.push(h);
        }
    }
}

/// Runs one full collection cycle over `heap`, treating every value
/// yielded by `roots` as reachable. Returns the number of objects
/// reclaimed.
pub fn collect_garbage(heap: &mut Heap, roots: impl IntoIterator<Item = Value>) -> usize {
    heap.clear_marks();

    let mut worklist: Vec<Handle> = Vec::new();
    for v in roots {
        push_value(&mut worklist, v);
    }

    while let Some(handle) = worklist.pop() {
        if heap.is_marked(handle) {
            continue;
        }
        heap.mark(handle);
        match heap.get(handle) {
            HeapObject::String(_) => {}
            HeapObject::Map(m) => {
                for (k, v) in m.iter() {
                    push_value(&mut worklist, *k);
                    push_value(&mut worklist, *v);
                }
            }
            HeapObject::Scope(s) => {
                if let Some(p) = s.parent {
                    worklist.push(p);
                }
                let mut cursor = crate::hashtable::Iter::default();
                let bindings = s.bindings();
                // `move_next` needs `&HashTable`, which is fine here —
                // we're not mutating `heap` inside this loop.
                loop {
                    match bindings.move_next(&mut cursor) {
                        Some((_, v)) => push_value(&mut worklist, *v),
                        None => break,
                    }
                }
            }
            HeapObject::Class(c) => {
                worklist.push(c.members);
                if let Some(p) = c.parent {
                    worklist.push(p);
                }
            }
            HeapObject::Instance(i) => {
                worklist.push(i.class);
                worklist.push(i.members);
            }
            HeapObject::Function(Function::Script(f)) => {
                worklist.push(f.captured_scope);
            }
            HeapObject::Function(Function::Native(_)) => {}
        }
    }

    heap.sweep()
}
