//! The heap: allocation, the object table, and the string-interning
//! pool (spec.md §4.3).
//!
//! Allocation returns a `Handle` and registers the object in a dense,
//! freelist-backed table; id `0` is reserved to mean "no object" and is
//! never returned by `alloc`. Garbage collection (`crate::gc`) sweeps
//! this table directly.

use nominal_core::{Handle, Value};

use crate::class::Class;
use crate::error::NominalError;
use crate::function::Function;
use crate::hashtable::HashTable;
use crate::instance::Instance;
use crate::map::NomMap;
use crate::nomstring::{fnv1a, NomString};
use crate::scope::Scope;

/// Below this many allocations-since-last-collection, `Vm` does not
/// bother calling the collector.
const DEFAULT_GC_THRESHOLD: usize = 256;

pub enum HeapObject {
    String(NomString),
    Map(NomMap),
    Scope(Scope),
    Function(Function),
    Class(Class),
    Instance(Instance),
}

impl HeapObject {
    pub fn kind_name(&self) -> &'static str {
        match self {
            HeapObject::String(_) => "string",
            HeapObject::Map(_) => "map",
            HeapObject::Scope(_) => "scope",
            HeapObject::Function(_) => "function",
            HeapObject::Class(_) => "class",
            HeapObject::Instance(_) => "instance",
        }
    }
}

struct Slot {
    object: HeapObject,
    marked: bool,
}

pub struct Heap {
    slots: Vec<Option<Slot>>,
    free_list: Vec<Handle>,
    intern_pool: HashTable<Box<[u8]>, Handle>,
    alloc_since_gc: usize,
    gc_threshold: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            // Slot 0 is permanently vacant: handle 0 means "no object".
            slots: vec![None],
            free_list: Vec::new(),
            intern_pool: HashTable::default(),
            alloc_since_gc: 0,
            gc_threshold: DEFAULT_GC_THRESHOLD,
        }
    }

    // -- allocation -----------------------------------------------------

    pub fn alloc(&mut self, object: HeapObject) -> Handle {
        self.alloc_since_gc += 1;
        let slot = Slot {
            object,
            marked: false,
        };
        if let Some(id) = self.free_list.pop() {
            self.slots[id as usize] = Some(slot);
            id
        } else {
            let id = self.slots.len() as Handle;
            self.slots.push(Some(slot));
            id
        }
    }

    pub fn alloc_string(&mut self, bytes: impl Into<Box<[u8]>>) -> Handle {
        self.alloc(HeapObject::String(NomString::new(bytes)))
    }

    /// Interns `bytes`: returns the existing handle if an equal string
    /// was interned before, otherwise allocates and pool-registers one.
    pub fn intern_string(&mut self, bytes: &[u8]) -> Handle {
        let hash = |k: &Box<[u8]>| fnv1a(k);
        let eq = |a: &Box<[u8]>, b: &Box<[u8]>| a.as_ref() == b.as_ref();
        let key: Box<[u8]> = bytes.into();
        if let Some(&handle) = self.intern_pool.get(&key, hash, eq) {
            return handle;
        }
        let handle = self.alloc(HeapObject::String(NomString::new(bytes.to_vec())));
        self.intern_pool
            .insert(key, handle, hash, eq)
            .expect("checked absent above");
        handle
    }

    pub fn alloc_map(&mut self) -> Handle {
        self.alloc(HeapObject::Map(NomMap::new()))
    }

    pub fn alloc_scope(&mut self, parent: Option<Handle>) -> Handle {
        self.alloc(HeapObject::Scope(Scope::new(parent)))
    }

    pub fn alloc_function(&mut self, function: Function) -> Handle {
        self.alloc(HeapObject::Function(function))
    }

    pub fn alloc_class(&mut self, class: Class) -> Handle {
        self.alloc(HeapObject::Class(class))
    }

    pub fn alloc_instance(&mut self, instance: Instance) -> Handle {
        self.alloc(HeapObject::Instance(instance))
    }

    // -- accessors --------------------------------------------------------

    pub fn get(&self, handle: Handle) -> &HeapObject {
        self.slots[handle as usize]
            .as_ref()
            .map(|s| &s.object)
            .unwrap_or_else(|| panic!("dangling handle #{handle}"))
    }

    fn get_mut(&mut self, handle: Handle) -> &mut HeapObject {
        self.slots[handle as usize]
            .as_mut()
            .map(|s| &mut s.object)
            .unwrap_or_else(|| panic!("dangling handle #{handle}"))
    }

    pub fn get_string(&self, handle: Handle) -> &NomString {
        match self.get(handle) {
            HeapObject::String(s) => s,
            other => panic!("handle #{handle} is a {}, not a string", other.kind_name()),
        }
    }

    pub fn get_map(&self, handle: Handle) -> &NomMap {
        match self.get(handle) {
            HeapObject::Map(m) => m,
            other => panic!("handle #{handle} is a {}, not a map", other.kind_name()),
        }
    }

    pub fn get_map_mut(&mut self, handle: Handle) -> &mut NomMap {
        match self.get_mut(handle) {
            HeapObject::Map(m) => m,
            other => panic!("handle #{handle} is a {}, not a map", other.kind_name()),
        }
    }

    pub fn get_scope(&self, handle: Handle) -> &Scope {
        match self.get(handle) {
            HeapObject::Scope(s) => s,
            other => panic!("handle #{handle} is a {}, not a scope", other.kind_name()),
        }
    }

    pub fn get_scope_mut(&mut self, handle: Handle) -> &mut Scope {
        match self.get_mut(handle) {
            HeapObject::Scope(s) => s,
            other => panic!("handle #{handle} is a {}, not a scope", other.kind_name()),
        }
    }

    pub fn get_function(&self, handle: Handle) -> &Function {
        match self.get(handle) {
            HeapObject::Function(f) => f,
            other => panic!("handle #{handle} is a {}, not a function", other.kind_name()),
        }
    }

    pub fn get_class(&self, handle: Handle) -> &Class {
        match self.get(handle) {
            HeapObject::Class(c) => c,
            other => panic!("handle #{handle} is a {}, not a class", other.kind_name()),
        }
    }

    pub fn get_instance(&self, handle: Handle) -> &Instance {
        match self.get(handle) {
            HeapObject::Instance(i) => i,
            other => panic!("handle #{handle} is a {}, not an instance", other.kind_name()),
        }
    }

    // -- map operations ---------------------------------------------------
    //
    // Mutating a `NomMap` that lives inside this very heap while also
    // hashing/comparing `Value` keys against the heap (for string keys)
    // is a genuine simultaneous mutable+immutable borrow of `self`.
    // `take_map`/`put_map` resolve it by temporarily swapping the map
    // out for an empty placeholder — safe even for a map that refers to
    // itself, since self-reference only needs the *handle* (identity),
    // never the map's live contents, during its own mutation.

    fn take_map(&mut self, handle: Handle) -> NomMap {
        let slot = self.slots[handle as usize]
            .as_mut()
            .unwrap_or_else(|| panic!("dangling handle #{handle}"));
        match std::mem::replace(&mut slot.object, HeapObject::Map(NomMap::new())) {
            HeapObject::Map(m) => m,
            other => {
                slot.object = other;
                panic!("handle #{handle} is not a map");
            }
        }
    }

    fn put_map(&mut self, handle: Handle, map: NomMap) {
        self.slots[handle as usize].as_mut().unwrap().object = HeapObject::Map(map);
    }

    pub fn map_get(&self, handle: Handle, key: Value) -> Value {
        crate::map::map_get(self, self.get_map(handle), key)
    }

    pub fn map_contains(&self, handle: Handle, key: Value) -> bool {
        crate::map::map_contains(self, self.get_map(handle), key)
    }

    pub fn map_len(&self, handle: Handle) -> usize {
        self.get_map(handle).len()
    }

    pub fn map_move_next(&self, handle: Handle, cursor: &mut usize) -> Option<(Value, Value)> {
        crate::map::map_move_next(self.get_map(handle), cursor)
    }

    pub fn map_insert(&mut self, handle: Handle, key: Value, value: Value) -> Result<(), NominalError> {
        let mut map = self.take_map(handle);
        let result = crate::map::map_insert(self, &mut map, key, value);
        self.put_map(handle, map);
        result
    }

    pub fn map_set(&mut self, handle: Handle, key: Value, value: Value) -> Result<(), NominalError> {
        let mut map = self.take_map(handle);
        let result = crate::map::map_set(self, &mut map, key, value);
        self.put_map(handle, map);
        result
    }

    pub fn map_insert_or_set(&mut self, handle: Handle, key: Value, value: Value) {
        let mut map = self.take_map(handle);
        crate::map::map_insert_or_set(self, &mut map, key, value);
        self.put_map(handle, map);
    }

    /// Allocates a fresh `Map` object with the same entries as
    /// `handle`'s map (spec.md §4.6: instance construction copies the
    /// class's member map).
    pub fn clone_map(&mut self, handle: Handle) -> Handle {
        let entries: Vec<(Value, Value)> = self.get_map(handle).iter().copied().collect();
        let new_handle = self.alloc_map();
        for (k, v) in entries {
            self.map_insert_or_set(new_handle, k, v);
        }
        new_handle
    }

    // -- GC bookkeeping (used by `crate::gc`) ------------------------------

    pub fn should_collect(&self) -> bool {
        self.alloc_since_gc >= self.gc_threshold
    }

    pub(crate) fn slot_ids(&self) -> impl Iterator<Item = Handle> + '_ {
        (1..self.slots.len() as Handle).filter(|&id| self.slots[id as usize].is_some())
    }

    pub(crate) fn clear_marks(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.marked = false;
        }
    }

    pub(crate) fn mark(&mut self, handle: Handle) {
        if let Some(slot) = self.slots.get_mut(handle as usize).and_then(Option::as_mut) {
            slot.marked = true;
        }
    }

    pub(crate) fn is_marked(&self, handle: Handle) -> bool {
        self.slots
            .get(handle as usize)
            .and_then(Option::as_ref)
            .map(|s| s.marked)
            .unwrap_or(true)
    }

    /// Frees every unmarked object, returning the count reclaimed.
    /// Also removes unmarked strings from the intern pool.
    pub(crate) fn sweep(&mut self) -> usize {
        let unmarked_interned: Vec<Box<[u8]>> = {
            let mut cursor = crate::hashtable::Iter::default();
            let mut dead = Vec::new();
            while let Some((key, &handle)) = self.intern_pool.move_next(&mut cursor) {
                if !self.is_marked(handle) {
                    dead.push(key.clone());
                }
            }
            dead
        };
        let hash = |k: &Box<[u8]>| fnv1a(k);
        let eq = |a: &Box<[u8]>, b: &Box<[u8]>| a.as_ref() == b.as_ref();
        for key in unmarked_interned {
            self.intern_pool.remove(&key, hash, eq);
        }

        let mut reclaimed = 0;
        for id in 1..self.slots.len() {
            let dead = matches!(&self.slots[id], Some(slot) if !slot.marked);
            if dead {
                self.slots[id] = None;
                self.free_list.push(id as Handle);
                reclaimed += 1;
            }
        }
        let live = self.slots.len() - self.free_list.len() - 1;
        self.gc_threshold = DEFAULT_GC_THRESHOLD.max(live * 2);
        self.alloc_since_gc = 0;
        reclaimed
    }
}
