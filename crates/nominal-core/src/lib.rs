//! Nominal Core: the NaN-boxed `Value` representation.
//!
//! This crate has no notion of a heap, a VM, or a hash table — it only
//! knows how to pack and unpack the handful of kinds Nominal values come
//! in. Everything that needs to *dereference* a handle (strings, maps,
//! functions, classes, instances) lives in `nominal-runtime`, which owns
//! the heap those handles point into.

mod value;

pub use value::{Handle, Tag, Value};
