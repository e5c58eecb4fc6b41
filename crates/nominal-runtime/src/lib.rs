//! Nominal's runtime: the heap, garbage collector, built-in object
//! kinds (strings, maps, scopes, functions, classes, instances), and
//! the bytecode interpreter that operates on them.

mod class;
mod error;
mod function;
mod gc;
mod hashtable;
mod heap;
mod instance;
mod map;
mod nomstring;
mod opcode;
mod ops;
mod scope;
mod vm;

pub use nominal_core::{Handle, Tag, Value};

pub use class::Class;
pub use error::{ErrorKind, NominalError, Result};
pub use function::{Function, NativeCallback, NativeFunction, ScriptFunction};
pub use gc::collect_garbage;
pub use hashtable::HashTable;
pub use heap::{Heap, HeapObject};
pub use instance::Instance;
pub use map::NomMap;
pub use nomstring::NomString;
pub use opcode::{Instruction, NameId, Program};
pub use ops::{format_value, value_eq, value_hash, ArithOp};
pub use scope::{scope_declare, scope_get, scope_set, Scope};
pub use vm::Vm;
