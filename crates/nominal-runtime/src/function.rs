//! Callable heap objects: script functions (closures over bytecode) and
//! native functions (host callbacks), per spec.md §3/§4.6.

use std::rc::Rc;

use nominal_core::{Handle, Value};

use crate::error::NominalError;
use crate::opcode::Program;
use crate::vm::Vm;

/// A callback a host registers via the embedding API
/// (`State::new_function`). Receives the VM so it can read call
/// arguments (`Vm::arg_count`/`Vm::arg`) and allocate heap objects, and
/// the program buffer so it can invoke a script-function argument back
/// into the VM (e.g. the prelude's `if`/`while`).
pub type NativeCallback = Rc<dyn Fn(&mut Vm, &Program) -> Result<Value, NominalError>>;

#[derive(Clone)]
pub struct ScriptFunction {
    /// Offset into the shared, append-only `Program` where this
    /// function's body begins.
    pub entry: usize,
    /// Parameter names, in positional order, as interned-string
    /// handles.
    pub params: Vec<Handle>,
    /// The scope that was active when this function literal was
    /// evaluated — what makes it a closure.
    pub captured_scope: Handle,
}

#[derive(Clone)]
pub struct NativeFunction {
    pub callback: NativeCallback,
}

#[derive(Clone)]
pub enum Function {
    Script(ScriptFunction),
    Native(NativeFunction),
}

impl Function {
    pub fn arity(&self) -> Option<usize> {
        match self {
            Function::Script(f) => Some(f.params.len()),
            Function::Native(_) => None,
        }
    }
}
