//! The bytecode dispatch loop (spec.md §4.5/§5).
//!
//! `Vm` owns the heap and the value/call-frame stacks. It executes
//! instructions from a caller-supplied `Program`, which may grow
//! between calls to `run` (the REPL and `nom_import` both append to
//! the same program and re-enter at a new entry point).

use nominal_core::{Handle, Tag, Value};

use crate::class::Class;
use crate::error::NominalError;
use crate::function::{Function, NativeFunction, ScriptFunction};
use crate::gc;
use crate::heap::Heap;
use crate::instance::Instance;
use crate::opcode::{Instruction, Program};
use crate::ops::{self, ArithOp};
use crate::scope::{scope_declare, scope_get, scope_set};

struct CallFrame {
    return_pc: usize,
    scope: Handle,
}

/// Runs bytecode and owns every object it can reach. Embedders drive it
/// through `nominal-compiler::State`, which owns the `Program` buffer
/// and the interned names of prelude functions.
pub struct Vm {
    heap: Heap,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    global_scope: Handle,
    current_scope: Handle,
    /// Arguments visible to the native callback currently running, if
    /// any — what `arg_count`/`arg` read. Saved/restored around nested
    /// native calls so reentrancy is safe.
    native_args: Vec<Value>,
}

impl Vm {
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let global_scope = heap.alloc_scope(None);
        Vm {
            heap,
            stack: Vec::new(),
            frames: Vec::new(),
            global_scope,
            current_scope: global_scope,
            native_args: Vec::new(),
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn global_scope(&self) -> Handle {
        self.global_scope
    }

    pub fn current_scope(&self) -> Handle {
        self.current_scope
    }

    // -- native callback argument access ----------------------------------

    pub fn arg_count(&self) -> usize {
        self.native_args.len()
    }

    pub fn arg(&self, index: usize) -> Value {
        self.native_args[index]
    }

    // -- garbage collection -------------------------------------------------

    /// Every value currently reachable from VM-owned roots: the value
    /// stack, every saved frame's scope, the active scope, the global
    /// scope, and any in-flight native-call arguments.
    fn roots(&self) -> Vec<Value> {
        let mut roots: Vec<Value> = self.stack.clone();
        roots.extend(self.native_args.iter().copied());
        // `collect_garbage` only reads `Value::handle()` off each root
        // to seed the worklist, then dispatches on the heap object's
        // real kind — so wrapping a scope handle in a `Value::instance`
        // carrier here is safe; the tag is never inspected.
        for frame in &self.frames {
            roots.push(Value::instance(frame.scope));
        }
        roots.push(Value::instance(self.current_scope));
        roots.push(Value::instance(self.global_scope));
        roots
    }

    fn collect_if_needed(&mut self) {
        if self.heap.should_collect() {
            let roots = self.roots();
            gc::collect_garbage(&mut self.heap, roots);
        }
    }

    /// Forces an immediate collection regardless of the allocation
    /// threshold (spec.md's `collectGarbage` prelude function).
    pub fn force_collect(&mut self) -> usize {
        let roots = self.roots();
        gc::collect_garbage(&mut self.heap, roots)
    }

    // -- execution ------------------------------------------------------

    /// Runs `program` starting at `entry` until a top-level `Return`
    /// (i.e. one with no enclosing call frame) is reached, and returns
    /// the value it produced.
    pub fn run(&mut self, program: &Program, entry: usize) -> Result<Value, NominalError> {
        let base_frame_depth = self.frames.len();
        let mut pc = entry;
        loop {
            let instr = program.get(pc).clone();
            tracing::trace!(pc, ?instr, "dispatch");
            match instr {
                Instruction::PushNil => self.stack.push(Value::nil()),
                Instruction::PushTrue => self.stack.push(Value::bool(true)),
                Instruction::PushFalse => self.stack.push(Value::bool(false)),
                Instruction::PushNumber(n) => self.stack.push(Value::number(n)),
                Instruction::PushString(handle) => self.stack.push(Value::interned_string(handle)),
                Instruction::PushFunction { entry, params } => {
                    self.collect_if_needed();
                    let handle = self.heap.alloc_function(Function::Script(ScriptFunction {
                        entry,
                        params,
                        captured_scope: self.current_scope,
                    }));
                    self.stack.push(Value::function(handle));
                }

                Instruction::NewMap => {
                    self.collect_if_needed();
                    let handle = self.heap.alloc_map();
                    self.stack.push(Value::map(handle));
                }
                Instruction::MapInsert => {
                    let value = self.pop()?;
                    let key = self.pop()?;
                    let map = self.pop()?;
                    let handle = map.handle_with_tag(Tag::Map).ok_or_else(|| {
                        NominalError::type_mismatch("MAP_INSERT target is not a map")
                    })?;
                    self.heap.map_insert(handle, key, value)?;
                    self.stack.push(map);
                }

                Instruction::Get => {
                    let key = self.pop()?;
                    let container = self.pop()?;
                    self.stack.push(self.do_get(container, key)?);
                }
                Instruction::Set => {
                    let value = self.pop()?;
                    let key = self.pop()?;
                    let container = self.pop()?;
                    self.do_set(container, key, value)?;
                    self.stack.push(value);
                }
                Instruction::Insert => {
                    let value = self.pop()?;
                    let key = self.pop()?;
                    let container = self.pop()?;
                    self.do_insert(container, key, value)?;
                    self.stack.push(value);
                }

                Instruction::BinOp(op) => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let result = self.do_bin_op(program, op, a, b)?;
                    self.stack.push(result);
                }
                Instruction::Neg => {
                    let a = self.pop()?;
                    let result = self.do_neg(program, a)?;
                    self.stack.push(result);
                }
                Instruction::Eq => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.stack.push(Value::bool(ops::value_eq(&self.heap, a, b)));
                }
                Instruction::Neq => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.stack.push(Value::bool(!ops::value_eq(&self.heap, a, b)));
                }
                Instruction::Lt | Instruction::Le | Instruction::Gt | Instruction::Ge => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let (x, y) = (
                        a.as_f64()
                            .ok_or_else(|| NominalError::type_mismatch("comparison requires numbers"))?,
                        b.as_f64()
                            .ok_or_else(|| NominalError::type_mismatch("comparison requires numbers"))?,
                    );
                    let result = match instr {
                        Instruction::Lt => x < y,
                        Instruction::Le => x <= y,
                        Instruction::Gt => x > y,
                        Instruction::Ge => x >= y,
                        _ => unreachable!(),
                    };
                    self.stack.push(Value::bool(result));
                }
                Instruction::Not => {
                    let a = self.pop()?;
                    self.stack.push(Value::bool(!a.is_truthy()));
                }

                Instruction::LetVar(name) => {
                    let value = self.pop()?;
                    if !scope_declare(&mut self.heap, self.current_scope, name, value) {
                        return Err(NominalError::redeclaration(self.name_str(name)));
                    }
                    self.stack.push(value);
                }
                Instruction::SetVar(name) => {
                    let value = self.pop()?;
                    if !scope_set(&mut self.heap, self.current_scope, name, value) {
                        return Err(NominalError::undefined_variable(self.name_str(name)));
                    }
                    self.stack.push(value);
                }
                Instruction::GetVar(name) => {
                    let value = scope_get(&self.heap, self.current_scope, name)
                        .ok_or_else(|| NominalError::undefined_variable(self.name_str(name)))?;
                    self.stack.push(value);
                }

                Instruction::Jump(target) => {
                    pc = target;
                    continue;
                }
                Instruction::JumpIfFalse(target) => {
                    let cond = self.pop()?;
                    if !cond.is_truthy() {
                        pc = target;
                        continue;
                    }
                }
                Instruction::JumpIfTrue(target) => {
                    let cond = self.pop()?;
                    if cond.is_truthy() {
                        pc = target;
                        continue;
                    }
                }

                Instruction::Invoke(argc) => {
                    let mut args = Vec::with_capacity(argc);
                    for _ in 0..argc {
                        args.push(self.pop()?);
                    }
                    args.reverse();
                    let callee = self.pop()?;
                    match self.begin_invoke(program, callee, args, pc + 1)? {
                        InvokeOutcome::Entered(new_pc) => {
                            pc = new_pc;
                            continue;
                        }
                        InvokeOutcome::Immediate(value) => self.stack.push(value),
                    }
                }

                Instruction::Return => {
                    let value = self.pop()?;
                    if self.frames.len() == base_frame_depth {
                        self.stack.push(value);
                        return Ok(value);
                    }
                    let frame = self.frames.pop().unwrap();
                    self.current_scope = frame.scope;
                    self.stack.push(value);
                    pc = frame.return_pc;
                    continue;
                }
                Instruction::Pop => {
                    self.pop()?;
                }
                Instruction::Dup => {
                    let top = *self.stack.last().ok_or_else(|| {
                        NominalError::runtime("value stack underflow")
                    })?;
                    self.stack.push(top);
                }
            }
            pc += 1;
        }
    }

    fn pop(&mut self) -> Result<Value, NominalError> {
        self.stack
            .pop()
            .ok_or_else(|| NominalError::runtime("value stack underflow"))
    }

    fn name_str<'h>(&'h self, handle: Handle) -> &'h str {
        std::str::from_utf8(self.heap.get_string(handle).as_bytes()).unwrap_or("<invalid-utf8>")
    }

    fn do_get(&self, container: Value, key: Value) -> Result<Value, NominalError> {
        match container.tag() {
            Some(Tag::Map) => Ok(self.heap.map_get(container.handle().unwrap(), key)),
            Some(Tag::Instance) => {
                let inst = self.heap.get_instance(container.handle().unwrap());
                Ok(self.heap.map_get(inst.members, key))
            }
            Some(Tag::Class) => {
                let class = self.heap.get_class(container.handle().unwrap());
                Ok(self.heap.map_get(class.members, key))
            }
            _ => Err(NominalError::type_mismatch("GET target is not indexable")),
        }
    }

    fn do_set(&mut self, container: Value, key: Value, value: Value) -> Result<(), NominalError> {
        let handle = match container.tag() {
            Some(Tag::Map) => container.handle().unwrap(),
            Some(Tag::Instance) => self.heap.get_instance(container.handle().unwrap()).members,
            _ => return Err(NominalError::type_mismatch("SET target is not indexable")),
        };
        self.heap.map_set(handle, key, value)
    }

    fn do_insert(&mut self, container: Value, key: Value, value: Value) -> Result<(), NominalError> {
        let handle = match container.tag() {
            Some(Tag::Map) => container.handle().unwrap(),
            Some(Tag::Instance) => self.heap.get_instance(container.handle().unwrap()).members,
            _ => return Err(NominalError::type_mismatch("INSERT target is not indexable")),
        };
        self.heap.map_insert(handle, key, value)
    }

    /// Numeric fast path, falling back to a class operator-overload
    /// lookup when either operand is an `Instance` (spec.md §4.6).
    fn do_bin_op(
        &mut self,
        program: &Program,
        op: ArithOp,
        a: Value,
        b: Value,
    ) -> Result<Value, NominalError> {
        if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
            return Ok(Value::number(ops::numeric_binop(op, x, y)));
        }
        let instance_value = if a.tag() == Some(Tag::Instance) {
            a
        } else if b.tag() == Some(Tag::Instance) {
            b
        } else {
            return Err(NominalError::type_mismatch(format!(
                "operator '{}' is not defined between these types",
                ops::arith_op_symbol(op)
            )));
        };
        let instance = self.heap.get_instance(instance_value.handle().unwrap());
        let class = instance.class;
        let op_name = self.heap.intern_string(ops::arith_op_symbol(op).as_bytes());
        let member = ops::lookup_class_member(&self.heap, class, Value::interned_string(op_name))
            .ok_or_else(|| {
                NominalError::type_mismatch(format!(
                    "operator '{}' is not defined on this class",
                    ops::arith_op_symbol(op)
                ))
            })?;
        self.invoke_value(program, member, vec![a, b])
    }

    /// Numeric fast path, falling back to a class operator-overload
    /// lookup when the operand is an `Instance` (spec.md §4.1: unary
    /// negate is one of the operator members a class may define). The
    /// grammar uses the same `-` token for binary subtraction and unary
    /// negation, so the lookup reuses `do_bin_op`'s `-` member name,
    /// distinguished by arity (one argument instead of two).
    fn do_neg(&mut self, program: &Program, a: Value) -> Result<Value, NominalError> {
        if let Some(n) = a.as_f64() {
            return Ok(Value::number(-n));
        }
        if a.tag() != Some(Tag::Instance) {
            return Err(NominalError::type_mismatch("NEG requires a number"));
        }
        let instance = self.heap.get_instance(a.handle().unwrap());
        let class = instance.class;
        let op_name = self.heap.intern_string(ops::arith_op_symbol(ArithOp::Sub).as_bytes());
        let member = ops::lookup_class_member(&self.heap, class, Value::interned_string(op_name))
            .ok_or_else(|| NominalError::type_mismatch("operator '-' is not defined on this class"))?;
        self.invoke_value(program, member, vec![a])
    }

    /// Invokes `callee` with `args` to completion — the entry point
    /// native callbacks use to call back into a script-function argument
    /// (e.g. the prelude's `if`/`while`), since `Instruction::Invoke` is
    /// only available to the dispatch loop itself.
    pub fn invoke(
        &mut self,
        program: &Program,
        callee: Value,
        args: Vec<Value>,
    ) -> Result<Value, NominalError> {
        self.invoke_value(program, callee, args)
    }

    /// Runs `program` from `entry` with `scope` as the active scope
    /// instead of whatever is currently active, restoring the previous
    /// scope afterward regardless of outcome — `nom_import` uses this to
    /// run an imported file's top level in a scope of its own.
    pub fn run_in_scope(
        &mut self,
        program: &Program,
        entry: usize,
        scope: Handle,
    ) -> Result<Value, NominalError> {
        let saved = self.current_scope;
        self.current_scope = scope;
        let result = self.run(program, entry);
        self.current_scope = saved;
        result
    }

    /// `begin_invoke`'s `Entered` branch pushes a `CallFrame` before this
    /// function ever calls `run` on it, so the nested `run` call's own
    /// `base_frame_depth` (captured from `self.frames.len()` at its
    /// entry) already counts that frame — its matching `Return` never
    /// pops it or restores `current_scope` (both only happen on the
    /// `frames.len() != base_frame_depth` path). Captured here, before
    /// `begin_invoke` runs, `base_frame_depth`/`saved_scope` let us
    /// clean up whatever the call leaked once it's done, on every exit
    /// path including errors.
    fn invoke_value(
        &mut self,
        program: &Program,
        callee: Value,
        args: Vec<Value>,
    ) -> Result<Value, NominalError> {
        let saved_scope = self.current_scope;
        let base_frame_depth = self.frames.len();
        let return_pc = usize::MAX; // never used: `Immediate` or a nested `run` consumes the call fully
        let result = match self.begin_invoke(program, callee, args, return_pc) {
            Ok(InvokeOutcome::Immediate(v)) => Ok(v),
            Ok(InvokeOutcome::Entered(entry_pc)) => self.run(program, entry_pc),
            Err(e) => Err(e),
        };
        self.frames.truncate(base_frame_depth);
        self.current_scope = saved_scope;
        result
    }

    /// Shared call machinery for `Instruction::Invoke` and
    /// operator-overload dispatch. `Immediate` covers native calls and
    /// class construction, both of which complete without reentering
    /// the dispatch loop; `Entered` hands back the bytecode offset the
    /// caller should jump to.
    fn begin_invoke(
        &mut self,
        program: &Program,
        callee: Value,
        args: Vec<Value>,
        return_pc: usize,
    ) -> Result<InvokeOutcome, NominalError> {
        match callee.tag() {
            Some(Tag::Function) => {
                let function = self.heap.get_function(callee.handle().unwrap()).clone();
                match function {
                    Function::Native(NativeFunction { callback }) => {
                        let saved = std::mem::replace(&mut self.native_args, args);
                        let result = callback(self, program);
                        self.native_args = saved;
                        Ok(InvokeOutcome::Immediate(result?))
                    }
                    Function::Script(ScriptFunction {
                        entry,
                        params,
                        captured_scope,
                    }) => {
                        // spec.md §4.6: too many arguments is an error;
                        // too few leaves the missing parameters `nil`.
                        if args.len() > params.len() {
                            return Err(NominalError::argument_arity(params.len()));
                        }
                        self.collect_if_needed();
                        let new_scope = self.heap.alloc_scope(Some(captured_scope));
                        let mut args = args.into_iter();
                        for name in params {
                            let value = args.next().unwrap_or(Value::nil());
                            scope_declare(&mut self.heap, new_scope, name, value);
                        }
                        self.frames.push(CallFrame {
                            return_pc,
                            scope: self.current_scope,
                        });
                        self.current_scope = new_scope;
                        Ok(InvokeOutcome::Entered(entry))
                    }
                }
            }
            Some(Tag::Class) => {
                self.collect_if_needed();
                let class_handle = callee.handle().unwrap();
                let Class { members, .. } = self.heap.get_class(class_handle).clone();
                let fresh_members = self.heap.clone_map(members);
                let instance_handle = self.heap.alloc_instance(Instance::new(class_handle, fresh_members));
                let instance_value = Value::instance(instance_handle);

                // spec.md §4.6: if the class defines `new`, invoke it
                // with the fresh instance prepended to the constructor
                // arguments; its return value is discarded.
                let new_name = self.heap.intern_string(b"new");
                if let Some(ctor) =
                    ops::lookup_class_member(&self.heap, class_handle, Value::interned_string(new_name))
                {
                    let mut ctor_args = Vec::with_capacity(args.len() + 1);
                    ctor_args.push(instance_value);
                    ctor_args.extend(args);
                    self.invoke_value(program, ctor, ctor_args)?;
                }
                Ok(InvokeOutcome::Immediate(instance_value))
            }
            _ => Err(NominalError::not_invokable()),
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

enum InvokeOutcome {
    /// A native call or class construction already ran to completion.
    Immediate(Value),
    /// A script call was set up; resume dispatch at this bytecode
    /// offset.
    Entered(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Instruction as I;

    #[test]
    fn arithmetic_and_return() {
        let mut vm = Vm::new();
        let mut program = Program::new();
        program.emit(I::PushNumber(2.0));
        program.emit(I::PushNumber(3.0));
        program.emit(I::BinOp(ArithOp::Add));
        program.emit(I::Return);
        let result = vm.run(&program, 0).unwrap();
        assert_eq!(result.as_f64(), Some(5.0));
    }

    #[test]
    fn let_and_get_var() {
        let mut vm = Vm::new();
        let name = vm.heap_mut().intern_string(b"x");
        let mut program = Program::new();
        program.emit(I::PushNumber(7.0));
        program.emit(I::LetVar(name));
        program.emit(I::GetVar(name));
        program.emit(I::Return);
        let result = vm.run(&program, 0).unwrap();
        assert_eq!(result.as_f64(), Some(7.0));
    }

    #[test]
    fn calling_a_script_function() {
        let mut vm = Vm::new();
        let param = vm.heap_mut().intern_string(b"n");
        let mut program = Program::new();
        // function body: return n + 1
        let body_entry = program.emit(I::GetVar(param));
        program.emit(I::PushNumber(1.0));
        program.emit(I::BinOp(ArithOp::Add));
        program.emit(I::Return);

        // main: push function, push arg, invoke, return
        program.emit(I::PushFunction {
            entry: body_entry,
            params: vec![param],
        });
        program.emit(I::PushNumber(41.0));
        program.emit(I::Invoke(1));
        program.emit(I::Return);

        let main_entry = body_entry + 4;
        let result = vm.run(&program, main_entry).unwrap();
        assert_eq!(result.as_f64(), Some(42.0));
    }

    #[test]
    fn invoking_a_non_callable_errors() {
        let mut vm = Vm::new();
        let mut program = Program::new();
        program.emit(I::PushNumber(1.0));
        program.emit(I::Invoke(0));
        program.emit(I::Return);
        let err = vm.run(&program, 0).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NotInvokable);
    }

    #[test]
    fn class_construction_copies_members() {
        let mut vm = Vm::new();
        let members = vm.heap_mut().alloc_map();
        let key = vm.heap_mut().intern_string(b"greeting");
        vm.heap_mut()
            .map_insert(members, Value::interned_string(key), Value::number(1.0))
            .unwrap();
        let class_handle = vm
            .heap_mut()
            .alloc_class(Class::new(members, None));

        // Classes are produced by the compiler from a class
        // declaration, not a bytecode push, so construction is driven
        // directly through the VM's invoke path rather than an opcode.
        let program = Program::new();
        let instance = vm
            .invoke_value(&program, Value::class(class_handle), vec![])
            .unwrap();
        assert_eq!(instance.tag(), Some(Tag::Instance));
        let inst = vm.heap().get_instance(instance.handle().unwrap());
        assert_ne!(inst.members, members);
        assert_eq!(
            vm.heap().map_get(inst.members, Value::interned_string(key)).as_f64(),
            Some(1.0)
        );
    }
}
