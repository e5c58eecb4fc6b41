//! The embedding facade (spec.md §6): ties the lexer/parser to the
//! runtime `Vm` behind the API a host program actually calls. Mirrors
//! the teacher's interpreter facade in spirit — one owning struct a
//! host holds for the interpreter's lifetime, with every host-facing
//! operation an inherent method.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use nominal_runtime::{
    scope_declare, scope_get, scope_set, Function, Handle, NativeCallback, NativeFunction,
    NominalError, Program, Tag, Value, Vm,
};

use crate::parser;

/// One interpreter instance. Not `Sync` — spec.md §5 forbids sharing a
/// state across concurrent actors; separate `State`s share no mutable
/// data (each owns its own `Heap`/`Vm`/import cache).
pub struct State {
    vm: Vm,
    program: Program,
    error: Option<NominalError>,
    /// `nom_import` cache: module name → its captured top-level scope,
    /// exported as a `Map` (spec.md §4.7).
    imports: HashMap<String, Value>,
    /// Fixed search root consulted by `nom_import` — the current
    /// directory only (spec.md §9's Open Question; documented choice).
    import_root: PathBuf,
}

impl State {
    pub fn new() -> Self {
        State {
            vm: Vm::new(),
            program: Program::new(),
            error: None,
            imports: HashMap::new(),
            import_root: PathBuf::from("."),
        }
    }

    // -- compile/run ------------------------------------------------------

    /// Compiles and runs `src` as a top-level statement sequence; the
    /// trailing expression's value is discarded (spec.md's
    /// `nom_execute`).
    pub fn execute(&mut self, src: &str) -> Result<(), NominalError> {
        self.evaluate(src).map(|_| ())
    }

    /// As `execute`, but returns the value of the final expression
    /// (spec.md's `nom_evaluate`). Each call compiles into new offsets
    /// of the same shared program buffer and runs from there, so prior
    /// top-level declarations remain visible (the REPL's accumulation
    /// contract, spec.md §9).
    pub fn evaluate(&mut self, src: &str) -> Result<Value, NominalError> {
        let entry = match parser::compile(src, self.vm.heap_mut(), &mut self.program) {
            Ok(entry) => entry,
            Err(e) => return Err(self.record(e)),
        };
        self.vm.run(&self.program, entry).map_err(|e| self.record(e))
    }

    /// Reads and executes a file (spec.md's `nom_do_file`).
    pub fn do_file(&mut self, path: &Path) -> Result<(), NominalError> {
        let src = fs::read_to_string(path).map_err(|e| {
            self.record(NominalError::runtime(format!(
                "failed to read '{}': {e}",
                path.display()
            )))
        })?;
        self.execute(&src)
    }

    /// Debugging aid (spec.md's `dump_bytecode`): with `src`, compiles
    /// it (without executing it) and returns a listing of just the
    /// newly emitted instructions; with `None`, lists the whole
    /// accumulated program.
    pub fn dump_bytecode(&mut self, src: Option<&str>) -> Result<String, NominalError> {
        match src {
            None => Ok(self.program.dump()),
            Some(src) => {
                let start = self.program.len();
                parser::compile(src, self.vm.heap_mut(), &mut self.program)
                    .map_err(|e| self.record(e))?;
                Ok(self.program.dump_from(start))
            }
        }
    }

    // -- global scope -------------------------------------------------------

    pub fn let_var(&mut self, name: &str, value: Value) -> Result<(), NominalError> {
        let global = self.vm.global_scope();
        let handle = self.vm.heap_mut().intern_string(name.as_bytes());
        if scope_declare(self.vm.heap_mut(), global, handle, value) {
            Ok(())
        } else {
            Err(self.record(NominalError::redeclaration(name)))
        }
    }

    pub fn set_var(&mut self, name: &str, value: Value) -> Result<(), NominalError> {
        let global = self.vm.global_scope();
        let handle = self.vm.heap_mut().intern_string(name.as_bytes());
        if scope_set(self.vm.heap_mut(), global, handle, value) {
            Ok(())
        } else {
            Err(self.record(NominalError::undefined_variable(name)))
        }
    }

    pub fn get_var(&mut self, name: &str) -> Result<Value, NominalError> {
        let global = self.vm.global_scope();
        let handle = self.vm.heap_mut().intern_string(name.as_bytes());
        match scope_get(self.vm.heap(), global, handle) {
            Some(v) => Ok(v),
            None => Err(self.record(NominalError::undefined_variable(name))),
        }
    }

    /// Wraps `callback` as a callable `Value` (spec.md's
    /// `new_function`/`nom_new_function`).
    pub fn new_function(&mut self, callback: NativeCallback) -> Value {
        let handle = self
            .vm
            .heap_mut()
            .alloc_function(Function::Native(NativeFunction { callback }));
        Value::function(handle)
    }

    pub fn arg_count(&self) -> usize {
        self.vm.arg_count()
    }

    pub fn arg(&self, index: usize) -> Value {
        self.vm.arg(index)
    }

    // -- constructors -------------------------------------------------------

    pub fn nil(&self) -> Value {
        Value::nil()
    }

    pub fn true_(&self) -> Value {
        Value::bool(true)
    }

    pub fn false_(&self) -> Value {
        Value::bool(false)
    }

    pub fn from_number(&self, n: f64) -> Value {
        Value::number(n)
    }

    pub fn new_string(&mut self, bytes: &[u8], interned: bool) -> Value {
        if interned {
            Value::interned_string(self.vm.heap_mut().intern_string(bytes))
        } else {
            Value::string(self.vm.heap_mut().alloc_string(bytes.to_vec()))
        }
    }

    pub fn new_map(&mut self) -> Value {
        Value::map(self.vm.heap_mut().alloc_map())
    }

    // -- predicates/accessors -----------------------------------------------

    pub fn is_number(&self, v: Value) -> bool {
        v.is_number()
    }

    pub fn is_string(&self, v: Value) -> bool {
        matches!(v.tag(), Some(Tag::String) | Some(Tag::InternedString))
    }

    pub fn is_map(&self, v: Value) -> bool {
        v.tag() == Some(Tag::Map)
    }

    pub fn is_function(&self, v: Value) -> bool {
        v.tag() == Some(Tag::Function)
    }

    pub fn is_class(&self, v: Value) -> bool {
        v.tag() == Some(Tag::Class)
    }

    /// Functions and classes are invokable; classes construct instead of
    /// calling (spec.md §4.6).
    pub fn is_invokable(&self, v: Value) -> bool {
        matches!(v.tag(), Some(Tag::Function) | Some(Tag::Class))
    }

    /// Any value supporting `next` — currently only `Map` (the only
    /// `Iterable` the prelude this workspace ships actually exercises).
    pub fn is_iterable(&self, v: Value) -> bool {
        v.tag() == Some(Tag::Map)
    }

    pub fn is_true(&self, v: Value) -> bool {
        v.is_truthy()
    }

    pub fn as_f64(&self, v: Value) -> Option<f64> {
        v.as_f64()
    }

    /// A textual form of `v` (spec.md's `as_string`); integral doubles
    /// print without a decimal point (§9's Open Question, resolved in
    /// `nominal_runtime::ops::format_value`).
    pub fn as_string(&self, v: Value) -> String {
        nominal_runtime::format_value(self.vm.heap(), v)
    }

    // -- operations -----------------------------------------------------

    pub fn equals(&self, a: Value, b: Value) -> bool {
        nominal_runtime::value_eq(self.vm.heap(), a, b)
    }

    pub fn hash(&self, v: Value) -> u64 {
        nominal_runtime::value_hash(self.vm.heap(), v)
    }

    fn numeric_binop(
        &mut self,
        symbol: &str,
        a: Value,
        b: Value,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Value, NominalError> {
        match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(Value::number(f(x, y))),
            _ => Err(self.record(NominalError::type_mismatch(format!(
                "'{symbol}' requires two numbers"
            )))),
        }
    }

    pub fn add(&mut self, a: Value, b: Value) -> Result<Value, NominalError> {
        self.numeric_binop("+", a, b, |x, y| x + y)
    }

    pub fn subtract(&mut self, a: Value, b: Value) -> Result<Value, NominalError> {
        self.numeric_binop("-", a, b, |x, y| x - y)
    }

    pub fn multiply(&mut self, a: Value, b: Value) -> Result<Value, NominalError> {
        self.numeric_binop("*", a, b, |x, y| x * y)
    }

    pub fn divide(&mut self, a: Value, b: Value) -> Result<Value, NominalError> {
        self.numeric_binop("/", a, b, |x, y| x / y)
    }

    pub fn negate(&mut self, v: Value) -> Result<Value, NominalError> {
        match v.as_f64() {
            Some(n) => Ok(Value::number(-n)),
            None => Err(self.record(NominalError::type_mismatch("NEG requires a number"))),
        }
    }

    pub fn get(&mut self, container: Value, key: Value) -> Result<Value, NominalError> {
        match container.tag() {
            Some(Tag::Map) => Ok(self.vm.heap().map_get(container.handle().unwrap(), key)),
            Some(Tag::Instance) => {
                let members = self.vm.heap().get_instance(container.handle().unwrap()).members;
                Ok(self.vm.heap().map_get(members, key))
            }
            _ => Err(self.record(NominalError::type_mismatch("GET target is not indexable"))),
        }
    }

    pub fn set(&mut self, container: Value, key: Value, value: Value) -> Result<(), NominalError> {
        let handle = self.container_map_handle(container)?;
        let result = self.vm.heap_mut().map_set(handle, key, value);
        self.record_if_err(result)
    }

    pub fn insert(&mut self, container: Value, key: Value, value: Value) -> Result<(), NominalError> {
        let handle = self.container_map_handle(container)?;
        let result = self.vm.heap_mut().map_insert(handle, key, value);
        self.record_if_err(result)
    }

    pub fn insert_or_set(&mut self, container: Value, key: Value, value: Value) -> Result<(), NominalError> {
        let handle = self.container_map_handle(container)?;
        self.vm.heap_mut().map_insert_or_set(handle, key, value);
        Ok(())
    }

    /// Like `get`, but reports whether `key` was present instead of
    /// defaulting a miss to `nil` (spec.md's `try_get`).
    pub fn try_get(&mut self, container: Value, key: Value) -> Result<Option<Value>, NominalError> {
        let handle = self.container_map_handle(container)?;
        if self.vm.heap().map_contains(handle, key) {
            Ok(Some(self.vm.heap().map_get(handle, key)))
        } else {
            Ok(None)
        }
    }

    /// Advances a map iterator in insertion order (spec.md's `next`);
    /// `cursor` is a caller-owned, zero-initialized opaque position.
    pub fn next(&self, container: Value, cursor: &mut usize) -> Option<(Value, Value)> {
        let handle = container.handle_with_tag(Tag::Map)?;
        self.vm.heap().map_move_next(handle, cursor)
    }

    fn container_map_handle(&mut self, container: Value) -> Result<Handle, NominalError> {
        match container.tag() {
            Some(Tag::Map) => Ok(container.handle().unwrap()),
            Some(Tag::Instance) => {
                Ok(self.vm.heap().get_instance(container.handle().unwrap()).members)
            }
            _ => Err(self.record(NominalError::type_mismatch("target is not indexable"))),
        }
    }

    // -- GC ---------------------------------------------------------------

    pub fn collect_garbage(&mut self) -> usize {
        self.vm.force_collect()
    }

    // -- error flag (spec.md §7) --------------------------------------------

    pub fn error(&self) -> bool {
        self.error.is_some()
    }

    pub fn get_error(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(NominalError::runtime(message));
    }

    fn record(&mut self, err: NominalError) -> NominalError {
        self.error = Some(err.clone());
        err
    }

    fn record_if_err<T>(&mut self, result: Result<T, NominalError>) -> Result<T, NominalError> {
        if let Err(ref e) = result {
            self.error = Some(e.clone());
        }
        result
    }

    // -- module import (spec.md §4.7) --------------------------------------

    /// Resolves `name` to `<import_root>/<name>.nom`; returns the cached
    /// exported map if already imported, otherwise compiles and runs the
    /// file in a scope of its own, captures its top-level bindings as a
    /// map, caches it, and returns it. The search root is the current
    /// directory only (spec.md §9's Open Question — documented here as
    /// this crate's resolved behavior).
    pub fn nom_import(&mut self, name: &str) -> Result<Value, NominalError> {
        if let Some(&cached) = self.imports.get(name) {
            tracing::debug!(name, "import cache hit");
            return Ok(cached);
        }

        let path = self.import_root.join(format!("{name}.nom"));
        let src = fs::read_to_string(&path).map_err(|e| {
            self.record(NominalError::runtime(format!(
                "failed to import '{name}' from '{}': {e}",
                path.display()
            )))
        })?;

        let global = self.vm.global_scope();
        let import_scope = self.vm.heap_mut().alloc_scope(Some(global));
        let entry = parser::compile(&src, self.vm.heap_mut(), &mut self.program)
            .map_err(|e| self.record(e))?;
        self.vm
            .run_in_scope(&self.program, entry, import_scope)
            .map_err(|e| self.record(e))?;

        let exported = self.vm.heap_mut().alloc_map();
        let bindings = self.vm.heap().get_scope(import_scope).bindings_snapshot();
        for (name_handle, value) in bindings {
            let key = Value::interned_string(name_handle);
            self.vm.heap_mut().map_insert_or_set(exported, key, value);
        }
        let exported_value = Value::map(exported);
        self.imports.insert(name.to_string(), exported_value);
        Ok(exported_value)
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("program_len", &self.program.len())
            .field("has_error", &self.error())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_then_get_var() {
        let mut state = State::new();
        state.execute("x := 40 + 2").unwrap();
        assert_eq!(state.get_var("x").unwrap().as_f64(), Some(42.0));
    }

    #[test]
    fn evaluate_returns_trailing_expression() {
        let mut state = State::new();
        let result = state.evaluate("a := 1, a + 1").unwrap();
        assert_eq!(result.as_f64(), Some(2.0));
    }

    #[test]
    fn undefined_variable_sets_error_flag() {
        let mut state = State::new();
        assert!(state.get_var("missing").is_err());
        assert!(state.error());
        assert!(state.get_error().unwrap().contains("missing"));
    }

    #[test]
    fn new_function_is_invokable_from_script() {
        let mut state = State::new();
        let callback: NativeCallback = std::rc::Rc::new(|vm: &mut Vm, _program: &Program| {
            Ok(Value::number(vm.arg(0).as_f64().unwrap() * 2.0))
        });
        let doubled = state.new_function(callback);
        state.let_var("doubled", doubled).unwrap();
        let result = state.evaluate("doubled: 21").unwrap();
        assert_eq!(result.as_f64(), Some(42.0));
    }

    #[test]
    fn map_insert_and_get_roundtrip() {
        let mut state = State::new();
        let map = state.new_map();
        let key = state.new_string(b"name", true);
        let value = state.new_string(b"nominal", false);
        state.insert(map, key, value).unwrap();
        let got = state.get(map, key).unwrap();
        assert_eq!(state.as_string(got), "\"nominal\"");
    }
}
