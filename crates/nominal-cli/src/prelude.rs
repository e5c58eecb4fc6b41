//! Native functions installed into every `State` before a host's own
//! script runs (spec.md §8's worked scenarios assume these exist):
//! `print`, `if`, `while`, `forKeys`, `forValues`, `assertEqual`, and
//! `collectGarbage`. Branch/loop bodies arrive as zero-argument
//! function-literal thunks, invoked back into the VM via `vm.invoke`.

use std::rc::Rc;

use nominal_compiler::State;
use nominal_runtime::{format_value, value_eq, NominalError, Program, Tag, Value, Vm};

pub fn install(state: &mut State) {
    register(state, "print", print);
    register(state, "if", if_);
    register(state, "while", while_);
    register(state, "forKeys", for_keys);
    register(state, "forValues", for_values);
    register(state, "assertEqual", assert_equal);
    register(state, "collectGarbage", collect_garbage);
}

fn register(
    state: &mut State,
    name: &str,
    callback: impl Fn(&mut Vm, &Program) -> Result<Value, NominalError> + 'static,
) {
    let value = state.new_function(Rc::new(callback));
    state
        .let_var(name, value)
        .expect("prelude names are declared once at startup");
}

fn print(vm: &mut Vm, _program: &Program) -> Result<Value, NominalError> {
    let parts: Vec<String> = (0..vm.arg_count())
        .map(|i| format_value(vm.heap(), vm.arg(i)))
        .collect();
    println!("{}", parts.join(" "));
    Ok(Value::nil())
}

fn if_(vm: &mut Vm, program: &Program) -> Result<Value, NominalError> {
    let cond = invoke_arg(vm, program, 0)?;
    if cond.is_truthy() {
        invoke_arg(vm, program, 1)
    } else if vm.arg_count() > 2 {
        invoke_arg(vm, program, 2)
    } else {
        Ok(Value::nil())
    }
}

fn while_(vm: &mut Vm, program: &Program) -> Result<Value, NominalError> {
    loop {
        let cond = invoke_arg(vm, program, 0)?;
        if !cond.is_truthy() {
            return Ok(Value::nil());
        }
        invoke_arg(vm, program, 1)?;
    }
}

fn for_keys(vm: &mut Vm, program: &Program) -> Result<Value, NominalError> {
    for_each(vm, program, |k, _v| k)
}

fn for_values(vm: &mut Vm, program: &Program) -> Result<Value, NominalError> {
    for_each(vm, program, |_k, v| v)
}

fn for_each(
    vm: &mut Vm,
    program: &Program,
    pick: impl Fn(Value, Value) -> Value,
) -> Result<Value, NominalError> {
    let map = vm.arg(0);
    let callback = vm.arg(1);
    let handle = map
        .handle_with_tag(Tag::Map)
        .ok_or_else(|| NominalError::type_mismatch("forKeys/forValues requires a map"))?;
    let mut cursor = 0usize;
    loop {
        let next = vm.heap().map_move_next(handle, &mut cursor);
        match next {
            Some((k, v)) => {
                vm.invoke(program, callback, vec![pick(k, v)])?;
            }
            None => return Ok(Value::nil()),
        }
    }
}

fn assert_equal(vm: &mut Vm, _program: &Program) -> Result<Value, NominalError> {
    let a = vm.arg(0);
    let b = vm.arg(1);
    if value_eq(vm.heap(), a, b) {
        Ok(Value::bool(true))
    } else {
        Err(NominalError::runtime(format!(
            "assertEqual failed: {} != {}",
            format_value(vm.heap(), a),
            format_value(vm.heap(), b)
        )))
    }
}

fn collect_garbage(vm: &mut Vm, _program: &Program) -> Result<Value, NominalError> {
    Ok(Value::number(vm.force_collect() as f64))
}

fn invoke_arg(vm: &mut Vm, program: &Program, index: usize) -> Result<Value, NominalError> {
    let thunk = vm.arg(index);
    vm.invoke(program, thunk, vec![])
}
