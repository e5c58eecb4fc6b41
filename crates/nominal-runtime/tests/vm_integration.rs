//! End-to-end bytecode scenarios exercised directly against `Vm`,
//! without going through the compiler front end (spec.md §8).

use nominal_runtime::{
    scope_declare, ArithOp, Class, ErrorKind, Instance, Instruction as I, Program, Value, Vm,
};

fn run(vm: &mut Vm, program: &Program, entry: usize) -> Value {
    vm.run(program, entry).expect("program should not error")
}

#[test]
fn closures_capture_their_defining_scope() {
    let mut vm = Vm::new();
    let captured = vm.heap_mut().intern_string(b"captured");
    let mut program = Program::new();

    // body: return captured
    let body = program.emit(I::GetVar(captured));
    program.emit(I::Return);

    // main: captured := 10; push function; invoke it immediately
    program.emit(I::PushNumber(10.0));
    program.emit(I::LetVar(captured));
    let main_entry = program.emit(I::PushFunction {
        entry: body,
        params: vec![],
    });
    program.emit(I::Invoke(0));
    program.emit(I::Return);

    let result = run(&mut vm, &program, main_entry);
    assert_eq!(result.as_f64(), Some(10.0));
}

#[test]
fn maps_store_and_retrieve_by_value_equality() {
    let mut vm = Vm::new();
    let mut program = Program::new();
    program.emit(I::NewMap);
    program.emit(I::PushNumber(1.0));
    program.emit(I::PushNumber(100.0));
    program.emit(I::MapInsert);
    program.emit(I::PushNumber(1.0));
    program.emit(I::Get);
    program.emit(I::Return);
    let result = run(&mut vm, &program, 0);
    assert_eq!(result.as_f64(), Some(100.0));
}

#[test]
fn undeclared_variable_access_errors() {
    let mut vm = Vm::new();
    let name = vm.heap_mut().intern_string(b"nope");
    let mut program = Program::new();
    program.emit(I::GetVar(name));
    program.emit(I::Return);
    let err = vm.run(&program, 0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UndefinedVariable);
}

#[test]
fn class_instances_respond_to_an_overloaded_operator() {
    let mut vm = Vm::new();

    // operator body: return a.value + b.value
    let value_key = vm.heap_mut().intern_string(b"value");
    let a_param = vm.heap_mut().intern_string(b"a");
    let b_param = vm.heap_mut().intern_string(b"b");

    let mut program = Program::new();
    let op_body = program.emit(I::GetVar(a_param));
    program.emit(I::PushString(value_key));
    program.emit(I::Get);
    program.emit(I::GetVar(b_param));
    program.emit(I::PushString(value_key));
    program.emit(I::Get);
    program.emit(I::BinOp(ArithOp::Add));
    program.emit(I::Return);

    let main_entry = program.emit(I::PushFunction {
        entry: op_body,
        params: vec![a_param, b_param],
    });
    program.emit(I::Return);
    let op_fn = run(&mut vm, &program, main_entry);

    let members = vm.heap_mut().alloc_map();
    let plus_name = vm.heap_mut().intern_string(b"+");
    vm.heap_mut()
        .map_insert(members, Value::interned_string(plus_name), op_fn)
        .unwrap();
    let class = vm.heap_mut().alloc_class(Class::new(members, None));

    let one_members = vm.heap_mut().clone_map(members);
    let one = vm.heap_mut().alloc_instance(Instance::new(class, one_members));
    vm.heap_mut().map_insert_or_set(
        one_members,
        Value::interned_string(value_key),
        Value::number(3.0),
    );

    let two_members = vm.heap_mut().clone_map(members);
    let two = vm.heap_mut().alloc_instance(Instance::new(class, two_members));
    vm.heap_mut().map_insert_or_set(
        two_members,
        Value::interned_string(value_key),
        Value::number(4.0),
    );

    let a_name = vm.heap_mut().intern_string(b"one_inst");
    let b_name = vm.heap_mut().intern_string(b"two_inst");
    let global = vm.global_scope();
    scope_declare(vm.heap_mut(), global, a_name, Value::instance(one));
    scope_declare(vm.heap_mut(), global, b_name, Value::instance(two));

    let mut add_program = Program::new();
    add_program.emit(I::GetVar(a_name));
    add_program.emit(I::GetVar(b_name));
    add_program.emit(I::BinOp(ArithOp::Add));
    add_program.emit(I::Return);

    let result = vm.run(&add_program, 0).unwrap();
    assert_eq!(result.as_f64(), Some(7.0));
}

#[test]
fn unreachable_cycles_are_collected_under_allocation_pressure() {
    let mut vm = Vm::new();
    for _ in 0..2000 {
        let m = vm.heap_mut().alloc_map();
        vm.heap_mut()
            .map_insert_or_set(m, Value::number(0.0), Value::map(m));
    }
    let reclaimed = vm.force_collect();
    assert!(reclaimed >= 1900);
}
