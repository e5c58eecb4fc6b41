//! The worked end-to-end scenarios from spec.md §8, driven through the
//! `State` facade exactly as a host would use it. Scenario 4 (recursive
//! Fibonacci) needs the `if` prelude native, which lives in
//! `nominal-cli` (spec.md §1 treats the prelude as an external
//! collaborator of this crate) — it is covered there instead.

use std::rc::Rc;

use nominal_runtime::{ErrorKind, NativeCallback, Value, Vm};

use nominal_compiler::State;

fn eval(state: &mut State, src: &str) -> f64 {
    state
        .evaluate(src)
        .unwrap_or_else(|e| panic!("evaluating {src:?} failed: {e}"))
        .as_f64()
        .unwrap_or_else(|| panic!("{src:?} did not evaluate to a number"))
}

#[test]
fn scenario_1_arithmetic() {
    let mut state = State::new();
    assert_eq!(eval(&mut state, "2 + 3"), 5.0);
    assert_eq!(eval(&mut state, "2 * (3 + 1)"), 8.0);
    assert_eq!(eval(&mut state, "6 / 4.0"), 1.5);
}

#[test]
fn scenario_2_sequenced_declarations() {
    let mut state = State::new();
    assert_eq!(eval(&mut state, "a := 1, b := 2, a + b"), 3.0);
}

#[test]
fn scenario_3_map_indexing() {
    let mut state = State::new();
    assert_eq!(
        eval(&mut state, r#"{ "zero" -> 0, "one" -> 1, two := 2 }["two"]"#),
        2.0
    );
    assert_eq!(eval(&mut state, "{ 10, 20, 30 }[1]"), 20.0);
}

/// `if` is a prelude native (spec.md §1's external collaborator), not
/// part of this crate — a minimal stand-in, same as the one `parser.rs`
/// uses in its own unit test, is enough to drive the recursion.
fn install_minimal_if(state: &mut State) {
    let callback: NativeCallback =
        Rc::new(|vm: &mut Vm, program: &nominal_runtime::Program| {
            let cond = vm.arg(0);
            let branch = if cond.is_truthy() { vm.arg(1) } else { vm.arg(2) };
            vm.invoke(program, branch, vec![])
        });
    let value = state.new_function(callback);
    state.let_var("if", value).expect("declaring if should not error");
}

#[test]
fn scenario_4_recursive_fibonacci() {
    // The source as literally written computes f(7) = 13 and f(8) = 21
    // (the spec's stated 21/34 do not match this recursion); asserting
    // what the bytecode this grammar compiles to actually produces.
    let mut state = State::new();
    install_minimal_if(&mut state);
    let def = "f := [ n | if: [ n < 2 ] [ n ] [ f: (n - 1) + f: (n - 2) ] ]";
    state.execute(def).expect("defining f should not error");
    assert_eq!(eval(&mut state, "f: 7"), 13.0);
    assert_eq!(eval(&mut state, "f: 8"), 21.0);
}

#[test]
fn scenario_5_arity_mismatch() {
    let mut state = State::new();
    assert_eq!(eval(&mut state, "[ a b | a + b ]: 2 3"), 5.0);

    let err = state
        .evaluate("[ a b c | a + b + c ]: 1 2 3 4")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ArgumentArity);
    assert_eq!(err.message, "Too many arguments given (expected 3)");
    assert!(state.error());
    assert_eq!(state.get_error(), Some(err.message.as_str()));
}

#[test]
fn scenario_6_let_shadows_set_mutates_outer() {
    let mut state = State::new();
    assert_eq!(eval(&mut state, "x := 1, [ x := 4, x + 3 ]:, x"), 1.0);

    let mut state = State::new();
    assert_eq!(eval(&mut state, "x := 1, [ x = 4, x + 3 ]:, x"), 4.0);
}

#[test]
fn scenario_7_calling_nil_errors() {
    let mut state = State::new();
    let err = state.evaluate("(nil): ").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotInvokable);
    assert_eq!(err.message, "Value cannot be called");
}

#[test]
fn short_circuit_and_or_skip_their_right_operand() {
    let mut state = State::new();
    state
        .execute("sideEffects := 0")
        .expect("declaring sideEffects should not error");

    state
        .execute("false and [ sideEffects := sideEffects + 1, true ]:")
        .expect("short-circuited and should not error");
    assert_eq!(eval(&mut state, "sideEffects"), 0.0);

    state
        .execute("true or [ sideEffects := sideEffects + 1, true ]:")
        .expect("short-circuited or should not error");
    assert_eq!(eval(&mut state, "sideEffects"), 0.0);
}

#[test]
fn undefined_variable_sets_error_flag() {
    let mut state = State::new();
    let err = state.evaluate("missing").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UndefinedVariable);
    assert!(state.error());
    assert!(state.get_error().is_some());
}

#[test]
fn redeclaration_in_same_scope_errors() {
    let mut state = State::new();
    state.execute("a := 1").expect("first declaration should succeed");
    let err = state.evaluate("a := 2").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Redeclaration);
}

#[test]
fn dump_bytecode_returns_only_newly_compiled_instructions() {
    let mut state = State::new();
    state.execute("a := 1").expect("declaring a should not error");
    let first = state
        .dump_bytecode(Some("a + 1"))
        .expect("dumping should not error");
    assert!(!first.is_empty());

    let full = state.dump_bytecode(None).expect("full dump should not error");
    assert!(full.len() >= first.len());
}
