//! Exercises the prelude natives (spec.md §1's external collaborator
//! list) and the standalone driver's file-execution path end to end.

use std::io::Write;

use nominal_cli::prelude;
use nominal_compiler::State;

fn new_state_with_prelude() -> State {
    let mut state = State::new();
    prelude::install(&mut state);
    state
}

#[test]
fn if_native_dispatches_on_condition() {
    let mut state = new_state_with_prelude();
    let value = state
        .evaluate("if: [ true ] [ 1 ] [ 2 ]")
        .expect("if should not error");
    assert_eq!(state.as_f64(value), Some(1.0));

    let value = state
        .evaluate("if: [ false ] [ 1 ] [ 2 ]")
        .expect("if should not error");
    assert_eq!(state.as_f64(value), Some(2.0));
}

#[test]
fn recursive_fibonacci_via_installed_prelude() {
    let mut state = new_state_with_prelude();
    let def = "f := [ n | if: [ n < 2 ] [ n ] [ f: (n - 1) + f: (n - 2) ] ]";
    state.execute(def).expect("defining f should not error");
    let seven = state.evaluate("f: 7").expect("f: 7 should not error");
    let eight = state.evaluate("f: 8").expect("f: 8 should not error");
    assert_eq!(state.as_f64(seven), Some(13.0));
    assert_eq!(state.as_f64(eight), Some(21.0));
}

#[test]
fn while_native_loops_until_condition_is_false() {
    let mut state = new_state_with_prelude();
    state.execute("i := 0").expect("declaring i should not error");
    state
        .execute("while: [ i < 5 ] [ i = i + 1 ]")
        .expect("while should not error");
    let i = state.evaluate("i").expect("reading i should not error");
    assert_eq!(state.as_f64(i), Some(5.0));
}

#[test]
fn for_keys_and_for_values_visit_every_entry() {
    let mut state = new_state_with_prelude();
    state
        .execute("m := { \"a\" -> 1, \"b\" -> 2, \"c\" -> 3 }")
        .expect("declaring m should not error");
    state
        .execute("keySum := 0, forKeys: m [ k | keySum = keySum + 1 ]")
        .expect("forKeys should not error");
    state
        .execute("valueSum := 0, forValues: m [ v | valueSum = valueSum + v ]")
        .expect("forValues should not error");

    let key_sum = state.evaluate("keySum").unwrap();
    let value_sum = state.evaluate("valueSum").unwrap();
    assert_eq!(state.as_f64(key_sum), Some(3.0));
    assert_eq!(state.as_f64(value_sum), Some(6.0));
}

#[test]
fn assert_equal_passes_on_equal_values_and_fails_on_unequal() {
    let mut state = new_state_with_prelude();
    state
        .execute("assertEqual: 1 1")
        .expect("assertEqual on equal values should not error");

    let err = state.evaluate("assertEqual: 1 2").unwrap_err();
    assert!(err.message.contains("assertEqual failed"));
}

#[test]
fn collect_garbage_native_returns_a_number() {
    let mut state = new_state_with_prelude();
    let reclaimed = state
        .evaluate("collectGarbage: ")
        .expect("collectGarbage should not error");
    assert!(state.as_f64(reclaimed).is_some());
}

#[test]
fn do_file_executes_a_script_from_disk() {
    let mut state = new_state_with_prelude();
    let mut file = tempfile::NamedTempFile::new().expect("should create a temp file");
    write!(file, "result := 2 + 2").expect("should write to the temp file");

    state
        .do_file(file.path())
        .expect("do_file should not error");
    let result = state.evaluate("result").expect("reading result should not error");
    assert_eq!(state.as_f64(result), Some(4.0));
}
