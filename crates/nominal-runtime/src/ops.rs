//! Value-level operations: equality, hashing, string formatting, and
//! arithmetic dispatch (spec.md §4.1).

use nominal_core::{Handle, Tag, Value};

use crate::heap::Heap;

/// Equality per spec.md §4.1: numbers by numeric value, booleans by
/// payload, nil only equals nil, strings bytewise (interned strings
/// compare by handle as a fast path, but that must agree with a
/// bytewise comparison across interned/non-interned strings), and
/// maps/classes/functions/instances by handle identity.
pub fn value_eq(heap: &Heap, a: Value, b: Value) -> bool {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x == y || (x.is_nan() && y.is_nan());
    }
    match (a.tag(), b.tag()) {
        (Some(Tag::Nil), Some(Tag::Nil)) => true,
        (Some(Tag::Bool), Some(Tag::Bool)) => a.as_bool() == b.as_bool(),
        (Some(Tag::String), Some(Tag::String))
        | (Some(Tag::String), Some(Tag::InternedString))
        | (Some(Tag::InternedString), Some(Tag::String))
        | (Some(Tag::InternedString), Some(Tag::InternedString)) => {
            let ha = a.handle().unwrap();
            let hb = b.handle().unwrap();
            ha == hb || heap.get_string(ha).as_bytes() == heap.get_string(hb).as_bytes()
        }
        (Some(ta), Some(tb)) if ta == tb => a.handle() == b.handle(),
        _ => false,
    }
}

/// Hashing per spec.md §4.1: numbers hash on canonicalized double bits
/// (NaN already canonicalized by `Value::number`), strings by FNV-1a
/// over bytes (both interned and plain — they must agree so that
/// `value_eq` implies `value_hash` equality), handles by identity.
pub fn value_hash(heap: &Heap, v: Value) -> u64 {
    if let Some(n) = v.as_f64() {
        return n.to_bits();
    }
    match v.tag().unwrap() {
        Tag::Nil => 0x9e37_79b9_0000_0001,
        Tag::Bool => if v.as_bool().unwrap() { 1 } else { 0 },
        Tag::String | Tag::InternedString => {
            crate::nomstring::fnv1a(heap.get_string(v.handle().unwrap()).as_bytes())
        }
        tag => {
            let mut h = v.handle().unwrap() as u64;
            h ^= (tag as u64).wrapping_shl(56);
            h
        }
    }
}

/// A human-readable, round-trippable-where-possible textual form
/// (spec.md §6 `as_string`, §8 round-trip property). Integral doubles
/// print without a trailing `.0`, matching spec.md §4.1's printing
/// policy and §9's "re-derive from the double" resolution of the
/// integer/float Open Question.
pub fn format_value(heap: &Heap, v: Value) -> String {
    if let Some(n) = v.as_f64() {
        return format_number(n);
    }
    match v.tag().unwrap() {
        Tag::Nil => "nil".to_string(),
        Tag::Bool => v.as_bool().unwrap().to_string(),
        Tag::String | Tag::InternedString => {
            format!("\"{}\"", escape_string(heap.get_string(v.handle().unwrap()).as_bytes()))
        }
        Tag::Map => {
            let handle = v.handle().unwrap();
            let map = heap.get_map(handle);
            let parts: Vec<String> = map
                .iter()
                .map(|(k, val)| format!("{} -> {}", format_value(heap, *k), format_value(heap, *val)))
                .collect();
            format!("{{ {} }}", parts.join(", "))
        }
        Tag::Function => "<function>".to_string(),
        Tag::Class => "<class>".to_string(),
        Tag::Instance => "<instance>".to_string(),
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn escape_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            _ => out.push(b as char),
        }
    }
    out
}

/// A purely numeric binary op, used by the VM's `BIN_OP` handler before
/// it falls back to instance-operator dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

pub fn numeric_binop(op: ArithOp, a: f64, b: f64) -> f64 {
    match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
    }
}

pub fn arith_op_symbol(op: ArithOp) -> &'static str {
    match op {
        ArithOp::Add => "+",
        ArithOp::Sub => "-",
        ArithOp::Mul => "*",
        ArithOp::Div => "/",
    }
}

/// Walks `class`'s parent chain looking for a member named `name`
/// (spec.md §4.6: operator dispatch first looks the operator up in the
/// instance's class). Returns the bound value if found — the VM
/// decides whether it's actually invokable.
pub fn lookup_class_member(heap: &Heap, class: Handle, name: Value) -> Option<Value> {
    let mut current = Some(class);
    while let Some(h) = current {
        let c = heap.get_class(h);
        if heap.map_contains(c.members, name) {
            return Some(heap.map_get(c.members, name));
        }
        current = c.parent;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_equal_regardless_of_literal_form() {
        let heap = Heap::new();
        assert!(value_eq(&heap, Value::number(2.0), Value::number(2.0)));
        assert!(!value_eq(&heap, Value::number(2.0), Value::number(3.0)));
    }

    #[test]
    fn equal_values_hash_equal() {
        let mut heap = Heap::new();
        let s1 = heap.intern_string(b"hi");
        let s2 = heap.alloc_string(*b"hi");
        let a = Value::interned_string(s1);
        let b = Value::string(s2);
        assert!(value_eq(&heap, a, b));
        assert_eq!(value_hash(&heap, a), value_hash(&heap, b));
    }

    #[test]
    fn integral_doubles_print_without_decimal() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(-2.0), "-2");
    }

    #[test]
    fn nil_only_equals_nil() {
        let heap = Heap::new();
        assert!(value_eq(&heap, Value::nil(), Value::nil()));
        assert!(!value_eq(&heap, Value::nil(), Value::bool(false)));
    }
}
