//! The error taxonomy from spec.md §7, as a hand-rolled enum with a
//! manual `Display`/`Error` impl — the style the teacher's
//! `CodeGenError` (`seq-compiler/src/codegen/error.rs`) uses, rather
//! than pulling in `thiserror`, which the teacher workspace does not
//! depend on.

use std::fmt;

/// The kind half of spec.md's error taxonomy. Carries no payload of its
/// own; the human-readable detail lives in [`NominalError::message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ParseError,
    UndefinedVariable,
    Redeclaration,
    TypeMismatch,
    NotInvokable,
    ArgumentArity,
    KeyNotFound,
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ParseError => "ParseError",
            ErrorKind::UndefinedVariable => "UndefinedVariable",
            ErrorKind::Redeclaration => "Redeclaration",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::NotInvokable => "NotInvokable",
            ErrorKind::ArgumentArity => "ArgumentArity",
            ErrorKind::KeyNotFound => "KeyNotFound",
            ErrorKind::Runtime => "Runtime",
        };
        write!(f, "{s}")
    }
}

/// An error that sets the state's error slot (spec.md §7). Every
/// documented failure produces one of these with a non-empty message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NominalError {
    pub kind: ErrorKind,
    pub message: String,
}

impl NominalError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        NominalError {
            kind,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseError, message)
    }

    pub fn undefined_variable(name: &str) -> Self {
        Self::new(
            ErrorKind::UndefinedVariable,
            format!("Undefined variable '{name}'"),
        )
    }

    pub fn redeclaration(name: &str) -> Self {
        Self::new(
            ErrorKind::Redeclaration,
            format!("'{name}' is already declared in this scope"),
        )
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch, message)
    }

    pub fn not_invokable() -> Self {
        Self::new(ErrorKind::NotInvokable, "Value cannot be called")
    }

    pub fn argument_arity(expected: usize) -> Self {
        Self::new(
            ErrorKind::ArgumentArity,
            format!("Too many arguments given (expected {expected})"),
        )
    }

    pub fn key_not_found() -> Self {
        Self::new(ErrorKind::KeyNotFound, "Key not found")
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, message)
    }
}

impl fmt::Display for NominalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for NominalError {}

pub type Result<T> = std::result::Result<T, NominalError>;
