//! `Class`: a map of named members plus an optional parent class
//! (spec.md §3).

use nominal_core::Handle;

#[derive(Debug, Clone)]
pub struct Class {
    /// Handle of a `NomMap` heap object holding the class's members
    /// (methods, operator overloads, and any other named values).
    pub members: Handle,
    pub parent: Option<Handle>,
}

impl Class {
    pub fn new(members: Handle, parent: Option<Handle>) -> Self {
        Class { members, parent }
    }
}
