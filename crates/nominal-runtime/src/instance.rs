//! `Instance`: a class handle plus a member map (spec.md §3).

use nominal_core::Handle;

#[derive(Debug, Clone)]
pub struct Instance {
    pub class: Handle,
    /// Handle of a `NomMap` heap object — a fresh copy of the class's
    /// members made at construction time (spec.md §4.6).
    pub members: Handle,
}

impl Instance {
    pub fn new(class: Handle, members: Handle) -> Self {
        Instance { class, members }
    }
}
