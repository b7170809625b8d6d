//! Local variable slots for one function body.
//!
//! Script locals are function-wide: a name assigned anywhere in a function
//! refers to the same slot for the rest of it. Slots are numbered in
//! definition order, parameters first.

use std::collections::HashMap;

/// Slot indices are encoded as a single byte.
pub const MAX_LOCALS: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("too many local variables in one function (limit is 255)")]
pub struct TooManyLocals;

/// Function-wide local variable tracker.
#[derive(Debug, Clone, Default)]
pub struct LocalScope {
    locals: Vec<String>,
    by_name: HashMap<String, u8>,
}

impl LocalScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a local, or return its slot if it already exists.
    pub fn define(&mut self, name: &str) -> Result<u8, TooManyLocals> {
        if let Some(&slot) = self.by_name.get(name) {
            return Ok(slot);
        }
        if self.locals.len() >= MAX_LOCALS {
            return Err(TooManyLocals);
        }
        let slot = self.locals.len() as u8;
        self.locals.push(name.to_string());
        self.by_name.insert(name.to_string(), slot);
        Ok(slot)
    }

    /// Look up a local by name.
    pub fn lookup(&self, name: &str) -> Option<u8> {
        self.by_name.get(name).copied()
    }

    /// Local names in slot order.
    pub fn names(&self) -> Vec<String> {
        self.locals.clone()
    }

    pub fn len(&self) -> usize {
        self.locals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_lookup() {
        let mut scope = LocalScope::new();
        let x = scope.define("x").unwrap();
        let y = scope.define("y").unwrap();
        assert_eq!((x, y), (0, 1));
        assert_eq!(scope.define("x").unwrap(), 0);
        assert_eq!(scope.lookup("y"), Some(1));
        assert_eq!(scope.lookup("z"), None);
        assert_eq!(scope.names(), ["x", "y"]);
    }

    #[test]
    fn test_slot_limit() {
        let mut scope = LocalScope::new();
        for i in 0..MAX_LOCALS {
            scope.define(&format!("v{i}")).unwrap();
        }
        assert_eq!(scope.len(), 255);
        assert_eq!(scope.define("one_more"), Err(TooManyLocals));
        assert!(scope.define("v3").is_ok());
    }
}
