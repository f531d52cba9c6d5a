//! Local variable bindings of the function being lowered

use crate::instruction::StackSlot;
use std::collections::HashMap;
use tracing::trace;

/// Name → stack slot map with explicit shadowing.
///
/// Scopes are not stacked: a construct that introduces a binding keeps
/// whatever [`bind_local`](Self::bind_local) returned and hands it back to
/// [`unbind_local`](Self::unbind_local) when the scope ends.
#[derive(Debug, Default)]
pub struct SymbolTable {
    locals: HashMap<String, StackSlot>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup_local(&self, name: &str) -> Option<&StackSlot> {
        self.locals.get(name)
    }

    /// Binds `name` to `slot`, returning the binding it shadows
    pub fn bind_local(&mut self, name: &str, slot: StackSlot) -> Option<StackSlot> {
        trace!(name, slot = %slot, "bind");
        self.locals.insert(name.to_string(), slot)
    }

    /// Puts back the binding `bind_local` returned, or removes `name` if there was none
    pub fn unbind_local(&mut self, name: &str, previous: Option<StackSlot>) {
        trace!(name, restored = previous.is_some(), "unbind");
        match previous {
            Some(slot) => {
                self.locals.insert(name.to_string(), slot);
            }
            None => {
                self.locals.remove(name);
            }
        }
    }

    pub fn clear(&mut self) {
        self.locals.clear();
    }

    pub fn len(&self) -> usize {
        self.locals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }
}
