//! Lexical scopes and slot allocation.
//!
//! Each function (entry, declared function or lambda) gets a [`Frame`] with
//! a stack of block scopes. Slots are handed out monotonically per frame and
//! never reused, so a slot always holds one variable.

use crate::whitelist::ScriptType;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub ty: ScriptType,
    pub slot: u16,
    /// Captured copies inside lambdas cannot be assigned
    pub readonly: bool,
    /// Declared by the script context rather than the script
    pub context_param: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeError {
    AlreadyDefined,
    TooManyLocals,
}

#[derive(Debug)]
pub struct Frame {
    scopes: Vec<FxHashMap<String, Variable>>,
    next_slot: u32,
    pub return_type: ScriptType,
    pub loop_depth: u32,
    pub is_lambda: bool,
}

impl Frame {
    pub fn new(return_type: ScriptType, is_lambda: bool) -> Self {
        Self {
            scopes: vec![FxHashMap::default()],
            next_slot: 0,
            return_type,
            loop_depth: 0,
            is_lambda,
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn allocate(&mut self) -> Result<u16, ScopeError> {
        let slot = u16::try_from(self.next_slot).map_err(|_| ScopeError::TooManyLocals)?;
        self.next_slot += 1;
        Ok(slot)
    }

    /// Declare a variable in the innermost scope. Shadowing any visible
    /// variable is rejected.
    pub fn declare(
        &mut self,
        name: &str,
        ty: ScriptType,
        readonly: bool,
        context_param: bool,
    ) -> Result<Variable, ScopeError> {
        if self.lookup(name).is_some() {
            return Err(ScopeError::AlreadyDefined);
        }
        let variable = Variable {
            name: name.to_string(),
            ty,
            slot: self.allocate()?,
            readonly,
            context_param,
        };
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), variable.clone());
        }
        Ok(variable)
    }

    /// A slot with no name, for loop cursors and similar.
    pub fn hidden(&mut self) -> Result<u16, ScopeError> {
        self.allocate()
    }

    /// Slots used so far.
    pub fn max_slots(&self) -> u16 {
        self.next_slot.min(u16::MAX as u32) as u16
    }
}

/// The frames of the functions being analyzed. The innermost frame is
/// always present; variable lookup only sees that frame.
#[derive(Debug)]
pub struct Scopes {
    current: Frame,
    enclosing: Vec<Frame>,
}

impl Scopes {
    pub fn new(frame: Frame) -> Self {
        Self {
            current: frame,
            enclosing: Vec::new(),
        }
    }

    /// Make `frame` the current frame until the matching [`Scopes::exit`].
    pub fn enter(&mut self, frame: Frame) {
        let outer = std::mem::replace(&mut self.current, frame);
        self.enclosing.push(outer);
    }

    /// Leave the current frame and return it. The outermost frame stays.
    pub fn exit(&mut self) -> Option<Frame> {
        let outer = self.enclosing.pop()?;
        Some(std::mem::replace(&mut self.current, outer))
    }

    pub fn current(&self) -> &Frame {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut Frame {
        &mut self.current
    }

    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        self.current.lookup(name)
    }

    pub fn depth(&self) -> usize {
        self.enclosing.len() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_monotonic() {
        let mut frame = Frame::new(ScriptType::Void, false);
        let a = frame.declare("a", ScriptType::Int, false, false).unwrap();
        frame.push_scope();
        let b = frame.declare("b", ScriptType::Int, false, false).unwrap();
        frame.pop_scope();
        let c = frame.declare("c", ScriptType::Int, false, false).unwrap();
        assert_eq!((a.slot, b.slot, c.slot), (0, 1, 2));
        assert!(frame.lookup("b").is_none());
        assert_eq!(frame.max_slots(), 3);
    }

    #[test]
    fn test_shadowing_rejected() {
        let mut frame = Frame::new(ScriptType::Void, false);
        frame.declare("a", ScriptType::Int, false, false).unwrap();
        frame.push_scope();
        assert_eq!(
            frame.declare("a", ScriptType::Long, false, false),
            Err(ScopeError::AlreadyDefined)
        );
    }

    #[test]
    fn test_frames_hide_outer_variables() {
        let mut outer = Frame::new(ScriptType::Void, false);
        outer.declare("x", ScriptType::Int, false, false).unwrap();
        let mut scopes = Scopes::new(outer);
        scopes.enter(Frame::new(ScriptType::Def, true));
        assert!(scopes.lookup("x").is_none());
        assert_eq!(scopes.depth(), 2);
        let inner = scopes.exit().unwrap();
        assert!(inner.is_lambda);
        assert_eq!(scopes.lookup("x").map(|v| v.slot), Some(0));
        assert!(scopes.exit().is_none());
    }
}
