//! Runtime faults
//!
//! Everything that can go wrong while a script runs is a [`Fault`]. Only
//! [`Fault::Thrown`] is visible to script `catch` clauses; the others are
//! sandbox faults that unwind straight to the entry shim, which converts all
//! of them into a [`ScriptException`](crate::vm::exception::ScriptException).

use crate::vm::exception::ScriptException;
use crate::vm::value::ExceptionObject;
use crate::whitelist::Whitelist;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum Fault {
    /// A script exception, catchable by class
    #[error("{0}")]
    Thrown(Arc<ExceptionObject>),

    /// The loop counter ran out
    #[error("The maximum number of statements that can be executed in a loop has been reached ({limit}).")]
    TooManyOperations { limit: u32 },

    /// Script calls nested deeper than the call depth or stack budget allows
    #[error("Stack overflow at script call depth {depth}")]
    StackOverflow { depth: usize },

    /// An allocation larger than the configured cap
    #[error("Out of memory: requested {requested} elements, limit is {limit}")]
    OutOfMemory { requested: usize, limit: usize },

    /// A dynamic call site matched more than one member at the receiver type
    #[error("{0}")]
    Dispatch(String),

    /// Broken invariant or panicking native
    #[error("Internal error: {0}")]
    Internal(String),

    /// Already normalized by the entry shim
    #[error("{0}")]
    Translated(Box<ScriptException>),
}

impl Fault {
    /// A script exception of the named whitelist class. Falls back to the
    /// closest existing superclass when the whitelist lacks the class.
    pub fn exception(whitelist: &Whitelist, class_name: &str, message: impl Into<String>) -> Fault {
        let class = whitelist.exception_class(class_name);
        let class_name = whitelist.class(class).name.clone();
        Fault::Thrown(Arc::new(ExceptionObject {
            class,
            class_name,
            message: Some(message.into()),
            cause: None,
        }))
    }

    pub fn null_pointer(whitelist: &Whitelist, message: impl Into<String>) -> Fault {
        Fault::exception(whitelist, "NullPointerException", message)
    }

    pub fn class_cast(whitelist: &Whitelist, message: impl Into<String>) -> Fault {
        Fault::exception(whitelist, "ClassCastException", message)
    }

    pub fn arithmetic(whitelist: &Whitelist, message: impl Into<String>) -> Fault {
        Fault::exception(whitelist, "ArithmeticException", message)
    }

    pub fn illegal_argument(whitelist: &Whitelist, message: impl Into<String>) -> Fault {
        Fault::exception(whitelist, "IllegalArgumentException", message)
    }

    pub fn index_out_of_bounds(whitelist: &Whitelist, index: i64, length: usize) -> Fault {
        Fault::exception(
            whitelist,
            "IndexOutOfBoundsException",
            format!("Index {} out of bounds for length {}", index, length),
        )
    }

    /// Whether a script `catch` clause may observe this fault.
    pub fn is_catchable(&self) -> bool {
        matches!(self, Fault::Thrown(_))
    }

    /// Class name reported in the translated exception.
    pub fn class_name(&self) -> &str {
        match self {
            Fault::Thrown(e) => &e.class_name,
            Fault::TooManyOperations { .. } => "TooManyOperationsError",
            Fault::StackOverflow { .. } => "StackOverflowError",
            Fault::OutOfMemory { .. } => "OutOfMemoryError",
            Fault::Dispatch(_) => "AmbiguousDispatchError",
            Fault::Internal(_) => "InternalError",
            Fault::Translated(e) => &e.class_name,
        }
    }
}
