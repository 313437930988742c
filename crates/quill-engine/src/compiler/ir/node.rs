//! IR tree nodes
//!
//! Every conversion is an explicit [`Expr::Cast`], every call is an
//! [`Expr::Invoke`] with one of the [`Invoke`] kinds, and every expression
//! produces exactly one value when evaluated for its result (void calls
//! produce `null`).

use crate::parser::ast::{BinaryOp, CompareOp, LogicalOp, RegexOp, UnaryOp};
use crate::semantic::{Cast, IndexAccess};
use crate::vm::value::{format_double, Value};
use crate::whitelist::{DefReference, MemberId, ScriptType};
use std::fmt;

/// Compile-time constant
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Str(String),
}

impl Constant {
    /// Constant form of a whitelisted constant value; `None` for values
    /// that have no literal form.
    pub fn from_value(value: &Value) -> Option<Constant> {
        Some(match value {
            Value::Null => Constant::Null,
            Value::Bool(b) => Constant::Bool(*b),
            Value::Int(i) => Constant::Int(*i),
            Value::Long(l) => Constant::Long(*l),
            Value::Double(d) => Constant::Double(*d),
            Value::Str(s) => Constant::Str(s.to_string()),
            _ => return None,
        })
    }

    /// Text this constant contributes to a string concatenation.
    pub fn concat_text(&self) -> String {
        match self {
            Constant::Null => "null".to_string(),
            Constant::Bool(b) => b.to_string(),
            Constant::Int(i) => i.to_string(),
            Constant::Long(l) => l.to_string(),
            Constant::Double(d) => format_double(*d),
            Constant::Str(s) => s.clone(),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => f.write_str("null"),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Int(i) => write!(f, "{}", i),
            Constant::Long(l) => write!(f, "{}L", l),
            Constant::Double(d) => write!(f, "{}D", format_double(*d)),
            Constant::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Call forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invoke {
    /// Function of the same class, by index
    Local(u16),
    Static(MemberId),
    /// Receiver is the first argument
    Virtual(MemberId),
    /// Function value is the first argument
    Functional(MemberId),
    Constructor(MemberId),
    Binding(MemberId),
    /// Receiver is the first argument; resolved per call site at run time
    Dynamic(DefReference),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRef {
    Instance(MemberId),
    Static(MemberId),
    /// Field of a `def` receiver, looked up by name at run time
    Dynamic(String),
}

/// Assignable location.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Local(u16),
    Static(u16),
    Field {
        receiver: Option<Box<Expr>>,
        field: FieldRef,
    },
    Index {
        receiver: Box<Expr>,
        index: Box<Expr>,
        access: IndexAccess,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Constant),
    Local(u16),
    /// Static slot of the class, set by the static initializer
    Static(u16),
    Unary {
        op: UnaryOp,
        ty: ScriptType,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        ty: ScriptType,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// String concatenation of any number of parts
    Concat(Vec<Expr>),
    Compare {
        op: CompareOp,
        ty: ScriptType,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    RegexMatch {
        op: RegexOp,
        input: Box<Expr>,
        pattern: Box<Expr>,
    },
    /// Compile a pattern (flags already inlined)
    Regex(String),
    Cast {
        cast: Cast,
        value: Box<Expr>,
    },
    InstanceOf {
        ty: ScriptType,
        value: Box<Expr>,
    },
    IsNull(Box<Expr>),
    Conditional {
        condition: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
    Elvis {
        value: Box<Expr>,
        fallback: Box<Expr>,
    },
    /// Assign and produce the assigned value
    Store {
        target: Target,
        value: Box<Expr>,
    },
    /// Evaluate `value` into `slot`, then produce `body`
    Let {
        slot: u16,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    /// Evaluate every expression in order and produce the last one
    Seq(Vec<Expr>),
    Invoke {
        invoke: Invoke,
        args: Vec<Expr>,
        void: bool,
    },
    Field {
        receiver: Option<Box<Expr>>,
        field: FieldRef,
    },
    ArrayLength(Box<Expr>),
    Index {
        receiver: Box<Expr>,
        index: Box<Expr>,
        access: IndexAccess,
    },
    /// `ty` is the array type
    NewArray {
        ty: ScriptType,
        length: Box<Expr>,
    },
    ArrayInit {
        ty: ScriptType,
        values: Vec<Expr>,
    },
    ListInit(Vec<Expr>),
    MapInit(Vec<(Expr, Expr)>),
    /// Function value over a local function; captures come first in its
    /// parameter list
    Closure {
        function: u16,
        captures: Vec<Expr>,
    },
    /// Start iterating any iterable value
    Iterate(Box<Expr>),
    IterHasNext(Box<Expr>),
    IterNext(Box<Expr>),
}

impl Expr {
    pub fn boxed(self) -> Box<Expr> {
        Box::new(self)
    }

    pub fn constant(&self) -> Option<&Constant> {
        match self {
            Expr::Const(c) => Some(c),
            _ => None,
        }
    }

    /// Apply `cast` when present.
    pub fn cast(self, cast: Option<&Cast>) -> Expr {
        match cast {
            Some(cast) => Expr::Cast {
                cast: cast.clone(),
                value: Box::new(self),
            },
            None => self,
        }
    }

    /// Direct child expressions, mutably, in evaluation order.
    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Const(_) | Expr::Local(_) | Expr::Static(_) | Expr::Regex(_) => Vec::new(),
            Expr::Unary { operand, .. } => vec![operand],
            Expr::Binary { left, right, .. }
            | Expr::Compare { left, right, .. }
            | Expr::Logical { left, right, .. } => vec![left, right],
            Expr::RegexMatch { input, pattern, .. } => vec![input, pattern],
            Expr::Concat(parts) | Expr::Seq(parts) | Expr::ListInit(parts) => parts.iter_mut().collect(),
            Expr::ArrayInit { values, .. } => values.iter_mut().collect(),
            Expr::Invoke { args, .. } => args.iter_mut().collect(),
            Expr::Closure { captures, .. } => captures.iter_mut().collect(),
            Expr::Cast { value, .. }
            | Expr::InstanceOf { value, .. }
            | Expr::IsNull(value)
            | Expr::ArrayLength(value)
            | Expr::Iterate(value)
            | Expr::IterHasNext(value)
            | Expr::IterNext(value) => vec![value],
            Expr::NewArray { length, .. } => vec![length],
            Expr::Conditional {
                condition,
                then_value,
                else_value,
            } => vec![condition, then_value, else_value],
            Expr::Elvis { value, fallback } => vec![value, fallback],
            Expr::Store { target, value } => {
                let mut children = target.children_mut();
                children.push(value);
                children
            }
            Expr::Let { value, body, .. } => vec![value, body],
            Expr::Field { receiver, .. } => receiver.iter_mut().map(|r| &mut **r).collect(),
            Expr::Index { receiver, index, .. } => vec![receiver, index],
            Expr::MapInit(entries) => entries.iter_mut().flat_map(|(k, v)| [k, v]).collect(),
        }
    }
}

impl Target {
    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Target::Local(_) | Target::Static(_) => Vec::new(),
            Target::Field { receiver, .. } => receiver.iter_mut().map(|r| &mut **r).collect(),
            Target::Index { receiver, index, .. } => vec![receiver, index],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub ty: ScriptType,
    /// Slot that receives the exception
    pub slot: u16,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Source offset of the statements that follow
    Position(usize),
    /// Evaluate for effect only
    Expr(Expr),
    If {
        condition: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    /// `while` and `for` test first; `do` tests after the body. `continue`
    /// jumps to `update`.
    Loop {
        condition: Option<Expr>,
        body: Vec<Stmt>,
        update: Vec<Stmt>,
        test_first: bool,
    },
    Break,
    Continue,
    /// `None` returns null
    Return(Option<Expr>),
    Throw(Expr),
    Try {
        body: Vec<Stmt>,
        catches: Vec<CatchClause>,
    },
    Block(Vec<Stmt>),
}

impl Stmt {
    /// Expressions directly held by this statement.
    pub fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Stmt::Expr(e) | Stmt::Throw(e) | Stmt::Return(Some(e)) => vec![e],
            Stmt::If { condition, .. } => vec![condition],
            Stmt::Loop { condition, .. } => condition.iter_mut().collect(),
            _ => Vec::new(),
        }
    }

    /// Nested statement lists.
    pub fn bodies_mut(&mut self) -> Vec<&mut Vec<Stmt>> {
        match self {
            Stmt::If {
                then_body, else_body, ..
            } => vec![then_body, else_body],
            Stmt::Loop { body, update, .. } => vec![body, update],
            Stmt::Try { body, catches } => {
                let mut bodies = vec![body];
                bodies.extend(catches.iter_mut().map(|c| &mut c.body));
                bodies
            }
            Stmt::Block(body) => vec![body],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Entry,
    Declared,
    Lambda,
    Adapter,
    /// Synthesized `$name`, `$source`, `$statements`, `$needs$*`
    Accessor,
    StaticInit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    pub name: String,
    pub kind: FunctionKind,
    pub params: u16,
    /// Slots used, parameters and temporaries included
    pub slots: u16,
    pub body: Vec<Stmt>,
}

/// One compiled script.
#[derive(Debug, Clone, PartialEq)]
pub struct IrClass {
    pub name: String,
    pub source: String,
    /// Entry first, then declared and synthetic functions, then accessors
    pub functions: Vec<IrFunction>,
    pub static_slots: u16,
    /// Index of the static initializer, when there is one
    pub static_init: Option<u16>,
}

impl IrClass {
    pub fn function(&self, name: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// Apply `f` to every expression of a statement list, children first.
pub fn rewrite_exprs(body: &mut [Stmt], f: &mut dyn FnMut(&mut Expr)) {
    for stmt in body.iter_mut() {
        for expr in stmt.exprs_mut() {
            rewrite_expr(expr, f);
        }
        for nested in stmt.bodies_mut() {
            rewrite_exprs(nested, f);
        }
    }
}

/// Apply `f` to `expr` and all its descendants, children first.
pub fn rewrite_expr(expr: &mut Expr, f: &mut dyn FnMut(&mut Expr)) {
    for child in expr.children_mut() {
        rewrite_expr(child, f);
    }
    f(expr);
}
