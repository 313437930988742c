//! Syntax tree for Quill scripts.
//!
//! Nodes live in an arena owned by [`SyntaxTree`] and refer to their children
//! by [`NodeId`]. The tree is immutable once parsed; every computed fact about
//! a node lives in side tables keyed by its id.

use crate::parser::token::Span;
use std::fmt;

/// Stable index of a node in its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A type as written in source: a name plus array dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeName {
    pub name: String,
    pub dims: u8,
}

impl TypeName {
    pub fn new(name: impl Into<String>, dims: u8) -> Self {
        Self {
            name: name.into(),
            dims,
        }
    }

    pub fn def() -> Self {
        Self::new("def", 0)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for _ in 0..self.dims {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Ushr,
    BitAnd,
    BitXor,
    BitOr,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Ushr => ">>>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
            BinaryOp::BitOr => "|",
        }
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, BinaryOp::BitAnd | BinaryOp::BitXor | BinaryOp::BitOr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    /// `===`
    RefEq,
    /// `!==`
    RefNe,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::RefEq => "===",
            CompareOp::RefNe => "!==",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(
            self,
            CompareOp::Eq | CompareOp::Ne | CompareOp::RefEq | CompareOp::RefNe
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegexOp {
    /// `=~`, true when the pattern is found anywhere
    Find,
    /// `==~`, true when the pattern matches the whole input
    Match,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: TypeName,
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LambdaParam {
    pub ty: Option<TypeName>,
    pub name: String,
    pub span: Span,
}

/// Receiver of a `::` function reference.
#[derive(Debug, Clone, PartialEq)]
pub enum RefReceiver {
    /// `this::name`, a function declared in the script
    This,
    /// `Type::name` or `Type::new`
    Type(TypeName),
}

/// The statement and expression kinds of the syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Root: declared functions followed by the entry body
    Source {
        functions: Vec<NodeId>,
        statements: Vec<NodeId>,
    },
    Function {
        return_type: TypeName,
        name: String,
        params: Vec<Param>,
        body: NodeId,
    },

    // ----- statements -----
    Block(Vec<NodeId>),
    /// One declarator of a declaration statement (`int a = 1, b;` yields two)
    Declaration {
        ty: TypeName,
        name: String,
        init: Option<NodeId>,
    },
    /// A declaration statement with several declarators
    Declarations(Vec<NodeId>),
    If {
        condition: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    While {
        condition: NodeId,
        body: Option<NodeId>,
    },
    DoWhile {
        body: NodeId,
        condition: NodeId,
    },
    For {
        init: Option<NodeId>,
        condition: Option<NodeId>,
        update: Option<NodeId>,
        body: Option<NodeId>,
    },
    ForEach {
        ty: TypeName,
        name: String,
        iterable: NodeId,
        body: NodeId,
    },
    Return(Option<NodeId>),
    Break,
    Continue,
    Throw(NodeId),
    Try {
        body: NodeId,
        catches: Vec<NodeId>,
    },
    Catch {
        ty: TypeName,
        name: String,
        body: NodeId,
    },
    ExprStatement(NodeId),
    Empty,

    // ----- expressions -----
    Literal(Literal),
    Regex {
        pattern: String,
        flags: String,
    },
    Variable(String),
    /// A type name used as the receiver of a static access (`Math.max`)
    StaticType(TypeName),
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Compare {
        op: CompareOp,
        left: NodeId,
        right: NodeId,
    },
    Logical {
        op: LogicalOp,
        left: NodeId,
        right: NodeId,
    },
    RegexMatch {
        op: RegexOp,
        left: NodeId,
        pattern: NodeId,
    },
    Assign {
        target: NodeId,
        /// `None` for plain `=`, the arithmetic operator for compound forms
        op: Option<BinaryOp>,
        value: NodeId,
    },
    IncDec {
        target: NodeId,
        increment: bool,
        prefix: bool,
    },
    Conditional {
        condition: NodeId,
        then_value: NodeId,
        else_value: NodeId,
    },
    Elvis {
        value: NodeId,
        fallback: NodeId,
    },
    Cast {
        ty: TypeName,
        value: NodeId,
    },
    InstanceOf {
        value: NodeId,
        ty: TypeName,
    },
    /// Call of a script function or a whitelisted binding: `name(args)`
    Call {
        name: String,
        args: Vec<NodeId>,
    },
    MethodCall {
        receiver: NodeId,
        name: String,
        args: Vec<NodeId>,
        null_safe: bool,
    },
    Field {
        receiver: NodeId,
        name: String,
        null_safe: bool,
    },
    Index {
        receiver: NodeId,
        index: NodeId,
    },
    NewObject {
        ty: TypeName,
        args: Vec<NodeId>,
    },
    NewArray {
        element: TypeName,
        length: NodeId,
    },
    NewArrayInit {
        element: TypeName,
        values: Vec<NodeId>,
    },
    ListInit(Vec<NodeId>),
    MapInit {
        keys: Vec<NodeId>,
        values: Vec<NodeId>,
    },
    Lambda {
        params: Vec<LambdaParam>,
        /// Either an expression or a `Block`
        body: NodeId,
    },
    FunctionRef {
        receiver: RefReceiver,
        name: String,
    },
}

impl NodeKind {
    /// Whether this kind is a statement (as opposed to an expression).
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            NodeKind::Block(_)
                | NodeKind::Declaration { .. }
                | NodeKind::Declarations(_)
                | NodeKind::If { .. }
                | NodeKind::While { .. }
                | NodeKind::DoWhile { .. }
                | NodeKind::For { .. }
                | NodeKind::ForEach { .. }
                | NodeKind::Return(_)
                | NodeKind::Break
                | NodeKind::Continue
                | NodeKind::Throw(_)
                | NodeKind::Try { .. }
                | NodeKind::Catch { .. }
                | NodeKind::ExprStatement(_)
                | NodeKind::Empty
        )
    }

    /// Short human-readable name used in diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            NodeKind::Source { .. } => "source",
            NodeKind::Function { .. } => "function",
            NodeKind::Block(_) => "block",
            NodeKind::Declaration { .. } | NodeKind::Declarations(_) => "declaration",
            NodeKind::If { .. } => "if statement",
            NodeKind::While { .. } => "while loop",
            NodeKind::DoWhile { .. } => "do-while loop",
            NodeKind::For { .. } => "for loop",
            NodeKind::ForEach { .. } => "for-each loop",
            NodeKind::Return(_) => "return",
            NodeKind::Break => "break",
            NodeKind::Continue => "continue",
            NodeKind::Throw(_) => "throw",
            NodeKind::Try { .. } => "try",
            NodeKind::Catch { .. } => "catch",
            NodeKind::ExprStatement(_) => "expression statement",
            NodeKind::Empty => "empty statement",
            NodeKind::Literal(_) => "literal",
            NodeKind::Regex { .. } => "regex",
            NodeKind::Variable(_) => "variable",
            NodeKind::StaticType(_) => "type",
            NodeKind::Unary { .. } => "unary operation",
            NodeKind::Binary { .. } => "binary operation",
            NodeKind::Compare { .. } => "comparison",
            NodeKind::Logical { .. } => "boolean operation",
            NodeKind::RegexMatch { .. } => "regex match",
            NodeKind::Assign { .. } => "assignment",
            NodeKind::IncDec { .. } => "increment",
            NodeKind::Conditional { .. } => "conditional",
            NodeKind::Elvis { .. } => "elvis",
            NodeKind::Cast { .. } => "cast",
            NodeKind::InstanceOf { .. } => "instanceof",
            NodeKind::Call { .. } => "call",
            NodeKind::MethodCall { .. } => "method call",
            NodeKind::Field { .. } => "field access",
            NodeKind::Index { .. } => "index access",
            NodeKind::NewObject { .. } => "new object",
            NodeKind::NewArray { .. } | NodeKind::NewArrayInit { .. } => "new array",
            NodeKind::ListInit(_) => "list initializer",
            NodeKind::MapInit { .. } => "map initializer",
            NodeKind::Lambda { .. } => "lambda",
            NodeKind::FunctionRef { .. } => "function reference",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    pub span: Span,
}

/// Arena of syntax nodes with a distinguished `Source` root.
#[derive(Debug, Clone, Default)]
pub struct SyntaxTree {
    nodes: Vec<SyntaxNode>,
    root: Option<NodeId>,
}

impl SyntaxTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node and return its id.
    pub fn push(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(SyntaxNode { kind, span });
        id
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    /// The root `Source` node. Trees built by the parser always have one.
    pub fn root(&self) -> NodeId {
        self.root.unwrap_or(NodeId(0))
    }

    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id.index()].span
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Functions and entry statements of the root.
    pub fn source_parts(&self) -> (&[NodeId], &[NodeId]) {
        match self.kind(self.root()) {
            NodeKind::Source {
                functions,
                statements,
            } => (functions, statements),
            _ => (&[], &[]),
        }
    }

    /// Direct children of a node, in evaluation order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        match self.kind(id) {
            NodeKind::Source {
                functions,
                statements,
            } => {
                out.extend(functions);
                out.extend(statements);
            }
            NodeKind::Function { body, .. } => out.push(*body),
            NodeKind::Block(items) | NodeKind::Declarations(items) | NodeKind::ListInit(items) => {
                out.extend(items)
            }
            NodeKind::Declaration { init, .. } => out.extend(init),
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                out.push(*condition);
                out.push(*then_branch);
                out.extend(else_branch);
            }
            NodeKind::While { condition, body } => {
                out.push(*condition);
                out.extend(body);
            }
            NodeKind::DoWhile { body, condition } => {
                out.push(*body);
                out.push(*condition);
            }
            NodeKind::For {
                init,
                condition,
                update,
                body,
            } => {
                out.extend(init);
                out.extend(condition);
                out.extend(update);
                out.extend(body);
            }
            NodeKind::ForEach { iterable, body, .. } => {
                out.push(*iterable);
                out.push(*body);
            }
            NodeKind::Return(value) => out.extend(value),
            NodeKind::Throw(value) | NodeKind::ExprStatement(value) => out.push(*value),
            NodeKind::Try { body, catches } => {
                out.push(*body);
                out.extend(catches);
            }
            NodeKind::Catch { body, .. } => out.push(*body),
            NodeKind::Unary { operand, .. } => out.push(*operand),
            NodeKind::Binary { left, right, .. }
            | NodeKind::Compare { left, right, .. }
            | NodeKind::Logical { left, right, .. } => {
                out.push(*left);
                out.push(*right);
            }
            NodeKind::RegexMatch { left, pattern, .. } => {
                out.push(*left);
                out.push(*pattern);
            }
            NodeKind::Assign { target, value, .. } => {
                out.push(*target);
                out.push(*value);
            }
            NodeKind::IncDec { target, .. } => out.push(*target),
            NodeKind::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                out.push(*condition);
                out.push(*then_value);
                out.push(*else_value);
            }
            NodeKind::Elvis { value, fallback } => {
                out.push(*value);
                out.push(*fallback);
            }
            NodeKind::Cast { value, .. } | NodeKind::InstanceOf { value, .. } => out.push(*value),
            NodeKind::Call { args, .. } | NodeKind::NewObject { args, .. } => out.extend(args),
            NodeKind::MethodCall { receiver, args, .. } => {
                out.push(*receiver);
                out.extend(args);
            }
            NodeKind::Field { receiver, .. } => out.push(*receiver),
            NodeKind::Index { receiver, index } => {
                out.push(*receiver);
                out.push(*index);
            }
            NodeKind::NewArray { length, .. } => out.push(*length),
            NodeKind::NewArrayInit { values, .. } => out.extend(values),
            NodeKind::MapInit { keys, values } => {
                for (k, v) in keys.iter().zip(values) {
                    out.push(*k);
                    out.push(*v);
                }
            }
            NodeKind::Lambda { body, .. } => out.push(*body),
            NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Empty
            | NodeKind::Literal(_)
            | NodeKind::Regex { .. }
            | NodeKind::Variable(_)
            | NodeKind::StaticType(_)
            | NodeKind::FunctionRef { .. } => {}
        }
        out
    }
}
