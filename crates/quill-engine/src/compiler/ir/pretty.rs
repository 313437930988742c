//! Pretty-printing for IR
//!
//! Human-readable output for `quill ir` and for debugging passes. Member
//! ids are printed by name, so printing needs the whitelist.

use super::node::{Constant, Expr, FieldRef, Invoke, IrClass, IrFunction, Stmt, Target};
use crate::semantic::Cast;
use crate::whitelist::{ScriptType, Whitelist};

/// Render an IR construct against the whitelist it was compiled for.
pub trait PrettyPrint {
    fn pretty_print(&self, whitelist: &Whitelist) -> String;
}

impl PrettyPrint for IrClass {
    fn pretty_print(&self, whitelist: &Whitelist) -> String {
        let mut printer = Printer::new(whitelist);
        printer.line(&format!("; class {}", self.name));
        if self.static_slots > 0 {
            printer.line(&format!("; statics: {}", self.static_slots));
        }
        printer.line("");
        for (index, function) in self.functions.iter().enumerate() {
            printer.function(index, function);
            printer.line("");
        }
        printer.out
    }
}

impl PrettyPrint for IrFunction {
    fn pretty_print(&self, whitelist: &Whitelist) -> String {
        let mut printer = Printer::new(whitelist);
        printer.function(0, self);
        printer.out
    }
}

impl PrettyPrint for Expr {
    fn pretty_print(&self, whitelist: &Whitelist) -> String {
        Printer::new(whitelist).expr(self)
    }
}

struct Printer<'a> {
    whitelist: &'a Whitelist,
    out: String,
    indent: usize,
}

impl<'a> Printer<'a> {
    fn new(whitelist: &'a Whitelist) -> Self {
        Self {
            whitelist,
            out: String::new(),
            indent: 0,
        }
    }

    fn line(&mut self, text: &str) {
        if !text.is_empty() {
            self.out.push_str(&"  ".repeat(self.indent));
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    fn function(&mut self, index: usize, function: &IrFunction) {
        self.line(&format!(
            "fn #{} {}({} params, {} slots) ; {:?} {{",
            index, function.name, function.params, function.slots, function.kind
        ));
        self.indent += 1;
        self.block(&function.body);
        self.indent -= 1;
        self.line("}");
    }

    fn block(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.stmt(stmt);
        }
    }

    fn nested(&mut self, header: &str, body: &[Stmt]) {
        self.line(&format!("{} {{", header));
        self.indent += 1;
        self.block(body);
        self.indent -= 1;
        self.line("}");
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Position(offset) => self.line(&format!("; @{}", offset)),
            Stmt::Expr(expr) => {
                let text = self.expr(expr);
                self.line(&format!("{};", text));
            }
            Stmt::If {
                condition,
                then_body,
                else_body,
            } => {
                let condition = self.expr(condition);
                self.nested(&format!("if {}", condition), then_body);
                if !else_body.is_empty() {
                    self.nested("else", else_body);
                }
            }
            Stmt::Loop {
                condition,
                body,
                update,
                test_first,
            } => {
                let condition = match condition {
                    Some(c) => self.expr(c),
                    None => "true".to_string(),
                };
                let header = if *test_first {
                    format!("while {}", condition)
                } else {
                    format!("do-while {}", condition)
                };
                self.nested(&header, body);
                if !update.is_empty() {
                    self.nested("update", update);
                }
            }
            Stmt::Break => self.line("break;"),
            Stmt::Continue => self.line("continue;"),
            Stmt::Return(None) => self.line("return;"),
            Stmt::Return(Some(value)) => {
                let value = self.expr(value);
                self.line(&format!("return {};", value));
            }
            Stmt::Throw(value) => {
                let value = self.expr(value);
                self.line(&format!("throw {};", value));
            }
            Stmt::Try { body, catches } => {
                self.nested("try", body);
                for catch in catches {
                    let header = format!("catch {} -> l{}", self.ty(&catch.ty), catch.slot);
                    self.nested(&header, &catch.body);
                }
            }
            Stmt::Block(body) => self.nested("", body),
        }
    }

    fn ty(&self, ty: &ScriptType) -> String {
        self.whitelist.type_name(ty)
    }

    fn list(&self, exprs: &[Expr]) -> String {
        exprs.iter().map(|e| self.expr(e)).collect::<Vec<_>>().join(", ")
    }

    fn cast(&self, cast: &Cast) -> String {
        match cast {
            Cast::Numeric { to, .. } => format!("({})", self.ty(to)),
            Cast::Box => "box".to_string(),
            Cast::Unbox { to, .. } => format!("unbox<{}>", self.ty(to)),
            Cast::Upcast => "up".to_string(),
            Cast::Checked(ty) => format!("check<{}>", self.ty(ty)),
            Cast::ToDef => "todef".to_string(),
            Cast::FromDef { to, explicit } => {
                format!("fromdef<{}{}>", self.ty(to), if *explicit { "!" } else { "" })
            }
        }
    }

    fn invoke(&self, invoke: &Invoke) -> String {
        match invoke {
            Invoke::Local(index) => format!("local#{}", index),
            Invoke::Static(member) => format!("static {}", self.whitelist.member_ref(*member)),
            Invoke::Virtual(member) => format!("virtual {}", self.whitelist.member_ref(*member)),
            Invoke::Functional(member) => format!("functional {}", self.whitelist.member_ref(*member)),
            Invoke::Constructor(member) => format!("new {}", self.whitelist.member_ref(*member)),
            Invoke::Binding(member) => format!("binding {}", self.whitelist.member_ref(*member)),
            Invoke::Dynamic(reference) => format!("dynamic {}", reference),
        }
    }

    fn field(&self, field: &FieldRef) -> String {
        match field {
            FieldRef::Instance(member) | FieldRef::Static(member) => self.whitelist.member_ref(*member).to_string(),
            FieldRef::Dynamic(name) => format!("?{}", name),
        }
    }

    fn target(&self, target: &Target) -> String {
        match target {
            Target::Local(slot) => format!("l{}", slot),
            Target::Static(slot) => format!("s{}", slot),
            Target::Field { receiver, field } => match receiver {
                Some(r) => format!("{}.{}", self.expr(r), self.field(field)),
                None => self.field(field),
            },
            Target::Index { receiver, index, access } => {
                format!("{}[{}]{:?}", self.expr(receiver), self.expr(index), access)
            }
        }
    }

    fn constant(&self, constant: &Constant) -> String {
        constant.to_string()
    }

    fn expr(&self, expr: &Expr) -> String {
        match expr {
            Expr::Const(c) => self.constant(c),
            Expr::Local(slot) => format!("l{}", slot),
            Expr::Static(slot) => format!("s{}", slot),
            Expr::Unary { op, ty, operand } => {
                format!("{:?}<{}>({})", op, self.ty(ty), self.expr(operand))
            }
            Expr::Binary { op, ty, left, right } => format!(
                "({} {}<{}> {})",
                self.expr(left),
                op.symbol(),
                self.ty(ty),
                self.expr(right)
            ),
            Expr::Concat(parts) => format!("concat({})", self.list(parts)),
            Expr::Compare { op, ty, left, right } => format!(
                "({} {}<{}> {})",
                self.expr(left),
                op.symbol(),
                self.ty(ty),
                self.expr(right)
            ),
            Expr::Logical { op, left, right } => {
                format!("({} {:?} {})", self.expr(left), op, self.expr(right))
            }
            Expr::RegexMatch { op, input, pattern } => {
                format!("{:?}({}, {})", op, self.expr(input), self.expr(pattern))
            }
            Expr::Regex(pattern) => format!("regex({:?})", pattern),
            Expr::Cast { cast, value } => format!("{} {}", self.cast(cast), self.expr(value)),
            Expr::InstanceOf { ty, value } => format!("{} instanceof {}", self.expr(value), self.ty(ty)),
            Expr::IsNull(value) => format!("isnull({})", self.expr(value)),
            Expr::Conditional {
                condition,
                then_value,
                else_value,
            } => format!(
                "({} ? {} : {})",
                self.expr(condition),
                self.expr(then_value),
                self.expr(else_value)
            ),
            Expr::Elvis { value, fallback } => format!("({} ?: {})", self.expr(value), self.expr(fallback)),
            Expr::Store { target, value } => format!("{} = {}", self.target(target), self.expr(value)),
            Expr::Let { slot, value, body } => {
                format!("let l{} = {} in {}", slot, self.expr(value), self.expr(body))
            }
            Expr::Seq(exprs) => format!("{{{}}}", self.list(exprs)),
            Expr::Invoke { invoke, args, void } => format!(
                "{}({}){}",
                self.invoke(invoke),
                self.list(args),
                if *void { ":void" } else { "" }
            ),
            Expr::Field { receiver, field } => match receiver {
                Some(r) => format!("{}.{}", self.expr(r), self.field(field)),
                None => self.field(field),
            },
            Expr::ArrayLength(array) => format!("{}.length", self.expr(array)),
            Expr::Index { receiver, index, access } => {
                format!("{}[{}]{:?}", self.expr(receiver), self.expr(index), access)
            }
            Expr::NewArray { ty, length } => format!("new {}({})", self.ty(ty), self.expr(length)),
            Expr::ArrayInit { ty, values } => format!("new {} {{{}}}", self.ty(ty), self.list(values)),
            Expr::ListInit(values) => format!("[{}]", self.list(values)),
            Expr::MapInit(entries) => {
                let entries: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", self.expr(k), self.expr(v)))
                    .collect();
                format!("[{}]", if entries.is_empty() { ":".to_string() } else { entries.join(", ") })
            }
            Expr::Closure { function, captures } => format!("closure#{}({})", function, self.list(captures)),
            Expr::Iterate(value) => format!("iterate({})", self.expr(value)),
            Expr::IterHasNext(value) => format!("hasnext({})", self.expr(value)),
            Expr::IterNext(value) => format!("next({})", self.expr(value)),
        }
    }
}
