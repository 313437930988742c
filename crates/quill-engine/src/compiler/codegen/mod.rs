//! Code generation
//!
//! Walks each IR function once and emits stack bytecode into a
//! [`CodeUnit`]. Every expression evaluated for its value leaves exactly one
//! value on the operand stack; statements leave the stack as they found it.
//!
//! The sandbox lives here too. With a loop budget configured the entry
//! function starts with `INIT_BUDGET`, and every loop back-edge and every
//! user function entry charges `LOOP_COUNT`. The whole entry body sits in a
//! catch-all range whose handler is `TRANSLATE`, so any fault leaving the
//! script surfaces as one uniform script exception.

mod context;

use crate::compiler::bytecode::{flags, CatchKind, CodeUnit, FunctionCode, FunctionRole, NumKind, Opcode};
use crate::compiler::ir::{Constant, Expr, FieldRef, FunctionKind, Invoke, IrClass, IrFunction, Stmt, Target};
use crate::error::{CompileError, CompileResult};
use crate::parser::ast::{BinaryOp, CompareOp, LogicalOp, RegexOp, UnaryOp};
use crate::parser::Span;
use crate::semantic::casts::is_string;
use crate::semantic::Cast;
use crate::settings::CompilerSettings;
use crate::whitelist::{DefReference, MemberId, ScriptType, Whitelist};
use context::FunctionContext;
use rustc_hash::FxHashMap;

/// Generate the code unit of an IR class.
pub fn generate(class: &IrClass, whitelist: &Whitelist, settings: &CompilerSettings) -> CompileResult<CodeUnit> {
    let mut generator = CodeGenerator::new(class, whitelist, settings);
    for function in &class.functions {
        generator.function(function)?;
    }
    Ok(generator.finish())
}

/// Builds one code unit, interning its symbolic tables as it goes.
pub struct CodeGenerator<'a> {
    whitelist: &'a Whitelist,
    settings: &'a CompilerSettings,
    unit: CodeUnit,
    types: FxHashMap<String, u32>,
    members: FxHashMap<MemberId, u32>,
    call_sites: FxHashMap<String, u32>,
}

fn role(kind: FunctionKind) -> FunctionRole {
    match kind {
        FunctionKind::Entry => FunctionRole::Entry,
        FunctionKind::Declared => FunctionRole::Declared,
        FunctionKind::Lambda => FunctionRole::Lambda,
        FunctionKind::Adapter => FunctionRole::Adapter,
        FunctionKind::Accessor => FunctionRole::Accessor,
        FunctionKind::StaticInit => FunctionRole::StaticInit,
    }
}

fn internal(message: impl Into<String>) -> CompileError {
    CompileError::internal(message, Span::default())
}

impl<'a> CodeGenerator<'a> {
    pub fn new(class: &IrClass, whitelist: &'a Whitelist, settings: &'a CompilerSettings) -> Self {
        let mut unit = CodeUnit::new(class.name.clone(), class.source.clone());
        unit.static_slots = class.static_slots;
        unit.static_init = class.static_init;
        if settings.optimize {
            unit.flags |= flags::OPTIMIZED;
        }
        if settings.loop_counter_enabled() {
            unit.flags |= flags::LOOP_COUNTER;
        }
        Self {
            whitelist,
            settings,
            unit,
            types: FxHashMap::default(),
            members: FxHashMap::default(),
            call_sites: FxHashMap::default(),
        }
    }

    pub fn finish(self) -> CodeUnit {
        self.unit
    }

    fn type_index(&mut self, ty: &ScriptType) -> u32 {
        let name = self.whitelist.type_name(ty);
        let types = &mut self.unit.types;
        *self.types.entry(name).or_insert_with_key(|name| {
            types.push(name.clone());
            (types.len() - 1) as u32
        })
    }

    fn member_index(&mut self, member: MemberId) -> u32 {
        let whitelist = self.whitelist;
        let members = &mut self.unit.members;
        *self.members.entry(member).or_insert_with(|| {
            members.push(whitelist.member_ref(member));
            (members.len() - 1) as u32
        })
    }

    fn call_site_index(&mut self, reference: &DefReference) -> u32 {
        let sites = &mut self.unit.call_sites;
        *self.call_sites.entry(reference.encode()).or_insert_with_key(|encoded| {
            sites.push(encoded.clone());
            (sites.len() - 1) as u32
        })
    }

    fn function(&mut self, function: &IrFunction) -> CompileResult<()> {
        let mut ctx = FunctionContext::new(function.slots);
        let counting = self.settings.loop_counter_enabled();
        match function.kind {
            FunctionKind::Entry if counting => ctx.emit_with_u32(Opcode::InitBudget, self.settings.max_loop_counter),
            FunctionKind::Declared | FunctionKind::Lambda if counting => ctx.emit(Opcode::LoopCount),
            _ => {}
        }
        self.block(&mut ctx, &function.body)?;
        // every path already returned; this is the landing pad for jumps
        // past the last statement
        ctx.emit(Opcode::ConstNull);
        ctx.emit(Opcode::Return);

        if function.kind == FunctionKind::Entry {
            let end = ctx.pc();
            ctx.emit(Opcode::Translate);
            ctx.push_handler(0, end, end, CatchKind::Any);
        }

        self.unit.functions.push(FunctionCode {
            name: function.name.clone(),
            role: role(function.kind),
            param_count: function.params,
            slot_count: ctx.slots,
            code: ctx.writer.into_bytes(),
            handlers: ctx.handlers,
            lines: ctx.lines,
        });
        Ok(())
    }

    fn block(&mut self, ctx: &mut FunctionContext, body: &[Stmt]) -> CompileResult<()> {
        for stmt in body {
            self.statement(ctx, stmt)?;
        }
        Ok(())
    }

    fn statement(&mut self, ctx: &mut FunctionContext, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Position(offset) => ctx.mark_position(*offset),
            Stmt::Expr(expr) => self.effect(ctx, expr)?,
            Stmt::If {
                condition,
                then_body,
                else_body,
            } => {
                self.expr(ctx, condition)?;
                let to_else = ctx.writer.emit_jump(Opcode::JumpIfFalse);
                self.block(ctx, then_body)?;
                if else_body.is_empty() {
                    let end = ctx.pc();
                    ctx.writer.patch_jump(to_else, end);
                } else {
                    let to_end = ctx.writer.emit_jump(Opcode::Jump);
                    let else_start = ctx.pc();
                    ctx.writer.patch_jump(to_else, else_start);
                    self.block(ctx, else_body)?;
                    let end = ctx.pc();
                    ctx.writer.patch_jump(to_end, end);
                }
            }
            Stmt::Loop {
                condition,
                body,
                update,
                test_first,
            } => self.loop_statement(ctx, condition.as_ref(), body, update, *test_first)?,
            Stmt::Break => {
                if !ctx.emit_break() {
                    return Err(internal("break outside of a loop"));
                }
            }
            Stmt::Continue => {
                if !ctx.emit_continue() {
                    return Err(internal("continue outside of a loop"));
                }
            }
            Stmt::Return(value) => {
                match value {
                    Some(value) => self.expr(ctx, value)?,
                    None => ctx.emit(Opcode::ConstNull),
                }
                ctx.emit(Opcode::Return);
            }
            Stmt::Throw(value) => {
                self.expr(ctx, value)?;
                ctx.emit(Opcode::Throw);
            }
            Stmt::Try { body, catches } => {
                let start = ctx.pc();
                self.block(ctx, body)?;
                let end = ctx.pc();
                let mut exits = vec![ctx.writer.emit_jump(Opcode::Jump)];
                for clause in catches {
                    let target = ctx.pc();
                    let ty = self.type_index(&clause.ty);
                    ctx.push_handler(start, end, target, CatchKind::Type(ty));
                    ctx.emit_with_u16(Opcode::StoreLocal, clause.slot);
                    self.block(ctx, &clause.body)?;
                    exits.push(ctx.writer.emit_jump(Opcode::Jump));
                }
                let after = ctx.pc();
                for exit in exits {
                    ctx.writer.patch_jump(exit, after);
                }
            }
            Stmt::Block(body) => self.block(ctx, body)?,
        }
        Ok(())
    }

    fn loop_statement(
        &mut self,
        ctx: &mut FunctionContext,
        condition: Option<&Expr>,
        body: &[Stmt],
        update: &[Stmt],
        test_first: bool,
    ) -> CompileResult<()> {
        let top = ctx.pc();
        let mut exits = Vec::new();
        if test_first {
            if let Some(condition) = condition {
                self.expr(ctx, condition)?;
                exits.push(ctx.writer.emit_jump(Opcode::JumpIfFalse));
            }
        }

        ctx.enter_loop();
        self.block(ctx, body)?;
        let labels = ctx.exit_loop();

        let continue_target = ctx.pc();
        self.block(ctx, update)?;
        if !test_first {
            if let Some(condition) = condition {
                self.expr(ctx, condition)?;
                exits.push(ctx.writer.emit_jump(Opcode::JumpIfFalse));
            }
        }
        if self.settings.loop_counter_enabled() {
            ctx.emit(Opcode::LoopCount);
        }
        ctx.writer.emit_jump_to(Opcode::Jump, top);

        let exit = ctx.pc();
        for jump in exits.into_iter().chain(labels.breaks) {
            ctx.writer.patch_jump(jump, exit);
        }
        for jump in labels.continues {
            ctx.writer.patch_jump(jump, continue_target);
        }
        Ok(())
    }

    /// Evaluate for side effects only.
    fn effect(&mut self, ctx: &mut FunctionContext, expr: &Expr) -> CompileResult<()> {
        match expr {
            Expr::Store { target, value } => self.store(ctx, target, value, false),
            Expr::Let { slot, value, body } => {
                self.expr(ctx, value)?;
                ctx.emit_with_u16(Opcode::StoreLocal, *slot);
                self.effect(ctx, body)
            }
            Expr::Seq(items) => {
                for item in items {
                    self.effect(ctx, item)?;
                }
                Ok(())
            }
            Expr::Const(_) | Expr::Local(_) | Expr::Static(_) => Ok(()),
            other => {
                self.expr(ctx, other)?;
                ctx.emit(Opcode::Pop);
                Ok(())
            }
        }
    }

    /// Evaluate and push exactly one value.
    fn expr(&mut self, ctx: &mut FunctionContext, expr: &Expr) -> CompileResult<()> {
        match expr {
            Expr::Const(constant) => self.constant(ctx, constant),
            Expr::Local(slot) => ctx.emit_with_u16(Opcode::LoadLocal, *slot),
            Expr::Static(slot) => ctx.emit_with_u16(Opcode::LoadStatic, *slot),
            Expr::Unary { op, ty, operand } => {
                self.expr(ctx, operand)?;
                let kind = NumKind::of(ty) as u8;
                match op {
                    UnaryOp::Neg => ctx.emit_with_u8(Opcode::Neg, kind),
                    UnaryOp::BitNot => ctx.emit_with_u8(Opcode::BitNot, kind),
                    UnaryOp::Not => ctx.emit(Opcode::Not),
                    UnaryOp::Plus => {}
                }
            }
            Expr::Binary { op, ty, left, right } => {
                self.expr(ctx, left)?;
                self.expr(ctx, right)?;
                if *op == BinaryOp::Add && is_string(self.whitelist, ty) {
                    ctx.emit_with_u16(Opcode::Concat, 2);
                } else {
                    ctx.emit_with_u8(binary_opcode(*op), NumKind::of(ty) as u8);
                }
            }
            Expr::Concat(parts) => {
                for part in parts {
                    self.expr(ctx, part)?;
                }
                let count = u16::try_from(parts.len()).map_err(|_| internal("too many concatenated parts"))?;
                ctx.emit_with_u16(Opcode::Concat, count);
            }
            Expr::Compare { op, ty, left, right } => {
                self.expr(ctx, left)?;
                self.expr(ctx, right)?;
                let kind = NumKind::of(ty) as u8;
                match op {
                    CompareOp::Eq => ctx.emit_with_u8(Opcode::Eq, kind),
                    CompareOp::Ne => ctx.emit_with_u8(Opcode::Ne, kind),
                    CompareOp::Lt => ctx.emit_with_u8(Opcode::Lt, kind),
                    CompareOp::Le => ctx.emit_with_u8(Opcode::Le, kind),
                    CompareOp::Gt => ctx.emit_with_u8(Opcode::Gt, kind),
                    CompareOp::Ge => ctx.emit_with_u8(Opcode::Ge, kind),
                    CompareOp::RefEq => ctx.emit(Opcode::RefEq),
                    CompareOp::RefNe => ctx.emit(Opcode::RefNe),
                }
            }
            Expr::Logical { op, left, right } => {
                self.expr(ctx, left)?;
                let (test, decided) = match op {
                    LogicalOp::And => (Opcode::JumpIfFalse, Opcode::ConstFalse),
                    LogicalOp::Or => (Opcode::JumpIfTrue, Opcode::ConstTrue),
                };
                let short = ctx.writer.emit_jump(test);
                self.expr(ctx, right)?;
                let to_end = ctx.writer.emit_jump(Opcode::Jump);
                let at = ctx.pc();
                ctx.writer.patch_jump(short, at);
                ctx.emit(decided);
                let end = ctx.pc();
                ctx.writer.patch_jump(to_end, end);
            }
            Expr::RegexMatch { op, input, pattern } => {
                self.expr(ctx, input)?;
                self.expr(ctx, pattern)?;
                ctx.emit(match op {
                    RegexOp::Find => Opcode::RegexFind,
                    RegexOp::Match => Opcode::RegexMatch,
                });
            }
            Expr::Regex(pattern) => {
                let index = self.unit.constants.intern(pattern);
                ctx.emit_with_u32(Opcode::Regex, index);
            }
            Expr::Cast { cast, value } => {
                self.expr(ctx, value)?;
                self.cast(ctx, cast);
            }
            Expr::InstanceOf { ty, value } => {
                self.expr(ctx, value)?;
                let index = self.type_index(ty);
                ctx.emit_with_u32(Opcode::InstanceOf, index);
            }
            Expr::IsNull(value) => {
                self.expr(ctx, value)?;
                ctx.emit(Opcode::ConstNull);
                ctx.emit(Opcode::RefEq);
            }
            Expr::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                self.expr(ctx, condition)?;
                let to_else = ctx.writer.emit_jump(Opcode::JumpIfFalse);
                self.expr(ctx, then_value)?;
                let to_end = ctx.writer.emit_jump(Opcode::Jump);
                let else_start = ctx.pc();
                ctx.writer.patch_jump(to_else, else_start);
                self.expr(ctx, else_value)?;
                let end = ctx.pc();
                ctx.writer.patch_jump(to_end, end);
            }
            Expr::Elvis { value, fallback } => {
                self.expr(ctx, value)?;
                ctx.emit(Opcode::Dup);
                let keep = ctx.writer.emit_jump(Opcode::JumpIfNonNull);
                ctx.emit(Opcode::Pop);
                self.expr(ctx, fallback)?;
                let end = ctx.pc();
                ctx.writer.patch_jump(keep, end);
            }
            Expr::Store { target, value } => self.store(ctx, target, value, true)?,
            Expr::Let { slot, value, body } => {
                self.expr(ctx, value)?;
                ctx.emit_with_u16(Opcode::StoreLocal, *slot);
                self.expr(ctx, body)?;
            }
            Expr::Seq(items) => match items.split_last() {
                Some((last, rest)) => {
                    for item in rest {
                        self.effect(ctx, item)?;
                    }
                    self.expr(ctx, last)?;
                }
                None => ctx.emit(Opcode::ConstNull),
            },
            Expr::Invoke { invoke, args, .. } => {
                for arg in args {
                    self.expr(ctx, arg)?;
                }
                self.invoke(ctx, invoke);
            }
            Expr::Field { receiver, field } => {
                if let Some(receiver) = receiver {
                    self.expr(ctx, receiver)?;
                }
                match field {
                    FieldRef::Instance(member) => {
                        let index = self.member_index(*member);
                        ctx.emit_with_u32(Opcode::GetField, index);
                    }
                    FieldRef::Static(member) => {
                        let index = self.member_index(*member);
                        ctx.emit_with_u32(Opcode::GetStatic, index);
                    }
                    FieldRef::Dynamic(name) => {
                        let index = self.call_site_index(&DefReference::load(name.clone()));
                        ctx.emit_with_u32(Opcode::DynGet, index);
                    }
                }
            }
            Expr::ArrayLength(value) => {
                self.expr(ctx, value)?;
                ctx.emit(Opcode::ArrayLength);
            }
            Expr::Index { receiver, index, access } => {
                self.expr(ctx, receiver)?;
                self.expr(ctx, index)?;
                ctx.emit_with_u8(Opcode::LoadIndex, *access as u8);
            }
            Expr::NewArray { ty, length } => {
                self.expr(ctx, length)?;
                let index = self.type_index(ty);
                ctx.emit_with_u32(Opcode::NewArray, index);
            }
            Expr::ArrayInit { ty, values } => {
                for value in values {
                    self.expr(ctx, value)?;
                }
                let index = self.type_index(ty);
                let count = u16::try_from(values.len()).map_err(|_| internal("array initializer too large"))?;
                ctx.emit_with_u32(Opcode::ArrayInit, index);
                ctx.writer.emit_u16(count);
            }
            Expr::ListInit(values) => {
                for value in values {
                    self.expr(ctx, value)?;
                }
                let count = u16::try_from(values.len()).map_err(|_| internal("list initializer too large"))?;
                ctx.emit_with_u16(Opcode::NewList, count);
            }
            Expr::MapInit(entries) => {
                for (key, value) in entries {
                    self.expr(ctx, key)?;
                    self.expr(ctx, value)?;
                }
                let count = u16::try_from(entries.len()).map_err(|_| internal("map initializer too large"))?;
                ctx.emit_with_u16(Opcode::NewMap, count);
            }
            Expr::Closure { function, captures } => {
                for capture in captures {
                    self.expr(ctx, capture)?;
                }
                ctx.emit_with_u16(Opcode::Closure, *function);
                ctx.writer.emit_u16(captures.len() as u16);
            }
            Expr::Iterate(value) => {
                self.expr(ctx, value)?;
                ctx.emit(Opcode::Iterate);
            }
            Expr::IterHasNext(value) => {
                self.expr(ctx, value)?;
                ctx.emit(Opcode::IterHasNext);
            }
            Expr::IterNext(value) => {
                self.expr(ctx, value)?;
                ctx.emit(Opcode::IterNext);
            }
        }
        Ok(())
    }

    fn constant(&mut self, ctx: &mut FunctionContext, constant: &Constant) {
        match constant {
            Constant::Null => ctx.emit(Opcode::ConstNull),
            Constant::Bool(true) => ctx.emit(Opcode::ConstTrue),
            Constant::Bool(false) => ctx.emit(Opcode::ConstFalse),
            Constant::Int(v) => {
                ctx.emit(Opcode::ConstInt);
                ctx.writer.emit_i32(*v);
            }
            Constant::Long(v) => {
                ctx.emit(Opcode::ConstLong);
                ctx.writer.emit_i64(*v);
            }
            Constant::Double(v) => {
                ctx.emit(Opcode::ConstDouble);
                ctx.writer.emit_f64(*v);
            }
            Constant::Str(s) => {
                let index = self.unit.constants.intern(s);
                ctx.emit_with_u32(Opcode::ConstStr, index);
            }
        }
    }

    fn cast(&mut self, ctx: &mut FunctionContext, cast: &Cast) {
        match cast {
            Cast::Numeric { from, to } => {
                let (from, to) = (NumKind::of(from), NumKind::of(to));
                if from != to {
                    ctx.emit_with_u8(Opcode::Convert, from as u8);
                    ctx.writer.emit_u8(to as u8);
                }
            }
            Cast::Box | Cast::Upcast | Cast::ToDef => {}
            Cast::Unbox { to, .. } => ctx.emit_with_u8(Opcode::Unbox, NumKind::of(to) as u8),
            Cast::Checked(ty) => {
                let index = self.type_index(ty);
                ctx.emit_with_u32(Opcode::CheckCast, index);
            }
            Cast::FromDef { to, explicit } => {
                let index = self.type_index(to);
                ctx.emit_with_u32(Opcode::FromDef, index);
                ctx.writer.emit_u8(u8::from(*explicit));
            }
        }
    }

    fn invoke(&mut self, ctx: &mut FunctionContext, invoke: &Invoke) {
        let (opcode, operand) = match invoke {
            Invoke::Local(function) => {
                ctx.emit_with_u16(Opcode::CallLocal, *function);
                return;
            }
            Invoke::Static(member) => (Opcode::InvokeStatic, self.member_index(*member)),
            Invoke::Virtual(member) => (Opcode::InvokeVirtual, self.member_index(*member)),
            Invoke::Functional(member) => (Opcode::InvokeFunctional, self.member_index(*member)),
            Invoke::Constructor(member) => (Opcode::New, self.member_index(*member)),
            Invoke::Binding(member) => (Opcode::InvokeBinding, self.member_index(*member)),
            Invoke::Dynamic(reference) => (Opcode::InvokeDynamic, self.call_site_index(reference)),
        };
        ctx.emit_with_u32(opcode, operand);
    }

    /// Assign `value` to `target`; with `keep` the assigned value stays on
    /// the stack.
    fn store(&mut self, ctx: &mut FunctionContext, target: &Target, value: &Expr, keep: bool) -> CompileResult<()> {
        match target {
            Target::Local(slot) => {
                self.expr(ctx, value)?;
                if keep {
                    ctx.emit(Opcode::Dup);
                }
                ctx.emit_with_u16(Opcode::StoreLocal, *slot);
            }
            Target::Static(slot) => {
                self.expr(ctx, value)?;
                if keep {
                    ctx.emit(Opcode::Dup);
                }
                ctx.emit_with_u16(Opcode::StoreStatic, *slot);
            }
            Target::Field { receiver, field } => {
                if let Some(receiver) = receiver {
                    self.expr(ctx, receiver)?;
                }
                self.expr(ctx, value)?;
                let (opcode, operand) = match field {
                    FieldRef::Instance(member) => (Opcode::PutField, self.member_index(*member)),
                    FieldRef::Static(member) => (Opcode::PutStatic, self.member_index(*member)),
                    FieldRef::Dynamic(name) => (
                        Opcode::DynPut,
                        self.call_site_index(&DefReference::store(name.clone())),
                    ),
                };
                if keep {
                    ctx.emit(if receiver.is_some() { Opcode::DupX1 } else { Opcode::Dup });
                }
                ctx.emit_with_u32(opcode, operand);
            }
            Target::Index { receiver, index, access } => {
                self.expr(ctx, receiver)?;
                self.expr(ctx, index)?;
                self.expr(ctx, value)?;
                if keep {
                    ctx.emit(Opcode::DupX2);
                }
                ctx.emit_with_u8(Opcode::StoreIndex, *access as u8);
            }
        }
        Ok(())
    }
}

fn binary_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Sub => Opcode::Sub,
        BinaryOp::Mul => Opcode::Mul,
        BinaryOp::Div => Opcode::Div,
        BinaryOp::Rem => Opcode::Rem,
        BinaryOp::Shl => Opcode::Shl,
        BinaryOp::Shr => Opcode::Shr,
        BinaryOp::Ushr => Opcode::Ushr,
        BinaryOp::BitAnd => Opcode::BitAnd,
        BinaryOp::BitOr => Opcode::BitOr,
        BinaryOp::BitXor => Opcode::BitXor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::bytecode::{decode_instructions, verify_unit};
    use crate::whitelist::standard;

    fn entry(body: Vec<Stmt>, slots: u16) -> IrClass {
        IrClass {
            name: "t".to_string(),
            source: String::new(),
            functions: vec![IrFunction {
                name: "execute".to_string(),
                kind: FunctionKind::Entry,
                params: 0,
                slots,
                body,
            }],
            static_slots: 0,
            static_init: None,
        }
    }

    fn opcodes(unit: &CodeUnit, function: usize) -> Vec<Opcode> {
        decode_instructions(&unit.functions[function].code)
            .unwrap()
            .into_iter()
            .map(|i| i.opcode)
            .collect()
    }

    #[test]
    fn test_entry_is_wrapped_in_translate_handler() {
        let wl = standard();
        let class = entry(vec![Stmt::Return(Some(Expr::Const(Constant::Int(1))))], 0);
        let unit = generate(&class, &wl, &CompilerSettings::default()).unwrap();
        let ops = opcodes(&unit, 0);
        assert_eq!(ops.first(), Some(&Opcode::InitBudget));
        assert_eq!(ops.last(), Some(&Opcode::Translate));
        let handler = unit.functions[0].handlers[0];
        assert_eq!(handler.catch, CatchKind::Any);
        assert_eq!(handler.start, 0);
        assert!(verify_unit(&unit).is_ok());
    }

    #[test]
    fn test_loop_counter_on_back_edge_only_when_enabled() {
        let wl = standard();
        let body = vec![Stmt::Loop {
            condition: None,
            body: vec![Stmt::Break],
            update: Vec::new(),
            test_first: true,
        }];

        let unit = generate(&entry(body.clone(), 0), &wl, &CompilerSettings::default()).unwrap();
        assert!(opcodes(&unit, 0).contains(&Opcode::LoopCount));
        assert_ne!(unit.flags & flags::LOOP_COUNTER, 0);

        let settings = CompilerSettings::default().with_max_loop_counter(0);
        let unit = generate(&entry(body, 0), &wl, &settings).unwrap();
        let ops = opcodes(&unit, 0);
        assert!(!ops.contains(&Opcode::LoopCount));
        assert!(!ops.contains(&Opcode::InitBudget));
        assert!(verify_unit(&unit).is_ok());
    }

    #[test]
    fn test_value_store_keeps_value() {
        let wl = standard();
        let store = Expr::Store {
            target: Target::Local(0),
            value: Expr::Const(Constant::Int(5)).boxed(),
        };
        let class = entry(vec![Stmt::Expr(store.clone()), Stmt::Return(Some(store))], 1);
        let settings = CompilerSettings::default().with_max_loop_counter(0);
        let unit = generate(&class, &wl, &settings).unwrap();
        let ops = opcodes(&unit, 0);
        assert_eq!(
            &ops[..6],
            &[
                Opcode::ConstInt,
                Opcode::StoreLocal,
                Opcode::ConstInt,
                Opcode::Dup,
                Opcode::StoreLocal,
                Opcode::Return
            ]
        );
    }

    #[test]
    fn test_symbol_tables_are_interned() {
        let wl = standard();
        let map = ScriptType::Class(wl.class_by_name("Map").unwrap());
        let check = |value| Expr::InstanceOf {
            ty: map.clone(),
            value: Expr::Const(value).boxed(),
        };
        let class = entry(
            vec![
                Stmt::Expr(check(Constant::Null)),
                Stmt::Return(Some(check(Constant::Int(1)))),
            ],
            0,
        );
        let unit = generate(&class, &wl, &CompilerSettings::default()).unwrap();
        assert_eq!(unit.types, vec!["Map".to_string()]);
    }

    #[test]
    fn test_break_outside_loop_is_internal_error() {
        let wl = standard();
        let class = entry(vec![Stmt::Break], 0);
        assert!(generate(&class, &wl, &CompilerSettings::default()).is_err());
    }
}
