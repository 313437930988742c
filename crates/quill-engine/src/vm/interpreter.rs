//! Bytecode interpreter
//!
//! One [`Interpreter`] runs one script execution. Every script function call
//! recurses into [`Interpreter::call`], which owns the frame (locals and
//! operand stack) and the fetch/dispatch loop. Nesting is bounded by both
//! `max_call_depth` and the native stack the nested calls have consumed, so
//! deep recursion ends in a stack overflow fault rather than a host abort.
//! Faults unwind frame by frame
//! through the exception tables until a handler accepts them; the entry
//! function's catch-all handler and its `TRANSLATE` instruction turn
//! whatever reaches them into one [`ScriptException`].

use crate::compiler::bytecode::{BytecodeReader, CatchKind, DecodeError, FunctionCode, Handler, NumKind, Opcode};
use crate::semantic::IndexAccess;
use crate::vm::dispatch::Resolved;
use crate::vm::exception::ScriptException;
use crate::vm::fault::Fault;
use crate::vm::iter::SnapshotIterator;
use crate::vm::loader::LoadedUnit;
use crate::vm::native::{call_native, guard, NativeContext};
use crate::vm::ops;
use crate::vm::value::{Closure, ScriptMap, Value};
use crate::whitelist::{BindingState, Member, MemberId, ScriptType, Whitelist};
use parking_lot::Mutex;
use regex::Regex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Per-instance state of the class bindings a script calls.
#[derive(Default)]
pub struct BindingStates {
    states: Mutex<FxHashMap<MemberId, Box<dyn BindingState>>>,
}

impl BindingStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bindings that have created their state.
    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&self, member: MemberId) -> Option<Box<dyn BindingState>> {
        self.states.lock().remove(&member)
    }

    fn restore(&self, member: MemberId, state: Box<dyn BindingState>) {
        self.states.lock().entry(member).or_insert(state);
    }
}

impl fmt::Debug for BindingStates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingStates").field("created", &self.len()).finish()
    }
}

#[derive(Debug, Clone, Copy)]
struct Budget {
    remaining: u32,
    limit: u32,
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    max_call_depth: usize,
    max_stack_bytes: usize,
    max_array_length: usize,
    max_call_site_depth: usize,
}

/// Result of one instruction
enum Flow {
    Next,
    Return(Value),
}

/// Locals and operand stack of one function activation.
struct Frame<'f> {
    unit: &'f Arc<LoadedUnit>,
    function: &'f FunctionCode,
    reader: BytecodeReader<'f>,
    stack: Vec<Value>,
    locals: Vec<Value>,
    /// Fault caught by the catch-all handler, waiting for `TRANSLATE`
    pending: Option<Fault>,
}

impl<'f> Frame<'f> {
    fn pop(&mut self) -> Result<Value, Fault> {
        self.stack
            .pop()
            .ok_or_else(|| Fault::Internal(format!("operand stack underflow in `{}`", self.function.name)))
    }

    fn pop_n(&mut self, count: usize) -> Result<Vec<Value>, Fault> {
        let at = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or_else(|| Fault::Internal(format!("operand stack underflow in `{}`", self.function.name)))?;
        Ok(self.stack.split_off(at))
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn read_u8(&mut self) -> Result<u8, Fault> {
        self.reader.read_u8().map_err(decode_fault)
    }

    fn read_u16(&mut self) -> Result<u16, Fault> {
        self.reader.read_u16().map_err(decode_fault)
    }

    fn read_u32(&mut self) -> Result<u32, Fault> {
        self.reader.read_u32().map_err(decode_fault)
    }

    fn read_i32(&mut self) -> Result<i32, Fault> {
        self.reader.read_i32().map_err(decode_fault)
    }

    fn read_kind(&mut self) -> Result<NumKind, Fault> {
        let byte = self.read_u8()?;
        NumKind::from_u8(byte).ok_or_else(|| Fault::Internal(format!("invalid operand kind {}", byte)))
    }

    /// Jump relative to the end of the current instruction.
    fn jump(&mut self, offset: i32) {
        let target = self.reader.position() as i64 + offset as i64;
        self.reader.seek(target as usize);
    }

    fn local(&self, slot: u16) -> Result<&Value, Fault> {
        self.locals
            .get(slot as usize)
            .ok_or_else(|| Fault::Internal(format!("local slot {} out of range", slot)))
    }

    fn string(&self, index: u32) -> Result<Arc<str>, Fault> {
        self.unit
            .strings
            .get(index as usize)
            .cloned()
            .ok_or_else(|| Fault::Internal(format!("constant {} out of range", index)))
    }

    fn ty(&self, index: u32) -> Result<&'f ScriptType, Fault> {
        self.unit
            .types
            .get(index as usize)
            .ok_or_else(|| Fault::Internal(format!("type {} out of range", index)))
    }

    fn member(&self, index: u32) -> Result<MemberId, Fault> {
        self.unit
            .members
            .get(index as usize)
            .copied()
            .ok_or_else(|| Fault::Internal(format!("member {} out of range", index)))
    }
}

/// Approximate native stack pointer of the caller.
#[inline(never)]
fn stack_address() -> usize {
    let marker = 0u8;
    std::hint::black_box(&marker) as *const u8 as usize
}

fn decode_fault(error: DecodeError) -> Fault {
    Fault::Internal(error.to_string())
}

/// Executes the functions of loaded units.
pub struct Interpreter<'b> {
    whitelist: Arc<Whitelist>,
    bindings: Option<&'b BindingStates>,
    limits: Limits,
    budget: Option<Budget>,
    depth: usize,
    /// Native stack address of the outermost call
    stack_base: Option<usize>,
    /// Source offset where the fault now unwinding was raised
    fault_position: Option<usize>,
}

impl<'b> Interpreter<'b> {
    /// An interpreter with the whitelist and limits `unit` was loaded with.
    pub fn new(unit: &LoadedUnit) -> Self {
        Self {
            whitelist: Arc::clone(&unit.whitelist),
            bindings: None,
            limits: Limits {
                max_call_depth: unit.settings.max_call_depth,
                max_stack_bytes: unit.settings.max_stack_bytes,
                max_array_length: unit.settings.max_array_length,
                max_call_site_depth: unit.settings.max_call_site_depth,
            },
            budget: None,
            depth: 0,
            stack_base: None,
            fault_position: None,
        }
    }

    /// Keep class binding state in `bindings` instead of per call.
    pub fn with_bindings(mut self, bindings: &'b BindingStates) -> Self {
        self.bindings = Some(bindings);
        self
    }

    /// Run the entry function. Every fault comes back as a [`ScriptException`].
    pub fn execute(&mut self, unit: &Arc<LoadedUnit>, args: Vec<Value>) -> Result<Value, ScriptException> {
        let entry = unit
            .function_index(crate::compiler::lower::ENTRY)
            .ok_or_else(|| ScriptException::from_fault(Fault::Internal("unit has no entry".into()), &unit.source, None))?;
        self.call(unit, entry, args).map_err(|fault| {
            let exception = ScriptException::from_fault(fault, &unit.source, self.fault_position);
            tracing::debug!(
                script = %unit.name,
                class = %exception.class_name,
                position = ?exception.position,
                "script execution failed"
            );
            exception
        })
    }

    /// Call function `index` of `unit` with exactly its parameters.
    pub fn call(&mut self, unit: &Arc<LoadedUnit>, index: u16, args: Vec<Value>) -> Result<Value, Fault> {
        let function = unit
            .function(index)
            .ok_or_else(|| Fault::Internal(format!("function {} out of range", index)))?;
        if args.len() != function.param_count as usize {
            return Err(Fault::Internal(format!(
                "`{}` expects {} arguments, got {}",
                function.name,
                function.param_count,
                args.len()
            )));
        }
        let here = stack_address();
        let base = *self.stack_base.get_or_insert(here);
        if self.depth >= self.limits.max_call_depth || base.abs_diff(here) > self.limits.max_stack_bytes {
            tracing::debug!(
                depth = self.depth,
                stack_bytes = base.abs_diff(here),
                function = %function.name,
                "script stack exhausted"
            );
            return Err(Fault::StackOverflow { depth: self.depth });
        }

        let mut locals = args;
        locals.resize((function.slot_count as usize).max(locals.len()), Value::Null);
        self.depth += 1;
        let result = self.run(Frame {
            unit,
            function,
            reader: BytecodeReader::new(&function.code),
            stack: Vec::with_capacity(8),
            locals,
            pending: None,
        });
        self.depth -= 1;
        result
    }

    fn run(&mut self, mut frame: Frame<'_>) -> Result<Value, Fault> {
        loop {
            let pc = frame.reader.position();
            match self.step(&mut frame) {
                Ok(Flow::Next) => {}
                Ok(Flow::Return(value)) => return Ok(value),
                Err(fault) => {
                    if self.fault_position.is_none() {
                        self.fault_position = frame.function.position(pc);
                    }
                    let Some(handler) = self.find_handler(&frame, pc, &fault) else {
                        return Err(fault);
                    };
                    frame.stack.clear();
                    match (handler.catch, fault) {
                        (CatchKind::Type(_), Fault::Thrown(exception)) => {
                            self.fault_position = None;
                            frame.push(Value::Exception(exception));
                        }
                        (_, fault) => frame.pending = Some(fault),
                    }
                    frame.reader.seek(handler.target as usize);
                }
            }
        }
    }

    /// Innermost handler covering `pc` that accepts `fault`.
    fn find_handler(&self, frame: &Frame<'_>, pc: usize, fault: &Fault) -> Option<Handler> {
        frame
            .function
            .handlers
            .iter()
            .find(|h| {
                (h.start as usize..h.end as usize).contains(&pc)
                    && match (h.catch, fault) {
                        (CatchKind::Any, _) => true,
                        (CatchKind::Type(index), Fault::Thrown(exception)) => frame
                            .unit
                            .types
                            .get(index as usize)
                            .is_some_and(|ty| self.whitelist.is_instance(&Value::Exception(Arc::clone(exception)), ty)),
                        (CatchKind::Type(_), _) => false,
                    }
            })
            .copied()
    }

    fn step(&mut self, frame: &mut Frame<'_>) -> Result<Flow, Fault> {
        let wl = Arc::clone(&self.whitelist);
        let opcode = frame.reader.read_opcode().map_err(decode_fault)?;

        match opcode {
            // =========================================================
            // Stack and constants
            // =========================================================
            Opcode::Nop => {}
            Opcode::Pop => {
                frame.pop()?;
            }
            Opcode::Dup => {
                let top = frame.pop()?;
                frame.push(top.clone());
                frame.push(top);
            }
            Opcode::DupX1 => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                frame.push(b.clone());
                frame.push(a);
                frame.push(b);
            }
            Opcode::DupX2 => {
                let c = frame.pop()?;
                let b = frame.pop()?;
                let a = frame.pop()?;
                frame.push(c.clone());
                frame.push(a);
                frame.push(b);
                frame.push(c);
            }
            Opcode::Swap => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                frame.push(b);
                frame.push(a);
            }
            Opcode::ConstNull => frame.push(Value::Null),
            Opcode::ConstTrue => frame.push(Value::Bool(true)),
            Opcode::ConstFalse => frame.push(Value::Bool(false)),
            Opcode::ConstInt => {
                let value = frame.read_i32()?;
                frame.push(Value::Int(value));
            }
            Opcode::ConstLong => {
                let value = frame.reader.read_i64().map_err(decode_fault)?;
                frame.push(Value::Long(value));
            }
            Opcode::ConstDouble => {
                let value = frame.reader.read_f64().map_err(decode_fault)?;
                frame.push(Value::Double(value));
            }
            Opcode::ConstStr => {
                let index = frame.read_u32()?;
                let s = frame.string(index)?;
                frame.push(Value::Str(s));
            }

            // =========================================================
            // Locals and statics
            // =========================================================
            Opcode::LoadLocal => {
                let slot = frame.read_u16()?;
                let value = frame.local(slot)?.clone();
                frame.push(value);
            }
            Opcode::StoreLocal => {
                let slot = frame.read_u16()?;
                let value = frame.pop()?;
                let local = frame
                    .locals
                    .get_mut(slot as usize)
                    .ok_or_else(|| Fault::Internal(format!("local slot {} out of range", slot)))?;
                *local = value;
            }
            Opcode::LoadStatic => {
                let slot = frame.read_u16()?;
                let value = frame
                    .unit
                    .statics
                    .read()
                    .get(slot as usize)
                    .cloned()
                    .ok_or_else(|| Fault::Internal(format!("static slot {} out of range", slot)))?;
                frame.push(value);
            }
            Opcode::StoreStatic => {
                let slot = frame.read_u16()?;
                let value = frame.pop()?;
                let mut statics = frame.unit.statics.write();
                let target = statics
                    .get_mut(slot as usize)
                    .ok_or_else(|| Fault::Internal(format!("static slot {} out of range", slot)))?;
                *target = value;
            }

            // =========================================================
            // Arithmetic and comparison
            // =========================================================
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Rem
            | Opcode::Shl
            | Opcode::Shr
            | Opcode::Ushr
            | Opcode::BitAnd
            | Opcode::BitOr
            | Opcode::BitXor => {
                let kind = frame.read_kind()?;
                let b = frame.pop()?;
                let a = frame.pop()?;
                frame.push(ops::binary(&wl, opcode, kind, &a, &b)?);
            }
            Opcode::Neg | Opcode::BitNot => {
                let kind = frame.read_kind()?;
                let value = frame.pop()?;
                frame.push(ops::unary(&wl, opcode, kind, &value)?);
            }
            Opcode::Not => {
                let value = frame.pop()?;
                frame.push(Value::Bool(ops::not(&wl, &value)?));
            }
            Opcode::Concat => {
                let count = frame.read_u16()?;
                let parts = frame.pop_n(count as usize)?;
                frame.push(ops::concat(&parts));
            }
            Opcode::Eq | Opcode::Ne | Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => {
                let kind = frame.read_kind()?;
                let b = frame.pop()?;
                let a = frame.pop()?;
                frame.push(Value::Bool(ops::compare(&wl, opcode, kind, &a, &b)?));
            }
            Opcode::RefEq | Opcode::RefNe => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                frame.push(Value::Bool(ops::compare(&wl, opcode, NumKind::Def, &a, &b)?));
            }

            // =========================================================
            // Conversions and type tests
            // =========================================================
            Opcode::Convert => {
                let _from = frame.read_kind()?;
                let to = frame.read_kind()?;
                let value = frame.pop()?;
                frame.push(ops::convert(&wl, to, &value)?);
            }
            Opcode::Unbox => {
                let to = frame.read_kind()?;
                let value = frame.pop()?;
                frame.push(ops::unbox(&wl, to, &value)?);
            }
            Opcode::CheckCast => {
                let ty = frame.read_u32().and_then(|i| frame.ty(i))?;
                let value = frame.pop()?;
                frame.push(ops::check_cast(&wl, ty, value)?);
            }
            Opcode::FromDef => {
                let ty = frame.read_u32().and_then(|i| frame.ty(i))?;
                let explicit = frame.read_u8()? != 0;
                let value = frame.pop()?;
                frame.push(ops::from_def(&wl, ty, explicit, value)?);
            }
            Opcode::InstanceOf => {
                let ty = frame.read_u32().and_then(|i| frame.ty(i))?;
                let value = frame.pop()?;
                frame.push(Value::Bool(wl.is_instance(&value, ty)));
            }
            Opcode::Regex => {
                let pattern = frame.read_u32().and_then(|i| frame.string(i))?;
                let regex = Regex::new(&pattern)
                    .map_err(|e| Fault::illegal_argument(&wl, format!("Invalid regex [{}]: {}", pattern, e)))?;
                frame.push(Value::Pattern(Arc::new(regex)));
            }
            Opcode::RegexFind | Opcode::RegexMatch => {
                let pattern = frame.pop()?;
                let input = frame.pop()?;
                frame.push(Value::Bool(ops::regex_match(&wl, opcode, &input, &pattern)?));
            }

            // =========================================================
            // Control flow
            // =========================================================
            Opcode::Jump => {
                let offset = frame.read_i32()?;
                frame.jump(offset);
            }
            Opcode::JumpIfFalse | Opcode::JumpIfTrue => {
                let offset = frame.read_i32()?;
                let value = frame.pop()?;
                if condition(&wl, &value)? == (opcode == Opcode::JumpIfTrue) {
                    frame.jump(offset);
                }
            }
            Opcode::JumpIfNull | Opcode::JumpIfNonNull => {
                let offset = frame.read_i32()?;
                let value = frame.pop()?;
                if value.is_null() == (opcode == Opcode::JumpIfNull) {
                    frame.jump(offset);
                }
            }
            Opcode::Return => {
                let value = frame.pop()?;
                return Ok(Flow::Return(value));
            }
            Opcode::Throw => {
                let value = frame.pop()?;
                return Err(match value {
                    Value::Exception(exception) => Fault::Thrown(exception),
                    Value::Null => Fault::null_pointer(&wl, "Cannot throw a null value"),
                    other => Fault::class_cast(&wl, format!("Cannot throw a value of type [{}]", other.type_name())),
                });
            }
            Opcode::InitBudget => {
                let limit = frame.read_u32()?;
                self.budget = Some(Budget { remaining: limit, limit });
            }
            Opcode::LoopCount => {
                if let Some(budget) = self.budget.as_mut() {
                    if budget.remaining == 0 {
                        tracing::debug!(limit = budget.limit, "loop budget exhausted");
                        return Err(Fault::TooManyOperations { limit: budget.limit });
                    }
                    budget.remaining -= 1;
                }
            }
            Opcode::Translate => {
                let fault = frame
                    .pending
                    .take()
                    .unwrap_or_else(|| Fault::Internal("translate without a pending fault".into()));
                let exception = ScriptException::from_fault(fault, &frame.unit.source, self.fault_position);
                return Err(Fault::Translated(Box::new(exception)));
            }

            // =========================================================
            // Calls and members
            // =========================================================
            Opcode::CallLocal => {
                let index = frame.read_u16()?;
                let count = frame
                    .unit
                    .function(index)
                    .map(|f| f.param_count as usize)
                    .ok_or_else(|| Fault::Internal(format!("function {} out of range", index)))?;
                let args = frame.pop_n(count)?;
                let result = self.call(frame.unit, index, args)?;
                frame.push(result);
            }
            Opcode::InvokeStatic
            | Opcode::InvokeVirtual
            | Opcode::InvokeFunctional
            | Opcode::New
            | Opcode::InvokeBinding => {
                let member = frame.read_u32().and_then(|i| frame.member(i))?;
                let result = self.invoke_member(frame, member)?;
                frame.push(result);
            }
            Opcode::InvokeDynamic => {
                let index = frame.read_u32()?;
                let result = self.invoke_dynamic(frame, index)?;
                frame.push(result);
            }
            Opcode::GetField | Opcode::GetStatic => {
                let member = frame.read_u32().and_then(|i| frame.member(i))?;
                let Member::Field(field) = wl.member(member) else {
                    return Err(Fault::Internal(format!("{:?} is not a field", wl.member(member))));
                };
                let args = if field.is_static {
                    Vec::new()
                } else {
                    vec![non_null(&wl, frame.pop()?, &field.name)?]
                };
                let value = call_native(&field.getter, self, &args)?;
                frame.push(value);
            }
            Opcode::PutField | Opcode::PutStatic => {
                let member = frame.read_u32().and_then(|i| frame.member(i))?;
                let Member::Field(field) = wl.member(member) else {
                    return Err(Fault::Internal(format!("{:?} is not a field", wl.member(member))));
                };
                let setter = field
                    .setter
                    .as_ref()
                    .ok_or_else(|| Fault::Internal(format!("field [{}] is read-only", field.name)))?;
                let value = frame.pop()?;
                let args = if field.is_static {
                    vec![value]
                } else {
                    vec![non_null(&wl, frame.pop()?, &field.name)?, value]
                };
                call_native(setter, self, &args)?;
            }
            Opcode::DynGet => {
                let index = frame.read_u32()?;
                let receiver = frame.pop()?;
                let value = self.dynamic_load(frame, index, receiver)?;
                frame.push(value);
            }
            Opcode::DynPut => {
                let index = frame.read_u32()?;
                let value = frame.pop()?;
                let receiver = frame.pop()?;
                self.dynamic_store(frame, index, receiver, value)?;
            }

            // =========================================================
            // Arrays, collections and closures
            // =========================================================
            Opcode::NewArray => {
                let ty = frame.read_u32().and_then(|i| frame.ty(i))?;
                let length = frame.pop()?;
                let length = match length {
                    Value::Int(n) if n >= 0 => n as usize,
                    Value::Int(n) => {
                        return Err(Fault::exception(
                            &wl,
                            "NegativeArraySizeException",
                            format!("Negative array length [{}]", n),
                        ));
                    }
                    other => return Err(Fault::class_cast(&wl, format!("Cannot use [{}] as an array length", other.type_name()))),
                };
                self.check_allocation(length)?;
                let element = element_type(ty)?;
                let items = vec![default_value(&element); length];
                frame.push(Value::array(element, items));
            }
            Opcode::ArrayInit => {
                let ty = frame.read_u32().and_then(|i| frame.ty(i))?;
                let count = frame.read_u16()? as usize;
                self.check_allocation(count)?;
                let items = frame.pop_n(count)?;
                frame.push(Value::array(element_type(ty)?, items));
            }
            Opcode::ArrayLength => {
                let value = frame.pop()?;
                let length = match value {
                    Value::Array(array) => array.items.read().len(),
                    Value::Null => return Err(Fault::null_pointer(&wl, "Cannot read the length of a null array")),
                    other => return Err(Fault::class_cast(&wl, format!("[{}] is not an array", other.type_name()))),
                };
                frame.push(Value::Int(length as i32));
            }
            Opcode::LoadIndex => {
                let access = read_access(frame)?;
                let index = frame.pop()?;
                let receiver = frame.pop()?;
                frame.push(load_index(&wl, access, &receiver, &index)?);
            }
            Opcode::StoreIndex => {
                let access = read_access(frame)?;
                let value = frame.pop()?;
                let index = frame.pop()?;
                let receiver = frame.pop()?;
                store_index(&wl, access, &receiver, index, value)?;
            }
            Opcode::NewList => {
                let count = frame.read_u16()? as usize;
                let items = frame.pop_n(count)?;
                frame.push(Value::list(items));
            }
            Opcode::NewMap => {
                let count = frame.read_u16()? as usize;
                let flat = frame.pop_n(count * 2)?;
                let mut map = ScriptMap::default();
                let mut values = flat.into_iter();
                while let (Some(key), Some(value)) = (values.next(), values.next()) {
                    map.insert(key, value);
                }
                frame.push(Value::map(map));
            }
            Opcode::Closure => {
                let function = frame.read_u16()?;
                let count = frame.read_u16()? as usize;
                let captures = frame.pop_n(count)?;
                frame.push(Value::Function(Arc::new(Closure {
                    unit: Arc::clone(frame.unit),
                    function,
                    captures,
                })));
            }
            Opcode::Iterate => {
                let value = frame.pop()?;
                let iterator = match SnapshotIterator::over(&value) {
                    Some(iterator) => iterator,
                    None if value.is_null() => {
                        return Err(Fault::null_pointer(&wl, "Cannot iterate over a null value"));
                    }
                    None => {
                        return Err(Fault::class_cast(
                            &wl,
                            format!("Cannot iterate over a value of type [{}]", value.type_name()),
                        ))
                    }
                };
                frame.push(Value::Object(iterator));
            }
            Opcode::IterHasNext => {
                let value = frame.pop()?;
                let has_next = iterator(&value)?.has_next();
                frame.push(Value::Bool(has_next));
            }
            Opcode::IterNext => {
                let value = frame.pop()?;
                let next = iterator(&value)?
                    .next_value()
                    .ok_or_else(|| Fault::exception(&wl, "IllegalStateException", "Iterator is exhausted"))?;
                frame.push(next);
            }
        }

        Ok(Flow::Next)
    }

    /// A statically bound whitelist call; arguments (receiver first) are on
    /// the stack.
    fn invoke_member(&mut self, frame: &mut Frame<'_>, member: MemberId) -> Result<Value, Fault> {
        let wl = Arc::clone(&self.whitelist);
        match wl.member(member) {
            Member::Constructor(constructor) => {
                let args = frame.pop_n(constructor.params.len())?;
                call_native(&constructor.target, self, &args)
            }
            Member::Method(method) => {
                let count = method.params.len() + usize::from(!method.is_static);
                let args = frame.pop_n(count)?;
                if !method.is_static && args.first().is_some_and(Value::is_null) {
                    return Err(Fault::null_pointer(
                        &wl,
                        format!("Cannot invoke [{}] on a null value", method.name),
                    ));
                }
                call_native(&method.target, self, &args)
            }
            Member::InstanceBinding(binding) => {
                let args = frame.pop_n(binding.params.len())?;
                call_native(&binding.target, self, &args)
            }
            Member::ClassBinding(binding) => {
                let args = frame.pop_n(binding.arity())?;
                let (constructor_args, call_args) = args.split_at(binding.constructor_params.len());
                let bindings = self.bindings;
                let mut state = match bindings.and_then(|b| b.take(member)) {
                    Some(state) => state,
                    None => {
                        tracing::trace!(binding = %binding.name, "creating class binding state");
                        guard(|| (binding.factory)(self, constructor_args))?
                    }
                };
                let result = guard(|| state.call(self, call_args));
                if let Some(bindings) = bindings {
                    bindings.restore(member, state);
                }
                result
            }
            Member::Field(field) => Err(Fault::Internal(format!("field [{}] invoked as a method", field.name))),
        }
    }

    fn invoke_dynamic(&mut self, frame: &mut Frame<'_>, index: u32) -> Result<Value, Fault> {
        let wl = Arc::clone(&self.whitelist);
        let unit = frame.unit;
        let site = unit
            .call_sites
            .get(index as usize)
            .ok_or_else(|| Fault::Internal(format!("call site {} out of range", index)))?;
        let args = frame.pop_n(site.reference.arity as usize + 1)?;
        let receiver = &args[0];
        match site.resolve(&wl, receiver, self.limits.max_call_site_depth)? {
            Resolved::Member(member) => match wl.member(member) {
                Member::Method(method) => call_native(&method.target, self, &args),
                other => Err(Fault::Internal(format!("{:?} is not callable", other))),
            },
            Resolved::Closure => self.call_function(receiver, &args[1..]),
            Resolved::MapEntry | Resolved::ArrayLength => {
                Err(Fault::Internal(format!("def call [{}] resolved to a load", site.reference)))
            }
        }
    }

    fn dynamic_load(&mut self, frame: &Frame<'_>, index: u32, receiver: Value) -> Result<Value, Fault> {
        let wl = Arc::clone(&self.whitelist);
        let site = frame
            .unit
            .call_sites
            .get(index as usize)
            .ok_or_else(|| Fault::Internal(format!("call site {} out of range", index)))?;
        match site.resolve(&wl, &receiver, self.limits.max_call_site_depth)? {
            Resolved::Member(member) => match wl.member(member) {
                Member::Field(field) => call_native(&field.getter, self, &[receiver]),
                Member::Method(method) => call_native(&method.target, self, &[receiver]),
                other => Err(Fault::Internal(format!("{:?} is not readable", other))),
            },
            Resolved::MapEntry => match &receiver {
                Value::Map(map) => Ok(map
                    .read()
                    .get(&Value::string(&site.reference.name))
                    .cloned()
                    .unwrap_or(Value::Null)),
                _ => Err(Fault::Internal("map access on a non-map receiver".into())),
            },
            Resolved::ArrayLength => match &receiver {
                Value::Array(array) => Ok(Value::Int(array.items.read().len() as i32)),
                _ => Err(Fault::Internal("array length of a non-array receiver".into())),
            },
            Resolved::Closure => Err(Fault::Internal(format!("def load [{}] resolved to a call", site.reference))),
        }
    }

    fn dynamic_store(&mut self, frame: &Frame<'_>, index: u32, receiver: Value, value: Value) -> Result<(), Fault> {
        let wl = Arc::clone(&self.whitelist);
        let site = frame
            .unit
            .call_sites
            .get(index as usize)
            .ok_or_else(|| Fault::Internal(format!("call site {} out of range", index)))?;
        match site.resolve(&wl, &receiver, self.limits.max_call_site_depth)? {
            Resolved::Member(member) => {
                let target = match wl.member(member) {
                    Member::Field(field) => field
                        .setter
                        .as_ref()
                        .ok_or_else(|| Fault::Internal(format!("field [{}] is read-only", field.name)))?,
                    Member::Method(method) => &method.target,
                    other => return Err(Fault::Internal(format!("{:?} is not writable", other))),
                };
                call_native(target, self, &[receiver, value])?;
                Ok(())
            }
            Resolved::MapEntry => match &receiver {
                Value::Map(map) => {
                    map.write().insert(Value::string(&site.reference.name), value);
                    Ok(())
                }
                _ => Err(Fault::Internal("map access on a non-map receiver".into())),
            },
            Resolved::ArrayLength | Resolved::Closure => Err(Fault::illegal_argument(
                &wl,
                format!("Cannot assign [{}] on [{}]", site.reference.name, receiver.type_name()),
            )),
        }
    }

    fn check_allocation(&self, requested: usize) -> Result<(), Fault> {
        if requested > self.limits.max_array_length {
            tracing::debug!(requested, limit = self.limits.max_array_length, "allocation over limit");
            return Err(Fault::OutOfMemory {
                requested,
                limit: self.limits.max_array_length,
            });
        }
        Ok(())
    }
}

impl NativeContext for Interpreter<'_> {
    fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    fn call_function(&mut self, function: &Value, args: &[Value]) -> Result<Value, Fault> {
        match function {
            Value::Function(closure) => {
                let arity = closure.arity();
                if args.len() != arity {
                    return Err(Fault::illegal_argument(
                        &self.whitelist,
                        format!("Function expects {} arguments but was called with {}", arity, args.len()),
                    ));
                }
                let mut all = Vec::with_capacity(closure.captures.len() + args.len());
                all.extend_from_slice(&closure.captures);
                all.extend_from_slice(args);
                self.call(&closure.unit, closure.function, all)
            }
            Value::Null => Err(Fault::null_pointer(&self.whitelist, "Cannot call a null function")),
            other => Err(Fault::class_cast(
                &self.whitelist,
                format!("Cannot call a value of type [{}] as a function", other.type_name()),
            )),
        }
    }
}

fn condition(wl: &Whitelist, value: &Value) -> Result<bool, Fault> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Err(Fault::null_pointer(wl, "Cannot use null as a condition")),
        other => Err(Fault::class_cast(
            wl,
            format!("Cannot cast [{}] to [boolean]", other.type_name()),
        )),
    }
}

fn non_null(wl: &Whitelist, receiver: Value, member: &str) -> Result<Value, Fault> {
    if receiver.is_null() {
        return Err(Fault::null_pointer(wl, format!("Cannot access [{}] on a null value", member)));
    }
    Ok(receiver)
}

fn element_type(array_type: &ScriptType) -> Result<ScriptType, Fault> {
    array_type
        .element()
        .cloned()
        .ok_or_else(|| Fault::Internal(format!("{:?} is not an array type", array_type)))
}

fn default_value(element: &ScriptType) -> Value {
    match element {
        ScriptType::Boolean => Value::Bool(false),
        ScriptType::Int => Value::Int(0),
        ScriptType::Long => Value::Long(0),
        ScriptType::Double => Value::Double(0.0),
        _ => Value::Null,
    }
}

fn read_access(frame: &mut Frame<'_>) -> Result<IndexAccess, Fault> {
    let byte = frame.read_u8()?;
    IndexAccess::from_u8(byte).ok_or_else(|| Fault::Internal(format!("invalid index access {}", byte)))
}

fn iterator(value: &Value) -> Result<&SnapshotIterator, Fault> {
    match value {
        Value::Object(object) => object
            .as_any()
            .downcast_ref::<SnapshotIterator>()
            .ok_or_else(|| Fault::Internal("expected an iterator".into())),
        _ => Err(Fault::Internal("expected an iterator".into())),
    }
}

/// Array or list position of `index`; negative indexes count from the end.
fn position(wl: &Whitelist, index: &Value, length: usize) -> Result<usize, Fault> {
    let raw = match index {
        Value::Int(i) => *i as i64,
        Value::Long(l) => *l,
        Value::Null => return Err(Fault::null_pointer(wl, "Cannot use null as an index")),
        other => return Err(Fault::class_cast(wl, format!("Cannot use [{}] as an index", other.type_name()))),
    };
    let resolved = if raw < 0 { raw + length as i64 } else { raw };
    if resolved < 0 || resolved >= length as i64 {
        return Err(Fault::index_out_of_bounds(wl, raw, length));
    }
    Ok(resolved as usize)
}

fn load_index(wl: &Whitelist, access: IndexAccess, receiver: &Value, index: &Value) -> Result<Value, Fault> {
    match (access, receiver) {
        (_, Value::Null) => Err(Fault::null_pointer(wl, "Cannot index a null value")),
        (IndexAccess::Array | IndexAccess::Dynamic, Value::Array(array)) => {
            let items = array.items.read();
            Ok(items[position(wl, index, items.len())?].clone())
        }
        (IndexAccess::List | IndexAccess::Dynamic, Value::List(list)) => {
            let items = list.read();
            Ok(items[position(wl, index, items.len())?].clone())
        }
        (IndexAccess::Map | IndexAccess::Dynamic, Value::Map(map)) => {
            Ok(map.read().get(index).cloned().unwrap_or(Value::Null))
        }
        (_, other) => Err(Fault::illegal_argument(
            wl,
            format!("Attempting to address a non-array type [{}] as an array.", other.type_name()),
        )),
    }
}

fn store_index(wl: &Whitelist, access: IndexAccess, receiver: &Value, index: Value, value: Value) -> Result<(), Fault> {
    match (access, receiver) {
        (_, Value::Null) => Err(Fault::null_pointer(wl, "Cannot index a null value")),
        (IndexAccess::Array | IndexAccess::Dynamic, Value::Array(array)) => {
            let value = if access == IndexAccess::Dynamic {
                ops::from_def(wl, &array.element, false, value)?
            } else {
                value
            };
            let mut items = array.items.write();
            let at = position(wl, &index, items.len())?;
            items[at] = value;
            Ok(())
        }
        (IndexAccess::List | IndexAccess::Dynamic, Value::List(list)) => {
            let mut items = list.write();
            let at = position(wl, &index, items.len())?;
            items[at] = value;
            Ok(())
        }
        (IndexAccess::Map | IndexAccess::Dynamic, Value::Map(map)) => {
            map.write().insert(index, value);
            Ok(())
        }
        (_, other) => Err(Fault::illegal_argument(
            wl,
            format!("Attempting to address a non-array type [{}] as an array.", other.type_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::bytecode::{BytecodeWriter, CodeUnit, FunctionRole, LineEntry};
    use crate::settings::CompilerSettings;
    use crate::vm::loader::load;
    use crate::whitelist::standard;

    fn function(name: &str, params: u16, slots: u16, code: BytecodeWriter) -> FunctionCode {
        FunctionCode {
            name: name.into(),
            role: if name == "execute" { FunctionRole::Entry } else { FunctionRole::Declared },
            param_count: params,
            slot_count: slots,
            code: code.into_bytes(),
            handlers: Vec::new(),
            lines: vec![LineEntry { pc: 0, offset: 0 }],
        }
    }

    fn run(unit: CodeUnit, settings: CompilerSettings, args: Vec<Value>) -> Result<Value, ScriptException> {
        let loaded = load(&unit, standard(), &settings).unwrap();
        Interpreter::new(&loaded).execute(&loaded, args)
    }

    #[test]
    fn test_arithmetic_and_locals() {
        let mut w = BytecodeWriter::new();
        w.emit_opcode(Opcode::ConstInt);
        w.emit_i32(40);
        w.emit_opcode(Opcode::StoreLocal);
        w.emit_u16(1);
        w.emit_opcode(Opcode::LoadLocal);
        w.emit_u16(1);
        w.emit_opcode(Opcode::LoadLocal);
        w.emit_u16(0);
        w.emit_opcode(Opcode::Add);
        w.emit_u8(NumKind::Int as u8);
        w.emit_opcode(Opcode::Return);
        let mut unit = CodeUnit::new("t", "");
        unit.functions.push(function("execute", 1, 2, w));

        let value = run(unit, CompilerSettings::default(), vec![Value::Int(2)]).unwrap();
        assert!(matches!(value, Value::Int(42)));
    }

    #[test]
    fn test_loop_budget_faults() {
        // loop: LOOP_COUNT; JUMP loop
        let mut w = BytecodeWriter::new();
        w.emit_opcode(Opcode::InitBudget);
        w.emit_u32(5);
        let top = w.offset();
        w.emit_opcode(Opcode::LoopCount);
        w.emit_jump_to(Opcode::Jump, top);
        let mut unit = CodeUnit::new("t", "while (true) {}");
        unit.functions.push(function("execute", 0, 0, w));

        let err = run(unit, CompilerSettings::default(), Vec::new()).unwrap_err();
        assert_eq!(err.class_name, "TooManyOperationsError");
        assert!(err.is_sandbox_fault());
    }

    #[test]
    fn test_recursion_overflows() {
        let mut w = BytecodeWriter::new();
        w.emit_opcode(Opcode::CallLocal);
        w.emit_u16(0);
        w.emit_opcode(Opcode::Return);
        let mut unit = CodeUnit::new("t", "");
        unit.functions.push(function("execute", 0, 0, w));

        let settings = CompilerSettings::default().with_max_call_depth(16);
        let err = run(unit, settings, Vec::new()).unwrap_err();
        assert_eq!(err.class_name, "StackOverflowError");
    }

    #[test]
    fn test_stack_budget_stops_recursion_before_depth_limit() {
        let mut w = BytecodeWriter::new();
        w.emit_opcode(Opcode::CallLocal);
        w.emit_u16(0);
        w.emit_opcode(Opcode::Return);
        let mut unit = CodeUnit::new("t", "");
        unit.functions.push(function("execute", 0, 0, w));

        let settings = CompilerSettings::default()
            .with_max_call_depth(crate::settings::MAX_CALL_DEPTH_LIMIT)
            .with_max_stack_bytes(crate::settings::MIN_STACK_BYTES);
        let err = run(unit, settings, Vec::new()).unwrap_err();
        assert_eq!(err.class_name, "StackOverflowError");
        assert!(err.is_sandbox_fault());
    }

    #[test]
    fn test_oversized_array_is_out_of_memory() {
        let mut unit = CodeUnit::new("t", "");
        unit.types.push("int[]".into());
        let mut w = BytecodeWriter::new();
        w.emit_opcode(Opcode::ConstInt);
        w.emit_i32(100);
        w.emit_opcode(Opcode::NewArray);
        w.emit_u32(0);
        w.emit_opcode(Opcode::Return);
        unit.functions.push(function("execute", 0, 0, w));

        let settings = CompilerSettings::default().with_max_array_length(10);
        let err = run(unit, settings, Vec::new()).unwrap_err();
        assert_eq!(err.class_name, "OutOfMemoryError");
    }

    #[test]
    fn test_negative_index_counts_from_end() {
        let wl = standard();
        let list = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let last = load_index(&wl, IndexAccess::List, &list, &Value::Int(-1)).unwrap();
        assert!(matches!(last, Value::Int(3)));
        let err = load_index(&wl, IndexAccess::List, &list, &Value::Int(3)).unwrap_err();
        assert_eq!(err.class_name(), "IndexOutOfBoundsException");
    }

    #[test]
    fn test_map_index_store_and_load() {
        let wl = standard();
        let map = Value::map(ScriptMap::default());
        store_index(&wl, IndexAccess::Dynamic, &map, Value::string("k"), Value::Int(7)).unwrap();
        let value = load_index(&wl, IndexAccess::Map, &map, &Value::string("k")).unwrap();
        assert!(matches!(value, Value::Int(7)));
        let missing = load_index(&wl, IndexAccess::Map, &map, &Value::string("x")).unwrap();
        assert!(missing.is_null());
    }
}
