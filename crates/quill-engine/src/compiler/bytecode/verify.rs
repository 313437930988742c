//! Structural verification of code units
//!
//! Run by the loader before linking. Checks that every function decodes,
//! that jumps and handlers land on instruction boundaries, and that every
//! slot, constant, type, member, call site and function index is in range.

use super::encoder::{decode_instructions, DecodeError, Instruction};
use super::opcode::{NumKind, Opcode};
use super::unit::{CatchKind, CodeUnit, FunctionCode};
use crate::semantic::IndexAccess;
use rustc_hash::FxHashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("Decode error in `{function}`: {error}")]
    Decode { function: String, error: DecodeError },

    #[error("Invalid jump target {target} at offset {offset} in `{function}`")]
    InvalidJumpTarget { function: String, target: i64, offset: usize },

    #[error("{what} index {index} out of range at offset {offset} in `{function}`")]
    IndexOutOfRange {
        function: String,
        what: &'static str,
        index: i64,
        offset: usize,
    },

    #[error("Invalid operand {value} at offset {offset} in `{function}`")]
    InvalidOperand { function: String, value: i64, offset: usize },

    #[error("Execution falls off the end of `{0}`")]
    FallOffEnd(String),

    #[error("Invalid exception handler {index} in `{function}`")]
    InvalidHandler { function: String, index: usize },

    #[error("Unit has no entry function")]
    MissingEntry,

    #[error("Static initializer index {0} out of range")]
    InvalidStaticInit(u16),
}

pub type VerifyResult<T> = Result<T, VerifyError>;

/// Verify every function of `unit`.
pub fn verify_unit(unit: &CodeUnit) -> VerifyResult<()> {
    if unit.functions.is_empty() {
        return Err(VerifyError::MissingEntry);
    }
    if let Some(index) = unit.static_init {
        if index as usize >= unit.functions.len() {
            return Err(VerifyError::InvalidStaticInit(index));
        }
    }
    for function in &unit.functions {
        FunctionVerifier { unit, function }.verify()?;
    }
    Ok(())
}

struct FunctionVerifier<'a> {
    unit: &'a CodeUnit,
    function: &'a FunctionCode,
}

impl<'a> FunctionVerifier<'a> {
    fn verify(&self) -> VerifyResult<()> {
        let instructions = decode_instructions(&self.function.code).map_err(|error| VerifyError::Decode {
            function: self.function.name.clone(),
            error,
        })?;
        let boundaries: FxHashSet<usize> = instructions.iter().map(|i| i.offset).collect();
        let end = self.function.code.len();

        for instruction in &instructions {
            if let Some(target) = instruction.jump_target() {
                if target < 0 || !boundaries.contains(&(target as usize)) {
                    return Err(VerifyError::InvalidJumpTarget {
                        function: self.function.name.clone(),
                        target,
                        offset: instruction.offset,
                    });
                }
            }
            self.check_operands(instruction)?;
        }

        match instructions.last() {
            Some(last) if last.opcode.is_terminator() => {}
            _ => return Err(VerifyError::FallOffEnd(self.function.name.clone())),
        }

        for (index, handler) in self.function.handlers.iter().enumerate() {
            let start = handler.start as usize;
            let stop = handler.end as usize;
            let on_boundary = |offset: usize| boundaries.contains(&offset) || offset == end;
            let type_ok = match handler.catch {
                CatchKind::Any => true,
                CatchKind::Type(t) => (t as usize) < self.unit.types.len(),
            };
            if start > stop
                || !on_boundary(start)
                || !on_boundary(stop)
                || !boundaries.contains(&(handler.target as usize))
                || !type_ok
            {
                return Err(VerifyError::InvalidHandler {
                    function: self.function.name.clone(),
                    index,
                });
            }
        }
        Ok(())
    }

    fn check_operands(&self, instruction: &Instruction) -> VerifyResult<()> {
        let op = instruction.opcode;
        let first = instruction.operands.first().copied().unwrap_or(0);
        let unit = self.unit;
        let bound = |what: &'static str, limit: usize| self.in_range(instruction, what, first, limit);

        match op {
            Opcode::LoadLocal | Opcode::StoreLocal => bound("local", self.function.slot_count as usize),
            Opcode::LoadStatic | Opcode::StoreStatic => bound("static", unit.static_slots as usize),
            Opcode::ConstStr | Opcode::Regex => bound("constant", unit.constants.len()),
            Opcode::CallLocal | Opcode::Closure => bound("function", unit.functions.len()),
            _ if op.is_member_op() => bound("member", unit.members.len()),
            _ if op.is_call_site_op() => bound("call site", unit.call_sites.len()),
            _ if op.is_type_op() => bound("type", unit.types.len()),
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
            | Opcode::BitXor
            | Opcode::Neg
            | Opcode::BitNot
            | Opcode::Eq
            | Opcode::Ne
            | Opcode::Lt
            | Opcode::Le
            | Opcode::Gt
            | Opcode::Ge
            | Opcode::Unbox => self.valid(instruction, first, NumKind::from_u8(first as u8).is_some()),
            Opcode::Convert => {
                let second = instruction.operands.get(1).copied().unwrap_or(-1);
                self.valid(instruction, first, NumKind::from_u8(first as u8).is_some())?;
                self.valid(instruction, second, NumKind::from_u8(second as u8).is_some())
            }
            Opcode::LoadIndex | Opcode::StoreIndex => {
                self.valid(instruction, first, IndexAccess::from_u8(first as u8).is_some())
            }
            _ => Ok(()),
        }
    }

    fn in_range(&self, instruction: &Instruction, what: &'static str, index: i64, limit: usize) -> VerifyResult<()> {
        if index < 0 || index as usize >= limit {
            return Err(VerifyError::IndexOutOfRange {
                function: self.function.name.clone(),
                what,
                index,
                offset: instruction.offset,
            });
        }
        Ok(())
    }

    fn valid(&self, instruction: &Instruction, value: i64, ok: bool) -> VerifyResult<()> {
        if ok {
            Ok(())
        } else {
            Err(VerifyError::InvalidOperand {
                function: self.function.name.clone(),
                value,
                offset: instruction.offset,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::bytecode::encoder::BytecodeWriter;
    use crate::compiler::bytecode::unit::{FunctionRole, Handler};

    fn unit_with(code: Vec<u8>, slots: u16) -> CodeUnit {
        let mut unit = CodeUnit::new("t", "");
        unit.functions.push(FunctionCode {
            name: "execute".to_string(),
            role: FunctionRole::Entry,
            param_count: 0,
            slot_count: slots,
            code,
            handlers: Vec::new(),
            lines: Vec::new(),
        });
        unit
    }

    #[test]
    fn test_valid_function() {
        let mut w = BytecodeWriter::new();
        w.emit_opcode(Opcode::LoadLocal);
        w.emit_u16(0);
        w.emit_opcode(Opcode::Return);
        assert!(verify_unit(&unit_with(w.into_bytes(), 1)).is_ok());
    }

    #[test]
    fn test_local_out_of_range() {
        let mut w = BytecodeWriter::new();
        w.emit_opcode(Opcode::LoadLocal);
        w.emit_u16(3);
        w.emit_opcode(Opcode::Return);
        assert!(matches!(
            verify_unit(&unit_with(w.into_bytes(), 1)),
            Err(VerifyError::IndexOutOfRange { what: "local", .. })
        ));
    }

    #[test]
    fn test_jump_into_operand() {
        let mut w = BytecodeWriter::new();
        let jump = w.emit_jump(Opcode::Jump);
        w.emit_opcode(Opcode::ConstInt);
        w.emit_i32(1);
        w.emit_opcode(Opcode::Return);
        w.patch_jump(jump, 7);
        assert!(matches!(
            verify_unit(&unit_with(w.into_bytes(), 0)),
            Err(VerifyError::InvalidJumpTarget { target: 7, .. })
        ));
    }

    #[test]
    fn test_falls_off_end() {
        let mut w = BytecodeWriter::new();
        w.emit_opcode(Opcode::ConstNull);
        assert!(matches!(
            verify_unit(&unit_with(w.into_bytes(), 0)),
            Err(VerifyError::FallOffEnd(_))
        ));
    }

    #[test]
    fn test_bad_kind_operand() {
        let mut w = BytecodeWriter::new();
        w.emit_opcode(Opcode::ConstNull);
        w.emit_opcode(Opcode::ConstNull);
        w.emit_opcode(Opcode::Add);
        w.emit_u8(9);
        w.emit_opcode(Opcode::Return);
        assert!(matches!(
            verify_unit(&unit_with(w.into_bytes(), 0)),
            Err(VerifyError::InvalidOperand { value: 9, .. })
        ));
    }

    #[test]
    fn test_handler_must_target_boundary() {
        let mut w = BytecodeWriter::new();
        w.emit_opcode(Opcode::ConstNull);
        w.emit_opcode(Opcode::Return);
        let mut unit = unit_with(w.into_bytes(), 0);
        unit.functions[0].handlers.push(Handler {
            start: 0,
            end: 1,
            target: 7,
            catch: CatchKind::Any,
        });
        assert!(matches!(verify_unit(&unit), Err(VerifyError::InvalidHandler { .. })));
    }

    #[test]
    fn test_empty_unit() {
        assert_eq!(verify_unit(&CodeUnit::new("t", "")), Err(VerifyError::MissingEntry));
    }
}
