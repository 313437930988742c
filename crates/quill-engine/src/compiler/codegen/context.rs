//! Per-function code generation state.

use crate::compiler::bytecode::{BytecodeWriter, CatchKind, Handler, LineEntry, Opcode};

/// Jumps of one loop waiting for their targets.
#[derive(Debug, Default)]
pub(super) struct LoopLabels {
    pub breaks: Vec<usize>,
    pub continues: Vec<usize>,
}

pub(super) struct FunctionContext {
    pub writer: BytecodeWriter,
    pub slots: u16,
    loops: Vec<LoopLabels>,
    pub handlers: Vec<Handler>,
    pub lines: Vec<LineEntry>,
}

impl FunctionContext {
    pub fn new(slots: u16) -> Self {
        Self {
            writer: BytecodeWriter::new(),
            slots,
            loops: Vec::new(),
            handlers: Vec::new(),
            lines: Vec::new(),
        }
    }

    pub fn pc(&self) -> usize {
        self.writer.offset()
    }

    pub fn emit(&mut self, opcode: Opcode) {
        self.writer.emit_opcode(opcode);
    }

    pub fn emit_with_u8(&mut self, opcode: Opcode, operand: u8) {
        self.writer.emit_opcode(opcode);
        self.writer.emit_u8(operand);
    }

    pub fn emit_with_u16(&mut self, opcode: Opcode, operand: u16) {
        self.writer.emit_opcode(opcode);
        self.writer.emit_u16(operand);
    }

    pub fn emit_with_u32(&mut self, opcode: Opcode, operand: u32) {
        self.writer.emit_opcode(opcode);
        self.writer.emit_u32(operand);
    }

    /// Statement start marker; a later marker at the same pc wins.
    pub fn mark_position(&mut self, offset: usize) {
        let pc = self.pc() as u32;
        let entry = LineEntry {
            pc,
            offset: offset as u32,
        };
        match self.lines.last_mut() {
            Some(last) if last.pc == pc => *last = entry,
            _ => self.lines.push(entry),
        }
    }

    pub fn push_handler(&mut self, start: usize, end: usize, target: usize, catch: CatchKind) {
        self.handlers.push(Handler {
            start: start as u32,
            end: end as u32,
            target: target as u32,
            catch,
        });
    }

    pub fn enter_loop(&mut self) {
        self.loops.push(LoopLabels::default());
    }

    pub fn exit_loop(&mut self) -> LoopLabels {
        self.loops.pop().unwrap_or_default()
    }

    /// Record a `break`; false outside of any loop.
    pub fn emit_break(&mut self) -> bool {
        let jump = self.writer.emit_jump(Opcode::Jump);
        match self.loops.last_mut() {
            Some(labels) => {
                labels.breaks.push(jump);
                true
            }
            None => false,
        }
    }

    /// Record a `continue`; false outside of any loop.
    pub fn emit_continue(&mut self) -> bool {
        let jump = self.writer.emit_jump(Opcode::Jump);
        match self.loops.last_mut() {
            Some(labels) => {
                labels.continues.push(jump);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_marker_replaced_at_same_pc() {
        let mut ctx = FunctionContext::new(0);
        ctx.mark_position(1);
        ctx.mark_position(7);
        ctx.emit(Opcode::Nop);
        ctx.mark_position(9);
        assert_eq!(
            ctx.lines,
            vec![LineEntry { pc: 0, offset: 7 }, LineEntry { pc: 1, offset: 9 }]
        );
    }

    #[test]
    fn test_break_outside_loop() {
        let mut ctx = FunctionContext::new(0);
        assert!(!ctx.emit_break());
        ctx.enter_loop();
        assert!(ctx.emit_continue());
        assert_eq!(ctx.exit_loop().continues, vec![5]);
    }
}
