//! Bytecode encoding and decoding

use super::opcode::{OperandKind, Opcode};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Unexpected end of bytecode at offset {0}")]
    UnexpectedEnd(usize),

    #[error("Invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),

    #[error("Invalid opcode {0:#04x} at offset {1}")]
    InvalidOpcode(u8, usize),

    /// A tag byte outside its enumeration
    #[error("Invalid {what} tag {tag} at offset {offset}")]
    InvalidTag { what: &'static str, tag: u8, offset: usize },
}

/// Appends instructions and raw values to a byte buffer.
#[derive(Debug, Default)]
pub struct BytecodeWriter {
    buffer: Vec<u8>,
}

impl BytecodeWriter {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Current offset (length of the buffer)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Length-prefixed (u32) UTF-8 string
    pub fn emit_string(&mut self, value: &str) {
        self.emit_u32(value.len() as u32);
        self.buffer.extend_from_slice(value.as_bytes());
    }

    pub fn emit_opcode(&mut self, opcode: Opcode) {
        self.emit_u8(opcode.to_u8());
    }

    /// Emit a jump with a placeholder offset; returns the offset of the
    /// opcode for [`patch_jump`](Self::patch_jump).
    pub fn emit_jump(&mut self, opcode: Opcode) -> usize {
        let at = self.offset();
        self.emit_opcode(opcode);
        self.emit_i32(0);
        at
    }

    /// Emit a jump to an already known target.
    pub fn emit_jump_to(&mut self, opcode: Opcode, target: usize) {
        let at = self.emit_jump(opcode);
        self.patch_jump(at, target);
    }

    /// Point the jump at `jump` to `target`.
    pub fn patch_jump(&mut self, jump: usize, target: usize) {
        let relative = target as i64 - (jump as i64 + 5);
        self.patch_i32(jump + 1, relative as i32);
    }

    pub fn patch_i32(&mut self, offset: usize, value: i32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// Reads raw values and instructions from a byte slice.
pub struct BytecodeReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BytecodeReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    pub fn has_more(&self) -> bool {
        self.position < self.buffer.len()
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.position + N;
        let bytes = self
            .buffer
            .get(self.position..end)
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.position = end;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.take()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.take()?))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, DecodeError> {
        let end = self.position + count;
        let bytes = self
            .buffer
            .get(self.position..end)
            .ok_or(DecodeError::UnexpectedEnd(self.position))?
            .to_vec();
        self.position = end;
        Ok(bytes)
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u32()? as usize;
        let start = self.position;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8(start))
    }

    pub fn read_opcode(&mut self) -> Result<Opcode, DecodeError> {
        let byte = self.read_u8()?;
        Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, self.position - 1))
    }

    /// Read one operand, widened to `i64` (`f64` operands as their bits).
    pub fn read_operand(&mut self, kind: OperandKind) -> Result<i64, DecodeError> {
        Ok(match kind {
            OperandKind::U8 => i64::from(self.read_u8()?),
            OperandKind::U16 => i64::from(self.read_u16()?),
            OperandKind::U32 => i64::from(self.read_u32()?),
            OperandKind::I32 => i64::from(self.read_i32()?),
            OperandKind::I64 => self.read_i64()?,
            OperandKind::F64 => self.read_f64()?.to_bits() as i64,
        })
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: Opcode,
    pub operands: Vec<i64>,
}

impl Instruction {
    pub fn size(&self) -> usize {
        self.opcode.size()
    }

    /// Absolute target of a jump instruction.
    pub fn jump_target(&self) -> Option<i64> {
        self.opcode
            .is_jump()
            .then(|| self.offset as i64 + self.size() as i64 + self.operands[0])
    }
}

/// Decode a whole function body.
pub fn decode_instructions(code: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    let mut reader = BytecodeReader::new(code);
    let mut out = Vec::new();
    while reader.has_more() {
        let offset = reader.position();
        let opcode = reader.read_opcode()?;
        let operands = opcode
            .operands()
            .iter()
            .map(|kind| reader.read_operand(*kind))
            .collect::<Result<Vec<_>, _>>()?;
        out.push(Instruction {
            offset,
            opcode,
            operands,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_emission() {
        let mut writer = BytecodeWriter::new();
        writer.emit_u8(0x42);
        writer.emit_u16(0x1234);
        writer.emit_u32(0xABCD_EF01);

        let bytes = writer.buffer();
        assert_eq!(bytes[0], 0x42);
        assert_eq!(bytes[1], 0x34); // little-endian
        assert_eq!(bytes[2], 0x12);
        assert_eq!(bytes[3], 0x01);
        assert_eq!(bytes[6], 0xAB);
    }

    #[test]
    fn test_jump_patching() {
        let mut writer = BytecodeWriter::new();
        let jump = writer.emit_jump(Opcode::JumpIfFalse);
        writer.emit_opcode(Opcode::ConstInt);
        writer.emit_i32(42);
        let target = writer.offset();
        writer.patch_jump(jump, target);

        let code = writer.into_bytes();
        let instructions = decode_instructions(&code).unwrap();
        assert_eq!(instructions[0].operands, vec![5]);
        assert_eq!(instructions[0].jump_target(), Some(target as i64));
    }

    #[test]
    fn test_backward_jump() {
        let mut writer = BytecodeWriter::new();
        writer.emit_opcode(Opcode::Nop);
        writer.emit_jump_to(Opcode::Jump, 0);
        let instructions = decode_instructions(writer.buffer()).unwrap();
        assert_eq!(instructions[1].operands, vec![-6]);
        assert_eq!(instructions[1].jump_target(), Some(0));
    }

    #[test]
    fn test_reader_bounds_checking() {
        let bytes = vec![0x01, 0x02];
        let mut reader = BytecodeReader::new(&bytes);
        assert_eq!(reader.read_u16().unwrap(), 0x0201);
        assert_eq!(reader.read_u8(), Err(DecodeError::UnexpectedEnd(2)));
    }

    #[test]
    fn test_reader_string() {
        let mut writer = BytecodeWriter::new();
        writer.emit_string("héllo");
        writer.emit_i64(-7);
        let bytes = writer.into_bytes();
        let mut reader = BytecodeReader::new(&bytes);
        assert_eq!(reader.read_string().unwrap(), "héllo");
        assert_eq!(reader.read_i64().unwrap(), -7);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_truncated_instruction() {
        let bytes = vec![Opcode::ConstInt.to_u8(), 1, 0];
        assert_eq!(decode_instructions(&bytes), Err(DecodeError::UnexpectedEnd(1)));
    }

    #[test]
    fn test_invalid_opcode() {
        let bytes = vec![0xFF];
        assert_eq!(decode_instructions(&bytes), Err(DecodeError::InvalidOpcode(0xFF, 0)));
    }
}
