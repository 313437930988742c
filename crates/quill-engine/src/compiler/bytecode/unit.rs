//! Code unit format
//!
//! A code unit is everything the loader needs to define one compiled
//! script: its functions, a string constant pool and the symbolic tables
//! (types, whitelist members, dynamic call sites) the instructions index.
//! Nothing in a unit points into a whitelist directly; the loader links
//! every name again.

use super::encoder::{decode_instructions, BytecodeReader, BytecodeWriter, DecodeError};
use super::opcode::Opcode;
use crate::whitelist::{MemberKind, MemberRef};
use std::fmt::Write as _;
use thiserror::Error;

/// Magic number of encoded units: "QUIL"
pub const MAGIC: [u8; 4] = *b"QUIL";

/// Current unit format version
pub const VERSION: u32 = 1;

const HEADER_LEN: usize = 16;

/// Unit flags
pub mod flags {
    /// The IR optimizers ran
    pub const OPTIMIZED: u32 = 1 << 0;
    /// The entry function carries a loop budget
    pub const LOOP_COUNTER: u32 = 1 << 1;
}

#[derive(Debug, Error)]
pub enum UnitError {
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    #[error("Invalid magic number: expected QUIL, got {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Trailing bytes after unit: {0}")]
    TrailingBytes(usize),
}

/// Interned string constants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantPool {
    pub strings: Vec<String>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `s`, adding it if absent.
    pub fn intern(&mut self, s: &str) -> u32 {
        match self.strings.iter().position(|existing| existing == s) {
            Some(index) => index as u32,
            None => {
                self.strings.push(s.to_string());
                (self.strings.len() - 1) as u32
            }
        }
    }

    pub fn get(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// What an exception handler catches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchKind {
    /// Every fault, sandbox faults included; only the entry shim uses it
    Any,
    /// Script exceptions that are instances of a type table entry
    Type(u32),
}

/// Protected range `[start, end)` of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handler {
    pub start: u32,
    pub end: u32,
    pub target: u32,
    pub catch: CatchKind,
}

/// Code offset where the statement at a source offset begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    pub pc: u32,
    pub offset: u32,
}

/// Role of a function in the unit.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionRole {
    Entry = 0,
    Declared = 1,
    Lambda = 2,
    Adapter = 3,
    Accessor = 4,
    StaticInit = 5,
}

impl FunctionRole {
    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => FunctionRole::Entry,
            1 => FunctionRole::Declared,
            2 => FunctionRole::Lambda,
            3 => FunctionRole::Adapter,
            4 => FunctionRole::Accessor,
            5 => FunctionRole::StaticInit,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCode {
    pub name: String,
    pub role: FunctionRole,
    pub param_count: u16,
    /// Locals, parameters included
    pub slot_count: u16,
    pub code: Vec<u8>,
    /// Innermost handlers first
    pub handlers: Vec<Handler>,
    /// Sorted by `pc`
    pub lines: Vec<LineEntry>,
}

impl FunctionCode {
    /// Source offset of the statement containing the instruction at `pc`.
    pub fn position(&self, pc: usize) -> Option<usize> {
        let index = self.lines.partition_point(|entry| entry.pc as usize <= pc);
        index.checked_sub(1).map(|i| self.lines[i].offset as usize)
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_u8(self.role as u8);
        writer.emit_u16(self.param_count);
        writer.emit_u16(self.slot_count);
        writer.emit_u32(self.code.len() as u32);
        writer.emit_bytes(&self.code);

        writer.emit_u32(self.handlers.len() as u32);
        for handler in &self.handlers {
            writer.emit_u32(handler.start);
            writer.emit_u32(handler.end);
            writer.emit_u32(handler.target);
            match handler.catch {
                CatchKind::Any => writer.emit_u8(0),
                CatchKind::Type(index) => {
                    writer.emit_u8(1);
                    writer.emit_u32(index);
                }
            }
        }

        writer.emit_u32(self.lines.len() as u32);
        for line in &self.lines {
            writer.emit_u32(line.pc);
            writer.emit_u32(line.offset);
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let at = reader.position();
        let tag = reader.read_u8()?;
        let role = FunctionRole::from_u8(tag).ok_or(DecodeError::InvalidTag {
            what: "function role",
            tag,
            offset: at,
        })?;
        let param_count = reader.read_u16()?;
        let slot_count = reader.read_u16()?;
        let len = reader.read_u32()? as usize;
        let code = reader.read_bytes(len)?;

        let count = reader.read_u32()? as usize;
        let mut handlers = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let start = reader.read_u32()?;
            let end = reader.read_u32()?;
            let target = reader.read_u32()?;
            let at = reader.position();
            let catch = match reader.read_u8()? {
                0 => CatchKind::Any,
                1 => CatchKind::Type(reader.read_u32()?),
                tag => {
                    return Err(DecodeError::InvalidTag {
                        what: "catch",
                        tag,
                        offset: at,
                    })
                }
            };
            handlers.push(Handler {
                start,
                end,
                target,
                catch,
            });
        }

        let count = reader.read_u32()? as usize;
        let mut lines = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            lines.push(LineEntry {
                pc: reader.read_u32()?,
                offset: reader.read_u32()?,
            });
        }

        Ok(Self {
            name,
            role,
            param_count,
            slot_count,
            code,
            handlers,
            lines,
        })
    }
}

/// One compiled script.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeUnit {
    pub version: u32,
    pub flags: u32,
    pub name: String,
    pub source: String,
    pub constants: ConstantPool,
    /// Canonical type names (`int`, `Map`, `String[]`)
    pub types: Vec<String>,
    pub members: Vec<MemberRef>,
    /// Encoded dynamic call sites
    pub call_sites: Vec<String>,
    pub static_slots: u16,
    pub static_init: Option<u16>,
    /// The entry function is always first
    pub functions: Vec<FunctionCode>,
}

impl CodeUnit {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            version: VERSION,
            flags: 0,
            name: name.into(),
            source: source.into(),
            constants: ConstantPool::new(),
            types: Vec::new(),
            members: Vec::new(),
            call_sites: Vec::new(),
            static_slots: 0,
            static_init: None,
            functions: Vec::new(),
        }
    }

    pub fn function_index(&self, name: &str) -> Option<u16> {
        self.functions.iter().position(|f| f.name == name).map(|i| i as u16)
    }

    /// Encode to bytes.
    ///
    /// Layout: magic, version (u32), flags (u32), CRC32 of the payload
    /// (u32), then name, source, constants, types, members, call sites,
    /// statics and functions.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();
        writer.emit_bytes(&MAGIC);
        writer.emit_u32(self.version);
        writer.emit_u32(self.flags);
        let checksum_offset = writer.offset();
        writer.emit_u32(0);

        writer.emit_string(&self.name);
        writer.emit_string(&self.source);
        writer.emit_u32(self.constants.len() as u32);
        for s in &self.constants.strings {
            writer.emit_string(s);
        }
        writer.emit_u32(self.types.len() as u32);
        for ty in &self.types {
            writer.emit_string(ty);
        }
        writer.emit_u32(self.members.len() as u32);
        for member in &self.members {
            writer.emit_u8(member.kind as u8);
            writer.emit_string(&member.owner);
            writer.emit_string(&member.name);
            writer.emit_u16(member.arity);
        }
        writer.emit_u32(self.call_sites.len() as u32);
        for site in &self.call_sites {
            writer.emit_string(site);
        }
        writer.emit_u16(self.static_slots);
        match self.static_init {
            Some(index) => {
                writer.emit_u8(1);
                writer.emit_u16(index);
            }
            None => writer.emit_u8(0),
        }
        writer.emit_u32(self.functions.len() as u32);
        for function in &self.functions {
            function.encode(&mut writer);
        }

        let checksum = crc32fast::hash(&writer.buffer()[HEADER_LEN..]);
        writer.patch_u32(checksum_offset, checksum);
        writer.into_bytes()
    }

    pub fn decode(data: &[u8]) -> Result<Self, UnitError> {
        let mut reader = BytecodeReader::new(data);
        let bytes = reader.read_bytes(4)?;
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes);
        if magic != MAGIC {
            return Err(UnitError::InvalidMagic(magic));
        }
        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(UnitError::UnsupportedVersion(version));
        }
        let flags = reader.read_u32()?;
        let expected = reader.read_u32()?;
        let actual = crc32fast::hash(&data[HEADER_LEN..]);
        if expected != actual {
            return Err(UnitError::ChecksumMismatch { expected, actual });
        }

        let name = reader.read_string()?;
        let source = reader.read_string()?;
        let mut constants = ConstantPool::new();
        for _ in 0..reader.read_u32()? {
            constants.strings.push(reader.read_string()?);
        }
        let mut types = Vec::new();
        for _ in 0..reader.read_u32()? {
            types.push(reader.read_string()?);
        }
        let mut members = Vec::new();
        for _ in 0..reader.read_u32()? {
            let at = reader.position();
            let tag = reader.read_u8()?;
            let kind = MemberKind::from_u8(tag).ok_or(DecodeError::InvalidTag {
                what: "member kind",
                tag,
                offset: at,
            })?;
            members.push(MemberRef {
                kind,
                owner: reader.read_string()?,
                name: reader.read_string()?,
                arity: reader.read_u16()?,
            });
        }
        let mut call_sites = Vec::new();
        for _ in 0..reader.read_u32()? {
            call_sites.push(reader.read_string()?);
        }
        let static_slots = reader.read_u16()?;
        let static_init = match reader.read_u8()? {
            0 => None,
            _ => Some(reader.read_u16()?),
        };
        let mut functions = Vec::new();
        for _ in 0..reader.read_u32()? {
            functions.push(FunctionCode::decode(&mut reader)?);
        }
        if reader.has_more() {
            return Err(UnitError::TrailingBytes(reader.remaining()));
        }

        Ok(Self {
            version,
            flags,
            name,
            source,
            constants,
            types,
            members,
            call_sites,
            static_slots,
            static_init,
            functions,
        })
    }

    /// Human-readable listing of every function.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "; unit {} (flags {:#x}, {} statics)", self.name, self.flags, self.static_slots);
        for (index, function) in self.functions.iter().enumerate() {
            let _ = writeln!(
                out,
                "fn #{} {} ({} params, {} slots) ; {:?}",
                index, function.name, function.param_count, function.slot_count, function.role
            );
            match decode_instructions(&function.code) {
                Ok(instructions) => {
                    for instruction in instructions {
                        let _ = writeln!(out, "  {:5}  {}", instruction.offset, self.describe(&instruction));
                    }
                }
                Err(e) => {
                    let _ = writeln!(out, "  <{}>", e);
                }
            }
            for handler in &function.handlers {
                let catch = match handler.catch {
                    CatchKind::Any => "any".to_string(),
                    CatchKind::Type(t) => self.types.get(t as usize).cloned().unwrap_or_default(),
                };
                let _ = writeln!(
                    out,
                    "  catch {} [{}, {}) -> {}",
                    catch, handler.start, handler.end, handler.target
                );
            }
        }
        out
    }

    fn describe(&self, instruction: &super::encoder::Instruction) -> String {
        let op = instruction.opcode;
        let first = instruction.operands.first().copied().unwrap_or(0);
        let detail = if op.is_member_op() {
            self.members.get(first as usize).map(|m| m.to_string())
        } else if op.is_call_site_op() {
            self.call_sites.get(first as usize).cloned()
        } else if op.is_type_op() {
            self.types.get(first as usize).cloned()
        } else if matches!(op, Opcode::ConstStr | Opcode::Regex) {
            self.constants.get(first as u32).map(|s| format!("{:?}", s))
        } else if op == Opcode::ConstDouble {
            Some(f64::from_bits(first as u64).to_string())
        } else if let Some(target) = instruction.jump_target() {
            Some(format!("-> {}", target))
        } else if op == Opcode::CallLocal || op == Opcode::Closure {
            self.functions.get(first as usize).map(|f| f.name.clone())
        } else {
            None
        };
        let operands: Vec<String> = instruction.operands.iter().map(|v| v.to_string()).collect();
        match (operands.is_empty(), detail) {
            (true, _) => op.name().to_string(),
            (false, Some(detail)) => format!("{} {} ; {}", op.name(), operands.join(" "), detail),
            (false, None) => format!("{} {}", op.name(), operands.join(" ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CodeUnit {
        let mut unit = CodeUnit::new("sample", "return 42;");
        unit.flags = flags::OPTIMIZED;
        let mut writer = BytecodeWriter::new();
        writer.emit_opcode(Opcode::ConstStr);
        let hello = unit.constants.intern("hello");
        writer.emit_u32(hello);
        writer.emit_opcode(Opcode::Return);
        unit.types.push("Map".to_string());
        unit.members.push(MemberRef {
            kind: MemberKind::Method,
            owner: "Map".to_string(),
            name: "get".to_string(),
            arity: 1,
        });
        unit.call_sites.push("M:size/0".to_string());
        unit.functions.push(FunctionCode {
            name: "execute".to_string(),
            role: FunctionRole::Entry,
            param_count: 1,
            slot_count: 2,
            code: writer.into_bytes(),
            handlers: vec![Handler {
                start: 0,
                end: 5,
                target: 5,
                catch: CatchKind::Type(0),
            }],
            lines: vec![LineEntry { pc: 0, offset: 0 }],
        });
        unit
    }

    #[test]
    fn test_encode_decode() {
        let unit = sample();
        let decoded = CodeUnit::decode(&unit.encode()).unwrap();
        assert_eq!(decoded, unit);
    }

    #[test]
    fn test_intern_deduplicates() {
        let mut pool = ConstantPool::new();
        assert_eq!(pool.intern("a"), 0);
        assert_eq!(pool.intern("b"), 1);
        assert_eq!(pool.intern("a"), 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut bytes = sample().encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            CodeUnit::decode(&bytes),
            Err(UnitError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_bad_header() {
        let mut bytes = sample().encode();
        bytes[0] = b'X';
        assert!(matches!(CodeUnit::decode(&bytes), Err(UnitError::InvalidMagic(_))));

        let mut bytes = sample().encode();
        bytes[4] = 9;
        assert!(matches!(CodeUnit::decode(&bytes), Err(UnitError::UnsupportedVersion(9))));
    }

    #[test]
    fn test_position_lookup() {
        let function = FunctionCode {
            name: "f".to_string(),
            role: FunctionRole::Declared,
            param_count: 0,
            slot_count: 0,
            code: Vec::new(),
            handlers: Vec::new(),
            lines: vec![LineEntry { pc: 0, offset: 3 }, LineEntry { pc: 10, offset: 20 }],
        };
        assert_eq!(function.position(0), Some(3));
        assert_eq!(function.position(9), Some(3));
        assert_eq!(function.position(12), Some(20));
    }

    #[test]
    fn test_disassemble_names_constants() {
        let text = sample().disassemble();
        assert!(text.contains("CONST_STR 0 ; \"hello\""), "{}", text);
        assert!(text.contains("catch Map [0, 5) -> 5"), "{}", text);
    }
}
