//! Bytecode: instruction set, encoding, code units and verification.

pub mod encoder;
pub mod opcode;
pub mod unit;
pub mod verify;

pub use encoder::{decode_instructions, BytecodeReader, BytecodeWriter, DecodeError, Instruction};
pub use opcode::{NumKind, Opcode, OperandKind};
pub use unit::{
    flags, CatchKind, CodeUnit, ConstantPool, FunctionCode, FunctionRole, Handler, LineEntry, UnitError,
};
pub use verify::{verify_unit, VerifyError};
