//! Instruction set
//!
//! A compact stack machine. Every opcode is one byte followed by fixed-size
//! little-endian operands described by [`Opcode::operands`].
//!
//! Opcodes are grouped by range:
//! - 0x00-0x0F: stack manipulation and constants
//! - 0x10-0x1F: locals and statics
//! - 0x20-0x2F: arithmetic and concatenation
//! - 0x30-0x3F: comparison
//! - 0x40-0x4F: conversions, type tests, regex
//! - 0x50-0x5F: control flow and sandbox
//! - 0x60-0x7F: calls and fields
//! - 0x80-0x9F: arrays, collections, closures, iteration

use crate::whitelist::ScriptType;

/// Operand encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    U8,
    U16,
    U32,
    I32,
    I64,
    F64,
}

impl OperandKind {
    pub fn size(self) -> usize {
        match self {
            OperandKind::U8 => 1,
            OperandKind::U16 => 2,
            OperandKind::U32 | OperandKind::I32 => 4,
            OperandKind::I64 | OperandKind::F64 => 8,
        }
    }
}

/// Value representation an arithmetic or comparison opcode runs on.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumKind {
    Int = 0,
    Long = 1,
    Double = 2,
    /// Decided from the operands at run time
    Def = 3,
    Bool = 4,
}

impl NumKind {
    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => NumKind::Int,
            1 => NumKind::Long,
            2 => NumKind::Double,
            3 => NumKind::Def,
            4 => NumKind::Bool,
            _ => return None,
        })
    }

    /// Kind of an operation type. Reference types compare as `Def`.
    pub fn of(ty: &ScriptType) -> NumKind {
        match ty {
            ScriptType::Int => NumKind::Int,
            ScriptType::Long => NumKind::Long,
            ScriptType::Double => NumKind::Double,
            ScriptType::Boolean => NumKind::Bool,
            _ => NumKind::Def,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NumKind::Int => "int",
            NumKind::Long => "long",
            NumKind::Double => "double",
            NumKind::Def => "def",
            NumKind::Bool => "boolean",
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack & constants (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Discard the top value
    Pop = 0x01,
    /// Duplicate the top value
    Dup = 0x02,
    /// Copy the top value below the one under it: `a b -> b a b`
    DupX1 = 0x03,
    /// Copy the top value below the two under it: `a b c -> c a b c`
    DupX2 = 0x04,
    /// Swap the two top values
    Swap = 0x05,
    ConstNull = 0x08,
    ConstTrue = 0x09,
    ConstFalse = 0x0A,
    /// Push an int (operand: i32)
    ConstInt = 0x0B,
    /// Push a long (operand: i64)
    ConstLong = 0x0C,
    /// Push a double (operand: f64)
    ConstDouble = 0x0D,
    /// Push a pooled string (operand: u32 constant index)
    ConstStr = 0x0E,

    // ===== Locals & statics (0x10-0x1F) =====
    /// Push a local (operand: u16 slot)
    LoadLocal = 0x10,
    /// Pop into a local (operand: u16 slot)
    StoreLocal = 0x11,
    /// Push a static slot of the unit (operand: u16 slot)
    LoadStatic = 0x12,
    /// Pop into a static slot (operand: u16 slot)
    StoreStatic = 0x13,

    // ===== Arithmetic (0x20-0x2F), operand: u8 kind =====
    /// pop b, pop a, push a + b
    Add = 0x20,
    Sub = 0x21,
    Mul = 0x22,
    /// Integer division by zero throws `ArithmeticException`
    Div = 0x23,
    Rem = 0x24,
    /// Shift distance is masked to the width of the left operand
    Shl = 0x25,
    Shr = 0x26,
    Ushr = 0x27,
    BitAnd = 0x28,
    BitOr = 0x29,
    BitXor = 0x2A,
    Neg = 0x2B,
    BitNot = 0x2C,
    /// Boolean negation (no operand)
    Not = 0x2D,
    /// Pop n values and push their string concatenation (operand: u16 n)
    Concat = 0x2E,

    // ===== Comparison (0x30-0x3F), operand: u8 kind =====
    /// `==` semantics: numeric value or `equals`
    Eq = 0x30,
    Ne = 0x31,
    Lt = 0x32,
    Le = 0x33,
    Gt = 0x34,
    Ge = 0x35,
    /// Identity comparison (no operand)
    RefEq = 0x36,
    RefNe = 0x37,

    // ===== Conversions & type tests (0x40-0x4F) =====
    /// Primitive conversion (operands: u8 from kind, u8 to kind)
    Convert = 0x40,
    /// Null check then conversion to a primitive (operand: u8 to kind)
    Unbox = 0x41,
    /// Checked reference downcast (operand: u32 type index)
    CheckCast = 0x42,
    /// Checked conversion out of `def` (operands: u32 type index, u8 explicit)
    FromDef = 0x43,
    /// Push whether the value is an instance (operand: u32 type index)
    InstanceOf = 0x44,
    /// Compile a pattern (operand: u32 constant index)
    Regex = 0x48,
    /// pop pattern, pop input, push whether the pattern occurs
    RegexFind = 0x49,
    /// pop pattern, pop input, push whether the whole input matches
    RegexMatch = 0x4A,

    // ===== Control flow & sandbox (0x50-0x5F) =====
    /// Relative jump from the end of the instruction (operand: i32)
    Jump = 0x50,
    JumpIfFalse = 0x51,
    JumpIfTrue = 0x52,
    /// Pops the tested value
    JumpIfNull = 0x53,
    JumpIfNonNull = 0x54,
    /// Return the top value
    Return = 0x55,
    /// Throw the top value
    Throw = 0x56,
    /// Set the loop budget of this invocation (operand: u32)
    InitBudget = 0x58,
    /// Charge one unit of loop budget
    LoopCount = 0x59,
    /// Convert the pending fault into a script exception and fail
    Translate = 0x5A,

    // ===== Calls & fields (0x60-0x7F) =====
    /// Call a function of this unit (operand: u16 function index)
    CallLocal = 0x60,
    /// Operand for the member opcodes: u32 member index
    InvokeStatic = 0x61,
    /// Receiver is the first argument
    InvokeVirtual = 0x62,
    /// Function value is the first argument
    InvokeFunctional = 0x63,
    New = 0x64,
    InvokeBinding = 0x65,
    /// Dynamic method call (operand: u32 call site index)
    InvokeDynamic = 0x66,
    GetField = 0x70,
    /// pop value, pop receiver
    PutField = 0x71,
    GetStatic = 0x72,
    PutStatic = 0x73,
    /// Dynamic field load (operand: u32 call site index)
    DynGet = 0x74,
    /// Dynamic field store (operand: u32 call site index)
    DynPut = 0x75,

    // ===== Arrays, collections, closures (0x80-0x9F) =====
    /// pop length, push a new array (operand: u32 array type index)
    NewArray = 0x80,
    /// pop n values into a new array (operands: u32 array type index, u16 n)
    ArrayInit = 0x81,
    ArrayLength = 0x82,
    /// pop index, pop receiver, push element (operand: u8 access)
    LoadIndex = 0x83,
    /// pop value, pop index, pop receiver (operand: u8 access)
    StoreIndex = 0x84,
    /// pop n values into a new list (operand: u16 n)
    NewList = 0x85,
    /// pop n key/value pairs into a new map (operand: u16 n)
    NewMap = 0x86,
    /// pop captures into a function value (operands: u16 function, u16 captures)
    Closure = 0x90,
    /// Replace an iterable with an iterator over it
    Iterate = 0x98,
    IterHasNext = 0x99,
    IterNext = 0x9A,
}

impl Opcode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        use Opcode::*;
        Some(match byte {
            0x00 => Nop,
            0x01 => Pop,
            0x02 => Dup,
            0x03 => DupX1,
            0x04 => DupX2,
            0x05 => Swap,
            0x08 => ConstNull,
            0x09 => ConstTrue,
            0x0A => ConstFalse,
            0x0B => ConstInt,
            0x0C => ConstLong,
            0x0D => ConstDouble,
            0x0E => ConstStr,
            0x10 => LoadLocal,
            0x11 => StoreLocal,
            0x12 => LoadStatic,
            0x13 => StoreStatic,
            0x20 => Add,
            0x21 => Sub,
            0x22 => Mul,
            0x23 => Div,
            0x24 => Rem,
            0x25 => Shl,
            0x26 => Shr,
            0x27 => Ushr,
            0x28 => BitAnd,
            0x29 => BitOr,
            0x2A => BitXor,
            0x2B => Neg,
            0x2C => BitNot,
            0x2D => Not,
            0x2E => Concat,
            0x30 => Eq,
            0x31 => Ne,
            0x32 => Lt,
            0x33 => Le,
            0x34 => Gt,
            0x35 => Ge,
            0x36 => RefEq,
            0x37 => RefNe,
            0x40 => Convert,
            0x41 => Unbox,
            0x42 => CheckCast,
            0x43 => FromDef,
            0x44 => InstanceOf,
            0x48 => Regex,
            0x49 => RegexFind,
            0x4A => RegexMatch,
            0x50 => Jump,
            0x51 => JumpIfFalse,
            0x52 => JumpIfTrue,
            0x53 => JumpIfNull,
            0x54 => JumpIfNonNull,
            0x55 => Return,
            0x56 => Throw,
            0x58 => InitBudget,
            0x59 => LoopCount,
            0x5A => Translate,
            0x60 => CallLocal,
            0x61 => InvokeStatic,
            0x62 => InvokeVirtual,
            0x63 => InvokeFunctional,
            0x64 => New,
            0x65 => InvokeBinding,
            0x66 => InvokeDynamic,
            0x70 => GetField,
            0x71 => PutField,
            0x72 => GetStatic,
            0x73 => PutStatic,
            0x74 => DynGet,
            0x75 => DynPut,
            0x80 => NewArray,
            0x81 => ArrayInit,
            0x82 => ArrayLength,
            0x83 => LoadIndex,
            0x84 => StoreIndex,
            0x85 => NewList,
            0x86 => NewMap,
            0x90 => Closure,
            0x98 => Iterate,
            0x99 => IterHasNext,
            0x9A => IterNext,
            _ => return None,
        })
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Operands following the opcode byte, in order.
    pub fn operands(self) -> &'static [OperandKind] {
        use OperandKind as K;
        use Opcode::*;
        match self {
            ConstInt | Jump | JumpIfFalse | JumpIfTrue | JumpIfNull | JumpIfNonNull => &[K::I32],
            ConstLong => &[K::I64],
            ConstDouble => &[K::F64],
            ConstStr | Regex | CheckCast | InstanceOf | InitBudget | InvokeStatic | InvokeVirtual
            | InvokeFunctional | New | InvokeBinding | InvokeDynamic | GetField | PutField | GetStatic
            | PutStatic | DynGet | DynPut | NewArray => &[K::U32],
            LoadLocal | StoreLocal | LoadStatic | StoreStatic | Concat | CallLocal | NewList | NewMap => &[K::U16],
            Add | Sub | Mul | Div | Rem | Shl | Shr | Ushr | BitAnd | BitOr | BitXor | Neg | BitNot | Eq | Ne
            | Lt | Le | Gt | Ge | Unbox | LoadIndex | StoreIndex => &[K::U8],
            Convert => &[K::U8, K::U8],
            FromDef => &[K::U32, K::U8],
            ArrayInit => &[K::U32, K::U16],
            Closure => &[K::U16, K::U16],
            Nop | Pop | Dup | DupX1 | DupX2 | Swap | ConstNull | ConstTrue | ConstFalse | Not | RefEq | RefNe
            | RegexFind | RegexMatch | Return | Throw | LoopCount | Translate | ArrayLength | Iterate
            | IterHasNext | IterNext => &[],
        }
    }

    /// Encoded size of the instruction, opcode byte included.
    pub fn size(self) -> usize {
        1 + self.operands().iter().map(|k| k.size()).sum::<usize>()
    }

    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::Jump | Opcode::JumpIfFalse | Opcode::JumpIfTrue | Opcode::JumpIfNull | Opcode::JumpIfNonNull
        )
    }

    /// Control never falls through to the next instruction.
    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Jump | Opcode::Return | Opcode::Throw | Opcode::Translate)
    }

    /// Operand is a member table index.
    pub fn is_member_op(self) -> bool {
        matches!(
            self,
            Opcode::InvokeStatic
                | Opcode::InvokeVirtual
                | Opcode::InvokeFunctional
                | Opcode::New
                | Opcode::InvokeBinding
                | Opcode::GetField
                | Opcode::PutField
                | Opcode::GetStatic
                | Opcode::PutStatic
        )
    }

    /// Operand is a call site table index.
    pub fn is_call_site_op(self) -> bool {
        matches!(self, Opcode::InvokeDynamic | Opcode::DynGet | Opcode::DynPut)
    }

    /// First operand is a type table index.
    pub fn is_type_op(self) -> bool {
        matches!(
            self,
            Opcode::CheckCast | Opcode::FromDef | Opcode::InstanceOf | Opcode::NewArray | Opcode::ArrayInit
        )
    }

    pub fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Nop => "NOP",
            Pop => "POP",
            Dup => "DUP",
            DupX1 => "DUP_X1",
            DupX2 => "DUP_X2",
            Swap => "SWAP",
            ConstNull => "CONST_NULL",
            ConstTrue => "CONST_TRUE",
            ConstFalse => "CONST_FALSE",
            ConstInt => "CONST_INT",
            ConstLong => "CONST_LONG",
            ConstDouble => "CONST_DOUBLE",
            ConstStr => "CONST_STR",
            LoadLocal => "LOAD_LOCAL",
            StoreLocal => "STORE_LOCAL",
            LoadStatic => "LOAD_STATIC",
            StoreStatic => "STORE_STATIC",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            Rem => "REM",
            Shl => "SHL",
            Shr => "SHR",
            Ushr => "USHR",
            BitAnd => "AND",
            BitOr => "OR",
            BitXor => "XOR",
            Neg => "NEG",
            BitNot => "BITNOT",
            Not => "NOT",
            Concat => "CONCAT",
            Eq => "EQ",
            Ne => "NE",
            Lt => "LT",
            Le => "LE",
            Gt => "GT",
            Ge => "GE",
            RefEq => "REF_EQ",
            RefNe => "REF_NE",
            Convert => "CONVERT",
            Unbox => "UNBOX",
            CheckCast => "CHECK_CAST",
            FromDef => "FROM_DEF",
            InstanceOf => "INSTANCE_OF",
            Regex => "REGEX",
            RegexFind => "REGEX_FIND",
            RegexMatch => "REGEX_MATCH",
            Jump => "JUMP",
            JumpIfFalse => "JUMP_IF_FALSE",
            JumpIfTrue => "JUMP_IF_TRUE",
            JumpIfNull => "JUMP_IF_NULL",
            JumpIfNonNull => "JUMP_IF_NONNULL",
            Return => "RETURN",
            Throw => "THROW",
            InitBudget => "INIT_BUDGET",
            LoopCount => "LOOP_COUNT",
            Translate => "TRANSLATE",
            CallLocal => "CALL_LOCAL",
            InvokeStatic => "INVOKE_STATIC",
            InvokeVirtual => "INVOKE_VIRTUAL",
            InvokeFunctional => "INVOKE_FUNCTIONAL",
            New => "NEW",
            InvokeBinding => "INVOKE_BINDING",
            InvokeDynamic => "INVOKE_DYNAMIC",
            GetField => "GET_FIELD",
            PutField => "PUT_FIELD",
            GetStatic => "GET_STATIC",
            PutStatic => "PUT_STATIC",
            DynGet => "DYN_GET",
            DynPut => "DYN_PUT",
            NewArray => "NEW_ARRAY",
            ArrayInit => "ARRAY_INIT",
            ArrayLength => "ARRAY_LENGTH",
            LoadIndex => "LOAD_INDEX",
            StoreIndex => "STORE_INDEX",
            NewList => "NEW_LIST",
            NewMap => "NEW_MAP",
            Closure => "CLOSURE",
            Iterate => "ITERATE",
            IterHasNext => "ITER_HAS_NEXT",
            IterNext => "ITER_NEXT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for byte in 0..=u8::MAX {
            if let Some(op) = Opcode::from_u8(byte) {
                assert_eq!(op.to_u8(), byte, "{}", op.name());
            }
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_u8(0x06), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_sizes() {
        assert_eq!(Opcode::Return.size(), 1);
        assert_eq!(Opcode::Jump.size(), 5);
        assert_eq!(Opcode::ConstLong.size(), 9);
        assert_eq!(Opcode::FromDef.size(), 6);
        assert_eq!(Opcode::Closure.size(), 5);
    }

    #[test]
    fn test_classification() {
        assert!(Opcode::JumpIfNull.is_jump());
        assert!(!Opcode::CallLocal.is_jump());
        assert!(Opcode::Translate.is_terminator());
        assert!(Opcode::PutStatic.is_member_op());
        assert!(Opcode::DynPut.is_call_site_op());
        assert!(Opcode::ArrayInit.is_type_op());
    }

    #[test]
    fn test_kind_of_type() {
        assert_eq!(NumKind::of(&ScriptType::Long), NumKind::Long);
        assert_eq!(NumKind::of(&ScriptType::Def), NumKind::Def);
        assert_eq!(NumKind::from_u8(4), Some(NumKind::Bool));
        assert_eq!(NumKind::from_u8(9), None);
    }
}
