//! Bytecode opcodes for the kore VM
//!
//! Every instruction is one 32-bit word with the opcode in the top 8 bits,
//! except `Call` and `Ret` which are followed by packed-register words (see
//! [`crate::word`]).
//!
//! Opcodes are organized into categories:
//! - 0x00-0x0F: register moves & lifetime
//! - 0x10-0x1F: constant and global loads/stores
//! - 0x20-0x3F: arithmetic (per numeric width)
//! - 0x40-0x5F: comparison (per numeric width)
//! - 0x60-0x6F: heap allocation
//! - 0x70-0x7F: control flow and calls

/// Bytecode opcode enumeration
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// No operation
    Nop = 0x00,
    /// Stop execution of the current program
    Halt = 0x01,
    /// Copy one register into another: a = b
    Move = 0x02,
    /// Release the value held in a register (reference types only)
    Destroy = 0x03,

    /// Load a boolean constant: a = constants[value]
    LoadBool = 0x10,
    /// Load a 32-bit integer constant
    LoadI32 = 0x11,
    /// Load a 64-bit integer constant
    LoadI64 = 0x12,
    /// Load a 32-bit float constant
    LoadF32 = 0x13,
    /// Load a 64-bit float constant
    LoadF64 = 0x14,
    /// Load a global slot into a register: a = globals[value]
    LoadGlobal = 0x18,
    /// Store a register into a global slot: globals[value] = a
    StoreGlobal = 0x19,

    // ===== Arithmetic: a = b op c =====
    AddI32 = 0x20,
    SubI32 = 0x21,
    MulI32 = 0x22,
    DivI32 = 0x23,
    ModI32 = 0x24,

    AddI64 = 0x28,
    SubI64 = 0x29,
    MulI64 = 0x2A,
    DivI64 = 0x2B,
    ModI64 = 0x2C,

    AddF32 = 0x30,
    SubF32 = 0x31,
    MulF32 = 0x32,
    DivF32 = 0x33,

    AddF64 = 0x38,
    SubF64 = 0x39,
    MulF64 = 0x3A,
    DivF64 = 0x3B,

    // ===== Comparison: a = b op c =====
    LtI32 = 0x40,
    GtI32 = 0x41,
    LeI32 = 0x42,
    GeI32 = 0x43,
    EqI32 = 0x44,
    NeI32 = 0x45,

    LtI64 = 0x48,
    GtI64 = 0x49,
    LeI64 = 0x4A,
    GeI64 = 0x4B,
    EqI64 = 0x4C,
    NeI64 = 0x4D,

    LtF32 = 0x50,
    GtF32 = 0x51,
    LeF32 = 0x52,
    GeF32 = 0x53,
    EqF32 = 0x54,
    NeF32 = 0x55,

    LtF64 = 0x58,
    GtF64 = 0x59,
    LeF64 = 0x5A,
    GeF64 = 0x5B,
    EqF64 = 0x5C,
    NeF64 = 0x5D,

    /// Allocate an array: a = array of length regs[b]
    AllocArray = 0x60,

    /// Unconditional jump, pc-relative signed 16-bit byte offset
    Jmp = 0x70,
    /// Conditional jump: taken when regs[a] is true
    JmpIf = 0x71,
    /// Call: fields are (function index, arg count, ret count), followed by
    /// packed argument then return-destination registers
    Call = 0x78,
    /// Return: field is the return-value count, followed by packed registers
    Ret = 0x79,
}

/// Operand shape of a fixed or variable-length instruction word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandForm {
    /// Opcode only
    None,
    /// One register in bits 23-16
    OneReg,
    /// Registers in bits 23-16 and 15-8
    TwoReg,
    /// Registers in bits 23-16, 15-8 and 7-0
    ThreeReg,
    /// Register in bits 23-16, 16-bit value in bits 15-0
    RegValue,
    /// 16-bit value in bits 15-0
    Value,
    /// Three byte fields plus packed-register tail words
    Call,
    /// One byte field plus packed-register tail words
    Ret,
}

impl Opcode {
    /// Convert the opcode to its byte value
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Convert a byte to an opcode, if valid
    pub fn from_u8(byte: u8) -> Option<Self> {
        use Opcode::*;
        Some(match byte {
            0x00 => Nop,
            0x01 => Halt,
            0x02 => Move,
            0x03 => Destroy,
            0x10 => LoadBool,
            0x11 => LoadI32,
            0x12 => LoadI64,
            0x13 => LoadF32,
            0x14 => LoadF64,
            0x18 => LoadGlobal,
            0x19 => StoreGlobal,
            0x20 => AddI32,
            0x21 => SubI32,
            0x22 => MulI32,
            0x23 => DivI32,
            0x24 => ModI32,
            0x28 => AddI64,
            0x29 => SubI64,
            0x2A => MulI64,
            0x2B => DivI64,
            0x2C => ModI64,
            0x30 => AddF32,
            0x31 => SubF32,
            0x32 => MulF32,
            0x33 => DivF32,
            0x38 => AddF64,
            0x39 => SubF64,
            0x3A => MulF64,
            0x3B => DivF64,
            0x40 => LtI32,
            0x41 => GtI32,
            0x42 => LeI32,
            0x43 => GeI32,
            0x44 => EqI32,
            0x45 => NeI32,
            0x48 => LtI64,
            0x49 => GtI64,
            0x4A => LeI64,
            0x4B => GeI64,
            0x4C => EqI64,
            0x4D => NeI64,
            0x50 => LtF32,
            0x51 => GtF32,
            0x52 => LeF32,
            0x53 => GeF32,
            0x54 => EqF32,
            0x55 => NeF32,
            0x58 => LtF64,
            0x59 => GtF64,
            0x5A => LeF64,
            0x5B => GeF64,
            0x5C => EqF64,
            0x5D => NeF64,
            0x60 => AllocArray,
            0x70 => Jmp,
            0x71 => JmpIf,
            0x78 => Call,
            0x79 => Ret,
            _ => return None,
        })
    }

    /// Operand shape used by the loader, the disassembler and the VM
    pub fn form(self) -> OperandForm {
        use Opcode::*;
        match self {
            Nop | Halt => OperandForm::None,
            Destroy => OperandForm::OneReg,
            Move | AllocArray => OperandForm::TwoReg,
            LoadBool | LoadI32 | LoadI64 | LoadF32 | LoadF64 | LoadGlobal | StoreGlobal => {
                OperandForm::RegValue
            }
            Jmp => OperandForm::Value,
            JmpIf => OperandForm::RegValue,
            Call => OperandForm::Call,
            Ret => OperandForm::Ret,
            _ => OperandForm::ThreeReg,
        }
    }

    /// Mnemonic used by the disassembler
    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Nop => "nop",
            Halt => "halt",
            Move => "move",
            Destroy => "destroy",
            LoadBool => "load.bool",
            LoadI32 => "load.i32",
            LoadI64 => "load.i64",
            LoadF32 => "load.f32",
            LoadF64 => "load.f64",
            LoadGlobal => "gload",
            StoreGlobal => "gstore",
            AddI32 => "add.i32",
            SubI32 => "sub.i32",
            MulI32 => "mul.i32",
            DivI32 => "div.i32",
            ModI32 => "mod.i32",
            AddI64 => "add.i64",
            SubI64 => "sub.i64",
            MulI64 => "mul.i64",
            DivI64 => "div.i64",
            ModI64 => "mod.i64",
            AddF32 => "add.f32",
            SubF32 => "sub.f32",
            MulF32 => "mul.f32",
            DivF32 => "div.f32",
            AddF64 => "add.f64",
            SubF64 => "sub.f64",
            MulF64 => "mul.f64",
            DivF64 => "div.f64",
            LtI32 => "lt.i32",
            GtI32 => "gt.i32",
            LeI32 => "le.i32",
            GeI32 => "ge.i32",
            EqI32 => "eq.i32",
            NeI32 => "ne.i32",
            LtI64 => "lt.i64",
            GtI64 => "gt.i64",
            LeI64 => "le.i64",
            GeI64 => "ge.i64",
            EqI64 => "eq.i64",
            NeI64 => "ne.i64",
            LtF32 => "lt.f32",
            GtF32 => "gt.f32",
            LeF32 => "le.f32",
            GeF32 => "ge.f32",
            EqF32 => "eq.f32",
            NeF32 => "ne.f32",
            LtF64 => "lt.f64",
            GtF64 => "gt.f64",
            LeF64 => "le.f64",
            GeF64 => "ge.f64",
            EqF64 => "eq.f64",
            NeF64 => "ne.f64",
            AllocArray => "newarr",
            Jmp => "jmp",
            JmpIf => "jmpif",
            Call => "call",
            Ret => "ret",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}
