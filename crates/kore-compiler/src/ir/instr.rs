//! IR instructions
//!
//! One variant per operation kind; each carries only the registers, literal
//! indices or block ids it needs. Branch targets are block ids; the IR is
//! deliberately offset-agnostic, and the bytecode generator resolves block
//! ids to byte offsets after layout.

use super::block::BlockId;
use kore_bytecode::Opcode;

/// Virtual register. Allocated monotonically during lowering; remapped onto
/// a small register file by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub u32);

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// dest = constants\[index\] (boolean)
    LoadBool { dest: Reg, index: u16 },
    LoadI32 { dest: Reg, index: u16 },
    LoadI64 { dest: Reg, index: u16 },
    LoadF32 { dest: Reg, index: u16 },
    LoadF64 { dest: Reg, index: u16 },

    /// dest = globals\[slot\]
    LoadGlobal { dest: Reg, slot: u16 },
    /// globals\[slot\] = src
    StoreGlobal { src: Reg, slot: u16 },

    /// dest = src
    Move { dest: Reg, src: Reg },

    /// dest = lhs op rhs; the opcode is already the width-specific variant
    Binop {
        op: Opcode,
        dest: Reg,
        lhs: Reg,
        rhs: Reg,
    },

    /// Two-way branch on a condition register
    Branch {
        cond: Reg,
        then_blk: BlockId,
        else_blk: BlockId,
    },

    /// Unconditional transfer to another block
    Jump { target: BlockId },

    /// dest = new array of length regs\[len\]
    AllocArray { dest: Reg, len: Reg },

    /// Call a function (or builtin) by index
    Call {
        func: u16,
        args: Vec<Reg>,
        rets: Vec<Reg>,
    },

    /// Return zero or more registers to the caller
    Ret { values: Vec<Reg> },

    /// Release a reference-typed register's value
    Destroy { reg: Reg },

    /// Passthrough opcode with no operands (nop, halt)
    Raw { op: Opcode },
}

impl Instr {
    /// Registers written by this instruction
    pub fn defs(&self, out: &mut Vec<Reg>) {
        match self {
            Instr::LoadBool { dest, .. }
            | Instr::LoadI32 { dest, .. }
            | Instr::LoadI64 { dest, .. }
            | Instr::LoadF32 { dest, .. }
            | Instr::LoadF64 { dest, .. }
            | Instr::LoadGlobal { dest, .. }
            | Instr::Move { dest, .. }
            | Instr::Binop { dest, .. }
            | Instr::AllocArray { dest, .. } => out.push(*dest),
            Instr::Call { rets, .. } => out.extend_from_slice(rets),
            Instr::StoreGlobal { .. }
            | Instr::Branch { .. }
            | Instr::Jump { .. }
            | Instr::Ret { .. }
            | Instr::Destroy { .. }
            | Instr::Raw { .. } => {}
        }
    }

    /// Registers read by this instruction
    pub fn uses(&self, out: &mut Vec<Reg>) {
        match self {
            Instr::StoreGlobal { src, .. } => out.push(*src),
            Instr::Move { src, .. } => out.push(*src),
            Instr::Binop { lhs, rhs, .. } => {
                out.push(*lhs);
                out.push(*rhs);
            }
            Instr::Branch { cond, .. } => out.push(*cond),
            Instr::AllocArray { len, .. } => out.push(*len),
            Instr::Call { args, .. } => out.extend_from_slice(args),
            Instr::Ret { values } => out.extend_from_slice(values),
            Instr::Destroy { reg } => out.push(*reg),
            Instr::LoadBool { .. }
            | Instr::LoadI32 { .. }
            | Instr::LoadI64 { .. }
            | Instr::LoadF32 { .. }
            | Instr::LoadF64 { .. }
            | Instr::LoadGlobal { .. }
            | Instr::Jump { .. }
            | Instr::Raw { .. } => {}
        }
    }

    /// Whether control cannot fall through past this instruction
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instr::Branch { .. } | Instr::Jump { .. } | Instr::Ret { .. }
        ) || matches!(self, Instr::Raw { op: Opcode::Halt })
    }
}
