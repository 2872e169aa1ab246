//! Linear-scan register allocation
//!
//! Maps virtual registers onto a compact physical register file using the
//! live ranges from the liveness pass. There is no spilling: the register
//! file is large enough for any program the front end accepts, and running
//! out is a hard compile error.
//!
//! Intervals are walked in ascending start order. Before assigning an
//! interval, every active interval whose `end` is strictly below the new
//! interval's `start` is expired and its physical register returned to the
//! free pool. The strict comparison means an interval ending exactly where
//! another begins is still considered overlapping, so a value read by the
//! instruction that defines a new one can never share its register.

use crate::error::{CompileError, CompileResult};
use crate::ir::{Function, Instr, Reg};
use crate::liveness::LiveRange;
use rustc_hash::FxHashMap;

/// Hard ceiling of the physical register file
pub const MAX_REGISTERS: u32 = 256;

/// Assign physical registers for `func` and rewrite its instructions in
/// place. `ranges` must be sorted by ascending start (ties by register id),
/// as produced by [`crate::liveness::live_ranges`].
///
/// Parameter registers keep identity: parameters occupy virtual registers
/// `0..arity` with ranges starting at position 0, so the sorted walk hands
/// them physical registers `0..arity` and the call convention's argument
/// windows stay valid.
pub fn allocate(func: &mut Function, ranges: &[LiveRange]) -> CompileResult<()> {
    let mut free: Vec<u32> = (0..func.register_count().max(func.arity)).rev().collect();
    let mut active: Vec<(LiveRange, u32)> = Vec::new();
    let mut assignment: FxHashMap<Reg, Reg> = FxHashMap::default();
    let mut high_water = 0u32;

    for &range in ranges {
        // Expire intervals that ended strictly before this one starts
        let mut i = 0;
        while i < active.len() {
            if active[i].0.end < range.start {
                let (_, phys) = active.swap_remove(i);
                insert_sorted(&mut free, phys);
            } else {
                i += 1;
            }
        }

        let phys = free.pop().ok_or(CompileError::RegisterOverflow {
            function: func.name.clone(),
            register: range.reg.0,
        })?;
        high_water = high_water.max(phys + 1);
        assignment.insert(range.reg, Reg(phys));
        active.push((range, phys));
    }

    if high_water > MAX_REGISTERS {
        return Err(CompileError::TooManyRegisters {
            function: func.name.clone(),
            needed: high_water,
        });
    }

    rewrite(func, &assignment)?;
    func.max_registers = high_water.max(func.arity);
    Ok(())
}

/// Keep the free pool sorted descending so `pop` yields the lowest id
fn insert_sorted(free: &mut Vec<u32>, phys: u32) {
    match free.binary_search_by(|probe| phys.cmp(probe)) {
        Ok(pos) | Err(pos) => free.insert(pos, phys),
    }
}

fn rewrite(func: &mut Function, assignment: &FxHashMap<Reg, Reg>) -> CompileResult<()> {
    let name = func.name.clone();
    let map = |reg: &mut Reg| -> CompileResult<()> {
        *reg = *assignment
            .get(reg)
            .ok_or_else(|| CompileError::Internal {
                message: format!("register {} of `{}` has no assignment", reg, name),
            })?;
        Ok(())
    };

    for block in func.graph.blocks_mut() {
        for instr in &mut block.instrs {
            match instr {
                Instr::LoadBool { dest, .. }
                | Instr::LoadI32 { dest, .. }
                | Instr::LoadI64 { dest, .. }
                | Instr::LoadF32 { dest, .. }
                | Instr::LoadF64 { dest, .. }
                | Instr::LoadGlobal { dest, .. } => map(dest)?,
                Instr::StoreGlobal { src, .. } => map(src)?,
                Instr::Move { dest, src } => {
                    map(dest)?;
                    map(src)?;
                }
                Instr::Binop { dest, lhs, rhs, .. } => {
                    map(dest)?;
                    map(lhs)?;
                    map(rhs)?;
                }
                Instr::Branch { cond, .. } => map(cond)?,
                Instr::AllocArray { dest, len } => {
                    map(dest)?;
                    map(len)?;
                }
                Instr::Call { args, rets, .. } => {
                    for reg in args.iter_mut() {
                        map(reg)?;
                    }
                    for reg in rets.iter_mut() {
                        map(reg)?;
                    }
                }
                Instr::Ret { values } => {
                    for reg in values.iter_mut() {
                        map(reg)?;
                    }
                }
                Instr::Destroy { reg } => map(reg)?,
                Instr::Jump { .. } | Instr::Raw { .. } => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{SourceLoc, Type};
    use crate::ir::BlockId;
    use crate::liveness::live_ranges;
    use kore_bytecode::Opcode;

    fn func_with(instrs: Vec<Instr>, regs: u32) -> Function {
        let mut func = Function::new(0, "f", SourceLoc::default(), None);
        for _ in 0..regs {
            func.alloc_register(Type::I32);
        }
        let body = func.graph.add_block();
        func.graph.add_edge(BlockId::START, body).unwrap();
        func.graph.set_current(body);
        for instr in instrs {
            func.graph.emit(instr);
        }
        func.graph.add_edge(body, BlockId::END).unwrap();
        func
    }

    fn body_instrs(func: &Function) -> &[Instr] {
        &func.graph.block(BlockId(2)).unwrap().instrs
    }

    #[test]
    fn chain_of_temporaries_collapses() {
        // Sequential loads each dead before the next's definition reuse r0
        let mut func = func_with(
            vec![
                Instr::LoadI32 { dest: Reg(0), index: 0 },
                Instr::StoreGlobal { src: Reg(0), slot: 0 },
                Instr::LoadI32 { dest: Reg(1), index: 1 },
                Instr::StoreGlobal { src: Reg(1), slot: 1 },
                Instr::LoadI32 { dest: Reg(2), index: 2 },
                Instr::StoreGlobal { src: Reg(2), slot: 2 },
                Instr::Ret { values: vec![] },
            ],
            3,
        );
        let ranges = live_ranges(&func);
        allocate(&mut func, &ranges).unwrap();
        assert_eq!(func.max_registers, 1);
        for instr in body_instrs(&func) {
            match instr {
                Instr::LoadI32 { dest, .. } => assert_eq!(*dest, Reg(0)),
                Instr::StoreGlobal { src, .. } => assert_eq!(*src, Reg(0)),
                _ => {}
            }
        }
    }

    #[test]
    fn overlapping_ranges_get_distinct_registers() {
        let mut func = func_with(
            vec![
                Instr::LoadI32 { dest: Reg(0), index: 0 },
                Instr::LoadI32 { dest: Reg(1), index: 1 },
                Instr::Binop {
                    op: Opcode::AddI32,
                    dest: Reg(2),
                    lhs: Reg(0),
                    rhs: Reg(1),
                },
                Instr::Ret { values: vec![Reg(2)] },
            ],
            3,
        );
        let ranges = live_ranges(&func);
        allocate(&mut func, &ranges).unwrap();
        let Instr::Binop { dest, lhs, rhs, .. } = &body_instrs(&func)[2] else {
            panic!("binop survives allocation");
        };
        assert_ne!(lhs, rhs);
        assert_ne!(dest, lhs);
        assert_ne!(dest, rhs);
    }

    #[test]
    fn expiry_is_strict() {
        // r0 ends at position 2, r2 starts at position 2: they overlap at
        // the add itself, so r2 must not reuse r0's register.
        let mut func = func_with(
            vec![
                Instr::LoadI32 { dest: Reg(0), index: 0 },
                Instr::LoadI32 { dest: Reg(1), index: 1 },
                Instr::Binop {
                    op: Opcode::AddI32,
                    dest: Reg(2),
                    lhs: Reg(0),
                    rhs: Reg(1),
                },
                Instr::Ret { values: vec![Reg(2)] },
            ],
            3,
        );
        let ranges = live_ranges(&func);
        let r0 = ranges.iter().find(|r| r.reg == Reg(0)).unwrap();
        let r2 = ranges.iter().find(|r| r.reg == Reg(2)).unwrap();
        assert_eq!(r0.end, r2.start);

        allocate(&mut func, &ranges).unwrap();
        assert_eq!(func.max_registers, 3);
    }

    #[test]
    fn freed_registers_are_reused_lowest_first() {
        // After r0 and r1 die, the next value takes r0 back, not a fresh id
        let mut func = func_with(
            vec![
                Instr::LoadI32 { dest: Reg(0), index: 0 },
                Instr::LoadI32 { dest: Reg(1), index: 1 },
                Instr::Binop {
                    op: Opcode::AddI32,
                    dest: Reg(2),
                    lhs: Reg(0),
                    rhs: Reg(1),
                },
                Instr::StoreGlobal { src: Reg(2), slot: 0 },
                Instr::LoadI32 { dest: Reg(3), index: 2 },
                Instr::StoreGlobal { src: Reg(3), slot: 1 },
                Instr::Ret { values: vec![] },
            ],
            4,
        );
        let ranges = live_ranges(&func);
        allocate(&mut func, &ranges).unwrap();
        let Instr::LoadI32 { dest, .. } = &body_instrs(&func)[4] else {
            panic!("load survives allocation");
        };
        assert_eq!(*dest, Reg(0));
        assert_eq!(func.max_registers, 3);
    }

    #[test]
    fn parameters_keep_their_registers() {
        let mut func = Function::new(0, "f", SourceLoc::default(), None);
        let p0 = func.alloc_register(Type::I32);
        let p1 = func.alloc_register(Type::I32);
        func.arity = 2;
        let body = func.graph.add_block();
        func.graph.add_edge(BlockId::START, body).unwrap();
        func.graph.set_current(body);
        let sum = func.alloc_register(Type::I32);
        func.graph.emit(Instr::Binop {
            op: Opcode::AddI32,
            dest: sum,
            lhs: p0,
            rhs: p1,
        });
        func.graph.emit(Instr::Ret { values: vec![sum] });
        func.graph.add_edge(body, BlockId::END).unwrap();

        let ranges = live_ranges(&func);
        allocate(&mut func, &ranges).unwrap();
        let Instr::Binop { lhs, rhs, .. } = &func.graph.block(body).unwrap().instrs[0] else {
            panic!("binop survives allocation");
        };
        assert_eq!(*lhs, Reg(0));
        assert_eq!(*rhs, Reg(1));
    }
}