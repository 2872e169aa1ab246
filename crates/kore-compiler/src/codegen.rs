//! Bytecode generation
//!
//! Turns allocated IR into 32-bit instruction words. Blocks are emitted in
//! graph layout order (breadth-first from the start block). Jumps are
//! emitted with a zero displacement and recorded as fixups; once every
//! block's byte offset is known, a patch pass rewrites each jump's 16-bit
//! field with the signed byte displacement from the jump word itself to
//! the start of its target block.

use crate::error::{CompileError, CompileResult};
use crate::ir::{BlockId, Function, Instr, IrModule, Reg};
use kore_bytecode::word::{pack_op, pack_reg, pack_reg_value, pack_three, pack_two, patch_value16};
use kore_bytecode::{CompiledObject, Module, Opcode, RegPacker};
use rustc_hash::FxHashMap;

/// A jump word awaiting its displacement
struct Fixup {
    /// Index of the jump's word in the function's code
    word_index: usize,
    target: BlockId,
}

/// Generate a loadable module from allocated IR
pub fn generate(ir: &IrModule, module_index: u32) -> CompileResult<Module> {
    let mut module = Module::new(module_index, ir.path.clone());
    module.constants = ir.constants.clone();
    module.globals = ir.globals;
    for func in &ir.functions {
        module.add_object(generate_function(func)?);
    }
    Ok(module)
}

fn generate_function(func: &Function) -> CompileResult<CompiledObject> {
    let mut code: Vec<u32> = Vec::new();
    let mut block_offsets: FxHashMap<BlockId, usize> = FxHashMap::default();
    let mut fixups: Vec<Fixup> = Vec::new();

    for id in func.graph.layout_order() {
        // Record the block's byte offset before emitting its body
        block_offsets.insert(id, code.len() * 4);
        let block = func
            .graph
            .block(id)
            .ok_or_else(|| CompileError::Internal {
                message: format!("layout order listed unknown block b{}", id.index()),
            })?;
        for instr in &block.instrs {
            emit_instr(instr, &mut code, &mut fixups)?;
        }
    }

    patch_jumps(&mut code, &block_offsets, &fixups)?;

    Ok(CompiledObject {
        name: func.name.clone(),
        span: func.loc.into(),
        index: func.index as u32,
        max_registers: func.max_registers,
        code,
    })
}

fn emit_instr(instr: &Instr, code: &mut Vec<u32>, fixups: &mut Vec<Fixup>) -> CompileResult<()> {
    match instr {
        Instr::LoadBool { dest, index } => {
            code.push(pack_reg_value(Opcode::LoadBool, reg8(*dest), *index));
        }
        Instr::LoadI32 { dest, index } => {
            code.push(pack_reg_value(Opcode::LoadI32, reg8(*dest), *index));
        }
        Instr::LoadI64 { dest, index } => {
            code.push(pack_reg_value(Opcode::LoadI64, reg8(*dest), *index));
        }
        Instr::LoadF32 { dest, index } => {
            code.push(pack_reg_value(Opcode::LoadF32, reg8(*dest), *index));
        }
        Instr::LoadF64 { dest, index } => {
            code.push(pack_reg_value(Opcode::LoadF64, reg8(*dest), *index));
        }
        Instr::LoadGlobal { dest, slot } => {
            code.push(pack_reg_value(Opcode::LoadGlobal, reg8(*dest), *slot));
        }
        Instr::StoreGlobal { src, slot } => {
            code.push(pack_reg_value(Opcode::StoreGlobal, reg8(*src), *slot));
        }
        Instr::Move { dest, src } => {
            code.push(pack_two(Opcode::Move, reg8(*dest), reg8(*src)));
        }
        Instr::Binop { op, dest, lhs, rhs } => {
            code.push(pack_three(*op, reg8(*dest), reg8(*lhs), reg8(*rhs)));
        }
        Instr::Branch {
            cond,
            then_blk,
            else_blk,
        } => {
            fixups.push(Fixup {
                word_index: code.len(),
                target: *then_blk,
            });
            code.push(pack_reg_value(Opcode::JmpIf, reg8(*cond), 0));
            fixups.push(Fixup {
                word_index: code.len(),
                target: *else_blk,
            });
            code.push(pack_op(Opcode::Jmp));
        }
        Instr::Jump { target } => {
            fixups.push(Fixup {
                word_index: code.len(),
                target: *target,
            });
            code.push(pack_op(Opcode::Jmp));
        }
        Instr::AllocArray { dest, len } => {
            code.push(pack_two(Opcode::AllocArray, reg8(*dest), reg8(*len)));
        }
        Instr::Call { func, args, rets } => {
            let index = u8::try_from(*func).map_err(|_| CompileError::Internal {
                message: format!("function index {} exceeds the call operand range", func),
            })?;
            code.push(pack_three(
                Opcode::Call,
                index,
                args.len() as u8,
                rets.len() as u8,
            ));
            let mut packer = RegPacker::new();
            for &reg in args.iter().chain(rets.iter()) {
                packer.push(reg8(reg));
            }
            code.extend(packer.into_words());
        }
        Instr::Ret { values } => {
            code.push(pack_reg(Opcode::Ret, values.len() as u8));
            let mut packer = RegPacker::new();
            for &reg in values {
                packer.push(reg8(reg));
            }
            code.extend(packer.into_words());
        }
        Instr::Destroy { reg } => {
            code.push(pack_reg(Opcode::Destroy, reg8(*reg)));
        }
        Instr::Raw { op } => {
            code.push(pack_op(*op));
        }
    }
    Ok(())
}

/// Rewrite every recorded jump with the signed byte displacement from the
/// jump word itself to its target block's first byte.
fn patch_jumps(
    code: &mut [u32],
    block_offsets: &FxHashMap<BlockId, usize>,
    fixups: &[Fixup],
) -> CompileResult<()> {
    for fixup in fixups {
        let target_offset =
            *block_offsets
                .get(&fixup.target)
                .ok_or_else(|| CompileError::Internal {
                    message: format!("jump targets unlaid-out block b{}", fixup.target.index()),
                })?;
        let own_offset = fixup.word_index * 4;
        let displacement = target_offset as i64 - own_offset as i64;
        if displacement < i16::MIN as i64 || displacement > i16::MAX as i64 {
            return Err(CompileError::JumpOutOfRange {
                block: fixup.target.index() as u32,
                offset: own_offset,
            });
        }
        code[fixup.word_index] =
            patch_value16(code[fixup.word_index], displacement as i16 as u16);
    }
    Ok(())
}

fn reg8(reg: Reg) -> u8 {
    reg.0 as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{SourceLoc, Type};
    use kore_bytecode::word::{opcode_byte, reg_a, value16};

    fn empty_func(name: &str, index: u16) -> Function {
        Function::new(index, name, SourceLoc::default(), None)
    }

    #[test]
    fn straight_line_words() {
        let mut func = empty_func("main", 0);
        let body = func.graph.add_block();
        func.graph.add_edge(BlockId::START, body).unwrap();
        func.graph.set_current(body);
        func.alloc_register(Type::I32);
        func.graph.emit(Instr::LoadI32 { dest: Reg(0), index: 3 });
        func.graph.emit(Instr::Ret { values: vec![] });
        func.graph.add_edge(body, BlockId::END).unwrap();

        let object = generate_function(&func).unwrap();
        assert_eq!(object.code.len(), 2);
        assert_eq!(opcode_byte(object.code[0]), Opcode::LoadI32.to_u8());
        assert_eq!(reg_a(object.code[0]), 0);
        assert_eq!(value16(object.code[0]), 3);
        assert_eq!(opcode_byte(object.code[1]), Opcode::Ret.to_u8());
        assert_eq!(reg_a(object.code[1]), 0);
    }

    #[test]
    fn branch_patches_both_edges() {
        // b2: loadbool r0; jmpif r0 -> b3; jmp -> b4
        // b3: jmp -> b5
        // b4: jmp -> b5
        // b5: ret
        let mut func = empty_func("main", 0);
        let header = func.graph.add_block();
        let then_blk = func.graph.add_block();
        let else_blk = func.graph.add_block();
        let join = func.graph.add_block();
        func.graph.add_edge(BlockId::START, header).unwrap();
        func.graph.add_edge(header, then_blk).unwrap();
        func.graph.add_edge(header, else_blk).unwrap();
        func.graph.add_edge(then_blk, join).unwrap();
        func.graph.add_edge(else_blk, join).unwrap();
        func.graph.add_edge(join, BlockId::END).unwrap();
        func.alloc_register(Type::Bool);

        func.graph.set_current(header);
        func.graph.emit(Instr::LoadBool { dest: Reg(0), index: 0 });
        func.graph.emit(Instr::Branch {
            cond: Reg(0),
            then_blk,
            else_blk,
        });
        func.graph.set_current(then_blk);
        func.graph.emit(Instr::Jump { target: join });
        func.graph.set_current(else_blk);
        func.graph.emit(Instr::Jump { target: join });
        func.graph.set_current(join);
        func.graph.emit(Instr::Ret { values: vec![] });

        let object = generate_function(&func).unwrap();
        // Layout: [loadbool, jmpif, jmp, jmp(then), jmp(else), ret]
        assert_eq!(object.code.len(), 6);

        // jmpif at word 1 (byte 4) targets then_blk at word 3 (byte 12)
        assert_eq!(opcode_byte(object.code[1]), Opcode::JmpIf.to_u8());
        assert_eq!(value16(object.code[1]) as i16, 8);
        // jmp at word 2 (byte 8) targets else_blk at word 4 (byte 16)
        assert_eq!(opcode_byte(object.code[2]), Opcode::Jmp.to_u8());
        assert_eq!(value16(object.code[2]) as i16, 8);
        // arm jumps land on the join block at word 5 (byte 20)
        assert_eq!(value16(object.code[3]) as i16, 8);
        assert_eq!(value16(object.code[4]) as i16, 4);
    }

    #[test]
    fn backward_jump_displacement_is_negative() {
        // Hand-built back edge: b3 jumps to b2's start
        let mut func = empty_func("main", 0);
        let first = func.graph.add_block();
        let second = func.graph.add_block();
        func.graph.add_edge(BlockId::START, first).unwrap();
        func.graph.add_edge(first, second).unwrap();
        func.graph.add_edge(second, first).unwrap();

        func.graph.set_current(first);
        func.graph.emit(Instr::Raw { op: Opcode::Nop });
        func.graph.emit(Instr::Jump { target: second });
        func.graph.set_current(second);
        func.graph.emit(Instr::Jump { target: first });

        let object = generate_function(&func).unwrap();
        // second's jmp at word 2 (byte 8) targets first at byte 0
        assert_eq!(value16(object.code[2]) as i16, -8);
    }

    #[test]
    fn call_emits_packed_tail() {
        let mut func = empty_func("main", 0);
        let body = func.graph.add_block();
        func.graph.add_edge(BlockId::START, body).unwrap();
        func.graph.set_current(body);
        for _ in 0..6 {
            func.alloc_register(Type::I32);
        }
        func.graph.emit(Instr::Call {
            func: 2,
            args: vec![Reg(1), Reg(2), Reg(3), Reg(4)],
            rets: vec![Reg(5)],
        });
        func.graph.emit(Instr::Ret { values: vec![] });
        func.graph.add_edge(body, BlockId::END).unwrap();

        let object = generate_function(&func).unwrap();
        // call header + 2 tail words (5 regs) + ret
        assert_eq!(object.code.len(), 4);
        assert_eq!(object.code[0], pack_three(Opcode::Call, 2, 4, 1));
        assert_eq!(object.code[1], 0x0102_0304);
        assert_eq!(object.code[2], 0x0500_0000);
    }

    #[test]
    fn module_carries_constants_and_globals() {
        let mut ir = IrModule::new("m", "m.ko");
        ir.globals = 2;
        ir.constants.insert(kore_bytecode::Constant::I32(7));
        let mut func = empty_func("main", 0);
        let body = func.graph.add_block();
        func.graph.add_edge(BlockId::START, body).unwrap();
        func.graph.set_current(body);
        func.graph.emit(Instr::Ret { values: vec![] });
        func.graph.add_edge(body, BlockId::END).unwrap();
        ir.functions.push(func);

        let module = generate(&ir, 0).unwrap();
        assert_eq!(module.globals, 2);
        assert_eq!(module.constants.len(), 1);
        assert!(module.object("main").is_some());
        assert!(module.entry().is_some());
    }
}