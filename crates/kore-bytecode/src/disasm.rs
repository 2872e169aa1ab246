//! Decode-to-text for compiled modules
//!
//! Used by the disassembler tool and by tests that want a readable view of
//! generated code.

use crate::module::Module;
use crate::opcode::{Opcode, OperandForm};
use crate::word;
use std::fmt::Write;

/// Render a whole module as text
pub fn disassemble(module: &Module) -> String {
    let mut out = String::new();
    writeln!(out, "; module {} ({})", module.index, module.path).unwrap();
    writeln!(out, "; globals: {}", module.globals).unwrap();

    if !module.constants.is_empty() {
        writeln!(out, "; constants:").unwrap();
        for (i, c) in module.constants.iter().enumerate() {
            writeln!(out, ";   #{:<4} {}", i, c).unwrap();
        }
    }

    for object in module.objects() {
        writeln!(out).unwrap();
        writeln!(
            out,
            "fn {} (index {}, regs {}) {{",
            object.name, object.index, object.max_registers
        )
        .unwrap();
        out.push_str(&disassemble_code(&object.code));
        writeln!(out, "}}").unwrap();
    }
    out
}

/// Render one instruction stream, one line per instruction, prefixed with
/// the byte offset of each word.
pub fn disassemble_code(code: &[u32]) -> String {
    let mut out = String::new();
    let mut i = 0;
    while i < code.len() {
        let w = code[i];
        let offset = i * 4;
        let byte = word::opcode_byte(w);
        let Some(op) = Opcode::from_u8(byte) else {
            writeln!(out, "  {:04x}  .word {:#010x}", offset, w).unwrap();
            i += 1;
            continue;
        };
        i += 1;

        match op.form() {
            OperandForm::None => writeln!(out, "  {:04x}  {}", offset, op).unwrap(),
            OperandForm::OneReg => {
                writeln!(out, "  {:04x}  {} r{}", offset, op, word::reg_a(w)).unwrap()
            }
            OperandForm::TwoReg => writeln!(
                out,
                "  {:04x}  {} r{}, r{}",
                offset,
                op,
                word::reg_a(w),
                word::reg_b(w)
            )
            .unwrap(),
            OperandForm::ThreeReg => writeln!(
                out,
                "  {:04x}  {} r{}, r{}, r{}",
                offset,
                op,
                word::reg_a(w),
                word::reg_b(w),
                word::reg_c(w)
            )
            .unwrap(),
            OperandForm::RegValue => writeln!(
                out,
                "  {:04x}  {} r{}, {}",
                offset,
                op,
                word::reg_a(w),
                word::value16(w) as i16
            )
            .unwrap(),
            OperandForm::Value => {
                writeln!(out, "  {:04x}  {} {}", offset, op, word::value16(w) as i16).unwrap()
            }
            OperandForm::Call => {
                let func = word::reg_a(w);
                let args = word::reg_b(w) as usize;
                let rets = word::reg_c(w) as usize;
                let tail = word::packed_words(args + rets);
                // Loader-validated code always has the full tail; raw word
                // slices may not, so render whatever registers are present.
                let tail_words = code.get(i..i + tail).unwrap_or(&code[i..]);
                let regs = read_packed(tail_words, args + rets);
                let (arg_regs, ret_regs) = regs.split_at(args.min(regs.len()));
                writeln!(
                    out,
                    "  {:04x}  {} fn{} ({}) -> ({})",
                    offset,
                    op,
                    func,
                    fmt_regs(arg_regs),
                    fmt_regs(ret_regs)
                )
                .unwrap();
                i = code.len().min(i + tail);
            }
            OperandForm::Ret => {
                let rets = word::reg_a(w) as usize;
                let tail = word::packed_words(rets);
                let tail_words = code.get(i..i + tail).unwrap_or(&code[i..]);
                let regs = read_packed(tail_words, rets);
                writeln!(out, "  {:04x}  {} ({})", offset, op, fmt_regs(&regs)).unwrap();
                i = code.len().min(i + tail);
            }
        }
    }
    out
}

fn read_packed(words: &[u32], count: usize) -> Vec<u8> {
    let mut cursor = word::RegCursor::new(words);
    (0..count).filter_map(|_| cursor.next()).collect()
}

fn fmt_regs(regs: &[u8]) -> String {
    regs.iter()
        .map(|r| format!("r{}", r))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::word::{pack_op, pack_reg_value, pack_three, pack_value};

    #[test]
    fn renders_fixed_forms() {
        let code = vec![
            pack_reg_value(Opcode::LoadI32, 0, 1),
            pack_three(Opcode::AddI32, 2, 0, 1),
            pack_op(Opcode::Halt),
        ];
        let text = disassemble_code(&code);
        assert!(text.contains("0000  load.i32 r0, 1"));
        assert!(text.contains("0004  add.i32 r2, r0, r1"));
        assert!(text.contains("0008  halt"));
    }

    #[test]
    fn renders_call_with_packed_tail() {
        let mut packer = word::RegPacker::new();
        for r in [3u8, 4, 5] {
            packer.push(r);
        }
        let mut code = vec![pack_three(Opcode::Call, 1, 2, 1)];
        code.extend(packer.into_words());
        let text = disassemble_code(&code);
        assert!(text.contains("call fn1 (r3, r4) -> (r5)"), "{}", text);
    }

    #[test]
    fn truncated_call_tail_renders_without_panicking() {
        // header claims 4 args (one tail word) but the stream ends there
        let code = vec![pack_three(Opcode::Call, 1, 4, 0)];
        let text = disassemble_code(&code);
        assert!(text.contains("call fn1"), "{}", text);
    }

    #[test]
    fn negative_jump_offsets_are_signed() {
        let code = vec![pack_value(Opcode::Jmp, (-8i16) as u16)];
        let text = disassemble_code(&code);
        assert!(text.contains("jmp -8"), "{}", text);
    }
}
