//! Pretty-printing for IR
//!
//! Human-readable dumps for debugging lowered code before and after
//! register allocation.

use super::function::{Function, IrModule};
use super::instr::{Instr, Reg};
use std::fmt::Write;

pub trait PrettyPrint {
    fn pretty_print(&self) -> String;
}

impl PrettyPrint for IrModule {
    fn pretty_print(&self) -> String {
        let mut out = String::new();
        writeln!(out, "; module {} ({})", self.name, self.path).unwrap();
        writeln!(out, "; globals: {}", self.globals).unwrap();
        if !self.constants.is_empty() {
            writeln!(out, "; constants:").unwrap();
            for (i, c) in self.constants.iter().enumerate() {
                writeln!(out, ";   #{} {}", i, c).unwrap();
            }
        }
        for func in &self.functions {
            writeln!(out).unwrap();
            out.push_str(&func.pretty_print());
        }
        out
    }
}

impl PrettyPrint for Function {
    fn pretty_print(&self) -> String {
        let mut out = String::new();
        writeln!(
            out,
            "fn {} (index {}, arity {}, regs {}) {{",
            self.name, self.index, self.arity, self.max_registers
        )
        .unwrap();
        for id in self.graph.layout_order() {
            let block = self.graph.block(id).expect("layout id exists");
            if block.id.is_synthetic() && block.instrs.is_empty() {
                continue;
            }
            let succs: Vec<String> = self
                .graph
                .successors(id)
                .iter()
                .map(|s| s.to_string())
                .collect();
            writeln!(out, "{}:  ; -> {}", id, succs.join(", ")).unwrap();
            for instr in &block.instrs {
                writeln!(out, "    {}", instr.pretty_print()).unwrap();
            }
        }
        writeln!(out, "}}").unwrap();
        out
    }
}

impl PrettyPrint for Instr {
    fn pretty_print(&self) -> String {
        match self {
            Instr::LoadBool { dest, index } => format!("load.bool {}, #{}", dest, index),
            Instr::LoadI32 { dest, index } => format!("load.i32 {}, #{}", dest, index),
            Instr::LoadI64 { dest, index } => format!("load.i64 {}, #{}", dest, index),
            Instr::LoadF32 { dest, index } => format!("load.f32 {}, #{}", dest, index),
            Instr::LoadF64 { dest, index } => format!("load.f64 {}, #{}", dest, index),
            Instr::LoadGlobal { dest, slot } => format!("gload {}, g{}", dest, slot),
            Instr::StoreGlobal { src, slot } => format!("gstore g{}, {}", slot, src),
            Instr::Move { dest, src } => format!("move {}, {}", dest, src),
            Instr::Binop { op, dest, lhs, rhs } => {
                format!("{} {}, {}, {}", op, dest, lhs, rhs)
            }
            Instr::Branch {
                cond,
                then_blk,
                else_blk,
            } => format!("branch {}, {}, {}", cond, then_blk, else_blk),
            Instr::Jump { target } => format!("jump {}", target),
            Instr::AllocArray { dest, len } => format!("newarr {}, {}", dest, len),
            Instr::Call { func, args, rets } => {
                let args: Vec<String> = args.iter().map(Reg::to_string).collect();
                let rets: Vec<String> = rets.iter().map(Reg::to_string).collect();
                format!("call fn{} ({}) -> ({})", func, args.join(", "), rets.join(", "))
            }
            Instr::Ret { values } => {
                let values: Vec<String> = values.iter().map(Reg::to_string).collect();
                format!("ret ({})", values.join(", "))
            }
            Instr::Destroy { reg } => format!("destroy {}", reg),
            Instr::Raw { op } => op.to_string(),
        }
    }
}
