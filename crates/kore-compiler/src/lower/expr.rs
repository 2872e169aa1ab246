//! Expression lowering
//!
//! Each expression leaves exactly one result register on the lowerer's
//! expression stack. On a diagnosed error a fresh register of the
//! expression's type is pushed so lowering can continue.

use super::{binop_opcode, Lowerer, RegState};
use crate::ast::{Expr, ExprKind, Type};
use crate::error::CompileResult;
use crate::ir::Instr;
use kore_bytecode::Constant;

impl Lowerer<'_> {
    pub(crate) fn lower_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::Bool(v) => self.lower_literal(expr, Constant::Bool(*v)),
            ExprKind::I32(v) => self.lower_literal(expr, Constant::I32(*v)),
            ExprKind::I64(v) => self.lower_literal(expr, Constant::I64(*v)),
            ExprKind::F32(v) => self.lower_literal(expr, Constant::F32(*v)),
            ExprKind::F64(v) => self.lower_literal(expr, Constant::F64(*v)),
            ExprKind::Var(name) => self.lower_var(expr, name),
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(expr, *op, lhs, rhs),
            ExprKind::Call { callee, args } => self.lower_call(expr, callee, args),
            ExprKind::ArrayAlloc { len } => self.lower_array_alloc(expr, len),
        }
    }

    fn lower_literal(&mut self, expr: &Expr, value: Constant) -> CompileResult<()> {
        let index = self.intern(value)?;
        let dest = self.func_mut().alloc_register(expr.ty.clone());
        let instr = match value {
            Constant::Bool(_) => Instr::LoadBool { dest, index },
            Constant::I32(_) => Instr::LoadI32 { dest, index },
            Constant::I64(_) => Instr::LoadI64 { dest, index },
            Constant::F32(_) => Instr::LoadF32 { dest, index },
            Constant::F64(_) => Instr::LoadF64 { dest, index },
        };
        self.emit(instr);
        self.push_result(dest);
        Ok(())
    }

    fn lower_var(&mut self, expr: &Expr, name: &str) -> CompileResult<()> {
        if let Some(reg) = self.lookup(name) {
            match self.state_of(reg) {
                RegState::Available => {}
                RegState::Moved => {
                    self.diag_error(expr.loc, format!("use of moved value `{}`", name));
                }
                RegState::MaybeMoved => {
                    self.diag_error(
                        expr.loc,
                        format!("value `{}` may have been moved on a prior branch", name),
                    );
                }
            }
            self.push_result(reg);
            return Ok(());
        }

        if let Some(slot) = self.global_slot(name) {
            let dest = self.func_mut().alloc_register(expr.ty.clone());
            self.emit(Instr::LoadGlobal { dest, slot });
            self.push_result(dest);
            return Ok(());
        }

        self.diag_error(expr.loc, format!("undefined variable `{}`", name));
        let dest = self.func_mut().alloc_register(expr.ty.clone());
        self.push_result(dest);
        Ok(())
    }

    fn lower_binary(
        &mut self,
        expr: &Expr,
        op: crate::ast::BinOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> CompileResult<()> {
        self.lower_expr(lhs)?;
        self.lower_expr(rhs)?;
        let rhs_reg = self.pop_result();
        let lhs_reg = self.pop_result();

        let Some(class) = lhs.ty.numeric_class() else {
            self.diag_error(
                expr.loc,
                format!("operator not defined for operands of type {}", lhs.ty),
            );
            self.push_result(lhs_reg);
            return Ok(());
        };
        let Some(opcode) = binop_opcode(class, op) else {
            self.diag_error(
                expr.loc,
                format!("operator not defined for operands of type {}", lhs.ty),
            );
            self.push_result(lhs_reg);
            return Ok(());
        };

        let dest = self.func_mut().alloc_register(expr.ty.clone());
        self.emit(Instr::Binop {
            op: opcode,
            dest,
            lhs: lhs_reg,
            rhs: rhs_reg,
        });
        self.push_result(dest);
        Ok(())
    }

    fn lower_call(&mut self, expr: &Expr, callee: &str, args: &[Expr]) -> CompileResult<()> {
        let mut arg_regs = Vec::with_capacity(args.len());
        for arg in args {
            self.lower_expr(arg)?;
            arg_regs.push(self.pop_result());
        }

        let Some(func) = self.function_index(callee) else {
            self.diag_error(expr.loc, format!("undefined function `{}`", callee));
            let dest = self.func_mut().alloc_register(expr.ty.clone());
            self.push_result(dest);
            return Ok(());
        };

        // Reference arguments are moved into the callee
        for &reg in &arg_regs {
            self.consume(reg);
        }

        let dest = self.func_mut().alloc_register(expr.ty.clone());
        let rets = if expr.ty == Type::Unit {
            vec![]
        } else {
            vec![dest]
        };
        self.emit(Instr::Call {
            func,
            args: arg_regs,
            rets,
        });
        self.push_result(dest);
        Ok(())
    }

    fn lower_array_alloc(&mut self, expr: &Expr, len: &Expr) -> CompileResult<()> {
        self.lower_expr(len)?;
        let len_reg = self.pop_result();
        let dest = self.func_mut().alloc_register(expr.ty.clone());
        self.emit(Instr::AllocArray { dest, len: len_reg });
        self.push_result(dest);
        Ok(())
    }
}
