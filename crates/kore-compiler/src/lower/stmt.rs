//! Statement lowering

use super::{Lowerer, RegState};
use crate::ast::{IfArm, Stmt};
use crate::error::CompileResult;
use crate::ir::{BlockId, Instr};

impl Lowerer<'_> {
    pub(crate) fn lower_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Assign { name, value, loc: _ } => self.lower_assign(name, value),
            Stmt::Return { value, .. } => self.lower_return(value.as_ref()),
            Stmt::If {
                arms, else_body, ..
            } => self.lower_if(arms, else_body),
            Stmt::Expr(expr) => self.lower_expr_stmt(expr),
        }
    }

    fn lower_assign(&mut self, name: &str, value: &crate::ast::Expr) -> CompileResult<()> {
        self.lower_expr(value)?;
        let src = self.pop_result();

        let dest = match self.lookup(name) {
            Some(reg) => reg,
            None => match self.global_slot(name) {
                // Assignment to a module global from inside a function:
                // stage through a temporary, no local binding.
                Some(slot) if !self.in_entry => {
                    let dest = self.func_mut().alloc_register(value.ty.clone());
                    if dest != src {
                        self.emit(Instr::Move { dest, src });
                        self.consume(src);
                    }
                    self.emit(Instr::StoreGlobal { src: dest, slot });
                    self.set_state(dest, RegState::Available);
                    return Ok(());
                }
                _ => {
                    let reg = self.func_mut().alloc_register(value.ty.clone());
                    self.bind(name, reg);
                    reg
                }
            },
        };

        if dest != src {
            self.emit(Instr::Move { dest, src });
            self.consume(src);
        }
        // Rebinding revives a register whose previous value was moved out
        self.set_state(dest, RegState::Available);

        if self.in_entry {
            if let Some(slot) = self.global_slot(name) {
                if self.binding_is_module_level(name, dest) {
                    self.emit(Instr::StoreGlobal { src: dest, slot });
                }
            }
        }
        Ok(())
    }

    fn lower_return(&mut self, value: Option<&crate::ast::Expr>) -> CompileResult<()> {
        let values = match value {
            Some(expr) => {
                self.lower_expr(expr)?;
                let reg = self.pop_result();
                // Returned references are moved to the caller, not destroyed
                self.consume(reg);
                vec![reg]
            }
            None => vec![],
        };
        self.free_registers();
        self.emit(Instr::Ret { values });
        let current = self.func_mut().graph.current();
        self.func_mut().graph.add_edge(current, BlockId::END)
    }

    /// Lower an `if`/`else if`/`else` chain. Every arm's body jumps to a
    /// shared after-block, so no block relies on fallthrough; register
    /// ownership states are merged across all paths at the join.
    fn lower_if(&mut self, arms: &[IfArm], else_body: &[Stmt]) -> CompileResult<()> {
        let after = self.func_mut().graph.add_block();
        let base = self.snapshot_states();
        let mut paths = Vec::with_capacity(arms.len() + 1);

        for (i, arm) in arms.iter().enumerate() {
            self.lower_expr(&arm.cond)?;
            let cond = self.pop_result();

            let body_blk = self.func_mut().graph.add_block();
            let last = i + 1 == arms.len();
            let else_blk = if last && else_body.is_empty() {
                after
            } else {
                self.func_mut().graph.add_block()
            };

            let header = self.func_mut().graph.current();
            self.emit(Instr::Branch {
                cond,
                then_blk: body_blk,
                else_blk,
            });
            self.func_mut().graph.add_edge(header, body_blk)?;
            self.func_mut().graph.add_edge(header, else_blk)?;

            self.restore_states(&base);
            self.func_mut().graph.set_current(body_blk);
            self.lower_body(&arm.body, after)?;
            paths.push(self.snapshot_states());

            if else_blk != after {
                self.func_mut().graph.set_current(else_blk);
            } else {
                // Condition false falls to the join with states unchanged
                paths.push(base.clone());
            }
        }

        if !else_body.is_empty() {
            self.restore_states(&base);
            self.lower_body(else_body, after)?;
            paths.push(self.snapshot_states());
        }

        self.func_mut().graph.set_current(after);
        self.merge_states(paths);
        Ok(())
    }

    /// Lower one arm body in its own scope and route it to the join block
    fn lower_body(&mut self, body: &[Stmt], after: BlockId) -> CompileResult<()> {
        self.push_scope();
        for stmt in body {
            self.lower_stmt(stmt)?;
        }
        self.pop_scope();
        if !self.func_mut().graph.current_is_terminated() {
            self.emit(Instr::Jump { target: after });
            let current = self.func_mut().graph.current();
            self.func_mut().graph.add_edge(current, after)?;
        }
        Ok(())
    }

    fn lower_expr_stmt(&mut self, expr: &crate::ast::Expr) -> CompileResult<()> {
        self.lower_expr(expr)?;
        let reg = self.pop_result();
        // A discarded reference temporary would leak; named values stay live
        if !self.is_bound(reg)
            && self.func_ref().is_reference(reg)
            && self.state_of(reg) == RegState::Available
        {
            self.emit(Instr::Destroy { reg });
            self.set_state(reg, RegState::Moved);
        }
        Ok(())
    }
}
