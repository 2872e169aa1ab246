//! AST to IR lowering
//!
//! Builds one IR function per syntactic function, plus an implicit entry
//! function holding the module's top-level statements. Virtual registers
//! are allocated monotonically; nothing here knows about the physical
//! register file.
//!
//! Problems the pass can recover from (use of a moved value, an undefined
//! name) are recorded as diagnostics and lowering continues; only
//! structural failures abort.

mod expr;
mod stmt;

use crate::ast::{self, BinOp, NumericClass, SourceLoc};
use crate::diag::{Diagnostic, Diagnostics};
use crate::error::{CompileError, CompileResult};
use crate::ir::{BlockId, Function, Instr, IrModule, Reg};
use kore_bytecode::{builtin, ConstantTable, Opcode};
use rustc_hash::FxHashMap;

/// Ownership state of a register's value during lowering.
///
/// A reference value is consumed (moved) when it is rebound, passed to a
/// call or returned; reading it afterwards is a diagnostic, and cleanup
/// must not destroy it a second time. `MaybeMoved` covers values moved on
/// only some paths of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegState {
    Available,
    Moved,
    MaybeMoved,
}

/// Result of lowering: the IR plus accumulated diagnostics
#[derive(Debug)]
pub struct LowerOutput {
    pub ir: IrModule,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lower a type-checked module to IR
pub fn lower(module: &ast::Module) -> CompileResult<LowerOutput> {
    Lowerer::new(module).lower_module()
}

/// Pick the width-specific opcode for a binary operation. Returns `None`
/// for combinations the ISA has no instruction for (float modulo).
pub(crate) fn binop_opcode(class: NumericClass, op: BinOp) -> Option<Opcode> {
    use NumericClass::*;
    use Opcode::*;
    Some(match (class, op) {
        (I32, BinOp::Add) => AddI32,
        (I32, BinOp::Sub) => SubI32,
        (I32, BinOp::Mul) => MulI32,
        (I32, BinOp::Div) => DivI32,
        (I32, BinOp::Mod) => ModI32,
        (I32, BinOp::Lt) => LtI32,
        (I32, BinOp::Gt) => GtI32,
        (I32, BinOp::Le) => LeI32,
        (I32, BinOp::Ge) => GeI32,
        (I32, BinOp::Eq) => EqI32,
        (I32, BinOp::Ne) => NeI32,

        (I64, BinOp::Add) => AddI64,
        (I64, BinOp::Sub) => SubI64,
        (I64, BinOp::Mul) => MulI64,
        (I64, BinOp::Div) => DivI64,
        (I64, BinOp::Mod) => ModI64,
        (I64, BinOp::Lt) => LtI64,
        (I64, BinOp::Gt) => GtI64,
        (I64, BinOp::Le) => LeI64,
        (I64, BinOp::Ge) => GeI64,
        (I64, BinOp::Eq) => EqI64,
        (I64, BinOp::Ne) => NeI64,

        (F32, BinOp::Add) => AddF32,
        (F32, BinOp::Sub) => SubF32,
        (F32, BinOp::Mul) => MulF32,
        (F32, BinOp::Div) => DivF32,
        (F32, BinOp::Lt) => LtF32,
        (F32, BinOp::Gt) => GtF32,
        (F32, BinOp::Le) => LeF32,
        (F32, BinOp::Ge) => GeF32,
        (F32, BinOp::Eq) => EqF32,
        (F32, BinOp::Ne) => NeF32,

        (F64, BinOp::Add) => AddF64,
        (F64, BinOp::Sub) => SubF64,
        (F64, BinOp::Mul) => MulF64,
        (F64, BinOp::Div) => DivF64,
        (F64, BinOp::Lt) => LtF64,
        (F64, BinOp::Gt) => GtF64,
        (F64, BinOp::Le) => LeF64,
        (F64, BinOp::Ge) => GeF64,
        (F64, BinOp::Eq) => EqF64,
        (F64, BinOp::Ne) => NeF64,

        (F32, BinOp::Mod) | (F64, BinOp::Mod) => return None,
    })
}

/// Builtin function-index table consumed by call lowering
fn builtin_index(name: &str) -> Option<u16> {
    match name {
        "print" => Some(builtin::PRINT),
        "len" => Some(builtin::LEN),
        _ => None,
    }
}

pub struct Lowerer<'a> {
    ast: &'a ast::Module,
    constants: ConstantTable,
    /// Global variable name to slot
    globals: FxHashMap<String, u16>,
    global_count: u16,
    function_indices: FxHashMap<String, u16>,
    /// Function index counter, threaded through the context rather than
    /// kept in process-wide state
    next_function: u16,
    diagnostics: Diagnostics,

    // Per-function state
    func: Option<Function>,
    scopes: Vec<FxHashMap<String, Reg>>,
    reg_state: FxHashMap<Reg, RegState>,
    expr_stack: Vec<Reg>,
    in_entry: bool,
}

impl<'a> Lowerer<'a> {
    pub fn new(ast: &'a ast::Module) -> Self {
        Self {
            ast,
            constants: ConstantTable::new(),
            globals: FxHashMap::default(),
            global_count: 0,
            function_indices: FxHashMap::default(),
            next_function: 1,
            diagnostics: Diagnostics::new(),
            func: None,
            scopes: Vec::new(),
            reg_state: FxHashMap::default(),
            expr_stack: Vec::new(),
            in_entry: false,
        }
    }

    pub fn lower_module(mut self) -> CompileResult<LowerOutput> {
        // Pre-pass: function indices (entry is index 0 by convention) and
        // global slots for top-level bindings.
        for func in &self.ast.functions {
            let index = self.next_function;
            self.next_function += 1;
            self.function_indices.insert(func.name.clone(), index);
        }
        collect_globals(&self.ast.statements, &mut self.globals, &mut self.global_count);

        let mut ir = IrModule::new(self.ast.name.clone(), self.ast.path.clone());

        for (ast_index, func) in self.ast.functions.iter().enumerate() {
            let index = self.function_indices[&func.name];
            let lowered = self.lower_function(func, index, ast_index)?;
            ir.functions.push(lowered);
        }

        let entry = self.lower_entry()?;
        ir.functions.push(entry);

        ir.constants = self.constants;
        ir.globals = self.global_count as u32;
        Ok(LowerOutput {
            ir,
            diagnostics: self.diagnostics.into_vec(),
        })
    }

    fn lower_function(
        &mut self,
        func: &ast::Function,
        index: u16,
        ast_index: usize,
    ) -> CompileResult<Function> {
        self.begin_function(Function::new(index, &func.name, func.loc, Some(ast_index)))?;
        self.in_entry = false;

        for param in &func.params {
            let reg = self.func_mut().alloc_register(param.ty.clone());
            self.bind(&param.name, reg);
        }
        self.func_mut().arity = func.params.len() as u32;

        for stmt in &func.body {
            self.lower_stmt(stmt)?;
        }
        self.finish_function()
    }

    /// Lower the module's top-level statements into the implicit entry
    /// function. It has no source AST function and index 0.
    fn lower_entry(&mut self) -> CompileResult<Function> {
        self.begin_function(Function::new(0, "main", SourceLoc::default(), None))?;
        self.in_entry = true;

        let statements = &self.ast.statements;
        for stmt in statements {
            self.lower_stmt(stmt)?;
        }
        self.finish_function()
    }

    fn begin_function(&mut self, func: Function) -> CompileResult<()> {
        self.func = Some(func);
        self.scopes.clear();
        self.scopes.push(FxHashMap::default());
        self.reg_state.clear();
        self.expr_stack.clear();

        let graph = &mut self.func_mut().graph;
        let body = graph.add_block();
        graph.set_current(body);
        graph.add_edge(BlockId::START, body)
    }

    fn finish_function(&mut self) -> CompileResult<Function> {
        if !self.func_mut().graph.current_is_terminated() {
            self.free_registers();
            self.emit(Instr::Ret { values: vec![] });
            let current = self.func_mut().graph.current();
            self.func_mut().graph.add_edge(current, BlockId::END)?;
        }
        self.scopes.clear();
        Ok(self.func.take().expect("function in progress"))
    }

    // ===== Shared helpers =====

    pub(crate) fn func_mut(&mut self) -> &mut Function {
        self.func.as_mut().expect("no function in progress")
    }

    pub(crate) fn func_ref(&self) -> &Function {
        self.func.as_ref().expect("no function in progress")
    }

    pub(crate) fn emit(&mut self, instr: Instr) {
        self.func_mut().graph.emit(instr);
    }

    pub(crate) fn push_result(&mut self, reg: Reg) {
        self.expr_stack.push(reg);
    }

    pub(crate) fn pop_result(&mut self) -> Reg {
        self.expr_stack.pop().expect("expression result available")
    }

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub(crate) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Whether the name's current binding is the module-level one (and not
    /// a shadowing binding inside a branch body)
    pub(crate) fn binding_is_module_level(&self, name: &str, reg: Reg) -> bool {
        self.scopes
            .first()
            .and_then(|scope| scope.get(name))
            .is_some_and(|&r| r == reg)
    }

    /// Bind a name in the innermost scope
    pub(crate) fn bind(&mut self, name: &str, reg: Reg) {
        self.scopes
            .last_mut()
            .expect("scope stack non-empty")
            .insert(name.to_owned(), reg);
        self.reg_state.insert(reg, RegState::Available);
    }

    /// Innermost binding for a name
    pub(crate) fn lookup(&self, name: &str) -> Option<Reg> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    /// Whether any binding currently refers to this register
    pub(crate) fn is_bound(&self, reg: Reg) -> bool {
        self.scopes
            .iter()
            .any(|scope| scope.values().any(|&r| r == reg))
    }

    pub(crate) fn state_of(&self, reg: Reg) -> RegState {
        self.reg_state
            .get(&reg)
            .copied()
            .unwrap_or(RegState::Available)
    }

    pub(crate) fn set_state(&mut self, reg: Reg, state: RegState) {
        self.reg_state.insert(reg, state);
    }

    /// Mark a reference value as consumed. Value types are copied, never
    /// moved, so they stay available.
    pub(crate) fn consume(&mut self, reg: Reg) {
        if self.func_ref().is_reference(reg) {
            self.reg_state.insert(reg, RegState::Moved);
        }
    }

    pub(crate) fn diag_error(&mut self, loc: SourceLoc, message: impl Into<String>) {
        self.diagnostics.error(loc, message);
    }

    /// Intern a constant, diagnosing table overflow
    pub(crate) fn intern(&mut self, value: kore_bytecode::Constant) -> CompileResult<u16> {
        if self.constants.len() >= u16::MAX as usize {
            return Err(CompileError::TooManyConstants);
        }
        Ok(self.constants.insert(value))
    }

    pub(crate) fn function_index(&self, name: &str) -> Option<u16> {
        self.function_indices
            .get(name)
            .copied()
            .or_else(|| builtin_index(name))
    }

    pub(crate) fn global_slot(&self, name: &str) -> Option<u16> {
        self.globals.get(name).copied()
    }

    /// Emit cleanup before a return: walk bound registers from highest
    /// index to lowest and destroy every live reference value that was not
    /// moved out. `MaybeMoved` registers are skipped: destroying them
    /// could double-free on the path that already consumed the value.
    pub(crate) fn free_registers(&mut self) {
        let mut bound: Vec<Reg> = self
            .scopes
            .iter()
            .flat_map(|scope| scope.values().copied())
            .collect();
        bound.sort_unstable();
        bound.dedup();
        for reg in bound.into_iter().rev() {
            if self.func_ref().is_reference(reg) && self.state_of(reg) == RegState::Available {
                self.emit(Instr::Destroy { reg });
                self.reg_state.insert(reg, RegState::Moved);
            }
        }
    }

    // ===== Branch-state bookkeeping =====

    pub(crate) fn snapshot_states(&self) -> FxHashMap<Reg, RegState> {
        self.reg_state.clone()
    }

    pub(crate) fn restore_states(&mut self, snapshot: &FxHashMap<Reg, RegState>) {
        self.reg_state = snapshot.clone();
    }

    /// Join the register states of all paths through a branch: moved on
    /// every path stays `Moved`, moved on some paths becomes `MaybeMoved`.
    pub(crate) fn merge_states(&mut self, paths: Vec<FxHashMap<Reg, RegState>>) {
        let mut regs: Vec<Reg> = paths
            .iter()
            .flat_map(|p| p.keys().copied())
            .collect();
        regs.sort_unstable();
        regs.dedup();

        let mut merged = FxHashMap::default();
        for reg in regs {
            let mut moved = 0usize;
            let mut maybe = false;
            for path in &paths {
                match path.get(&reg).copied().unwrap_or(RegState::Available) {
                    RegState::Moved => moved += 1,
                    RegState::MaybeMoved => maybe = true,
                    RegState::Available => {}
                }
            }
            let state = if moved == paths.len() {
                RegState::Moved
            } else if moved > 0 || maybe {
                RegState::MaybeMoved
            } else {
                RegState::Available
            };
            merged.insert(reg, state);
        }
        self.reg_state = merged;
    }
}

fn collect_globals(
    statements: &[ast::Stmt],
    globals: &mut FxHashMap<String, u16>,
    count: &mut u16,
) {
    for stmt in statements {
        if let ast::Stmt::Assign { name, .. } = stmt {
            if !globals.contains_key(name) {
                globals.insert(name.clone(), *count);
                *count += 1;
            }
        }
    }
}
