//! Compiler backend for the kore language.
//!
//! Consumes the type-checked AST the front end produces and turns it into
//! a loadable bytecode module in four passes:
//!
//! 1. lowering - AST to a graph IR of basic blocks over virtual registers
//! 2. liveness - backward dataflow producing one live range per register
//! 3. allocation - linear scan mapping virtual registers onto a small file
//! 4. generation - block layout, word encoding and jump patching
//!
//! The passes are exposed individually for tooling; [`Compiler`] drives
//! them end to end.

pub mod ast;
pub mod codegen;
pub mod diag;
pub mod error;
pub mod ir;
pub mod liveness;
pub mod lower;
pub mod regalloc;

pub use diag::{Diagnostic, DiagnosticKind, Diagnostics};
pub use error::{CompileError, CompileResult};

use kore_bytecode::Module;

/// Drives the pass pipeline and assigns module indices
#[derive(Debug, Default)]
pub struct Compiler {
    next_module_index: u32,
    diagnostics: Vec<Diagnostic>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile one type-checked module to loadable bytecode.
    ///
    /// Recoverable source problems are collected into [`diagnostics`]
    /// rather than failing the call; callers must check for errors there
    /// before treating the returned module as runnable.
    ///
    /// [`diagnostics`]: Self::diagnostics
    pub fn compile(&mut self, ast: &ast::Module) -> CompileResult<Module> {
        let lowered = lower::lower(ast)?;
        self.diagnostics.extend(lowered.diagnostics);

        let mut ir = lowered.ir;
        for func in &mut ir.functions {
            let ranges = liveness::live_ranges(func);
            regalloc::allocate(func, &ranges)?;
        }

        let index = self.next_module_index;
        self.next_module_index += 1;
        codegen::generate(&ir, index)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::Error)
    }
}
