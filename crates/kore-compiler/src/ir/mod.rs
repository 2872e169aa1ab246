//! Graph-structured intermediate representation
//!
//! Basic blocks with explicit control-flow edges, one graph per function.

mod block;
mod function;
mod graph;
mod instr;
pub mod pretty;

pub use block::{BasicBlock, BlockId};
pub use function::{Function, IrModule};
pub use graph::Graph;
pub use instr::{Instr, Reg};
