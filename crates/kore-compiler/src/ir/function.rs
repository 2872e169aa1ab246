//! IR functions and modules

use super::graph::Graph;
use super::instr::Reg;
use crate::ast::{SourceLoc, Type};
use kore_bytecode::ConstantTable;
use rustc_hash::FxHashMap;

/// One function's IR: its graph plus register bookkeeping
#[derive(Debug)]
pub struct Function {
    /// Function index used by call instructions
    pub index: u16,
    pub name: String,
    pub loc: SourceLoc,
    /// Index of the source AST function; `None` for the implicit
    /// module-entry function
    pub source: Option<usize>,
    /// Number of parameters, bound to the lowest register ids
    pub arity: u32,
    pub graph: Graph,
    /// Monotonic virtual register counter
    next_register: u32,
    /// High-water mark of registers in use. Before allocation this counts
    /// virtual registers; the allocator rewrites it to the final pool
    /// high-water mark.
    pub max_registers: u32,
    /// Static type per register, used to decide which registers hold
    /// reference values that need destruction
    register_types: FxHashMap<Reg, Type>,
}

impl Function {
    pub fn new(index: u16, name: impl Into<String>, loc: SourceLoc, source: Option<usize>) -> Self {
        Self {
            index,
            name: name.into(),
            loc,
            source,
            arity: 0,
            graph: Graph::new(),
            next_register: 0,
            max_registers: 0,
            register_types: FxHashMap::default(),
        }
    }

    /// Allocate a fresh virtual register of the given static type
    pub fn alloc_register(&mut self, ty: Type) -> Reg {
        let reg = Reg(self.next_register);
        self.next_register += 1;
        self.max_registers = self.max_registers.max(self.next_register);
        self.register_types.insert(reg, ty);
        reg
    }

    /// Total virtual registers ever allocated
    pub fn register_count(&self) -> u32 {
        self.next_register
    }

    pub fn register_type(&self, reg: Reg) -> Option<&Type> {
        self.register_types.get(&reg)
    }

    /// Whether the register's static type needs destruction
    pub fn is_reference(&self, reg: Reg) -> bool {
        self.register_type(reg).is_some_and(Type::is_reference)
    }
}

/// Lowered form of one source module, input to allocation and generation
#[derive(Debug, Default)]
pub struct IrModule {
    pub name: String,
    pub path: String,
    pub functions: Vec<Function>,
    pub constants: ConstantTable,
    /// Number of global-variable slots the module needs
    pub globals: u32,
}

impl IrModule {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ..Self::default()
        }
    }
}
