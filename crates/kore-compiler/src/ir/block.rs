//! Basic blocks

use super::instr::Instr;

/// Basic block identifier. Two ids are reserved for the synthetic start and
/// end blocks; ordinary blocks are allocated sequentially after them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    /// Synthetic entry block, always empty
    pub const START: BlockId = BlockId(0);
    /// Synthetic exit block, always empty
    pub const END: BlockId = BlockId(1);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_synthetic(self) -> bool {
        self == Self::START || self == Self::END
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// An ordered run of instructions, owned by the graph that created it
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instrs: Vec<Instr>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            instrs: Vec::new(),
        }
    }

    pub fn push(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    /// A block is terminated once it ends in a branch, jump or return
    pub fn is_terminated(&self) -> bool {
        self.instrs.last().is_some_and(Instr::is_terminator)
    }
}
