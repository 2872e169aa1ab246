//! Control-flow graph
//!
//! Owns all basic blocks of one function by value, in an arena indexed by
//! block id. Edges are explicit and added separately from block creation;
//! all block-to-block relationships are id lookups into the owning graph,
//! never pointers.

use super::block::{BasicBlock, BlockId};
use super::instr::Instr;
use crate::error::{CompileError, CompileResult};

#[derive(Debug, Clone)]
pub struct Graph {
    blocks: Vec<BasicBlock>,
    successors: Vec<Vec<BlockId>>,
    predecessors: Vec<Vec<BlockId>>,
    /// Construction cursor: the block new instructions go to
    current: BlockId,
}

impl Graph {
    /// Create a graph holding only the synthetic start and end blocks
    pub fn new() -> Self {
        let mut graph = Self {
            blocks: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
            current: BlockId::START,
        };
        let start = graph.add_block();
        let end = graph.add_block();
        debug_assert_eq!(start, BlockId::START);
        debug_assert_eq!(end, BlockId::END);
        graph
    }

    /// Allocate the next block id and its (empty) block
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id));
        self.successors.push(Vec::new());
        self.predecessors.push(Vec::new());
        id
    }

    /// Add a control-flow edge. Both endpoints must already exist.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) -> CompileResult<()> {
        if from.index() >= self.blocks.len() {
            return Err(CompileError::UnknownBlock(from.0));
        }
        if to.index() >= self.blocks.len() {
            return Err(CompileError::UnknownBlock(to.0));
        }
        if !self.successors[from.index()].contains(&to) {
            self.successors[from.index()].push(to);
            self.predecessors[to.index()].push(from);
        }
        Ok(())
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index())
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id.index())
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [BasicBlock] {
        &mut self.blocks
    }

    pub fn successors(&self, id: BlockId) -> &[BlockId] {
        self.successors
            .get(id.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn predecessors(&self, id: BlockId) -> &[BlockId] {
        self.predecessors
            .get(id.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Move the construction cursor
    pub fn set_current(&mut self, id: BlockId) {
        debug_assert!(id.index() < self.blocks.len());
        self.current = id;
    }

    pub fn current(&self) -> BlockId {
        self.current
    }

    /// Append an instruction to the current block
    pub fn emit(&mut self, instr: Instr) {
        let current = self.current;
        self.blocks[current.index()].push(instr);
    }

    /// Whether the current block already ends in a terminator
    pub fn current_is_terminated(&self) -> bool {
        self.blocks[self.current.index()].is_terminated()
    }

    /// Blocks in breadth-first order from the synthetic start block.
    ///
    /// This is the layout the bytecode generator emits and the order the
    /// liveness analysis numbers instruction positions in; blocks the
    /// traversal cannot reach are not included.
    pub fn layout_order(&self) -> Vec<BlockId> {
        let mut order = Vec::with_capacity(self.blocks.len());
        let mut seen = vec![false; self.blocks.len()];
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(BlockId::START);
        seen[BlockId::START.index()] = true;
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for &succ in self.successors(id) {
                if !seen[succ.index()] {
                    seen[succ.index()] = true;
                    queue.push_back(succ);
                }
            }
        }
        order
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
