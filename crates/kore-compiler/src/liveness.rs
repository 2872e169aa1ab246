//! Backward-dataflow liveness analysis
//!
//! Computes, per virtual register, the half-open span of instruction
//! positions over which its value may still be read. Positions are indices
//! into the function linearized in graph layout order, so the intervals
//! line up with the order the bytecode generator will emit.
//!
//! The analysis is the classic backward fixpoint:
//!   live_out(b) = union of live_in(s) for each successor s
//!   live_in(b)  = use(b) | (live_out(b) - def(b))
//! iterated until no set changes, then converted to one contiguous
//! interval per register.

use crate::ir::{BlockId, Function, Reg};

/// Lifetime of one virtual register in linearized instruction positions.
/// `start` is the position of the first def; `end` the last position at
/// which the value may still be live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveRange {
    pub reg: Reg,
    pub start: u32,
    pub end: u32,
}

impl LiveRange {
    /// A register defined but never read dies at its definition
    pub fn is_dead(&self) -> bool {
        self.end == self.start
    }
}

/// Dense bit set over virtual register ids
#[derive(Debug, Clone, PartialEq, Eq)]
struct RegSet {
    bits: Vec<u64>,
}

impl RegSet {
    fn new(len: usize) -> Self {
        Self {
            bits: vec![0; len.div_ceil(64)],
        }
    }

    fn insert(&mut self, reg: Reg) {
        let i = reg.0 as usize;
        self.bits[i / 64] |= 1 << (i % 64);
    }

    fn remove(&mut self, reg: Reg) {
        let i = reg.0 as usize;
        self.bits[i / 64] &= !(1 << (i % 64));
    }

    fn contains(&self, reg: Reg) -> bool {
        let i = reg.0 as usize;
        self.bits[i / 64] & (1 << (i % 64)) != 0
    }

    /// `self |= other`, reporting whether anything changed
    fn union_with(&mut self, other: &RegSet) -> bool {
        let mut changed = false;
        for (word, &other_word) in self.bits.iter_mut().zip(&other.bits) {
            let merged = *word | other_word;
            changed |= merged != *word;
            *word = merged;
        }
        changed
    }

    fn iter(&self) -> impl Iterator<Item = Reg> + '_ {
        self.bits.iter().enumerate().flat_map(|(wi, &word)| {
            (0..64)
                .filter(move |bit| word & (1 << bit) != 0)
                .map(move |bit| Reg((wi * 64 + bit) as u32))
        })
    }
}

/// Compute live ranges for every register of the function, sorted by
/// ascending start position (ties broken by register id, which keeps
/// parameter registers first).
pub fn live_ranges(func: &Function) -> Vec<LiveRange> {
    let reg_count = func.register_count() as usize;
    let layout = func.graph.layout_order();
    let block_count = func.graph.blocks().len();

    // Linearized start position of each block, in layout order
    let mut block_start = vec![0u32; block_count];
    let mut position = 0u32;
    for &id in &layout {
        block_start[id.index()] = position;
        position += block_len(func, id);
    }

    // Per-block use/def sets. A register is in `uses` if some instruction
    // reads it before the block defines it.
    let mut uses = vec![RegSet::new(reg_count); block_count];
    let mut defs = vec![RegSet::new(reg_count); block_count];
    let mut scratch_defs = Vec::new();
    let mut scratch_uses = Vec::new();
    for &id in &layout {
        let block = match func.graph.block(id) {
            Some(b) => b,
            None => continue,
        };
        for instr in &block.instrs {
            scratch_uses.clear();
            instr.uses(&mut scratch_uses);
            for &reg in &scratch_uses {
                if !defs[id.index()].contains(reg) {
                    uses[id.index()].insert(reg);
                }
            }
            scratch_defs.clear();
            instr.defs(&mut scratch_defs);
            for &reg in &scratch_defs {
                defs[id.index()].insert(reg);
            }
        }
    }

    // Backward fixpoint over live_in/live_out
    let mut live_in = vec![RegSet::new(reg_count); block_count];
    let mut live_out = vec![RegSet::new(reg_count); block_count];
    let mut changed = true;
    while changed {
        changed = false;
        for &id in layout.iter().rev() {
            for &succ in func.graph.successors(id) {
                let succ_in = live_in[succ.index()].clone();
                changed |= live_out[id.index()].union_with(&succ_in);
            }
            let mut new_in = live_out[id.index()].clone();
            for reg in defs[id.index()].iter() {
                new_in.remove(reg);
            }
            new_in.union_with(&uses[id.index()]);
            if new_in != live_in[id.index()] {
                live_in[id.index()] = new_in;
                changed = true;
            }
        }
    }

    ranges_from_sets(func, &layout, &block_start, &live_out)
}

fn block_len(func: &Function, id: BlockId) -> u32 {
    func.graph.block(id).map_or(0, |b| b.instrs.len() as u32)
}

fn ranges_from_sets(
    func: &Function,
    layout: &[BlockId],
    block_start: &[u32],
    live_out: &[RegSet],
) -> Vec<LiveRange> {
    let reg_count = func.register_count() as usize;
    let mut start = vec![u32::MAX; reg_count];
    let mut end = vec![0u32; reg_count];

    // Parameters are defined on entry, before any instruction runs
    for p in 0..func.arity {
        start[p as usize] = 0;
    }

    let mut scratch = Vec::new();
    for &id in layout {
        let block = match func.graph.block(id) {
            Some(b) => b,
            None => continue,
        };
        let base = block_start[id.index()];
        for (offset, instr) in block.instrs.iter().enumerate() {
            let pos = base + offset as u32;
            scratch.clear();
            instr.defs(&mut scratch);
            for &reg in &scratch {
                let slot = reg.0 as usize;
                start[slot] = start[slot].min(pos);
                end[slot] = end[slot].max(pos);
            }
            scratch.clear();
            instr.uses(&mut scratch);
            for &reg in &scratch {
                let slot = reg.0 as usize;
                start[slot] = start[slot].min(pos);
                end[slot] = end[slot].max(pos);
            }
        }
        // A register live out of the block survives to the block's last
        // position regardless of where it was last mentioned inside it.
        if !block.instrs.is_empty() {
            let last = base + block.instrs.len() as u32 - 1;
            for reg in live_out[id.index()].iter() {
                let slot = reg.0 as usize;
                if start[slot] != u32::MAX {
                    end[slot] = end[slot].max(last);
                }
            }
        }
    }

    let mut ranges: Vec<LiveRange> = (0..reg_count)
        .filter(|&i| start[i] != u32::MAX)
        .map(|i| LiveRange {
            reg: Reg(i as u32),
            start: start[i],
            end: end[i].max(start[i]),
        })
        .collect();
    ranges.sort_by_key(|r| (r.start, r.reg));
    ranges
}
