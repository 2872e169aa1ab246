//! Instruction word packing
//!
//! One instruction is one 32-bit word: the opcode occupies bits 31-24 and
//! the remaining 24 bits are interpreted per opcode. Register fields are 8
//! bits wide and packed downward from bit 23; a 16-bit value field occupies
//! the low half of the word. `Call` and `Ret` are variable length: the header
//! word is followed by words packing four registers each, most significant
//! byte first.

use crate::opcode::Opcode;

/// Pack an opcode with no operands
pub fn pack_op(op: Opcode) -> u32 {
    (op.to_u8() as u32) << 24
}

/// Pack a one-register form (register in bits 23-16)
pub fn pack_reg(op: Opcode, a: u8) -> u32 {
    pack_op(op) | ((a as u32) << 16)
}

/// Pack a register + 16-bit value form
pub fn pack_reg_value(op: Opcode, a: u8, value: u16) -> u32 {
    pack_reg(op, a) | value as u32
}

/// Pack a 16-bit value form (no register)
pub fn pack_value(op: Opcode, value: u16) -> u32 {
    pack_op(op) | value as u32
}

/// Pack a two-register form
pub fn pack_two(op: Opcode, a: u8, b: u8) -> u32 {
    pack_reg(op, a) | ((b as u32) << 8)
}

/// Pack a three-register form
pub fn pack_three(op: Opcode, a: u8, b: u8, c: u8) -> u32 {
    pack_two(op, a, b) | c as u32
}

/// Extract the opcode byte (bits 31-24)
pub fn opcode_byte(word: u32) -> u8 {
    (word >> 24) as u8
}

/// Extract the first register field (bits 23-16)
pub fn reg_a(word: u32) -> u8 {
    (word >> 16) as u8
}

/// Extract the second register field (bits 15-8)
pub fn reg_b(word: u32) -> u8 {
    (word >> 8) as u8
}

/// Extract the third register field (bits 7-0)
pub fn reg_c(word: u32) -> u8 {
    word as u8
}

/// Extract the 16-bit value field (bits 15-0)
pub fn value16(word: u32) -> u16 {
    word as u16
}

/// Replace the 16-bit value field of a word, leaving the rest untouched
pub fn patch_value16(word: u32, value: u16) -> u32 {
    (word & 0xFFFF_0000) | value as u32
}

/// Number of tail words needed to pack `count` registers, four to a word
pub fn packed_words(count: usize) -> usize {
    count.div_ceil(4)
}

/// Packs registers four to a word for `Call`/`Ret` tails.
///
/// The first register lands in the most significant byte of the first word;
/// unused trailing bytes are zero.
#[derive(Debug, Default)]
pub struct RegPacker {
    words: Vec<u32>,
    shift: u32,
}

impl RegPacker {
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            shift: 0,
        }
    }

    /// Append one register to the tail
    pub fn push(&mut self, reg: u8) {
        if self.shift == 0 {
            self.words.push((reg as u32) << 24);
            self.shift = 24;
        } else {
            self.shift -= 8;
            let last = self.words.last_mut().expect("non-empty after first push");
            *last |= (reg as u32) << self.shift;
        }
    }

    pub fn into_words(self) -> Vec<u32> {
        self.words
    }
}

/// Reads registers back out of a packed tail.
///
/// The shift counter mirrors the one kept in a VM call frame while the
/// packed tail of a call or return instruction is decoded.
#[derive(Debug)]
pub struct RegCursor<'a> {
    words: &'a [u32],
    index: usize,
    shift: u32,
}

impl<'a> RegCursor<'a> {
    pub fn new(words: &'a [u32]) -> Self {
        Self {
            words,
            index: 0,
            shift: 32,
        }
    }

    /// Read the next packed register byte
    pub fn next(&mut self) -> Option<u8> {
        if self.shift == 0 {
            self.index += 1;
            self.shift = 32;
        }
        let word = *self.words.get(self.index)?;
        self.shift -= 8;
        Some((word >> self.shift) as u8)
    }

    /// Number of tail words consumed so far
    pub fn words_read(&self) -> usize {
        if self.shift == 32 {
            self.index
        } else {
            self.index + 1
        }
    }
}
