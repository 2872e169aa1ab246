//! Deduplicated constant table
//!
//! Literal values referenced from bytecode by index. Inserting an equal
//! value returns the existing index; insertion order is preserved so
//! serialization is stable regardless of how entries are looked up.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use rustc_hash::FxHashMap;

/// Wire tags for constant entries
pub mod tag {
    pub const BOOL: u32 = 0;
    pub const I32: u32 = 1;
    pub const I64: u32 = 2;
    pub const F32: u32 = 3;
    pub const F64: u32 = 4;
}

/// A literal runtime value held in the constant table
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Constant {
    /// Wire tag for this constant
    pub fn tag(&self) -> u32 {
        match self {
            Constant::Bool(_) => tag::BOOL,
            Constant::I32(_) => tag::I32,
            Constant::I64(_) => tag::I64,
            Constant::F32(_) => tag::F32,
            Constant::F64(_) => tag::F64,
        }
    }

    /// Bit pattern used for deduplication. Floats are compared by bits, so
    /// 0.0 and -0.0 are distinct entries and NaN payloads are preserved.
    fn bits(&self) -> u64 {
        match *self {
            Constant::Bool(b) => b as u64,
            Constant::I32(v) => v as u32 as u64,
            Constant::I64(v) => v as u64,
            Constant::F32(v) => v.to_bits() as u64,
            Constant::F64(v) => v.to_bits(),
        }
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Bool(v) => write!(f, "{}", v),
            Constant::I32(v) => write!(f, "{}i32", v),
            Constant::I64(v) => write!(f, "{}i64", v),
            Constant::F32(v) => write!(f, "{}f32", v),
            Constant::F64(v) => write!(f, "{}f64", v),
        }
    }
}

/// Errors specific to decoding the constant-table section
#[derive(Debug, thiserror::Error)]
pub enum ConstantError {
    #[error("unknown constant tag {tag} at offset {offset}")]
    UnknownTag { tag: u32, offset: usize },
}

/// Deduplicated, insertion-ordered table of constants
#[derive(Debug, Default, Clone)]
pub struct ConstantTable {
    entries: Vec<Constant>,
    lookup: FxHashMap<(u32, u64), u16>,
}

impl ConstantTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a constant, returning its index. Equal values (same tag and
    /// bit pattern) share one entry.
    pub fn insert(&mut self, value: Constant) -> u16 {
        let key = (value.tag(), value.bits());
        if let Some(&index) = self.lookup.get(&key) {
            return index;
        }
        let index = self.entries.len() as u16;
        self.entries.push(value);
        self.lookup.insert(key, index);
        index
    }

    pub fn get(&self, index: u16) -> Option<Constant> {
        self.entries.get(index as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Constant> {
        self.entries.iter()
    }

    /// Serialize entries in insertion order. The payload width depends on
    /// the tag: 4 bytes for bool/i32/f32, 8 bytes for i64/f64.
    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u32(self.entries.len() as u32);
        for entry in &self.entries {
            writer.emit_u32(entry.tag());
            match *entry {
                Constant::Bool(v) => writer.emit_u32(v as u32),
                Constant::I32(v) => writer.emit_u32(v as u32),
                Constant::F32(v) => writer.emit_u32(v.to_bits()),
                Constant::I64(v) => writer.emit_u64(v as u64),
                Constant::F64(v) => writer.emit_u64(v.to_bits()),
            }
        }
    }

    pub(crate) fn decode(reader: &mut BytecodeReader) -> Result<Self, ConstantDecodeError> {
        let count = reader.read_u32()? as usize;
        let mut table = Self::new();
        for _ in 0..count {
            let offset = reader.position();
            let tag = reader.read_u32()?;
            let value = match tag {
                tag::BOOL => Constant::Bool(reader.read_u32()? != 0),
                tag::I32 => Constant::I32(reader.read_u32()? as i32),
                tag::F32 => Constant::F32(f32::from_bits(reader.read_u32()?)),
                tag::I64 => Constant::I64(reader.read_u64()? as i64),
                tag::F64 => Constant::F64(f64::from_bits(reader.read_u64()?)),
                _ => return Err(ConstantError::UnknownTag { tag, offset }.into()),
            };
            table.insert(value);
        }
        Ok(table)
    }
}

/// Either a malformed stream or an unknown tag
#[derive(Debug, thiserror::Error)]
pub enum ConstantDecodeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Constant(#[from] ConstantError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_deduplicates() {
        let mut table = ConstantTable::new();
        let a = table.insert(Constant::I32(1));
        let b = table.insert(Constant::I32(2));
        let again = table.insert(Constant::I32(1));
        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn tags_do_not_collide() {
        let mut table = ConstantTable::new();
        let as_i32 = table.insert(Constant::I32(1));
        let as_i64 = table.insert(Constant::I64(1));
        let as_bool = table.insert(Constant::Bool(true));
        assert_ne!(as_i32, as_i64);
        assert_ne!(as_i32, as_bool);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut table = ConstantTable::new();
        table.insert(Constant::F64(3.5));
        table.insert(Constant::Bool(false));
        table.insert(Constant::I32(-7));
        let entries: Vec<_> = table.iter().copied().collect();
        assert_eq!(
            entries,
            vec![Constant::F64(3.5), Constant::Bool(false), Constant::I32(-7)]
        );
    }

    #[test]
    fn negative_zero_is_distinct() {
        let mut table = ConstantTable::new();
        let pos = table.insert(Constant::F64(0.0));
        let neg = table.insert(Constant::F64(-0.0));
        assert_ne!(pos, neg);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut table = ConstantTable::new();
        table.insert(Constant::I32(42));
        table.insert(Constant::I64(1 << 40));
        table.insert(Constant::F32(1.5));
        table.insert(Constant::F64(-2.25));
        table.insert(Constant::Bool(true));

        let mut writer = BytecodeWriter::new();
        table.encode(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = BytecodeReader::new(&bytes);
        let decoded = ConstantTable::decode(&mut reader).unwrap();

        let original: Vec<_> = table.iter().copied().collect();
        let restored: Vec<_> = decoded.iter().copied().collect();
        assert_eq!(original, restored);
    }
}
