//! Bytecode definitions for the kore virtual machine.
//!
//! This crate is the leaf of the backend: the opcode set, the 32-bit
//! instruction word packing rules, the deduplicated constant table and the
//! binary module format (writer and loader). The compiler and the VM both
//! build on the packing helpers here so that encoding and dispatch agree
//! byte for byte.

pub mod builtin;
pub mod constants;
pub mod disasm;
pub mod encoder;
pub mod module;
pub mod opcode;
pub mod word;

pub use constants::{Constant, ConstantTable};
pub use disasm::disassemble;
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use module::{CompiledObject, Module, ModuleError, SourceSpan, FORMAT_VERSION, MAGIC};
pub use opcode::{Opcode, OperandForm};
pub use word::{RegCursor, RegPacker};
