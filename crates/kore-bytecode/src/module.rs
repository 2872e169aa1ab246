//! Binary module format
//!
//! Layout (all multi-byte integers big-endian):
//!
//! ```text
//! offset  size  field
//! 0       4     magic bytes "kore"
//! 4       3     compiler version (major, minor, patch)
//! 7       3     bytecode-format version (major, minor, patch)
//! 10      4     global-slot count
//! 14      4     constant-table section tag
//! 18      4     constant-table entry count
//! 22      *     constant entries: tag:4 + payload (4 or 8 bytes by tag)
//! ...     4     function count
//! ...     *     per function: name-length:4, name bytes, lnum:4,
//!               start-col:4, end-col:4, func-index:4, max-regs-used:4,
//!               code-word-count:4, code words (4 bytes each)
//! ```

use crate::constants::{ConstantDecodeError, ConstantTable};
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::opcode::{Opcode, OperandForm};
use crate::word;
use rustc_hash::FxHashMap;
use std::path::Path;
use thiserror::Error;

/// Magic bytes identifying a kore module file
pub const MAGIC: [u8; 4] = *b"kore";

/// Version of the compiler that produced the module
pub const COMPILER_VERSION: (u8, u8, u8) = (0, 1, 0);

/// Version of the bytecode format itself
pub const FORMAT_VERSION: (u8, u8, u8) = (1, 0, 0);

/// Section tag preceding the constant table
pub const CONSTANT_SECTION: u32 = u32::from_be_bytes(*b"CNST");

/// Conventional name of a module's entry function
pub const ENTRY_NAME: &str = "main";

/// Module reading/writing errors
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("invalid magic number: expected \"kore\", got {0:?}")]
    InvalidMagic([u8; 4]),

    /// The bytecode-format major version is gated; minor and patch are
    /// read but not interpreted.
    #[error("unsupported bytecode format {found}.x.x (loader supports {supported}.x.x)")]
    UnsupportedFormat { found: u8, supported: u8 },

    #[error("missing constant-table section tag at offset {offset} (got {found:#010x})")]
    BadConstantSection { found: u32, offset: usize },

    #[error("unknown constant tag {tag} at offset {offset}")]
    UnknownConstantTag { tag: u32, offset: usize },

    #[error("unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },

    #[error("{mnemonic} at offset {offset} is missing its packed-register tail")]
    TruncatedTail {
        mnemonic: &'static str,
        offset: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ConstantDecodeError> for ModuleError {
    fn from(err: ConstantDecodeError) -> Self {
        match err {
            ConstantDecodeError::Decode(e) => ModuleError::Decode(e),
            ConstantDecodeError::Constant(crate::constants::ConstantError::UnknownTag {
                tag,
                offset,
            }) => ModuleError::UnknownConstantTag { tag, offset },
        }
    }
}

/// Source position of a compiled function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub line: u32,
    pub start_col: u32,
    pub end_col: u32,
}

impl SourceSpan {
    pub fn new(line: u32, start_col: u32, end_col: u32) -> Self {
        Self {
            line,
            start_col,
            end_col,
        }
    }
}

/// The final, allocator-resolved, bytecode-encoded form of one function
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledObject {
    /// Function name
    pub name: String,
    /// Source position of the declaration
    pub span: SourceSpan,
    /// Function index used by `Call` instructions
    pub index: u32,
    /// Size of the register window this function needs
    pub max_registers: u32,
    /// Encoded instruction words
    pub code: Vec<u32>,
}

impl CompiledObject {
    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_u32(self.span.line);
        writer.emit_u32(self.span.start_col);
        writer.emit_u32(self.span.end_col);
        writer.emit_u32(self.index);
        writer.emit_u32(self.max_registers);
        writer.emit_u32(self.code.len() as u32);
        for &word in &self.code {
            writer.emit_u32(word);
        }
    }

    fn decode(reader: &mut BytecodeReader) -> Result<Self, ModuleError> {
        let name = reader.read_string()?;
        let line = reader.read_u32()?;
        let start_col = reader.read_u32()?;
        let end_col = reader.read_u32()?;
        let index = reader.read_u32()?;
        let max_registers = reader.read_u32()?;

        let word_count = reader.read_u32()? as usize;
        let code_start = reader.position();
        let mut code = Vec::with_capacity(word_count);
        for _ in 0..word_count {
            code.push(reader.read_u32()?);
        }

        let object = Self {
            name,
            span: SourceSpan::new(line, start_col, end_col),
            index,
            max_registers,
            code,
        };
        object.validate_code(code_start)?;
        Ok(object)
    }

    /// Walk the instruction stream, rejecting unknown opcodes and skipping
    /// the packed-register tails of variable-length instructions. A tail
    /// that claims more words than the stream holds is rejected too, so
    /// later passes can slice tails without bounds checks of their own.
    fn validate_code(&self, code_start: usize) -> Result<(), ModuleError> {
        let mut i = 0;
        while i < self.code.len() {
            let w = self.code[i];
            let byte = word::opcode_byte(w);
            let op = Opcode::from_u8(byte).ok_or(ModuleError::UnknownOpcode {
                opcode: byte,
                offset: code_start + i * 4,
            })?;
            let tail = match op.form() {
                OperandForm::Call => {
                    let args = word::reg_b(w) as usize;
                    let rets = word::reg_c(w) as usize;
                    word::packed_words(args + rets)
                }
                OperandForm::Ret => word::packed_words(word::reg_a(w) as usize),
                _ => 0,
            };
            if tail > self.code.len() - i - 1 {
                return Err(ModuleError::TruncatedTail {
                    mnemonic: op.mnemonic(),
                    offset: code_start + i * 4,
                });
            }
            i += 1 + tail;
        }
        Ok(())
    }
}

/// A compiled module: functions, constants and global-slot count
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Module index assigned by the compilation context
    pub index: u32,
    /// Source path the module was compiled from
    pub path: String,
    objects: Vec<CompiledObject>,
    by_name: FxHashMap<String, usize>,
    /// Constant table shared by all functions in the module
    pub constants: ConstantTable,
    /// Number of global-variable slots the VM must reserve
    pub globals: u32,
}

impl Module {
    pub fn new(index: u32, path: impl Into<String>) -> Self {
        Self {
            index,
            path: path.into(),
            ..Self::default()
        }
    }

    /// Add a compiled function. Later functions shadow earlier ones of the
    /// same name in the by-name lookup; declaration order is preserved.
    pub fn add_object(&mut self, object: CompiledObject) {
        self.by_name
            .insert(object.name.clone(), self.objects.len());
        self.objects.push(object);
    }

    pub fn objects(&self) -> &[CompiledObject] {
        &self.objects
    }

    pub fn object(&self, name: &str) -> Option<&CompiledObject> {
        self.by_name.get(name).map(|&i| &self.objects[i])
    }

    pub fn object_by_index(&self, index: u32) -> Option<&CompiledObject> {
        self.objects.iter().find(|o| o.index == index)
    }

    /// The designated entry function ("main" by convention)
    pub fn entry(&self) -> Option<&CompiledObject> {
        self.object(ENTRY_NAME)
    }

    /// Serialize the module deterministically: constants in table-insertion
    /// order, functions in declaration order.
    pub fn write_bytes(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();

        writer.emit_bytes(&MAGIC);
        let (cmaj, cmin, cpat) = COMPILER_VERSION;
        writer.emit_u8(cmaj);
        writer.emit_u8(cmin);
        writer.emit_u8(cpat);
        let (fmaj, fmin, fpat) = FORMAT_VERSION;
        writer.emit_u8(fmaj);
        writer.emit_u8(fmin);
        writer.emit_u8(fpat);

        writer.emit_u32(self.globals);

        writer.emit_u32(CONSTANT_SECTION);
        self.constants.encode(&mut writer);

        writer.emit_u32(self.objects.len() as u32);
        for object in &self.objects {
            object.encode(&mut writer);
        }

        writer.into_bytes()
    }

    /// Write the serialized module to a file
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ModuleError> {
        std::fs::write(path, self.write_bytes())?;
        Ok(())
    }

    /// Load a module from a byte stream
    pub fn load_bytes(data: &[u8], path: impl Into<String>) -> Result<Self, ModuleError> {
        let mut reader = BytecodeReader::new(data);

        let magic: [u8; 4] = reader.read_bytes(4)?.try_into().expect("4 bytes");
        if magic != MAGIC {
            return Err(ModuleError::InvalidMagic(magic));
        }

        // Compiler version: recorded for tooling, not gated.
        let _compiler = (reader.read_u8()?, reader.read_u8()?, reader.read_u8()?);
        let format = (reader.read_u8()?, reader.read_u8()?, reader.read_u8()?);
        if format.0 != FORMAT_VERSION.0 {
            return Err(ModuleError::UnsupportedFormat {
                found: format.0,
                supported: FORMAT_VERSION.0,
            });
        }

        let globals = reader.read_u32()?;

        let section_offset = reader.position();
        let section = reader.read_u32()?;
        if section != CONSTANT_SECTION {
            return Err(ModuleError::BadConstantSection {
                found: section,
                offset: section_offset,
            });
        }
        let constants = ConstantTable::decode(&mut reader)?;

        let count = reader.read_u32()? as usize;
        let mut module = Module::new(0, path);
        module.globals = globals;
        module.constants = constants;
        for _ in 0..count {
            module.add_object(CompiledObject::decode(&mut reader)?);
        }
        Ok(module)
    }

    /// Load a module from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModuleError> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        Self::load_bytes(&data, path.display().to_string())
    }
}
