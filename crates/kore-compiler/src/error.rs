//! Compilation errors
//!
//! Fatal conditions only. Recoverable problems (use of a moved value and
//! the like) are accumulated as [`crate::diag::Diagnostic`]s instead.

use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Error)]
pub enum CompileError {
    /// The linear-scan pool ran dry. There is no spilling fallback, so this
    /// aborts the compile.
    #[error("register pool exhausted in function {function} while allocating r{register}")]
    RegisterOverflow { function: String, register: u32 },

    /// More simultaneously-live registers than the 8-bit register fields
    /// can encode.
    #[error("function {function} needs {needed} registers (max 256)")]
    TooManyRegisters { function: String, needed: u32 },

    /// An edge or lookup referenced a block id the graph never created.
    #[error("block b{0} does not exist in the graph")]
    UnknownBlock(u32),

    #[error("too many constants (max 65535)")]
    TooManyConstants,

    /// A patched jump's byte displacement does not fit its 16-bit field.
    #[error("jump to block b{block} at byte offset {offset} exceeds 16-bit range")]
    JumpOutOfRange { block: u32, offset: usize },

    #[error("internal compiler error: {message}")]
    Internal { message: String },
}
