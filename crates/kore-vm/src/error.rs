//! Execution faults
//!
//! A fault permanently stops the machine: the interpreter captures the
//! condition plus a call-frame trace and refuses further dispatch.

use thiserror::Error;

pub type VmResult<T> = Result<T, VmError>;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("module has no entry function")]
    NoEntryFunction,

    #[error("{fault} in {function} at pc {pc:#06x}{}", format_trace(.trace))]
    Fault {
        fault: FaultKind,
        /// Name of the function that faulted
        function: String,
        /// Byte offset of the faulting instruction within that function
        pc: usize,
        /// Call-frame trace, innermost first
        trace: Vec<String>,
    },
}

fn format_trace(trace: &[String]) -> String {
    if trace.is_empty() {
        return String::new();
    }
    let mut out = String::from("\ncall trace:");
    for frame in trace {
        out.push_str("\n  ");
        out.push_str(frame);
    }
    out
}

/// The condition that stopped the machine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FaultKind {
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    #[error("call to unknown function index {0}")]
    UnknownFunction(u16),

    #[error("constant index {0} out of range")]
    BadConstantIndex(u16),

    #[error("global slot {0} out of range")]
    BadGlobalSlot(u16),

    #[error("register r{0} outside the current window")]
    BadRegister(u8),

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("jump to invalid byte offset {0}")]
    BadJumpTarget(i64),

    #[error("negative array length {0}")]
    NegativeArrayLength(i32),

    #[error("callee returned {got} values, call site expects {expected}")]
    ReturnMismatch { expected: u8, got: u8 },

    #[error("register file exhausted ({needed} registers needed)")]
    RegisterOverflow { needed: usize },

    #[error("global table too large ({needed} slots declared)")]
    GlobalOverflow { needed: usize },

    #[error("call depth limit exceeded")]
    StackOverflow,

    #[error("truncated instruction stream")]
    TruncatedCode,
}
