//! Register-based bytecode interpreter for the kore virtual machine.
//!
//! Loads the modules `kore-compiler` produces and executes them: a flat
//! register file carved into per-call windows, explicit call frames, and
//! permanent faults with call traces on any runtime violation.

pub mod builtins;
pub mod error;
pub mod frame;
pub mod interpreter;
pub mod value;

pub use error::{FaultKind, VmError, VmResult};
pub use frame::CallFrame;
pub use interpreter::{Vm, VmState, MAX_CALL_DEPTH, MAX_GLOBALS, MAX_REGISTER_FILE};
pub use value::Value;
