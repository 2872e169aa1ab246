//! Builtin dispatch
//!
//! Call instructions whose function index falls in the reserved builtin
//! range are handled natively instead of pushing a frame.

use crate::error::FaultKind;
use crate::value::Value;
use kore_bytecode::builtin;

/// Execute a builtin. Returns the builtin's result value, or `None` for
/// builtins that produce nothing.
pub fn dispatch(
    index: u16,
    args: &[Value],
    output: &mut Vec<String>,
) -> Result<Option<Value>, FaultKind> {
    match index {
        builtin::PRINT => {
            for arg in args {
                output.push(arg.to_string());
            }
            Ok(None)
        }
        builtin::LEN => match args {
            [Value::Array(elements)] => Ok(Some(Value::I32(elements.borrow().len() as i32))),
            [other] => Err(FaultKind::TypeMismatch {
                expected: "array",
                found: other.type_name(),
            }),
            _ => Err(FaultKind::TypeMismatch {
                expected: "array",
                found: "argument list",
            }),
        },
        _ => Err(FaultKind::UnknownFunction(index)),
    }
}
