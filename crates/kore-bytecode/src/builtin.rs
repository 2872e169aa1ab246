//! Builtin function indices
//!
//! Call instructions address builtins through a reserved slice of the
//! function-index space. Indices at or above [`BASE`] never refer to a
//! module function; the VM dispatches them natively and the compiler emits
//! them for the corresponding well-known names.

/// First function index reserved for builtins
pub const BASE: u16 = 0xF0;

/// `print(value)` - write a value to the VM's output
pub const PRINT: u16 = 0xF0;

/// `len(array) -> i32` - array element count
pub const LEN: u16 = 0xF1;

/// Whether a call-instruction function index addresses a builtin
pub fn is_builtin(index: u16) -> bool {
    index >= BASE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_range() {
        assert!(!is_builtin(0));
        assert!(!is_builtin(0xEF));
        assert!(is_builtin(PRINT));
        assert!(is_builtin(LEN));
    }
}
