//! Runtime values

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A value held in a register or a global slot.
///
/// Scalars are copied on every move; arrays are reference values, so
/// cloning a `Value::Array` shares the backing storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// The unit value; also what a destroyed or untouched register holds
    #[default]
    Unit,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Array(Rc<RefCell<Vec<Value>>>),
    /// First-class reference to the function with the given index
    Function(u16),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Array(_) => "array",
            Value::Function(_) => "function",
        }
    }

    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(elements)))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            Value::Function(index) => write!(f, "<fn #{}>", index),
        }
    }
}
