//! Type-checked AST interface
//!
//! The lexer, parser, type checker and inferrer live outside this crate;
//! what they hand the backend is the fully resolved tree defined here.
//! Every expression carries its resolved type, so lowering never guesses.

/// Source position of a declaration or expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLoc {
    pub line: u32,
    pub start_col: u32,
    pub end_col: u32,
}

impl SourceLoc {
    pub fn new(line: u32, start_col: u32, end_col: u32) -> Self {
        Self {
            line,
            start_col,
            end_col,
        }
    }
}

impl From<SourceLoc> for kore_bytecode::SourceSpan {
    fn from(loc: SourceLoc) -> Self {
        kore_bytecode::SourceSpan::new(loc.line, loc.start_col, loc.end_col)
    }
}

/// Numeric width/representation category, used to pick opcode variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericClass {
    I32,
    I64,
    F32,
    F64,
}

/// A resolved type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Unit,
    Bool,
    I32,
    I64,
    F32,
    F64,
    Array(Box<Type>),
    /// Reference to the function with the given index
    Function(u16),
}

impl Type {
    /// Reference types live on the heap and need explicit destruction;
    /// value types are copied freely and never destroyed.
    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Array(_) | Type::Function(_))
    }

    pub fn numeric_class(&self) -> Option<NumericClass> {
        match self {
            Type::I32 => Some(NumericClass::I32),
            Type::I64 => Some(NumericClass::I64),
            Type::F32 => Some(NumericClass::F32),
            Type::F64 => Some(NumericClass::F64),
            _ => None,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Unit => write!(f, "unit"),
            Type::Bool => write!(f, "bool"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::F32 => write!(f, "f32"),
            Type::F64 => write!(f, "f64"),
            Type::Array(elem) => write!(f, "[{}]", elem),
            Type::Function(index) => write!(f, "fn#{}", index),
        }
    }
}

/// Binary operators the type checker has already resolved operand types for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::Ne
        )
    }
}

/// A type-checked module
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: String,
    pub path: String,
    pub functions: Vec<Function>,
    /// Top-level statements; lowered into the implicit entry function
    pub statements: Vec<Stmt>,
}

/// A type-checked function declaration
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub exported: bool,
    pub loc: SourceLoc,
    pub params: Vec<Param>,
    pub return_ty: Type,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    /// First binding allocates, rebinding reuses the existing register
    Assign {
        name: String,
        value: Expr,
        loc: SourceLoc,
    },
    Return {
        value: Option<Expr>,
        loc: SourceLoc,
    },
    /// `if`/`else if`/`else` chain; `else_body` is empty when absent
    If {
        arms: Vec<IfArm>,
        else_body: Vec<Stmt>,
        loc: SourceLoc,
    },
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub struct IfArm {
    pub cond: Expr,
    pub body: Vec<Stmt>,
}

/// An expression with its resolved type
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub loc: SourceLoc,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type, loc: SourceLoc) -> Self {
        Self { kind, ty, loc }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Var(String),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    ArrayAlloc {
        len: Box<Expr>,
    },
}
