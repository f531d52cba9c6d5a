//! IR Type System
//!
//! Source programs only ever compute with `f64`; the IR additionally
//! needs truth values (comparison results) and addresses (stack slots,
//! globals, functions).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    /// 64-bit IEEE float, the only source-level type
    F64,
    /// Truth value produced by comparisons and logical operators
    Bool,
    /// Address of a stack slot, global or function
    Ptr,
}

impl IrType {
    pub fn is_float(&self) -> bool {
        matches!(self, IrType::F64)
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::F64 => write!(f, "f64"),
            IrType::Bool => write!(f, "i1"),
            IrType::Ptr => write!(f, "ptr"),
        }
    }
}
