//! IR Instructions
//!
//! Instructions in SSA form: every instruction with a result writes a
//! fresh numbered temporary (`%0`, `%1`, ...). Mutable variables live in
//! stack slots (`alloca`) and are accessed with `load`/`store`; control
//! flow merges values with `phi`.

use crate::types::IrType;
use std::fmt;

/// Handle of a stack slot created by `alloca`.
///
/// Slot names are unique within their function, so the handle is just
/// the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StackSlot(String);

impl StackSlot {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn value(&self) -> Value {
        Value::Slot(self.clone())
    }
}

impl fmt::Display for StackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// An operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Float constant
    ConstFloat(f64),
    ConstBool(bool),
    /// Result of a previous instruction
    Temp(u32),
    /// Incoming function parameter
    Param { index: usize, name: String },
    /// Address of a stack slot
    Slot(StackSlot),
    /// Address of a module-level variable
    Global(String),
    /// Address of a function
    Function(String),
    /// No value (e.g. the result of lowering a list of declarations)
    Void,
}

impl Value {
    pub fn const_float(v: f64) -> Self {
        Value::ConstFloat(v)
    }

    pub fn const_bool(v: bool) -> Self {
        Value::ConstBool(v)
    }

    /// Whether the value denotes a storage location that can be loaded from.
    pub fn is_address(&self) -> bool {
        matches!(self, Value::Slot(_) | Value::Global(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::ConstFloat(v) => write!(f, "{:?}", v),
            Value::ConstBool(v) => write!(f, "{}", v),
            Value::Temp(id) => write!(f, "%{}", id),
            Value::Param { name, .. } => write!(f, "%{}", name),
            Value::Slot(slot) => write!(f, "{}", slot),
            Value::Global(name) | Value::Function(name) => write!(f, "@{}", name),
            Value::Void => write!(f, "void"),
        }
    }
}

/// Floating point arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn apply(&self, left: f64, right: f64) -> f64 {
        match self {
            BinaryOp::Add => left + right,
            BinaryOp::Sub => left - right,
            BinaryOp::Mul => left * right,
            BinaryOp::Div => left / right,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "fadd"),
            BinaryOp::Sub => write!(f, "fsub"),
            BinaryOp::Mul => write!(f, "fmul"),
            BinaryOp::Div => write!(f, "fdiv"),
        }
    }
}

/// Float comparisons. The unordered forms are true when either side is NaN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// unordered or less than
    Ult,
    /// unordered or equal
    Ueq,
    /// ordered and not equal
    One,
}

impl CompareOp {
    pub fn apply(&self, left: f64, right: f64) -> bool {
        let unordered = left.is_nan() || right.is_nan();
        match self {
            CompareOp::Ult => unordered || left < right,
            CompareOp::Ueq => unordered || left == right,
            CompareOp::One => !unordered && left != right,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Ult => write!(f, "ult"),
            CompareOp::Ueq => write!(f, "ueq"),
            CompareOp::One => write!(f, "one"),
        }
    }
}

/// Connectives over truth values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn apply(&self, left: bool, right: bool) -> bool {
        match self {
            LogicalOp::And => left && right,
            LogicalOp::Or => left || right,
        }
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => write!(f, "and"),
            LogicalOp::Or => write!(f, "or"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Reserve a stack slot; only valid in the entry block
    Alloca { slot: StackSlot, ty: IrType },

    Store { value: Value, ptr: Value },

    Load { dest: u32, ptr: Value, ty: IrType },

    Binary {
        dest: u32,
        op: BinaryOp,
        left: Value,
        right: Value,
    },

    /// Float negation
    Neg { dest: u32, value: Value },

    Compare {
        dest: u32,
        op: CompareOp,
        left: Value,
        right: Value,
    },

    Logical {
        dest: u32,
        op: LogicalOp,
        left: Value,
        right: Value,
    },

    Not { dest: u32, value: Value },

    /// Truth value to float (`true` becomes `1.0`)
    BoolToFloat { dest: u32, value: Value },

    Call {
        dest: u32,
        func: String,
        args: Vec<Value>,
    },

    /// Merge values from predecessor blocks; must lead its block
    Phi {
        dest: u32,
        ty: IrType,
        incoming: Vec<(Value, String)>,
    },

    Return(Value),

    Branch { target: String },

    CondBranch {
        cond: Value,
        then_label: String,
        else_label: String,
    },
}

impl Instruction {
    pub fn dest(&self) -> Option<u32> {
        match self {
            Instruction::Load { dest, .. }
            | Instruction::Binary { dest, .. }
            | Instruction::Neg { dest, .. }
            | Instruction::Compare { dest, .. }
            | Instruction::Logical { dest, .. }
            | Instruction::Not { dest, .. }
            | Instruction::BoolToFloat { dest, .. }
            | Instruction::Call { dest, .. }
            | Instruction::Phi { dest, .. } => Some(*dest),
            _ => None,
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Return(_) | Instruction::Branch { .. } | Instruction::CondBranch { .. }
        )
    }

    /// Labels this instruction may transfer control to.
    pub fn successors(&self) -> Vec<&str> {
        match self {
            Instruction::Branch { target } => vec![target.as_str()],
            Instruction::CondBranch {
                then_label,
                else_label,
                ..
            } => vec![then_label.as_str(), else_label.as_str()],
            _ => Vec::new(),
        }
    }

    /// Values read by this instruction.
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Instruction::Alloca { .. } | Instruction::Branch { .. } => Vec::new(),
            Instruction::Store { value, ptr } => vec![value, ptr],
            Instruction::Load { ptr, .. } => vec![ptr],
            Instruction::Binary { left, right, .. }
            | Instruction::Compare { left, right, .. }
            | Instruction::Logical { left, right, .. } => vec![left, right],
            Instruction::Neg { value, .. }
            | Instruction::Not { value, .. }
            | Instruction::BoolToFloat { value, .. }
            | Instruction::Return(value) => vec![value],
            Instruction::Call { args, .. } => args.iter().collect(),
            Instruction::Phi { incoming, .. } => incoming.iter().map(|(v, _)| v).collect(),
            Instruction::CondBranch { cond, .. } => vec![cond],
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Alloca { slot, ty } => write!(f, "{} = alloca {}", slot, ty),
            Instruction::Store { value, ptr } => write!(f, "store {}, {}", value, ptr),
            Instruction::Load { dest, ptr, ty } => write!(f, "%{} = load {}, {}", dest, ty, ptr),
            Instruction::Binary {
                dest,
                op,
                left,
                right,
            } => write!(f, "%{} = {} {}, {}", dest, op, left, right),
            Instruction::Neg { dest, value } => write!(f, "%{} = fneg {}", dest, value),
            Instruction::Compare {
                dest,
                op,
                left,
                right,
            } => write!(f, "%{} = fcmp {} {}, {}", dest, op, left, right),
            Instruction::Logical {
                dest,
                op,
                left,
                right,
            } => write!(f, "%{} = {} {}, {}", dest, op, left, right),
            Instruction::Not { dest, value } => write!(f, "%{} = not {}", dest, value),
            Instruction::BoolToFloat { dest, value } => {
                write!(f, "%{} = uitofp {} to f64", dest, value)
            }
            Instruction::Call { dest, func, args } => {
                write!(f, "%{} = call @{}(", dest, func)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Instruction::Phi { dest, ty, incoming } => {
                write!(f, "%{} = phi {} ", dest, ty)?;
                for (i, (value, label)) in incoming.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[ {}, %{} ]", value, label)?;
                }
                Ok(())
            }
            Instruction::Return(value) => write!(f, "ret {}", value),
            Instruction::Branch { target } => write!(f, "br label %{}", target),
            Instruction::CondBranch {
                cond,
                then_label,
                else_label,
            } => write!(
                f,
                "br {}, label %{}, label %{}",
                cond, then_label, else_label
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_display() {
        let inst = Instruction::Binary {
            dest: 0,
            op: BinaryOp::Add,
            left: Value::Param {
                index: 0,
                name: "x".into(),
            },
            right: Value::const_float(10.0),
        };
        assert_eq!(inst.to_string(), "%0 = fadd %x, 10.0");
    }

    #[test]
    fn test_control_flow_display() {
        let phi = Instruction::Phi {
            dest: 4,
            ty: IrType::F64,
            incoming: vec![
                (Value::Temp(2), "trueexp".into()),
                (Value::Temp(3), "falseexp".into()),
            ],
        };
        assert_eq!(phi.to_string(), "%4 = phi f64 [ %2, %trueexp ], [ %3, %falseexp ]");

        let br = Instruction::CondBranch {
            cond: Value::Temp(1),
            then_label: "loop".into(),
            else_label: "merge".into(),
        };
        assert_eq!(br.to_string(), "br %1, label %loop, label %merge");
        assert_eq!(br.successors(), vec!["loop", "merge"]);
        assert!(br.is_terminator());
    }

    #[test]
    fn test_call_display() {
        let inst = Instruction::Call {
            dest: 1,
            func: "foo".to_string(),
            args: vec![Value::const_float(1.0), Value::Slot(StackSlot::new("x1"))],
        };
        assert_eq!(inst.to_string(), "%1 = call @foo(1.0, %x1)");
        assert_eq!(inst.dest(), Some(1));
    }

    #[test]
    fn test_unordered_comparisons() {
        assert!(CompareOp::Ult.apply(1.0, 2.0));
        assert!(!CompareOp::Ult.apply(2.0, 1.0));
        assert!(CompareOp::Ult.apply(f64::NAN, 1.0));
        assert!(CompareOp::Ueq.apply(f64::NAN, f64::NAN));
        assert!(!CompareOp::One.apply(f64::NAN, 0.0));
        assert!(CompareOp::One.apply(3.0, 0.0));
    }
}
