//! Structural and type checks over finished functions.

use crate::instruction::{Instruction, Value};
use crate::module::{Function, Module};
use crate::types::IrType;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerifyError {
    #[error("block `{0}` is empty")]
    EmptyBlock(String),

    #[error("block `{0}` does not end in a terminator")]
    Unterminated(String),

    #[error("block `{0}` has a terminator before its last instruction")]
    EarlyTerminator(String),

    #[error("branch in `{from}` targets `{to}`, which is not an attached block")]
    BadBranchTarget { from: String, to: String },

    #[error("phi in `{0}` does not lead its block")]
    MisplacedPhi(String),

    #[error("phi in `{block}` does not list exactly one value per predecessor (expected {expected:?}, found {found:?})")]
    PhiPredecessors {
        block: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("stack slot `{0}` is allocated outside the entry block")]
    AllocaOutsideEntry(String),

    #[error("`{value}` in `{block}` has type {found}, expected {expected}")]
    TypeMismatch {
        block: String,
        value: String,
        expected: IrType,
        found: IrType,
    },

    #[error("`{0}` is used but never defined")]
    UndefinedValue(String),

    #[error("call to unknown function `{0}`")]
    UnknownCallee(String),

    #[error("no function named `{0}`")]
    UnknownFunction(String),

    #[error("call to `{callee}` passes {found} arguments, expected {expected}")]
    CallArity {
        callee: String,
        expected: usize,
        found: usize,
    },
}

struct Checker<'a> {
    module: &'a Module,
    function: &'a Function,
    slots: HashSet<&'a str>,
}

impl<'a> Checker<'a> {
    fn type_of(&self, value: &Value) -> Result<IrType, VerifyError> {
        match value {
            Value::ConstFloat(_) => Ok(IrType::F64),
            Value::ConstBool(_) => Ok(IrType::Bool),
            Value::Param { index, name } => {
                if self.function.params.get(*index) == Some(name) {
                    Ok(IrType::F64)
                } else {
                    Err(VerifyError::UndefinedValue(value.to_string()))
                }
            }
            Value::Temp(id) => self
                .function
                .temp_type(*id)
                .ok_or_else(|| VerifyError::UndefinedValue(value.to_string())),
            Value::Slot(slot) if self.slots.contains(slot.name()) => Ok(IrType::Ptr),
            Value::Global(name) if self.module.get_global(name).is_some() => Ok(IrType::Ptr),
            Value::Function(name) if self.module.get_function(name).is_some() => Ok(IrType::Ptr),
            _ => Err(VerifyError::UndefinedValue(value.to_string())),
        }
    }

    fn expect(&self, block: &str, value: &Value, expected: IrType) -> Result<(), VerifyError> {
        let found = self.type_of(value)?;
        if found == expected {
            Ok(())
        } else {
            Err(VerifyError::TypeMismatch {
                block: block.to_string(),
                value: value.to_string(),
                expected,
                found,
            })
        }
    }

    fn check_types(&self, block: &str, inst: &Instruction) -> Result<(), VerifyError> {
        match inst {
            Instruction::Alloca { .. } | Instruction::Branch { .. } => Ok(()),
            Instruction::Store { value, ptr } => {
                self.expect(block, value, IrType::F64)?;
                self.expect(block, ptr, IrType::Ptr)
            }
            Instruction::Load { ptr, .. } => self.expect(block, ptr, IrType::Ptr),
            Instruction::Binary { left, right, .. } | Instruction::Compare { left, right, .. } => {
                self.expect(block, left, IrType::F64)?;
                self.expect(block, right, IrType::F64)
            }
            Instruction::Neg { value, .. } | Instruction::Return(value) => {
                self.expect(block, value, IrType::F64)
            }
            Instruction::Logical { left, right, .. } => {
                self.expect(block, left, IrType::Bool)?;
                self.expect(block, right, IrType::Bool)
            }
            Instruction::Not { value, .. }
            | Instruction::BoolToFloat { value, .. }
            | Instruction::CondBranch { cond: value, .. } => self.expect(block, value, IrType::Bool),
            Instruction::Call { func, args, .. } => {
                let callee = self
                    .module
                    .get_function(func)
                    .ok_or_else(|| VerifyError::UnknownCallee(func.clone()))?;
                if callee.arity() != args.len() {
                    return Err(VerifyError::CallArity {
                        callee: func.clone(),
                        expected: callee.arity(),
                        found: args.len(),
                    });
                }
                args.iter()
                    .try_for_each(|arg| self.expect(block, arg, IrType::F64))
            }
            Instruction::Phi { ty, incoming, .. } => incoming
                .iter()
                .try_for_each(|(value, _)| self.expect(block, value, *ty)),
        }
    }
}

/// Checks that `function` is well formed.
///
/// Declarations are trivially valid. For definitions: every attached
/// block ends in exactly one terminator, branches only target attached
/// blocks, phis lead their block and name each predecessor once,
/// stack slots live in the entry block, and operand types agree.
pub fn verify_function(module: &Module, function: &Function) -> Result<(), VerifyError> {
    if function.is_declaration() {
        return Ok(());
    }

    let labels: HashSet<&str> = function.blocks().map(|b| b.label.as_str()).collect();
    let mut predecessors: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut slots = HashSet::new();

    for (index, block) in function.blocks().enumerate() {
        let label = block.label.as_str();
        let last = block
            .instructions
            .last()
            .ok_or_else(|| VerifyError::EmptyBlock(label.to_string()))?;
        if !last.is_terminator() {
            return Err(VerifyError::Unterminated(label.to_string()));
        }

        let body = &block.instructions[..block.instructions.len() - 1];
        if body.iter().any(Instruction::is_terminator) {
            return Err(VerifyError::EarlyTerminator(label.to_string()));
        }

        for target in last.successors() {
            if !labels.contains(target) {
                return Err(VerifyError::BadBranchTarget {
                    from: label.to_string(),
                    to: target.to_string(),
                });
            }
            predecessors.entry(target).or_default().push(label);
        }

        let leading_phis = block
            .instructions
            .iter()
            .take_while(|i| matches!(i, Instruction::Phi { .. }))
            .count();
        for inst in &block.instructions[leading_phis..] {
            match inst {
                Instruction::Phi { .. } => return Err(VerifyError::MisplacedPhi(label.to_string())),
                Instruction::Alloca { slot, .. } if index > 0 => {
                    return Err(VerifyError::AllocaOutsideEntry(slot.name().to_string()))
                }
                Instruction::Alloca { slot, .. } => {
                    slots.insert(slot.name());
                }
                _ => {}
            }
        }
    }

    for block in function.blocks() {
        let mut expected: Vec<String> = predecessors
            .get(block.label.as_str())
            .map(|preds| preds.iter().map(|p| p.to_string()).collect())
            .unwrap_or_default();
        expected.sort();
        for inst in &block.instructions {
            if let Instruction::Phi { incoming, .. } = inst {
                let mut found: Vec<String> = incoming.iter().map(|(_, l)| l.clone()).collect();
                found.sort();
                if found != expected {
                    return Err(VerifyError::PhiPredecessors {
                        block: block.label.clone(),
                        expected,
                        found,
                    });
                }
            }
        }
    }

    let checker = Checker {
        module,
        function,
        slots,
    };
    for block in function.blocks() {
        for inst in &block.instructions {
            checker.check_types(&block.label, inst)?;
        }
    }
    Ok(())
}

/// Verifies every function in the module, collecting all failures
pub fn verify_module(module: &Module) -> Vec<(String, VerifyError)> {
    module
        .functions
        .iter()
        .filter_map(|f| {
            verify_function(module, f)
                .err()
                .map(|e| (f.name.clone(), e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;
    use crate::instruction::CompareOp;

    fn build(body: impl FnOnce(&mut IrBuilder<'_>)) -> Module {
        let mut module = Module::new("test");
        {
            let mut builder = IrBuilder::new(&mut module);
            builder.declare_function("f", &["x".to_string()]).unwrap();
            let entry = builder.append_block_in("f", "entry").unwrap();
            builder.set_insert_point("f", entry);
            body(&mut builder);
        }
        module
    }

    fn check(module: &Module) -> Result<(), VerifyError> {
        verify_function(module, module.get_function("f").unwrap())
    }

    #[test]
    fn test_diamond_verifies() {
        let module = build(|b| {
            let x = b.function("f").unwrap().param_value(0).unwrap();
            let cond = b.compare(CompareOp::Ult, x.clone(), Value::const_float(1.0)).unwrap();
            let then_bb = b.append_block("trueexp").unwrap();
            let else_bb = b.create_block("falseexp").unwrap();
            let end_bb = b.create_block("endcond").unwrap();
            b.cond_br(cond, then_bb, else_bb).unwrap();
            b.position_at_end(then_bb).unwrap();
            b.br(end_bb).unwrap();
            b.attach_block(else_bb).unwrap();
            b.position_at_end(else_bb).unwrap();
            b.br(end_bb).unwrap();
            b.attach_block(end_bb).unwrap();
            b.position_at_end(end_bb).unwrap();
            let phi = b
                .phi(IrType::F64, vec![(Value::const_float(1.0), then_bb), (x, else_bb)])
                .unwrap();
            b.ret(phi).unwrap();
        });
        assert_eq!(check(&module), Ok(()));
        assert!(verify_module(&module).is_empty());
    }

    #[test]
    fn test_unterminated_block() {
        let module = build(|b| {
            b.neg(Value::const_float(1.0)).unwrap();
        });
        assert_eq!(check(&module), Err(VerifyError::Unterminated("entry".into())));
    }

    #[test]
    fn test_branch_to_detached_block() {
        let module = build(|b| {
            let lost = b.create_block("merge").unwrap();
            b.br(lost).unwrap();
        });
        assert!(matches!(
            check(&module),
            Err(VerifyError::BadBranchTarget { to, .. }) if to == "merge"
        ));
    }

    #[test]
    fn test_phi_must_match_predecessors() {
        let module = build(|b| {
            let next = b.append_block("next").unwrap();
            b.br(next).unwrap();
            b.position_at_end(next).unwrap();
            let entry = b.function("f").unwrap().entry().unwrap();
            let phi = b
                .phi(
                    IrType::F64,
                    vec![(Value::const_float(1.0), entry), (Value::const_float(2.0), next)],
                )
                .unwrap();
            b.ret(phi).unwrap();
        });
        assert!(matches!(check(&module), Err(VerifyError::PhiPredecessors { .. })));
    }

    #[test]
    fn test_return_type_mismatch() {
        let module = build(|b| {
            let cond = b
                .compare(CompareOp::Ueq, Value::const_float(1.0), Value::const_float(1.0))
                .unwrap();
            b.ret(cond).unwrap();
        });
        assert!(matches!(
            check(&module),
            Err(VerifyError::TypeMismatch { expected: IrType::F64, found: IrType::Bool, .. })
        ));
    }
}
