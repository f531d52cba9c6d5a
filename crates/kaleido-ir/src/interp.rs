//! Reference evaluator for lowered modules.
//!
//! Executes the IR directly: one frame per call, a flat memory for stack
//! slots, and a value cell per global. Body-less functions resolve to a
//! small set of host built-ins. Execution is bounded by a step budget so
//! that a non-terminating program reports an error instead of hanging.

use crate::instruction::{Instruction, Value};
use crate::module::{BasicBlock, Function, Module};
use std::collections::HashMap;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    #[error("function `{0}` is not defined")]
    UnknownFunction(String),

    #[error("`{name}` expects {expected} arguments, got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("external function `{0}` has no host implementation")]
    UnresolvedExternal(String),

    #[error("`{function}` has no block labelled `{label}`")]
    MissingBlock { function: String, label: String },

    #[error("block `{0}` fell through without a terminator")]
    FellThrough(String),

    #[error("`{0}` was read before it was written")]
    Uninitialized(String),

    #[error("expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },

    #[error("phi in `{block}` has no value for predecessor `{from}`")]
    PhiWithoutEdge { block: String, from: String },

    #[error("step budget of {0} exhausted")]
    StepLimit(u64),

    #[error("call depth exceeded {0}")]
    StackOverflow(usize),
}

/// A runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum RtValue {
    Float(f64),
    Bool(bool),
    Ptr(Address),
}

impl RtValue {
    fn kind(&self) -> &'static str {
        match self {
            RtValue::Float(_) => "f64",
            RtValue::Bool(_) => "i1",
            RtValue::Ptr(_) => "ptr",
        }
    }

    fn as_float(&self) -> Result<f64, ExecError> {
        match self {
            RtValue::Float(v) => Ok(*v),
            other => Err(ExecError::Type {
                expected: "f64",
                found: other.kind(),
            }),
        }
    }

    fn as_bool(&self) -> Result<bool, ExecError> {
        match self {
            RtValue::Bool(v) => Ok(*v),
            other => Err(ExecError::Type {
                expected: "i1",
                found: other.kind(),
            }),
        }
    }

    fn as_address(&self) -> Result<&Address, ExecError> {
        match self {
            RtValue::Ptr(address) => Ok(address),
            other => Err(ExecError::Type {
                expected: "ptr",
                found: other.kind(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Address {
    Stack(usize),
    Global(String),
    Function(String),
}

#[derive(Debug, Clone)]
pub struct MachineOptions {
    /// Instructions executed before giving up
    pub max_steps: u64,
    pub max_depth: usize,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            max_steps: 10_000_000,
            max_depth: 512,
        }
    }
}

struct Frame {
    args: Vec<f64>,
    temps: HashMap<u32, RtValue>,
    slots: HashMap<String, usize>,
}

pub struct Machine<'m> {
    module: &'m Module,
    options: MachineOptions,
    globals: HashMap<String, f64>,
    memory: Vec<Option<f64>>,
    steps: u64,
    depth: usize,
    output: String,
}

impl<'m> Machine<'m> {
    pub fn new(module: &'m Module) -> Self {
        Self::with_options(module, MachineOptions::default())
    }

    pub fn with_options(module: &'m Module, options: MachineOptions) -> Self {
        let globals = module
            .globals
            .iter()
            .map(|g| (g.name.clone(), g.initializer))
            .collect();
        Self {
            module,
            options,
            globals,
            memory: Vec::new(),
            steps: 0,
            depth: 0,
            output: String::new(),
        }
    }

    /// Current value of a global
    pub fn global(&self, name: &str) -> Option<f64> {
        self.globals.get(name).copied()
    }

    /// Text written by `printd` and `putchard`
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Calls `name` with `args` and returns its result
    pub fn call(&mut self, name: &str, args: &[f64]) -> Result<f64, ExecError> {
        let module = self.module;
        let function = module
            .get_function(name)
            .ok_or_else(|| ExecError::UnknownFunction(name.to_string()))?;
        if function.arity() != args.len() {
            return Err(ExecError::Arity {
                name: name.to_string(),
                expected: function.arity(),
                found: args.len(),
            });
        }
        if function.is_declaration() {
            return self.call_builtin(name, args);
        }
        if self.depth >= self.options.max_depth {
            return Err(ExecError::StackOverflow(self.options.max_depth));
        }

        self.depth += 1;
        let saved_memory = self.memory.len();
        let result = self.run(function, args.to_vec());
        self.memory.truncate(saved_memory);
        self.depth -= 1;
        result
    }

    fn call_builtin(&mut self, name: &str, args: &[f64]) -> Result<f64, ExecError> {
        let x = args.first().copied().unwrap_or_default();
        let result = match (name, args.len()) {
            ("sin", 1) => x.sin(),
            ("cos", 1) => x.cos(),
            ("sqrt", 1) => x.sqrt(),
            ("fabs", 1) => x.abs(),
            ("exp", 1) => x.exp(),
            ("log", 1) => x.ln(),
            ("printd", 1) => {
                self.output.push_str(&format!("{}\n", x));
                0.0
            }
            ("putchard", 1) => {
                self.output.push(char::from_u32(x as u32).unwrap_or('\u{fffd}'));
                0.0
            }
            _ => return Err(ExecError::UnresolvedExternal(name.to_string())),
        };
        Ok(result)
    }

    fn run(&mut self, function: &'m Function, args: Vec<f64>) -> Result<f64, ExecError> {
        let mut frame = Frame {
            args,
            temps: HashMap::new(),
            slots: HashMap::new(),
        };
        let mut block = function
            .blocks()
            .next()
            .ok_or_else(|| ExecError::UnknownFunction(function.name.clone()))?;
        let mut previous: Option<&str> = None;

        loop {
            trace!(function = %function.name, block = %block.label, "enter block");
            self.resolve_phis(&mut frame, block, previous)?;

            let mut next = None;
            for inst in &block.instructions {
                self.steps += 1;
                if self.steps > self.options.max_steps {
                    return Err(ExecError::StepLimit(self.options.max_steps));
                }
                match self.execute(&mut frame, inst)? {
                    Flow::Continue => {}
                    Flow::Jump(label) => {
                        next = Some(label);
                        break;
                    }
                    Flow::Return(value) => return Ok(value),
                }
            }

            let label = next.ok_or_else(|| ExecError::FellThrough(block.label.clone()))?;
            previous = Some(block.label.as_str());
            block = function
                .get_block(label)
                .ok_or_else(|| ExecError::MissingBlock {
                    function: function.name.clone(),
                    label: label.to_string(),
                })?;
        }
    }

    /// Phis read their inputs simultaneously, on entry to the block
    fn resolve_phis(
        &self,
        frame: &mut Frame,
        block: &BasicBlock,
        previous: Option<&str>,
    ) -> Result<(), ExecError> {
        let mut resolved = Vec::new();
        for inst in &block.instructions {
            let Instruction::Phi { dest, incoming, .. } = inst else {
                break;
            };
            let from = previous.unwrap_or("");
            let (value, _) = incoming
                .iter()
                .find(|(_, label)| label == from)
                .ok_or_else(|| ExecError::PhiWithoutEdge {
                    block: block.label.clone(),
                    from: from.to_string(),
                })?;
            resolved.push((*dest, self.eval(frame, value)?));
        }
        frame.temps.extend(resolved);
        Ok(())
    }

    fn eval(&self, frame: &Frame, value: &Value) -> Result<RtValue, ExecError> {
        match value {
            Value::ConstFloat(v) => Ok(RtValue::Float(*v)),
            Value::ConstBool(v) => Ok(RtValue::Bool(*v)),
            Value::Temp(id) => frame
                .temps
                .get(id)
                .cloned()
                .ok_or_else(|| ExecError::Uninitialized(value.to_string())),
            Value::Param { index, .. } => frame
                .args
                .get(*index)
                .map(|v| RtValue::Float(*v))
                .ok_or_else(|| ExecError::Uninitialized(value.to_string())),
            Value::Slot(slot) => frame
                .slots
                .get(slot.name())
                .map(|addr| RtValue::Ptr(Address::Stack(*addr)))
                .ok_or_else(|| ExecError::Uninitialized(value.to_string())),
            Value::Global(name) => Ok(RtValue::Ptr(Address::Global(name.clone()))),
            Value::Function(name) => Ok(RtValue::Ptr(Address::Function(name.clone()))),
            Value::Void => Err(ExecError::Uninitialized(value.to_string())),
        }
    }

    fn float(&self, frame: &Frame, value: &Value) -> Result<f64, ExecError> {
        self.eval(frame, value)?.as_float()
    }

    fn boolean(&self, frame: &Frame, value: &Value) -> Result<bool, ExecError> {
        self.eval(frame, value)?.as_bool()
    }

    fn read(&self, address: &Address) -> Result<f64, ExecError> {
        let cell = match address {
            Address::Stack(index) => self.memory.get(*index).copied().flatten(),
            Address::Global(name) => self.globals.get(name).copied(),
            Address::Function(_) => None,
        };
        cell.ok_or_else(|| ExecError::Uninitialized(format!("{:?}", address)))
    }

    fn write(&mut self, address: &Address, value: f64) -> Result<(), ExecError> {
        match address {
            Address::Stack(index) => match self.memory.get_mut(*index) {
                Some(cell) => *cell = Some(value),
                None => return Err(ExecError::Uninitialized(format!("{:?}", address))),
            },
            Address::Global(name) => {
                self.globals.insert(name.clone(), value);
            }
            Address::Function(_) => {
                return Err(ExecError::Type {
                    expected: "data address",
                    found: "function",
                })
            }
        }
        Ok(())
    }

    fn execute<'i>(&mut self, frame: &mut Frame, inst: &'i Instruction) -> Result<Flow<'i>, ExecError> {
        let (dest, value) = match inst {
            Instruction::Alloca { slot, .. } => {
                self.memory.push(None);
                frame
                    .slots
                    .insert(slot.name().to_string(), self.memory.len() - 1);
                return Ok(Flow::Continue);
            }
            Instruction::Store { value, ptr } => {
                let value = self.float(frame, value)?;
                let address = self.eval(frame, ptr)?;
                self.write(address.as_address()?, value)?;
                return Ok(Flow::Continue);
            }
            Instruction::Load { dest, ptr, .. } => {
                let address = self.eval(frame, ptr)?;
                (*dest, RtValue::Float(self.read(address.as_address()?)?))
            }
            Instruction::Binary {
                dest,
                op,
                left,
                right,
            } => {
                let result = op.apply(self.float(frame, left)?, self.float(frame, right)?);
                (*dest, RtValue::Float(result))
            }
            Instruction::Neg { dest, value } => (*dest, RtValue::Float(-self.float(frame, value)?)),
            Instruction::Compare {
                dest,
                op,
                left,
                right,
            } => {
                let result = op.apply(self.float(frame, left)?, self.float(frame, right)?);
                (*dest, RtValue::Bool(result))
            }
            Instruction::Logical {
                dest,
                op,
                left,
                right,
            } => {
                let result = op.apply(self.boolean(frame, left)?, self.boolean(frame, right)?);
                (*dest, RtValue::Bool(result))
            }
            Instruction::Not { dest, value } => (*dest, RtValue::Bool(!self.boolean(frame, value)?)),
            Instruction::BoolToFloat { dest, value } => {
                let flag = self.boolean(frame, value)?;
                (*dest, RtValue::Float(if flag { 1.0 } else { 0.0 }))
            }
            Instruction::Call { dest, func, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.float(frame, arg))
                    .collect::<Result<Vec<_>, _>>()?;
                (*dest, RtValue::Float(self.call(func, &args)?))
            }
            // Phis are resolved on block entry.
            Instruction::Phi { .. } => return Ok(Flow::Continue),
            Instruction::Return(value) => return Ok(Flow::Return(self.float(frame, value)?)),
            Instruction::Branch { target } => return Ok(Flow::Jump(target)),
            Instruction::CondBranch {
                cond,
                then_label,
                else_label,
            } => {
                let target = if self.boolean(frame, cond)? {
                    then_label
                } else {
                    else_label
                };
                return Ok(Flow::Jump(target));
            }
        };
        frame.temps.insert(dest, value);
        Ok(Flow::Continue)
    }
}

enum Flow<'i> {
    Continue,
    Jump(&'i str),
    Return(f64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;
    use crate::instruction::{BinaryOp, CompareOp};

    /// `def count(n) { i = 0; while i < n: ++i; i }` built by hand
    fn counting_module() -> Module {
        let mut module = Module::new("test");
        {
            let mut b = IrBuilder::new(&mut module);
            b.declare_function("count", &["n".to_string()]).unwrap();
            let entry = b.append_block_in("count", "entry").unwrap();
            b.set_insert_point("count", entry);
            let n = b.function("count").unwrap().param_value(0).unwrap();
            let i = b.alloca("i").unwrap();
            b.store(Value::const_float(0.0), i.value()).unwrap();
            let cond = b.append_block("cond").unwrap();
            let body = b.create_block("loop").unwrap();
            let merge = b.create_block("merge").unwrap();
            b.br(cond).unwrap();
            b.position_at_end(cond).unwrap();
            let current = b.load(i.value()).unwrap();
            let keep_going = b.compare(CompareOp::Ult, current, n).unwrap();
            b.attach_block(body).unwrap();
            b.cond_br(keep_going, body, merge).unwrap();
            b.position_at_end(body).unwrap();
            let current = b.load(i.value()).unwrap();
            let next = b.binary(BinaryOp::Add, current, Value::const_float(1.0)).unwrap();
            b.store(next, i.value()).unwrap();
            b.br(cond).unwrap();
            b.attach_block(merge).unwrap();
            b.position_at_end(merge).unwrap();
            let result = b.load(i.value()).unwrap();
            b.ret(result).unwrap();

            b.declare_function("printd", &["x".to_string()]).unwrap();
        }
        module
    }

    #[test]
    fn test_runs_loop() {
        let module = counting_module();
        let mut machine = Machine::new(&module);
        assert_eq!(machine.call("count", &[5.0]), Ok(5.0));
        assert_eq!(machine.call("count", &[0.0]), Ok(0.0));
    }

    #[test]
    fn test_step_budget() {
        let module = counting_module();
        let options = MachineOptions {
            max_steps: 50,
            ..MachineOptions::default()
        };
        let mut machine = Machine::with_options(&module, options);
        assert_eq!(machine.call("count", &[1e9]), Err(ExecError::StepLimit(50)));
    }

    #[test]
    fn test_builtins_and_errors() {
        let module = counting_module();
        let mut machine = Machine::new(&module);
        assert_eq!(machine.call("printd", &[2.5]), Ok(0.0));
        assert_eq!(machine.output(), "2.5\n");
        assert!(matches!(
            machine.call("count", &[]),
            Err(ExecError::Arity { expected: 1, found: 0, .. })
        ));
        assert_eq!(
            machine.call("missing", &[]),
            Err(ExecError::UnknownFunction("missing".into()))
        );
    }
}
