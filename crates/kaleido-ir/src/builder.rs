//! IR builder
//!
//! A cursor over a [`Module`]: it remembers the function and block that
//! new instructions are appended to (the insertion point) and hands out
//! fresh temporaries, unique slot names and block labels.

use crate::instruction::{BinaryOp, CompareOp, Instruction, LogicalOp, StackSlot, Value};
use crate::module::{BlockId, Function, Global, Module};
use crate::types::IrType;
use crate::verify::{self, VerifyError};
use thiserror::Error;
use tracing::trace;

/// Misuse of the builder. Lowering never triggers these on well-formed input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IrError {
    #[error("no insertion point is set")]
    NoInsertionPoint,

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("symbol `{0}` is already defined in this module")]
    DuplicateSymbol(String),

    #[error("block {block:?} does not exist in `{function}`")]
    UnknownBlock { function: String, block: BlockId },

    #[error("block `{0}` is already attached")]
    AlreadyAttached(String),

    #[error("function `{0}` has no entry block")]
    MissingEntry(String),

    #[error("block `{0}` already ends in a terminator")]
    Terminated(String),

    #[error("`{0}` is not an address")]
    NotAddressable(String),

    #[error("`{0}` has no value")]
    NoValue(String),
}

/// Where new instructions go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertPoint {
    pub function: String,
    pub block: BlockId,
}

pub struct IrBuilder<'m> {
    module: &'m mut Module,
    position: Option<InsertPoint>,
}

impl<'m> IrBuilder<'m> {
    pub fn new(module: &'m mut Module) -> Self {
        Self {
            module,
            position: None,
        }
    }

    pub fn module(&self) -> &Module {
        self.module
    }

    // =========================================
    // Functions and globals
    // =========================================

    /// Adds a body-less function taking `params.len()` floats
    pub fn declare_function(&mut self, name: &str, params: &[String]) -> Result<(), IrError> {
        if self.module.has_symbol(name) {
            return Err(IrError::DuplicateSymbol(name.to_string()));
        }
        self.module.add_function(Function::new(name, params));
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.module.get_function(name)
    }

    /// Erases `name` from the module, clearing the insertion point if it was inside it
    pub fn remove_function(&mut self, name: &str) -> Option<Function> {
        if self.position.as_ref().map_or(false, |p| p.function == name) {
            self.position = None;
        }
        self.module.remove_function(name)
    }

    pub fn declare_global(&mut self, name: &str) -> Result<&Global, IrError> {
        if self.module.has_symbol(name) {
            return Err(IrError::DuplicateSymbol(name.to_string()));
        }
        self.module.add_global(Global::new(name));
        self.module
            .get_global(name)
            .ok_or_else(|| IrError::NoValue(name.to_string()))
    }

    /// Address of a module-level variable, if declared
    pub fn global(&self, name: &str) -> Option<Value> {
        self.module
            .get_global(name)
            .map(|g| Value::Global(g.name.clone()))
    }

    /// Checks the named function for well-formedness
    pub fn verify_function(&self, name: &str) -> Result<(), VerifyError> {
        let function = self
            .module
            .get_function(name)
            .ok_or_else(|| VerifyError::UnknownFunction(name.to_string()))?;
        verify::verify_function(self.module, function)
    }

    // =========================================
    // Blocks and positioning
    // =========================================

    fn function_mut(&mut self, name: &str) -> Result<&mut Function, IrError> {
        self.module
            .get_function_mut(name)
            .ok_or_else(|| IrError::UnknownFunction(name.to_string()))
    }

    fn position(&self) -> Result<&InsertPoint, IrError> {
        self.position.as_ref().ok_or(IrError::NoInsertionPoint)
    }

    fn current_function_name(&self) -> Result<String, IrError> {
        Ok(self.position()?.function.clone())
    }

    fn current_function(&mut self) -> Result<&mut Function, IrError> {
        let name = self.current_function_name()?;
        self.function_mut(&name)
    }

    /// Creates and attaches a block in `function`; used for entry blocks
    pub fn append_block_in(&mut self, function: &str, label: &str) -> Result<BlockId, IrError> {
        let func = self.function_mut(function)?;
        let id = func.create_block(label);
        func.attach_block(id);
        trace!(function, label, "appended block");
        Ok(id)
    }

    /// Creates and attaches a block in the current function
    pub fn append_block(&mut self, label: &str) -> Result<BlockId, IrError> {
        let name = self.current_function_name()?;
        self.append_block_in(&name, label)
    }

    /// Creates a block in the current function without attaching it
    pub fn create_block(&mut self, label: &str) -> Result<BlockId, IrError> {
        let id = self.current_function()?.create_block(label);
        trace!(label, "created detached block");
        Ok(id)
    }

    /// Appends a previously created block to the current function's layout
    pub fn attach_block(&mut self, block: BlockId) -> Result<(), IrError> {
        let func = self.current_function()?;
        let label = func
            .block(block)
            .map(|b| b.label.clone())
            .ok_or_else(|| IrError::UnknownBlock {
                function: func.name.clone(),
                block,
            })?;
        if !func.attach_block(block) {
            return Err(IrError::AlreadyAttached(label));
        }
        trace!(label = %label, "attached block");
        Ok(())
    }

    pub fn set_insert_point(&mut self, function: &str, block: BlockId) {
        self.position = Some(InsertPoint {
            function: function.to_string(),
            block,
        });
    }

    /// Moves the insertion point to the end of `block` in the current function
    pub fn position_at_end(&mut self, block: BlockId) -> Result<(), IrError> {
        let name = self.current_function_name()?;
        self.set_insert_point(&name, block);
        Ok(())
    }

    pub fn clear_insert_point(&mut self) {
        self.position = None;
    }

    pub fn insert_point(&self) -> Option<&InsertPoint> {
        self.position.as_ref()
    }

    /// The block instructions are currently appended to
    pub fn insert_block(&self) -> Result<BlockId, IrError> {
        Ok(self.position()?.block)
    }

    fn label_of(&mut self, block: BlockId) -> Result<String, IrError> {
        let func = self.current_function()?;
        func.block(block)
            .map(|b| b.label.clone())
            .ok_or_else(|| IrError::UnknownBlock {
                function: func.name.clone(),
                block,
            })
    }

    // =========================================
    // Emission
    // =========================================

    fn emit(&mut self, inst: Instruction) -> Result<(), IrError> {
        let InsertPoint { function, block } = self.position()?.clone();
        let func = self.function_mut(&function)?;
        let target = func
            .block_mut(block)
            .ok_or_else(|| IrError::UnknownBlock {
                function: function.clone(),
                block,
            })?;
        if target.is_terminated() {
            return Err(IrError::Terminated(target.label.clone()));
        }
        target.instructions.push(inst);
        Ok(())
    }

    fn temp(&mut self, ty: IrType) -> Result<u32, IrError> {
        Ok(self.current_function()?.new_temp(ty))
    }

    /// Type of `value` in the current function
    pub fn value_type(&self, value: &Value) -> Result<IrType, IrError> {
        match value {
            Value::ConstFloat(_) | Value::Param { .. } => Ok(IrType::F64),
            Value::ConstBool(_) => Ok(IrType::Bool),
            Value::Slot(_) | Value::Global(_) | Value::Function(_) => Ok(IrType::Ptr),
            Value::Temp(id) => {
                let name = &self.position()?.function;
                self.module
                    .get_function(name)
                    .and_then(|f| f.temp_type(*id))
                    .ok_or_else(|| IrError::NoValue(value.to_string()))
            }
            Value::Void => Err(IrError::NoValue(value.to_string())),
        }
    }

    /// Reserves an `f64` stack slot at the very start of the entry block.
    ///
    /// Each new slot goes in front of the previous ones, so slots end up
    /// in reverse order of creation.
    pub fn alloca(&mut self, name: &str) -> Result<StackSlot, IrError> {
        let func = self.current_function()?;
        let entry = func
            .entry()
            .ok_or_else(|| IrError::MissingEntry(func.name.clone()))?;
        let slot = StackSlot::new(func.unique_name(name));
        let block = func.block_mut(entry).ok_or_else(|| IrError::MissingEntry(name.to_string()))?;
        block.instructions.insert(
            0,
            Instruction::Alloca {
                slot: slot.clone(),
                ty: IrType::F64,
            },
        );
        trace!(slot = %slot, "allocated stack slot");
        Ok(slot)
    }

    pub fn load(&mut self, ptr: Value) -> Result<Value, IrError> {
        if !ptr.is_address() {
            return Err(IrError::NotAddressable(ptr.to_string()));
        }
        let dest = self.temp(IrType::F64)?;
        self.emit(Instruction::Load {
            dest,
            ptr,
            ty: IrType::F64,
        })?;
        Ok(Value::Temp(dest))
    }

    pub fn store(&mut self, value: Value, ptr: Value) -> Result<(), IrError> {
        if !ptr.is_address() {
            return Err(IrError::NotAddressable(ptr.to_string()));
        }
        self.emit(Instruction::Store { value, ptr })
    }

    pub fn binary(&mut self, op: BinaryOp, left: Value, right: Value) -> Result<Value, IrError> {
        let dest = self.temp(IrType::F64)?;
        self.emit(Instruction::Binary {
            dest,
            op,
            left,
            right,
        })?;
        Ok(Value::Temp(dest))
    }

    pub fn neg(&mut self, value: Value) -> Result<Value, IrError> {
        let dest = self.temp(IrType::F64)?;
        self.emit(Instruction::Neg { dest, value })?;
        Ok(Value::Temp(dest))
    }

    pub fn compare(&mut self, op: CompareOp, left: Value, right: Value) -> Result<Value, IrError> {
        let dest = self.temp(IrType::Bool)?;
        self.emit(Instruction::Compare {
            dest,
            op,
            left,
            right,
        })?;
        Ok(Value::Temp(dest))
    }

    pub fn logical(&mut self, op: LogicalOp, left: Value, right: Value) -> Result<Value, IrError> {
        let dest = self.temp(IrType::Bool)?;
        self.emit(Instruction::Logical {
            dest,
            op,
            left,
            right,
        })?;
        Ok(Value::Temp(dest))
    }

    pub fn not(&mut self, value: Value) -> Result<Value, IrError> {
        let dest = self.temp(IrType::Bool)?;
        self.emit(Instruction::Not { dest, value })?;
        Ok(Value::Temp(dest))
    }

    pub fn bool_to_float(&mut self, value: Value) -> Result<Value, IrError> {
        let dest = self.temp(IrType::F64)?;
        self.emit(Instruction::BoolToFloat { dest, value })?;
        Ok(Value::Temp(dest))
    }

    pub fn call(&mut self, func: &str, args: Vec<Value>) -> Result<Value, IrError> {
        if self.module.get_function(func).is_none() {
            return Err(IrError::UnknownFunction(func.to_string()));
        }
        let dest = self.temp(IrType::F64)?;
        self.emit(Instruction::Call {
            dest,
            func: func.to_string(),
            args,
        })?;
        Ok(Value::Temp(dest))
    }

    pub fn phi(&mut self, ty: IrType, incoming: Vec<(Value, BlockId)>) -> Result<Value, IrError> {
        let mut labelled = Vec::with_capacity(incoming.len());
        for (value, block) in incoming {
            labelled.push((value, self.label_of(block)?));
        }
        let dest = self.temp(ty)?;
        self.emit(Instruction::Phi {
            dest,
            ty,
            incoming: labelled,
        })?;
        Ok(Value::Temp(dest))
    }

    pub fn br(&mut self, target: BlockId) -> Result<(), IrError> {
        let target = self.label_of(target)?;
        self.emit(Instruction::Branch { target })
    }

    pub fn cond_br(&mut self, cond: Value, then_block: BlockId, else_block: BlockId) -> Result<(), IrError> {
        let then_label = self.label_of(then_block)?;
        let else_label = self.label_of(else_block)?;
        self.emit(Instruction::CondBranch {
            cond,
            then_label,
            else_label,
        })
    }

    pub fn ret(&mut self, value: Value) -> Result<(), IrError> {
        self.emit(Instruction::Return(value))
    }
}
