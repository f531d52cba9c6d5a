//! Prototypes, function definitions and globals

use super::{LowerError, Lowerer};
use crate::builder::IrError;
use crate::instruction::Value;
use kaleido_error::{Diagnostic, ErrorCode, Spanned};
use kaleido_parser::{FunctionDef, GlobalVar, Prototype};
use tracing::{debug, warn};

impl<'m> Lowerer<'m> {
    /// Declares `proto` in the module.
    ///
    /// `visible` prototypes (`extern`) are echoed; the prototype of a
    /// definition is not, since the definition itself is echoed once its
    /// body is complete.
    pub(super) fn lower_prototype(
        &mut self,
        proto: &Prototype,
        visible: bool,
    ) -> Result<Value, LowerError> {
        if let Some(existing) = self.builder.function(&proto.name) {
            if existing.arity() == proto.params.len() {
                return Ok(Value::Function(proto.name.clone()));
            }
            return Err(LowerError::RedefinedFunction {
                name: proto.name.clone(),
            });
        }
        if self.builder.global(&proto.name).is_some() {
            return Err(LowerError::RedefinedFunction {
                name: proto.name.clone(),
            });
        }

        self.builder.declare_function(&proto.name, &proto.params)?;
        if visible {
            if let Some(function) = self.builder.function(&proto.name) {
                self.emit_text(&format!("{}\n", function));
            }
        }
        Ok(Value::Function(proto.name.clone()))
    }

    pub(super) fn lower_function(&mut self, def: &FunctionDef) -> Result<Value, LowerError> {
        let name = def.proto.name.as_str();
        if self.builder.insert_point().is_some() {
            return Err(LowerError::NestedFunction {
                name: name.to_string(),
            });
        }
        if self.builder.module().has_symbol(name) {
            return Err(LowerError::RedefinedFunction {
                name: name.to_string(),
            });
        }
        debug!(name, arity = def.proto.params.len(), "lowering function");

        self.lower_prototype(&def.proto, false)?;
        let entry = self.builder.append_block_in(name, "entry")?;
        self.builder.set_insert_point(name, entry);
        self.symbols.clear();

        let body = self.lower_function_body(def);
        self.builder.clear_insert_point();
        if let Err(err) = body {
            self.builder.remove_function(name);
            return Err(err.context(format!("in the body of `{}`", name)));
        }

        self.check_function(def);
        if let Some(function) = self.builder.function(name) {
            self.emit_text(&format!("{}\n", function));
        }
        Ok(Value::Function(name.to_string()))
    }

    /// Spills each parameter to a slot, then lowers the body and returns its value with `ret`
    fn lower_function_body(&mut self, def: &FunctionDef) -> Result<(), LowerError> {
        for (index, param) in def.proto.params.iter().enumerate() {
            let incoming = self
                .builder
                .function(&def.proto.name)
                .and_then(|f| f.param_value(index))
                .ok_or_else(|| IrError::NoValue(param.clone()))?;
            let slot = self.builder.alloca(param)?;
            self.builder.store(incoming, slot.value())?;
            self.symbols.bind_local(param, slot);
        }

        let value = self.lower_float(&def.body)?;
        self.builder.ret(value)?;
        Ok(())
    }

    /// Runs the verifier over a finished definition. A failure is reported
    /// as a warning and the function is kept.
    fn check_function(&mut self, def: &FunctionDef) {
        if let Err(err) = self.builder.verify_function(&def.proto.name) {
            warn!(name = %def.proto.name, error = %err, "function failed verification");
            self.diagnostics.push(
                Diagnostic::warning(format!("`{}` is malformed: {}", def.proto.name, err))
                    .with_code(ErrorCode::MALFORMED_FUNCTION)
                    .with_label(def.span(), "in this definition"),
            );
        }
    }

    pub(super) fn lower_global(&mut self, global: &GlobalVar) -> Result<Value, LowerError> {
        if self.builder.module().has_symbol(&global.name) {
            return Err(LowerError::RedefinedGlobal {
                name: global.name.clone(),
            });
        }
        let text = format!("{}\n", self.builder.declare_global(&global.name)?);
        self.emit_text(&text);
        Ok(Value::Global(global.name.clone()))
    }
}
