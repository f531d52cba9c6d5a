//! Straight-line expressions: variables, operators, calls, scopes and assignment

use super::{LowerError, Lookup, Lowerer};
use crate::instruction::{self, CompareOp, StackSlot, Value};
use kaleido_parser::{AssignKind, Assignment, Ast, BinaryOp, LogicalOp, VarBinding};

impl<'m> Lowerer<'m> {
    /// Address of `name`: the local slot if bound, else the global
    fn resolve(&self, name: &str) -> Result<Value, LowerError> {
        if let Some(slot) = self.symbols.lookup_local(name) {
            return Ok(slot.value());
        }
        self.builder
            .global(name)
            .ok_or_else(|| LowerError::UndefinedVariable {
                name: name.to_string(),
                lookup: Lookup::LocalAndGlobal,
            })
    }

    pub(super) fn lower_variable(&mut self, name: &str) -> Result<Value, LowerError> {
        let address = self.resolve(name)?;
        Ok(self.builder.load(address)?)
    }

    pub(super) fn lower_binary(
        &mut self,
        op: BinaryOp,
        lhs: Option<&Ast>,
        rhs: &Ast,
    ) -> Result<Value, LowerError> {
        let Some(lhs) = lhs else {
            if op != BinaryOp::Sub {
                return Err(LowerError::UndefinedOperator {
                    operator: op.symbol().to_string(),
                });
            }
            let operand = self.lower_float(rhs)?;
            return Ok(self.builder.neg(operand)?);
        };

        let left = self.lower_float(lhs)?;
        let right = self.lower_float(rhs)?;
        let value = match op {
            BinaryOp::Add => self.builder.binary(instruction::BinaryOp::Add, left, right)?,
            BinaryOp::Sub => self.builder.binary(instruction::BinaryOp::Sub, left, right)?,
            BinaryOp::Mul => self.builder.binary(instruction::BinaryOp::Mul, left, right)?,
            BinaryOp::Div => self.builder.binary(instruction::BinaryOp::Div, left, right)?,
            BinaryOp::Lt => self.builder.compare(CompareOp::Ult, left, right)?,
            BinaryOp::Eq => self.builder.compare(CompareOp::Ueq, left, right)?,
        };
        Ok(value)
    }

    pub(super) fn lower_logical(
        &mut self,
        op: LogicalOp,
        lhs: Option<&Ast>,
        rhs: &Ast,
    ) -> Result<Value, LowerError> {
        let value = match (op, lhs) {
            (LogicalOp::Not, None) => {
                let operand = self.lower_bool(rhs)?;
                self.builder.not(operand)?
            }
            (LogicalOp::And, Some(lhs)) | (LogicalOp::Or, Some(lhs)) => {
                let left = self.lower_bool(lhs)?;
                let right = self.lower_bool(rhs)?;
                let op = if op == LogicalOp::And {
                    instruction::LogicalOp::And
                } else {
                    instruction::LogicalOp::Or
                };
                self.builder.logical(op, left, right)?
            }
            _ => {
                return Err(LowerError::UndefinedOperator {
                    operator: op.symbol().to_string(),
                })
            }
        };
        Ok(value)
    }

    pub(super) fn lower_call(&mut self, callee: &str, args: &[Ast]) -> Result<Value, LowerError> {
        let expected = self
            .builder
            .function(callee)
            .map(|f| f.arity())
            .ok_or_else(|| LowerError::UndefinedFunction {
                name: callee.to_string(),
            })?;
        if expected != args.len() {
            return Err(LowerError::ArgumentCountMismatch {
                callee: callee.to_string(),
                expected,
                found: args.len(),
            });
        }

        let mut values = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let value = self
                .lower_float(arg)
                .map_err(|e| e.context(format!("in argument {} of `{}`", i + 1, callee)))?;
            values.push(value);
        }
        Ok(self.builder.call(callee, values)?)
    }

    /// Allocates a slot for `binding` and stores its initial value.
    /// Binding the name is left to the caller.
    pub(super) fn lower_binding(&mut self, binding: &VarBinding) -> Result<StackSlot, LowerError> {
        self.allocate_local(&binding.name, &binding.init)
    }

    pub(super) fn allocate_local(&mut self, name: &str, init: &Ast) -> Result<StackSlot, LowerError> {
        let init = self
            .lower_float(init)
            .map_err(|e| e.context(format!("in the initializer of `{}`", name)))?;
        let slot = self.builder.alloca(name)?;
        self.builder.store(init, slot.value())?;
        Ok(slot)
    }

    /// `var a = .., b = .. in body`
    pub(super) fn lower_block(
        &mut self,
        bindings: &[VarBinding],
        body: &Ast,
    ) -> Result<Value, LowerError> {
        let mut shadowed = Vec::with_capacity(bindings.len());
        let result = self
            .bind_all(bindings, &mut shadowed)
            .and_then(|()| self.lower(body));

        for (name, previous) in shadowed.into_iter().rev() {
            self.symbols.unbind_local(name, previous);
        }
        result
    }

    fn bind_all<'a>(
        &mut self,
        bindings: &'a [VarBinding],
        shadowed: &mut Vec<(&'a str, Option<StackSlot>)>,
    ) -> Result<(), LowerError> {
        for binding in bindings {
            let slot = self.lower_binding(binding)?;
            let previous = self.symbols.bind_local(&binding.name, slot);
            shadowed.push((binding.name.as_str(), previous));
        }
        Ok(())
    }

    /// `x = value` and `++x`; the result is the address written to
    pub(super) fn lower_assignment(&mut self, assignment: &Assignment) -> Result<Value, LowerError> {
        let name = assignment.name.as_str();
        match &assignment.kind {
            AssignKind::Set(value) => {
                let value = self
                    .lower_float(value)
                    .map_err(|e| e.context(format!("in the value assigned to `{}`", name)))?;
                let address = self.resolve(name)?;
                self.builder.store(value, address.clone())?;
                Ok(address)
            }
            AssignKind::Increment => {
                let slot = self
                    .symbols
                    .lookup_local(name)
                    .cloned()
                    .ok_or_else(|| LowerError::UndefinedVariable {
                        name: name.to_string(),
                        lookup: Lookup::LocalOnly,
                    })?;
                let current = self.builder.load(slot.value())?;
                let next = self.builder.binary(
                    instruction::BinaryOp::Add,
                    current,
                    Value::const_float(1.0),
                )?;
                self.builder.store(next, slot.value())?;
                Ok(slot.value())
            }
        }
    }

    /// `{ first; rest }`, valued by the last expression
    pub(super) fn lower_statement(&mut self, first: &Ast, rest: Option<&Ast>) -> Result<Value, LowerError> {
        let mut position = 1;
        let mut current = first;
        let mut next = rest;
        loop {
            let value = self
                .lower(current)
                .map_err(|e| e.context(format!("in statement {} of this block", position)))?;
            match next {
                Some(Ast::Statement { first, rest }) => {
                    current = first.as_ref();
                    next = rest.as_deref();
                    position += 1;
                }
                Some(last) => {
                    current = last;
                    next = None;
                    position += 1;
                }
                None => return Ok(value),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{compile, Echo, LowerOptions};
    use crate::verify::verify_module;
    use kaleido_error::{ErrorCode, Span};
    use kaleido_parser::{Ast, BinaryOp, FunctionDef, LogicalOp, Prototype};
    use pretty_assertions::assert_eq;

    fn def(name: &str, body: Ast) -> Ast {
        Ast::Function(FunctionDef {
            proto: Prototype {
                name: name.into(),
                params: vec!["x".into()],
                span: Span::default(),
            },
            body: Box::new(body),
            span: Span::default(),
        })
    }

    fn x() -> Box<Ast> {
        Box::new(Ast::Variable("x".into()))
    }

    #[test]
    fn test_parameters_are_spilled_to_slots() {
        let lowered = lower_source("def f(x, y): x + y * 2;");
        assert_eq!(
            function_text(&lowered, "f"),
            "define f64 @f(f64 %x, f64 %y) {\n\
             entry:\n  \
             %y1 = alloca f64\n  \
             %x1 = alloca f64\n  \
             store %x, %x1\n  \
             store %y, %y1\n  \
             %0 = load f64, %x1\n  \
             %1 = load f64, %y1\n  \
             %2 = fmul %1, 2.0\n  \
             %3 = fadd %0, %2\n  \
             ret %3\n\
             }\n"
        );
    }

    #[test]
    fn test_block_shadows_and_restores() {
        let lowered = lower_source("def f(x) var x = x + 1 in x; def g(x) { var x = 2 in x; x };");
        assert!(lowered.diagnostics.is_empty());
        let g = function_text(&lowered, "g");
        // The second read of `x` goes through the parameter's slot again.
        assert!(g.contains("%1 = load f64, %x1"), "{}", g);
        assert!(g.contains("%0 = load f64, %x2"), "{}", g);
        assert!(verify_module(&lowered.module).is_empty());
    }

    #[test]
    fn test_undefined_function_emits_no_call() {
        let lowered = lower_source("def f() foo();");
        let diagnostic = lowered.diagnostics.iter().next().unwrap();
        assert_eq!(diagnostic.code, Some(ErrorCode::UNDEFINED_FUNCTION));
        assert!(lowered.module.get_function("f").is_none());
        assert!(!lowered.module.to_string().contains("call"));
    }

    #[test]
    fn test_argument_count_mismatch() {
        let lowered = lower_source("extern sin(x); def f() sin(1, 2);");
        let diagnostic = lowered.diagnostics.iter().next().unwrap();
        assert_eq!(diagnostic.code, Some(ErrorCode::ARGUMENT_COUNT));
        assert_eq!(diagnostic.message, "`sin` takes 1 arguments but 2 were supplied");
    }

    #[test]
    fn test_increment_requires_local() {
        let lowered = lower_source("global g; def f() ++g;");
        let diagnostic = lowered.diagnostics.iter().next().unwrap();
        assert_eq!(diagnostic.code, Some(ErrorCode::UNDEFINED_LOCAL));
    }

    #[test]
    fn test_assignment_value_is_read_back() {
        let lowered = lower_source("def f(x) x = 4;");
        assert_eq!(
            function_text(&lowered, "f"),
            "define f64 @f(f64 %x) {\n\
             entry:\n  \
             %x1 = alloca f64\n  \
             store %x, %x1\n  \
             store 4.0, %x1\n  \
             %0 = load f64, %x1\n  \
             ret %0\n\
             }\n"
        );
    }

    #[test]
    fn test_logical_operators() {
        let lowered = lower_source("def f(a, b) not a or b and a;");
        let text = function_text(&lowered, "f");
        assert!(text.contains("= not "), "{}", text);
        assert!(text.contains("= and "), "{}", text);
        assert!(text.contains("= or "), "{}", text);
        assert!(verify_module(&lowered.module).is_empty());
    }

    #[test]
    fn test_operator_with_wrong_operand_count() {
        let ast = Ast::Sequence(vec![
            def(
                "mul",
                Ast::Binary {
                    op: BinaryOp::Mul,
                    lhs: None,
                    rhs: x(),
                },
            ),
            def(
                "and",
                Ast::Logical {
                    op: LogicalOp::And,
                    lhs: None,
                    rhs: x(),
                },
            ),
            def(
                "not",
                Ast::Logical {
                    op: LogicalOp::Not,
                    lhs: Some(x()),
                    rhs: x(),
                },
            ),
            def(
                "neg",
                Ast::Binary {
                    op: BinaryOp::Sub,
                    lhs: None,
                    rhs: x(),
                },
            ),
        ]);
        let options = LowerOptions {
            echo: Echo::Silent,
            ..LowerOptions::default()
        };
        let (module, diagnostics) = compile(&ast, &options);

        let codes: Vec<_> = diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![Some(ErrorCode::UNDEFINED_OPERATOR); 3]);
        for name in ["mul", "and", "not"] {
            assert!(module.get_function(name).is_none(), "`{}` was kept", name);
        }
        assert!(module.get_function("neg").is_some());
        assert!(verify_module(&module).is_empty());
    }
}
