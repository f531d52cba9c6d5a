//! `if` and `for`: the constructs that create blocks and move the insertion point

use super::{Branch, Lookup, LowerError, Lowerer};
use crate::instruction::{StackSlot, Value};
use crate::types::IrType;
use kaleido_parser::{AssignKind, Assignment, Ast, ForInit, ForLoop};
use tracing::trace;

impl<'m> Lowerer<'m> {
    /// Lowers `if cond then a else b` to a diamond:
    ///
    /// ```text
    ///   br cond, trueexp, falseexp
    /// trueexp:   a ... br endcond
    /// falseexp:  b ... br endcond
    /// endcond:   phi [a, <end of a>], [b, <end of b>]
    /// ```
    ///
    /// Only `trueexp` is attached up front; the other two blocks join the
    /// layout once the code before them is complete, so nested control
    /// flow inside an arm lands between the arm and its successor.
    pub(super) fn lower_if(
        &mut self,
        cond: &Ast,
        then: &Ast,
        otherwise: &Ast,
    ) -> Result<Value, LowerError> {
        let cond = self
            .lower_bool(cond)
            .map_err(|e| LowerError::MissingCondition {
                source: Box::new(e),
            })?;

        let then_bb = self.builder.append_block("trueexp")?;
        let else_bb = self.builder.create_block("falseexp")?;
        let end_bb = self.builder.create_block("endcond")?;
        self.builder.cond_br(cond, then_bb, else_bb)?;

        self.builder.position_at_end(then_bb)?;
        let then_value = self.lower_arm(then, Branch::Then)?;
        // The arm may have moved the insertion point into blocks of its own.
        let then_pred = self.builder.insert_block()?;
        self.builder.br(end_bb)?;

        self.builder.attach_block(else_bb)?;
        self.builder.position_at_end(else_bb)?;
        let else_value = self.lower_arm(otherwise, Branch::Else)?;
        let else_pred = self.builder.insert_block()?;
        self.builder.br(end_bb)?;

        self.builder.attach_block(end_bb)?;
        self.builder.position_at_end(end_bb)?;
        let phi = self.builder.phi(
            IrType::F64,
            vec![(then_value, then_pred), (else_value, else_pred)],
        )?;
        Ok(phi)
    }

    fn lower_arm(&mut self, arm: &Ast, branch: Branch) -> Result<Value, LowerError> {
        self.lower_float(arm)
            .map_err(|e| LowerError::MissingBranchValue {
                branch,
                source: Box::new(e),
            })
    }

    /// Lowers a `for` loop; its value is always `0.0`.
    ///
    /// If the loop variable names a live local, that slot is reused and the
    /// binding is put back afterwards. Otherwise a new slot is bound and
    /// stays visible after the loop.
    pub(super) fn lower_for(&mut self, for_loop: &ForLoop) -> Result<Value, LowerError> {
        let name = for_loop.init.name();
        let reused = self.symbols.lookup_local(name).cloned();
        trace!(name, reused = reused.is_some(), "loop variable");

        let result = self.lower_loop(for_loop, reused.clone());
        if let Some(previous) = reused {
            self.symbols.unbind_local(name, Some(previous));
        }
        result
    }

    fn lower_loop(&mut self, for_loop: &ForLoop, reused: Option<StackSlot>) -> Result<Value, LowerError> {
        self.init_loop_variable(&for_loop.init, reused)?;

        let cond_bb = self.builder.append_block("cond")?;
        let loop_bb = self.builder.create_block("loop")?;
        let merge_bb = self.builder.create_block("merge")?;
        self.builder.br(cond_bb)?;

        self.builder.position_at_end(cond_bb)?;
        let cond = self
            .lower_bool(&for_loop.cond)
            .map_err(|e| e.context("in the loop condition"))?;
        self.builder.attach_block(loop_bb)?;
        self.builder.cond_br(cond, loop_bb, merge_bb)?;

        self.builder.position_at_end(loop_bb)?;
        self.lower(&for_loop.body)
            .map_err(|e| e.context("in the loop body"))?;
        self.lower(&for_loop.step)
            .map_err(|e| e.context("in the loop step"))?;
        self.builder.br(cond_bb)?;

        self.builder.attach_block(merge_bb)?;
        self.builder.position_at_end(merge_bb)?;
        Ok(Value::const_float(0.0))
    }

    fn init_loop_variable(&mut self, init: &ForInit, reused: Option<StackSlot>) -> Result<(), LowerError> {
        match (init, reused) {
            (ForInit::Binding(binding), Some(slot)) => {
                let value = self
                    .lower_float(&binding.init)
                    .map_err(|e| e.context(format!("in the initializer of `{}`", binding.name)))?;
                self.builder.store(value, slot.value())?;
            }
            (ForInit::Assign(assignment), Some(_)) => {
                self.lower_assignment(assignment)?;
            }
            (ForInit::Binding(binding), None) => {
                let slot = self.lower_binding(binding)?;
                self.symbols.bind_local(&binding.name, slot);
            }
            (
                ForInit::Assign(Assignment {
                    name,
                    kind: AssignKind::Set(init),
                }),
                None,
            ) => {
                let slot = self.allocate_local(name, init)?;
                self.symbols.bind_local(name, slot);
            }
            (
                ForInit::Assign(Assignment {
                    name,
                    kind: AssignKind::Increment,
                }),
                None,
            ) => {
                return Err(LowerError::UndefinedVariable {
                    name: name.clone(),
                    lookup: Lookup::LocalOnly,
                })
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{Echo, LowerOptions, Lowerer};
    use crate::interp::Machine;
    use crate::module::Module;
    use crate::verify::verify_module;
    use kaleido_error::ErrorCode;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_if_diamond() {
        let lowered = lower_source("def f(x) if x < 1 then 2 else 3;");
        assert_eq!(
            function_text(&lowered, "f"),
            "define f64 @f(f64 %x) {\n\
             entry:\n  \
             %x1 = alloca f64\n  \
             store %x, %x1\n  \
             %0 = load f64, %x1\n  \
             %1 = fcmp ult %0, 1.0\n  \
             br %1, label %trueexp, label %falseexp\n\
             \n\
             trueexp:\n  \
             br label %endcond\n\
             \n\
             falseexp:\n  \
             br label %endcond\n\
             \n\
             endcond:\n  \
             %2 = phi f64 [ 2.0, %trueexp ], [ 3.0, %falseexp ]\n  \
             ret %2\n\
             }\n"
        );
    }

    #[test]
    fn test_phi_uses_actual_predecessor() {
        let lowered =
            lower_source("def f(x) if x < 1 then (if x < 0 then 1 else 2) else 3;");
        let text = function_text(&lowered, "f");
        assert!(
            text.contains("%5 = phi f64 [ %4, %endcond1 ], [ 3.0, %falseexp ]"),
            "{}",
            text
        );
        assert!(verify_module(&lowered.module).is_empty());

        let mut machine = Machine::new(&lowered.module);
        assert_eq!(machine.call("f", &[-1.0]), Ok(1.0));
        assert_eq!(machine.call("f", &[0.5]), Ok(2.0));
        assert_eq!(machine.call("f", &[4.0]), Ok(3.0));
    }

    #[test]
    fn test_failed_arm_and_condition() {
        let lowered = lower_source("def f(x) if x then y else 1; def g() if z then 1 else 2;");
        let diagnostics: Vec<_> = lowered.diagnostics.iter().collect();
        assert_eq!(diagnostics.len(), 2);

        assert_eq!(diagnostics[0].code, Some(ErrorCode::UNDEFINED_VARIABLE));
        assert!(diagnostics[0]
            .notes
            .iter()
            .any(|n| n.contains("then branch")));
        assert!(diagnostics[1]
            .notes
            .iter()
            .any(|n| n.contains("condition")));
        assert!(lowered.module.functions.is_empty());
    }

    #[test]
    fn test_loop_runs_and_is_valued_zero() {
        let lowered = lower_source(
            "def f(n) { for var i = 0, i < n, ++i in 0; i }; \
             def g(n) for var i = 0, i < n, ++i in 1;",
        );
        assert!(lowered.diagnostics.is_empty());
        assert!(verify_module(&lowered.module).is_empty());
        assert!(function_text(&lowered, "f").contains("br %2, label %loop, label %merge"));

        let mut machine = Machine::new(&lowered.module);
        assert_eq!(machine.call("f", &[5.0]), Ok(5.0));
        assert_eq!(machine.call("g", &[5.0]), Ok(0.0));
    }

    #[test]
    fn test_reused_loop_variable_is_restored() {
        let mut module = Module::new("test");
        let options = LowerOptions {
            echo: Echo::Silent,
            ..LowerOptions::default()
        };
        let mut lowerer = Lowerer::new(&mut module, &options);
        let ast = parse("def f(i) { for i = 10, i < 12, ++i in 0; i };");
        lowerer.lower(&ast).unwrap();
        assert!(lowerer.diagnostics().is_empty());
        assert_eq!(lowerer.symbols().lookup_local("i").map(|s| s.name()), Some("i1"));
        drop(lowerer);

        let mut machine = Machine::new(&module);
        assert_eq!(machine.call("f", &[0.0]), Ok(12.0));
    }

    #[test]
    fn test_fresh_loop_variable_leaks() {
        let mut module = Module::new("test");
        let options = LowerOptions {
            echo: Echo::Silent,
            ..LowerOptions::default()
        };
        let mut lowerer = Lowerer::new(&mut module, &options);
        let ast = parse("def f() { for var j = 0, j < 3, ++j in 0; j };");
        lowerer.lower(&ast).unwrap();
        assert!(lowerer.diagnostics().is_empty());
        assert!(lowerer.symbols().lookup_local("j").is_some());
    }
}
