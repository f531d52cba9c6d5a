//! Lowering AST → IR
//!
//! A [`Lowerer`] walks the tree with one exhaustive `match` and appends
//! instructions through an [`IrBuilder`]. Every construct yields a
//! [`Value`] or a [`LowerError`]; failures of top-level items become
//! diagnostics and lowering moves on to the next item.
//!
//! Mutable variables (parameters, `var` bindings, loop variables) live in
//! stack slots. Values are coerced where they are consumed: comparisons
//! produce `i1` and assignments produce the address they wrote, and both
//! are turned back into `f64` by [`Lowerer::float_value`].

mod control;
mod decl;
mod error;
mod expr;
mod symbols;

pub use error::{Branch, Lookup, LowerError};
pub use symbols::SymbolTable;

use crate::builder::IrBuilder;
use crate::instruction::{CompareOp, Value};
use crate::module::Module;
use crate::types::IrType;
use kaleido_error::Diagnostics;
use kaleido_parser::Ast;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

/// Where the textual form of each finished declaration is written
#[derive(Debug, Clone, Default)]
pub enum Echo {
    #[default]
    Stderr,
    Silent,
    /// Appends to a shared string, for tests and embedding
    Buffer(Rc<RefCell<String>>),
}

impl Echo {
    pub fn buffer() -> (Self, Rc<RefCell<String>>) {
        let sink = Rc::new(RefCell::new(String::new()));
        (Echo::Buffer(Rc::clone(&sink)), sink)
    }

    fn write(&self, text: &str) {
        match self {
            Echo::Stderr => eprint!("{}", text),
            Echo::Silent => {}
            Echo::Buffer(sink) => sink.borrow_mut().push_str(text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LowerOptions {
    pub module_name: String,
    pub echo: Echo,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            module_name: "kaleido".to_string(),
            echo: Echo::default(),
        }
    }
}

/// Lowering context for one compilation unit
pub struct Lowerer<'m> {
    builder: IrBuilder<'m>,
    symbols: SymbolTable,
    echo: Echo,
    diagnostics: Diagnostics,
}

impl<'m> Lowerer<'m> {
    pub fn new(module: &'m mut Module, options: &LowerOptions) -> Self {
        Self {
            builder: IrBuilder::new(module),
            symbols: SymbolTable::new(),
            echo: options.echo.clone(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn module(&self) -> &Module {
        self.builder.module()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }

    /// Lowers any node, returning its value
    pub fn lower(&mut self, ast: &Ast) -> Result<Value, LowerError> {
        match ast {
            Ast::Sequence(items) => Ok(self.lower_sequence(items)),
            Ast::Number(value) => Ok(Value::const_float(*value)),
            Ast::Variable(name) => self.lower_variable(name),
            Ast::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs.as_deref(), rhs),
            Ast::Logical { op, lhs, rhs } => self.lower_logical(*op, lhs.as_deref(), rhs),
            Ast::Call { callee, args } => self.lower_call(callee, args),
            Ast::If {
                cond,
                then,
                otherwise,
            } => self.lower_if(cond, then, otherwise),
            Ast::Block { bindings, body } => self.lower_block(bindings, body),
            Ast::VarBinding(binding) => Ok(self.lower_binding(binding)?.value()),
            Ast::GlobalVar(global) => self.lower_global(global),
            Ast::Prototype(proto) => self.lower_prototype(proto, true),
            Ast::Function(def) => self.lower_function(def),
            Ast::Statement { first, rest } => self.lower_statement(first, rest.as_deref()),
            Ast::Assignment(assignment) => self.lower_assignment(assignment),
            Ast::For(for_loop) => self.lower_for(for_loop),
        }
    }

    /// Lowers each item in turn. A failing item is reported and skipped.
    fn lower_sequence(&mut self, items: &[Ast]) -> Value {
        let mut last = Value::Void;
        for item in items {
            debug!(kind = item.kind_name(), "lowering top-level item");
            match self.lower(item) {
                Ok(value) => last = value,
                Err(err) => self.report(item, err),
            }
        }
        last
    }

    fn report(&mut self, item: &Ast, err: LowerError) {
        warn!(kind = item.kind_name(), error = %err, "item discarded");
        self.diagnostics.push(err.into_diagnostic(item.span()));
    }

    fn emit_text(&self, text: &str) {
        self.echo.write(text);
    }

    /// Reads `value` as a float: truth values become 0.0/1.0 and
    /// addresses are loaded
    pub(crate) fn float_value(&mut self, value: Value) -> Result<Value, LowerError> {
        let value = match self.builder.value_type(&value)? {
            IrType::F64 => value,
            IrType::Bool => self.builder.bool_to_float(value)?,
            IrType::Ptr => self.builder.load(value)?,
        };
        Ok(value)
    }

    /// Reads `value` as a truth value: floats are true when non-zero
    pub(crate) fn bool_value(&mut self, value: Value) -> Result<Value, LowerError> {
        if self.builder.value_type(&value)? == IrType::Bool {
            return Ok(value);
        }
        let value = self.float_value(value)?;
        Ok(self
            .builder
            .compare(CompareOp::One, value, Value::const_float(0.0))?)
    }

    /// Lowers `ast` and reads the result as a float
    pub(crate) fn lower_float(&mut self, ast: &Ast) -> Result<Value, LowerError> {
        let value = self.lower(ast)?;
        self.float_value(value)
    }

    pub(crate) fn lower_bool(&mut self, ast: &Ast) -> Result<Value, LowerError> {
        let value = self.lower(ast)?;
        self.bool_value(value)
    }
}

/// Lowers a whole program into `module`.
///
/// Returns the diagnostics of every item that was rejected; the rest of
/// the program is still lowered.
pub fn generate(ast: &Ast, module: &mut Module, options: &LowerOptions) -> Diagnostics {
    let mut lowerer = Lowerer::new(module, options);
    if let Err(err) = lowerer.lower(ast) {
        lowerer.report(ast, err);
    }
    lowerer.into_diagnostics()
}

/// Lowers a program into a fresh module named after `options.module_name`
pub fn compile(ast: &Ast, options: &LowerOptions) -> (Module, Diagnostics) {
    let mut module = Module::new(options.module_name.clone());
    let diagnostics = generate(ast, &mut module, options);
    (module, diagnostics)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) struct Lowered {
        pub module: Module,
        pub diagnostics: Diagnostics,
        pub echo: String,
    }

    pub(crate) fn parse(source: &str) -> Ast {
        let (tokens, mut diagnostics) = kaleido_lexer::tokenize(source, 0);
        let (ast, parse_diagnostics) = kaleido_parser::parse(tokens);
        diagnostics.extend(parse_diagnostics);
        assert!(
            diagnostics.is_empty(),
            "parse errors: {:?}",
            diagnostics.iter().map(|d| d.to_string()).collect::<Vec<_>>()
        );
        ast
    }

    pub(crate) fn lower_source(source: &str) -> Lowered {
        let ast = parse(source);
        let (echo, sink) = Echo::buffer();
        let options = LowerOptions {
            module_name: "test".into(),
            echo,
        };
        let (module, diagnostics) = compile(&ast, &options);
        let echo = sink.borrow().clone();
        Lowered {
            module,
            diagnostics,
            echo,
        }
    }

    pub(crate) fn function_text(lowered: &Lowered, name: &str) -> String {
        lowered
            .module
            .get_function(name)
            .map(|f| f.to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::verify::verify_module;
    use kaleido_error::ErrorCode;

    #[test]
    fn test_failed_items_do_not_stop_lowering() {
        let lowered = lower_source("def bad() nope; def good(x) x + 1;");

        assert_eq!(lowered.diagnostics.error_count(), 1);
        let diagnostic = lowered.diagnostics.iter().next().unwrap();
        assert_eq!(diagnostic.code, Some(ErrorCode::UNDEFINED_VARIABLE));
        assert!(!diagnostic.labels.is_empty());

        assert!(lowered.module.get_function("bad").is_none());
        assert!(lowered.module.get_function("good").is_some());
        assert!(verify_module(&lowered.module).is_empty());
    }

    #[test]
    fn test_silent_echo() {
        let ast = parse("extern sin(x);");
        let options = LowerOptions {
            module_name: "quiet".into(),
            echo: Echo::Silent,
        };
        let (module, diagnostics) = compile(&ast, &options);
        assert!(diagnostics.is_empty());
        assert_eq!(module.name, "quiet");
        assert!(module.get_function("sin").is_some());
    }

    #[test]
    fn test_coercions_at_use_sites() {
        let lowered = lower_source("def f(x) (x < 1) + 2;");
        let text = function_text(&lowered, "f");
        assert!(text.contains("fcmp ult"), "{}", text);
        assert!(text.contains("uitofp"), "{}", text);
        assert!(verify_module(&lowered.module).is_empty());
    }
}
