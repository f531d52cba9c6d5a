//! Integration tests for the Kaleido programming language
//!
//! This crate provides end-to-end testing of the complete compilation pipeline:
//! Source → Lexer → Parser → IR lowering → Verifier / Machine

use kaleido_error::Diagnostics;
use kaleido_ir::interp::Machine;
use kaleido_ir::{compile as lower, Echo, LowerOptions, Module};
use kaleido_lexer::Lexer;
use kaleido_parser::parse;

/// Result of compiling a Kaleido source file
#[derive(Debug)]
pub struct CompileResult {
    /// Whether compilation succeeded without errors
    pub success: bool,
    /// Any diagnostics (errors/warnings) produced
    pub diagnostics: Diagnostics,
    /// The lowered module (empty if the front end failed)
    pub module: Module,
    /// Textual IR of the module
    pub ir: String,
    /// Everything the lowering echoed, in order
    pub echo: String,
}

/// Compiles Kaleido source code through the full pipeline
pub fn compile(source: &str) -> CompileResult {
    // Phase 1: Lexing
    let mut lexer = Lexer::new(source, 0);
    let tokens = lexer.tokenize();
    let mut diagnostics = lexer.take_diagnostics();

    // Phase 2: Parsing
    let (program, parse_diags) = parse(tokens);
    diagnostics.extend(parse_diags);
    if diagnostics.has_errors() {
        return CompileResult {
            success: false,
            diagnostics,
            module: Module::new("test"),
            ir: String::new(),
            echo: String::new(),
        };
    }

    // Phase 3: IR generation
    let (echo, sink) = Echo::buffer();
    let options = LowerOptions {
        module_name: "test".to_string(),
        echo,
    };
    let (module, lower_diags) = lower(&program, &options);
    diagnostics.extend(lower_diags);

    let ir = module.to_string();
    let echo = sink.borrow().clone();
    CompileResult {
        success: !diagnostics.has_errors(),
        diagnostics,
        module,
        ir,
        echo,
    }
}

fn describe(diagnostics: &Diagnostics) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Asserts that source code compiles without errors
pub fn assert_compiles(source: &str) -> CompileResult {
    let result = compile(source);
    if !result.success {
        panic!(
            "Expected source to compile, but got errors:\n{}",
            describe(&result.diagnostics)
        );
    }
    result
}

/// Asserts that source code fails to compile with errors
pub fn assert_compile_fails(source: &str) -> CompileResult {
    let result = compile(source);
    if result.success {
        panic!("Expected source to fail compilation, but it succeeded");
    }
    result
}

/// Asserts that source code compiles and the IR contains a specific string
pub fn assert_ir_contains(source: &str, expected: &str) {
    let result = assert_compiles(source);
    if !result.ir.contains(expected) {
        panic!(
            "Expected IR to contain '{}', but it didn't.\n\nGenerated IR:\n{}",
            expected, result.ir
        );
    }
}

/// Compiles `source` and evaluates `name(args)`
pub fn run_function(source: &str, name: &str, args: &[f64]) -> f64 {
    let result = assert_compiles(source);
    let mut machine = Machine::new(&result.module);
    match machine.call(name, args) {
        Ok(value) => value,
        Err(e) => panic!("`{}` failed at runtime: {}\n\nIR:\n{}", name, e, result.ir),
    }
}
