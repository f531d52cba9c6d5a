//! kaleido-ir - Intermediate Representation of the Kaleido language
//!
//! The IR is a small LLVM-like SSA form:
//! - every value is an `f64`, a truth value (`i1`) or an address
//! - mutable variables live in stack slots allocated in the entry block
//! - control flow is explicit: basic blocks, branches and `phi` merges
//!
//! # Architecture
//!
//! ```text
//! AST (kaleido-parser)
//!         ↓
//!    [Lowering]  ── echo of each finished declaration
//!         ↓
//!   IR Module
//!   ├── Globals
//!   └── Functions
//!       └── Basic Blocks
//!           └── Instructions
//!         ↓
//!   [Verifier] / [Machine]
//! ```
//!
//! # Example
//!
//! ```rust
//! use kaleido_ir::{compile, interp::Machine, Echo, LowerOptions};
//!
//! let (tokens, _) = kaleido_lexer::tokenize("def f(x, y): x + y * 2;", 0);
//! let (ast, _) = kaleido_parser::parse(tokens);
//! let options = LowerOptions { echo: Echo::Silent, ..LowerOptions::default() };
//! let (module, diagnostics) = compile(&ast, &options);
//! assert!(diagnostics.is_empty());
//!
//! let mut machine = Machine::new(&module);
//! assert_eq!(machine.call("f", &[3.0, 4.0]), Ok(11.0));
//! ```

pub mod builder;
pub mod instruction;
pub mod interp;
pub mod lower;
pub mod module;
pub mod types;
pub mod verify;

pub use builder::{InsertPoint, IrBuilder, IrError};
pub use instruction::{BinaryOp, CompareOp, Instruction, LogicalOp, StackSlot, Value};
pub use lower::{compile, generate, Echo, LowerError, LowerOptions, Lowerer};
pub use module::{BasicBlock, BlockId, Function, Global, Module};
pub use types::IrType;
pub use verify::{verify_function, verify_module, VerifyError};
