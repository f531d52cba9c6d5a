//! AST - Abstract Syntax Tree for the Kaleido language
//!
//! A program is a [`Ast::Sequence`] of top-level items. Every node owns
//! its children outright; there is no sharing between subtrees. Only the
//! declarations carry spans, because those are the units that lowering
//! accepts or rejects as a whole.

use kaleido_error::{Span, Spanned};
use std::fmt;

/// Arithmetic and comparison operators over floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-` (binary subtraction, or negation when there is no left operand)
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `<`
    Lt,
    /// `==`
    Eq,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Lt => "<",
            BinaryOp::Eq => "==",
        }
    }
}

/// Boolean connectives. `Not` is the only one without a left operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

impl LogicalOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
            LogicalOp::Not => "not",
        }
    }
}

/// `name = init`, as found in `var` blocks and `for var` headers.
#[derive(Debug, Clone, PartialEq)]
pub struct VarBinding {
    pub name: String,
    pub init: Box<Ast>,
}

/// `global name`
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVar {
    pub name: String,
    pub span: Span,
}

/// `name(params)`; every parameter and the result are floats.
#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub name: String,
    pub params: Vec<String>,
    pub span: Span,
}

/// `def proto body`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub proto: Prototype,
    pub body: Box<Ast>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignKind {
    /// `name = value`
    Set(Box<Ast>),
    /// `++name`
    Increment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub kind: AssignKind,
}

/// How a `for` header introduces its loop variable.
#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    /// `for var i = 0, ...`
    Binding(VarBinding),
    /// `for i = 0, ...`
    Assign(Assignment),
}

impl ForInit {
    pub fn name(&self) -> &str {
        match self {
            ForInit::Binding(binding) => &binding.name,
            ForInit::Assign(assignment) => &assignment.name,
        }
    }
}

/// `for init, cond, step in body`
#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub init: ForInit,
    pub cond: Box<Ast>,
    pub step: Box<Ast>,
    pub body: Box<Ast>,
}

/// Every construct of the language.
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    /// Top-level items, in source order
    Sequence(Vec<Ast>),
    Number(f64),
    Variable(String),
    Binary {
        op: BinaryOp,
        lhs: Option<Box<Ast>>,
        rhs: Box<Ast>,
    },
    Logical {
        op: LogicalOp,
        lhs: Option<Box<Ast>>,
        rhs: Box<Ast>,
    },
    Call {
        callee: String,
        args: Vec<Ast>,
    },
    /// `if cond then a else b`; both arms are mandatory
    If {
        cond: Box<Ast>,
        then: Box<Ast>,
        otherwise: Box<Ast>,
    },
    /// `var a = 1, b = a in body`
    Block {
        bindings: Vec<VarBinding>,
        body: Box<Ast>,
    },
    VarBinding(VarBinding),
    GlobalVar(GlobalVar),
    Prototype(Prototype),
    Function(FunctionDef),
    /// `{ first; rest... }`, valued by its last expression
    Statement {
        first: Box<Ast>,
        rest: Option<Box<Ast>>,
    },
    Assignment(Assignment),
    For(ForLoop),
}

/// The lexical value attached to literal and named nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum LexVal {
    Number(f64),
    Ident(String),
}

impl Ast {
    pub fn lex_val(&self) -> Option<LexVal> {
        let name: &str = match self {
            Ast::Number(value) => return Some(LexVal::Number(*value)),
            Ast::Variable(name) => name,
            Ast::Call { callee, .. } => callee,
            Ast::VarBinding(binding) => &binding.name,
            Ast::GlobalVar(global) => &global.name,
            Ast::Prototype(proto) => &proto.name,
            Ast::Function(def) => &def.proto.name,
            Ast::Assignment(assignment) => &assignment.name,
            Ast::For(for_loop) => for_loop.init.name(),
            _ => return None,
        };
        Some(LexVal::Ident(name.to_string()))
    }

    /// Builds a `Statement` chain out of a non-empty list of expressions.
    pub fn statements(mut exprs: Vec<Ast>) -> Option<Ast> {
        let mut chain: Option<Ast> = None;
        while let Some(expr) = exprs.pop() {
            chain = Some(Ast::Statement {
                first: Box::new(expr),
                rest: chain.map(Box::new),
            });
        }
        chain
    }

    /// Name of the node kind, for logs and error context.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Ast::Sequence(_) => "sequence",
            Ast::Number(_) => "number",
            Ast::Variable(_) => "variable",
            Ast::Binary { .. } => "binary expression",
            Ast::Logical { .. } => "logical expression",
            Ast::Call { .. } => "call",
            Ast::If { .. } => "if expression",
            Ast::Block { .. } => "var block",
            Ast::VarBinding(_) => "binding",
            Ast::GlobalVar(_) => "global",
            Ast::Prototype(_) => "prototype",
            Ast::Function(_) => "function",
            Ast::Statement { .. } => "statement",
            Ast::Assignment(_) => "assignment",
            Ast::For(_) => "for loop",
        }
    }

    /// Span of a top-level declaration.
    pub fn span(&self) -> Option<Span> {
        match self {
            Ast::GlobalVar(global) => Some(global.span),
            Ast::Prototype(proto) => Some(proto.span),
            Ast::Function(def) => Some(def.span),
            _ => None,
        }
    }
}

impl Spanned for Prototype {
    fn span(&self) -> Span {
        self.span
    }
}

impl Spanned for FunctionDef {
    fn span(&self) -> Span {
        self.span
    }
}

impl Spanned for GlobalVar {
    fn span(&self) -> Span {
        self.span
    }
}

// S-expression rendering, used by `kaleido parse` and parser tests.

fn write_binding(f: &mut fmt::Formatter<'_>, binding: &VarBinding) -> fmt::Result {
    write!(f, "({} {})", binding.name, binding.init)
}

impl fmt::Display for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ast::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Ast::Number(value) => write!(f, "{}", value),
            Ast::Variable(name) => f.write_str(name),
            Ast::Binary { op, lhs, rhs } => match lhs {
                Some(lhs) => write!(f, "({} {} {})", op.symbol(), lhs, rhs),
                None => write!(f, "({} {})", op.symbol(), rhs),
            },
            Ast::Logical { op, lhs, rhs } => match lhs {
                Some(lhs) => write!(f, "({} {} {})", op.symbol(), lhs, rhs),
                None => write!(f, "({} {})", op.symbol(), rhs),
            },
            Ast::Call { callee, args } => {
                write!(f, "(call {}", callee)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                f.write_str(")")
            }
            Ast::If {
                cond,
                then,
                otherwise,
            } => write!(f, "(if {} {} {})", cond, then, otherwise),
            Ast::Block { bindings, body } => {
                f.write_str("(var (")?;
                for (i, binding) in bindings.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write_binding(f, binding)?;
                }
                write!(f, ") {})", body)
            }
            Ast::VarBinding(binding) => write_binding(f, binding),
            Ast::GlobalVar(global) => write!(f, "(global {})", global.name),
            Ast::Prototype(proto) => {
                write!(f, "(extern {} ({}))", proto.name, proto.params.join(" "))
            }
            Ast::Function(def) => write!(
                f,
                "(def {} ({}) {})",
                def.proto.name,
                def.proto.params.join(" "),
                def.body
            ),
            Ast::Statement { first, rest } => {
                write!(f, "(seq {}", first)?;
                let mut next = rest.as_deref();
                while let Some(node) = next {
                    match node {
                        Ast::Statement { first, rest } => {
                            write!(f, " {}", first)?;
                            next = rest.as_deref();
                        }
                        other => {
                            write!(f, " {}", other)?;
                            next = None;
                        }
                    }
                }
                f.write_str(")")
            }
            Ast::Assignment(assignment) => match &assignment.kind {
                AssignKind::Set(value) => write!(f, "(= {} {})", assignment.name, value),
                AssignKind::Increment => write!(f, "(++ {})", assignment.name),
            },
            Ast::For(for_loop) => {
                f.write_str("(for ")?;
                match &for_loop.init {
                    ForInit::Binding(binding) => {
                        f.write_str("var ")?;
                        write_binding(f, binding)?;
                    }
                    ForInit::Assign(assignment) => {
                        write!(f, "{}", Ast::Assignment(assignment.clone()))?;
                    }
                }
                write!(
                    f,
                    " {} {} {})",
                    for_loop.cond, for_loop.step, for_loop.body
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Ast {
        Ast::Variable(name.into())
    }

    #[test]
    fn test_statement_chain_is_right_nested() {
        let chain = Ast::statements(vec![var("a"), var("b"), var("c")]).unwrap();
        match &chain {
            Ast::Statement { first, rest } => {
                assert_eq!(**first, var("a"));
                let rest = rest.as_deref().unwrap();
                assert!(matches!(rest, Ast::Statement { rest: Some(_), .. }));
            }
            other => panic!("expected statement, got {:?}", other),
        }
        assert_eq!(chain.to_string(), "(seq a b c)");
        assert!(Ast::statements(Vec::new()).is_none());
    }

    #[test]
    fn test_lex_val() {
        assert_eq!(Ast::Number(2.5).lex_val(), Some(LexVal::Number(2.5)));
        assert_eq!(var("x").lex_val(), Some(LexVal::Ident("x".into())));
        let call = Ast::Call {
            callee: "f".into(),
            args: vec![],
        };
        assert_eq!(call.lex_val(), Some(LexVal::Ident("f".into())));
        let neg = Ast::Binary {
            op: BinaryOp::Sub,
            lhs: None,
            rhs: Box::new(var("x")),
        };
        assert_eq!(neg.lex_val(), None);
        assert_eq!(neg.to_string(), "(- x)");
    }

    #[test]
    fn test_lex_val_of_for_names_loop_variable() {
        let for_loop = Ast::For(ForLoop {
            init: ForInit::Assign(Assignment {
                name: "i".into(),
                kind: AssignKind::Set(Box::new(Ast::Number(0.0))),
            }),
            cond: Box::new(var("i")),
            step: Box::new(Ast::Assignment(Assignment {
                name: "i".into(),
                kind: AssignKind::Increment,
            })),
            body: Box::new(Ast::Number(0.0)),
        });
        assert_eq!(for_loop.lex_val(), Some(LexVal::Ident("i".to_string())));

        let binding = Ast::VarBinding(VarBinding {
            name: "v".into(),
            init: Box::new(Ast::Number(1.0)),
        });
        assert_eq!(binding.lex_val(), Some(LexVal::Ident("v".to_string())));
    }
}
