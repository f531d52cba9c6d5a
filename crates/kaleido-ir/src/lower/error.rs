//! Lowering failures and their conversion to diagnostics

use crate::builder::IrError;
use kaleido_error::{Diagnostic, ErrorCode, Span};
use std::fmt;
use thiserror::Error;

/// Which namespaces a failed name lookup searched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Only the function's local bindings (`++x`)
    LocalOnly,
    LocalAndGlobal,
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::LocalOnly => write!(f, "local"),
            Lookup::LocalAndGlobal => write!(f, "local or global"),
        }
    }
}

/// Arm of an `if` expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Then,
    Else,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Then => write!(f, "then"),
            Branch::Else => write!(f, "else"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LowerError {
    #[error("unknown variable name: `{name}` is not a {lookup} variable")]
    UndefinedVariable { name: String, lookup: Lookup },

    #[error("unknown function referenced: `{name}`")]
    UndefinedFunction { name: String },

    #[error("`{callee}` takes {expected} arguments but {found} were supplied")]
    ArgumentCountMismatch {
        callee: String,
        expected: usize,
        found: usize,
    },

    #[error("the condition of this `if` has no value")]
    MissingCondition { source: Box<LowerError> },

    #[error("the {branch} branch of this `if` has no value")]
    MissingBranchValue {
        branch: Branch,
        source: Box<LowerError>,
    },

    #[error("operator `{operator}` is not defined for this number of operands")]
    UndefinedOperator { operator: String },

    #[error("function `{name}` cannot be redefined")]
    RedefinedFunction { name: String },

    #[error("global `{name}` cannot be redefined")]
    RedefinedGlobal { name: String },

    #[error("`{name}` cannot be defined inside another function")]
    NestedFunction { name: String },

    #[error("{context}")]
    Propagated {
        context: String,
        source: Box<LowerError>,
    },

    #[error("IR builder error: {0}")]
    Backend(#[from] IrError),
}

impl LowerError {
    /// Wraps `self` as the cause of a failure in an enclosing construct
    pub fn context(self, context: impl Into<String>) -> Self {
        LowerError::Propagated {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The wrapped cause, if this error only reports that a child failed
    pub fn cause(&self) -> Option<&LowerError> {
        match self {
            LowerError::MissingCondition { source }
            | LowerError::MissingBranchValue { source, .. }
            | LowerError::Propagated { source, .. } => Some(source),
            _ => None,
        }
    }

    /// The innermost error in the chain
    pub fn root(&self) -> &LowerError {
        let mut current = self;
        while let Some(cause) = current.cause() {
            current = cause;
        }
        current
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            LowerError::UndefinedVariable {
                lookup: Lookup::LocalOnly,
                ..
            } => ErrorCode::UNDEFINED_LOCAL,
            LowerError::UndefinedVariable { .. } => ErrorCode::UNDEFINED_VARIABLE,
            LowerError::UndefinedFunction { .. } => ErrorCode::UNDEFINED_FUNCTION,
            LowerError::ArgumentCountMismatch { .. } => ErrorCode::ARGUMENT_COUNT,
            LowerError::MissingCondition { .. } => ErrorCode::MISSING_CONDITION,
            LowerError::MissingBranchValue { .. } => ErrorCode::MISSING_BRANCH_VALUE,
            LowerError::UndefinedOperator { .. } => ErrorCode::UNDEFINED_OPERATOR,
            LowerError::RedefinedFunction { .. } | LowerError::NestedFunction { .. } => {
                ErrorCode::REDEFINED_FUNCTION
            }
            LowerError::RedefinedGlobal { .. } => ErrorCode::REDEFINED_GLOBAL,
            LowerError::Propagated { source, .. } => source.code(),
            LowerError::Backend(_) => ErrorCode::BACKEND,
        }
    }

    /// Converts the error into a diagnostic.
    ///
    /// The headline is the root cause; each enclosing construct that was
    /// abandoned because of it becomes a note, outermost first.
    pub fn into_diagnostic(self, span: Option<Span>) -> Diagnostic {
        let root = self.root();
        let mut diagnostic = Diagnostic::error(root.to_string()).with_code(root.code());

        if let Some(span) = span {
            diagnostic = diagnostic.with_label(span, "while lowering this item");
        }

        let mut current = &self;
        while let Some(cause) = current.cause() {
            diagnostic = diagnostic.with_note(current.to_string());
            current = cause;
        }

        match root {
            LowerError::UndefinedFunction { name } => diagnostic.with_help(format!(
                "declare it first, e.g. `extern {}(x)`",
                name
            )),
            LowerError::UndefinedVariable {
                lookup: Lookup::LocalOnly,
                ..
            } => diagnostic.with_help("`++` only applies to parameters and `var` bindings"),
            _ => diagnostic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_and_notes() {
        let err = LowerError::UndefinedFunction { name: "foo".into() }
            .context("in argument 1 of `bar`");
        let err = LowerError::MissingBranchValue {
            branch: Branch::Else,
            source: Box::new(err),
        };

        assert_eq!(err.code(), ErrorCode::MISSING_BRANCH_VALUE);
        assert_eq!(err.root().code(), ErrorCode::UNDEFINED_FUNCTION);

        let diagnostic = err.into_diagnostic(None);
        assert_eq!(diagnostic.code, Some(ErrorCode::UNDEFINED_FUNCTION));
        assert_eq!(diagnostic.message, "unknown function referenced: `foo`");
        assert_eq!(
            diagnostic.notes,
            vec![
                "the else branch of this `if` has no value".to_string(),
                "in argument 1 of `bar`".to_string(),
            ]
        );
        assert_eq!(diagnostic.help.len(), 1);
    }

    #[test]
    fn test_lookup_codes() {
        let local = LowerError::UndefinedVariable {
            name: "i".into(),
            lookup: Lookup::LocalOnly,
        };
        assert_eq!(local.code(), ErrorCode::UNDEFINED_LOCAL);
        assert_eq!(
            local.to_string(),
            "unknown variable name: `i` is not a local variable"
        );

        let any = LowerError::UndefinedVariable {
            name: "y".into(),
            lookup: Lookup::LocalAndGlobal,
        };
        assert_eq!(any.code(), ErrorCode::UNDEFINED_VARIABLE);
    }
}
