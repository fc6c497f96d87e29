//! Restricted DAX front end: tokenizer, signature table, validation and
//! translation into metric-view expressions.

pub mod arguments;
pub mod signature;
pub mod source;
pub mod token;
pub mod translator;
pub mod validator;

use thiserror::Error;

pub use signature::{lookup, FunctionRole, FunctionSignature};
pub use source::source_tables;
pub use token::{tokenize, Token};
pub use translator::{translate, TimeShift, Translation};
pub use validator::Validator;

/// Why a single measure expression was rejected.
///
/// These are recovered per measure and never abort a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DaxError {
    #[error("invalid format: expected FUNCTION(arguments), got `{0}`")]
    InvalidFormat(String),

    #[error("unsupported function: {0}")]
    UnsupportedFunction(String),

    #[error("{function} expects {expected}, got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("invalid column reference: `{0}`")]
    InvalidColumnReference(String),

    #[error("unsupported expression: no translatable function call in `{0}`")]
    UnsupportedExpression(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("expression is {length} characters long, the limit is {limit}")]
    TooLong { length: usize, limit: usize },
}
