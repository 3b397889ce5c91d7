//! Error types for the expression engine and the template compiler.

use thiserror::Error;

/// Failures while turning expression text into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    #[error("unterminated string literal starting at {position}")]
    UnterminatedString { position: usize },

    #[error("unexpected character {found:?} at {position}")]
    UnexpectedChar { found: char, position: usize },

    #[error("malformed number literal at {position}")]
    MalformedNumber { position: usize },

    #[error("invalid escape sequence at {position}")]
    InvalidEscape { position: usize },
}

impl TokenizeError {
    pub fn position(&self) -> usize {
        match self {
            Self::UnterminatedString { position }
            | Self::UnexpectedChar { position, .. }
            | Self::MalformedNumber { position }
            | Self::InvalidEscape { position } => *position,
        }
    }
}

/// Failures while building an instruction stream from tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),

    #[error("expected {expected} at {position}, found {found}")]
    Expected {
        expected: String,
        found: String,
        position: usize,
    },

    #[error("unexpected {found} at {position}")]
    Unexpected { found: String, position: usize },

    #[error("operator {operator:?} at {position} is missing its left operand")]
    MissingOperand { operator: String, position: usize },

    #[error("trailing input {found} at {position}")]
    TrailingInput { found: String, position: usize },

    #[error("expression nesting exceeds {max} levels at {position}")]
    TooDeep { max: usize, position: usize },
}

/// Accepted argument counts for a callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

/// Failures while running an instruction stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("variable {0:?} is not bound")]
    UnboundVariable(String),

    #[error("unknown function {0:?}")]
    UnknownFunction(String),

    #[error("unknown operator {0:?}")]
    UnknownOperator(String),

    #[error("{name} expects {expected} arguments, got {found}")]
    Arity {
        name: String,
        expected: Arity,
        found: usize,
    },

    #[error("{0} is not callable")]
    NotCallable(String),

    #[error("{operator}: {message}")]
    Type { operator: String, message: String },

    #[error("no member {0:?}")]
    MissingMember(String),

    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("evaluation nesting exceeds {0} levels")]
    TooDeep(usize),

    /// The instruction stream left the value stack in an impossible state.
    /// Streams produced by the parser never do this.
    #[error("corrupt instruction stream: {0}")]
    Internal(String),
}

impl EvalError {
    pub(crate) fn type_error(operator: &str, message: impl Into<String>) -> Self {
        EvalError::Type {
            operator: operator.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    #[error("{0:?} is not a hex colour")]
    InvalidHex(String),
}

/// Structural problems in a template's directive syntax.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unbalanced {marker} at {position}")]
    Unbalanced { marker: &'static str, position: usize },

    #[error("malformed directive at {position}: {reason}")]
    MalformedDirective { position: usize, reason: String },

    #[error("conditional blocks nest deeper than {0} levels")]
    TooDeep(usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
