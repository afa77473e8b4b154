use thiserror::Error;

pub type IsoklinResult<T> = Result<T, IsoklinError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IsoklinError {
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("Unknown variable or parameter: {0}")]
    UnknownSymbol(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("No explicit solution for the derivative in `{equation}`: {reason}")]
    UnsolvableEquation { equation: String, reason: String },

    #[error("Cannot solve `{equation}` for the derivative: {reason}")]
    UnsupportedEquation { equation: String, reason: String },

    #[error("Invalid configuration: {what}")]
    InvalidConfig { what: String },

    #[error("Rendering failed: {0}")]
    Render(String),
}

impl IsoklinError {
    pub(crate) fn invalid_config(what: impl Into<String>) -> Self {
        Self::InvalidConfig { what: what.into() }
    }
}
