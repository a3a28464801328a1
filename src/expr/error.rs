use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("syntax error in '{expr}': {message}")]
    Syntax { expr: String, message: String },

    #[error("name '{0}' is not defined")]
    Name(String),

    #[error("'{owner}' object has no attribute '{attr}'")]
    Attribute { owner: String, attr: String },

    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    Value(String),

    #[error("division by zero")]
    ZeroDivision,

    #[error("index out of range")]
    Index,

    #[error("key error: {0}")]
    Key(String),
}

impl ExprError {
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        ExprError::Type(message.into())
    }

    pub(crate) fn value_error(message: impl Into<String>) -> Self {
        ExprError::Value(message.into())
    }
}

/// Longest string or sequence an expression may build.
pub(crate) const MAX_RESULT_LEN: usize = 1 << 24;

/// Passes `len` through when it is known and within [`MAX_RESULT_LEN`].
pub(crate) fn check_result_len(len: Option<usize>, what: &str) -> Result<usize, ExprError> {
    len.filter(|len| *len <= MAX_RESULT_LEN)
        .ok_or_else(|| ExprError::value_error(format!("{what} is too large")))
}
