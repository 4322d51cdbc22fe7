//! Engine errors.

use smol_str::SmolStr;
use thiserror::Error;

/// Failures of the instrumentation transform.
///
/// These abort loading of the affected unit and are not retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// The source failed to parse.
    #[error("{0}")]
    Syntax(#[from] stride_syntax::ParseError),

    /// A syntactic form the transform does not support.
    #[error("unsupported syntax at {line}:{column}: {what}")]
    Unsupported {
        /// Description of the unsupported form.
        what: SmolStr,
        /// 1-based line.
        line: u32,
        /// 0-based column.
        column: u32,
    },

    /// A precompiled payload that could not be decoded.
    #[error("invalid precompiled payload: {0}")]
    InvalidPayload(SmolStr),

    /// The environment self-check failed at engine construction; every load
    /// fails fast afterwards.
    #[error("environment unsupported")]
    EnvironmentUnsupported,
}
