use thiserror::Error;

/// Failures callers may want to tell apart. They travel inside `anyhow::Error`
/// and can be recovered with `downcast_ref::<DocQaError>()`.
#[derive(Error, Debug)]
pub enum DocQaError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("{format} support not enabled. Build with --features {feature}")]
    FeatureDisabled {
        format: &'static str,
        feature: &'static str,
    },

    #[error("Query cannot be empty")]
    EmptyQuery,

    #[error("{service} returned {status}: {body}")]
    Backend {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Vector dimension mismatch: store holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),
}
