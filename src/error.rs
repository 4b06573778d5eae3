use std::path::PathBuf;

/// Errors surfaced by the binarization core.
///
/// Nothing in the crate retries: every error reaches the caller of the
/// operation that produced it.
#[derive(Debug, thiserror::Error)]
pub enum BinarizeError {
    /// Invalid schedule kind, non-positive step count, unknown solver, ...
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Tile batch or tensor shape does not match what the operation expects.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Raised by a denoiser or initial predictor and passed through untouched.
    #[error("model invocation failed")]
    ModelInvocation(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("tensor data conversion failed: {0}")]
    TensorData(String),

    #[error("i/o error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot load checkpoint {}: {message}", path.display())]
    Checkpoint { path: PathBuf, message: String },

    #[error("image codec error on {}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: ::image::ImageError,
    },
}

impl BinarizeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    /// Wrap an arbitrary collaborator error as a model invocation failure.
    pub fn model<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::ModelInvocation(err.into())
    }
}

pub type Result<T, E = BinarizeError> = core::result::Result<T, E>;
