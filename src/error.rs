//! Error types for voice-clip-rs.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Candle tensor/model error.
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),

    /// A token id or position fell outside its embedding table.
    #[error("invalid index: {table} lookup of {index} outside [0, {size})")]
    InvalidIndex {
        table: &'static str,
        index: i64,
        size: usize,
    },

    /// Mismatched batch sizes, sequence lengths or ranks between inputs.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A text mask row with no real positions; mean pooling would divide by zero.
    #[error("degenerate mask: example {example} has no unmasked positions")]
    DegenerateMask { example: usize },

    /// Invalid configuration.
    #[error("config: {0}")]
    Config(String),

    /// Registry lookup failed.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
