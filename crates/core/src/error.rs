use std::time::Duration;

/// Result alias that carries the custom [`ShowError`] type.
pub type Result<T> = std::result::Result<T, ShowError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum ShowError {
    /// A layer was configured with a minimum rotation interval larger than
    /// its maximum.
    #[error("layer `{layer}` has interval_min {min:?} greater than interval_max {max:?}")]
    InvalidInterval {
        layer: String,
        min: Duration,
        max: Duration,
    },
    /// A scheduler cannot be built over a catalog with no scenes.
    #[error("layer `{0}` has no registered scenes")]
    EmptyCatalog(String),
    /// A scene id or name that the layer's catalog does not know about.
    #[error("layer `{layer}` has no scene `{scene}`")]
    UnknownScene { layer: String, scene: String },
    /// A layer name or id that the show does not know about.
    #[error("unknown layer `{0}`")]
    UnknownLayer(String),
    /// Configuration values that are structurally valid but unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Free-form message for failures without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration or export (de)serialisation failures.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// WAV decoding failures.
    #[error("{0}")]
    Wav(#[from] hound::Error),
}

impl ShowError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Returns `true` for errors raised while validating configuration.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidInterval { .. }
                | Self::EmptyCatalog(_)
                | Self::UnknownScene { .. }
                | Self::UnknownLayer(_)
                | Self::InvalidConfig(_)
        )
    }
}

impl From<&str> for ShowError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for ShowError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
