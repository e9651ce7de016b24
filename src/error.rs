//! Huginn error types

/// Huginn error types
#[derive(Debug, thiserror::Error)]
pub enum HuginnError {
    // Capability errors
    #[error("no execution device available for skill '{0}'")]
    NoDeviceAvailable(String),

    #[error("skill '{skill}' cannot run on device '{device}'")]
    UnsupportedDevice { skill: String, device: String },

    // Binding errors
    /// A binding created by one skill was handed to another skill's evaluate.
    #[error("binding type mismatch: expected a binding for '{expected}', got one for '{found}'")]
    BindingMismatch { expected: String, found: String },

    #[error("feature not found: {0}")]
    FeatureNotFound(String),

    /// Outputs are only readable after a successful evaluate and before the
    /// next input is bound.
    #[error("outputs unavailable while binding is {state}")]
    OutputsUnavailable { state: &'static str },

    // Input errors
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unsupported file extension '{extension}' (expected {expected})")]
    UnsupportedExtension {
        extension: String,
        expected: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Capture errors
    #[error("capture error: {0}")]
    Capture(String),

    #[error("no compatible formats available")]
    NoCompatibleFormat,

    // Model/runtime errors
    #[error("model error: {0}")]
    Model(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("operation not implemented: {0}")]
    NotImplemented(&'static str),
}

impl HuginnError {
    /// Whether a retry on a later frame could reasonably succeed.
    ///
    /// Only capture hiccups qualify; everything else is either a caller
    /// mistake or a permanent capability gap.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Capture(_))
    }

    /// Process exit code used by the console programs.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidInput(_)
            | Self::UnsupportedExtension { .. }
            | Self::FeatureNotFound(_) => 2,
            Self::Io(_) | Self::Decode(_) => 3,
            Self::NoDeviceAvailable(_) | Self::UnsupportedDevice { .. } => 4,
            Self::Model(_) | Self::Configuration(_) => 5,
            Self::Capture(_) | Self::NoCompatibleFormat => 6,
            Self::BindingMismatch { .. }
            | Self::OutputsUnavailable { .. }
            | Self::Json(_)
            | Self::Runtime(_)
            | Self::NotImplemented(_) => 1,
        }
    }
}

impl From<tokio::task::JoinError> for HuginnError {
    fn from(err: tokio::task::JoinError) -> Self {
        HuginnError::Runtime(format!("background task failed: {err}"))
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;
