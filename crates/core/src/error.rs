/// Result alias that carries the custom [`DrumProError`] type.
pub type Result<T> = std::result::Result<T, DrumProError>;

/// Common error type for the core crate.
///
/// Every variant is recoverable. Load and save failures are caught by the
/// [`Controller`](crate::Controller) and surfaced as events rather than
/// propagated to the caller.
#[derive(Debug, thiserror::Error)]
pub enum DrumProError {
    /// A preset asset could not be fetched (missing file, 404, network failure).
    #[error("asset not found: {0}")]
    AssetNotFound(String),
    /// The bytes are not decodable audio.
    #[error("could not decode audio: {0}")]
    Decode(String),
    /// The track library could not be opened, read or written.
    #[error("library error: {0}")]
    Persistence(#[from] rusqlite::Error),
    /// An upload was rejected before reaching the library.
    #[error("invalid input: {0}")]
    Validation(String),
    /// The audio output rejected a request.
    #[error("audio output error: {0}")]
    Audio(String),
    /// Malformed configuration file.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Message(String),
}

impl DrumProError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<&str> for DrumProError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for DrumProError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
