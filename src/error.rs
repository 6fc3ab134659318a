/// Error returned when a log entry cannot be turned into JSON.
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    /// The JSON serializer rejected a field value.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("invalid timestamp format: {0:?}")]
    TimestampFormat(String),
}

/// Error returned when installing the global subscriber.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("failed to set global subscriber: {0}")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}
