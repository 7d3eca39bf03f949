use thiserror::Error;

/// Every failure a reconciliation pass (or startup) can end with.
///
/// All variants are fatal for the pass that produced them. Nothing is
/// retried; the next trigger starts over from live state.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("no board status mapping for source status '{0}'")]
    MappingExhausted(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        SyncError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        SyncError::Configuration(msg.into())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}
