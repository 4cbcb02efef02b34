//! Error types for the Relay services.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while preparing the relay to run.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or inconsistent settings
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for [`crate::Config`]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True for configuration problems, including wrapped ones.
    pub fn is_config(&self) -> bool {
        match self {
            Self::Config(_) => true,
            Self::WithContext { source, .. } => source.is_config(),
            Self::Io(_) | Self::Json(_) => false,
        }
    }
}

/// Attach a message to any error convertible into [`Error`].
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}
