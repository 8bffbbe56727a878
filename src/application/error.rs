use thiserror::Error;

use crate::{
    application::content::ContentError, config::LoadError, infra::error::InfraError,
    purge::DispatchError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_is_prefixed() {
        let err = AppError::validation("url has no host");
        assert_eq!(err.to_string(), "validation failed: url has no host");
    }

    #[test]
    fn infra_errors_are_transparent() {
        let err = AppError::from(InfraError::Telemetry("already set".into()));
        assert_eq!(err.to_string(), "tracing subscriber not installed: already set");
    }
}
