//! Error taxonomy of the client engine.
//!
//! The `Display` text of each variant is what ends up in a notification.

/// Rejections raised before any request is issued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("please enter a search keyword")]
    EmptyKeyword,
    #[error("please enter a link")]
    EmptyLink,
    #[error("cannot determine the source for this item")]
    UnresolvedSource,
    #[error("this action needs a specific source, \"all\" is not supported")]
    AllSourceUnsupported,
    #[error("nothing to download")]
    EmptyBatch,
    #[error("unknown login platform {0:?}")]
    UnknownPlatform(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    /// The request never produced a response (connect, timeout, reset).
    #[error("network error: {0}")]
    Transport(String),
    /// A response arrived but was not the expected envelope or payload.
    #[error("invalid response from server")]
    InvalidResponse,
    /// The envelope carried a non-zero `code`.
    #[error("{message}")]
    Api { code: i64, message: String },
    /// The file arrived but could not be stored locally.
    #[error("could not save file: {0}")]
    Save(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ClientError {
    /// Build an `Api` error, substituting a generic message when the server
    /// sent none.
    pub fn api(code: i64, message: Option<String>) -> Self {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("request failed (code: {})", code));
        Self::Api { code, message }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_message_fallback() {
        assert_eq!(
            ClientError::api(-1, Some("unknown source".into())).to_string(),
            "unknown source"
        );
        assert_eq!(
            ClientError::api(500, None).to_string(),
            "request failed (code: 500)"
        );
        assert_eq!(
            ClientError::api(7, Some("  ".into())).to_string(),
            "request failed (code: 7)"
        );
    }

    #[test]
    fn test_validation_is_transparent() {
        let err: ClientError = ValidationError::EmptyBatch.into();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "nothing to download");
    }
}
