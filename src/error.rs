use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("{provider}: authentication failed: {message}")]
    Authentication { provider: String, message: String },
    #[error("{provider}: quota exceeded: {message}")]
    QuotaExceeded { provider: String, message: String },
    #[error("{provider}: rate limited: {message}")]
    RateLimit { provider: String, message: String },
    #[error("{provider}: rejected by content policy: {message}")]
    ContentPolicy { provider: String, message: String },
    #[error("{provider}: invalid parameter: {message}")]
    InvalidParameter { provider: String, message: String },
    #[error("{provider}: service unavailable: {message}")]
    ServiceUnavailable { provider: String, message: String },
    #[error("provider not found: {name}")]
    UnknownProvider { name: String },
    #[error("no provider available")]
    NoProviderAvailable,
    #[error("invalid capabilities for {provider}: {reason}")]
    InvalidCapabilities { provider: String, reason: String },
    #[error("invalid config: {0}")]
    Config(String),
    #[error("api error ({status}): {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RouterError>;

impl RouterError {
    /// Maps a non-success vendor response onto the error taxonomy.
    pub fn from_status(provider: &str, status: reqwest::StatusCode, body: String) -> Self {
        let provider = provider.to_string();
        match status.as_u16() {
            401 | 403 => Self::Authentication {
                provider,
                message: body,
            },
            402 => Self::QuotaExceeded {
                provider,
                message: body,
            },
            429 => Self::RateLimit {
                provider,
                message: body,
            },
            400 | 422 if mentions_content_policy(&body) => Self::ContentPolicy {
                provider,
                message: body,
            },
            400 | 422 => Self::InvalidParameter {
                provider,
                message: body,
            },
            500..=599 => Self::ServiceUnavailable {
                provider,
                message: body,
            },
            _ => Self::Api { status, body },
        }
    }

    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Authentication { provider, .. }
            | Self::QuotaExceeded { provider, .. }
            | Self::RateLimit { provider, .. }
            | Self::ContentPolicy { provider, .. }
            | Self::InvalidParameter { provider, .. }
            | Self::ServiceUnavailable { provider, .. }
            | Self::InvalidCapabilities { provider, .. } => Some(provider.as_str()),
            Self::UnknownProvider { name } => Some(name.as_str()),
            _ => None,
        }
    }
}

fn mentions_content_policy(body: &str) -> bool {
    let lowered = body.to_ascii_lowercase();
    lowered.contains("content_policy")
        || lowered.contains("content policy")
        || lowered.contains("safety")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn status_codes_map_onto_taxonomy() {
        assert!(matches!(
            RouterError::from_status("openai", StatusCode::UNAUTHORIZED, String::new()),
            RouterError::Authentication { .. }
        ));
        assert!(matches!(
            RouterError::from_status("openai", StatusCode::TOO_MANY_REQUESTS, String::new()),
            RouterError::RateLimit { .. }
        ));
        assert!(matches!(
            RouterError::from_status("openai", StatusCode::BAD_GATEWAY, String::new()),
            RouterError::ServiceUnavailable { .. }
        ));
        assert!(matches!(
            RouterError::from_status("openai", StatusCode::NOT_FOUND, String::new()),
            RouterError::Api { .. }
        ));
    }

    #[test]
    fn bad_request_mentioning_policy_is_content_policy() {
        let err = RouterError::from_status(
            "grok",
            StatusCode::BAD_REQUEST,
            r#"{"error":{"code":"content_policy_violation"}}"#.to_string(),
        );
        assert!(matches!(err, RouterError::ContentPolicy { .. }));
        assert_eq!(err.provider(), Some("grok"));

        let err = RouterError::from_status("grok", StatusCode::BAD_REQUEST, "bad size".to_string());
        assert!(matches!(err, RouterError::InvalidParameter { .. }));
    }
}
