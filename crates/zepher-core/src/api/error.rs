use thiserror::Error;

/// Service error code that signals an expired or revoked session.
pub const SESSION_EXPIRED_CODE: i64 = 410;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Session expired ({code}): {message}")]
    SessionExpired { code: i64, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid request URI {uri}: {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session cookie error: {0}")]
    Session(String),

    #[error("Failed to export environment to {path}: {source}")]
    Export {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum length for response bodies quoted in log lines
const MAX_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Service-reported code, for errors that carry one.
    pub fn code(&self) -> Option<i64> {
        match self {
            ApiError::SessionExpired { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True when the caller must obtain a fresh session before retrying.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body_short() {
        assert_eq!(ApiError::truncate_body("{}"), "{}");
    }

    #[test]
    fn test_truncate_body_long() {
        let body = "x".repeat(600);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.starts_with(&"x".repeat(500)));
        assert!(truncated.ends_with("(truncated, 600 total bytes)"));
    }

    #[test]
    fn test_truncate_body_respects_char_boundary() {
        let body = format!("{}é{}", "a".repeat(499), "b".repeat(200));
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.starts_with(&"a".repeat(499)));
        assert!(!truncated.contains('é'));
    }

    #[test]
    fn test_session_expired_code() {
        let err = ApiError::SessionExpired {
            code: SESSION_EXPIRED_CODE,
            message: "expired".into(),
        };
        assert!(err.is_session_expired());
        assert_eq!(err.code(), Some(410));
        assert_eq!(err.to_string(), "Session expired (410): expired");
    }

    #[test]
    fn test_config_error_has_no_code() {
        let err = ApiError::Config("appKey is required".into());
        assert!(!err.is_session_expired());
        assert_eq!(err.code(), None);
    }
}
