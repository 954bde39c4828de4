use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Rate limited by remote endpoint")]
    RateLimited,

    /// 4xx other than auth/rate-limit: the endpoint rejected this
    /// submission and a blind retry will not help.
    #[error("Rejected by remote endpoint ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Remote server error ({status}): {body}")]
    ServerError { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Maximum characters of a response body carried into an error message
const MAX_ERROR_BODY_CHARS: usize = 400;

impl ApiError {
    /// Keep error messages bounded regardless of what the server sent back
    fn truncate_body(body: &str) -> String {
        if body.chars().count() <= MAX_ERROR_BODY_CHARS {
            body.to_string()
        } else {
            let head: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            format!("{}... (truncated, {} total bytes)", head, body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError {
                status: status.as_u16(),
                body: truncated,
            },
            _ => ApiError::Rejected {
                status: status.as_u16(),
                body: truncated,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ApiError::from_status(reqwest::StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
        assert!(matches!(
            ApiError::from_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            ApiError::ServerError { status: 500, .. }
        ));
        assert!(matches!(
            ApiError::from_status(reqwest::StatusCode::CONFLICT, "duplicate"),
            ApiError::Rejected { status: 409, .. }
        ));
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(5000);
        match ApiError::from_status(reqwest::StatusCode::BAD_REQUEST, &body) {
            ApiError::Rejected { body, .. } => {
                assert!(body.len() < 500);
                assert!(body.contains("truncated"));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }
}
