//! Failure classification
//!
//! Maps a raw `ProviderError` to exactly one `FailureKind`. Classification is
//! pure: the same error always yields the same kind.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ProviderError;

/// Category of a provider failure, used to drive retry and breaker decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connection resets, gateway errors and other short-lived faults
    Transient,
    /// The provider is throttling us
    RateLimited,
    /// Credentials or permissions were rejected
    Authentication,
    /// The request itself was malformed
    Validation,
    /// The provider failed internally
    ServerError,
    /// The call exceeded its deadline
    Timeout,
    /// Nothing recognisable
    Unknown,
}

impl FailureKind {
    /// All kinds, in declaration order
    pub const ALL: [FailureKind; 7] = [
        FailureKind::Transient,
        FailureKind::RateLimited,
        FailureKind::Authentication,
        FailureKind::Validation,
        FailureKind::ServerError,
        FailureKind::Timeout,
        FailureKind::Unknown,
    ];

    /// Fatal kinds are surfaced immediately and never retried
    pub fn is_fatal(self) -> bool {
        matches!(self, FailureKind::Authentication | FailureKind::Validation)
    }

    /// Whether a failure of this kind counts against the provider's breaker
    pub fn trips_breaker(self) -> bool {
        matches!(
            self,
            FailureKind::Transient
                | FailureKind::ServerError
                | FailureKind::Timeout
                | FailureKind::Unknown
        )
    }

    /// Stable snake_case label for logs
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Transient => "transient",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Authentication => "authentication",
            FailureKind::Validation => "validation",
            FailureKind::ServerError => "server_error",
            FailureKind::Timeout => "timeout",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a raw provider failure
pub fn classify(error: &ProviderError) -> FailureKind {
    match error {
        ProviderError::Http { status, message, .. } => {
            classify_status(*status).unwrap_or_else(|| classify_message(message))
        }
        ProviderError::Connection(_) => FailureKind::Transient,
        ProviderError::Timeout(_) => FailureKind::Timeout,
        ProviderError::Decode(_) => FailureKind::ServerError,
        ProviderError::Other(message) => classify_message(message),
    }
}

/// Classify an HTTP status code, if it is one we recognise
pub fn classify_status(status: u16) -> Option<FailureKind> {
    match status {
        401 | 403 => Some(FailureKind::Authentication),
        400 | 404 | 409 | 413 | 422 => Some(FailureKind::Validation),
        408 => Some(FailureKind::Timeout),
        429 => Some(FailureKind::RateLimited),
        502 | 503 | 504 => Some(FailureKind::Transient),
        500..=599 => Some(FailureKind::ServerError),
        _ => None,
    }
}

// Checked in order; the first group with a matching needle wins.
const MESSAGE_RULES: &[(FailureKind, &[&str])] = &[
    (
        FailureKind::RateLimited,
        &["rate limit", "rate_limit", "too many requests", "quota", "throttl"],
    ),
    (
        FailureKind::Authentication,
        &["unauthorized", "unauthorised", "api key", "api_key", "permission", "forbidden", "authentication"],
    ),
    (
        FailureKind::Validation,
        &["invalid request", "invalid_request", "bad request", "validation", "malformed"],
    ),
    (
        FailureKind::Timeout,
        &["timed out", "timeout", "deadline"],
    ),
    (
        FailureKind::Transient,
        &["connection reset", "connection refused", "connection closed", "broken pipe", "unexpected eof"],
    ),
    (
        FailureKind::ServerError,
        &["internal server error", "internal error", "overloaded", "unavailable", "server error"],
    ),
];

fn classify_message(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    MESSAGE_RULES
        .iter()
        .find(|(_, needles)| needles.iter().any(|needle| lower.contains(needle)))
        .map(|(kind, _)| *kind)
        .unwrap_or(FailureKind::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(classify(&ProviderError::http(401, "nope")), FailureKind::Authentication);
        assert_eq!(classify(&ProviderError::http(403, "nope")), FailureKind::Authentication);
        assert_eq!(classify(&ProviderError::http(400, "nope")), FailureKind::Validation);
        assert_eq!(classify(&ProviderError::http(422, "nope")), FailureKind::Validation);
        assert_eq!(classify(&ProviderError::http(408, "nope")), FailureKind::Timeout);
        assert_eq!(classify(&ProviderError::http(429, "nope")), FailureKind::RateLimited);
        assert_eq!(classify(&ProviderError::http(503, "nope")), FailureKind::Transient);
        assert_eq!(classify(&ProviderError::http(500, "nope")), FailureKind::ServerError);
        assert_eq!(classify(&ProviderError::http(529, "nope")), FailureKind::ServerError);
    }

    #[test]
    fn test_unrecognised_status_falls_back_to_message() {
        assert_eq!(
            classify(&ProviderError::http(418, "quota exceeded")),
            FailureKind::RateLimited
        );
        assert_eq!(classify(&ProviderError::http(302, "moved")), FailureKind::Unknown);
    }

    #[test]
    fn test_transport_classification() {
        assert_eq!(classify(&ProviderError::connection("reset by peer")), FailureKind::Transient);
        assert_eq!(classify(&ProviderError::timeout("deadline")), FailureKind::Timeout);
        assert_eq!(classify(&ProviderError::decode("bad json")), FailureKind::ServerError);
    }

    #[test]
    fn test_message_classification() {
        assert_eq!(classify(&ProviderError::other("Too Many Requests")), FailureKind::RateLimited);
        assert_eq!(classify(&ProviderError::other("Invalid API key provided")), FailureKind::Authentication);
        assert_eq!(classify(&ProviderError::other("bad request: missing model")), FailureKind::Validation);
        assert_eq!(classify(&ProviderError::other("operation timed out")), FailureKind::Timeout);
        assert_eq!(classify(&ProviderError::other("connection reset")), FailureKind::Transient);
        assert_eq!(classify(&ProviderError::other("model is overloaded")), FailureKind::ServerError);
        assert_eq!(classify(&ProviderError::other("something odd")), FailureKind::Unknown);
    }

    #[test]
    fn test_needles_do_not_match_inside_words() {
        assert_eq!(
            classify(&ProviderError::other("unexpected EOF while reading body")),
            FailureKind::Transient
        );
        assert_eq!(
            classify(&ProviderError::other("the reply and the grounds thereof")),
            FailureKind::Unknown
        );
        assert_eq!(classify(&ProviderError::other("whereof one cannot speak")), FailureKind::Unknown);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let samples = vec![
            ProviderError::http(401, "x"),
            ProviderError::http(429, "x"),
            ProviderError::http(500, "x"),
            ProviderError::connection("x"),
            ProviderError::timeout("x"),
            ProviderError::decode("x"),
            ProviderError::other("x"),
        ];
        for sample in &samples {
            let first = classify(sample);
            for _ in 0..10 {
                assert_eq!(classify(sample), first);
            }
        }
    }

    #[test]
    fn test_kind_flags() {
        for kind in FailureKind::ALL {
            assert!(!(kind.is_fatal() && kind.trips_breaker()), "{} is both fatal and tripping", kind);
        }
        assert!(!FailureKind::RateLimited.trips_breaker());
        assert!(FailureKind::ServerError.trips_breaker());
    }
}
