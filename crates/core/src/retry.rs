//! Classifies failures as transient or permanent. Transient failures are
//! worth retrying with backoff; permanent ones fail fast.

use once_cell::sync::Lazy;
use regex::Regex;

static PERMANENT_STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:400|401|403|404)\b").unwrap());
static TRANSIENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:429|500|502|503|504|rate limit|overloaded|quota|timeout|unavailable|connection refused|connection reset)\b",
    )
    .unwrap()
});

/// Whether an HTTP status is worth retrying.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Classifies an error message. Matches are whole words, case-insensitive;
/// a client-error status anywhere in the message marks it permanent even if
/// transient words also appear. Unrecognized messages are permanent.
pub fn is_retryable_message(message: &str) -> bool {
    if PERMANENT_STATUS.is_match(message) {
        return false;
    }
    TRANSIENT.is_match(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses_are_retryable() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status), "{status} should be retryable");
        }
        for status in [200, 400, 401, 403, 404, 422] {
            assert!(!is_retryable_status(status), "{status} should not be retryable");
        }
    }

    #[test]
    fn transient_messages_are_retryable() {
        for message in [
            "Error 429: slow down",
            "HTTP 503 Service Unavailable",
            "rate limit exceeded",
            "the model is overloaded right now",
            "monthly quota exhausted",
            "request timeout while waiting for upstream",
            "Connection refused (os error 111)",
            "connection reset by peer",
        ] {
            assert!(is_retryable_message(message), "retryable: {message}");
        }
    }

    #[test]
    fn permanent_messages_are_not_retryable() {
        for message in [
            "404 Not Found",
            "400 Bad Request",
            "401 Unauthorized",
            "invalid api key",
            "something unexpected happened",
            "",
        ] {
            assert!(!is_retryable_message(message), "permanent: {message}");
        }
    }

    #[test]
    fn matches_are_whole_words_only() {
        assert!(!is_retryable_message("order 15005 shipped"));
        assert!(!is_retryable_message("quotation missing from reply"));
        assert!(!is_retryable_message("timeouts are configured in seconds"));
        assert!(is_retryable_message("upstream returned 500"));
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert!(is_retryable_message("RATE LIMIT hit"));
        assert!(is_retryable_message("Timeout"));
    }

    #[test]
    fn permanent_status_beats_transient_wording() {
        assert!(!is_retryable_message("404 while fetching: upstream timeout"));
    }
}
