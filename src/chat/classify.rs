//! Maps errors onto the categories shown to the user.
//!
//! Classification is a heuristic over the error's text and status code, in
//! the same order the user-facing messages are prioritised: a rate limit wins
//! over everything, then timeouts, connectivity, authorization, malformed
//! requests and server failures.

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::retry::is_rate_limit_error;

/// Text that replaces the placeholder assistant message of a failed turn.
pub const FALLBACK_RESPONSE: &str =
    "Przepraszam, wystąpił błąd podczas generowania odpowiedzi. Spróbuj ponownie.";

/// User-facing failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Too many requests.
    RateLimit,
    /// The backend could not be reached or the connection dropped.
    Network,
    /// Missing or rejected credentials.
    Auth,
    /// The request itself was malformed.
    BadRequest,
    /// The backend failed.
    Server,
    /// The backend took too long.
    Timeout,
    /// Anything else.
    Unknown,
}

const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out", "408", "504", "deadline"];
const NETWORK_MARKERS: &[&str] = &[
    "connection",
    "network",
    "failed to fetch",
    "fetch failed",
    "http stream",
    "truncated",
    "dns",
];
const AUTH_MARKERS: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "authentication",
    "permission",
    "jwt",
];
const BAD_REQUEST_MARKERS: &[&str] = &["400", "bad request", "invalid", "validation"];
const SERVER_MARKERS: &[&str] = &[
    "500",
    "502",
    "503",
    "internal server",
    "service unavailable",
    "server error",
    "overloaded",
];

impl ErrorCategory {
    /// Classify an error by inspecting its message and status code.
    pub fn classify(error: &Error) -> Self {
        if is_rate_limit_error(error) {
            return ErrorCategory::RateLimit;
        }
        let mut text = error.to_string().to_lowercase();
        if let Some(status) = error.status_code() {
            text.push_str(&format!(" {status}"));
        }
        let has = |markers: &[&str]| markers.iter().any(|m| text.contains(m));
        if has(TIMEOUT_MARKERS) {
            ErrorCategory::Timeout
        } else if has(NETWORK_MARKERS) {
            ErrorCategory::Network
        } else if has(AUTH_MARKERS) {
            ErrorCategory::Auth
        } else if has(BAD_REQUEST_MARKERS) {
            ErrorCategory::BadRequest
        } else if has(SERVER_MARKERS) {
            ErrorCategory::Server
        } else {
            ErrorCategory::Unknown
        }
    }

    /// Short notification title.
    pub fn title(&self) -> &'static str {
        match self {
            ErrorCategory::RateLimit => "Zbyt wiele zapytań",
            ErrorCategory::Network => "Błąd połączenia",
            ErrorCategory::Auth => "Błąd autoryzacji",
            ErrorCategory::BadRequest => "Nieprawidłowe zapytanie",
            ErrorCategory::Server => "Błąd serwera",
            ErrorCategory::Timeout => "Przekroczono czas oczekiwania",
            ErrorCategory::Unknown => "Wystąpił błąd",
        }
    }

    /// Notification body explaining what the user can do.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCategory::RateLimit => {
                "Przekroczono limit zapytań. Odczekaj chwilę i spróbuj ponownie."
            }
            ErrorCategory::Network => {
                "Nie udało się połączyć z serwerem. Sprawdź połączenie z internetem."
            }
            ErrorCategory::Auth => {
                "Brak uprawnień do wykonania tej operacji. Odśwież stronę i spróbuj ponownie."
            }
            ErrorCategory::BadRequest => {
                "Zapytanie zawiera nieprawidłowe dane. Zmień treść pytania i spróbuj ponownie."
            }
            ErrorCategory::Server => "Serwer napotkał problem. Spróbuj ponownie za kilka minut.",
            ErrorCategory::Timeout => {
                "Odpowiedź trwała zbyt długo. Spróbuj zadać krótsze pytanie."
            }
            ErrorCategory::Unknown => "Nie udało się uzyskać odpowiedzi. Spróbuj ponownie.",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::RateLimit => "rate-limit",
            ErrorCategory::Network => "network",
            ErrorCategory::Auth => "auth",
            ErrorCategory::BadRequest => "bad-request",
            ErrorCategory::Server => "server",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(error: Error) -> ErrorCategory {
        ErrorCategory::classify(&error)
    }

    #[test]
    fn test_rate_limit() {
        assert_eq!(classify(Error::rate_limit("slow", None)), ErrorCategory::RateLimit);
        assert_eq!(
            classify(Error::stream_reported("quota exhausted", Some(429))),
            ErrorCategory::RateLimit
        );
    }

    #[test]
    fn test_timeout() {
        assert_eq!(
            classify(Error::timeout("Request timed out", Some(120.0))),
            ErrorCategory::Timeout
        );
        assert_eq!(
            classify(Error::service_unavailable("gateway", None)),
            ErrorCategory::Server
        );
        assert_eq!(
            classify(Error::api(504, None, "gateway")),
            ErrorCategory::Timeout
        );
    }

    #[test]
    fn test_network() {
        assert_eq!(
            classify(Error::connection("connection refused", None)),
            ErrorCategory::Network
        );
        assert_eq!(
            classify(Error::streaming("Error in HTTP stream: reset", None)),
            ErrorCategory::Network
        );
        assert_eq!(
            classify(Error::truncated("closed mid-frame")),
            ErrorCategory::Network
        );
    }

    #[test]
    fn test_auth() {
        assert_eq!(classify(Error::authentication("bad key")), ErrorCategory::Auth);
        assert_eq!(classify(Error::permission("nope")), ErrorCategory::Auth);
        assert_eq!(
            classify(Error::stream_reported("JWT expired", None)),
            ErrorCategory::Auth
        );
    }

    #[test]
    fn test_bad_request() {
        assert_eq!(
            classify(Error::bad_request("message is required")),
            ErrorCategory::BadRequest
        );
        assert_eq!(
            classify(Error::api(422, None, "Invalid payload")),
            ErrorCategory::BadRequest
        );
    }

    #[test]
    fn test_server() {
        assert_eq!(classify(Error::internal_server("boom")), ErrorCategory::Server);
        assert_eq!(
            classify(Error::stream_reported("model overloaded", Some(503))),
            ErrorCategory::Server
        );
    }

    #[test]
    fn test_unknown() {
        assert_eq!(classify(Error::unknown("???")), ErrorCategory::Unknown);
    }

    #[test]
    fn test_every_category_has_copy() {
        for category in [
            ErrorCategory::RateLimit,
            ErrorCategory::Network,
            ErrorCategory::Auth,
            ErrorCategory::BadRequest,
            ErrorCategory::Server,
            ErrorCategory::Timeout,
            ErrorCategory::Unknown,
        ] {
            assert!(!category.title().is_empty());
            assert!(!category.description().is_empty());
        }
    }
}
