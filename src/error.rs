use thiserror::Error;

/// Type alias for Result with MailError
pub type Result<T> = std::result::Result<T, MailError>;

/// Error types surfaced by the CLI
///
/// The first four variants are raised locally by this crate. Everything from
/// `ApiError` down to `InvalidMessageFormat` is a pass-through of what the
/// Gmail client library reported.
#[derive(Error, Debug)]
pub enum MailError {
    /// No saved session on disk
    #[error("Not logged in. Run: gmail login")]
    NotLoggedIn,

    /// The provider needs an interactive consent step before it will issue tokens
    #[error("Authorization required: {0}")]
    AuthChallengeRequired(String),

    /// A display index that does not exist in the listing it was resolved against
    #[error("Index {index} out of range (have {available} messages)")]
    InvalidReference { index: usize, available: usize },

    /// Send/forward invoked without any `--to` address
    #[error("At least one recipient is required (use -t/--to)")]
    RecipientRequired,

    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Not found: {0}")]
    MessageNotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Response from the API was missing fields we rely on
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Outgoing message could not be built
    #[error("Could not compose message: {0}")]
    ComposeError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl MailError {
    /// Errors that come from the user's input rather than the provider
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            MailError::InvalidReference { .. } | MailError::RecipientRequired
        )
    }

    /// Errors that a fresh `gmail login` would fix
    pub fn needs_login(&self) -> bool {
        matches!(
            self,
            MailError::NotLoggedIn | MailError::AuthChallengeRequired(_) | MailError::AuthError(_)
        )
    }

    /// Short hint shown under the error message by the binary
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            MailError::AuthError(_) => {
                Some("Your saved token may have been revoked. Try: gmail login --force")
            }
            e if e.needs_login() => Some("Run `gmail login` to authorize this machine."),
            MailError::InvalidReference { .. } => {
                Some("Indices refer to the latest inbox listing. Run `gmail ls` again.")
            }
            MailError::RateLimitExceeded { .. } => {
                Some("You've hit Gmail API rate limits. Wait a few seconds and try again.")
            }
            MailError::ConfigError(_) => Some("Check config.toml, or run: gmail init-config --force"),
            _ => None,
        }
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// Only the delay-seconds form is honoured; anything else falls back to 5.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

impl From<google_gmail1::Error> for MailError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            // HTTP response with status code (non-success responses)
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    429 => {
                        let retry_after = parse_retry_after_header(response);
                        MailError::RateLimitExceeded { retry_after }
                    }
                    401 => MailError::AuthError(message),
                    404 => MailError::MessageNotFound("Resource not found".to_string()),
                    400 => MailError::BadRequest(message),
                    403 => MailError::Forbidden(message),
                    500..=599 => MailError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => MailError::ApiError(message),
                }
            }
            google_gmail1::Error::BadRequest(ref err) => MailError::BadRequest(format!("{}", err)),
            // The authenticator could not hand out a token
            google_gmail1::Error::MissingToken(ref err) => {
                let message = err.to_string();
                if message.contains(crate::auth::CHALLENGE_MARKER) {
                    MailError::AuthChallengeRequired(
                        "saved token is no longer valid and a new consent code is needed"
                            .to_string(),
                    )
                } else {
                    MailError::AuthError(message)
                }
            }
            google_gmail1::Error::HttpError(ref err) => {
                MailError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => MailError::NetworkError(err.to_string()),
            _ => MailError::ApiError(error.to_string()),
        }
    }
}
