use thiserror::Error;

/// Type alias for Result with RulesError
pub type Result<T> = std::result::Result<T, RulesError>;

/// Error taxonomy for the rule engine
///
/// Errors split along two axes that drive behavior:
/// - scope: fatal to the run (config), fatal to one rule (label
///   resolution, search initiation), or isolated to one message
/// - retryability: transient errors are retried with backoff,
///   permanent errors never are
#[derive(Error, Debug)]
pub enum RulesError {
    /// Malformed rule file or rule violating model invariants.
    /// Fatal to the whole run; nothing is mutated.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A rule references a label name the account does not have.
    /// Fatal to that rule only; no auto-creation.
    #[error("Label not found: {0}")]
    LabelNotFound(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Resource not found (404) - the message vanished mid-run
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Bad request (400) - typically a query the provider rejected
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Gmail API returned an error not covered by a specific variant
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Operator-initiated cancellation; a clean early stop, not a failure
    #[error("Run cancelled")]
    Cancelled,

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl RulesError {
    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RulesError::RateLimitExceeded { .. }
                | RulesError::ServerError { .. }
                | RulesError::NetworkError(_)
        )
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Short stable identifier used in per-message failure records
    pub fn kind(&self) -> &'static str {
        match self {
            RulesError::ConfigError(_) => "config",
            RulesError::LabelNotFound(_) => "label_not_found",
            RulesError::RateLimitExceeded { .. } => "rate_limited",
            RulesError::ServerError { .. } => "server_error",
            RulesError::NetworkError(_) => "network",
            RulesError::MessageNotFound(_) => "message_not_found",
            RulesError::BadRequest(_) => "bad_request",
            RulesError::Forbidden(_) => "forbidden",
            RulesError::ApiError(_) => "api_error",
            RulesError::AuthError(_) => "auth",
            RulesError::Cancelled => "cancelled",
            RulesError::IoError(_) => "io",
            RulesError::SerializationError(_) => "serialization",
        }
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// The Retry-After header can be specified in two formats:
/// 1. Delay-seconds: An integer indicating seconds to wait (e.g., "120")
/// 2. HTTP-date: An HTTP date format (e.g., "Wed, 21 Oct 2015 07:28:00 GMT")
///
/// Returns the number of seconds to wait. If the header is missing or invalid,
/// returns a default of 5 seconds.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    if let Some(retry_after_value) = response.headers().get("retry-after") {
        if let Ok(retry_after_str) = retry_after_value.to_str() {
            if let Ok(seconds) = retry_after_str.parse::<u64>() {
                return seconds;
            }

            if let Ok(http_date) = httpdate::parse_http_date(retry_after_str) {
                let now = std::time::SystemTime::now();
                if let Ok(duration) = http_date.duration_since(now) {
                    return duration.as_secs();
                }
            }
        }
    }

    DEFAULT_RETRY_AFTER
}

impl From<google_gmail1::Error> for RulesError {
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
                    // Rate limiting - transient
                    429 => {
                        let retry_after = parse_retry_after_header(response);
                        RulesError::RateLimitExceeded { retry_after }
                    }
                    404 => RulesError::MessageNotFound("Resource not found".to_string()),
                    400 => RulesError::BadRequest(message),
                    403 => RulesError::Forbidden(message),
                    // Server errors - transient
                    500..=599 => RulesError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => RulesError::ApiError(message),
                }
            }
            // BadRequest variant (request not understood by server)
            google_gmail1::Error::BadRequest(ref err) => RulesError::BadRequest(format!("{}", err)),
            // Network/connection errors - transient
            google_gmail1::Error::HttpError(ref err) => {
                RulesError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => RulesError::NetworkError(err.to_string()),
            _ => RulesError::ApiError(error.to_string()),
        }
    }
}
