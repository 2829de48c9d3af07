use thiserror::Error;

/// Application-wide error types.
///
/// This enum represents every error a backfill run can observe. It uses the
/// `thiserror` crate for ergonomic error handling and automatic conversion
/// from underlying library errors.
///
/// # Error Conversion
///
/// - `sqlx::Error` → `AppError::DatabaseError`
/// - `serde_json::Error` → `AppError::SerializationError`
/// - `std::io::Error` → `AppError::Io`
///
/// # Classification
///
/// Errors fall into three buckets used by the batch runner:
///
/// - **retryable** ([`AppError::is_retryable`]): network failures, timeouts,
///   rate limits and provider 5xx responses. Retried with linear backoff.
/// - **permanent** ([`AppError::is_permanent`]): a malformed row or a content
///   policy rejection. The item is skipped or failed without a retry.
/// - everything else is fatal at startup and per-item at run time.
///
/// # Examples
///
/// ```no_run
/// use tubeline_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::Generic("Something went wrong".to_string()))
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Authentication failure (401/403, invalid API key)
    Authentication,
    /// Rate limit exceeded (429)
    RateLimit,
    /// Quota exceeded (insufficient_quota, daily quota)
    QuotaExceeded,
    /// Request rejected by the provider's content policy
    ContentPolicy,
    /// Malformed request (400, 404, 422)
    InvalidRequest,
    /// Server error (5xx)
    ServerError,
    /// Network/connection error
    NetworkError,
    /// Unknown or unclassified error
    Unknown,
}

/// Structured error details from an external provider API.
#[derive(Debug, Clone)]
pub struct ProviderErrorDetails {
    /// Provider name, e.g. `openai`, `youtube`, `pinecone`
    pub provider: &'static str,
    /// The specific error category
    pub kind: ProviderErrorKind,
    /// Human-readable error message from the API
    pub message: String,
    /// HTTP status code (0 when no response was received)
    pub status_code: u16,
}

impl ProviderErrorDetails {
    /// Create a new ProviderErrorDetails
    pub fn new(
        provider: &'static str,
        kind: ProviderErrorKind,
        message: String,
        status_code: u16,
    ) -> Self {
        Self {
            provider,
            kind,
            message,
            status_code,
        }
    }
}

impl std::fmt::Display for ProviderErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} API error (HTTP {}): {}",
            self.provider, self.status_code, self.message
        )
    }
}

/// Classify a provider error from its HTTP status code and message.
///
/// Shared by every HTTP client so that retry decisions are made the same
/// way regardless of which API produced the error.
pub fn classify_provider_error(status_code: u16, message: &str) -> ProviderErrorKind {
    let lower = message.to_lowercase();
    match status_code {
        401 => ProviderErrorKind::Authentication,
        403 => {
            // YouTube reports exhausted daily quota as 403 quotaExceeded
            if lower.contains("quota") {
                ProviderErrorKind::QuotaExceeded
            } else if lower.contains("ratelimit") || lower.contains("rate limit") {
                ProviderErrorKind::RateLimit
            } else {
                ProviderErrorKind::Authentication
            }
        }
        429 => {
            if lower.contains("insufficient_quota") || lower.contains("quota") {
                ProviderErrorKind::QuotaExceeded
            } else {
                ProviderErrorKind::RateLimit
            }
        }
        400 | 404 | 422 => {
            if lower.contains("content_policy") || lower.contains("content policy") {
                ProviderErrorKind::ContentPolicy
            } else {
                ProviderErrorKind::InvalidRequest
            }
        }
        500..=599 => ProviderErrorKind::ServerError,
        _ => {
            if lower.contains("api key") || lower.contains("unauthorized") {
                ProviderErrorKind::Authentication
            } else if lower.contains("rate") {
                ProviderErrorKind::RateLimit
            } else if lower.contains("quota") {
                ProviderErrorKind::QuotaExceeded
            } else {
                ProviderErrorKind::Unknown
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed.
    ///
    /// Wraps all errors from SQLx, including connection failures, query
    /// errors, and constraint violations.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// HTTP client request failed for a reason not covered by a provider
    /// classification (e.g. an unparseable response body).
    #[error("API Client error: {0}")]
    ClientError(String),

    /// External provider call failed with a classified error.
    #[error("Provider error: {0}")]
    ProviderError(ProviderErrorDetails),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Filesystem operation failed (checkpoint or config files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// API response contained no data.
    #[error("Empty response from API")]
    EmptyResponse,

    /// Network or connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded,

    /// A retryable error persisted through every attempt of the retry policy.
    ///
    /// Not retried again, and never fatal: the items of the call fail and the
    /// run moves on.
    #[error("Gave up after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<AppError>,
    },

    /// A work item cannot be processed as-is (e.g. no text to summarize).
    ///
    /// The runner records the item as skipped and never retries it.
    #[error("Invalid input for {id}: {reason}")]
    InvalidInput { id: String, reason: String },

    /// Checkpoint could not be written.
    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    /// Configuration file or flag error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A required credential or setting is absent.
    ///
    /// Checked eagerly at startup, before any work is fetched.
    #[error("Missing required configuration: {0}")]
    MissingCredential(&'static str),

    /// Generic application error for cases not covered by specific variants.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::DatabaseError(e) => {
                if e.to_string().contains("connection") {
                    "Cannot connect to database. Is PostgreSQL running?\n   Check DATABASE_URL."
                        .to_string()
                } else {
                    format!("Database error: {}", e)
                }
            }
            AppError::ProviderError(details) => match details.kind {
                ProviderErrorKind::Authentication => format!(
                    "Invalid {} API key.\n   Check the corresponding environment variable.",
                    details.provider
                ),
                ProviderErrorKind::RateLimit => format!(
                    "{} rate limit reached.\n   Lower --concurrency or raise --delay-ms.",
                    details.provider
                ),
                ProviderErrorKind::QuotaExceeded => format!(
                    "{} quota exceeded.\n   Check your account billing or wait for the daily reset.",
                    details.provider
                ),
                ProviderErrorKind::ContentPolicy => format!(
                    "{} rejected the input (content policy): {}",
                    details.provider, details.message
                ),
                ProviderErrorKind::InvalidRequest => format!(
                    "{} rejected the request (HTTP {}): {}",
                    details.provider, details.status_code, details.message
                ),
                ProviderErrorKind::ServerError => format!(
                    "{} server error (HTTP {}).\n   Please try again later.",
                    details.provider, details.status_code
                ),
                ProviderErrorKind::NetworkError => format!(
                    "Network error connecting to {}: {}\n   Check your internet connection.",
                    details.provider, details.message
                ),
                ProviderErrorKind::Unknown => {
                    format!("{} error: {}", details.provider, details.message)
                }
            },
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!(
                    "Request timed out after {} seconds.\n   The provider may be overloaded. Try again later.",
                    secs
                )
            }
            AppError::RateLimitExceeded => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            AppError::EmptyResponse => {
                "The API returned no data. The provider may be temporarily unavailable."
                    .to_string()
            }
            AppError::ConfigError(msg) => {
                format!(
                    "Configuration error: {}\n   Check your configuration file.",
                    msg
                )
            }
            AppError::MissingCredential(name) => {
                format!("{} is not set.\n   Export it or add it to your .env file.", name)
            }
            AppError::RetryExhausted { attempts, source } => {
                format!("{} (gave up after {} attempts)", source.user_message(), attempts)
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// Timeouts are treated exactly like rate limits.
    ///
    /// # Examples
    ///
    /// ```
    /// use tubeline_core::error::AppError;
    ///
    /// assert!(AppError::NetworkError("connection reset".to_string()).is_retryable());
    /// assert!(AppError::Timeout(30).is_retryable());
    /// assert!(AppError::RateLimitExceeded.is_retryable());
    ///
    /// let err = AppError::InvalidInput {
    ///     id: "abc".to_string(),
    ///     reason: "no description".to_string(),
    /// };
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded => true,
            AppError::ClientError(msg) => {
                msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("connect")
                    || msg.contains("connection")
            }
            AppError::ProviderError(details) => matches!(
                details.kind,
                ProviderErrorKind::RateLimit
                    | ProviderErrorKind::NetworkError
                    | ProviderErrorKind::ServerError
            ),
            _ => false,
        }
    }

    /// Returns true if this error is a permanent per-item rejection.
    ///
    /// Permanent errors mark an item as skipped instead of failed and are
    /// never retried.
    pub fn is_permanent(&self) -> bool {
        match self {
            AppError::InvalidInput { .. } => true,
            AppError::RetryExhausted { source, .. } => source.is_permanent(),
            AppError::ProviderError(details) => {
                matches!(details.kind, ProviderErrorKind::ContentPolicy)
            }
            _ => false,
        }
    }

    /// Returns true if the error means no further call can succeed during
    /// this run (bad credentials, exhausted quota).
    pub fn is_fatal(&self) -> bool {
        match self {
            AppError::MissingCredential(_) | AppError::ConfigError(_) => true,
            AppError::ProviderError(details) => matches!(
                details.kind,
                ProviderErrorKind::Authentication | ProviderErrorKind::QuotaExceeded
            ),
            _ => false,
        }
    }
}
