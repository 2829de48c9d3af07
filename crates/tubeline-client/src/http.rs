//! Shared HTTP plumbing: client construction and error mapping.
//!
//! Every provider client maps transport failures and non-2xx responses the
//! same way, so retry decisions in the runner do not depend on which API
//! produced the error.

use reqwest::{Client, Response};
use tubeline_core::HttpConfig;
use tubeline_core::error::{AppError, ProviderErrorDetails, ProviderErrorKind, classify_provider_error};

/// Builds a `reqwest` client with the configured timeouts.
pub(crate) fn build_client(config: &HttpConfig) -> Result<Client, AppError> {
    Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .build()
        .map_err(|e| AppError::ClientError(e.to_string()))
}

/// Maps a `reqwest` send error: timeouts and connection failures stay
/// retryable, anything else is a plain client error.
pub(crate) fn map_send_error(provider: &'static str, timeout_secs: u64, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(timeout_secs)
    } else if e.is_connect() {
        AppError::ProviderError(ProviderErrorDetails::new(
            provider,
            ProviderErrorKind::NetworkError,
            format!("Connection failed: {}", e),
            0, // No HTTP status for connection failures
        ))
    } else {
        AppError::ClientError(e.to_string())
    }
}

/// Converts a non-2xx response into a classified provider error.
pub(crate) async fn error_from_response(provider: &'static str, response: Response) -> AppError {
    let status_code = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    let message = extract_error_message(&body)
        .unwrap_or_else(|| format!("HTTP {}: {}", status_code, body.trim()));
    let kind = classify_provider_error(status_code, &message);

    AppError::ProviderError(ProviderErrorDetails::new(provider, kind, message, status_code))
}

/// Pulls a message out of the error bodies the providers return.
///
/// Handles `{"error": {"message": ..., "errors": [{"reason": ...}]}}`
/// (OpenAI, Google APIs), `{"message": ...}` (Pinecone) and
/// `{"error": "..."}`. The first Google `reason` is appended because it
/// carries the machine-readable cause (e.g. `quotaExceeded`).
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    let error = value.get("error");
    let message = error
        .and_then(|e| e.get("message"))
        .or_else(|| value.get("message"))
        .or(error)
        .and_then(|m| m.as_str())?;

    let reason = error
        .and_then(|e| e.get("errors"))
        .and_then(|errors| errors.get(0))
        .and_then(|first| first.get("reason"))
        .and_then(|r| r.as_str());

    Some(match reason {
        Some(reason) if !message.contains(reason) => format!("{} ({})", message, reason),
        _ => message.to_string(),
    })
}
