//! # Design
//!
//! - Constant-message errors with context fields, so a degraded client can be
//!   logged once with the operation and endpoint that failed.
//! - Every variant is survivable: callers degrade the client's contribution
//!   to "unknown" for the iteration instead of aborting the run.

use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors produced by torrent and media clients.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The HTTP request itself failed (connect, timeout, decode).
    #[error("client http failure")]
    Http {
        /// Operation identifier.
        operation: &'static str,
        /// URL used for the request.
        url: String,
        /// Underlying HTTP client error.
        source: reqwest::Error,
    },
    /// The endpoint answered with a non-success status.
    #[error("client http status error")]
    HttpStatus {
        /// Operation identifier.
        operation: &'static str,
        /// URL used for the request.
        url: String,
        /// Status code returned by the endpoint.
        status: u16,
    },
    /// Authentication with the endpoint failed.
    #[error("client authentication failed")]
    Auth {
        /// Operation identifier.
        operation: &'static str,
        /// Endpoint that rejected the credentials.
        endpoint: String,
    },
    /// The endpoint URL in the configuration could not be used.
    #[error("client endpoint invalid")]
    InvalidEndpoint {
        /// Offending endpoint value.
        endpoint: String,
        /// Static reason for the failure.
        reason: &'static str,
    },
}

impl ClientError {
    pub(crate) fn http(operation: &'static str, url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Http {
            operation,
            url: url.into(),
            source,
        }
    }

    pub(crate) fn status(operation: &'static str, url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            operation,
            url: url.into(),
            status,
        }
    }
}
