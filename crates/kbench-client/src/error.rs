//! Error kinds and classification.
//!
//! Every failure a driver can see collapses into one closed enumeration.
//! Retry decisions are a table lookup on the kind, never a predicate chain
//! over opaque error values.

use thiserror::Error;

/// Closed classification of request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network timeouts, EOFs, connection resets, 429/5xx, quota conflicts,
    /// expired tokens. Retried with backoff.
    Transient,
    /// Object absent. Success in cleanup paths, a counted failure in reads.
    NotFound,
    /// Object already present. Success in create paths.
    AlreadyExists,
    /// The server lost the list continuation token; the scan restarts.
    StaleContinue,
    /// Configuration or parameter error. Fatal.
    InvalidInput,
    /// Authentication failure persisting past retries, denied storage
    /// writes, operator cancellation.
    Fatal,
}

impl ErrorKind {
    /// Whether a call that failed with this kind should be retried in place.
    pub fn retryable(self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Stable label used in logs and request records.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::NotFound => "not-found",
            Self::AlreadyExists => "already-exists",
            Self::StaleContinue => "stale-continue",
            Self::InvalidInput => "invalid-input",
            Self::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a kube-rs error into an [`ErrorKind`].
pub fn classify(err: &kube::Error) -> ErrorKind {
    match err {
        kube::Error::Api(resp) => match resp.code {
            404 => ErrorKind::NotFound,
            409 if resp.reason == "AlreadyExists" => ErrorKind::AlreadyExists,
            // optimistic-concurrency and quota conflicts resolve on retry
            409 => ErrorKind::Transient,
            410 => ErrorKind::StaleContinue,
            _ if resp.reason == "Expired" => ErrorKind::StaleContinue,
            401 | 403 => ErrorKind::Fatal,
            429 => ErrorKind::Transient,
            code if code >= 500 => ErrorKind::Transient,
            400 | 422 => ErrorKind::InvalidInput,
            _ => ErrorKind::Fatal,
        },
        kube::Error::Auth(_) => ErrorKind::Fatal,
        kube::Error::SerdeError(_) | kube::Error::BuildRequest(_) => ErrorKind::InvalidInput,
        // connection-level failures: resets, EOFs, broken pipes
        _ => ErrorKind::Transient,
    }
}

/// Error type for all client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// An API request failed after exhausting any applicable retries.
    #[error("{kind} error on {verb} {resource} {key:?}: {message}")]
    Api {
        /// Classified failure kind.
        kind: ErrorKind,
        /// Request verb (create, get, list).
        verb: &'static str,
        /// Resource noun (secrets, configmaps, pods, ...).
        resource: &'static str,
        /// Object key or namespace the request targeted.
        key: String,
        /// Underlying error message.
        message: String,
    },

    /// The run was stopped before the request was issued.
    #[error("request canceled before issue")]
    Canceled,

    /// A paginated scan kept hitting expired continue tokens.
    #[error("list of {resource} restarted {restarts} times on expired continue tokens")]
    StaleContinueExhausted {
        /// Resource noun being listed.
        resource: &'static str,
        /// Number of from-scratch restarts attempted.
        restarts: u32,
    },

    /// Client construction or configuration failed.
    #[error("failed to build kubernetes client: {0}")]
    Build(String),

    /// Invalid caller parameters.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    /// The failure kind, for retry tables and failure accounting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Api { kind, .. } => *kind,
            Self::Canceled => ErrorKind::Fatal,
            Self::StaleContinueExhausted { .. } => ErrorKind::StaleContinue,
            Self::Build(_) | Self::InvalidConfig(_) => ErrorKind::InvalidInput,
        }
    }

    /// True when the object was absent (read of a failed write).
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_err(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn status_codes_classify() {
        assert_eq!(classify(&api_err(404, "NotFound")), ErrorKind::NotFound);
        assert_eq!(classify(&api_err(409, "AlreadyExists")), ErrorKind::AlreadyExists);
        assert_eq!(classify(&api_err(409, "Conflict")), ErrorKind::Transient);
        assert_eq!(classify(&api_err(410, "Expired")), ErrorKind::StaleContinue);
        assert_eq!(classify(&api_err(429, "TooManyRequests")), ErrorKind::Transient);
        assert_eq!(classify(&api_err(500, "InternalError")), ErrorKind::Transient);
        assert_eq!(classify(&api_err(503, "ServiceUnavailable")), ErrorKind::Transient);
        assert_eq!(classify(&api_err(401, "Unauthorized")), ErrorKind::Fatal);
        assert_eq!(classify(&api_err(403, "Forbidden")), ErrorKind::Fatal);
        assert_eq!(classify(&api_err(422, "Invalid")), ErrorKind::InvalidInput);
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(ErrorKind::Transient.retryable());
        for kind in [
            ErrorKind::NotFound,
            ErrorKind::AlreadyExists,
            ErrorKind::StaleContinue,
            ErrorKind::InvalidInput,
            ErrorKind::Fatal,
        ] {
            assert!(!kind.retryable(), "{kind} must not retry in place");
        }
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(ErrorKind::NotFound.as_str(), "not-found");
        assert_eq!(ErrorKind::StaleContinue.as_str(), "stale-continue");
    }
}
