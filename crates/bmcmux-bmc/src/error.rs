//! Error types for BMC operations

use thiserror::Error;

/// Error type for BMC operations
///
/// Drivers report every failure through this type. The orchestrator wraps it
/// with the driver's name; the firmware state machine inspects it through
/// [`BmcError::is_transient`] and [`BmcError::is_session_expired`].
#[derive(Debug, Error)]
pub enum BmcError {
    /// Connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The BMC actively refused the connection (typically mid-reboot)
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The login session is no longer valid and must be re-opened
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// Command failed, or the BMC reported the operation as unsuccessful
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// Operation timed out
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Unsupported operation
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Network error (for Wake-on-LAN)
    #[error("network error: {0}")]
    NetworkError(String),

    /// The BMC answered with something we could not interpret
    #[error("unexpected response: {0}")]
    Protocol(String),

    /// The RPC consumer answered with an error object
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl BmcError {
    /// Whether this error is expected while a BMC reboots itself.
    ///
    /// Connection-refused and timed-out errors fall in this class.
    pub fn is_transient(&self) -> bool {
        matches!(self, BmcError::ConnectionRefused(_) | BmcError::Timeout(_))
    }

    /// Whether re-running the driver's login sequence can recover from this error.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, BmcError::SessionExpired(_))
    }

    /// Classify an HTTP client error.
    pub(crate) fn from_http(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return BmcError::Timeout(err.to_string());
        }
        if refused(&err) {
            return BmcError::ConnectionRefused(err.to_string());
        }
        if err.is_connect() {
            return BmcError::ConnectionFailed(err.to_string());
        }
        if err.is_decode() {
            return BmcError::Protocol(err.to_string());
        }
        BmcError::NetworkError(err.to_string())
    }
}

/// Walk the source chain looking for an `ECONNREFUSED`.
fn refused(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// Result type for BMC operations
pub type Result<T> = std::result::Result<T, BmcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BmcError::ConnectionFailed("host unreachable".to_string());
        assert_eq!(err.to_string(), "connection failed: host unreachable");

        let err = BmcError::AuthenticationFailed("bad credentials".to_string());
        assert_eq!(err.to_string(), "authentication failed: bad credentials");

        let err = BmcError::Timeout("power on".to_string());
        assert_eq!(err.to_string(), "operation timed out: power on");

        let err = BmcError::Rpc {
            code: 500,
            message: "no such host".to_string(),
        };
        assert_eq!(err.to_string(), "rpc error 500: no such host");
    }

    #[test]
    fn test_transient_classification() {
        assert!(BmcError::ConnectionRefused("bmc".to_string()).is_transient());
        assert!(BmcError::Timeout("bmc".to_string()).is_transient());
        assert!(!BmcError::ConnectionFailed("dns".to_string()).is_transient());
        assert!(!BmcError::CommandFailed("nope".to_string()).is_transient());
        assert!(!BmcError::SessionExpired("401".to_string()).is_transient());
    }

    #[test]
    fn test_session_expired_classification() {
        assert!(BmcError::SessionExpired("token".to_string()).is_session_expired());
        assert!(!BmcError::AuthenticationFailed("bad".to_string()).is_session_expired());
    }

    #[test]
    fn test_refused_walks_source_chain() {
        #[derive(Debug, Error)]
        #[error("outer")]
        struct Outer(#[source] std::io::Error);

        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(refused(&Outer(inner)));

        let other = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(!refused(&Outer(other)));
    }
}
