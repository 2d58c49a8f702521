// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for directory invocations and forwarding.

use crate::handle::Identity;
use std::fmt;

/// Result type for forwarded directory requests
pub type ForwardResult<T> = Result<T, ForwardError>;

/// Failure reported by the RPC runtime when invoking a directory service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    /// Connection dropped while the request was outstanding
    ConnectionLost(String),

    /// Runtime or proxy already shut down
    Disposed,

    /// Handle has no usable endpoint
    NoEndpoints,

    /// Connection could not be established
    ConnectionRefused(String),

    /// No reply within the invocation timeout
    Timeout,

    /// Target object does not exist on the remote side
    ObjectNotExist(Identity),

    /// Remote side raised an application-level failure
    Remote(String),
}

impl InvokeError {
    /// Failures where the target cannot be reached at all. These are answered
    /// as "not found": a dead directory service is indistinguishable from one
    /// never discovered.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost(_) | Self::Disposed | Self::NoEndpoints
        )
    }
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Disposed => write!(f, "Invocation target disposed"),
            Self::NoEndpoints => write!(f, "No endpoints available"),
            Self::ConnectionRefused(msg) => write!(f, "Connection refused: {}", msg),
            Self::Timeout => write!(f, "Invocation timed out"),
            Self::ObjectNotExist(id) => write!(f, "Object does not exist: {}", id),
            Self::Remote(msg) => write!(f, "Remote failure: {}", msg),
        }
    }
}

impl std::error::Error for InvokeError {}

/// Errors surfaced by the request forwarder
#[derive(Debug)]
pub enum ForwardError {
    /// Request addressed to an identity this forwarder does not serve
    ObjectNotExist(Identity),

    /// Invocation failed again after the single retry
    Invoke(InvokeError),
}

impl fmt::Display for ForwardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectNotExist(id) => write!(f, "Object does not exist: {}", id),
            Self::Invoke(e) => write!(f, "Directory invocation failed: {}", e),
        }
    }
}

impl std::error::Error for ForwardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Invoke(e) => Some(e),
            Self::ObjectNotExist(_) => None,
        }
    }
}

impl From<InvokeError> for ForwardError {
    fn from(e: InvokeError) -> Self {
        Self::Invoke(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_class() {
        assert!(InvokeError::ConnectionLost("reset".into()).is_unreachable());
        assert!(InvokeError::Disposed.is_unreachable());
        assert!(InvokeError::NoEndpoints.is_unreachable());

        assert!(!InvokeError::Timeout.is_unreachable());
        assert!(!InvokeError::ConnectionRefused("x".into()).is_unreachable());
        assert!(!InvokeError::Remote("boom".into()).is_unreachable());
    }

    #[test]
    fn test_forward_error_display_and_source() {
        use std::error::Error;

        let err = ForwardError::from(InvokeError::Timeout);
        assert!(err.to_string().contains("timed out"));
        assert!(err.source().is_some());

        let err = ForwardError::ObjectNotExist(Identity::locator("A"));
        assert!(err.to_string().contains("A/Locator"));
        assert!(err.source().is_none());
    }
}
