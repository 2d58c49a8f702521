// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lookup transport abstraction.
//!
//! The coordinator only needs two things from the network: a way to send a
//! `find_locator` datagram on one [`LookupView`], and a path that feeds
//! `found_locator` replies back to it. The first is [`LookupTransport`]; the
//! second is any receive loop calling [`ReplySink::found_locator`].
//!
//! ```text
//! DiscoveryCoordinator --send_lookup(view)--> LookupTransport --> lookup group
//!        ^                                                             |
//!        +------ ReplySink::found_locator <-- ReplyListener <-- reply -+
//! ```

pub mod udp;

pub use udp::{ReplyListener, UdpLookupTransport};

use crate::endpoint_group::LookupView;
use crate::handle::DirectoryServiceHandle;
use crate::protocol::ProtocolError;
use std::future::Future;

/// Sends lookup datagrams.
pub trait LookupTransport: Send + Sync + 'static {
    /// Send one `find_locator` request for `instance_name` on `view`.
    ///
    /// An error means the datagram was not sent at all; it says nothing
    /// about whether a reply will arrive.
    fn send_lookup(
        &self,
        view: &LookupView,
        instance_name: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Receives directory-service handles from lookup replies.
pub trait ReplySink: Send + Sync + 'static {
    fn found_locator(&self, handle: DirectoryServiceHandle);
}

/// Transport error types.
#[derive(Debug)]
pub enum TransportError {
    Io(std::io::Error),
    /// No socket could be set up for the view.
    Unavailable(String),
    /// View does not belong to this transport.
    UnknownView(String),
    Protocol(ProtocolError),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Unavailable(s) => write!(f, "Lookup view unavailable: {}", s),
            Self::UnknownView(s) => write!(f, "Unknown lookup view: {}", s),
            Self::Protocol(e) => write!(f, "Protocol error: {}", e),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ProtocolError> for TransportError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}
