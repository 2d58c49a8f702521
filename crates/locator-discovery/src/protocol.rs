// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lookup wire protocol.
//!
//! One JSON message per UDP datagram; the datagram boundary delimits the
//! message.
//!
//! ```text
//! client --find_locator { instance_name, reply }--> lookup group
//! locator --found_locator { locator }------------> reply endpoint
//! ```

use crate::handle::{DirectoryServiceHandle, Endpoint, Identity, ProtocolVersion};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Largest payload accepted in a single datagram.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Lookup protocol message types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LookupMessage {
    /// Ask directory services of `instance_name` (any, when empty) to reply.
    #[serde(rename = "find_locator")]
    FindLocator {
        #[serde(default)]
        instance_name: String,
        reply: Vec<String>,
    },

    /// A directory service answering a lookup.
    #[serde(rename = "found_locator")]
    FoundLocator { locator: LocatorWire },
}

impl LookupMessage {
    pub fn find_locator(instance_name: &str, reply: &[SocketAddr]) -> Self {
        Self::FindLocator {
            instance_name: instance_name.to_string(),
            reply: reply.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn found_locator(handle: &DirectoryServiceHandle) -> Self {
        Self::FoundLocator {
            locator: handle.into(),
        }
    }

    /// Serialize to a datagram payload.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| ProtocolError::Serialize(e.to_string()))?;
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(ProtocolError::TooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    /// Parse a datagram payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.is_empty() {
            return Err(ProtocolError::Empty);
        }
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(ProtocolError::TooLarge(bytes.len()));
        }
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::InvalidJson(e.to_string()))
    }
}

/// Wire format for a directory-service handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorWire {
    pub identity: String,
    #[serde(default = "default_protocol")]
    pub protocol: (u8, u8),
    #[serde(default)]
    pub endpoints: Vec<String>,
}

fn default_protocol() -> (u8, u8) {
    (ProtocolVersion::CURRENT.major, ProtocolVersion::CURRENT.minor)
}

impl From<&DirectoryServiceHandle> for LocatorWire {
    fn from(handle: &DirectoryServiceHandle) -> Self {
        let protocol = handle.protocol();
        Self {
            identity: handle.identity().to_string(),
            protocol: (protocol.major, protocol.minor),
            endpoints: handle.endpoints().iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl TryFrom<LocatorWire> for DirectoryServiceHandle {
    type Error = ProtocolError;

    fn try_from(wire: LocatorWire) -> Result<Self, Self::Error> {
        let identity: Identity = wire
            .identity
            .parse()
            .map_err(|_| ProtocolError::InvalidIdentity(wire.identity.clone()))?;

        // Endpoints we cannot parse are skipped; the rest are still usable.
        let endpoints: Vec<Endpoint> = wire
            .endpoints
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();

        let (major, minor) = wire.protocol;
        Ok(DirectoryServiceHandle::new(
            identity,
            ProtocolVersion::new(major, minor),
            endpoints,
        ))
    }
}

/// Parse the reply addresses of a `find_locator` message.
pub fn reply_addresses(reply: &[String]) -> Vec<SocketAddr> {
    reply.iter().filter_map(|s| s.parse().ok()).collect()
}

/// Protocol error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    Empty,
    TooLarge(usize),
    InvalidJson(String),
    Serialize(String),
    InvalidIdentity(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty datagram"),
            Self::TooLarge(len) => {
                write!(f, "Datagram too large: {} > {}", len, MAX_DATAGRAM_SIZE)
            }
            Self::InvalidJson(s) => write!(f, "Invalid JSON: {}", s),
            Self::Serialize(s) => write!(f, "Serialize error: {}", s),
            Self::InvalidIdentity(s) => write!(f, "Invalid locator identity: {}", s),
        }
    }
}

impl std::error::Error for ProtocolError {}
