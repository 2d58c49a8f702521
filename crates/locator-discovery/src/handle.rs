// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Directory-service handles and the values they are built from.
//!
//! A [`DirectoryServiceHandle`] is what a lookup reply carries: the locator's
//! identity (whose category is the deployment's instance name), the protocol
//! it speaks and the endpoints it can be reached on. Handles for the same
//! instance are merged rather than replaced, so replicas answering the same
//! lookup accumulate into a single endpoint list.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// Object identity: `category/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    pub category: String,
    pub name: String,
}

impl Identity {
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
        }
    }

    /// Identity of the locator servant for `instance_name`.
    pub fn locator(instance_name: impl Into<String>) -> Self {
        Self::new(instance_name, "Locator")
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.category.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.category, self.name)
        }
    }
}

impl FromStr for Identity {
    type Err = HandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (category, name) = match s.split_once('/') {
            Some((category, name)) => (category, name),
            None => ("", s),
        };
        if name.is_empty() || name.contains('/') {
            return Err(HandleError::InvalidIdentity(s.to_string()));
        }
        Ok(Self::new(category, name))
    }
}

/// Protocol version advertised by a directory service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub const CURRENT: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Transport an endpoint is reached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Transport {
    Tcp,
    Udp,
    Ssl,
    Ws,
}

impl Transport {
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Ssl => "ssl",
            Self::Ws => "ws",
        }
    }
}

impl FromStr for Transport {
    type Err = HandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "ssl" => Ok(Self::Ssl),
            "ws" => Ok(Self::Ws),
            _ => Err(HandleError::UnknownTransport(s.to_string())),
        }
    }
}

/// A network endpoint, written `scheme://addr` (e.g. `tcp://10.0.0.4:4061`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub transport: Transport,
    pub addr: SocketAddr,
}

impl Endpoint {
    pub fn new(transport: Transport, addr: SocketAddr) -> Self {
        Self { transport, addr }
    }

    pub fn tcp(addr: SocketAddr) -> Self {
        Self::new(Transport::Tcp, addr)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.transport.scheme(), self.addr)
    }
}

impl FromStr for Endpoint {
    type Err = HandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // A bare socket address defaults to tcp.
        let (transport, addr) = match s.split_once("://") {
            Some((scheme, addr)) => (scheme.parse()?, addr),
            None => (Transport::Tcp, s),
        };
        let addr = addr
            .parse()
            .map_err(|_| HandleError::InvalidEndpoint(s.to_string()))?;
        Ok(Self::new(transport, addr))
    }
}

/// Reference to a remote directory service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryServiceHandle {
    identity: Identity,
    protocol: ProtocolVersion,
    endpoints: Vec<Endpoint>,
}

impl DirectoryServiceHandle {
    /// Create a handle. Duplicate endpoints are dropped, first occurrence wins.
    pub fn new(identity: Identity, protocol: ProtocolVersion, endpoints: Vec<Endpoint>) -> Self {
        let mut handle = Self {
            identity,
            protocol,
            endpoints: Vec::with_capacity(endpoints.len()),
        };
        handle.merge_endpoints(&endpoints);
        handle
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Instance name of the deployment (the identity category).
    pub fn instance_name(&self) -> &str {
        &self.identity.category
    }

    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Two handles denote the same service iff their instance names match.
    pub fn same_service(&self, other: &DirectoryServiceHandle) -> bool {
        self.instance_name() == other.instance_name()
    }

    /// Append the endpoints not already present. Returns how many were added.
    pub fn merge_endpoints(&mut self, endpoints: &[Endpoint]) -> usize {
        let before = self.endpoints.len();
        for endpoint in endpoints {
            if !self.endpoints.contains(endpoint) {
                self.endpoints.push(*endpoint);
            }
        }
        self.endpoints.len() - before
    }
}

impl fmt::Display for DirectoryServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -p {}", self.identity, self.protocol)?;
        for endpoint in &self.endpoints {
            write!(f, " : {}", endpoint)?;
        }
        Ok(())
    }
}

/// What a resolve yields: a discovered service or the null sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryTarget {
    /// Nothing discovered (or backing off); answered locally as not found.
    Null,
    Service(DirectoryServiceHandle),
}

impl DirectoryTarget {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn handle(&self) -> Option<&DirectoryServiceHandle> {
        match self {
            Self::Null => None,
            Self::Service(handle) => Some(handle),
        }
    }
}

/// Errors parsing identities and endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    InvalidIdentity(String),
    InvalidEndpoint(String),
    UnknownTransport(String),
}

impl fmt::Display for HandleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIdentity(s) => write!(f, "Invalid identity: {}", s),
            Self::InvalidEndpoint(s) => write!(f, "Invalid endpoint: {}", s),
            Self::UnknownTransport(s) => write!(f, "Unknown transport: {}", s),
        }
    }
}

impl std::error::Error for HandleError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(s: &str) -> Endpoint {
        s.parse().unwrap()
    }

    #[test]
    fn test_identity_parse_and_display() {
        let id: Identity = "DemoGrid/Locator".parse().unwrap();
        assert_eq!(id, Identity::locator("DemoGrid"));
        assert_eq!(id.to_string(), "DemoGrid/Locator");

        let bare: Identity = "Locator".parse().unwrap();
        assert_eq!(bare.category, "");
        assert_eq!(bare.to_string(), "Locator");

        assert!("DemoGrid/".parse::<Identity>().is_err());
        assert!("a/b/c".parse::<Identity>().is_err());
    }

    #[test]
    fn test_endpoint_parse() {
        let e = ep("ssl://10.0.0.1:4062");
        assert_eq!(e.transport, Transport::Ssl);
        assert_eq!(e.addr.port(), 4062);
        assert_eq!(e.to_string(), "ssl://10.0.0.1:4062");

        assert_eq!(ep("10.0.0.1:4061").transport, Transport::Tcp);
        assert_eq!(ep("tcp://[::1]:4061").addr.port(), 4061);
        assert!("quic://10.0.0.1:1".parse::<Endpoint>().is_err());
        assert!("tcp://nowhere".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_new_dedups_endpoints() {
        let handle = DirectoryServiceHandle::new(
            Identity::locator("A"),
            ProtocolVersion::CURRENT,
            vec![ep("tcp://10.0.0.1:1"), ep("tcp://10.0.0.1:1"), ep("udp://10.0.0.1:1")],
        );
        assert_eq!(handle.endpoints().len(), 2);
    }

    #[test]
    fn test_merge_keeps_order_and_skips_duplicates() {
        let mut handle = DirectoryServiceHandle::new(
            Identity::locator("A"),
            ProtocolVersion::CURRENT,
            vec![ep("tcp://10.0.0.1:1"), ep("tcp://10.0.0.2:1")],
        );
        let added = handle.merge_endpoints(&[ep("tcp://10.0.0.2:1"), ep("tcp://10.0.0.3:1")]);
        assert_eq!(added, 1);
        assert_eq!(
            handle.endpoints(),
            &[
                ep("tcp://10.0.0.1:1"),
                ep("tcp://10.0.0.2:1"),
                ep("tcp://10.0.0.3:1")
            ]
        );
    }

    #[test]
    fn test_same_service_ignores_endpoints() {
        let a = DirectoryServiceHandle::new(
            Identity::locator("A"),
            ProtocolVersion::CURRENT,
            vec![ep("tcp://10.0.0.1:1")],
        );
        let a2 = DirectoryServiceHandle::new(
            Identity::locator("A"),
            ProtocolVersion::CURRENT,
            vec![ep("tcp://10.0.0.9:1")],
        );
        let b = DirectoryServiceHandle::new(
            Identity::locator("B"),
            ProtocolVersion::CURRENT,
            vec![ep("tcp://10.0.0.1:1")],
        );
        assert!(a.same_service(&a2));
        assert!(!a.same_service(&b));
    }

    #[test]
    fn test_target_accessors() {
        assert!(DirectoryTarget::Null.is_null());
        assert!(DirectoryTarget::Null.handle().is_none());

        let handle =
            DirectoryServiceHandle::new(Identity::locator("A"), ProtocolVersion::CURRENT, vec![]);
        let target = DirectoryTarget::Service(handle.clone());
        assert_eq!(target.handle(), Some(&handle));
    }
}
