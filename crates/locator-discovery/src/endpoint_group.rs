// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lookup endpoint groups and per-interface views.
//!
//! Each lookup endpoint expands into one view per local interface of the
//! same address family when it is a multicast group, so a datagram lost on
//! one interface does not stall discovery on the others. Unicast lookup
//! endpoints get a single view and let routing pick the interface.

use crate::config::{ConfigError, DiscoveryConfig};
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

/// A local network interface a lookup is sent from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupInterface {
    pub name: String,
    pub addr: IpAddr,
}

/// One lookup endpoint as seen from one local interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupView {
    pub target: SocketAddr,
    pub interface: Option<LookupInterface>,
}

impl LookupView {
    pub fn is_multicast(&self) -> bool {
        self.target.ip().is_multicast()
    }
}

impl std::fmt::Display for LookupView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.interface {
            Some(iface) => write!(f, "{} via {} ({})", self.target, iface.name, iface.addr),
            None => write!(f, "{}", self.target),
        }
    }
}

/// Views derived from a single lookup endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupGroup {
    pub endpoint: SocketAddr,
    pub views: Vec<LookupView>,
}

/// All lookup views of a discovery configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointGroup {
    groups: Vec<LookupGroup>,
}

impl EndpointGroup {
    /// Build the views for `config`, enumerating local interfaces.
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let interfaces = match config.interface {
            Some(addr) => vec![LookupInterface {
                name: interface_name(addr).unwrap_or_else(|| addr.to_string()),
                addr,
            }],
            None => local_interfaces(),
        };
        Ok(Self::with_interfaces(&config.lookup_endpoints(), &interfaces))
    }

    /// Build the views for `endpoints` over an explicit interface list.
    pub fn with_interfaces(endpoints: &[SocketAddr], interfaces: &[LookupInterface]) -> Self {
        let mut groups = Vec::with_capacity(endpoints.len());

        for endpoint in endpoints {
            let mut views: Vec<LookupView> = Vec::new();
            if endpoint.ip().is_multicast() {
                for iface in interfaces
                    .iter()
                    .filter(|i| i.addr.is_ipv4() == endpoint.is_ipv4())
                {
                    // IPv6 interfaces carry several addresses; one view per
                    // interface name is enough.
                    if endpoint.is_ipv6()
                        && views
                            .iter()
                            .any(|v| v.interface.as_ref().map(|i| &i.name) == Some(&iface.name))
                    {
                        continue;
                    }
                    views.push(LookupView {
                        target: *endpoint,
                        interface: Some(iface.clone()),
                    });
                }
            }
            if views.is_empty() {
                views.push(LookupView {
                    target: *endpoint,
                    interface: None,
                });
            }
            debug!("Lookup endpoint {} expands to {} view(s)", endpoint, views.len());
            groups.push(LookupGroup {
                endpoint: *endpoint,
                views,
            });
        }

        Self { groups }
    }

    pub fn groups(&self) -> &[LookupGroup] {
        &self.groups
    }

    /// All views, group by group.
    pub fn views(&self) -> impl Iterator<Item = &LookupView> {
        self.groups.iter().flat_map(|g| g.views.iter())
    }

    pub fn view_count(&self) -> usize {
        self.groups.iter().map(|g| g.views.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.view_count() == 0
    }
}

/// Non-loopback local interfaces, via `local_ip_address`.
pub fn local_interfaces() -> Vec<LookupInterface> {
    let interfaces = match local_ip_address::list_afinet_netifas() {
        Ok(ifs) => ifs,
        Err(e) => {
            debug!("Failed to list network interfaces: {}", e);
            return Vec::new();
        }
    };

    let found: Vec<LookupInterface> = interfaces
        .into_iter()
        .filter(|(_, ip)| !ip.is_loopback() && !ip.is_unspecified())
        .map(|(name, addr)| LookupInterface { name, addr })
        .collect();

    debug!("Discovered {} non-loopback interfaces", found.len());
    found
}

fn interface_name(addr: IpAddr) -> Option<String> {
    local_ip_address::list_afinet_netifas()
        .ok()?
        .into_iter()
        .find(|(_, ip)| *ip == addr)
        .map(|(name, _)| name)
}

/// Interface index for IPv6 multicast (0 lets the kernel choose).
#[cfg(unix)]
pub(crate) fn interface_index(name: &str) -> u32 {
    match std::ffi::CString::new(name) {
        // SAFETY: `name` is a valid NUL-terminated string for the call's duration.
        Ok(c_name) => unsafe { libc::if_nametoindex(c_name.as_ptr()) },
        Err(_) => 0,
    }
}

#[cfg(not(unix))]
pub(crate) fn interface_index(_name: &str) -> u32 {
    0
}
