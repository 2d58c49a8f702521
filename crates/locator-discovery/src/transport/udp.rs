// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP lookup transport.
//!
//! One send socket per lookup view (multicast interface pinned for multicast
//! targets) and one reply socket per reply endpoint. Sockets are created once
//! and never reconfigured, so concurrent sends only share immutable state.

use super::{LookupTransport, ReplySink, TransportError};
use crate::endpoint_group::{interface_index, EndpointGroup, LookupInterface, LookupView};
use crate::handle::DirectoryServiceHandle;
use crate::protocol::{LookupMessage, MAX_DATAGRAM_SIZE};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

enum ViewSocket {
    Ready(UdpSocket),
    Unavailable(String),
}

/// Lookup transport over UDP (multicast or unicast lookup endpoints).
pub struct UdpLookupTransport {
    sockets: HashMap<LookupView, ViewSocket>,
    reply: Vec<SocketAddr>,
}

impl UdpLookupTransport {
    /// Create send sockets for every view of `group`. Replies are requested
    /// on `reply` (typically [`ReplyListener::local_addrs`]).
    ///
    /// A view whose socket cannot be set up is kept and reported as
    /// unavailable on send, so the other views keep working.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(group: &EndpointGroup, reply: Vec<SocketAddr>) -> Self {
        let mut sockets = HashMap::with_capacity(group.view_count());
        for view in group.views() {
            let socket = match lookup_socket(view) {
                Ok(socket) => ViewSocket::Ready(socket),
                Err(e) => {
                    warn!("Cannot create lookup socket for {}: {}", view, e);
                    ViewSocket::Unavailable(e.to_string())
                }
            };
            sockets.insert(view.clone(), socket);
        }
        Self { sockets, reply }
    }

    /// Reply addresses advertised in lookups.
    pub fn reply_addrs(&self) -> &[SocketAddr] {
        &self.reply
    }

    /// Reply addresses of the view's address family (all of them if none match).
    fn reply_for(&self, view: &LookupView) -> Vec<SocketAddr> {
        let same_family: Vec<SocketAddr> = self
            .reply
            .iter()
            .copied()
            .filter(|a| a.is_ipv4() == view.target.is_ipv4())
            .collect();
        if same_family.is_empty() {
            self.reply.clone()
        } else {
            same_family
        }
    }
}

impl LookupTransport for UdpLookupTransport {
    async fn send_lookup(
        &self,
        view: &LookupView,
        instance_name: &str,
    ) -> Result<(), TransportError> {
        let socket = match self.sockets.get(view) {
            Some(ViewSocket::Ready(socket)) => socket,
            Some(ViewSocket::Unavailable(reason)) => {
                return Err(TransportError::Unavailable(format!("{}: {}", view, reason)));
            }
            None => return Err(TransportError::UnknownView(view.to_string())),
        };

        let payload = LookupMessage::find_locator(instance_name, &self.reply_for(view)).encode()?;
        socket.send_to(&payload, view.target).await?;
        Ok(())
    }
}

fn lookup_socket(view: &LookupView) -> io::Result<UdpSocket> {
    let domain = if view.target.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

    if view.is_multicast() {
        match (&view.target.ip(), &view.interface) {
            (
                IpAddr::V4(_),
                Some(LookupInterface {
                    addr: IpAddr::V4(iface),
                    ..
                }),
            ) => socket.set_multicast_if_v4(iface)?,
            (IpAddr::V6(_), Some(iface)) => {
                socket.set_multicast_if_v6(interface_index(&iface.name))?
            }
            _ => {}
        }
        if view.target.is_ipv4() {
            socket.set_multicast_loop_v4(true)?;
            if let Err(e) = socket.set_multicast_ttl_v4(1) {
                debug!("Cannot set multicast TTL for {}: {}", view, e);
            }
        } else {
            socket.set_multicast_loop_v6(true)?;
        }
    }

    let bind = unspecified(view.target.ip());
    socket.bind(&bind.into())?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

fn unspecified(like: IpAddr) -> SocketAddr {
    match like {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    }
}

/// Receives `found_locator` replies and hands them to a [`ReplySink`].
pub struct ReplyListener {
    sockets: Vec<Arc<UdpSocket>>,
    local_addrs: Vec<SocketAddr>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ReplyListener {
    /// Bind one reply socket per endpoint. Nothing is received until
    /// [`start`](Self::start) is called.
    pub async fn bind(endpoints: &[SocketAddr]) -> Result<Self, TransportError> {
        let mut sockets = Vec::with_capacity(endpoints.len());
        let mut local_addrs = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let socket = UdpSocket::bind(endpoint).await?;
            let local = socket.local_addr()?;
            debug!("Reply socket bound on {}", local);
            local_addrs.push(local);
            sockets.push(Arc::new(socket));
        }
        Ok(Self {
            sockets,
            local_addrs,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Actual bound addresses (ephemeral ports resolved).
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Spawn one receive task per reply socket.
    pub fn start<S: ReplySink>(&self, sink: Arc<S>) {
        let mut tasks = self.tasks.lock();
        for socket in &self.sockets {
            let socket = socket.clone();
            let sink = sink.clone();
            tasks.push(tokio::spawn(receive_replies(socket, sink)));
        }
    }

    /// Stop all receive tasks.
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for ReplyListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn receive_replies<S: ReplySink>(socket: Arc<UdpSocket>, sink: Arc<S>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            // ICMP port-unreachable from an earlier send surfaces here on some platforms
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
            Err(e) => {
                warn!("Reply socket receive failed, stopping listener: {}", e);
                break;
            }
        };

        match LookupMessage::decode(&buf[..len]) {
            Ok(LookupMessage::FoundLocator { locator }) => {
                match DirectoryServiceHandle::try_from(locator) {
                    Ok(handle) => sink.found_locator(handle),
                    Err(e) => debug!("Ignoring reply from {}: {}", from, e),
                }
            }
            Ok(other) => debug!(
                "Unexpected message on reply socket from {}: {:?}",
                from, other
            ),
            Err(e) => debug!("Malformed reply from {}: {}", from, e),
        }
    }
}
