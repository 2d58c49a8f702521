// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Directory-service side of the lookup protocol.
//!
//! A [`LookupResponder`] listens on a lookup endpoint and answers every
//! `find_locator` request for its instance (or for any instance, when the
//! request leaves the name empty) with a `found_locator` reply sent to each
//! reply address listed in the request.

use crate::handle::DirectoryServiceHandle;
use crate::protocol::{reply_addresses, LookupMessage, MAX_DATAGRAM_SIZE};
use crate::transport::TransportError;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Answers lookups on one endpoint with a fixed directory-service handle.
pub struct LookupResponder {
    socket: Arc<UdpSocket>,
    handle: Arc<DirectoryServiceHandle>,
    answered: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LookupResponder {
    /// Bind `endpoint`. A multicast endpoint is joined on `interface` (or the
    /// default interface), with the socket bound to the wildcard address.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(
        endpoint: SocketAddr,
        interface: Option<IpAddr>,
        handle: DirectoryServiceHandle,
    ) -> Result<Self, TransportError> {
        let socket = responder_socket(endpoint, interface)?;
        info!(
            "Lookup responder for `{}` listening on {}",
            handle.instance_name(),
            endpoint
        );
        Ok(Self {
            socket: Arc::new(socket),
            handle: Arc::new(handle),
            answered: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn handle(&self) -> &DirectoryServiceHandle {
        &self.handle
    }

    /// Number of `found_locator` replies sent so far.
    pub fn answered(&self) -> u64 {
        self.answered.load(Ordering::Relaxed)
    }

    /// Spawn the receive loop. Calling it again while running is a no-op.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        *task = Some(tokio::spawn(serve(
            self.socket.clone(),
            self.handle.clone(),
            self.answered.clone(),
        )));
    }

    /// Stop the receive loop.
    pub fn shutdown(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for LookupResponder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn serve(
    socket: Arc<UdpSocket>,
    handle: Arc<DirectoryServiceHandle>,
    answered: Arc<AtomicU64>,
) {
    let local_v4 = socket.local_addr().map(|a| a.is_ipv4()).unwrap_or(true);
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
            Err(e) => {
                warn!("Lookup responder receive failed, stopping: {}", e);
                break;
            }
        };

        let (instance_name, reply) = match LookupMessage::decode(&buf[..len]) {
            Ok(LookupMessage::FindLocator {
                instance_name,
                reply,
            }) => (instance_name, reply),
            Ok(_) => continue,
            Err(e) => {
                debug!("Malformed lookup from {}: {}", from, e);
                continue;
            }
        };

        if !instance_name.is_empty() && instance_name != handle.instance_name() {
            debug!(
                "Ignoring lookup from {} for instance `{}`",
                from, instance_name
            );
            continue;
        }

        let payload = match LookupMessage::found_locator(&handle).encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Cannot encode lookup reply: {}", e);
                continue;
            }
        };

        for addr in reply_addresses(&reply) {
            let addr = resolve_reply_addr(addr, from);
            if addr.is_ipv4() != local_v4 {
                continue;
            }
            match socket.send_to(&payload, addr).await {
                Ok(_) => {
                    answered.fetch_add(1, Ordering::Relaxed);
                    debug!("Answered lookup from {} at {}", from, addr);
                }
                Err(e) => debug!("Cannot send lookup reply to {}: {}", addr, e),
            }
        }
    }
}

/// A wildcard reply address means "the host the request came from".
fn resolve_reply_addr(addr: SocketAddr, from: SocketAddr) -> SocketAddr {
    if addr.ip().is_unspecified() {
        SocketAddr::new(from.ip(), addr.port())
    } else {
        addr
    }
}

fn responder_socket(endpoint: SocketAddr, interface: Option<IpAddr>) -> io::Result<UdpSocket> {
    let domain = if endpoint.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    if endpoint.ip().is_multicast() {
        #[cfg(unix)]
        set_reuseport(&socket)?;

        match endpoint.ip() {
            IpAddr::V4(group) => {
                let bind = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), endpoint.port());
                socket.bind(&bind.into())?;
                let iface = match interface {
                    Some(IpAddr::V4(iface)) => iface,
                    _ => Ipv4Addr::UNSPECIFIED,
                };
                socket.join_multicast_v4(&group, &iface)?;
            }
            IpAddr::V6(group) => {
                socket.set_only_v6(true)?;
                let bind = SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), endpoint.port());
                socket.bind(&bind.into())?;
                socket.join_multicast_v6(&group, 0)?;
            }
        }
    } else {
        socket.bind(&endpoint.into())?;
    }

    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

#[cfg(unix)]
fn set_reuseport(socket: &Socket) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let optval: libc::c_int = 1;
    // SAFETY: valid fd owned by `socket`, optval sized as c_int
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_REUSEPORT,
            &optval as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{Endpoint, Identity, ProtocolVersion};
    use std::time::Duration;

    fn demo_handle() -> DirectoryServiceHandle {
        DirectoryServiceHandle::new(
            Identity::locator("DemoGrid"),
            ProtocolVersion::CURRENT,
            vec![Endpoint::tcp("10.0.0.1:4061".parse().unwrap())],
        )
    }

    async fn ask(responder: &LookupResponder, instance: &str) -> Option<LookupMessage> {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let reply = client.local_addr().unwrap();
        let request = LookupMessage::find_locator(instance, &[reply]).encode().unwrap();
        client
            .send_to(&request, responder.local_addr().unwrap())
            .await
            .unwrap();

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        match tokio::time::timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => Some(LookupMessage::decode(&buf[..len]).unwrap()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_answers_matching_and_wildcard_lookups() {
        let responder =
            LookupResponder::bind("127.0.0.1:0".parse().unwrap(), None, demo_handle()).unwrap();
        responder.start();

        let expected = LookupMessage::found_locator(&demo_handle());
        assert_eq!(ask(&responder, "DemoGrid").await, Some(expected.clone()));
        assert_eq!(ask(&responder, "").await, Some(expected));
        assert_eq!(responder.answered(), 2);
    }

    #[tokio::test]
    async fn test_ignores_other_instances() {
        let responder =
            LookupResponder::bind("127.0.0.1:0".parse().unwrap(), None, demo_handle()).unwrap();
        responder.start();

        assert_eq!(ask(&responder, "OtherGrid").await, None);
        assert_eq!(responder.answered(), 0);
    }

    #[test]
    fn test_wildcard_reply_uses_source_host() {
        let from: SocketAddr = "192.168.1.7:5000".parse().unwrap();
        assert_eq!(
            resolve_reply_addr("0.0.0.0:6000".parse().unwrap(), from),
            "192.168.1.7:6000".parse().unwrap()
        );
        let explicit: SocketAddr = "10.0.0.2:6000".parse().unwrap();
        assert_eq!(resolve_reply_addr(explicit, from), explicit);
    }
}
