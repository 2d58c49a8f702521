// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared fakes for the integration tests.

#![allow(dead_code)]

use locator_discovery::{
    DirectoryServiceHandle, DiscoveryCoordinator, EndpointGroup, Endpoint, Identity,
    LookupSettings, LookupTransport, LookupView, ProtocolVersion, ReplySink, TransportError,
};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// In-memory lookup transport.
///
/// Counts sends, fails sends on selected views, and optionally answers each
/// successful send with the next queued handle.
#[derive(Default)]
pub struct FakeTransport {
    sends: AtomicUsize,
    failing: Mutex<HashSet<SocketAddr>>,
    replies: Mutex<VecDeque<DirectoryServiceHandle>>,
    sink: OnceLock<Arc<dyn ReplySink>>,
}

impl FakeTransport {
    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn fail_view(&self, target: SocketAddr) {
        self.failing.lock().insert(target);
    }

    pub fn queue_reply(&self, handle: DirectoryServiceHandle) {
        self.replies.lock().push_back(handle);
    }

    pub fn connect(&self, sink: Arc<dyn ReplySink>) {
        let _ = self.sink.set(sink);
    }
}

impl LookupTransport for FakeTransport {
    async fn send_lookup(&self, view: &LookupView, _name: &str) -> Result<(), TransportError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().contains(&view.target) {
            return Err(TransportError::Unavailable(view.to_string()));
        }
        let reply = self.replies.lock().pop_front();
        if let (Some(handle), Some(sink)) = (reply, self.sink.get()) {
            sink.found_locator(handle);
        }
        Ok(())
    }
}

pub const VIEW_A: &str = "127.0.0.1:4061";
pub const VIEW_B: &str = "127.0.0.1:4062";

pub fn settings(timeout_ms: u64, retry_count: u32) -> LookupSettings {
    LookupSettings {
        timeout: Duration::from_millis(timeout_ms),
        retry_count,
        retry_delay: Duration::from_millis(2000),
        trace_level: 2,
        instance_name: String::new(),
    }
}

/// Coordinator over a fake transport with the given unicast views.
pub fn coordinator_with_views(
    views: &[&str],
    settings: LookupSettings,
) -> DiscoveryCoordinator<FakeTransport> {
    let endpoints: Vec<SocketAddr> = views.iter().map(|v| v.parse().unwrap()).collect();
    let group = EndpointGroup::with_interfaces(&endpoints, &[]);
    let coord = DiscoveryCoordinator::new(FakeTransport::default(), &group, settings);
    coord.transport().connect(Arc::new(coord.clone()));
    coord
}

pub fn coordinator(settings: LookupSettings) -> DiscoveryCoordinator<FakeTransport> {
    coordinator_with_views(&[VIEW_A], settings)
}

pub fn handle(instance: &str, endpoints: &[&str]) -> DirectoryServiceHandle {
    DirectoryServiceHandle::new(
        Identity::locator(instance),
        ProtocolVersion::CURRENT,
        endpoints
            .iter()
            .map(|e| e.parse::<Endpoint>().unwrap())
            .collect(),
    )
}

/// Poll `f` every millisecond until it holds. Sleeping (rather than
/// yielding) lets a paused clock auto-advance to pending timers.
pub async fn until(mut f: impl FnMut() -> bool) {
    while !f() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
