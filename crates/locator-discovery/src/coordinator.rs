// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Directory-service discovery coordinator.
//!
//! Keeps the currently known directory service and, when there is none, runs
//! a bounded multicast lookup to find one. All mutable state lives in one
//! [`DiscoveryState`] behind a single mutex which is never held across an
//! `.await`.
//!
//! # Attempt lifecycle
//!
//! ```text
//! resolve() --cached--> Service(handle)
//!     |
//!     +--backing off--> Null
//!     |
//!     +--attempt in flight--> wait on its watch channel
//!     |
//!     +--otherwise--> spawn discover_once():
//!                       repeat retry_count times:
//!                         send on every view, wait `timeout` for a reply
//!                       reply    -> Service(handle)
//!                       nothing  -> Null, back off for retry_delay
//! ```
//!
//! Replies arrive through [`ReplySink::found_locator`] on whatever task the
//! transport receives them on, independently of which iteration sent the
//! request that triggered them.

use crate::config::DiscoveryConfig;
use crate::endpoint_group::{EndpointGroup, LookupView};
use crate::handle::{DirectoryServiceHandle, DirectoryTarget};
use crate::transport::{LookupTransport, ReplySink};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Timing and tracing knobs of the coordinator.
#[derive(Debug, Clone)]
pub struct LookupSettings {
    pub timeout: Duration,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub trace_level: u32,
    /// Expected instance name; empty pins to the first responder.
    pub instance_name: String,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self::from_config(&DiscoveryConfig::default())
    }
}

impl LookupSettings {
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self {
            timeout: config.timeout(),
            retry_count: config.retry_count(),
            retry_delay: config.retry_delay(),
            trace_level: config.trace_lookup,
            instance_name: config.instance_name.clone(),
        }
    }
}

struct PendingLookup {
    id: u64,
    result: watch::Sender<Option<DirectoryTarget>>,
}

struct ProbeState {
    instance_name: String,
    found: BTreeMap<String, DirectoryServiceHandle>,
    notify: Arc<Notify>,
}

impl ProbeState {
    /// Record `handle` if it matches the probe filter. Returns whether it did.
    fn record(&mut self, handle: &DirectoryServiceHandle) -> bool {
        if !self.instance_name.is_empty() && handle.instance_name() != self.instance_name {
            return false;
        }
        match self.found.get_mut(handle.instance_name()) {
            Some(known) => {
                known.merge_endpoints(handle.endpoints());
            }
            None => {
                self.found
                    .insert(handle.instance_name().to_string(), handle.clone());
            }
        }
        if !self.instance_name.is_empty() {
            self.notify.notify_one();
        }
        true
    }
}

struct DiscoveryState {
    current: Option<DirectoryServiceHandle>,
    pending: Option<PendingLookup>,
    instance_name: String,
    next_retry: Option<Instant>,
    warned: bool,
    probe: Option<ProbeState>,
}

struct Inner<T> {
    transport: T,
    views: Vec<LookupView>,
    settings: LookupSettings,
    state: Mutex<DiscoveryState>,
    probe_lock: tokio::sync::Mutex<()>,
    next_attempt_id: AtomicU64,
}

/// Finds and caches a directory service.
///
/// Cloning is cheap; all clones share the same state.
pub struct DiscoveryCoordinator<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for DiscoveryCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: LookupTransport> DiscoveryCoordinator<T> {
    pub fn new(transport: T, group: &EndpointGroup, settings: LookupSettings) -> Self {
        let state = DiscoveryState {
            current: None,
            pending: None,
            instance_name: settings.instance_name.clone(),
            next_retry: None,
            warned: false,
            probe: None,
        };
        Self {
            inner: Arc::new(Inner {
                transport,
                views: group.views().cloned().collect(),
                settings,
                state: Mutex::new(state),
                probe_lock: tokio::sync::Mutex::new(()),
                next_attempt_id: AtomicU64::new(1),
            }),
        }
    }

    /// Return the cached directory service, discovering one if needed.
    ///
    /// Never fails: when nothing can be found, or while backing off after an
    /// exhausted attempt, the [`DirectoryTarget::Null`] sentinel is returned.
    /// Concurrent callers share a single in-flight attempt.
    pub async fn resolve(&self) -> DirectoryTarget {
        let mut result = {
            let mut state = self.inner.state.lock();
            if let Some(current) = &state.current {
                return DirectoryTarget::Service(current.clone());
            }
            if let Some(deadline) = state.next_retry {
                if Instant::now() < deadline {
                    return DirectoryTarget::Null;
                }
            }
            match &state.pending {
                Some(pending) => pending.result.subscribe(),
                None => {
                    let id = self.inner.next_attempt_id.fetch_add(1, Ordering::Relaxed);
                    let (tx, rx) = watch::channel(None);
                    let reply = tx.subscribe();
                    state.pending = Some(PendingLookup { id, result: tx });
                    // Driven by its own task: an abandoned resolve() must not
                    // strand the callers waiting on the same attempt.
                    let inner = self.inner.clone();
                    tokio::spawn(async move { inner.discover_once(id, reply).await });
                    rx
                }
            }
        };

        let settled = result
            .wait_for(Option::is_some)
            .await
            .map(|target| target.clone())
            .ok()
            .flatten();
        settled.unwrap_or(DirectoryTarget::Null)
    }

    /// Feed a lookup reply into the coordinator.
    pub fn on_reply(&self, handle: DirectoryServiceHandle) {
        self.inner.on_reply(handle);
    }

    /// Forget `handle` if it is still the cached service. Returns whether it was.
    pub fn invalidate(&self, handle: &DirectoryServiceHandle) -> bool {
        let mut state = self.inner.state.lock();
        if state.current.as_ref() != Some(handle) {
            return false;
        }
        state.current = None;
        state.warned = false;
        if self.inner.settings.trace_level >= 1 {
            info!("Directory service {} invalidated", handle);
        }
        true
    }

    /// Probe for every directory service answering on the lookup endpoints.
    ///
    /// Sends one lookup round and collects replies for `wait`, or until a
    /// reply for `instance_name` arrives when it is non-empty. Replies for the
    /// same instance are merged. The cached service is not touched by the
    /// probe itself. Probes run one at a time.
    pub async fn find_locators(
        &self,
        instance_name: &str,
        wait: Duration,
    ) -> Vec<DirectoryServiceHandle> {
        let _probe = self.inner.probe_lock.lock().await;

        let notify = Arc::new(Notify::new());
        self.inner.state.lock().probe = Some(ProbeState {
            instance_name: instance_name.to_string(),
            found: BTreeMap::new(),
            notify: notify.clone(),
        });

        for view in &self.inner.views {
            if let Err(e) = self.inner.transport.send_lookup(view, instance_name).await {
                debug!("Probe lookup on {} failed: {}", view, e);
            }
        }

        if instance_name.is_empty() {
            tokio::time::sleep(wait).await;
        } else {
            let _ = tokio::time::timeout(wait, notify.notified()).await;
        }

        let probe = self.inner.state.lock().probe.take();
        probe
            .map(|p| p.found.into_values().collect())
            .unwrap_or_default()
    }

    /// Cached directory service, if any.
    pub fn current(&self) -> Option<DirectoryServiceHandle> {
        self.inner.state.lock().current.clone()
    }

    /// Pinned instance name (empty until pinned).
    pub fn instance_name(&self) -> String {
        self.inner.state.lock().instance_name.clone()
    }

    /// Earliest time a new attempt may start, if backing off.
    pub fn next_retry(&self) -> Option<Instant> {
        self.inner.state.lock().next_retry
    }

    /// Whether a discovery attempt is in flight.
    pub fn is_discovering(&self) -> bool {
        self.inner.state.lock().pending.is_some()
    }

    pub fn settings(&self) -> &LookupSettings {
        &self.inner.settings
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }
}

impl<T: LookupTransport> ReplySink for DiscoveryCoordinator<T> {
    fn found_locator(&self, handle: DirectoryServiceHandle) {
        self.on_reply(handle);
    }
}

impl<T: LookupTransport> Inner<T> {
    async fn discover_once(
        self: Arc<Self>,
        id: u64,
        mut reply: watch::Receiver<Option<DirectoryTarget>>,
    ) {
        let settings = &self.settings;
        let mut failed: HashSet<usize> = HashSet::new();

        for iteration in 1..=settings.retry_count {
            if reply.borrow().is_some() {
                break;
            }

            let instance_name = self.state.lock().instance_name.clone();
            if settings.trace_level >= 1 {
                info!(
                    "Looking up directory service (instance `{}`), attempt {}/{}",
                    instance_name, iteration, settings.retry_count
                );
            }

            for (index, view) in self.views.iter().enumerate() {
                match self.transport.send_lookup(view, &instance_name).await {
                    Ok(()) => {
                        if settings.trace_level >= 2 {
                            debug!("Sent lookup on {}", view);
                        }
                    }
                    Err(e) => {
                        failed.insert(index);
                        if settings.trace_level >= 1 {
                            info!("Lookup on {} failed: {}", view, e);
                        }
                    }
                }
            }

            if failed.len() == self.views.len() {
                if settings.trace_level >= 1 {
                    info!("Lookup failed on every view, giving up this attempt");
                }
                break;
            }

            let replied = tokio::time::timeout(settings.timeout, reply.wait_for(Option::is_some))
                .await
                .is_ok();
            if replied {
                break;
            }
            // A reply landing together with the timeout counts; no extra round.
            // Yield first so a reply woken in the same tick is delivered.
            tokio::task::yield_now().await;
            if reply.borrow().is_some() {
                break;
            }
        }

        self.settle(id);
    }

    /// Conclude attempt `id`, unless a reply already did.
    fn settle(&self, id: u64) {
        let mut state = self.state.lock();
        if state.pending.as_ref().map(|p| p.id) != Some(id) {
            return;
        }
        let Some(pending) = state.pending.take() else {
            return;
        };
        if pending.result.borrow().is_some() {
            return;
        }

        let target = match &state.current {
            Some(current) => DirectoryTarget::Service(current.clone()),
            None => {
                state.next_retry = Some(Instant::now() + self.settings.retry_delay);
                if self.settings.trace_level >= 1 {
                    info!(
                        "No directory service found after {} attempt(s), retrying in {:?}",
                        self.settings.retry_count, self.settings.retry_delay
                    );
                }
                DirectoryTarget::Null
            }
        };
        pending.result.send_replace(Some(target));
    }

    fn on_reply(&self, handle: DirectoryServiceHandle) {
        let mut state = self.state.lock();
        let trace_level = self.settings.trace_level;

        let probed = state
            .probe
            .as_mut()
            .map(|probe| probe.record(&handle))
            .unwrap_or(false);

        // Outside a discovery attempt, find_locators() owns the reply.
        if probed && state.pending.is_none() {
            if trace_level >= 2 {
                debug!("Locator search reply from {}", handle.identity());
            }
            return;
        }

        if !state.instance_name.is_empty() && handle.instance_name() != state.instance_name {
            let expected = state.instance_name.clone();
            state.mismatch(&expected, &handle, probed);
            return;
        }

        if let Some(current) = state.current.as_mut() {
            if current.protocol() != handle.protocol() {
                if trace_level >= 1 || !probed {
                    info!(
                        "Ignoring directory service reply from {}: protocol {} differs from {}",
                        handle.identity(),
                        handle.protocol(),
                        current.protocol()
                    );
                }
                return;
            }
            if !current.same_service(&handle) {
                let expected = current.instance_name().to_string();
                state.mismatch(&expected, &handle, probed);
                return;
            }
            let added = current.merge_endpoints(handle.endpoints());
            if trace_level >= 2 || (trace_level >= 1 && added > 0) {
                debug!(
                    "Directory service reply for `{}`: {} new endpoint(s)",
                    handle.instance_name(),
                    added
                );
            }
            return;
        }

        if trace_level >= 1 {
            info!("Found directory service {}", handle);
        }
        if state.instance_name.is_empty() {
            state.instance_name = handle.instance_name().to_string();
        }
        state.current = Some(handle.clone());
        state.next_retry = None;
        state.warned = false;
        if let Some(pending) = state.pending.take() {
            pending
                .result
                .send_replace(Some(DirectoryTarget::Service(handle)));
        }
    }
}

impl DiscoveryState {
    /// Log a reply from a foreign instance: warn once per cached service,
    /// then quietly. Adopting or invalidating a service re-arms the warning.
    fn mismatch(&mut self, expected: &str, handle: &DirectoryServiceHandle, probed: bool) {
        if !self.warned && !probed {
            self.warned = true;
            warn!(
                "Received directory service reply for instance `{}` while using `{}`; \
                 two deployments may share the lookup group",
                handle.instance_name(),
                expected
            );
        } else {
            debug!(
                "Ignoring directory service reply for instance `{}` (expected `{}`)",
                handle.instance_name(),
                expected
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{Endpoint, Identity, ProtocolVersion};
    use crate::transport::TransportError;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingTransport {
        sends: AtomicUsize,
    }

    impl LookupTransport for CountingTransport {
        async fn send_lookup(&self, _view: &LookupView, _name: &str) -> Result<(), TransportError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn handle(instance: &str, endpoints: &[&str]) -> DirectoryServiceHandle {
        DirectoryServiceHandle::new(
            Identity::locator(instance),
            ProtocolVersion::CURRENT,
            endpoints.iter().map(|e| e.parse::<Endpoint>().unwrap()).collect(),
        )
    }

    fn coordinator(settings: LookupSettings) -> DiscoveryCoordinator<CountingTransport> {
        let group = EndpointGroup::with_interfaces(&["127.0.0.1:4061".parse().unwrap()], &[]);
        DiscoveryCoordinator::new(CountingTransport::default(), &group, settings)
    }

    #[test]
    fn test_first_reply_adopted_and_pinned() {
        let coord = coordinator(LookupSettings::default());
        coord.on_reply(handle("A", &["tcp://10.0.0.1:1"]));
        assert_eq!(coord.current(), Some(handle("A", &["tcp://10.0.0.1:1"])));
        assert_eq!(coord.instance_name(), "A");
    }

    #[test]
    fn test_configured_instance_rejects_others() {
        let coord = coordinator(LookupSettings {
            instance_name: "A".into(),
            ..Default::default()
        });
        coord.on_reply(handle("B", &["tcp://10.0.0.1:1"]));
        assert!(coord.current().is_none());
        coord.on_reply(handle("A", &["tcp://10.0.0.2:1"]));
        assert_eq!(coord.current().unwrap().instance_name(), "A");
    }

    #[test]
    fn test_protocol_mismatch_ignored() {
        let coord = coordinator(LookupSettings::default());
        coord.on_reply(handle("A", &["tcp://10.0.0.1:1"]));
        let other = DirectoryServiceHandle::new(
            Identity::locator("A"),
            ProtocolVersion::new(2, 0),
            vec!["tcp://10.0.0.2:1".parse().unwrap()],
        );
        coord.on_reply(other);
        assert_eq!(coord.current().unwrap().endpoints().len(), 1);
    }

    #[test]
    fn test_invalidate_only_matching_handle() {
        let coord = coordinator(LookupSettings::default());
        coord.on_reply(handle("A", &["tcp://10.0.0.1:1"]));

        assert!(!coord.invalidate(&handle("A", &["tcp://10.0.0.9:1"])));
        assert!(coord.current().is_some());

        assert!(coord.invalidate(&handle("A", &["tcp://10.0.0.1:1"])));
        assert!(coord.current().is_none());
        // Pin survives invalidation
        assert_eq!(coord.instance_name(), "A");
    }

    #[tokio::test]
    async fn test_resolve_warm_cache_does_no_io() {
        let coord = coordinator(LookupSettings::default());
        coord.on_reply(handle("A", &["tcp://10.0.0.1:1"]));
        for _ in 0..5 {
            assert_eq!(
                coord.resolve().await,
                DirectoryTarget::Service(handle("A", &["tcp://10.0.0.1:1"]))
            );
        }
        assert_eq!(coord.transport().sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_sets_backoff() {
        let coord = coordinator(LookupSettings {
            timeout: Duration::from_millis(50),
            retry_count: 2,
            ..Default::default()
        });
        let start = Instant::now();
        assert_eq!(coord.resolve().await, DirectoryTarget::Null);
        assert_eq!(coord.transport().sends.load(Ordering::SeqCst), 2);
        assert!(!coord.is_discovering());

        let deadline = coord.next_retry().unwrap();
        assert!(deadline >= start + Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_probe_collects_without_touching_current() {
        let coord = coordinator(LookupSettings {
            instance_name: "A".into(),
            ..Default::default()
        });
        let probe = {
            let coord = coord.clone();
            tokio::spawn(async move { coord.find_locators("B", Duration::from_secs(5)).await })
        };
        while coord.transport().sends.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        coord.on_reply(handle("B", &["tcp://10.0.0.1:1"]));

        let found = probe.await.unwrap();
        assert_eq!(found, vec![handle("B", &["tcp://10.0.0.1:1"])]);
        assert!(coord.current().is_none());
    }

    #[test]
    fn test_mismatch_warning_rearmed_on_new_service() {
        let coord = coordinator(LookupSettings::default());
        let a = handle("A", &["tcp://10.0.0.1:1"]);
        coord.on_reply(a.clone());

        coord.on_reply(handle("B", &["tcp://10.0.0.9:1"]));
        assert!(coord.inner.state.lock().warned);

        assert!(coord.invalidate(&a));
        assert!(!coord.inner.state.lock().warned);

        coord.on_reply(handle("B", &["tcp://10.0.0.9:1"]));
        assert!(coord.inner.state.lock().warned);
        coord.on_reply(handle("A", &["tcp://10.0.0.2:1"]));
        assert!(!coord.inner.state.lock().warned);
    }
}
