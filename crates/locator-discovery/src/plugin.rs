// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ready-to-use wiring of the discovery stack over UDP.
//!
//! ```text
//! DiscoveryConfig -> EndpointGroup -> UdpLookupTransport -+
//!                                                         v
//!          ReplyListener --found_locator--> DiscoveryCoordinator
//!                                                         ^
//!                  RequestForwarder --resolve/invalidate--+
//! ```

use crate::config::{ConfigError, DiscoveryConfig};
use crate::coordinator::{DiscoveryCoordinator, LookupSettings};
use crate::directory::DirectoryInvoker;
use crate::endpoint_group::EndpointGroup;
use crate::forwarder::RequestForwarder;
use crate::handle::{DirectoryServiceHandle, Identity};
use crate::transport::{ReplyListener, TransportError, UdpLookupTransport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Discovery coordinator, reply listener and forwarder bound to one config.
pub struct LocatorDiscoveryPlugin<I> {
    coordinator: DiscoveryCoordinator<UdpLookupTransport>,
    forwarder: Arc<RequestForwarder<UdpLookupTransport, I>>,
    listener: ReplyListener,
    destroyed: AtomicBool,
}

impl<I: DirectoryInvoker> LocatorDiscoveryPlugin<I> {
    /// Validate `config`, open the lookup and reply sockets and start
    /// listening for replies. `invoker` carries forwarded requests to the
    /// discovered directory service.
    pub async fn initialize(config: &DiscoveryConfig, invoker: I) -> Result<Self, PluginError> {
        config.validate()?;

        let group = EndpointGroup::from_config(config)?;
        let listener = ReplyListener::bind(&config.reply_endpoints()).await?;
        let transport = UdpLookupTransport::new(&group, listener.local_addrs().to_vec());
        let coordinator =
            DiscoveryCoordinator::new(transport, &group, LookupSettings::from_config(config));
        listener.start(Arc::new(coordinator.clone()));

        let published = if config.instance_name.is_empty() {
            generate_forwarder_name()
        } else {
            config.instance_name.clone()
        };
        let forwarder = Arc::new(RequestForwarder::new(
            Identity::locator(published),
            coordinator.clone(),
            invoker,
        ));

        info!(
            "Locator discovery ready: {} lookup view(s), replies on {:?}, forwarding as {}",
            group.view_count(),
            listener.local_addrs(),
            forwarder.identity()
        );

        Ok(Self {
            coordinator,
            forwarder,
            listener,
            destroyed: AtomicBool::new(false),
        })
    }

    /// Forwarder serving directory requests addressed to the published identity.
    pub fn forwarder(&self) -> Arc<RequestForwarder<UdpLookupTransport, I>> {
        self.forwarder.clone()
    }

    pub fn coordinator(&self) -> &DiscoveryCoordinator<UdpLookupTransport> {
        &self.coordinator
    }

    /// Probe for directory services of `instance_name` (all, when empty).
    pub async fn get_locators(
        &self,
        instance_name: &str,
        wait: Duration,
    ) -> Vec<DirectoryServiceHandle> {
        self.coordinator.find_locators(instance_name, wait).await
    }

    /// Stop receiving replies. Idempotent.
    pub fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            self.listener.shutdown();
            info!("Locator discovery destroyed");
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// Unique name for a forwarder without a configured instance name
/// (timestamp plus thread hash).
fn generate_forwarder_name() -> String {
    use std::hash::{Hash, Hasher};
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    format!("{:016x}{:08x}", nanos, hasher.finish() as u32)
}

/// Plugin setup errors.
#[derive(Debug)]
pub enum PluginError {
    Config(ConfigError),
    Transport(TransportError),
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Invalid discovery configuration: {}", e),
            Self::Transport(e) => write!(f, "Cannot set up lookup transport: {}", e),
        }
    }
}

impl std::error::Error for PluginError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Transport(e) => Some(e),
        }
    }
}

impl From<ConfigError> for PluginError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<TransportError> for PluginError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::NullDirectoryService;

    #[tokio::test]
    async fn test_initialize_and_destroy() {
        let config = DiscoveryConfig {
            lookup: vec!["127.0.0.1:9".parse().unwrap()],
            instance_name: "DemoGrid".into(),
            ..Default::default()
        };
        let plugin = LocatorDiscoveryPlugin::initialize(&config, NullDirectoryService)
            .await
            .unwrap();
        assert_eq!(
            plugin.forwarder().identity(),
            &Identity::locator("DemoGrid")
        );
        assert_eq!(plugin.coordinator().instance_name(), "DemoGrid");

        plugin.destroy();
        plugin.destroy();
        assert!(plugin.is_destroyed());
    }

    #[tokio::test]
    async fn test_initialize_rejects_invalid_config() {
        let config = DiscoveryConfig {
            instance_name: "Demo/Grid".into(),
            ..Default::default()
        };
        let result = LocatorDiscoveryPlugin::initialize(&config, NullDirectoryService).await;
        assert!(matches!(result, Err(PluginError::Config(_))));
    }

    #[test]
    fn test_generated_names_are_hex() {
        let name = generate_forwarder_name();
        assert_eq!(name.len(), 24);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
