// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Locator discovery
//!
//! Finds a directory service (a "locator") over UDP multicast, caches it and
//! forwards directory lookups to it.
//!
//! - [`DiscoveryCoordinator`] owns the cached handle. Concurrent
//!   [`resolve`](DiscoveryCoordinator::resolve) calls share one bounded lookup
//!   attempt; an exhausted attempt backs off for `retry_delay`.
//! - [`RequestForwarder`] sends directory requests to the resolved service,
//!   invalidating a failing handle and retrying once.
//! - [`NullDirectoryService`] answers "not found" while nothing is known.
//! - [`LookupResponder`] is the directory-service side of the lookup protocol.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use locator_discovery::{
//!     DirectoryRequest, DiscoveryConfig, Identity, LocatorDiscoveryPlugin,
//!     NullDirectoryService,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DiscoveryConfig {
//!     instance_name: "DemoGrid".into(),
//!     ..Default::default()
//! };
//! let plugin = LocatorDiscoveryPlugin::initialize(&config, NullDirectoryService).await?;
//!
//! let forwarder = plugin.forwarder();
//! let response = forwarder
//!     .forward(&Identity::locator("DemoGrid"), &DirectoryRequest::GetRegistry)
//!     .await?;
//! println!("found: {}", response.is_found());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod directory;
pub mod endpoint_group;
pub mod error;
pub mod forwarder;
pub mod handle;
pub mod plugin;
pub mod protocol;
pub mod responder;
pub mod transport;

pub use config::{ConfigError, DiscoveryConfig, Properties, DEFAULT_PORT, DEFAULT_PREFIX};
pub use coordinator::{DiscoveryCoordinator, LookupSettings};
pub use directory::{
    DirectoryInvoker, DirectoryRequest, DirectoryResponse, NullDirectoryService, ObjectRecord,
};
pub use endpoint_group::{EndpointGroup, LookupGroup, LookupInterface, LookupView};
pub use error::{ForwardError, ForwardResult, InvokeError};
pub use forwarder::RequestForwarder;
pub use handle::{
    DirectoryServiceHandle, DirectoryTarget, Endpoint, HandleError, Identity, ProtocolVersion,
    Transport,
};
pub use plugin::{LocatorDiscoveryPlugin, PluginError};
pub use protocol::{LookupMessage, ProtocolError};
pub use responder::LookupResponder;
pub use transport::{LookupTransport, ReplyListener, ReplySink, TransportError, UdpLookupTransport};
