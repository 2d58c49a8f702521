// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end discovery over loopback UDP: plugin on one side, responder on
//! the other, unicast lookup endpoint.

use locator_discovery::{
    DirectoryRequest, DirectoryResponse, DirectoryServiceHandle, DirectoryTarget,
    DiscoveryConfig, Endpoint, Identity, LocatorDiscoveryPlugin, LookupResponder,
    NullDirectoryService, ProtocolVersion,
};
use std::time::Duration;

fn grid_handle(instance: &str, port: u16) -> DirectoryServiceHandle {
    DirectoryServiceHandle::new(
        Identity::locator(instance),
        ProtocolVersion::CURRENT,
        vec![Endpoint::tcp(format!("127.0.0.1:{}", port).parse().unwrap())],
    )
}

fn responder(handle: DirectoryServiceHandle) -> LookupResponder {
    let responder = LookupResponder::bind("127.0.0.1:0".parse().unwrap(), None, handle).unwrap();
    responder.start();
    responder
}

fn config(responders: &[&LookupResponder], instance: &str) -> DiscoveryConfig {
    DiscoveryConfig {
        lookup: responders
            .iter()
            .map(|r| r.local_addr().unwrap())
            .collect(),
        instance_name: instance.into(),
        timeout_ms: 200,
        retry_count: 3,
        trace_lookup: 2,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_resolve_over_loopback() {
    let grid = responder(grid_handle("DemoGrid", 4061));
    let cfg = config(&[&grid], "DemoGrid");
    let plugin = LocatorDiscoveryPlugin::initialize(&cfg, NullDirectoryService)
        .await
        .unwrap();

    let target = plugin.coordinator().resolve().await;
    assert_eq!(target, DirectoryTarget::Service(grid_handle("DemoGrid", 4061)));
    assert!(grid.answered() >= 1);

    // Forwarding reaches the invoker, which answers "not found" here
    let response = plugin
        .forwarder()
        .forward(&Identity::locator("DemoGrid"), &DirectoryRequest::GetRegistry)
        .await
        .unwrap();
    assert_eq!(response, DirectoryResponse::NotFound);

    plugin.destroy();
}

#[tokio::test]
async fn test_redundant_responders_merge() {
    let first = responder(grid_handle("DemoGrid", 4061));
    let second = responder(grid_handle("DemoGrid", 4062));
    let plugin =
        LocatorDiscoveryPlugin::initialize(&config(&[&first, &second], ""), NullDirectoryService)
            .await
            .unwrap();

    assert!(!plugin.coordinator().resolve().await.is_null());

    // The second reply may trail the first; wait for the merge
    let merged = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(current) = plugin.coordinator().current() {
                if current.endpoints().len() == 2 {
                    return current;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(merged.instance_name(), "DemoGrid");
    assert_eq!(plugin.coordinator().instance_name(), "DemoGrid");
}

#[tokio::test]
async fn test_other_instance_is_not_adopted() {
    let other = responder(grid_handle("OtherGrid", 4061));
    let mut cfg = config(&[&other], "DemoGrid");
    cfg.timeout_ms = 50;
    cfg.retry_count = 2;
    let plugin = LocatorDiscoveryPlugin::initialize(&cfg, NullDirectoryService)
        .await
        .unwrap();

    assert_eq!(plugin.coordinator().resolve().await, DirectoryTarget::Null);
    assert_eq!(other.answered(), 0);
    assert!(plugin.coordinator().next_retry().is_some());
}

#[tokio::test]
async fn test_get_locators_lists_every_instance() {
    let a = responder(grid_handle("GridA", 4061));
    let b = responder(grid_handle("GridB", 4062));
    let plugin = LocatorDiscoveryPlugin::initialize(&config(&[&a, &b], ""), NullDirectoryService)
        .await
        .unwrap();

    let found = plugin.get_locators("", Duration::from_millis(500)).await;
    assert_eq!(
        found,
        vec![grid_handle("GridA", 4061), grid_handle("GridB", 4062)]
    );

    let only_b = plugin.get_locators("GridB", Duration::from_secs(5)).await;
    assert_eq!(only_b, vec![grid_handle("GridB", 4062)]);
}
