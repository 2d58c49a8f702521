// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Locator probe
//!
//! Command-line companion of the `locator-discovery` crate:
//! - `find` lists the directory services answering on the lookup group
//! - `resolve` runs one coordinator resolve, exactly as a client would
//! - `serve` answers lookups with a given directory-service handle
//!
//! # Usage
//!
//! ```bash
//! # List every directory service on the default multicast groups
//! locator-probe find --wait-ms 1000
//!
//! # Resolve instance DemoGrid over an explicit unicast lookup endpoint
//! locator-probe --lookup 10.0.0.5:4061 resolve --instance DemoGrid
//!
//! # Answer lookups for DemoGrid
//! locator-probe serve --instance DemoGrid --endpoint tcp://10.0.0.5:4062
//! ```

use clap::{Parser, Subcommand};
use locator_discovery::{
    DirectoryServiceHandle, DirectoryTarget, DiscoveryConfig, Endpoint, Identity,
    LocatorDiscoveryPlugin, LookupResponder, NullDirectoryService, Properties, ProtocolVersion,
    DEFAULT_PREFIX,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Locator probe - find, resolve and serve directory-service lookups
#[derive(Parser, Debug)]
#[command(name = "locator-probe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Properties file (`key = value`)
    #[arg(long, conflicts_with = "config")]
    properties: Option<PathBuf>,

    /// Property prefix used with --properties
    #[arg(long, default_value = DEFAULT_PREFIX)]
    prefix: String,

    /// Explicit lookup endpoint(s), overriding the configured ones
    #[arg(short, long)]
    lookup: Vec<SocketAddr>,

    /// Discovery trace level (0 silent, 1 lifecycle, 2 datagrams)
    #[arg(long)]
    trace_lookup: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List directory services answering on the lookup endpoints
    Find {
        /// Only list this instance (stops at its first reply)
        #[arg(short, long, default_value = "")]
        instance: String,

        /// How long to collect replies, in milliseconds
        #[arg(long, default_value = "1000")]
        wait_ms: u64,
    },

    /// Resolve the directory service once and print it
    Resolve {
        /// Expected instance name (first responder when empty)
        #[arg(short, long)]
        instance: Option<String>,
    },

    /// Answer lookups with the given handle until interrupted
    Serve {
        /// Instance name to answer for
        #[arg(short, long)]
        instance: String,

        /// Directory-service endpoint(s) to advertise (`tcp://host:port`)
        #[arg(short, long, required = true)]
        endpoint: Vec<Endpoint>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = load_config(&args)?;

    match args.command {
        Command::Find { instance, wait_ms } => {
            let plugin = LocatorDiscoveryPlugin::initialize(&config, NullDirectoryService).await?;
            let found = plugin
                .get_locators(&instance, Duration::from_millis(wait_ms))
                .await;
            if found.is_empty() {
                println!("No directory service found");
            }
            for handle in &found {
                print_handle(handle);
            }
            plugin.destroy();
        }
        Command::Resolve { instance } => {
            if let Some(instance) = instance {
                config.instance_name = instance;
            }
            let plugin = LocatorDiscoveryPlugin::initialize(&config, NullDirectoryService).await?;
            let started = Instant::now();
            let target = plugin.coordinator().resolve().await;
            let elapsed = started.elapsed();
            match target {
                DirectoryTarget::Service(handle) => {
                    print_handle(&handle);
                    println!("resolved in {:?}", elapsed);
                }
                DirectoryTarget::Null => {
                    println!("No directory service found after {:?}", elapsed);
                }
            }
            plugin.destroy();
        }
        Command::Serve { instance, endpoint } => {
            config.instance_name = instance.clone();
            config.validate()?;
            let handle = DirectoryServiceHandle::new(
                Identity::locator(instance),
                ProtocolVersion::CURRENT,
                endpoint,
            );

            let mut responders = Vec::new();
            for lookup in config.lookup_endpoints() {
                match LookupResponder::bind(lookup, config.interface, handle.clone()) {
                    Ok(responder) => {
                        responder.start();
                        responders.push(responder);
                    }
                    Err(e) => tracing::warn!("Cannot answer lookups on {}: {}", lookup, e),
                }
            }
            if responders.is_empty() {
                return Err("no lookup endpoint could be bound".into());
            }

            info!("Serving {} (Ctrl-C to stop)", handle);
            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received, stopping responders...");

            let answered: u64 = responders.iter().map(|r| r.answered()).sum();
            for responder in &responders {
                responder.shutdown();
            }
            info!("Answered {} lookup(s)", answered);
        }
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<DiscoveryConfig, Box<dyn std::error::Error>> {
    let mut config = if let Some(path) = &args.config {
        info!("Loading config from {:?}", path);
        DiscoveryConfig::from_file(path)?
    } else if let Some(path) = &args.properties {
        info!("Loading properties from {:?}", path);
        DiscoveryConfig::from_properties(&Properties::load(path)?, &args.prefix)?
    } else {
        DiscoveryConfig::default()
    };

    if !args.lookup.is_empty() {
        config.lookup = args.lookup.clone();
    }
    if let Some(level) = args.trace_lookup {
        config.trace_lookup = level;
    }
    Ok(config)
}

fn print_handle(handle: &DirectoryServiceHandle) {
    println!("{} (protocol {})", handle.identity(), handle.protocol());
    for endpoint in handle.endpoints() {
        println!("  {}", endpoint);
    }
}
