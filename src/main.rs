//! Crosspoint daemon entry point.

use std::sync::Arc;

use log::{error, info, warn};
use tokio::signal;

use crosspoint::advertisement::{Advertisement, AdvertisementListener};
use crosspoint::config::Config;
use crosspoint::registry::{EndpointKind, LocalRegistryFactory, Registry};

/// Logs what peers advertise.
struct DiscoveryLog {
    system_id: i32,
}

impl AdvertisementListener for DiscoveryLog {
    fn discovered(&self, advertisement: &Advertisement) {
        info!(
            "System {}: {} advertises {} controls, {} equipment",
            self.system_id,
            advertisement.source,
            advertisement.controls.len(),
            advertisement.equipment.len()
        );
    }

    fn removed(&self, advertisement: &Advertisement) {
        info!(
            "System {}: {} withdrew {} controls, {} equipment",
            self.system_id,
            advertisement.source,
            advertisement.controls.len(),
            advertisement.equipment.len()
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting crosspoint daemon with config: {:?}", cfg);

    let factory = Arc::new(LocalRegistryFactory::new(cfg.endpoint_port));
    let registry = Registry::new(cfg.manager_config(), factory.clone());

    let system = registry.create(cfg.system_id).await?;
    system
        .manager()
        .add_listener(Arc::new(DiscoveryLog { system_id: system.id() }));
    system.manager().add_addresses(&cfg.addresses);

    // Local endpoints
    for (kind, endpoints) in [
        (EndpointKind::Control, &cfg.controls),
        (EndpointKind::Equipment, &cfg.equipment),
    ] {
        if endpoints.is_empty() {
            continue;
        }
        let local = factory.create_local(kind, system.id());
        if !system.attach(kind, local.clone()) {
            warn!("System {} already has a {} registry", system.id(), kind);
            continue;
        }
        for endpoint in endpoints {
            local.register(endpoint.id, endpoint.name.clone());
        }
    }

    // Graceful Shutdown
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    let manager = system.manager();
    let controls = system
        .registry(EndpointKind::Control)
        .map(|r| r.endpoints())
        .unwrap_or_default();
    let equipment = system
        .registry(EndpointKind::Equipment)
        .map(|r| r.endpoints())
        .unwrap_or_default();
    let sent = manager.withdraw(controls, equipment).await;
    info!("Withdrew local endpoints ({} datagrams)", sent);

    registry.shutdown().await;
    info!("Shutdown complete.");
    Ok(())
}
