use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::advertisement::ManagerConfig;

/// A local endpoint the daemon registers at start-up.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EndpointConfig {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub system_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<u8>,
    pub slot_count: u8,
    pub base_port: u16,
    pub multicast_group: Ipv4Addr,
    pub broadcast_interval_secs: u64,
    /// Unicast peers to advertise to in addition to multicast.
    pub addresses: Vec<String>,
    /// Port local endpoints accept data connections on.
    pub endpoint_port: u16,
    pub controls: Vec<EndpointConfig>,
    pub equipment: Vec<EndpointConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let manager = ManagerConfig::default();
        Self {
            system_id: 1,
            slot: None,
            slot_count: manager.slot_count,
            base_port: manager.base_port,
            multicast_group: manager.multicast_group,
            broadcast_interval_secs: manager.interval.as_secs(),
            addresses: Vec::new(),
            endpoint_port: 41000,
            controls: Vec::new(),
            equipment: Vec::new(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("crosspoint.toml"))
                .merge(Json::file("crosspoint.json"))
                .merge(Env::prefixed("CROSSPOINT_")),
        )
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        if config.slot_count == 0 {
            anyhow::bail!("slot_count must be at least 1");
        }
        if let Some(slot) = config.slot {
            if slot == 0 || slot > config.slot_count {
                anyhow::bail!("slot {} outside 1..={}", slot, config.slot_count);
            }
        }
        if config.broadcast_interval_secs == 0 {
            anyhow::bail!("broadcast_interval_secs must be positive");
        }
        Ok(config)
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            base_port: self.base_port,
            slot_count: self.slot_count,
            slot: self.slot,
            multicast_group: self.multicast_group,
            interval: Duration::from_secs(self.broadcast_interval_secs),
        }
    }
}
