//! Composition of discovery and endpoint registries.
//!
//! A [`Registry`] maps system ids to [`System`]s.  Each system owns one
//! [`AdvertisementManager`](crate::advertisement::AdvertisementManager) and up
//! to one control and one equipment [`EndpointRegistry`], and routes what the
//! manager discovers into them.  The endpoint registries themselves are
//! collaborators behind a trait; [`LocalRegistry`] is an in-memory one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::info;
use tokio::sync::RwLock;

use crate::advertisement::ManagerConfig;
use crate::error::{Error, Result};
use crate::types::{CrosspointInfo, HostInfo};

mod local;
mod system;

pub use local::{LocalRegistry, LocalRegistryFactory};
pub use system::System;

/// Called with each endpoint registered locally.
pub type RegisteredListener = Box<dyn Fn(&CrosspointInfo) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// Consumers of signals.
    Control,
    /// Producers of signals.
    Equipment,
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Control => f.write_str("control"),
            Self::Equipment => f.write_str("equipment"),
        }
    }
}

/// The part of a control or equipment registry discovery depends on.
pub trait EndpointRegistry: Send + Sync {
    /// Where this registry accepts connections.
    fn host_info(&self) -> HostInfo;

    /// Locally registered endpoints.
    fn endpoints(&self) -> Vec<CrosspointInfo>;

    fn on_endpoint_registered(&self, listener: RegisteredListener);

    /// Caches an endpoint some peer hosts.
    fn add_endpoint_info(&self, info: CrosspointInfo);

    fn remove_endpoint_info(&self, info: &CrosspointInfo);
}

/// Creates registries the first time a system needs one.
pub trait RegistryFactory: Send + Sync {
    fn create(&self, kind: EndpointKind, system_id: i32) -> Arc<dyn EndpointRegistry>;
}

/// All systems of this process, by id.
pub struct Registry {
    config: ManagerConfig,
    factory: Arc<dyn RegistryFactory>,
    systems: RwLock<HashMap<i32, Arc<System>>>,
}

impl Registry {
    pub fn new(config: ManagerConfig, factory: Arc<dyn RegistryFactory>) -> Self {
        Self {
            config,
            factory,
            systems: RwLock::new(HashMap::new()),
        }
    }

    /// Starts a new system; fails if the id is taken.
    pub async fn create(&self, system_id: i32) -> Result<Arc<System>> {
        let mut systems = self.systems.write().await;
        if systems.contains_key(&system_id) {
            return Err(Error::SystemExists(system_id));
        }
        let system = self.start(system_id).await?;
        systems.insert(system_id, Arc::clone(&system));
        Ok(system)
    }

    pub async fn get(&self, system_id: i32) -> Option<Arc<System>> {
        self.systems.read().await.get(&system_id).cloned()
    }

    pub async fn get_or_create(&self, system_id: i32) -> Result<Arc<System>> {
        let mut systems = self.systems.write().await;
        if let Some(system) = systems.get(&system_id) {
            return Ok(Arc::clone(system));
        }
        let system = self.start(system_id).await?;
        systems.insert(system_id, Arc::clone(&system));
        Ok(system)
    }

    /// Disposes the system and frees its id.
    pub async fn remove(&self, system_id: i32) -> bool {
        let removed = self.systems.write().await.remove(&system_id);
        match removed {
            Some(system) => {
                system.dispose();
                info!("Removed system {}", system_id);
                true
            }
            None => false,
        }
    }

    pub async fn system_ids(&self) -> Vec<i32> {
        let mut ids: Vec<_> = self.systems.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Disposes every system.
    pub async fn shutdown(&self) {
        for (_, system) in self.systems.write().await.drain() {
            system.dispose();
        }
    }

    async fn start(&self, system_id: i32) -> Result<Arc<System>> {
        let system = System::start(system_id, self.config.clone(), Arc::clone(&self.factory)).await?;
        info!("Created system {}", system_id);
        Ok(Arc::new(system))
    }
}
