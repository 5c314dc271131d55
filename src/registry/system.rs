use std::sync::Arc;

use log::{debug, info};
use parking_lot::RwLock;

use super::{EndpointKind, EndpointRegistry, RegistryFactory};
use crate::advertisement::{
    Advertisement, AdvertisementListener, AdvertisementManager, LocalEndpoints, ManagerConfig,
};
use crate::error::Result;
use crate::types::CrosspointInfo;

/// One logical mesh: a discovery manager plus the registries it feeds.
pub struct System {
    id: i32,
    manager: Arc<AdvertisementManager>,
    registries: Arc<Registries>,
    factory: Arc<dyn RegistryFactory>,
}

#[derive(Default)]
struct Registries {
    control: RwLock<Option<Arc<dyn EndpointRegistry>>>,
    equipment: RwLock<Option<Arc<dyn EndpointRegistry>>>,
}

impl Registries {
    fn slot(&self, kind: EndpointKind) -> &RwLock<Option<Arc<dyn EndpointRegistry>>> {
        match kind {
            EndpointKind::Control => &self.control,
            EndpointKind::Equipment => &self.equipment,
        }
    }

    fn get(&self, kind: EndpointKind) -> Option<Arc<dyn EndpointRegistry>> {
        self.slot(kind).read().clone()
    }
}

impl LocalEndpoints for Registries {
    fn controls(&self) -> Vec<CrosspointInfo> {
        self.get(EndpointKind::Control)
            .map(|r| r.endpoints())
            .unwrap_or_default()
    }

    fn equipment(&self) -> Vec<CrosspointInfo> {
        self.get(EndpointKind::Equipment)
            .map(|r| r.endpoints())
            .unwrap_or_default()
    }
}

impl AdvertisementListener for Registries {
    fn discovered(&self, advertisement: &Advertisement) {
        // Controls want to know about equipment and the other way round.
        if let Some(control) = self.get(EndpointKind::Control) {
            for info in &advertisement.equipment {
                control.add_endpoint_info(info.clone());
            }
        }
        if let Some(equipment) = self.get(EndpointKind::Equipment) {
            for info in &advertisement.controls {
                equipment.add_endpoint_info(info.clone());
            }
        }
    }

    fn removed(&self, advertisement: &Advertisement) {
        if let Some(control) = self.get(EndpointKind::Control) {
            for info in &advertisement.equipment {
                control.remove_endpoint_info(info);
            }
        }
        if let Some(equipment) = self.get(EndpointKind::Equipment) {
            for info in &advertisement.controls {
                equipment.remove_endpoint_info(info);
            }
        }
    }
}

impl System {
    pub(crate) async fn start(
        id: i32,
        config: ManagerConfig,
        factory: Arc<dyn RegistryFactory>,
    ) -> Result<Self> {
        let manager = AdvertisementManager::bind(id, config).await?;
        let registries = Arc::new(Registries::default());
        manager.set_endpoint_source(registries.clone());
        manager.add_listener(registries.clone());
        Ok(Self {
            id,
            manager,
            registries,
            factory,
        })
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn manager(&self) -> &Arc<AdvertisementManager> {
        &self.manager
    }

    /// The control registry, created on first use.
    pub fn control(&self) -> Arc<dyn EndpointRegistry> {
        self.get_or_create(EndpointKind::Control)
    }

    /// The equipment registry, created on first use.
    pub fn equipment(&self) -> Arc<dyn EndpointRegistry> {
        self.get_or_create(EndpointKind::Equipment)
    }

    /// The registry of that kind if one exists yet.
    pub fn registry(&self, kind: EndpointKind) -> Option<Arc<dyn EndpointRegistry>> {
        self.registries.get(kind)
    }

    /// Installs a registry built elsewhere.  Returns `false` and leaves the
    /// current one in place if the system already has one of that kind.
    pub fn attach(&self, kind: EndpointKind, registry: Arc<dyn EndpointRegistry>) -> bool {
        let mut slot = self.registries.slot(kind).write();
        if slot.is_some() {
            return false;
        }
        self.install(kind, &registry);
        *slot = Some(registry);
        true
    }

    /// Stops discovery.  Registries stay readable but are no longer fed.
    pub fn dispose(&self) {
        self.manager.dispose();
        debug!("System {} disposed", self.id);
    }

    fn get_or_create(&self, kind: EndpointKind) -> Arc<dyn EndpointRegistry> {
        let mut slot = self.registries.slot(kind).write();
        if let Some(registry) = slot.as_ref() {
            return Arc::clone(registry);
        }
        let registry = self.factory.create(kind, self.id);
        self.install(kind, &registry);
        *slot = Some(Arc::clone(&registry));
        registry
    }

    fn install(&self, kind: EndpointKind, registry: &Arc<dyn EndpointRegistry>) {
        let manager = Arc::downgrade(&self.manager);
        registry.on_endpoint_registered(Box::new(move |info: &CrosspointInfo| {
            if let Some(manager) = manager.upgrade() {
                debug!("Endpoint {} ({}) registered, advertising", info.id, info.name);
                manager.trigger_broadcast();
            }
        }));
        info!(
            "System {} attached {} registry at {}",
            self.id,
            kind,
            registry.host_info()
        );
        self.manager.trigger_broadcast();
    }
}
