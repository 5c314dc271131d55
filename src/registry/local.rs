use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::RwLock;

use super::{EndpointKind, EndpointRegistry, RegisteredListener, RegistryFactory};
use crate::types::{CrosspointInfo, HostInfo, LocalAddresses};

/// In-memory endpoint registry: local endpoints by id plus a cache of the
/// remote endpoints discovery reported.
pub struct LocalRegistry {
    kind: EndpointKind,
    host: HostInfo,
    local: RwLock<BTreeMap<i32, CrosspointInfo>>,
    remote: RwLock<BTreeMap<i32, CrosspointInfo>>,
    listeners: RwLock<Vec<RegisteredListener>>,
}

impl LocalRegistry {
    pub fn new(kind: EndpointKind, host: HostInfo) -> Self {
        Self {
            kind,
            host,
            local: RwLock::new(BTreeMap::new()),
            remote: RwLock::new(BTreeMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// Registers (or renames) a local endpoint and notifies listeners.
    pub fn register(&self, id: i32, name: impl Into<String>) -> CrosspointInfo {
        let info = CrosspointInfo::new(id, name, self.host.clone());
        self.local.write().insert(id, info.clone());
        info!("Registered local {} {} ({})", self.kind, id, info.name);
        for listener in self.listeners.read().iter() {
            listener(&info);
        }
        info
    }

    pub fn unregister(&self, id: i32) -> Option<CrosspointInfo> {
        self.local.write().remove(&id)
    }

    pub fn remote_endpoints(&self) -> Vec<CrosspointInfo> {
        self.remote.read().values().cloned().collect()
    }

    pub fn remote_endpoint(&self, id: i32) -> Option<CrosspointInfo> {
        self.remote.read().get(&id).cloned()
    }
}

impl EndpointRegistry for LocalRegistry {
    fn host_info(&self) -> HostInfo {
        self.host.clone()
    }

    fn endpoints(&self) -> Vec<CrosspointInfo> {
        self.local.read().values().cloned().collect()
    }

    fn on_endpoint_registered(&self, listener: RegisteredListener) {
        self.listeners.write().push(listener);
    }

    fn add_endpoint_info(&self, info: CrosspointInfo) {
        let mut remote = self.remote.write();
        if remote.get(&info.id) == Some(&info) {
            return;
        }
        debug!("Cached remote endpoint {} ({}) at {}", info.id, info.name, info.host);
        remote.insert(info.id, info);
    }

    fn remove_endpoint_info(&self, info: &CrosspointInfo) {
        // Only forget the entry if it still points where the removal says.
        let mut remote = self.remote.write();
        if remote.get(&info.id).is_some_and(|known| known.host == info.host) {
            remote.remove(&info.id);
            debug!("Forgot remote endpoint {} ({})", info.id, info.name);
        }
    }
}

/// Builds [`LocalRegistry`]s reachable on the primary local address and keeps
/// a handle to each so the owner can register endpoints on them.
pub struct LocalRegistryFactory {
    port: u16,
    address: String,
    created: RwLock<Vec<(i32, EndpointKind, Arc<LocalRegistry>)>>,
}

impl LocalRegistryFactory {
    /// `port` is where endpoints of this process accept data connections.
    pub fn new(port: u16) -> Self {
        Self::with_address(LocalAddresses::detect().primary(), port)
    }

    pub fn with_address(address: impl Into<String>, port: u16) -> Self {
        Self {
            port,
            address: address.into(),
            created: RwLock::new(Vec::new()),
        }
    }

    /// The registry created for that system and kind, if any.
    pub fn registry(&self, system_id: i32, kind: EndpointKind) -> Option<Arc<LocalRegistry>> {
        self.created
            .read()
            .iter()
            .find(|(id, k, _)| *id == system_id && *k == kind)
            .map(|(_, _, registry)| Arc::clone(registry))
    }

    /// Builds and keeps a registry, handing back the concrete type so the
    /// caller can register endpoints before attaching it to a system.
    pub fn create_local(&self, kind: EndpointKind, system_id: i32) -> Arc<LocalRegistry> {
        let registry = Arc::new(LocalRegistry::new(
            kind,
            HostInfo::new(self.address.clone(), self.port),
        ));
        self.created
            .write()
            .push((system_id, kind, Arc::clone(&registry)));
        registry
    }
}

impl RegistryFactory for LocalRegistryFactory {
    fn create(&self, kind: EndpointKind, system_id: i32) -> Arc<dyn EndpointRegistry> {
        self.create_local(kind, system_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn registration_notifies_listeners() {
        let registry = LocalRegistry::new(EndpointKind::Equipment, HostInfo::new("10.0.0.1", 41000));
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        registry.on_endpoint_registered(Box::new(move |_: &CrosspointInfo| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let info = registry.register(4, "Projector");
        assert_eq!(info.host, HostInfo::new("10.0.0.1", 41000));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(registry.endpoints(), vec![info]);
        assert!(registry.unregister(4).is_some());
        assert!(registry.endpoints().is_empty());
    }

    #[test]
    fn stale_removal_keeps_newer_location() {
        let registry = LocalRegistry::new(EndpointKind::Control, HostInfo::new("10.0.0.1", 41000));
        let old = CrosspointInfo::new(9, "Amp", HostInfo::new("10.0.0.2", 41000));
        let moved = CrosspointInfo::new(9, "Amp", HostInfo::new("10.0.0.3", 41000));
        registry.add_endpoint_info(old.clone());
        registry.add_endpoint_info(moved.clone());
        registry.remove_endpoint_info(&old);
        assert_eq!(registry.remote_endpoint(9), Some(moved.clone()));
        registry.remove_endpoint_info(&moved);
        assert!(registry.remote_endpoints().is_empty());
    }

    #[test]
    fn factory_keeps_created_registries() {
        let factory = LocalRegistryFactory::with_address("10.0.0.1", 41000);
        let created = factory.create(EndpointKind::Control, 3);
        let kept = factory.registry(3, EndpointKind::Control).unwrap();
        assert_eq!(created.host_info(), kept.host_info());
        assert!(factory.registry(3, EndpointKind::Equipment).is_none());

        let local = factory.create_local(EndpointKind::Equipment, 3);
        local.register(1, "Camera");
        let kept = factory.registry(3, EndpointKind::Equipment).unwrap();
        assert_eq!(kept.endpoints(), local.endpoints());
    }
}
