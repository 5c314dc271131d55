//! The active half of discovery.
//!
//! An [`AdvertisementManager`] owns one UDP socket per system id.  A
//! broadcast task periodically (or on request) announces the local endpoints
//! to every known address on every slot port of the system, and a receive
//! task frames incoming datagrams, learns the sender's address and hands the
//! advertisement to the registered listeners.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use log::{debug, error, info, trace, warn};
use parking_lot::{Mutex, RwLock};
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

use super::{AddressSet, Advertisement, AdvertisementType};
use crate::error::{Error, Result};
use crate::framing::{BraceDecoder, Framer};
use crate::types::{CrosspointInfo, HostInfo, LocalAddresses, LOOPBACK};

/// Largest UDP payload.
const MAX_DATAGRAM: usize = 65_507;

/// Bytes of an undecodable datagram shown in the log.
const PREVIEW_LEN: usize = 32;

/// Pause after a failed receive so a broken socket cannot spin.
const RECV_BACKOFF: Duration = Duration::from_millis(100);

/// Receives what peers advertise.
pub trait AdvertisementListener: Send + Sync {
    fn discovered(&self, advertisement: &Advertisement);

    fn removed(&self, advertisement: &Advertisement);
}

/// Snapshot of the endpoints this process hosts.
pub trait LocalEndpoints: Send + Sync {
    fn controls(&self) -> Vec<CrosspointInfo>;

    fn equipment(&self) -> Vec<CrosspointInfo>;
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub base_port: u16,
    /// Co-resident processes per system id.
    pub slot_count: u8,
    /// Bind only this slot instead of the first free one.
    pub slot: Option<u8>,
    pub multicast_group: Ipv4Addr,
    pub interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            base_port: 40100,
            slot_count: 10,
            slot: None,
            multicast_group: Ipv4Addr::new(239, 255, 90, 1),
            interval: Duration::from_secs(30),
        }
    }
}

impl ManagerConfig {
    /// `base_port + system_id * 10 + (slot - 1)`, if that is a valid port.
    pub fn port_for(&self, system_id: i32, slot: u8) -> Option<u16> {
        if system_id < 0 || slot == 0 {
            return None;
        }
        let port = self.base_port as i64 + system_id as i64 * 10 + (slot as i64 - 1);
        u16::try_from(port).ok()
    }

    /// Every advertisement port of a system, slot order.
    pub fn ports_for(&self, system_id: i32) -> Vec<u16> {
        (1..=self.slot_count)
            .filter_map(|slot| self.port_for(system_id, slot))
            .collect()
    }
}

pub struct AdvertisementManager {
    system_id: i32,
    slot: u8,
    config: ManagerConfig,
    host: HostInfo,
    local: LocalAddresses,
    addresses: AddressSet,
    socket: RwLock<Option<Arc<UdpSocket>>>,
    listeners: RwLock<Vec<Arc<dyn AdvertisementListener>>>,
    endpoints: RwLock<Option<Arc<dyn LocalEndpoints>>>,
    trigger: Arc<Notify>,
    disposed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AdvertisementManager {
    /// Binds the first free slot port of `system_id` and starts the broadcast
    /// and receive tasks.
    pub async fn bind(system_id: i32, config: ManagerConfig) -> Result<Arc<Self>> {
        if config.slot_count == 0 || config.port_for(system_id, config.slot_count).is_none() {
            return Err(Error::InvalidSystemId(system_id));
        }

        let slots = match config.slot {
            Some(slot) => vec![slot],
            None => (1..=config.slot_count).collect(),
        };

        let mut bound = None;
        for slot in slots {
            let port = config
                .port_for(system_id, slot)
                .ok_or(Error::InvalidSystemId(system_id))?;
            match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await {
                Ok(socket) => {
                    bound = Some((socket, slot));
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    debug!("Advertisement port {} in use, trying next slot", port);
                }
                Err(e) => return Err(e.into()),
            }
        }
        let (socket, slot) = bound.ok_or(Error::NoFreeSlot { system_id })?;
        let port = socket.local_addr()?.port();

        if let Err(e) = socket.join_multicast_v4(config.multicast_group, Ipv4Addr::UNSPECIFIED) {
            warn!(
                "Failed to join multicast group {}: {}; relying on directed advertisements",
                config.multicast_group, e
            );
        }
        if let Err(e) = socket.set_broadcast(true) {
            debug!("Failed to enable broadcast on advertisement socket: {}", e);
        }

        let local = LocalAddresses::detect();
        let host = HostInfo::new(local.primary(), port);
        let socket = Arc::new(socket);

        let manager = Arc::new(Self {
            system_id,
            slot,
            addresses: AddressSet::new(LOOPBACK, config.multicast_group.to_string()),
            config,
            host,
            local,
            socket: RwLock::new(Some(Arc::clone(&socket))),
            listeners: RwLock::new(Vec::new()),
            endpoints: RwLock::new(None),
            trigger: Arc::new(Notify::new()),
            disposed: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        });

        let receiver = tokio::spawn(run_receiver(Arc::downgrade(&manager), socket));
        let broadcaster = tokio::spawn(run_broadcaster(
            Arc::downgrade(&manager),
            Arc::clone(&manager.trigger),
            manager.config.interval,
        ));
        manager.tasks.lock().extend([receiver, broadcaster]);

        info!(
            "Advertisement manager for system {} listening on {} (slot {})",
            system_id, manager.host, slot
        );
        Ok(manager)
    }

    pub fn system_id(&self) -> i32 {
        self.system_id
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn port(&self) -> u16 {
        self.host.port
    }

    /// The source address this manager advertises.
    pub fn host_info(&self) -> HostInfo {
        self.host.clone()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn addresses(&self) -> Vec<String> {
        self.addresses.snapshot()
    }

    pub fn contains_address(&self, address: &str) -> bool {
        self.addresses.contains(address)
    }

    /// Adds a unicast peer and advertises to it straight away.
    pub fn add_address(&self, address: &str) -> bool {
        let added = self.addresses.add(address);
        if added {
            info!("Added advertisement address {}", address.trim());
            self.trigger_broadcast();
        }
        added
    }

    pub fn add_addresses<I, S>(&self, addresses: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let added = self.addresses.add_all(addresses);
        if added > 0 {
            info!("Added {} advertisement addresses", added);
            self.trigger_broadcast();
        }
        added
    }

    /// Loopback and the multicast group stay regardless.
    pub fn remove_address(&self, address: &str) -> bool {
        let removed = self.addresses.remove(address);
        if removed {
            info!("Removed advertisement address {}", address.trim());
        }
        removed
    }

    pub fn add_listener(&self, listener: Arc<dyn AdvertisementListener>) {
        if !self.is_disposed() {
            self.listeners.write().push(listener);
        }
    }

    pub fn set_endpoint_source(&self, source: Arc<dyn LocalEndpoints>) {
        if !self.is_disposed() {
            *self.endpoints.write() = Some(source);
        }
    }

    /// Asks the broadcast task for an advertisement without waiting for it.
    pub fn trigger_broadcast(&self) {
        self.trigger.notify_one();
    }

    /// Advertises the local endpoints now.  Returns the number of datagrams
    /// sent; nothing is sent when there is nothing to advertise.
    pub async fn broadcast(&self) -> usize {
        if self.is_disposed() {
            return 0;
        }
        let Some(source) = self.endpoints.read().clone() else {
            debug!("No endpoint source for system {}, not advertising", self.system_id);
            return 0;
        };

        let advertisement = Advertisement::new(
            self.host.clone(),
            source.controls(),
            source.equipment(),
            AdvertisementType::Localhost,
        );
        if advertisement.is_empty() {
            trace!("Nothing to advertise for system {}", self.system_id);
            return 0;
        }
        self.send_to_all(&advertisement, None).await
    }

    /// Tells peers to forget the given local endpoints.
    pub async fn withdraw(&self, controls: Vec<CrosspointInfo>, equipment: Vec<CrosspointInfo>) -> usize {
        if self.is_disposed() {
            return 0;
        }
        let advertisement = Advertisement::new(
            self.host.clone(),
            controls,
            equipment,
            AdvertisementType::CrosspointRemove,
        );
        if advertisement.is_empty() {
            return 0;
        }
        self.send_to_all(&advertisement, Some(AdvertisementType::CrosspointRemove))
            .await
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Stops both tasks, closes the socket and drops every listener.  Safe to
    /// call more than once.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.socket.write().take();
        self.listeners.write().clear();
        self.endpoints.write().take();
        info!("Advertisement manager for system {} disposed", self.system_id);
    }

    async fn send_to_all(&self, advertisement: &Advertisement, forced: Option<AdvertisementType>) -> usize {
        let Some(socket) = self.socket.read().clone() else {
            return 0;
        };

        let mut payloads: Vec<(AdvertisementType, Vec<u8>)> = Vec::new();
        let mut sends = Vec::new();
        for (destination, ty) in self.destinations().await {
            let ty = forced.unwrap_or(ty);
            let payload = match payloads.iter().find(|(t, _)| *t == ty) {
                Some((_, payload)) => payload.clone(),
                None => match advertisement.with_type(ty).to_bytes() {
                    Ok(payload) => {
                        payloads.push((ty, payload.clone()));
                        payload
                    }
                    Err(e) => {
                        error!("Failed to serialize advertisement: {}", e);
                        return 0;
                    }
                },
            };
            let socket = Arc::clone(&socket);
            sends.push(async move { (destination, socket.send_to(&payload, destination).await) });
        }

        let mut sent = 0;
        for (destination, result) in join_all(sends).await {
            match result {
                Ok(_) => sent += 1,
                Err(e) => warn!("Failed to send advertisement to {}: {}", destination, e),
            }
        }
        debug!(
            "Advertised {} controls and {} equipment for system {} to {} destinations",
            advertisement.controls.len(),
            advertisement.equipment.len(),
            self.system_id,
            sent
        );
        sent
    }

    /// Every address × every slot port, own port excluded.
    async fn destinations(&self) -> Vec<(SocketAddr, AdvertisementType)> {
        let mut ips: Vec<(IpAddr, AdvertisementType)> = Vec::new();
        for address in self.addresses.snapshot() {
            let address = HostInfo::new(address, 0).address_or_localhost(&self.local);
            let Some(ip) = resolve(&address).await else {
                continue;
            };
            if ips.iter().any(|(known, _)| *known == ip) {
                continue;
            }
            let ty = match ip {
                _ if ip.is_loopback() => AdvertisementType::Localhost,
                IpAddr::V4(v4) if v4 == self.config.multicast_group => AdvertisementType::Multicast,
                IpAddr::V4(v4) if v4 == Ipv4Addr::BROADCAST => AdvertisementType::Broadcast,
                _ => AdvertisementType::Directed,
            };
            ips.push((ip, ty));
        }

        let ports = self.config.ports_for(self.system_id);
        let mut destinations = Vec::with_capacity(ips.len() * ports.len());
        for (ip, ty) in ips {
            for &port in &ports {
                if ip.is_loopback() && port == self.host.port {
                    continue;
                }
                destinations.push((SocketAddr::new(ip, port), ty));
            }
        }
        destinations
    }

    fn handle_frame(&self, frame: &[u8], from: SocketAddr) {
        let advertisement = match Advertisement::from_bytes(frame) {
            Ok(advertisement) => advertisement,
            Err(e) => {
                warn!(
                    "Dropping undecodable advertisement from {}: {} ({})",
                    from,
                    e,
                    hex::encode(&frame[..frame.len().min(PREVIEW_LEN)])
                );
                return;
            }
        };
        if advertisement.source == self.host {
            trace!("Ignoring own advertisement");
            return;
        }

        let listeners = self.listeners.read().clone();
        let ty = advertisement.advertisement_type;
        if ty.is_removal() {
            debug!("Removal advertisement ({:?}) from {}", ty, advertisement.source);
            if ty == AdvertisementType::DirectedRemove {
                self.remove_address(&advertisement.source.address);
            }
            for listener in &listeners {
                listener.removed(&advertisement);
            }
            return;
        }

        debug!(
            "Advertisement ({:?}) from {}: {} controls, {} equipment",
            ty,
            advertisement.source,
            advertisement.controls.len(),
            advertisement.equipment.len()
        );
        // A peer that reached us directly is reachable directly, even where
        // multicast does not cross subnets.
        if self.addresses.add(&advertisement.source.address) {
            info!("Learned advertisement address {}", advertisement.source.address);
            self.trigger_broadcast();
        }
        for listener in &listeners {
            listener.discovered(&advertisement);
        }
    }
}

impl Drop for AdvertisementManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn resolve(address: &str) -> Option<IpAddr> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return ip.is_ipv4().then_some(ip);
    }
    match tokio::net::lookup_host((address, 0)).await {
        Ok(mut found) => {
            let ip = found.find(SocketAddr::is_ipv4).map(|a| a.ip());
            if ip.is_none() {
                warn!("No IPv4 address for {}", address);
            }
            ip
        }
        Err(e) => {
            warn!("Failed to resolve {}: {}", address, e);
            None
        }
    }
}

async fn run_receiver(weak: Weak<AdvertisementManager>, socket: Arc<UdpSocket>) {
    let (framer, mut frames) = Framer::new(BraceDecoder::json());
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!("Advertisement receive failed: {}", e);
                sleep(RECV_BACKOFF).await;
                continue;
            }
        };
        let Some(manager) = weak.upgrade() else {
            break;
        };
        if manager.is_disposed() {
            break;
        }

        framer.enqueue(&buf[..len]);
        while let Ok(frame) = frames.try_recv() {
            manager.handle_frame(&frame, from);
        }
        // Datagrams carry whole documents; a leftover is a truncated one and
        // must not swallow the next datagram.
        if framer.buffered() > 0 {
            debug!("Discarding {} byte partial advertisement from {}", framer.buffered(), from);
            framer.clear();
        }
    }
}

async fn run_broadcaster(weak: Weak<AdvertisementManager>, trigger: Arc<Notify>, period: Duration) {
    let mut ticker = interval(period.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = trigger.notified() => {}
        }
        let Some(manager) = weak.upgrade() else {
            break;
        };
        if manager.is_disposed() {
            break;
        }
        manager.broadcast().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_are_partitioned_by_system_and_slot() {
        let config = ManagerConfig::default();
        assert_eq!(config.port_for(0, 1), Some(40100));
        assert_eq!(config.port_for(3, 1), Some(40130));
        assert_eq!(config.port_for(3, 10), Some(40139));
        assert_eq!(config.port_for(-1, 1), None);
        assert_eq!(config.port_for(3, 0), None);
        assert_eq!(config.port_for(3000, 1), None);
        assert_eq!(config.ports_for(2).len(), 10);
    }

    #[tokio::test]
    async fn out_of_range_system_id_is_rejected() {
        let result = AdvertisementManager::bind(10_000, ManagerConfig::default()).await;
        assert!(matches!(result, Err(Error::InvalidSystemId(10_000))));
    }
}
