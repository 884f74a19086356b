//! The router: advertisement loop, ingress dispatch, route-table
//! arbitration and forwarding/local-delivery decisions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::arp::ArpResolver;
use crate::identity::{Identity, NetworkAddress};
use crate::link::{Link, LinkLayerAddress, LinkManager, Receiver};
use crate::route::{Route, RouteTable};
use crate::wire::{
    self, AdvPayload, AdvType, ArpPayload, ArpReply, ArpType, DataPayload, MType, RouteAdvertisement,
};

/// Default hop penalty added to a received advertisement's distance
/// before installation (spec.md §4.5): every hop costs 64, so a direct
/// neighbour's self-route (distance 0) is advertised to us as 64.
/// Overridable per-router via [`RouterConfig::hop_penalty`].
pub const HOP_PENALTY: u8 = 64;

/// Tunables for a [`Router`], grounded the way the reference router's
/// own `RouterConfig` groups every knob its background jobs read into
/// one `Default`-able struct rather than scattering constants.
#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    pub adv_interval: Duration,
    pub route_lifetime: Duration,
    pub arp_timeout: Duration,
    pub arp_sweep_interval: Duration,
    pub forwarding_enabled: bool,
    pub hop_penalty: u8,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            adv_interval: Duration::from_secs(5),
            route_lifetime: Duration::from_secs(60),
            arp_timeout: crate::arp::DEFAULT_RESOLUTION_TIMEOUT,
            arp_sweep_interval: crate::arp::DEFAULT_SWEEP_INTERVAL,
            forwarding_enabled: true,
            hop_penalty: HOP_PENALTY,
        }
    }
}

/// A decrypted datagram handed to the owner of a [`Router`].
#[derive(Debug, Clone)]
pub struct UserDataPkt {
    pub src: NetworkAddress,
    pub payload: Vec<u8>,
}

/// Observability hook fired on route-table changes, supplementing the
/// core spec's silent table. Entirely optional — a [`Router`] built
/// without one just doesn't call it.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    RouteInstalled(Route),
    RouteExpired(NetworkAddress),
}

type DataCallback = Box<dyn Fn(UserDataPkt) + Send + Sync + 'static>;
type EventCallback = Box<dyn Fn(RouterEvent) + Send + Sync + 'static>;

/// The overlay mesh router.
///
/// Construction installs the self-route and wires up the link manager
/// and ARP resolver, but does not start any threads — call
/// [`Router::start`] for that, matching the reference router's
/// separation of `new` (cheap, synchronous) from the background jobs
/// it later spawns.
pub struct Router {
    identity: Identity,
    config: RouterConfig,
    routes: RouteTable,
    arp: Arc<ArpResolver>,
    link_manager: Arc<LinkManager>,
    on_data: Option<DataCallback>,
    on_event: Option<EventCallback>,
    running: AtomicBool,
    adv_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Router {
    pub fn new(identity: Identity, on_data: Option<DataCallback>, config: RouterConfig) -> Arc<Self> {
        Self::with_event_callback(identity, on_data, None, config)
    }

    /// As [`Router::new`], additionally wiring a [`RouterEvent`] observer
    /// for route-table changes.
    pub fn with_event_callback(
        identity: Identity,
        on_data: Option<DataCallback>,
        on_event: Option<EventCallback>,
        config: RouterConfig,
    ) -> Arc<Self> {
        let routes = RouteTable::new();
        routes.install_route(Route::self_route(identity.address().clone()));

        Arc::new_cyclic(|weak: &std::sync::Weak<Router>| {
            let receiver_bridge = RouterReceiverBridge { router: weak.clone() };
            Router {
                identity,
                config,
                routes,
                arp: ArpResolver::with_config(config.arp_timeout, config.arp_sweep_interval),
                link_manager: Arc::new(LinkManager::new(Arc::new(receiver_bridge))),
                on_data,
                on_event,
                running: AtomicBool::new(false),
                adv_thread: Mutex::new(None),
            }
        })
    }

    pub fn address(&self) -> &NetworkAddress {
        self.identity.address()
    }

    pub fn link_manager(&self) -> Arc<LinkManager> {
        self.link_manager.clone()
    }

    /// Snapshot of every currently installed route.
    pub fn routes(&self) -> Vec<Route> {
        self.routes.routes()
    }

    pub fn routes_to(&self, destination: &NetworkAddress) -> Option<Route> {
        self.routes.lookup(destination)
    }

    /// Start the advertisement thread. Calling `start` twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let router = self.clone();
        let handle = std::thread::spawn(move || router.advertisement_loop());
        *self.adv_thread.lock().expect("advertisement thread handle lock poisoned") = Some(handle);
    }

    /// Stop the advertisement thread, join it, and tear down the ARP
    /// resolver (spec.md §4.5, §5): detaches it from every link it ever
    /// attached to and joins its sweep thread, rather than waiting on an
    /// `Arc<ArpResolver>` refcount that never reaches zero on its own —
    /// every link the resolver queried holds a strong clone of it as a
    /// receiver.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.adv_thread.lock().expect("advertisement thread handle lock poisoned").take() {
            let _ = handle.join();
        }
        self.arp.shutdown();
    }

    fn advertisement_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            std::thread::sleep(self.config.adv_interval);
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.route_sweep();
            self.broadcast_advertisements();
        }
    }

    fn broadcast_advertisements(&self) {
        let links = self.link_manager.links();
        let routes = self.routes.routes();
        for link in &links {
            for route in &routes {
                self.send_advertisement(link, route);
            }
        }
    }

    fn send_advertisement(&self, link: &Arc<dyn Link>, route: &Route) {
        let content = match rmp_serde::to_vec(&RouteAdvertisement {
            address: route.destination.as_str().to_owned(),
            distance: route.distance,
        }) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::error!("twine: failed to encode route advertisement: {err}");
                return;
            }
        };
        let payload = AdvPayload {
            origin: self.identity.address().as_str().to_owned(),
            kind: AdvType::Advertisement,
            content,
            reserved: String::new(),
        };
        match wire::encode_envelope(MType::Adv, &payload) {
            Ok(frame) => {
                if let Err(err) = link.broadcast(&frame) {
                    log::debug!("twine: advertisement broadcast failed: {err}");
                }
            }
            Err(err) => log::error!("twine: failed to encode advertisement envelope: {err}"),
        }
    }

    /// Remove expired routes. The self-route is exempted explicitly
    /// (spec.md §9 decision: mark it non-expiring rather than refresh it
    /// every cycle) — see [`Route::self_route`]'s `Duration::MAX` lifetime.
    fn route_sweep(&self) {
        for destination in self.routes.sweep() {
            if let Some(on_event) = &self.on_event {
                on_event(RouterEvent::RouteExpired(destination));
            }
        }
    }

    fn on_receive(&self, link: &Arc<dyn Link>, data: &[u8], src_ll: &LinkLayerAddress) {
        let envelope = match wire::decode_envelope(data) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::debug!("twine: dropping undecodable frame from {src_ll}: {err}");
                return;
            }
        };
        match envelope.kind {
            MType::Adv => self.handle_adv(link, &envelope),
            MType::Arp => self.handle_arp(link, &envelope, src_ll),
            MType::Data => self.handle_data(&envelope),
            MType::Unknown => log::debug!("twine: dropping frame with UNKNOWN envelope kind"),
        }
    }

    fn handle_adv(&self, link: &Arc<dyn Link>, envelope: &wire::Envelope) {
        let payload: AdvPayload = match wire::decode_as(envelope, MType::Adv) {
            Ok(payload) => payload,
            Err(err) => {
                log::debug!("twine: dropping undecodable ADV payload: {err}");
                return;
            }
        };

        match payload.kind {
            AdvType::Retraction => {
                log::debug!("twine: RETRACTION from {} is reserved and unimplemented; dropping", payload.origin);
            }
            AdvType::Advertisement => {
                let advertisement: RouteAdvertisement = match rmp_serde::from_slice(&payload.content) {
                    Ok(adv) => adv,
                    Err(err) => {
                        log::debug!("twine: dropping undecodable RouteAdvertisement: {err}");
                        return;
                    }
                };
                let destination = NetworkAddress::from(advertisement.address);
                if &destination == self.identity.address() {
                    return;
                }
                let distance = advertisement.distance.saturating_add(self.config.hop_penalty);
                let candidate = Route::new(
                    destination,
                    Some(link.clone()),
                    NetworkAddress::from(payload.origin),
                    distance,
                    self.config.route_lifetime,
                );
                if self.routes.install_route(candidate.clone()) {
                    if let Some(on_event) = &self.on_event {
                        on_event(RouterEvent::RouteInstalled(candidate));
                    }
                }
            }
        }
    }

    fn handle_arp(&self, link: &Arc<dyn Link>, envelope: &wire::Envelope, src_ll: &LinkLayerAddress) {
        let payload: ArpPayload = match wire::decode_as(envelope, MType::Arp) {
            Ok(payload) => payload,
            Err(err) => {
                log::debug!("twine: dropping undecodable ARP payload: {err}");
                return;
            }
        };

        match payload.kind {
            ArpType::Response => {
                // The resolver consumes these through its own receiver
                // attachment; the router only ever sees one here if the
                // resolver hasn't attached to this link yet.
                log::trace!("twine: ARP RESPONSE observed by router, not resolver; dropping");
            }
            ArpType::Request => {
                let requested: String = match rmp_serde::from_slice(&payload.content) {
                    Ok(nl) => nl,
                    Err(err) => {
                        log::debug!("twine: dropping undecodable ARP REQUEST: {err}");
                        return;
                    }
                };
                if requested != self.identity.address().as_str() {
                    return;
                }
                let reply = ArpReply { l3: requested, l2: link.address() };
                let content = match rmp_serde::to_vec(&reply) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        log::error!("twine: failed to encode ARP reply: {err}");
                        return;
                    }
                };
                let response = ArpPayload { kind: ArpType::Response, content };
                match wire::encode_envelope(MType::Arp, &response) {
                    Ok(frame) => {
                        if let Err(err) = link.transmit(&frame, src_ll) {
                            log::debug!("twine: ARP reply transmit failed: {err}");
                        }
                    }
                    Err(err) => log::error!("twine: failed to encode ARP reply envelope: {err}"),
                }
            }
        }
    }

    fn handle_data(&self, envelope: &wire::Envelope) {
        let payload: DataPayload = match wire::decode_as(envelope, MType::Data) {
            Ok(payload) => payload,
            Err(err) => {
                log::debug!("twine: dropping undecodable DATA payload: {err}");
                return;
            }
        };
        let dst = NetworkAddress::from(payload.dst.clone());
        if &dst == self.identity.address() {
            self.deliver_locally(NetworkAddress::from(payload.src), &payload.data);
        } else if self.config.forwarding_enabled {
            self.attempt_forward(payload);
        } else {
            log::debug!("twine: forwarding disabled, dropping DATA for {}", payload.dst);
        }
    }

    fn deliver_locally(&self, src: NetworkAddress, ciphertext: &[u8]) {
        let plaintext = match self.identity.decrypt(ciphertext) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                log::debug!("twine: decryption failed for inbound DATA from {src}: {err}");
                return;
            }
        };
        if let Some(on_data) = &self.on_data {
            on_data(UserDataPkt { src, payload: plaintext });
        }
    }

    fn attempt_forward(&self, payload: DataPayload) {
        let dst = NetworkAddress::from(payload.dst.clone());
        let Some(route) = self.routes.lookup(&dst) else {
            log::debug!("twine: no route to {dst}, dropping forwarded DATA");
            return;
        };
        let Some(link) = &route.link else {
            log::debug!("twine: route to {dst} has no link (unexpected for a non-self route), dropping");
            return;
        };
        let Some(entry) = self.arp.resolve(&route.gateway, link) else {
            log::debug!("twine: ARP resolution for next hop {} failed, dropping", route.gateway);
            return;
        };

        let frame = match wire::encode_envelope(MType::Data, &payload) {
            Ok(frame) => frame,
            Err(err) => {
                log::error!("twine: failed to re-encode forwarded DATA: {err}");
                return;
            }
        };
        if let Err(err) = link.transmit(&frame, &entry.ll) {
            log::debug!("twine: forward transmit to {} failed: {err}", entry.ll);
        }
    }

    /// Encrypt `payload` to `dst_nl` and send it along the best known
    /// route. Returns `false` on route-miss or (for non-self routes) ARP
    /// failure; see spec.md §4.5 and §7.
    pub fn send_data(&self, payload: &[u8], dst_nl: &NetworkAddress) -> bool {
        let Some(route) = self.routes.lookup(dst_nl) else {
            return false;
        };

        let ciphertext = match self.identity.encrypt(payload, dst_nl) {
            Ok(ciphertext) => ciphertext,
            Err(err) => {
                log::error!("twine: encryption to {dst_nl} failed: {err}");
                return false;
            }
        };

        if route.is_self_route() {
            // spec.md §9 decision: the self-path decrypts before
            // delivery, so a caller's own callback sees plaintext the
            // same way a remote peer's callback would (matching the
            // treatment of self-addressed data as "deliver, don't
            // relay", not "mirror the wire bytes verbatim").
            self.deliver_locally(self.identity.address().clone(), &ciphertext);
            return true;
        }

        let data_payload = DataPayload {
            ttl: DataPayload::DEFAULT_TTL,
            data: ciphertext,
            src: self.identity.address().as_str().to_owned(),
            dst: dst_nl.as_str().to_owned(),
        };
        let Some(link) = &route.link else {
            return false;
        };
        let Some(entry) = self.arp.resolve(&route.gateway, link) else {
            return false;
        };
        let frame = match wire::encode_envelope(MType::Data, &data_payload) {
            Ok(frame) => frame,
            Err(err) => {
                log::error!("twine: failed to encode outbound DATA: {err}");
                return false;
            }
        };
        link.transmit(&frame, &entry.ll).is_ok()
    }
}

/// Bridges the link manager's single-receiver requirement to
/// [`Router::on_receive`] without handing the link manager an owning
/// `Arc<Router>` — it only ever upgrades the weak reference for the
/// duration of one callback (spec.md §9: links and the router hold
/// non-owning references to each other).
struct RouterReceiverBridge {
    router: std::sync::Weak<Router>,
}

impl Receiver for RouterReceiverBridge {
    fn on_receive(&self, link: &Arc<dyn Link>, data: &[u8], src_ll: &LinkLayerAddress) {
        if let Some(router) = self.router.upgrade() {
            router.on_receive(link, data, src_ll);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn self_delivery_triggers_callback_without_link_traffic() {
        let identity = Identity::generate();
        let addr = identity.address().clone();
        let received: Arc<StdMutex<Vec<UserDataPkt>>> = Arc::new(StdMutex::new(Vec::new()));
        let received_clone = received.clone();

        let router = Router::new(
            identity,
            Some(Box::new(move |pkt| received_clone.lock().unwrap().push(pkt))),
            RouterConfig::default(),
        );

        let ok = router.send_data(b"x", &addr);
        assert!(ok);

        let delivered = received.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].src, addr);
        assert_eq!(delivered[0].payload, b"x");
    }

    #[test]
    fn send_data_to_unknown_destination_fails() {
        let identity = Identity::generate();
        let router = Router::new(identity, None, RouterConfig::default());
        let stranger = Identity::generate();
        assert!(!router.send_data(b"x", stranger.address()));
    }
}
