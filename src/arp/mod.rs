//! The ARP-style resolver: maps a peer's public key to a link-layer
//! address on a specific link, by asking the link and waiting for a
//! reply.
//!
//! This is distinct from [`crate::wire::arp`], which only defines the
//! wire shape of the request/response payloads this module builds and
//! parses.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::identity::NetworkAddress;
use crate::link::{Link, LinkLayerAddress, Receiver};
use crate::wire::{self, ArpPayload, ArpReply, ArpType, MType};

pub const DEFAULT_RESOLUTION_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const WAIT_DUTY_CYCLE: Duration = Duration::from_millis(500);

/// A resolved (or failed) mapping from network-layer to link-layer
/// address. An entry with both fields empty is the sentinel for
/// "resolution failed", kept distinct from a genuinely empty LL address
/// string so callers can tell the two apart if a driver ever allows one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpEntry {
    pub nl: NetworkAddress,
    pub ll: LinkLayerAddress,
}

impl ArpEntry {
    fn empty() -> Self {
        Self { nl: NetworkAddress::from(""), ll: String::new() }
    }

    fn is_empty(&self) -> bool {
        self.nl.as_str().is_empty() && self.ll.is_empty()
    }
}

fn link_key(link: &Arc<dyn Link>) -> usize {
    Arc::as_ptr(link) as *const () as usize
}

struct PendingWait {
    pending: Mutex<HashMap<NetworkAddress, LinkLayerAddress>>,
    condvar: Condvar,
}

/// Shutdown signal for the background sweep thread. A plain `AtomicBool`
/// would leave the thread asleep for up to a full `sweep_interval`
/// before it next checks the flag; pairing the flag with a `Condvar`
/// lets [`ArpResolver::shutdown`] wake it immediately instead of
/// blocking `Router::stop()` on whatever sweep interval happens to be
/// configured.
struct ShutdownSignal {
    requested: Mutex<bool>,
    condvar: Condvar,
}

/// Request-and-wait resolver with a cache, per spec.md §4.4.
///
/// The resolver itself implements [`Receiver`] so it can attach to a
/// link on demand and capture ARP RESPONSE frames; it never consumes
/// REQUEST frames (those are the router's job — see
/// [`crate::router::Router::handle_arp`]).
pub struct ArpResolver {
    cache: Mutex<HashMap<(NetworkAddress, usize), ArpEntry>>,
    attached_links: Mutex<HashMap<usize, Arc<dyn Link>>>,
    wait: PendingWait,
    timeout: Duration,
    shutdown: Arc<ShutdownSignal>,
    sweep_thread: Mutex<Option<JoinHandle<()>>>,
}

impl ArpResolver {
    pub fn new() -> Arc<Self> {
        Self::with_config(DEFAULT_RESOLUTION_TIMEOUT, DEFAULT_SWEEP_INTERVAL)
    }

    pub fn with_config(timeout: Duration, sweep_interval: Duration) -> Arc<Self> {
        let resolver = Arc::new(Self {
            cache: Mutex::new(HashMap::new()),
            attached_links: Mutex::new(HashMap::new()),
            wait: PendingWait { pending: Mutex::new(HashMap::new()), condvar: Condvar::new() },
            timeout,
            shutdown: Arc::new(ShutdownSignal { requested: Mutex::new(false), condvar: Condvar::new() }),
            sweep_thread: Mutex::new(None),
        });

        let weak = Arc::downgrade(&resolver);
        let shutdown = resolver.shutdown.clone();
        let handle = std::thread::spawn(move || loop {
            let guard = shutdown.requested.lock().expect("arp shutdown lock poisoned");
            let (guard, _timeout_result) = shutdown
                .condvar
                .wait_timeout_while(guard, sweep_interval, |requested| !*requested)
                .expect("arp shutdown lock poisoned during wait");
            if *guard {
                break;
            }
            drop(guard);
            if let Some(resolver) = weak.upgrade() {
                resolver.sweep();
            } else {
                break;
            }
        });
        *resolver.sweep_thread.lock().expect("sweep thread handle lock poisoned") = Some(handle);

        resolver
    }

    /// Clear the entire cache. Entries have no individual lifetime; the
    /// sweep interval is the cache's only notion of expiry (spec.md §4.4:
    /// "empty entries are cached briefly, until next sweep").
    pub fn sweep(&self) {
        self.cache.lock().expect("arp cache lock poisoned").clear();
    }

    /// Resolve `nl` to a link-layer address over `link`, consulting the
    /// cache first and falling back to a broadcast request-and-wait.
    pub fn resolve(self: &Arc<Self>, nl: &NetworkAddress, link: &Arc<dyn Link>) -> Option<ArpEntry> {
        let key = (nl.clone(), link_key(link));

        if let Some(entry) = self.cache.lock().expect("arp cache lock poisoned").get(&key).cloned() {
            return if entry.is_empty() { None } else { Some(entry) };
        }

        let entry = self.regenerate(nl, link);
        self.cache.lock().expect("arp cache lock poisoned").insert(key, entry.clone());
        if entry.is_empty() {
            None
        } else {
            Some(entry)
        }
    }

    fn ensure_attached(self: &Arc<Self>, link: &Arc<dyn Link>) {
        let mut attached = self.attached_links.lock().expect("arp attached-links lock poisoned");
        let key = link_key(link);
        if let std::collections::hash_map::Entry::Vacant(slot) = attached.entry(key) {
            slot.insert(link.clone());
            let receiver: Arc<dyn Receiver> = self.clone();
            link.attach_receiver(receiver);
        }
    }

    /// Tear the resolver down: detach it from every link it ever
    /// attached to and stop its background sweep thread, joining it
    /// synchronously. Per spec.md §4.5 ("tears down the resolver") and
    /// §5 ("The ARP resolver is destroyed after the router stops"),
    /// [`crate::router::Router::stop`] calls this explicitly rather than
    /// relying on the resolver's `Arc` refcount to reach zero — which it
    /// never would on its own, since every link the resolver attached to
    /// holds a strong clone of it as a [`Receiver`].
    pub fn shutdown(self: &Arc<Self>) {
        let links: Vec<Arc<dyn Link>> = {
            let mut attached = self.attached_links.lock().expect("arp attached-links lock poisoned");
            attached.drain().map(|(_, link)| link).collect()
        };
        let receiver: Arc<dyn Receiver> = self.clone();
        for link in links {
            link.detach_receiver(&receiver);
        }
        self.stop_sweep_thread();
    }

    fn stop_sweep_thread(&self) {
        *self.shutdown.requested.lock().expect("arp shutdown lock poisoned") = true;
        self.shutdown.condvar.notify_all();
        if let Some(handle) = self.sweep_thread.lock().expect("sweep thread handle lock poisoned").take() {
            let _ = handle.join();
        }
    }

    fn regenerate(self: &Arc<Self>, nl: &NetworkAddress, link: &Arc<dyn Link>) -> ArpEntry {
        self.ensure_attached(link);

        let request_content = match rmp_serde::to_vec(nl.as_str()) {
            Ok(bytes) => bytes,
            Err(_) => return ArpEntry::empty(),
        };
        let payload = ArpPayload { kind: ArpType::Request, content: request_content };
        let frame = match wire::encode_envelope(MType::Arp, &payload) {
            Ok(bytes) => bytes,
            Err(_) => return ArpEntry::empty(),
        };
        if link.broadcast(&frame).is_err() {
            return ArpEntry::empty();
        }

        self.wait_for_reply(nl)
    }

    fn wait_for_reply(&self, nl: &NetworkAddress) -> ArpEntry {
        let deadline = Instant::now() + self.timeout;
        let mut pending = self.wait.pending.lock().expect("arp pending lock poisoned");

        loop {
            if let Some(ll) = pending.remove(nl) {
                return ArpEntry { nl: nl.clone(), ll };
            }

            let now = Instant::now();
            if now >= deadline {
                return ArpEntry::empty();
            }
            let remaining = deadline - now;
            let wait_slice = remaining.min(WAIT_DUTY_CYCLE);

            let (guard, _timeout_result) = self
                .wait
                .condvar
                .wait_timeout(pending, wait_slice)
                .expect("arp pending lock poisoned during wait");
            pending = guard;
        }
    }
}

impl Receiver for ArpResolver {
    fn on_receive(&self, _link: &Arc<dyn Link>, data: &[u8], _src_ll: &LinkLayerAddress) {
        let Ok(envelope) = wire::decode_envelope(data) else { return };
        if envelope.kind != MType::Arp {
            return;
        }
        let Ok(payload) = wire::decode_as::<ArpPayload>(&envelope, MType::Arp) else { return };
        if payload.kind != ArpType::Response {
            return;
        }
        let Ok(reply) = rmp_serde::from_slice::<ArpReply>(&payload.content) else { return };

        let mut pending = self.wait.pending.lock().expect("arp pending lock poisoned");
        pending.insert(NetworkAddress::from(reply.l3), reply.l2);
        self.wait.condvar.notify_all();
    }
}

impl Drop for ArpResolver {
    fn drop(&mut self) {
        self.stop_sweep_thread();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct LoopbackLink {
        core: crate::link::LinkCore,
        inbox: StdMutex<Vec<Vec<u8>>>,
    }

    impl LoopbackLink {
        fn new() -> Arc<Self> {
            Arc::new(Self { core: crate::link::LinkCore::new(), inbox: StdMutex::new(Vec::new()) })
        }
    }

    impl Link for LoopbackLink {
        fn transmit(&self, data: &[u8], _dst_ll: &LinkLayerAddress) -> std::io::Result<()> {
            self.inbox.lock().unwrap().push(data.to_vec());
            Ok(())
        }
        fn broadcast(&self, data: &[u8]) -> std::io::Result<()> {
            self.inbox.lock().unwrap().push(data.to_vec());
            Ok(())
        }
        fn address(&self) -> LinkLayerAddress {
            "loopback".into()
        }
        fn attach_receiver(&self, receiver: Arc<dyn Receiver>) {
            self.core.attach(receiver);
        }
        fn detach_receiver(&self, receiver: &Arc<dyn Receiver>) {
            self.core.detach(receiver);
        }
    }

    fn send_reply(resolver: &Arc<ArpResolver>, link: &Arc<dyn Link>, l3: &str, l2: &str) {
        let reply = ArpReply { l3: l3.into(), l2: l2.into() };
        let content = rmp_serde::to_vec(&reply).unwrap();
        let payload = ArpPayload { kind: ArpType::Response, content };
        let bytes = wire::encode_envelope(MType::Arp, &payload).unwrap();
        resolver.on_receive(link, &bytes, &"peer".to_string());
    }

    #[test]
    fn resolves_when_a_reply_arrives_promptly() {
        let resolver = ArpResolver::with_config(Duration::from_millis(300), Duration::from_secs(60));
        let concrete = LoopbackLink::new();
        let link: Arc<dyn Link> = concrete.clone();

        let resolver_clone = resolver.clone();
        let link_clone = link.clone();
        let handle = std::thread::spawn(move || resolver_clone.resolve(&NetworkAddress::from("hostA:l3"), &link_clone));

        std::thread::sleep(Duration::from_millis(20));
        send_reply(&resolver, &link, "hostA:l3", "hostA:l2");

        let entry = handle.join().unwrap();
        assert_eq!(entry, Some(ArpEntry { nl: NetworkAddress::from("hostA:l3"), ll: "hostA:l2".into() }));
    }

    #[test]
    fn times_out_with_no_partial_entry_left_pending() {
        let resolver = ArpResolver::with_config(Duration::from_millis(200), Duration::from_secs(60));
        let link: Arc<dyn Link> = LoopbackLink::new();

        let result = resolver.resolve(&NetworkAddress::from("hostC:l3"), &link);
        assert_eq!(result, None);
        assert!(!resolver.wait.pending.lock().unwrap().contains_key(&NetworkAddress::from("hostC:l3")));
    }

    #[test]
    fn shutdown_detaches_links_and_joins_promptly_despite_a_long_sweep_interval() {
        let resolver = ArpResolver::with_config(Duration::from_millis(50), Duration::from_secs(3600));
        let link: Arc<dyn Link> = LoopbackLink::new();

        // A failed resolution still attaches the resolver to the link.
        let result = resolver.resolve(&NetworkAddress::from("nobody"), &link);
        assert_eq!(result, None);
        assert_eq!(resolver.attached_links.lock().unwrap().len(), 1);

        let started = Instant::now();
        resolver.shutdown();

        assert!(
            started.elapsed() < Duration::from_secs(1),
            "shutdown must not block on the configured sweep interval"
        );
        assert!(resolver.attached_links.lock().unwrap().is_empty());
    }

    #[test]
    fn cached_resolution_does_not_require_a_second_round_trip() {
        let resolver = ArpResolver::with_config(Duration::from_secs(5), Duration::from_secs(60));
        let concrete = LoopbackLink::new();
        let link: Arc<dyn Link> = concrete.clone();

        let resolver_clone = resolver.clone();
        let link_clone = link.clone();
        let handle = std::thread::spawn(move || resolver_clone.resolve(&NetworkAddress::from("hostB:l3"), &link_clone));
        std::thread::sleep(Duration::from_millis(20));
        send_reply(&resolver, &link, "hostB:l3", "hostB:l2");
        handle.join().unwrap();

        let second = resolver.resolve(&NetworkAddress::from("hostB:l3"), &link);
        assert_eq!(second, Some(ArpEntry { nl: NetworkAddress::from("hostB:l3"), ll: "hostB:l2".into() }));
    }
}
