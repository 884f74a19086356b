//! The link abstraction: drivers the router treats as opaque.
//!
//! [`Link`] is deliberately thin — `transmit`, `broadcast`, `address` and a
//! set of attached [`Receiver`]s. Concrete drivers (UDP multicast, serial,
//! loopback, …) are out of scope here; this module only defines the
//! interface and the plumbing shared by every driver.
//!
//! Unlike the reference interface layer, which fans packets out over
//! `tokio::sync::mpsc` channels pumped by an async task per interface,
//! this crate's links run on blocking OS threads: a driver's receive loop
//! calls [`LinkCore::receive`] directly from whatever thread is reading
//! the underlying transport. That redesign is spec-mandated — no async
//! runtime anywhere in this crate.

mod manager;

pub use manager::LinkManager;

use std::sync::{Arc, Mutex};

/// A driver-specific, opaque peer address used for unicast transmission
/// on a given link (a scoped `[addr%iface]:port` form for IPv6
/// link-local UDP, say). Distinct from the network-layer identity in
/// [`crate::identity::NetworkAddress`] — the whole point of ARP is to
/// map one to the other.
pub type LinkLayerAddress = String;

/// Something that wants to see frames arriving on a link.
///
/// Implementations must not block for long inside `on_receive`: it runs
/// on the link's own receive thread, and a slow receiver delays every
/// other receiver attached to the same link.
pub trait Receiver: Send + Sync {
    fn on_receive(&self, link: &Arc<dyn Link>, data: &[u8], src_ll: &LinkLayerAddress);
}

/// A transport a [`crate::router::Router`] can send frames over and
/// receive frames from.
///
/// `attach_receiver`/`detach_receiver` treat the receiver set as
/// identity-compared (`Arc::ptr_eq`), not content-compared — two
/// receivers that happen to be equal by value are still distinct
/// attachments, matching how the reference transport core tracks
/// per-destination callbacks by the callback's identity rather than by
/// value.
pub trait Link: Send + Sync {
    /// Best-effort, fire-and-forget unicast to `dst_ll`.
    fn transmit(&self, data: &[u8], dst_ll: &LinkLayerAddress) -> std::io::Result<()>;

    /// Deliver to every peer on this driver's broadcast domain.
    fn broadcast(&self, data: &[u8]) -> std::io::Result<()>;

    /// This link's own link-layer address.
    fn address(&self) -> LinkLayerAddress;

    fn attach_receiver(&self, receiver: Arc<dyn Receiver>);
    fn detach_receiver(&self, receiver: &Arc<dyn Receiver>);
}

/// Shared receiver-set bookkeeping a concrete [`Link`] can embed.
///
/// `receive` snapshots the receiver set under the lock, releases it,
/// then calls each receiver outside the lock — so a receiver that turns
/// around and calls back into this same link (to `transmit` a reply, or
/// to `detach_receiver` itself) cannot deadlock against `receive`'s own
/// lock acquisition.
#[derive(Default)]
pub struct LinkCore {
    receivers: Mutex<Vec<Arc<dyn Receiver>>>,
}

impl LinkCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, receiver: Arc<dyn Receiver>) {
        let mut receivers = self.receivers.lock().expect("link receiver lock poisoned");
        if !receivers.iter().any(|existing| Arc::ptr_eq(existing, &receiver)) {
            receivers.push(receiver);
        }
    }

    pub fn detach(&self, receiver: &Arc<dyn Receiver>) {
        let mut receivers = self.receivers.lock().expect("link receiver lock poisoned");
        receivers.retain(|existing| !Arc::ptr_eq(existing, receiver));
    }

    /// Called by the driver when a frame arrives.
    pub fn receive(&self, link: &Arc<dyn Link>, data: &[u8], src_ll: &LinkLayerAddress) {
        let snapshot = {
            let receivers = self.receivers.lock().expect("link receiver lock poisoned");
            receivers.clone()
        };
        for receiver in snapshot {
            receiver.on_receive(link, data, src_ll);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingReceiver(AtomicUsize);

    impl Receiver for CountingReceiver {
        fn on_receive(&self, _link: &Arc<dyn Link>, _data: &[u8], _src_ll: &LinkLayerAddress) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct NullLink(LinkCore);

    impl Link for NullLink {
        fn transmit(&self, _data: &[u8], _dst_ll: &LinkLayerAddress) -> std::io::Result<()> {
            Ok(())
        }
        fn broadcast(&self, _data: &[u8]) -> std::io::Result<()> {
            Ok(())
        }
        fn address(&self) -> LinkLayerAddress {
            "null".into()
        }
        fn attach_receiver(&self, receiver: Arc<dyn Receiver>) {
            self.0.attach(receiver);
        }
        fn detach_receiver(&self, receiver: &Arc<dyn Receiver>) {
            self.0.detach(receiver);
        }
    }

    #[test]
    fn attach_is_idempotent_by_identity() {
        let concrete = Arc::new(NullLink(LinkCore::new()));
        let link: Arc<dyn Link> = concrete.clone();
        let counting = Arc::new(CountingReceiver(AtomicUsize::new(0)));
        let receiver: Arc<dyn Receiver> = counting.clone();

        link.attach_receiver(receiver.clone());
        link.attach_receiver(receiver.clone());
        concrete.0.receive(&link, b"hello", &"peer".to_string());

        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detach_stops_future_dispatch() {
        let concrete = Arc::new(NullLink(LinkCore::new()));
        let link: Arc<dyn Link> = concrete.clone();
        let counting = Arc::new(CountingReceiver(AtomicUsize::new(0)));
        let receiver: Arc<dyn Receiver> = counting.clone();

        link.attach_receiver(receiver.clone());
        link.detach_receiver(&receiver);
        concrete.0.receive(&link, b"hello", &"peer".to_string());

        assert_eq!(counting.0.load(Ordering::SeqCst), 0);
    }
}
