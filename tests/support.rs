//! A link driver with no wire at all: two endpoints wired directly
//! together in memory, for router end-to-end tests. Stands in for the
//! concrete drivers (UDP multicast, serial, …) that are out of scope.

use std::sync::{Arc, Mutex};

use twine::link::{Link, LinkCore, LinkLayerAddress, Receiver};

struct Endpoint {
    ll: LinkLayerAddress,
    core: LinkCore,
}

/// One side of a point-to-point dummy link. `transmit`/`broadcast` both
/// deliver synchronously to the peer on the caller's own thread —
/// there's no real wire to cross, so there's nothing to queue.
pub struct DummyLink {
    local: Endpoint,
    peer: Mutex<Option<Arc<DummyLink>>>,
}

impl DummyLink {
    /// Build two endpoints already wired to each other.
    pub fn pair(a_ll: &str, b_ll: &str) -> (Arc<DummyLink>, Arc<DummyLink>) {
        let a = Arc::new(DummyLink {
            local: Endpoint { ll: a_ll.to_owned(), core: LinkCore::new() },
            peer: Mutex::new(None),
        });
        let b = Arc::new(DummyLink {
            local: Endpoint { ll: b_ll.to_owned(), core: LinkCore::new() },
            peer: Mutex::new(None),
        });
        *a.peer.lock().unwrap() = Some(b.clone());
        *b.peer.lock().unwrap() = Some(a.clone());
        (a, b)
    }
}

impl Link for DummyLink {
    fn transmit(&self, data: &[u8], dst_ll: &LinkLayerAddress) -> std::io::Result<()> {
        let peer = self.peer.lock().unwrap().clone();
        if let Some(peer) = peer {
            if &peer.local.ll == dst_ll {
                let as_link: Arc<dyn Link> = peer.clone();
                peer.local.core.receive(&as_link, data, &self.local.ll);
            }
        }
        Ok(())
    }

    fn broadcast(&self, data: &[u8]) -> std::io::Result<()> {
        let peer = self.peer.lock().unwrap().clone();
        if let Some(peer) = peer {
            let as_link: Arc<dyn Link> = peer.clone();
            peer.local.core.receive(&as_link, data, &self.local.ll);
        }
        Ok(())
    }

    fn address(&self) -> LinkLayerAddress {
        self.local.ll.clone()
    }

    fn attach_receiver(&self, receiver: Arc<dyn Receiver>) {
        self.local.core.attach(receiver);
    }

    fn detach_receiver(&self, receiver: &Arc<dyn Receiver>) {
        self.local.core.detach(receiver);
    }
}
