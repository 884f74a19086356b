//! Binds one receiver to every link the router currently knows about —
//! present and future alike.

use std::sync::{Arc, Mutex};

use super::{Link, LinkLayerAddress, Receiver};

/// Tracks the set of links a [`crate::router::Router`] sends and
/// receives over. Attaching the router's own [`Receiver`] impl happens
/// once, here, rather than at every call site that adds a link —
/// mirroring how the reference `InterfaceManager` owns interface
/// registration centrally instead of leaving each caller to remember to
/// wire up its own receive channel.
pub struct LinkManager {
    receiver: Arc<dyn Receiver>,
    links: Mutex<Vec<Arc<dyn Link>>>,
}

impl LinkManager {
    pub fn new(receiver: Arc<dyn Receiver>) -> Self {
        Self { receiver, links: Mutex::new(Vec::new()) }
    }

    /// Attach a link, wiring in the shared receiver immediately so no
    /// frame arriving after this call is missed.
    pub fn add_link(&self, link: Arc<dyn Link>) {
        link.attach_receiver(self.receiver.clone());
        self.links.lock().expect("link manager lock poisoned").push(link);
    }

    /// Detach a link by identity. The link's own receiver set is not
    /// touched beyond removing the manager's receiver — a caller that
    /// also attached other receivers to this link is responsible for
    /// tearing those down itself.
    pub fn remove_link(&self, link: &Arc<dyn Link>) {
        link.detach_receiver(&self.receiver);
        let mut links = self.links.lock().expect("link manager lock poisoned");
        links.retain(|existing| !Arc::ptr_eq(existing, link));
    }

    /// A snapshot of the currently attached links.
    pub fn links(&self) -> Vec<Arc<dyn Link>> {
        self.links.lock().expect("link manager lock poisoned").clone()
    }
}
