//! The route table: one best path per destination, arbitrated by
//! distance and refreshed by advertisements.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::identity::NetworkAddress;
use crate::link::Link;

/// A single path to a destination.
///
/// `link` is `None` only for the self-route (spec.md §4: "the router's
/// own address, installed with distance 0 and no link — delivery is
/// local"). Equality compares the fields that make two routes the same
/// *path* — `destination`, `gateway`, `distance` and `link` identity —
/// deliberately ignoring `birth`/`lifetime` so a refreshed route still
/// compares equal to its own prior instance.
#[derive(Clone)]
pub struct Route {
    pub destination: NetworkAddress,
    pub link: Option<Arc<dyn Link>>,
    pub gateway: NetworkAddress,
    pub distance: u8,
    pub birth: Instant,
    pub lifetime: Duration,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("destination", &self.destination)
            .field("link", &self.link.as_ref().map(|l| l.address()))
            .field("gateway", &self.gateway)
            .field("distance", &self.distance)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.destination == other.destination
            && self.gateway == other.gateway
            && self.distance == other.distance
            && match (&self.link, &other.link) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
    }
}

impl Route {
    pub fn new(
        destination: NetworkAddress,
        link: Option<Arc<dyn Link>>,
        gateway: NetworkAddress,
        distance: u8,
        lifetime: Duration,
    ) -> Self {
        Self { destination, link, gateway, distance, birth: Instant::now(), lifetime }
    }

    /// The self-route never expires: it is re-derived from identity, not
    /// learned from the network, so there is nothing to time out.
    pub fn self_route(address: NetworkAddress) -> Self {
        Self {
            destination: address.clone(),
            link: None,
            gateway: address,
            distance: 0,
            birth: Instant::now(),
            lifetime: Duration::MAX,
        }
    }

    pub fn is_self_route(&self) -> bool {
        self.link.is_none() && self.distance == 0
    }

    pub fn is_direct(&self) -> bool {
        self.destination == self.gateway
    }

    pub fn has_expired(&self) -> bool {
        !self.is_self_route() && self.birth.elapsed() >= self.lifetime
    }
}

/// Destination-keyed table of best-known routes.
///
/// Arbitration (spec.md §4): a new route replaces the current one only
/// if it is strictly shorter, or is equal in every field that defines a
/// route's identity — destination, gateway, distance and link — in
/// which case installing it just refreshes the birth time. Anything
/// else (a same- or worse-distance candidate over a different path) is
/// dropped. A self-route is never evicted by a learned route —
/// distance 0 is unbeatable and the self-route is exempted from the
/// sweep regardless.
pub struct RouteTable {
    routes: Mutex<HashMap<NetworkAddress, Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self { routes: Mutex::new(HashMap::new()) }
    }

    /// Attempt to install `candidate`, returning `true` if it replaced
    /// (or newly created) the table entry for its destination.
    pub fn install_route(&self, candidate: Route) -> bool {
        let mut routes = self.routes.lock().expect("route table lock poisoned");
        match routes.get(&candidate.destination) {
            None => {
                routes.insert(candidate.destination.clone(), candidate);
                true
            }
            Some(current) if current.is_self_route() => false,
            Some(current) => {
                let shorter = candidate.distance < current.distance;
                let refresh = candidate == *current;
                if shorter || refresh {
                    routes.insert(candidate.destination.clone(), candidate);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn lookup(&self, destination: &NetworkAddress) -> Option<Route> {
        self.routes.lock().expect("route table lock poisoned").get(destination).cloned()
    }

    /// Snapshot of every currently installed route, for advertisement
    /// and diagnostics.
    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().expect("route table lock poisoned").values().cloned().collect()
    }

    /// Drop every route (other than the self-route) past its lifetime.
    /// Returns the destinations that were dropped.
    pub fn sweep(&self) -> Vec<NetworkAddress> {
        let mut routes = self.routes.lock().expect("route table lock poisoned");
        let expired: Vec<NetworkAddress> = routes
            .values()
            .filter(|route| route.has_expired())
            .map(|route| route.destination.clone())
            .collect();
        for destination in &expired {
            routes.remove(destination);
        }
        expired
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}
