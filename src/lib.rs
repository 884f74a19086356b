//! twine — an overlay mesh router whose identity is a public key rather
//! than a numeric address.
//!
//! This crate implements the router subsystem described for `twine`: the
//! advertisement loop, route table, ARP-style resolver, link abstraction
//! and link manager, and the wire codec that ties them together. Concrete
//! link drivers (UDP multicast, serial, …), process bootstrap and the
//! asymmetric-crypto primitive are treated as external collaborators —
//! see [`link`] and [`crypto`] for the interfaces they must satisfy.

pub mod arp;
pub mod crypto;
pub mod identity;
pub mod link;
pub mod route;
pub mod router;
pub mod util;
pub mod wire;

pub use identity::{Identity, NetworkAddress};
pub use link::{Link, LinkManager, Receiver};
pub use route::Route;
pub use router::{Router, RouterConfig};
