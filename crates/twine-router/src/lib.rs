//! Routing for the twine overlay mesh.
//!
//! The [`Router`] is the central dispatcher: it advertises its route table
//! to neighbours, learns routes from their advertisements, answers ARP
//! requests for its own address, and forwards sealed datagrams hop by hop.
//! The [`ArpResolver`] maps a peer's public key to a link-layer address on a
//! chosen link, with a caching table swept periodically.

pub mod arp;
pub mod route;
pub mod router;
pub mod table;

pub use arp::{ArpEntry, ArpResolver};
pub use route::Route;
pub use router::{DataCallback, Router, UserData};
pub use table::{InstallOutcome, RouteTable};
