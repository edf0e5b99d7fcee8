//! Core types, identity, and wire formats for the twine overlay mesh.
//!
//! This crate defines the address newtypes, the node identity (an x25519
//! keypair whose public key doubles as the routing address), the sealed
//! payload primitive, and the msgpack wire codec shared by every twine node.

pub mod constants;
pub mod error;
pub mod identity;
pub mod types;
pub mod wire;

pub use error::{CryptoError, WireError};
pub use identity::{Identity, seal};
pub use types::{LlAddr, NlAddr};
pub use wire::{
    AdvPayload, AdvType, ArpPayload, ArpReply, ArpType, DataPayload, Envelope, MType,
    RouteAdvertisement,
};
