//! Address newtypes for the two addressing layers.
//!
//! These wrappers keep network-layer addresses (public keys) and link-layer
//! addresses (driver-defined strings) from being mixed up, the same way the
//! routing tables key on one and the drivers speak only the other.

use std::fmt;

/// A network-layer address: a peer's printable public key.
///
/// All routing, ARP resolution and payload sealing are keyed by this value.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct NlAddr(String);

impl NlAddr {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// The empty address, used by ARP entries to encode resolution failure.
    pub fn empty() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NlAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NlAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Public keys are long; show a prefix.
        let head = self.0.get(..8).unwrap_or(&self.0);
        write!(f, "NlAddr({head}..)")
    }
}

impl From<&str> for NlAddr {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for NlAddr {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for NlAddr {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A link-layer address: a driver-defined peer address on a given link.
///
/// For the UDP6 driver this is the scoped `[fe80::..%iface]:port` form; the
/// core treats it as opaque.
#[derive(Clone, PartialEq, Eq, Hash)]
#[must_use]
pub struct LlAddr(String);

impl LlAddr {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// The empty address, used by ARP entries to encode resolution failure.
    pub fn empty() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LlAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for LlAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LlAddr({})", self.0)
    }
}

impl From<&str> for LlAddr {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for LlAddr {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for LlAddr {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
