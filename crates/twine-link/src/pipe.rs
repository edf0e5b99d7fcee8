//! In-memory pipe links: two endpoints wired back to back.
//!
//! Frames sent on one endpoint arrive synchronously at the other end's
//! receivers, on the caller's thread. Used by the router's tests and by
//! multi-node demos inside one process.

use std::sync::{Arc, Mutex, Weak};

use twine_core::LlAddr;

use crate::error::LinkError;
use crate::traits::{Fanout, Link, LinkId};

/// One endpoint of an in-memory link pair.
pub struct PipeLink {
    id: LinkId,
    name: String,
    address: LlAddr,
    peer: Mutex<Option<Weak<PipeLink>>>,
    fanout: Fanout,
}

impl PipeLink {
    /// Create a connected pair of endpoints.
    pub fn pair(name_a: &str, name_b: &str) -> (Arc<Self>, Arc<Self>) {
        let a = Self::endpoint(name_a);
        let b = Self::endpoint(name_b);
        *a.peer.lock().expect("poisoned lock") = Some(Arc::downgrade(&b));
        *b.peer.lock().expect("poisoned lock") = Some(Arc::downgrade(&a));
        (a, b)
    }

    fn endpoint(name: &str) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let link = Self {
                id: LinkId::next(),
                name: format!("pipe[{name}]"),
                address: LlAddr::new(format!("pipe:{name}")),
                peer: Mutex::new(None),
                fanout: Fanout::new(),
            };
            let dyn_weak: Weak<dyn Link> = weak.clone();
            link.fanout.bind(dyn_weak);
            link
        })
    }

    /// A pipe has exactly one peer, so unicast and broadcast coincide.
    fn deliver(&self, frame: &[u8]) -> Result<(), LinkError> {
        let peer = self.peer.lock().expect("poisoned lock").clone();
        let Some(peer) = peer.and_then(|w| w.upgrade()) else {
            return Err(LinkError::PeerGone);
        };
        peer.receive(frame, &self.address);
        Ok(())
    }
}

impl Link for PipeLink {
    fn id(&self) -> LinkId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn address(&self) -> LlAddr {
        self.address.clone()
    }

    fn transmit(&self, frame: &[u8], _dst: &LlAddr) -> Result<(), LinkError> {
        self.deliver(frame)
    }

    fn broadcast(&self, frame: &[u8]) -> Result<(), LinkError> {
        self.deliver(frame)
    }

    fn fanout(&self) -> &Fanout {
        &self.fanout
    }
}
