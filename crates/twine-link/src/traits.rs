//! The link contract and its ingress fan-out base.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use twine_core::LlAddr;

use crate::error::LinkError;

/// Unique identifier for a link instance, assigned at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct LinkId(pub u64);

impl LinkId {
    /// Allocate the next process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// A subscriber to a link's ingress stream.
pub trait Receiver: Send + Sync {
    /// Called once per inbound frame, on the driver's thread, with no link
    /// lock held. Frames on one link arrive serially; handler latency
    /// back-pressures the driver.
    fn on_receive(&self, link: &Arc<dyn Link>, frame: &[u8], src: &LlAddr);
}

/// An abstract frame transport.
///
/// Drivers implement the identity and I/O methods and embed a [`Fanout`];
/// receiver registration and ingress dispatch are provided here so every
/// driver shares the same fan-out semantics.
pub trait Link: Send + Sync {
    fn id(&self) -> LinkId;

    /// Human-readable name, e.g. `udp6[eth0]`.
    fn name(&self) -> &str;

    /// The driver's own link-layer address.
    fn address(&self) -> LlAddr;

    /// Unicast a frame to a specific link-layer address. Best effort.
    fn transmit(&self, frame: &[u8], dst: &LlAddr) -> Result<(), LinkError>;

    /// Deliver a frame to every peer on the link's broadcast domain.
    fn broadcast(&self, frame: &[u8]) -> Result<(), LinkError>;

    /// The receiver set shared by the provided methods below.
    fn fanout(&self) -> &Fanout;

    /// Register interest in ingress. Set-like: attaching the same receiver
    /// twice is a no-op; identity is by allocation.
    fn attach_receiver(&self, receiver: &Arc<dyn Receiver>) {
        self.fanout().attach(receiver);
    }

    fn detach_receiver(&self, receiver: &Arc<dyn Receiver>) {
        self.fanout().detach(receiver);
    }

    /// Called by the driver when a frame arrives. Snapshots the receiver
    /// set, releases the fan-out lock, then dispatches; receivers are free
    /// to re-enter link operations from `on_receive`.
    fn receive(&self, frame: &[u8], src: &LlAddr) {
        let Some(link) = self.fanout().owner() else {
            return;
        };
        for receiver in self.fanout().snapshot() {
            receiver.on_receive(&link, frame, src);
        }
    }
}

/// Receiver set plus a weak back-reference to the link that owns it.
///
/// Receivers are held weakly: registration never extends a receiver's
/// lifetime, and dead entries are pruned as they are encountered.
pub struct Fanout {
    owner: Mutex<Option<Weak<dyn Link>>>,
    receivers: Mutex<Vec<Weak<dyn Receiver>>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self {
            owner: Mutex::new(None),
            receivers: Mutex::new(Vec::new()),
        }
    }

    /// Bind the owning link. Called once from the driver's constructor.
    pub fn bind(&self, owner: Weak<dyn Link>) {
        *self.owner.lock().expect("poisoned lock") = Some(owner);
    }

    /// The owning link, if it is still alive.
    pub fn owner(&self) -> Option<Arc<dyn Link>> {
        self.owner
            .lock()
            .expect("poisoned lock")
            .as_ref()?
            .upgrade()
    }

    /// Add a receiver. No-op when the same allocation is already attached.
    pub fn attach(&self, receiver: &Arc<dyn Receiver>) {
        let candidate = Arc::downgrade(receiver);
        let mut receivers = self.receivers.lock().expect("poisoned lock");
        receivers.retain(|w| w.upgrade().is_some());
        if receivers.iter().any(|w| w.ptr_eq(&candidate)) {
            return;
        }
        receivers.push(candidate);
    }

    /// Remove a receiver, if attached.
    pub fn detach(&self, receiver: &Arc<dyn Receiver>) {
        let target = Arc::downgrade(receiver);
        let mut receivers = self.receivers.lock().expect("poisoned lock");
        receivers.retain(|w| !w.ptr_eq(&target) && w.upgrade().is_some());
    }

    /// Copy the live receivers out from under the lock. Dispatch happens on
    /// the snapshot so no receiver callback ever runs with the lock held.
    pub fn snapshot(&self) -> Vec<Arc<dyn Receiver>> {
        self.receivers
            .lock()
            .expect("poisoned lock")
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Number of live receivers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receivers
            .lock()
            .expect("poisoned lock")
            .iter()
            .filter(|w| w.upgrade().is_some())
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::PipeLink;
    use std::sync::Mutex as StdMutex;

    struct CountingReceiver {
        frames: StdMutex<Vec<(Vec<u8>, LlAddr)>>,
    }

    impl CountingReceiver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frames: StdMutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.frames.lock().unwrap().len()
        }
    }

    impl Receiver for CountingReceiver {
        fn on_receive(&self, _link: &Arc<dyn Link>, frame: &[u8], src: &LlAddr) {
            self.frames.lock().unwrap().push((frame.to_vec(), src.clone()));
        }
    }

    #[test]
    fn link_ids_are_unique() {
        let a = LinkId::next();
        let b = LinkId::next();
        assert_ne!(a, b);
        assert_eq!(format!("{a}"), format!("link#{}", a.0));
    }

    #[test]
    fn attach_is_set_like() {
        let (a, _b) = PipeLink::pair("a", "b");
        let receiver = CountingReceiver::new();
        let dyn_receiver: Arc<dyn Receiver> = receiver.clone();

        a.attach_receiver(&dyn_receiver);
        a.attach_receiver(&dyn_receiver);
        assert_eq!(a.fanout().len(), 1);

        a.receive(b"frame", &LlAddr::new("src"));
        assert_eq!(receiver.count(), 1);
    }

    #[test]
    fn detach_removes_receiver() {
        let (a, _b) = PipeLink::pair("a", "b");
        let receiver = CountingReceiver::new();
        let dyn_receiver: Arc<dyn Receiver> = receiver.clone();

        a.attach_receiver(&dyn_receiver);
        a.detach_receiver(&dyn_receiver);
        assert!(a.fanout().is_empty());

        a.receive(b"frame", &LlAddr::new("src"));
        assert_eq!(receiver.count(), 0);
    }

    #[test]
    fn dropped_receiver_is_pruned() {
        let (a, _b) = PipeLink::pair("a", "b");
        {
            let receiver = CountingReceiver::new();
            let dyn_receiver: Arc<dyn Receiver> = receiver;
            a.attach_receiver(&dyn_receiver);
        }
        // The weak entry is dead; dispatch sees nobody.
        assert!(a.fanout().is_empty());
        a.receive(b"frame", &LlAddr::new("src"));
    }

    #[test]
    fn fanout_reaches_all_receivers() {
        let (a, _b) = PipeLink::pair("a", "b");
        let r1 = CountingReceiver::new();
        let r2 = CountingReceiver::new();
        let d1: Arc<dyn Receiver> = r1.clone();
        let d2: Arc<dyn Receiver> = r2.clone();
        a.attach_receiver(&d1);
        a.attach_receiver(&d2);

        a.receive(b"frame", &LlAddr::new("src"));
        assert_eq!(r1.count(), 1);
        assert_eq!(r2.count(), 1);
    }

    /// A receiver that re-enters the link from inside the callback. Would
    /// deadlock if dispatch held the fan-out lock.
    struct ReentrantReceiver {
        hits: StdMutex<usize>,
    }

    impl Receiver for ReentrantReceiver {
        fn on_receive(&self, link: &Arc<dyn Link>, _frame: &[u8], _src: &LlAddr) {
            let mut hits = self.hits.lock().unwrap();
            *hits += 1;
            if *hits == 1 {
                drop(hits);
                // Re-enter both the receiver set and transmit.
                let _ = link.fanout().len();
                let _ = link.transmit(b"reply", &link.address());
            }
        }
    }

    #[test]
    fn receivers_may_reenter_link_operations() {
        let (a, b) = PipeLink::pair("a", "b");
        let receiver = Arc::new(ReentrantReceiver {
            hits: StdMutex::new(0),
        });
        let dyn_receiver: Arc<dyn Receiver> = receiver.clone();
        a.attach_receiver(&dyn_receiver);

        // Delivery path: b.transmit lands on a, whose receiver transmits
        // back through a (landing on b, where nobody listens).
        b.transmit(b"ping", &a.address()).unwrap();
        assert_eq!(*receiver.hits.lock().unwrap(), 1);
    }
}
