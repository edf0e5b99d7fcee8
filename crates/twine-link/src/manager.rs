//! Link registration and single-receiver binding.

use std::sync::{Arc, Mutex, Weak};

use crate::traits::{Link, Receiver};

/// Owns the set of active links and binds one receiver to all of them.
///
/// The receiver is held weakly so a router can hand itself to its own
/// manager without creating an ownership cycle.
pub struct LinkManager {
    receiver: Weak<dyn Receiver>,
    links: Mutex<Vec<Arc<dyn Link>>>,
}

impl LinkManager {
    pub fn new(receiver: Weak<dyn Receiver>) -> Self {
        Self {
            receiver,
            links: Mutex::new(Vec::new()),
        }
    }

    /// Register a link and attach the bound receiver to it. Adding the same
    /// link twice is a no-op.
    pub fn add_link(&self, link: Arc<dyn Link>) {
        {
            let mut links = self.links.lock().expect("poisoned lock");
            if links.iter().any(|l| l.id() == link.id()) {
                return;
            }
            links.push(Arc::clone(&link));
        }
        // Attach outside the manager lock; attach takes the link's own lock.
        if let Some(receiver) = self.receiver.upgrade() {
            link.attach_receiver(&receiver);
        }
    }

    /// Unregister a link and detach the bound receiver from it.
    pub fn remove_link(&self, link: &Arc<dyn Link>) {
        let removed = {
            let mut links = self.links.lock().expect("poisoned lock");
            let before = links.len();
            links.retain(|l| l.id() != link.id());
            links.len() != before
        };
        if removed && let Some(receiver) = self.receiver.upgrade() {
            link.detach_receiver(&receiver);
        }
    }

    /// Snapshot copy of the registered links.
    #[must_use]
    pub fn links(&self) -> Vec<Arc<dyn Link>> {
        self.links.lock().expect("poisoned lock").clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.lock().expect("poisoned lock").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::PipeLink;
    use twine_core::LlAddr;

    struct NullReceiver;

    impl Receiver for NullReceiver {
        fn on_receive(&self, _link: &Arc<dyn Link>, _frame: &[u8], _src: &LlAddr) {}
    }

    fn make_manager() -> (LinkManager, Arc<dyn Receiver>) {
        let receiver: Arc<dyn Receiver> = Arc::new(NullReceiver);
        let manager = LinkManager::new(Arc::downgrade(&receiver));
        (manager, receiver)
    }

    #[test]
    fn add_link_attaches_receiver() {
        let (manager, _receiver) = make_manager();
        let (a, _b) = PipeLink::pair("a", "b");

        manager.add_link(a.clone());
        assert_eq!(manager.len(), 1);
        assert_eq!(a.fanout().len(), 1);
    }

    #[test]
    fn add_link_is_idempotent() {
        let (manager, _receiver) = make_manager();
        let (a, _b) = PipeLink::pair("a", "b");

        manager.add_link(a.clone());
        manager.add_link(a.clone());
        assert_eq!(manager.len(), 1);
        assert_eq!(a.fanout().len(), 1);
    }

    #[test]
    fn remove_link_detaches_receiver() {
        let (manager, _receiver) = make_manager();
        let (a, _b) = PipeLink::pair("a", "b");

        manager.add_link(a.clone());
        let dyn_link: Arc<dyn Link> = a.clone();
        manager.remove_link(&dyn_link);

        assert!(manager.is_empty());
        assert!(a.fanout().is_empty());
    }

    #[test]
    fn remove_unknown_link_is_a_noop() {
        let (manager, _receiver) = make_manager();
        let (a, b) = PipeLink::pair("a", "b");

        manager.add_link(a.clone());
        let dyn_b: Arc<dyn Link> = b.clone();
        manager.remove_link(&dyn_b);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn links_returns_a_snapshot() {
        let (manager, _receiver) = make_manager();
        let (a, b) = PipeLink::pair("a", "b");
        manager.add_link(a.clone());
        manager.add_link(b.clone());

        let snapshot = manager.links();
        assert_eq!(snapshot.len(), 2);

        let dyn_a: Arc<dyn Link> = a;
        manager.remove_link(&dyn_a);
        // Old snapshot is unaffected.
        assert_eq!(snapshot.len(), 2);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn dead_receiver_means_no_attachment() {
        let (a, _b) = PipeLink::pair("a", "b");
        let manager = {
            let receiver: Arc<dyn Receiver> = Arc::new(NullReceiver);
            LinkManager::new(Arc::downgrade(&receiver))
        };
        manager.add_link(a.clone());
        assert_eq!(manager.len(), 1);
        assert!(a.fanout().is_empty());
    }
}
