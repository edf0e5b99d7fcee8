//! On-demand resolution of public keys to link-layer addresses.
//!
//! `resolve` consults a per-(address, link) cache; a miss broadcasts an ARP
//! REQUEST on the link and waits for the matching RESPONSE, which arrives on
//! the driver's thread through the resolver's own receiver attachment.
//! Results, including failures, are cached until the next sweep so repeated
//! misses do not flood the link.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

use twine_core::constants::{ARP_SWEEP_INTERVAL, ARP_TIMEOUT, ARP_WAIT_TICK};
use twine_core::wire::{ArpPayload, ArpType, Envelope, MType};
use twine_core::{LlAddr, NlAddr};
use twine_link::{Link, LinkId, Receiver};

/// A resolved mapping from a network-layer to a link-layer address.
///
/// The empty entry (both fields empty) records a failed resolution; it is
/// cached like any other entry but never satisfies a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct ArpEntry {
    pub nl: NlAddr,
    pub ll: LlAddr,
}

impl ArpEntry {
    pub fn new(nl: NlAddr, ll: LlAddr) -> Self {
        Self { nl, ll }
    }

    /// The failure marker.
    pub fn empty() -> Self {
        Self {
            nl: NlAddr::empty(),
            ll: LlAddr::empty(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nl.is_empty() && self.ll.is_empty()
    }
}

/// Cache key: resolutions of one address over different links are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ArpTarget {
    addr: NlAddr,
    link: LinkId,
}

struct CacheSlot {
    entry: ArpEntry,
    stored_at: Instant,
}

impl CacheSlot {
    fn has_expired(&self, now: Instant, lifetime: Duration) -> bool {
        now.saturating_duration_since(self.stored_at) > lifetime
    }
}

/// Request-and-wait ARP resolver with a swept cache.
pub struct ArpResolver {
    timeout: Duration,
    sweep_interval: Duration,
    cache: Mutex<HashMap<ArpTarget, CacheSlot>>,
    /// Replies handed from driver threads to waiting resolutions.
    pending: Mutex<HashMap<NlAddr, LlAddr>>,
    reply_cv: Condvar,
    /// Links we are already attached to, by id.
    attached: Mutex<HashSet<LinkId>>,
    stopping: Mutex<bool>,
    stop_cv: Condvar,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ArpResolver {
    pub fn new() -> Arc<Self> {
        Self::with_timings(ARP_TIMEOUT, ARP_SWEEP_INTERVAL)
    }

    /// Build with explicit resolution timeout and cache sweep interval.
    pub fn with_timings(timeout: Duration, sweep_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            timeout,
            sweep_interval,
            cache: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            reply_cv: Condvar::new(),
            attached: Mutex::new(HashSet::new()),
            stopping: Mutex::new(false),
            stop_cv: Condvar::new(),
            sweeper: Mutex::new(None),
        })
    }

    /// Start the periodic cache sweeper. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock().expect("poisoned lock");
        if sweeper.is_some() {
            return;
        }
        *self.stopping.lock().expect("poisoned lock") = false;
        let weak = Arc::downgrade(self);
        let handle = std::thread::Builder::new()
            .name("arp-sweeper".into())
            .spawn(move || Self::sweeper_loop(weak));
        match handle {
            Ok(handle) => *sweeper = Some(handle),
            Err(e) => error!("failed to spawn arp sweeper: {e}"),
        }
    }

    /// Stop and join the sweeper. In-flight resolutions finish or time out.
    pub fn stop(&self) {
        {
            let mut stopping = self.stopping.lock().expect("poisoned lock");
            *stopping = true;
            self.stop_cv.notify_all();
        }
        let handle = self.sweeper.lock().expect("poisoned lock").take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Resolve `addr` to a link-layer address over `link`.
    ///
    /// Returns `None` on timeout or when a recent failure is still cached.
    pub fn resolve(self: &Arc<Self>, addr: &NlAddr, link: &Arc<dyn Link>) -> Option<ArpEntry> {
        let target = ArpTarget {
            addr: addr.clone(),
            link: link.id(),
        };

        {
            let cache = self.cache.lock().expect("poisoned lock");
            if let Some(slot) = cache.get(&target)
                && !slot.has_expired(Instant::now(), self.sweep_interval)
            {
                if slot.entry.is_empty() {
                    trace!(%addr, link = %link.name(), "negative arp entry cached, not re-requesting");
                    return None;
                }
                return Some(slot.entry.clone());
            }
        }

        // Miss or stale: request on the wire. The cache lock is not held
        // here; concurrent misses for the same target may race, last write
        // wins.
        let entry = self.request(addr, link);
        let resolved = !entry.is_empty();
        self.cache.lock().expect("poisoned lock").insert(
            target,
            CacheSlot {
                entry: entry.clone(),
                stored_at: Instant::now(),
            },
        );
        resolved.then_some(entry)
    }

    fn request(self: &Arc<Self>, addr: &NlAddr, link: &Arc<dyn Link>) -> ArpEntry {
        self.attach_once(link);

        let frame = ArpPayload::request(addr)
            .and_then(|payload| Envelope::arp(&payload))
            .and_then(|env| env.encode());
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                error!("failed to encode arp request: {e}");
                return ArpEntry::empty();
            }
        };

        if let Err(e) = link.broadcast(&frame) {
            warn!(link = %link.name(), "arp request broadcast failed: {e}");
            return ArpEntry::empty();
        }
        debug!(%addr, link = %link.name(), "arp request sent");
        self.await_reply(addr)
    }

    /// Attach ourselves as a receiver to the link, at most once per link.
    fn attach_once(self: &Arc<Self>, link: &Arc<dyn Link>) {
        let newly = self.attached.lock().expect("poisoned lock").insert(link.id());
        if newly {
            let receiver: Arc<dyn Receiver> = Arc::clone(self) as Arc<dyn Receiver>;
            link.attach_receiver(&receiver);
        }
    }

    /// Wait for a reply for `addr`, waking every tick to rescan the pending
    /// map. The scan-then-wait shape makes a missed notification cost at
    /// most one duty cycle.
    fn await_reply(&self, addr: &NlAddr) -> ArpEntry {
        let deadline = Instant::now() + self.timeout;
        let mut pending = self.pending.lock().expect("poisoned lock");
        loop {
            if let Some(ll) = pending.remove(addr) {
                return ArpEntry::new(addr.clone(), ll);
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(%addr, "arp resolution timed out");
                return ArpEntry::empty();
            }
            let tick = ARP_WAIT_TICK.min(deadline - now);
            let (guard, _) = self
                .reply_cv
                .wait_timeout(pending, tick)
                .expect("poisoned lock");
            pending = guard;
        }
    }

    /// Drop cache slots older than the sweep interval.
    fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut cache = self.cache.lock().expect("poisoned lock");
        let before = cache.len();
        cache.retain(|_, slot| !slot.has_expired(now, self.sweep_interval));
        before - cache.len()
    }

    fn sweeper_loop(resolver: Weak<ArpResolver>) {
        loop {
            let Some(this) = resolver.upgrade() else {
                return;
            };
            {
                let stopping = this.stopping.lock().expect("poisoned lock");
                let (guard, _) = this
                    .stop_cv
                    .wait_timeout(stopping, this.sweep_interval)
                    .expect("poisoned lock");
                if *guard {
                    return;
                }
            }
            let removed = this.sweep();
            if removed > 0 {
                debug!(removed, "swept arp cache");
            }
        }
    }
}

impl Receiver for ArpResolver {
    /// Consume ARP RESPONSE frames; everything else is someone else's
    /// business. Requests in particular are answered by the router.
    fn on_receive(&self, _link: &Arc<dyn Link>, frame: &[u8], _src: &LlAddr) {
        let Ok(envelope) = Envelope::decode(frame) else {
            return;
        };
        if envelope.kind != MType::Arp {
            return;
        }
        let payload = match envelope.decode_arp() {
            Ok(payload) => payload,
            Err(e) => {
                trace!("undecodable arp payload: {e}");
                return;
            }
        };
        if payload.arp_type != ArpType::Response {
            return;
        }
        match payload.reply() {
            Ok(reply) => {
                trace!(addr = %reply.l3, ll = %reply.l2, "arp reply received");
                let mut pending = self.pending.lock().expect("poisoned lock");
                pending.insert(reply.l3, reply.l2);
                self.reply_cv.notify_all();
            }
            Err(e) => trace!("undecodable arp reply: {e}"),
        }
    }
}
