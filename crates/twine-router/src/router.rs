//! The router: advertisement loop, ingress dispatch, forwarding and local
//! delivery.
//!
//! A router is a [`Receiver`] bound, through its link manager, to every link
//! it owns. Ingress frames are dispatched by envelope kind on the driver's
//! thread; the advertisement loop runs on a dedicated thread and broadcasts
//! the full route table to every link each cycle. Every handler is total:
//! decode failures, route misses and ARP timeouts log and drop, and never
//! take the router down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use twine_core::constants::{ADV_INTERVAL, HOP_PENALTY};
use twine_core::wire::{
    AdvPayload, AdvType, ArpPayload, ArpReply, ArpType, DataPayload, Envelope, MType,
    RouteAdvertisement,
};
use twine_core::{Identity, LlAddr, NlAddr, seal};
use twine_link::{Link, LinkManager, Receiver};

use crate::arp::ArpResolver;
use crate::route::Route;
use crate::table::{InstallOutcome, RouteTable};

/// A datagram delivered to the local node, after opening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    pub source: NlAddr,
    pub payload: Vec<u8>,
}

/// Callback invoked for every datagram addressed to this node.
pub type DataCallback = Box<dyn Fn(UserData) + Send + Sync>;

/// An overlay mesh router keyed by its own public key.
pub struct Router {
    identity: Identity,
    adv_interval: Duration,
    on_data: Option<DataCallback>,
    forwarding: AtomicBool,
    table: Mutex<RouteTable>,
    links: LinkManager,
    arp: Arc<ArpResolver>,
    running: AtomicBool,
    stopping: Mutex<bool>,
    stop_cv: Condvar,
    adv_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Router {
    /// Build a router with the default advertisement interval.
    pub fn new(identity: Identity, on_data: Option<DataCallback>) -> Arc<Self> {
        Self::with_interval(identity, on_data, ADV_INTERVAL)
    }

    /// Build a router advertising every `adv_interval`.
    ///
    /// The self-route is installed here; [`Router::start`] begins the
    /// advertisement loop.
    pub fn with_interval(
        identity: Identity,
        on_data: Option<DataCallback>,
        adv_interval: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let receiver: Weak<dyn Receiver> = weak.clone();
            let mut table = RouteTable::new();
            table.insert(Route::self_route(identity.address().clone()));
            Self {
                links: LinkManager::new(receiver),
                arp: ArpResolver::new(),
                table: Mutex::new(table),
                identity,
                adv_interval,
                on_data,
                forwarding: AtomicBool::new(true),
                running: AtomicBool::new(false),
                stopping: Mutex::new(false),
                stop_cv: Condvar::new(),
                adv_thread: Mutex::new(None),
            }
        })
    }

    /// Our network-layer address: the identity's public key.
    pub fn address(&self) -> &NlAddr {
        self.identity.address()
    }

    /// The manager binding this router to its links.
    pub fn link_manager(&self) -> &LinkManager {
        &self.links
    }

    /// Enable or disable forwarding of transit datagrams. On by default.
    pub fn set_forwarding(&self, enabled: bool) {
        self.forwarding.store(enabled, Ordering::Relaxed);
    }

    /// Snapshot of the route table.
    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        self.table.lock().expect("poisoned lock").snapshot()
    }

    /// Start the advertisement loop and the ARP cache sweeper. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.stopping.lock().expect("poisoned lock") = false;
        self.arp.start();

        let router = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("twine-adv".into())
            .spawn(move || router.advert_loop());
        match handle {
            Ok(handle) => {
                *self.adv_thread.lock().expect("poisoned lock") = Some(handle);
                info!(address = %self.identity.address(), "router started");
            }
            Err(e) => error!("failed to spawn advertisement thread: {e}"),
        }
    }

    /// Stop the advertisement loop, join it, and tear down the resolver.
    /// Concurrent `send_data` calls finish; at worst a late frame is dropped.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        {
            let mut stopping = self.stopping.lock().expect("poisoned lock");
            *stopping = true;
            self.stop_cv.notify_all();
        }
        let handle = self.adv_thread.lock().expect("poisoned lock").take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        self.arp.stop();
        info!(address = %self.identity.address(), "router stopped");
    }

    /// Send `payload` to `dst`, sealed to its public key.
    ///
    /// Returns false on route miss, ARP failure or transmit failure. Sending
    /// to our own address hands the payload straight to the data callback
    /// with no link traffic.
    pub fn send_data(&self, payload: &[u8], dst: &NlAddr) -> bool {
        let route = self.table.lock().expect("poisoned lock").get(dst).cloned();
        let Some(route) = route else {
            debug!(%dst, "send: no route");
            return false;
        };

        if route.is_self_route() {
            if let Some(on_data) = &self.on_data {
                on_data(UserData {
                    source: self.identity.address().clone(),
                    payload: payload.to_vec(),
                });
            }
            return true;
        }

        let sealed = match seal(dst, payload) {
            Ok(sealed) => sealed,
            Err(e) => {
                warn!(%dst, "send: sealing failed: {e}");
                return false;
            }
        };
        let datagram = DataPayload::new(self.identity.address().clone(), dst.clone(), sealed);
        let frame = match Envelope::data(&datagram).and_then(|env| env.encode()) {
            Ok(frame) => frame,
            Err(e) => {
                error!("failed to encode datagram: {e}");
                return false;
            }
        };

        let Some(link) = route.link() else {
            return false;
        };
        let Some(next_hop) = self.arp.resolve(route.gateway(), link) else {
            debug!(gateway = %route.gateway(), "send: arp resolution failed");
            return false;
        };
        match link.transmit(&frame, &next_hop.ll) {
            Ok(()) => true,
            Err(e) => {
                debug!(link = %link.name(), "send: transmit failed: {e}");
                false
            }
        }
    }

    fn advert_loop(self: Arc<Self>) {
        loop {
            {
                let stopping = self.stopping.lock().expect("poisoned lock");
                let (guard, _) = self
                    .stop_cv
                    .wait_timeout(stopping, self.adv_interval)
                    .expect("poisoned lock");
                if *guard {
                    return;
                }
            }
            self.advertise_cycle();
        }
    }

    /// One advertisement cycle: sweep, then broadcast every route on every
    /// link, claiming ourselves as the next hop.
    fn advertise_cycle(&self) {
        let routes = {
            let mut table = self.table.lock().expect("poisoned lock");
            let removed = table.sweep(Instant::now());
            if removed > 0 {
                debug!(removed, "swept expired routes");
            }
            table.snapshot()
        };

        for link in self.links.links() {
            for route in &routes {
                let advert = RouteAdvertisement {
                    address: route.destination().clone(),
                    distance: route.distance(),
                };
                let frame = AdvPayload::advertisement(self.identity.address().clone(), &advert)
                    .and_then(|payload| Envelope::adv(&payload))
                    .and_then(|env| env.encode());
                match frame {
                    Ok(frame) => {
                        if let Err(e) = link.broadcast(&frame) {
                            debug!(link = %link.name(), "advertisement broadcast failed: {e}");
                        }
                    }
                    Err(e) => error!("failed to encode advertisement: {e}"),
                }
            }
        }
    }

    fn handle_adv(&self, link: &Arc<dyn Link>, envelope: &Envelope) {
        let payload = match envelope.decode_adv() {
            Ok(payload) => payload,
            Err(e) => {
                debug!("dropping malformed adv: {e}");
                return;
            }
        };
        if payload.adv_type == AdvType::Retraction {
            debug!(origin = %payload.origin, "route retraction is unsupported, dropping");
            return;
        }
        let advert = match payload.route_advertisement() {
            Ok(advert) => advert,
            Err(e) => {
                debug!("dropping malformed route advertisement: {e}");
                return;
            }
        };
        if advert.address == *self.identity.address() {
            trace!("ignoring advertisement for our own address");
            return;
        }

        let distance = advert.distance.saturating_add(HOP_PENALTY);
        let candidate = Route::new(advert.address, payload.origin, Arc::clone(link), distance);
        let outcome = self
            .table
            .lock()
            .expect("poisoned lock")
            .install(candidate, Instant::now());
        match outcome {
            InstallOutcome::Installed | InstallOutcome::Replaced => {
                info!(link = %link.name(), distance, ?outcome, "route learned");
            }
            InstallOutcome::Refreshed => trace!(link = %link.name(), "route refreshed"),
            InstallOutcome::Dropped => trace!(link = %link.name(), "route candidate lost arbitration"),
        }
    }

    fn handle_arp(&self, link: &Arc<dyn Link>, envelope: &Envelope, src: &LlAddr) {
        let payload = match envelope.decode_arp() {
            Ok(payload) => payload,
            Err(e) => {
                debug!("dropping malformed arp: {e}");
                return;
            }
        };
        match payload.arp_type {
            ArpType::Request => {
                let requested = match payload.requested_address() {
                    Ok(requested) => requested,
                    Err(e) => {
                        debug!("dropping malformed arp request: {e}");
                        return;
                    }
                };
                // No proxy ARP: only our own address gets an answer.
                if requested != *self.identity.address() {
                    trace!(%requested, "arp request for someone else");
                    return;
                }
                let reply = ArpReply {
                    l3: requested,
                    l2: link.address(),
                };
                let frame = ArpPayload::response(&reply)
                    .and_then(|payload| Envelope::arp(&payload))
                    .and_then(|env| env.encode());
                match frame {
                    Ok(frame) => {
                        if let Err(e) = link.transmit(&frame, src) {
                            debug!(to = %src, "arp reply transmit failed: {e}");
                        } else {
                            debug!(to = %src, link = %link.name(), "answered arp request");
                        }
                    }
                    Err(e) => error!("failed to encode arp reply: {e}"),
                }
            }
            ArpType::Response => {
                trace!("arp response on the router path; the resolver consumes these");
            }
        }
    }

    fn handle_data(&self, frame: &[u8], envelope: &Envelope) {
        let payload = match envelope.decode_data() {
            Ok(payload) => payload,
            Err(e) => {
                debug!("dropping malformed data: {e}");
                return;
            }
        };
        if payload.dst == *self.identity.address() {
            match self.identity.open(&payload.data) {
                Ok(plaintext) => {
                    debug!(src = %payload.src, len = plaintext.len(), "delivering data");
                    if let Some(on_data) = &self.on_data {
                        on_data(UserData {
                            source: payload.src,
                            payload: plaintext,
                        });
                    }
                }
                Err(e) => warn!(src = %payload.src, "failed to open payload: {e}"),
            }
        } else if self.forwarding.load(Ordering::Relaxed) {
            self.attempt_forward(&payload, frame);
        } else {
            trace!(dst = %payload.dst, "forwarding disabled, dropping");
        }
    }

    /// Forward a transit datagram towards its destination. The sealed frame
    /// is retransmitted byte for byte.
    fn attempt_forward(&self, payload: &DataPayload, frame: &[u8]) {
        let route = self
            .table
            .lock()
            .expect("poisoned lock")
            .get(&payload.dst)
            .cloned();
        let Some(route) = route else {
            debug!(dst = %payload.dst, "no route for transit datagram, dropping");
            return;
        };
        let Some(link) = route.link() else {
            trace!(dst = %payload.dst, "transit datagram matched the self route, dropping");
            return;
        };
        let Some(next_hop) = self.arp.resolve(route.gateway(), link) else {
            debug!(gateway = %route.gateway(), "arp resolution failed, dropping");
            return;
        };
        if let Err(e) = link.transmit(frame, &next_hop.ll) {
            debug!(link = %link.name(), "forward transmit failed: {e}");
        } else {
            trace!(dst = %payload.dst, via = %route.gateway(), "forwarded");
        }
    }
}

impl Receiver for Router {
    fn on_receive(&self, link: &Arc<dyn Link>, frame: &[u8], src: &LlAddr) {
        let envelope = match Envelope::decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                trace!(link = %link.name(), "dropping undecodable frame: {e}");
                return;
            }
        };
        match envelope.kind {
            MType::Adv => self.handle_adv(link, &envelope),
            MType::Arp => self.handle_arp(link, &envelope, src),
            MType::Data => self.handle_data(frame, &envelope),
            MType::Unknown => debug!(link = %link.name(), "dropping frame of unknown kind"),
        }
    }
}
