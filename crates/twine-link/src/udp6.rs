//! IPv6 link-local UDP driver.
//!
//! One `Udp6Link` per network interface. Unicast goes to a peer's scoped
//! `[fe80::..%iface]:port` address; broadcast goes to the twine multicast
//! group, which every node on the segment joins. A single blocking receive
//! thread feeds the fan-out; it polls the running flag on a short read
//! timeout so `stop` returns promptly.

use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::{debug, trace, warn};

use twine_core::LlAddr;

use crate::error::LinkError;
use crate::netif::{self, LinkLocalIf};
use crate::traits::{Fanout, Link, LinkId};

/// Link-scope multicast group used for advertisement and ARP broadcast.
pub const MULTICAST_GROUP: Ipv6Addr = Ipv6Addr::new(0xFF12, 0, 0, 0, 0, 0, 0x74, 0x776E);

/// Default UDP port.
pub const DEFAULT_PORT: u16 = 4797;

const RECV_BUFFER: usize = 65536;

/// How often the receive thread re-checks the running flag.
const RX_POLL: Duration = Duration::from_millis(250);

/// Per-interface driver configuration.
#[derive(Debug, Clone)]
pub struct Udp6Config {
    pub ifname: String,
    pub if_index: u32,
    /// Our own link-local address on the interface.
    pub local: Ipv6Addr,
    pub port: u16,
}

impl Udp6Config {
    /// Configuration for a discovered interface.
    #[must_use]
    pub fn for_interface(iface: &LinkLocalIf, port: u16) -> Self {
        Self {
            ifname: iface.name.clone(),
            if_index: iface.if_index,
            local: iface.addr,
            port,
        }
    }
}

/// A link over IPv6 link-local UDP on one interface.
pub struct Udp6Link {
    id: LinkId,
    name: String,
    address: LlAddr,
    config: Udp6Config,
    socket: UdpSocket,
    running: AtomicBool,
    rx_thread: Mutex<Option<JoinHandle<()>>>,
    fanout: Fanout,
}

impl Udp6Link {
    /// Open the socket and build the link. Call [`Udp6Link::start`] to begin
    /// receiving.
    pub fn open(config: Udp6Config) -> Result<Arc<Self>, LinkError> {
        let socket = Self::create_socket(&config)?;
        let address = netif::format_ll_addr(&config.local, &config.ifname, config.port);
        let name = format!("udp6[{}]", config.ifname);

        Ok(Arc::new_cyclic(|weak: &Weak<Self>| {
            let link = Self {
                id: LinkId::next(),
                name,
                address,
                config,
                socket,
                running: AtomicBool::new(false),
                rx_thread: Mutex::new(None),
                fanout: Fanout::new(),
            };
            let dyn_weak: Weak<dyn Link> = weak.clone();
            link.fanout.bind(dyn_weak);
            link
        }))
    }

    fn create_socket(config: &Udp6Config) -> Result<UdpSocket, LinkError> {
        let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_only_v6(true)?;

        socket.set_multicast_if_v6(config.if_index)?;
        socket.join_multicast_v6(&MULTICAST_GROUP, config.if_index)?;
        // Our own multicast sends must not loop back into the receive path.
        socket.set_multicast_loop_v6(false)?;

        let bind_addr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, config.port, 0, 0);
        socket.bind(&SockAddr::from(bind_addr))?;

        let socket: UdpSocket = socket.into();
        socket.set_read_timeout(Some(RX_POLL))?;
        Ok(socket)
    }

    /// Spawn the receive thread. Idempotent.
    pub fn start(self: &Arc<Self>) -> Result<(), LinkError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let link = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name(format!("{}-rx", self.name))
            .spawn(move || link.rx_loop())?;
        *self.rx_thread.lock().expect("poisoned lock") = Some(handle);
        Ok(())
    }

    /// Stop the receive thread and wait for it to exit.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.rx_thread.lock().expect("poisoned lock").take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn rx_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; RECV_BUFFER];
        while self.running.load(Ordering::SeqCst) {
            match self.socket.recv_from(&mut buf) {
                Ok((len, SocketAddr::V6(src))) => {
                    if *src.ip() == self.config.local {
                        // Unicast self-echo; multicast loop is already off.
                        continue;
                    }
                    let src_ll =
                        netif::format_ll_addr(src.ip(), &self.config.ifname, src.port());
                    trace!(link = %self.name, %src_ll, len, "frame received");
                    self.receive(&buf[..len], &src_ll);
                }
                Ok((_, SocketAddr::V4(src))) => {
                    trace!(link = %self.name, %src, "ignoring ipv4 datagram");
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    warn!(link = %self.name, "receive failed: {e}");
                }
            }
        }
        debug!(link = %self.name, "receive thread exiting");
    }

    fn resolve_scope(&self, zone: Option<&str>) -> u32 {
        match zone {
            None => self.config.if_index,
            Some(z) if z == self.config.ifname => self.config.if_index,
            Some(z) => match z.parse::<u32>() {
                Ok(index) => index,
                Err(_) => zone_to_index(z).unwrap_or(self.config.if_index),
            },
        }
    }
}

#[cfg(unix)]
fn zone_to_index(zone: &str) -> Option<u32> {
    nix::net::if_::if_nametoindex(zone).ok()
}

#[cfg(not(unix))]
fn zone_to_index(_zone: &str) -> Option<u32> {
    None
}

impl Link for Udp6Link {
    fn id(&self) -> LinkId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn address(&self) -> LlAddr {
        self.address.clone()
    }

    fn transmit(&self, frame: &[u8], dst: &LlAddr) -> Result<(), LinkError> {
        let (addr, zone, port) = netif::parse_ll_addr(dst)?;
        let scope = self.resolve_scope(zone.as_deref());
        let target = SocketAddrV6::new(addr, port, 0, scope);
        self.socket.send_to(frame, target)?;
        Ok(())
    }

    fn broadcast(&self, frame: &[u8]) -> Result<(), LinkError> {
        let target = SocketAddrV6::new(MULTICAST_GROUP, self.config.port, 0, self.config.if_index);
        self.socket.send_to(frame, target)?;
        Ok(())
    }

    fn fanout(&self) -> &Fanout {
        &self.fanout
    }
}
