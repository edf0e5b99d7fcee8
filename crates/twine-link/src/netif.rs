//! IPv6 link-local interface discovery and scoped address naming.
//!
//! The UDP6 driver names peers with the scoped form `[fe80::..%iface]:port`.
//! This module owns the link-local predicate, the `getifaddrs` walk that
//! finds candidate interfaces, and the formatting/parsing of scoped
//! link-layer addresses.

use std::net::Ipv6Addr;

use twine_core::LlAddr;

use crate::error::LinkError;

/// Loopback interfaces are never candidates for mesh links.
#[cfg(target_os = "macos")]
const IGNORED_ALWAYS: &[&str] = &["lo0", "awdl0", "llw0"];

#[cfg(target_os = "linux")]
const IGNORED_ALWAYS: &[&str] = &["lo"];

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
const IGNORED_ALWAYS: &[&str] = &["lo0"];

/// A network interface carrying an IPv6 link-local address.
#[derive(Debug, Clone)]
pub struct LinkLocalIf {
    /// OS interface name, e.g. `eth0`.
    pub name: String,
    /// The link-local address, without scope.
    pub addr: Ipv6Addr,
    /// OS interface index, for multicast socket options and scoped sends.
    pub if_index: u32,
}

/// Whether an IPv6 address has link-local scope (fe80::/10).
#[must_use]
pub fn is_link_local(addr: Ipv6Addr) -> bool {
    let octets = addr.octets();
    octets[0] == 0xFE && (octets[1] & 0xC0) == 0x80
}

/// Enumerate interfaces with an IPv6 link-local address.
///
/// Loopback and `ignored` interfaces are skipped; a non-empty `allowed`
/// list restricts the result to those names. The first link-local address
/// found per interface wins, and results are sorted by name.
#[cfg(unix)]
pub fn enumerate_link_local(
    allowed: &[String],
    ignored: &[String],
) -> std::io::Result<Vec<LinkLocalIf>> {
    use std::collections::HashMap;

    let addrs = nix::ifaddrs::getifaddrs().map_err(std::io::Error::other)?;
    let mut seen: HashMap<String, (Ipv6Addr, u32)> = HashMap::new();

    for ifaddr in addrs {
        let name = ifaddr.interface_name.clone();
        if IGNORED_ALWAYS.contains(&name.as_str()) && !allowed.contains(&name) {
            continue;
        }
        if ignored.contains(&name) {
            continue;
        }
        if !allowed.is_empty() && !allowed.contains(&name) {
            continue;
        }
        if seen.contains_key(&name) {
            continue;
        }

        if let Some(sock_addr) = ifaddr.address
            && let Some(sin6) = sock_addr.as_sockaddr_in6()
        {
            let ip = sin6.ip();
            if is_link_local(ip) {
                let if_index =
                    nix::net::if_::if_nametoindex(name.as_str()).map_err(std::io::Error::other)?;
                seen.insert(name, (ip, if_index));
            }
        }
    }

    let mut result: Vec<LinkLocalIf> = seen
        .into_iter()
        .map(|(name, (addr, if_index))| LinkLocalIf {
            name,
            addr,
            if_index,
        })
        .collect();
    result.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(result)
}

#[cfg(not(unix))]
pub fn enumerate_link_local(
    _allowed: &[String],
    _ignored: &[String],
) -> std::io::Result<Vec<LinkLocalIf>> {
    Err(std::io::Error::other(
        "interface enumeration is only supported on unix",
    ))
}

/// Format a scoped link-layer address: `[addr%iface]:port`.
#[must_use]
pub fn format_ll_addr(addr: &Ipv6Addr, ifname: &str, port: u16) -> LlAddr {
    LlAddr::new(format!("[{addr}%{ifname}]:{port}"))
}

/// Parse a scoped link-layer address back into its parts.
///
/// The zone is returned as written: an interface name or a numeric index.
pub fn parse_ll_addr(ll: &LlAddr) -> Result<(Ipv6Addr, Option<String>, u16), LinkError> {
    let s = ll.as_str();
    let inner = s
        .strip_prefix('[')
        .ok_or_else(|| LinkError::BadAddress(format!("missing '[': {s}")))?;
    let (host, port) = inner
        .rsplit_once("]:")
        .ok_or_else(|| LinkError::BadAddress(format!("missing ']:': {s}")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| LinkError::BadAddress(format!("bad port: {s}")))?;

    let (addr_str, zone) = match host.split_once('%') {
        Some((addr, zone)) if !zone.is_empty() => (addr, Some(zone.to_owned())),
        Some((addr, _)) => (addr, None),
        None => (host, None),
    };
    let addr: Ipv6Addr = addr_str
        .parse()
        .map_err(|_| LinkError::BadAddress(format!("bad address: {s}")))?;
    Ok((addr, zone, port))
}
