//! Protocol constants and default timings.

use std::time::Duration;

/// Added to an advertised distance on receipt, before route installation.
pub const HOP_PENALTY: u8 = 64;

/// How long a learned route stays valid without a refreshing advertisement.
pub const ROUTE_LIFETIME: Duration = Duration::from_secs(60);

/// Interval between advertisement cycles.
pub const ADV_INTERVAL: Duration = Duration::from_secs(5);

/// How long an ARP resolution waits for a reply before giving up.
pub const ARP_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between ARP cache sweeps. Cached entries (including negative
/// ones) live at most this long.
pub const ARP_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Duty-cycle wakeup while waiting for an ARP reply.
pub const ARP_WAIT_TICK: Duration = Duration::from_millis(500);

/// Initial TTL carried by data packets.
pub const DATA_TTL: u8 = 255;
