//! The route record.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use twine_core::NlAddr;
use twine_core::constants::ROUTE_LIFETIME;
use twine_link::{Link, LinkId};

/// One entry in the route table: how to reach a destination.
///
/// A route with no link is the node's route to itself; it never expires.
/// For direct routes the gateway equals the destination.
#[derive(Clone)]
#[must_use]
pub struct Route {
    destination: NlAddr,
    gateway: NlAddr,
    distance: u8,
    link: Option<Arc<dyn Link>>,
    birth: Instant,
    lifetime: Duration,
}

impl Route {
    /// A learned route over `link` with the given next hop and distance.
    pub fn new(destination: NlAddr, gateway: NlAddr, link: Arc<dyn Link>, distance: u8) -> Self {
        Self {
            destination,
            gateway,
            distance,
            link: Some(link),
            birth: Instant::now(),
            lifetime: ROUTE_LIFETIME,
        }
    }

    /// The distance-0 route a node installs to itself at construction.
    pub fn self_route(own: NlAddr) -> Self {
        Self {
            destination: own.clone(),
            gateway: own,
            distance: 0,
            link: None,
            birth: Instant::now(),
            lifetime: ROUTE_LIFETIME,
        }
    }

    /// Override the lifetime. Used by tests to exercise expiry.
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn destination(&self) -> &NlAddr {
        &self.destination
    }

    pub fn gateway(&self) -> &NlAddr {
        &self.gateway
    }

    #[must_use]
    pub fn distance(&self) -> u8 {
        self.distance
    }

    pub fn link(&self) -> Option<&Arc<dyn Link>> {
        self.link.as_ref()
    }

    #[must_use]
    pub fn link_id(&self) -> Option<LinkId> {
        self.link.as_ref().map(|l| l.id())
    }

    #[must_use]
    pub fn birth(&self) -> Instant {
        self.birth
    }

    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// A direct route: the destination is its own next hop.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.gateway == self.destination
    }

    /// The node's route to itself.
    #[must_use]
    pub fn is_self_route(&self) -> bool {
        self.link.is_none()
    }

    /// Whether the route has outlived its lifetime at `now`. Strict:
    /// a route aged exactly `lifetime` is still valid.
    #[must_use]
    pub fn has_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.birth) > self.lifetime
    }

    /// Reset the birth time, extending the route's life.
    pub fn refresh(&mut self, now: Instant) {
        self.birth = now;
    }
}

/// Two routes are equal when destination, gateway, distance and link
/// identity all match. Birth time is deliberately excluded so a refreshed
/// route still equals the advertisement that refreshed it.
impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.destination == other.destination
            && self.gateway == other.gateway
            && self.distance == other.distance
            && self.link_id() == other.link_id()
    }
}

impl Eq for Route {}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("destination", &self.destination)
            .field("gateway", &self.gateway)
            .field("distance", &self.distance)
            .field(
                "link",
                &self.link.as_ref().map_or("none", |l| l.name()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twine_link::PipeLink;

    fn addr(seed: &str) -> NlAddr {
        NlAddr::new(seed)
    }

    #[test]
    fn self_route_shape() {
        let route = Route::self_route(addr("own"));
        assert!(route.is_self_route());
        assert!(route.is_direct());
        assert_eq!(route.distance(), 0);
        assert_eq!(route.gateway(), route.destination());
        assert!(route.link().is_none());
    }

    #[test]
    fn direct_iff_gateway_equals_destination() {
        let (link, _peer) = PipeLink::pair("a", "b");
        let direct = Route::new(addr("d"), addr("d"), link.clone(), 64);
        assert!(direct.is_direct());
        assert!(!direct.is_self_route());

        let via = Route::new(addr("d"), addr("g"), link, 128);
        assert!(!via.is_direct());
    }

    #[test]
    fn expiry_is_strict() {
        let (link, _peer) = PipeLink::pair("a", "b");
        let route = Route::new(addr("d"), addr("d"), link, 64)
            .with_lifetime(Duration::from_secs(10));

        let exactly = route.birth() + Duration::from_secs(10);
        assert!(!route.has_expired(exactly));
        assert!(route.has_expired(exactly + Duration::from_millis(1)));
        // A clock reading before birth never expires anything.
        assert!(!route.has_expired(route.birth()));
    }

    #[test]
    fn refresh_resets_birth() {
        let (link, _peer) = PipeLink::pair("a", "b");
        let mut route = Route::new(addr("d"), addr("d"), link, 64)
            .with_lifetime(Duration::from_secs(10));

        let later = route.birth() + Duration::from_secs(9);
        route.refresh(later);
        assert_eq!(route.birth(), later);
        assert!(!route.has_expired(later + Duration::from_secs(10)));
    }

    #[test]
    fn equality_ignores_birth() {
        let (link, _peer) = PipeLink::pair("a", "b");
        let a = Route::new(addr("d"), addr("g"), link.clone(), 64);
        let mut b = Route::new(addr("d"), addr("g"), link.clone(), 64);
        b.refresh(Instant::now() + Duration::from_secs(5));
        assert_eq!(a, b);

        let different_distance = Route::new(addr("d"), addr("g"), link.clone(), 65);
        assert_ne!(a, different_distance);

        let (other_link, _peer2) = PipeLink::pair("c", "d");
        let different_link = Route::new(addr("d"), addr("g"), other_link, 64);
        assert_ne!(a, different_link);
    }

    #[test]
    fn self_routes_compare_equal_on_link() {
        let a = Route::self_route(addr("own"));
        let b = Route::self_route(addr("own"));
        assert_eq!(a, b);
    }
}
