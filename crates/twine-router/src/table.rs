//! The route table and its arbitration rules.

use std::collections::HashMap;
use std::time::Instant;

use twine_core::NlAddr;

use crate::route::Route;

/// What [`RouteTable::install`] did with a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// No route to the destination existed; the candidate was inserted.
    Installed,
    /// The candidate's distance beat the incumbent; it took over.
    Replaced,
    /// The candidate equalled the incumbent; the incumbent's birth was reset.
    Refreshed,
    /// The candidate lost the arbitration and was discarded.
    Dropped,
}

/// Destination-keyed route store. At most one route per destination.
#[must_use]
pub struct RouteTable {
    routes: HashMap<NlAddr, Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, destination: &NlAddr) -> Option<&Route> {
        self.routes.get(destination)
    }

    #[must_use]
    pub fn contains(&self, destination: &NlAddr) -> bool {
        self.routes.contains_key(destination)
    }

    /// Insert a route unconditionally. Used for the self-route.
    pub fn insert(&mut self, route: Route) {
        self.routes.insert(route.destination().clone(), route);
    }

    /// Arbitrate a candidate against the incumbent for its destination.
    ///
    /// A missing incumbent admits the candidate; a strictly smaller distance
    /// replaces; an equal route refreshes the incumbent's birth at `now`;
    /// everything else is dropped.
    pub fn install(&mut self, candidate: Route, now: Instant) -> InstallOutcome {
        match self.routes.get_mut(candidate.destination()) {
            None => {
                self.routes.insert(candidate.destination().clone(), candidate);
                InstallOutcome::Installed
            }
            Some(incumbent) => {
                if candidate.distance() < incumbent.distance() {
                    *incumbent = candidate;
                    InstallOutcome::Replaced
                } else if candidate == *incumbent {
                    incumbent.refresh(now);
                    InstallOutcome::Refreshed
                } else {
                    InstallOutcome::Dropped
                }
            }
        }
    }

    /// Drop expired routes. Self-routes are exempt.
    ///
    /// Returns the number of routes removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.routes.len();
        self.routes
            .retain(|_, route| route.is_self_route() || !route.has_expired(now));
        before - self.routes.len()
    }

    /// Snapshot copy of every route.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Route> {
        self.routes.values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use twine_link::PipeLink;

    fn addr(seed: &str) -> NlAddr {
        NlAddr::new(seed)
    }

    #[test]
    fn install_into_empty_table() {
        let (link, _peer) = PipeLink::pair("a", "b");
        let mut table = RouteTable::new();
        let outcome = table.install(
            Route::new(addr("d"), addr("g"), link, 64),
            Instant::now(),
        );
        assert_eq!(outcome, InstallOutcome::Installed);
        assert_eq!(table.len(), 1);
        assert!(table.contains(&addr("d")));
    }

    #[test]
    fn smaller_distance_replaces() {
        let (link, _peer) = PipeLink::pair("a", "b");
        let mut table = RouteTable::new();
        let now = Instant::now();
        table.install(Route::new(addr("d"), addr("g1"), link.clone(), 128), now);

        let outcome = table.install(Route::new(addr("d"), addr("g2"), link, 64), now);
        assert_eq!(outcome, InstallOutcome::Replaced);

        let route = table.get(&addr("d")).unwrap();
        assert_eq!(route.distance(), 64);
        assert_eq!(route.gateway(), &addr("g2"));
        // Still exactly one route for the destination.
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn equal_route_refreshes_birth() {
        let (link, _peer) = PipeLink::pair("a", "b");
        let mut table = RouteTable::new();
        let now = Instant::now();
        table.install(Route::new(addr("d"), addr("g"), link.clone(), 64), now);
        let original_birth = table.get(&addr("d")).unwrap().birth();

        let later = now + Duration::from_secs(30);
        let outcome = table.install(Route::new(addr("d"), addr("g"), link, 64), later);
        assert_eq!(outcome, InstallOutcome::Refreshed);

        let refreshed = table.get(&addr("d")).unwrap();
        assert_eq!(refreshed.birth(), later);
        assert!(refreshed.birth() > original_birth);
        assert_eq!(refreshed.distance(), 64);
    }

    #[test]
    fn worse_or_different_candidate_dropped() {
        let (link, _peer) = PipeLink::pair("a", "b");
        let (other_link, _peer2) = PipeLink::pair("c", "d");
        let mut table = RouteTable::new();
        let now = Instant::now();
        table.install(Route::new(addr("d"), addr("g"), link.clone(), 64), now);

        // Strictly worse distance.
        let outcome = table.install(Route::new(addr("d"), addr("g"), link.clone(), 128), now);
        assert_eq!(outcome, InstallOutcome::Dropped);

        // Same distance, different gateway: not equal, not better.
        let outcome = table.install(Route::new(addr("d"), addr("g2"), link, 64), now);
        assert_eq!(outcome, InstallOutcome::Dropped);

        // Same distance and gateway, different link.
        let outcome = table.install(Route::new(addr("d"), addr("g"), other_link, 64), now);
        assert_eq!(outcome, InstallOutcome::Dropped);

        assert_eq!(table.get(&addr("d")).unwrap().gateway(), &addr("g"));
    }

    #[test]
    fn distance_is_non_increasing_until_expiry() {
        let (link, _peer) = PipeLink::pair("a", "b");
        let mut table = RouteTable::new();
        let now = Instant::now();
        let mut last = u8::MAX;
        for candidate in [200u8, 150, 150, 180, 90, 90] {
            table.install(
                Route::new(addr("d"), addr("g"), link.clone(), candidate),
                now,
            );
            let installed = table.get(&addr("d")).unwrap().distance();
            assert!(installed <= last);
            last = installed;
        }
        assert_eq!(last, 90);
    }

    #[test]
    fn sweep_removes_expired_routes() {
        let (link, _peer) = PipeLink::pair("a", "b");
        let mut table = RouteTable::new();
        let now = Instant::now();
        table.insert(
            Route::new(addr("fresh"), addr("g"), link.clone(), 64)
                .with_lifetime(Duration::from_secs(60)),
        );
        table.insert(
            Route::new(addr("stale"), addr("g"), link, 64)
                .with_lifetime(Duration::from_millis(0)),
        );

        let removed = table.sweep(now + Duration::from_secs(1));
        assert_eq!(removed, 1);
        assert!(table.contains(&addr("fresh")));
        assert!(!table.contains(&addr("stale")));
    }

    #[test]
    fn sweep_exempts_the_self_route() {
        let mut table = RouteTable::new();
        table.insert(Route::self_route(addr("own")).with_lifetime(Duration::from_millis(0)));

        let removed = table.sweep(Instant::now() + Duration::from_secs(3600));
        assert_eq!(removed, 0);
        assert!(table.contains(&addr("own")));
    }

    #[test]
    fn sweep_boundary_is_strict() {
        let (link, _peer) = PipeLink::pair("a", "b");
        let mut table = RouteTable::new();
        let route =
            Route::new(addr("d"), addr("g"), link, 64).with_lifetime(Duration::from_secs(10));
        let birth = route.birth();
        table.insert(route);

        // Aged exactly lifetime: kept.
        assert_eq!(table.sweep(birth + Duration::from_secs(10)), 0);
        // One past: removed.
        assert_eq!(
            table.sweep(birth + Duration::from_secs(10) + Duration::from_millis(1)),
            1
        );
    }

    #[test]
    fn snapshot_is_detached() {
        let (link, _peer) = PipeLink::pair("a", "b");
        let mut table = RouteTable::new();
        table.insert(Route::new(addr("d"), addr("g"), link, 64));

        let snapshot = table.snapshot();
        table.sweep(Instant::now() + Duration::from_secs(3600));
        assert_eq!(snapshot.len(), 1);
        assert!(table.is_empty());
    }
}
