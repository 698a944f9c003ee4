//! Per-aircraft CPR records keyed by ICAO address.
//!
//! Each record sits behind its own lock so the read-compute-write sequence of
//! a global decode sees both slots consistently, while different aircraft can
//! be resolved in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::resolve::{AircraftCpr, Resolver};
use crate::types::*;

/// Aircraft considered stale after this many seconds of silence.
pub const STALE_TIMEOUT: f64 = 60.0;

pub type SharedAircraft = Arc<Mutex<AircraftCpr>>;

fn lock(ac: &SharedAircraft) -> MutexGuard<'_, AircraftCpr> {
    // A panic mid-update leaves at worst a half-written slot pair, which the
    // freshness and zone checks already tolerate.
    ac.lock().unwrap_or_else(|e| e.into_inner())
}

/// Registry of per-aircraft CPR state.
#[derive(Debug)]
pub struct CprRegistry {
    aircraft: RwLock<HashMap<Icao, SharedAircraft>>,
    stale_timeout: f64,
}

impl Default for CprRegistry {
    fn default() -> Self {
        CprRegistry::new(STALE_TIMEOUT)
    }
}

impl CprRegistry {
    pub fn new(stale_timeout: f64) -> Self {
        CprRegistry {
            aircraft: RwLock::new(HashMap::new()),
            stale_timeout,
        }
    }

    /// Record for `icao`, created on first sight.
    pub fn handle(&self, icao: Icao, now: f64) -> SharedAircraft {
        if let Some(ac) = self
            .aircraft
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&icao)
        {
            return Arc::clone(ac);
        }
        let mut map = self.aircraft.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            map.entry(icao)
                .or_insert_with(|| Arc::new(Mutex::new(AircraftCpr::new(now)))),
        )
    }

    /// Run `f` with exclusive access to one aircraft's record.
    pub fn with_aircraft<R>(
        &self,
        icao: Icao,
        now: f64,
        f: impl FnOnce(&mut AircraftCpr) -> R,
    ) -> R {
        let handle = self.handle(icao, now);
        let mut ac = lock(&handle);
        f(&mut ac)
    }

    /// Resolve a report for `icao` under that aircraft's lock.
    pub fn resolve(
        &self,
        resolver: &Resolver<'_>,
        icao: Icao,
        report: RawReport,
        now: f64,
    ) -> Result<Fix> {
        self.with_aircraft(icao, now, |ac| resolver.resolve(ac, report, now))
    }

    pub fn len(&self) -> usize {
        self.aircraft.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, icao: &Icao) -> Option<SharedAircraft> {
        let map = self.aircraft.read().unwrap_or_else(|e| e.into_inner());
        map.get(icao).map(Arc::clone)
    }

    /// Last accepted fix for `icao`, if any.
    pub fn last_fix(&self, icao: &Icao) -> Option<Fix> {
        let map = self.aircraft.read().unwrap_or_else(|e| e.into_inner());
        map.get(icao).and_then(|ac| lock(ac).last_fix)
    }

    /// Aircraft with a fix that are not stale, most recently seen first.
    pub fn get_active(&self, now: f64) -> Vec<(Icao, Fix)> {
        let map = self.aircraft.read().unwrap_or_else(|e| e.into_inner());
        let mut active: Vec<(Icao, f64, Fix)> = map
            .iter()
            .filter_map(|(icao, ac)| {
                let ac = lock(ac);
                let fix = ac.last_fix?;
                (now - ac.last_seen <= self.stale_timeout).then_some((*icao, ac.last_seen, fix))
            })
            .collect();
        active.sort_by(|a, b| b.1.total_cmp(&a.1));
        active.into_iter().map(|(icao, _, fix)| (icao, fix)).collect()
    }

    /// Remove stale aircraft. Returns count removed.
    pub fn prune_stale(&self, now: f64) -> usize {
        let mut map = self.aircraft.write().unwrap_or_else(|e| e.into_inner());
        let before = map.len();
        map.retain(|_, ac| now - lock(ac).last_seen <= self.stale_timeout);
        before - map.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_report;
    use crate::resolve::ResolverConfig;

    fn pair_for(icao: Icao, pos: &Position, registry: &CprRegistry, resolver: &Resolver<'_>, t: f64) -> Result<Fix> {
        let even = encode_report(pos, Parity::Even, FormatKind::Airborne, t);
        let odd = encode_report(pos, Parity::Odd, FormatKind::Airborne, t + 0.5);
        let _ = registry.resolve(resolver, icao, even, t);
        registry.resolve(resolver, icao, odd, t + 0.5)
    }

    #[test]
    fn test_record_created_on_first_report() {
        let registry = CprRegistry::default();
        let resolver = Resolver::new(ResolverConfig::default());
        assert!(registry.is_empty());

        let report = encode_report(
            &Position::new(52.2572, 3.9194),
            Parity::Even,
            FormatKind::Airborne,
            1.0,
        );
        let result = registry.resolve(&resolver, [0x48, 0x40, 0xD6], report, 1.0);
        assert!(matches!(result, Err(CprError::NoComplementaryFrame)));
        assert_eq!(registry.len(), 1);
        assert!(registry.last_fix(&[0x48, 0x40, 0xD6]).is_none());
    }

    #[test]
    fn test_pair_stores_fix() {
        let registry = CprRegistry::default();
        let resolver = Resolver::new(ResolverConfig::default());
        let icao = [0x40, 0x62, 0x1D];
        let pos = Position::new(52.2572, 3.9194);

        let fix = pair_for(icao, &pos, &registry, &resolver, 1.0).unwrap();
        assert_eq!(registry.last_fix(&icao), Some(fix));
    }

    #[test]
    fn test_records_are_independent() {
        let registry = CprRegistry::default();
        let resolver = Resolver::new(ResolverConfig::default());
        let pos = Position::new(52.2572, 3.9194);

        // Even for one aircraft, odd for another: no pair
        let even = encode_report(&pos, Parity::Even, FormatKind::Airborne, 1.0);
        let odd = encode_report(&pos, Parity::Odd, FormatKind::Airborne, 1.5);
        let _ = registry.resolve(&resolver, [1, 1, 1], even, 1.0);
        let result = registry.resolve(&resolver, [2, 2, 2], odd, 1.5);
        assert!(matches!(result, Err(CprError::NoComplementaryFrame)));
        assert_eq!(registry.len(), 2);

        let first = registry.get(&[1, 1, 1]).unwrap();
        let first = first.lock().unwrap();
        assert!(first.cpr.even_slot.is_some());
        assert!(first.cpr.odd_slot.is_none());
        assert!(registry.get(&[3, 3, 3]).is_none());
    }

    #[test]
    fn test_parallel_aircraft() {
        let registry = CprRegistry::default();
        let resolver = Resolver::new(ResolverConfig::default());

        std::thread::scope(|s| {
            for i in 0..8u8 {
                let registry = &registry;
                let resolver = &resolver;
                s.spawn(move || {
                    let pos = Position::new(40.0 + i as f64, -75.0 + i as f64);
                    let fix = pair_for([0xA0, 0, i], &pos, registry, resolver, 1.0).unwrap();
                    assert!(fix.position.approx_eq(&pos, 1e-3));
                });
            }
        });

        assert_eq!(registry.len(), 8);
        assert_eq!(resolver.stats().global_ok, 8);
        assert_eq!(registry.get_active(2.0).len(), 8);
    }

    #[test]
    fn test_get_active_and_prune() {
        let registry = CprRegistry::default();
        let resolver = Resolver::new(ResolverConfig::default());

        pair_for([1, 0, 0], &Position::new(10.0, 10.0), &registry, &resolver, 1.0).unwrap();
        pair_for([2, 0, 0], &Position::new(20.0, 20.0), &registry, &resolver, 30.0).unwrap();

        let active = registry.get_active(31.0);
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].0, [2, 0, 0], "most recent first");

        assert_eq!(registry.get_active(80.0).len(), 1);
        assert_eq!(registry.prune_stale(80.0), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.prune_stale(200.0), 1);
        assert!(registry.is_empty());
    }
}
