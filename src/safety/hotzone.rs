//! Hotzone tracking - polygon zones with entry/exit transitions

use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::geo;
use crate::types::{GeoPoint, Hotzone};

/// Result of one location update against the zone set.
#[derive(Debug, Clone, Default)]
pub struct ZoneTransition {
    pub entered: Vec<Hotzone>,
    pub exited: Vec<String>,
}

/// Tracks which officers are inside which hotzones.
#[derive(Default)]
pub struct HotzoneTracker {
    zones: HashMap<String, Hotzone>,
    /// officer_id -> zone ids currently containing the officer
    occupancy: HashMap<String, HashSet<String>>,
}

impl HotzoneTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_zone(&mut self, zone: Hotzone) {
        info!(zone_id = %zone.zone_id, name = %zone.name, "Hotzone registered");
        self.zones.insert(zone.zone_id.clone(), zone);
    }

    pub fn remove_zone(&mut self, zone_id: &str) -> bool {
        for inside in self.occupancy.values_mut() {
            inside.remove(zone_id);
        }
        self.zones.remove(zone_id).is_some()
    }

    pub fn zone(&self, zone_id: &str) -> Option<&Hotzone> {
        self.zones.get(zone_id)
    }

    pub fn zones(&self) -> impl Iterator<Item = &Hotzone> {
        self.zones.values()
    }

    /// Point-in-polygon on each zone; returns entries and exits since the
    /// officer's previous update. Entry creates a hotzone warning upstream;
    /// exit clears that zone's warnings for the officer.
    pub fn update_location(&mut self, officer_id: &str, location: GeoPoint) -> ZoneTransition {
        let now_inside: HashSet<String> = self
            .zones
            .values()
            .filter(|z| geo::point_in_polygon(location, &z.polygon))
            .map(|z| z.zone_id.clone())
            .collect();

        let previous = self
            .occupancy
            .entry(officer_id.to_string())
            .or_default()
            .clone();

        let entered: Vec<Hotzone> = now_inside
            .difference(&previous)
            .filter_map(|id| self.zones.get(id).cloned())
            .collect();
        let exited: Vec<String> = previous.difference(&now_inside).cloned().collect();

        if !entered.is_empty() || !exited.is_empty() {
            debug!(
                officer_id,
                entered = entered.len(),
                exited = exited.len(),
                "Hotzone transition"
            );
        }

        self.occupancy
            .insert(officer_id.to_string(), now_inside);

        ZoneTransition { entered, exited }
    }

    pub fn zones_for_officer(&self, officer_id: &str) -> Vec<&Hotzone> {
        self.occupancy
            .get(officer_id)
            .map(|ids| ids.iter().filter_map(|id| self.zones.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn is_in_any_zone(&self, officer_id: &str) -> bool {
        self.occupancy
            .get(officer_id)
            .is_some_and(|ids| !ids.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ThreatLevel;

    fn square_zone(id: &str) -> Hotzone {
        Hotzone {
            zone_id: id.to_string(),
            name: format!("Zone {id}"),
            zone_type: "high_crime".into(),
            threat_level: ThreatLevel::Elevated,
            risk_score: 0.7,
            polygon: vec![
                GeoPoint::new(26.70, -80.06),
                GeoPoint::new(26.70, -80.04),
                GeoPoint::new(26.72, -80.04),
                GeoPoint::new(26.72, -80.06),
            ],
            recent_incidents: 4,
            recent_gunfire: 1,
            hazards: vec![],
            recommendations: vec![],
        }
    }

    #[test]
    fn entry_and_exit_transitions() {
        let mut tracker = HotzoneTracker::new();
        tracker.upsert_zone(square_zone("z1"));

        let t = tracker.update_location("o1", GeoPoint::new(26.71, -80.05));
        assert_eq!(t.entered.len(), 1);
        assert!(t.exited.is_empty());
        assert!(tracker.is_in_any_zone("o1"));

        // Same zone, no new transition.
        let t = tracker.update_location("o1", GeoPoint::new(26.711, -80.051));
        assert!(t.entered.is_empty() && t.exited.is_empty());

        let t = tracker.update_location("o1", GeoPoint::new(26.80, -80.05));
        assert!(t.entered.is_empty());
        assert_eq!(t.exited, vec!["z1".to_string()]);
        assert!(!tracker.is_in_any_zone("o1"));
    }

    #[test]
    fn removing_zone_clears_occupancy() {
        let mut tracker = HotzoneTracker::new();
        tracker.upsert_zone(square_zone("z1"));
        tracker.update_location("o1", GeoPoint::new(26.71, -80.05));
        assert!(tracker.remove_zone("z1"));
        assert!(!tracker.is_in_any_zone("o1"));
    }
}
