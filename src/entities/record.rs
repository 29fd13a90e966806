use crate::world::host::{EntityId, EntitySnapshot, Vitals};
use crate::world::position::Location;
use std::time::{Duration, Instant};

/// Flight flags captured before going away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlightState {
    pub allow_flight: bool,
    pub flying: bool,
}

/// Per-entity AFK state. One record per identity; the store hands out a
/// shared handle and every mutation goes through it.
#[derive(Debug, Clone, PartialEq)]
pub struct AfkRecord {
    pub id: EntityId,
    last_activity: Instant,
    away_since: Option<Instant>,
    return_location: Option<Location>,
    pub saved_flight: FlightState,
    /// `None` for records rebuilt from a crash-recovery snapshot.
    pub saved_vitals: Option<Vitals>,
    pub saved_fall_distance: f32,
    pub was_in_vehicle: bool,
    /// Origin chunk kept loaded while away, released on return.
    pub held_chunk: Option<(String, (i32, i32))>,
    last_warning: Option<u64>,
}

impl AfkRecord {
    pub fn new(id: EntityId, now: Instant) -> Self {
        Self {
            id,
            last_activity: now,
            away_since: None,
            return_location: None,
            saved_flight: FlightState::default(),
            saved_vitals: None,
            saved_fall_distance: 0.0,
            was_in_vehicle: false,
            held_chunk: None,
            last_warning: None,
        }
    }

    /// Rebuilds an away record from persisted data after a restart.
    pub fn recovered(id: EntityId, location: Location, flight: FlightState, now: Instant) -> Self {
        let mut record = Self::new(id, now);
        record.away_since = Some(now);
        record.return_location = Some(location);
        record.saved_flight = flight;
        record
    }

    pub fn is_away(&self) -> bool {
        self.away_since.is_some()
    }

    pub fn away_since(&self) -> Option<Instant> {
        self.away_since
    }

    pub fn away_duration(&self, now: Instant) -> Duration {
        self.away_since
            .map_or(Duration::ZERO, |since| now.saturating_duration_since(since))
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn inactive_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Never moves the clock backwards.
    pub fn touch(&mut self, now: Instant) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// Flips the state flag. Returns false when already in `away`.
    pub fn set_away(&mut self, away: bool, now: Instant) -> bool {
        if self.is_away() == away {
            return false;
        }
        if away {
            self.away_since = Some(now);
        } else {
            self.away_since = None;
            self.last_warning = None;
        }
        true
    }

    pub fn return_location(&self) -> Option<&Location> {
        self.return_location.as_ref()
    }

    pub fn take_return_location(&mut self) -> Option<Location> {
        self.return_location.take()
    }

    pub fn capture(&mut self, snapshot: &EntitySnapshot) {
        self.return_location = Some(snapshot.location.clone());
        self.saved_flight = FlightState {
            allow_flight: snapshot.allow_flight,
            flying: snapshot.flying,
        };
        self.saved_vitals = Some(snapshot.vitals);
        self.saved_fall_distance = snapshot.fall_distance;
        self.was_in_vehicle = snapshot.in_vehicle;
    }

    pub fn last_warning(&self) -> Option<u64> {
        self.last_warning
    }

    /// Records `threshold` as warned. False if it already was this episode.
    pub fn mark_warned(&mut self, threshold: u64) -> bool {
        if self.last_warning == Some(threshold) {
            return false;
        }
        self.last_warning = Some(threshold);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> EntitySnapshot {
        EntitySnapshot {
            location: Location::new("world", 10.5, 70.0, -3.5).with_rotation(90.0, 5.0),
            flying: true,
            allow_flight: true,
            vitals: Vitals {
                health: 13.0,
                food: 7,
                saturation: 1.5,
            },
            max_health: 20.0,
            fall_distance: 4.0,
            in_vehicle: true,
        }
    }

    #[test]
    fn set_away_is_idempotent_and_keeps_invariant() {
        let now = Instant::now();
        let mut record = AfkRecord::new(EntityId::nil(), now);
        assert!(!record.set_away(false, now));
        assert!(record.set_away(true, now));
        assert!(record.is_away());
        assert_eq!(record.away_since(), Some(now));
        assert!(!record.set_away(true, now + Duration::from_secs(5)));
        assert_eq!(record.away_since(), Some(now));
        assert!(record.set_away(false, now));
        assert_eq!(record.away_since(), None);
    }

    #[test]
    fn touch_only_moves_forward() {
        let start = Instant::now();
        let later = start + Duration::from_secs(10);
        let mut record = AfkRecord::new(EntityId::nil(), later);
        record.touch(start);
        assert_eq!(record.last_activity(), later);
        record.touch(later + Duration::from_secs(1));
        assert_eq!(record.inactive_for(later + Duration::from_secs(3)), Duration::from_secs(2));
    }

    #[test]
    fn warnings_reset_on_return() {
        let now = Instant::now();
        let mut record = AfkRecord::new(EntityId::nil(), now);
        record.set_away(true, now);
        assert!(record.mark_warned(60));
        assert!(!record.mark_warned(60));
        assert!(record.mark_warned(30));
        record.set_away(false, now);
        assert_eq!(record.last_warning(), None);
        assert!(record.mark_warned(30));
    }

    #[test]
    fn capture_copies_snapshot_fields() {
        let now = Instant::now();
        let mut record = AfkRecord::new(EntityId::nil(), now);
        let snapshot = snapshot();
        record.capture(&snapshot);
        assert_eq!(record.return_location(), Some(&snapshot.location));
        assert_eq!(
            record.saved_flight,
            FlightState {
                allow_flight: true,
                flying: true
            }
        );
        assert_eq!(record.saved_vitals, Some(snapshot.vitals));
        assert_eq!(record.saved_fall_distance, 4.0);
        assert!(record.was_in_vehicle);
        assert_eq!(record.take_return_location(), Some(snapshot.location));
        assert_eq!(record.return_location(), None);
    }

    #[test]
    fn recovered_record_is_away_without_vitals() {
        let now = Instant::now();
        let location = Location::new("world", 1.0, 2.0, 3.0);
        let record = AfkRecord::recovered(
            EntityId::nil(),
            location.clone(),
            FlightState {
                allow_flight: true,
                flying: false,
            },
            now,
        );
        assert!(record.is_away());
        assert_eq!(record.return_location(), Some(&location));
        assert_eq!(record.saved_vitals, None);
        assert_eq!(record.away_duration(now + Duration::from_secs(9)), Duration::from_secs(9));
    }
}
