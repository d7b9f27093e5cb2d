//! Per-origin monotonic merge of timer-state snapshots.
//!
//! There is one logical timer per device, not one global timer: each
//! origin's snapshots form an independent stream, and within a stream
//! only strictly newer snapshots win. Arrival order does not matter;
//! an older snapshot arriving late is a no-op. Pure state, no I/O.

use std::collections::HashMap;

use sync_types::{DeviceId, TimerStateMessage};

/// What applying a snapshot did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The snapshot was newer than anything seen from its origin.
    Applied,
    /// A snapshot at least this new was already applied; dropped.
    Stale,
}

/// The canonical in-process view of every known device's timer.
#[derive(Debug, Default)]
pub struct MergeState {
    latest: HashMap<DeviceId, TimerStateMessage>,
}

impl MergeState {
    /// Create an empty merge state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a snapshot if it is strictly newer than the last one
    /// applied from the same origin.
    ///
    /// Equal timestamps are stale: a duplicate delivered over a
    /// second transport must not look like a change.
    pub fn apply_timer_state(&mut self, state: &TimerStateMessage) -> MergeOutcome {
        match self.latest.get(&state.origin) {
            Some(current) if state.emitted_at <= current.emitted_at => MergeOutcome::Stale,
            _ => {
                self.latest.insert(state.origin, state.clone());
                MergeOutcome::Applied
            }
        }
    }

    /// The latest applied snapshot from one origin.
    pub fn timer_for(&self, origin: DeviceId) -> Option<&TimerStateMessage> {
        self.latest.get(&origin)
    }

    /// Every origin a snapshot has been applied from.
    pub fn origins(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.latest.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::{DeviceClass, Phase};

    fn snapshot(origin: DeviceId, elapsed: u64, emitted_at: f64) -> TimerStateMessage {
        TimerStateMessage {
            origin,
            origin_class: DeviceClass::Desktop,
            phase: Phase::Work,
            mode_id: "classic-25".into(),
            elapsed_seconds: elapsed,
            remaining_seconds: None,
            total_seconds: None,
            is_running: true,
            emitted_at,
        }
    }

    #[test]
    fn newer_snapshot_wins() {
        let mut merge = MergeState::new();
        let origin = DeviceId::random();

        assert_eq!(
            merge.apply_timer_state(&snapshot(origin, 10, 100.0)),
            MergeOutcome::Applied
        );
        assert_eq!(
            merge.apply_timer_state(&snapshot(origin, 20, 200.0)),
            MergeOutcome::Applied
        );
        assert_eq!(merge.timer_for(origin).unwrap().elapsed_seconds, 20);
    }

    #[test]
    fn out_of_order_arrival_converges_to_the_newest() {
        let mut merge = MergeState::new();
        let origin = DeviceId::random();

        // Arrival order 300, 100, 200: only 300 sticks.
        assert_eq!(
            merge.apply_timer_state(&snapshot(origin, 30, 300.0)),
            MergeOutcome::Applied
        );
        assert_eq!(
            merge.apply_timer_state(&snapshot(origin, 10, 100.0)),
            MergeOutcome::Stale
        );
        assert_eq!(
            merge.apply_timer_state(&snapshot(origin, 20, 200.0)),
            MergeOutcome::Stale
        );
        assert_eq!(merge.timer_for(origin).unwrap().elapsed_seconds, 30);
    }

    #[test]
    fn duplicate_timestamp_is_stale() {
        let mut merge = MergeState::new();
        let origin = DeviceId::random();

        assert_eq!(
            merge.apply_timer_state(&snapshot(origin, 10, 100.0)),
            MergeOutcome::Applied
        );
        // Same snapshot via a second transport.
        assert_eq!(
            merge.apply_timer_state(&snapshot(origin, 10, 100.0)),
            MergeOutcome::Stale
        );
    }

    #[test]
    fn origins_are_independent() {
        let mut merge = MergeState::new();
        let a = DeviceId::random();
        let b = DeviceId::random();

        merge.apply_timer_state(&snapshot(a, 1, 500.0));
        // B's snapshot is older than A's; still applied, streams are
        // per-origin.
        assert_eq!(
            merge.apply_timer_state(&snapshot(b, 2, 50.0)),
            MergeOutcome::Applied
        );

        assert_eq!(merge.timer_for(a).unwrap().elapsed_seconds, 1);
        assert_eq!(merge.timer_for(b).unwrap().elapsed_seconds, 2);
        assert_eq!(merge.origins().count(), 2);
    }

    #[test]
    fn unknown_origin_has_no_timer() {
        let merge = MergeState::new();
        assert!(merge.timer_for(DeviceId::random()).is_none());
    }
}
