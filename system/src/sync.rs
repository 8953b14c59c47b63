use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Last known authoritative playback state of a session. Replaced wholesale
/// on every accepted report, never merged field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    pub current_time: f64,
    pub is_playing: bool,
    pub observed_at: Timestamp,
}

impl SyncSnapshot {
    pub fn initial(now: Timestamp) -> Self {
        Self {
            current_time: 0.0,
            is_playing: false,
            observed_at: now,
        }
    }

    /// Overwrite with a participant's report. `observed_at` is clamped so it
    /// never goes backwards even if the wall clock does.
    pub fn observe(&mut self, current_time: f64, is_playing: bool, now: Timestamp) {
        self.current_time = current_time;
        self.is_playing = is_playing;
        self.observed_at = now.max(self.observed_at);
    }

    /// The synchronized-start instruction broadcast when a countdown ends:
    /// everyone seeks to zero and plays.
    pub fn reset_for_start(&mut self, now: Timestamp) {
        self.current_time = 0.0;
        self.is_playing = true;
        self.observed_at = now.max(self.observed_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_overwrites_wholesale() {
        let mut snapshot = SyncSnapshot::initial(100);
        snapshot.observe(120.5, true, 200);
        assert_eq!(snapshot.current_time, 120.5);
        assert!(snapshot.is_playing);
        assert_eq!(snapshot.observed_at, 200);
    }

    #[test]
    fn it_keeps_observed_at_monotonic_under_backwards_clock() {
        let mut snapshot = SyncSnapshot::initial(500);
        snapshot.observe(10.0, true, 450);
        assert_eq!(snapshot.observed_at, 500);
        snapshot.observe(11.0, true, 600);
        assert_eq!(snapshot.observed_at, 600);
    }

    #[test]
    fn it_resets_to_playing_from_zero() {
        let mut snapshot = SyncSnapshot::initial(0);
        snapshot.observe(300.0, false, 1000);
        snapshot.reset_for_start(2000);
        assert_eq!(snapshot.current_time, 0.0);
        assert!(snapshot.is_playing);
        assert_eq!(snapshot.observed_at, 2000);
    }
}
