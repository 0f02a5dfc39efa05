//! Decaying trail of recent face centroid positions.
//!
//! Consumers render the trail with a per-point visual weight that fades
//! with age; the buffer itself is evicted only by capacity, so the two
//! mechanisms stay independent.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::smoothing::EmaFilter;

/// Default maximum number of trail points.
pub const DEFAULT_TRACKING_HISTORY_LEN: usize = 30;

/// Default window over which a point fades to fully transparent.
pub const DEFAULT_TRACKING_DECAY_WINDOW: Duration = Duration::from_millis(2000);

/// A smoothed centroid position observed at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingPoint {
    pub x: f32,
    pub y: f32,
    pub timestamp: Instant,
}

impl TrackingPoint {
    /// Visual weight at `now`: 1.0 when fresh, linearly down to 0.0 at the
    /// end of the decay window, 0.0 beyond it.
    pub fn weight(&self, now: Instant, decay_window: Duration) -> f32 {
        let age = now.saturating_duration_since(self.timestamp);
        if decay_window.is_zero() || age >= decay_window {
            return 0.0;
        }
        1.0 - age.as_secs_f32() / decay_window.as_secs_f32()
    }
}

/// Bounded, time-ordered sequence of smoothed centroid positions.
///
/// Incoming positions pass through an exponential smoothing stage before
/// being recorded, which keeps the rendered trail stable against
/// detection jitter. Never exceeds its capacity; oldest points are
/// evicted first; order is never changed.
#[derive(Debug)]
pub struct TrackingHistory {
    points: VecDeque<TrackingPoint>,
    capacity: usize,
    decay_window: Duration,
    smooth_x: EmaFilter,
    smooth_y: EmaFilter,
}

impl TrackingHistory {
    pub fn new(capacity: usize, decay_window: Duration, position_alpha: f32) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
            decay_window,
            smooth_x: EmaFilter::new(position_alpha),
            smooth_y: EmaFilter::new(position_alpha),
        }
    }

    /// Record a centroid observation, returning the smoothed point that
    /// was appended.
    pub fn record(&mut self, x: f32, y: f32, now: Instant) -> TrackingPoint {
        let point = TrackingPoint {
            x: self.smooth_x.apply(x),
            y: self.smooth_y.apply(y),
            timestamp: now,
        };
        self.points.push_back(point);
        if self.points.len() > self.capacity {
            self.points.pop_front();
        }
        point
    }

    /// Points in recording order, oldest first.
    pub fn points(&self) -> impl Iterator<Item = &TrackingPoint> {
        self.points.iter()
    }

    /// Render policy: each point paired with its visual weight at `now`.
    /// Points past the decay window report weight 0.0 but stay in the
    /// buffer until capacity evicts them.
    pub fn weighted_points(&self, now: Instant) -> Vec<(TrackingPoint, f32)> {
        self.points
            .iter()
            .map(|p| (*p, p.weight(now, self.decay_window)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop the trail and the smoothing state (stream restart).
    pub fn clear(&mut self) {
        self.points.clear();
        self.smooth_x.reset();
        self.smooth_y.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(capacity: usize) -> TrackingHistory {
        // alpha 1.0 = pass-through, so position assertions stay exact
        TrackingHistory::new(capacity, Duration::from_millis(2000), 1.0)
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut h = history(5);
        let base = Instant::now();
        for i in 0..50 {
            h.record(i as f32, 0.0, base + Duration::from_millis(i));
            assert!(h.len() <= 5);
        }
        assert_eq!(h.len(), 5);
    }

    #[test]
    fn test_oldest_evicted_first() {
        let mut h = history(3);
        let base = Instant::now();
        for i in 0..5 {
            h.record(i as f32, 0.0, base + Duration::from_millis(i));
        }
        let xs: Vec<f32> = h.points().map(|p| p.x).collect();
        assert_eq!(xs, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_capacity_plus_one_records_leaves_capacity_most_recent() {
        let capacity = 4;
        let mut h = history(capacity);
        let base = Instant::now();
        h.record(0.0, 0.0, base);
        for i in 1..=(capacity as u64 + 1) {
            h.record(i as f32, 0.0, base + Duration::from_millis(i));
        }
        assert_eq!(h.len(), capacity);
        let xs: Vec<f32> = h.points().map(|p| p.x).collect();
        assert_eq!(xs, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_weight_decays_linearly() {
        let base = Instant::now();
        let point = TrackingPoint {
            x: 0.0,
            y: 0.0,
            timestamp: base,
        };
        let window = Duration::from_millis(2000);

        assert!((point.weight(base, window) - 1.0).abs() < 1e-6);
        let half = point.weight(base + Duration::from_millis(1000), window);
        assert!((half - 0.5).abs() < 1e-3);
        assert_eq!(point.weight(base + Duration::from_millis(2000), window), 0.0);
        assert_eq!(point.weight(base + Duration::from_millis(5000), window), 0.0);
    }

    #[test]
    fn test_expired_points_stay_until_capacity_evicts() {
        let mut h = history(10);
        let base = Instant::now();
        h.record(1.0, 1.0, base);

        // Far past the decay window: weight 0, point still present
        let later = base + Duration::from_secs(60);
        let weighted = h.weighted_points(later);
        assert_eq!(weighted.len(), 1);
        assert_eq!(weighted[0].1, 0.0);
    }

    #[test]
    fn test_positions_are_exponentially_smoothed() {
        let mut h = TrackingHistory::new(10, Duration::from_millis(2000), 0.5);
        let base = Instant::now();
        h.record(0.0, 0.0, base);
        let p = h.record(10.0, 20.0, base + Duration::from_millis(100));
        // 0 + 0.5 * (10 - 0) = 5, 0 + 0.5 * (20 - 0) = 10
        assert!((p.x - 5.0).abs() < 1e-5);
        assert!((p.y - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_clear_resets_smoothing_state() {
        let mut h = TrackingHistory::new(10, Duration::from_millis(2000), 0.5);
        let base = Instant::now();
        h.record(100.0, 100.0, base);
        h.clear();
        assert!(h.is_empty());

        // First observation after clear is taken directly again
        let p = h.record(10.0, 10.0, base + Duration::from_millis(50));
        assert_eq!((p.x, p.y), (10.0, 10.0));
    }
}
