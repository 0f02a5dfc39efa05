//! Temporal smoothing of raw detections.
//!
//! A fixed-capacity FIFO of recent detections feeds a windowed average
//! that suppresses frame-to-frame jitter in box geometry and expression
//! scores without unbounded lag. An independent single-pole exponential
//! stage is available for tracked scalars (centroid position).

use std::collections::VecDeque;

use crate::types::{BoundingBox, Expressions, FaceDetection};

/// Default number of recent detections averaged together.
pub const DEFAULT_SMOOTHING_WINDOW: usize = 4;

/// Fixed-capacity ring of the most recent raw detections, oldest evicted
/// first. Owned exclusively by [`SmoothingEngine`]; never exceeds its
/// capacity after any number of pushes.
#[derive(Debug)]
pub struct DetectionBuffer {
    entries: VecDeque<FaceDetection>,
    capacity: usize,
}

impl DetectionBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, detection: FaceDetection) {
        self.entries.push_back(detection);
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FaceDetection> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Windowed-average smoother for detection geometry and expression scores.
///
/// Deterministic: the same input sequence always produces the same output
/// sequence.
#[derive(Debug)]
pub struct SmoothingEngine {
    buffer: DetectionBuffer,
}

impl SmoothingEngine {
    pub fn new(window: usize) -> Self {
        Self {
            buffer: DetectionBuffer::new(window),
        }
    }

    /// Fold a raw detection into the buffer and return its smoothed
    /// counterpart.
    ///
    /// With fewer than two buffered entries the raw detection is returned
    /// unchanged: there is nothing meaningful to average against, and
    /// smoothing toward a single noisy sample would only add lag.
    /// Otherwise box fields and age are arithmetic means over the buffer,
    /// and each expression category present in `raw` is the mean of that
    /// category across the buffered entries that contain it (an entry
    /// missing the category is excluded from its average, not counted as
    /// zero). Categorical fields (gender) and landmarks pass through from
    /// the latest entry.
    pub fn push(&mut self, raw: FaceDetection) -> FaceDetection {
        self.buffer.push(raw.clone());
        if self.buffer.len() < 2 {
            return raw;
        }

        let count = self.buffer.len() as f32;
        let sum = |field: fn(&FaceDetection) -> f32| -> f32 { self.buffer.iter().map(field).sum() };

        let mut smoothed = raw.clone();
        smoothed.bounding_box = BoundingBox {
            x: sum(|d| d.bounding_box.x) / count,
            y: sum(|d| d.bounding_box.y) / count,
            width: sum(|d| d.bounding_box.width) / count,
            height: sum(|d| d.bounding_box.height) / count,
        };

        if raw.age.is_some() {
            smoothed.age = self.mean(|d| d.age);
        }

        let mut expressions = Expressions::new();
        for (label, _) in raw.expressions.iter() {
            if let Some(mean) = self.mean(|d| d.expressions.get(label)) {
                expressions.insert(label, mean);
            }
        }
        smoothed.expressions = expressions;

        smoothed
    }

    /// Mean of a field across buffered entries where it is present.
    fn mean(&self, field: impl Fn(&FaceDetection) -> Option<f32>) -> Option<f32> {
        let mut sum = 0.0f32;
        let mut n = 0usize;
        for detection in self.buffer.iter() {
            if let Some(value) = field(detection) {
                sum += value;
                n += 1;
            }
        }
        (n > 0).then(|| sum / n as f32)
    }

    pub fn window(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered history (detection stream restart).
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Single-pole exponential smoother: `next = prev + alpha * (new - prev)`.
///
/// The first observed value is taken directly, so output is never NaN.
/// `alpha` in (0, 1]: lower values smooth harder, 1.0 passes through.
#[derive(Debug, Clone)]
pub struct EmaFilter {
    alpha: f32,
    state: Option<f32>,
}

impl EmaFilter {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, state: None }
    }

    /// Fold in a new observation and return the smoothed value.
    pub fn apply(&mut self, value: f32) -> f32 {
        let next = match self.state {
            None => value,
            Some(prev) => prev + self.alpha * (value - prev),
        };
        self.state = Some(next);
        next
    }

    /// Current smoothed value, if any observation has been made.
    pub fn value(&self) -> Option<f32> {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Expressions};

    fn detection(x: f32, pairs: &[(&str, f32)]) -> FaceDetection {
        FaceDetection {
            bounding_box: BoundingBox {
                x,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            },
            expressions: Expressions::from_pairs(pairs),
            landmarks: None,
            age: None,
            gender: None,
            gender_probability: None,
        }
    }

    #[test]
    fn test_buffer_never_exceeds_capacity() {
        let mut buffer = DetectionBuffer::new(4);
        for i in 0..100 {
            buffer.push(detection(i as f32, &[]));
            assert!(buffer.len() <= 4);
        }
        assert_eq!(buffer.len(), 4);
        // Oldest evicted first: entries 96..=99 remain
        let xs: Vec<f32> = buffer.iter().map(|d| d.bounding_box.x).collect();
        assert_eq!(xs, vec![96.0, 97.0, 98.0, 99.0]);
    }

    #[test]
    fn test_first_push_is_identity() {
        let mut engine = SmoothingEngine::new(4);
        let raw = detection(42.0, &[("happy", 0.9)]);
        let out = engine.push(raw.clone());
        assert_eq!(out, raw);
    }

    #[test]
    fn test_constant_stream_is_noop() {
        let mut engine = SmoothingEngine::new(4);
        let raw = detection(10.0, &[("happy", 0.6), ("sad", 0.4)]);
        let mut last = None;
        for _ in 0..8 {
            last = Some(engine.push(raw.clone()));
        }
        let out = last.unwrap();
        assert!((out.bounding_box.x - 10.0).abs() < 1e-5);
        assert!((out.expressions.get("happy").unwrap() - 0.6).abs() < 1e-5);
        assert!((out.expressions.get("sad").unwrap() - 0.4).abs() < 1e-5);
    }

    #[test]
    fn test_window_two_averages_box_and_expressions() {
        // End to end: two detections through a window of 2, then selection
        let mut engine = SmoothingEngine::new(2);
        engine.push(detection(0.0, &[("happy", 0.9), ("sad", 0.1)]));
        let out = engine.push(detection(10.0, &[("happy", 0.7), ("sad", 0.3)]));

        assert!((out.bounding_box.x - 5.0).abs() < 1e-5);
        assert!((out.expressions.get("happy").unwrap() - 0.8).abs() < 1e-5);
        assert!((out.expressions.get("sad").unwrap() - 0.2).abs() < 1e-5);

        let dominant = crate::emotion::EmotionSelector::select(&out.expressions).unwrap();
        assert_eq!(dominant.label, "happy");
        assert!((dominant.confidence - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_category_missing_from_older_entry_excluded_from_average() {
        let mut engine = SmoothingEngine::new(3);
        engine.push(detection(0.0, &[("happy", 0.4)]));
        engine.push(detection(0.0, &[("happy", 0.4)]));
        let out = engine.push(detection(0.0, &[("happy", 0.4), ("surprised", 0.6)]));

        // "surprised" only exists in the newest entry; its average uses
        // that single value, not zeros for the older entries.
        assert!((out.expressions.get("surprised").unwrap() - 0.6).abs() < 1e-5);
    }

    #[test]
    fn test_every_raw_category_present_in_output() {
        let mut engine = SmoothingEngine::new(3);
        engine.push(detection(0.0, &[("happy", 0.5)]));
        let out = engine.push(detection(0.0, &[("happy", 0.3), ("angry", 0.2), ("sad", 0.5)]));
        for label in ["happy", "angry", "sad"] {
            assert!(out.expressions.get(label).is_some(), "missing {label}");
        }
    }

    #[test]
    fn test_gender_passes_through_from_latest() {
        let mut engine = SmoothingEngine::new(2);
        let mut first = detection(0.0, &[("happy", 1.0)]);
        first.gender = Some("female".into());
        first.gender_probability = Some(0.8);
        engine.push(first);

        let mut second = detection(10.0, &[("happy", 1.0)]);
        second.gender = Some("male".into());
        second.gender_probability = Some(0.6);
        let out = engine.push(second);

        assert_eq!(out.gender.as_deref(), Some("male"));
        assert_eq!(out.gender_probability, Some(0.6));
    }

    #[test]
    fn test_age_averaged_when_present() {
        let mut engine = SmoothingEngine::new(2);
        let mut first = detection(0.0, &[]);
        first.age = Some(30.0);
        engine.push(first);
        let mut second = detection(0.0, &[]);
        second.age = Some(40.0);
        let out = engine.push(second);
        assert!((out.age.unwrap() - 35.0).abs() < 1e-5);
    }

    #[test]
    fn test_deterministic_for_identical_sequences() {
        let inputs: Vec<FaceDetection> = (0..6)
            .map(|i| detection(i as f32 * 3.0, &[("happy", 0.1 * i as f32)]))
            .collect();

        let mut a = SmoothingEngine::new(4);
        let mut b = SmoothingEngine::new(4);
        for input in &inputs {
            assert_eq!(a.push(input.clone()), b.push(input.clone()));
        }
    }

    #[test]
    fn test_ema_first_value_taken_directly() {
        let mut filter = EmaFilter::new(0.5);
        assert_eq!(filter.value(), None);
        assert_eq!(filter.apply(10.0), 10.0);
        assert!(filter.apply(10.0).is_finite());
    }

    #[test]
    fn test_ema_converges_toward_input() {
        let mut filter = EmaFilter::new(0.5);
        filter.apply(0.0);
        let mut value = 0.0;
        for _ in 0..20 {
            value = filter.apply(100.0);
        }
        assert!((value - 100.0).abs() < 0.1);
    }

    #[test]
    fn test_ema_step_is_alpha_fraction() {
        let mut filter = EmaFilter::new(0.6);
        filter.apply(0.0);
        // 0 + 0.6 * (10 - 0) = 6
        assert!((filter.apply(10.0) - 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_ema_reset_forgets_state() {
        let mut filter = EmaFilter::new(0.3);
        filter.apply(50.0);
        filter.reset();
        assert_eq!(filter.apply(10.0), 10.0);
    }
}
