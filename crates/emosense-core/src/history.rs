use std::collections::VecDeque;

use serde::Serialize;

use crate::types::EmotionEvent;

/// Default number of readings kept (a few minutes at typical rates).
pub const DEFAULT_HISTORY_CAPACITY: usize = 300;

/// Bounded in-memory record of recent emotion readings, oldest evicted
/// first. This is a consumer-side store; nothing here persists to disk.
#[derive(Debug)]
pub struct EmotionHistory {
    entries: VecDeque<EmotionEvent>,
    capacity: usize,
}

/// Aggregate view over the current history contents.
#[derive(Debug, Clone, Serialize)]
pub struct EmotionSummary {
    pub total: usize,
    /// Per-label statistics, ordered by first appearance.
    pub labels: Vec<LabelStats>,
    /// Most frequent label; first seen wins ties.
    pub dominant: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelStats {
    pub label: String,
    pub count: usize,
    pub mean_confidence: f32,
}

impl EmotionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: EmotionEvent) {
        self.entries.push_back(event);
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// The `n` most recent readings, oldest first.
    pub fn recent(&self, n: usize) -> Vec<EmotionEvent> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn latest(&self) -> Option<&EmotionEvent> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EmotionEvent> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn summary(&self) -> EmotionSummary {
        let mut labels: Vec<LabelStats> = Vec::new();

        for event in &self.entries {
            match labels.iter_mut().find(|s| s.label == event.emotion) {
                Some(stats) => {
                    stats.count += 1;
                    stats.mean_confidence += event.confidence;
                }
                None => labels.push(LabelStats {
                    label: event.emotion.clone(),
                    count: 1,
                    mean_confidence: event.confidence,
                }),
            }
        }
        for stats in &mut labels {
            stats.mean_confidence /= stats.count as f32;
        }

        let dominant = labels
            .iter()
            .fold(None::<&LabelStats>, |best, stats| match best {
                Some(current) if stats.count <= current.count => best,
                _ => Some(stats),
            })
            .map(|s| s.label.clone());

        EmotionSummary {
            total: self.entries.len(),
            labels,
            dominant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(emotion: &str, confidence: f32) -> EmotionEvent {
        EmotionEvent {
            emotion: emotion.to_string(),
            confidence,
            timestamp: Utc::now(),
            expressions: crate::types::Expressions::new(),
            bounding_box: None,
            landmarks: None,
        }
    }

    #[test]
    fn test_capacity_bound() {
        let mut history = EmotionHistory::new(3);
        for i in 0..10 {
            history.push(event("happy", i as f32 / 10.0));
            assert!(history.len() <= 3);
        }
        assert_eq!(history.len(), 3);
        // Oldest evicted first
        let confidences: Vec<f32> = history.iter().map(|e| e.confidence).collect();
        assert_eq!(confidences, vec![0.7, 0.8, 0.9]);
    }

    #[test]
    fn test_recent_returns_tail_oldest_first() {
        let mut history = EmotionHistory::new(10);
        for label in ["neutral", "happy", "sad"] {
            history.push(event(label, 0.5));
        }
        let recent = history.recent(2);
        let labels: Vec<&str> = recent.iter().map(|e| e.emotion.as_str()).collect();
        assert_eq!(labels, vec!["happy", "sad"]);

        // Asking for more than exists returns everything
        assert_eq!(history.recent(100).len(), 3);
    }

    #[test]
    fn test_summary_counts_and_means() {
        let mut history = EmotionHistory::new(10);
        history.push(event("happy", 0.8));
        history.push(event("happy", 0.6));
        history.push(event("sad", 0.4));

        let summary = history.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.dominant.as_deref(), Some("happy"));

        let happy = summary.labels.iter().find(|s| s.label == "happy").unwrap();
        assert_eq!(happy.count, 2);
        assert!((happy.mean_confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_summary_dominant_tie_first_seen_wins() {
        let mut history = EmotionHistory::new(10);
        history.push(event("sad", 0.5));
        history.push(event("happy", 0.5));
        let summary = history.summary();
        assert_eq!(summary.dominant.as_deref(), Some("sad"));
    }

    #[test]
    fn test_empty_summary() {
        let history = EmotionHistory::new(5);
        let summary = history.summary();
        assert_eq!(summary.total, 0);
        assert!(summary.labels.is_empty());
        assert!(summary.dominant.is_none());
    }
}
