use thiserror::Error;

use crate::types::{DominantEmotion, Expressions};

#[derive(Error, Debug, PartialEq)]
pub enum EmotionError {
    #[error("no expression scores to select from")]
    NoDetection,
}

/// Collapses a multi-category probability map into one discrete label.
pub struct EmotionSelector;

impl EmotionSelector {
    /// Pick the maximum-probability category.
    ///
    /// The fold keeps an entry only when it is strictly greater than the
    /// current best, so on exact ties the earliest-encountered category
    /// wins. This is deliberate: selection must be reproducible, and
    /// [`Expressions`] iterates in insertion order.
    ///
    /// Confidence is the winning probability as-is, not renormalized.
    pub fn select(expressions: &Expressions) -> Result<DominantEmotion, EmotionError> {
        let mut best: Option<(&str, f32)> = None;
        for (label, probability) in expressions.iter() {
            let is_better = match best {
                None => true,
                Some((_, current)) => probability > current,
            };
            if is_better {
                best = Some((label, probability));
            }
        }

        best.map(|(label, confidence)| DominantEmotion {
            label: label.to_string(),
            confidence,
        })
        .ok_or(EmotionError::NoDetection)
    }

    /// Like [`select`](Self::select), but substitutes the defined fallback
    /// (`unknown`, confidence 0.0) for empty input. This is what belongs in
    /// a render/event path; the error variant is for callers that need to
    /// distinguish "no data" from a real reading.
    pub fn select_or_unknown(expressions: &Expressions) -> DominantEmotion {
        Self::select(expressions).unwrap_or_else(|_| DominantEmotion::unknown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UNKNOWN_EMOTION;

    #[test]
    fn test_selects_maximum() {
        let expr = Expressions::from_pairs(&[("neutral", 0.1), ("happy", 0.7), ("sad", 0.2)]);
        let result = EmotionSelector::select(&expr).unwrap();
        assert_eq!(result.label, "happy");
        assert!((result.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_tie_break_first_seen_wins() {
        let expr = Expressions::from_pairs(&[("happy", 0.5), ("sad", 0.5)]);
        let result = EmotionSelector::select(&expr).unwrap();
        assert_eq!(result.label, "happy");

        // And in the opposite insertion order
        let expr = Expressions::from_pairs(&[("sad", 0.5), ("happy", 0.5)]);
        let result = EmotionSelector::select(&expr).unwrap();
        assert_eq!(result.label, "sad");
    }

    #[test]
    fn test_tie_break_is_stable_across_calls() {
        let expr = Expressions::from_pairs(&[("happy", 0.5), ("sad", 0.5), ("angry", 0.5)]);
        for _ in 0..10 {
            assert_eq!(EmotionSelector::select(&expr).unwrap().label, "happy");
        }
    }

    #[test]
    fn test_empty_input_is_no_detection() {
        let result = EmotionSelector::select(&Expressions::new());
        assert_eq!(result.unwrap_err(), EmotionError::NoDetection);
    }

    #[test]
    fn test_fallback_is_unknown_with_zero_confidence() {
        let result = EmotionSelector::select_or_unknown(&Expressions::new());
        assert_eq!(result.label, UNKNOWN_EMOTION);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_confidence_not_renormalized() {
        // Probabilities do not sum to 1; the winner's score is untouched
        let expr = Expressions::from_pairs(&[("happy", 0.3), ("sad", 0.1)]);
        let result = EmotionSelector::select(&expr).unwrap();
        assert!((result.confidence - 0.3).abs() < 1e-6);
    }
}
