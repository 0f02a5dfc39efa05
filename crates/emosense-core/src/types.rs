use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize};

/// Fallback label emitted when no face (or no expression data) is available.
pub const UNKNOWN_EMOTION: &str = "unknown";

/// Bounding box of a detected face, in pixel space of the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Centroid of the box.
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// A single 2D landmark point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Category-to-probability map for facial expressions.
///
/// Entries keep their insertion order: the dominant-emotion tie-break is
/// "first seen wins", which a hash map cannot reproduce deterministically.
/// Probabilities are in [0, 1] but need not sum to 1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expressions {
    entries: Vec<(String, f32)>,
}

impl Expressions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from label/probability pairs, preserving their order.
    pub fn from_pairs(pairs: &[(&str, f32)]) -> Self {
        Self {
            entries: pairs
                .iter()
                .map(|(label, prob)| (label.to_string(), *prob))
                .collect(),
        }
    }

    /// Set a category's probability, replacing an existing entry or
    /// appending a new one at the end.
    pub fn insert(&mut self, label: impl Into<String>, probability: f32) {
        let label = label.into();
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = probability,
            None => self.entries.push((label, probability)),
        }
    }

    pub fn get(&self, label: &str) -> Option<f32> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, p)| *p)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.entries.iter().map(|(l, p)| (l.as_str(), *p))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Expressions {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, prob) in &self.entries {
            map.serialize_entry(label, prob)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Expressions {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MapVisitor;

        impl<'de> serde::de::Visitor<'de> for MapVisitor {
            type Value = Expressions;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map of expression categories to probabilities")
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(
                self,
                mut access: A,
            ) -> Result<Self::Value, A::Error> {
                let mut expressions = Expressions::new();
                while let Some((label, prob)) = access.next_entry::<String, f32>()? {
                    expressions.insert(label, prob);
                }
                Ok(expressions)
            }
        }

        deserializer.deserialize_map(MapVisitor)
    }
}

/// Result of one inference call on one frame.
///
/// The same shape serves raw model output and its smoothed counterpart;
/// the smoothing engine averages the numeric fields and passes the
/// categorical ones through from the latest entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    #[serde(rename = "box")]
    pub bounding_box: BoundingBox,
    pub expressions: Expressions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<Vec<Point>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender_probability: Option<f32>,
}

/// A multi-category probability map collapsed to one discrete label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DominantEmotion {
    pub label: String,
    /// Probability of the winning category, not renormalized.
    pub confidence: f32,
}

impl DominantEmotion {
    /// The defined fallback reading: `unknown` at zero confidence.
    pub fn unknown() -> Self {
        Self {
            label: UNKNOWN_EMOTION.to_string(),
            confidence: 0.0,
        }
    }
}

/// Output event delivered to consumers for every processed detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionEvent {
    pub emotion: String,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
    pub expressions: Expressions,
    #[serde(rename = "box", skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<Vec<Point>>,
}

impl EmotionEvent {
    /// Fallback event for a completed inference call that found no face.
    pub fn unknown(timestamp: DateTime<Utc>) -> Self {
        Self {
            emotion: UNKNOWN_EMOTION.to_string(),
            confidence: 0.0,
            timestamp,
            expressions: Expressions::new(),
            bounding_box: None,
            landmarks: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center() {
        let bbox = BoundingBox {
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 50.0,
        };
        assert_eq!(bbox.center(), (60.0, 45.0));
    }

    #[test]
    fn test_expressions_preserve_insertion_order() {
        let mut expr = Expressions::new();
        expr.insert("happy", 0.5);
        expr.insert("sad", 0.3);
        expr.insert("angry", 0.2);

        let labels: Vec<&str> = expr.iter().map(|(l, _)| l).collect();
        assert_eq!(labels, vec!["happy", "sad", "angry"]);
    }

    #[test]
    fn test_expressions_insert_replaces_in_place() {
        let mut expr = Expressions::from_pairs(&[("happy", 0.5), ("sad", 0.3)]);
        expr.insert("happy", 0.9);

        assert_eq!(expr.get("happy"), Some(0.9));
        let labels: Vec<&str> = expr.iter().map(|(l, _)| l).collect();
        assert_eq!(labels, vec!["happy", "sad"], "replace must not reorder");
    }

    #[test]
    fn test_expressions_serialize_as_ordered_object() {
        let expr = Expressions::from_pairs(&[("happy", 0.75), ("sad", 0.25)]);
        let json = serde_json::to_string(&expr).unwrap();
        assert_eq!(json, r#"{"happy":0.75,"sad":0.25}"#);
    }

    #[test]
    fn test_expressions_deserialize_roundtrip() {
        let json = r#"{"neutral":0.1,"happy":0.8,"surprised":0.1}"#;
        let expr: Expressions = serde_json::from_str(json).unwrap();
        assert_eq!(expr.len(), 3);
        assert_eq!(expr.get("happy"), Some(0.8));
        assert_eq!(serde_json::to_string(&expr).unwrap(), json);
    }

    #[test]
    fn test_unknown_event_shape() {
        let event = EmotionEvent::unknown(Utc::now());
        assert_eq!(event.emotion, UNKNOWN_EMOTION);
        assert_eq!(event.confidence, 0.0);
        assert!(event.expressions.is_empty());
        assert!(event.bounding_box.is_none());
    }

    #[test]
    fn test_event_serializes_box_field_name() {
        let event = EmotionEvent {
            emotion: "happy".into(),
            confidence: 0.8,
            timestamp: Utc::now(),
            expressions: Expressions::from_pairs(&[("happy", 0.8)]),
            bounding_box: Some(BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            }),
            landmarks: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("box").is_some());
        assert!(json.get("landmarks").is_none());
    }
}
