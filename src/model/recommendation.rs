use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The kind of advice a `Recommendation` carries. Each generation cycle owns exactly one kind.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationKind {
    /// Produced by `RecommendationEngine::generate`.
    AiPersonalized,
    /// Produced by `RecommendationEngine::update_holiday_recommendations`.
    HolidayRelated,
}

serde_plain::derive_display_from_serialize!(RecommendationKind);
serde_plain::derive_fromstr_from_deserialize!(RecommendationKind);

/// A user's reaction to a recommendation.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub helpful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub date: NaiveDateTime,
}

/// An advisory text item. It is never physically removed: dismissing sets a flag and feedback only
/// accumulates.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    id: String,
    #[serde(rename = "type")]
    kind: RecommendationKind,
    message: String,
    date_created: NaiveDate,
    #[serde(default)]
    dismissed: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    feedback: BTreeMap<String, Feedback>,
}

impl Recommendation {
    pub fn new(kind: RecommendationKind, message: impl Into<String>, date_created: NaiveDate) -> Self {
        Self {
            id: format!("rec-{}", uuid::Uuid::new_v4().simple()),
            kind,
            message: message.into(),
            date_created,
            dismissed: false,
            feedback: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> RecommendationKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn date_created(&self) -> NaiveDate {
        self.date_created
    }

    pub fn is_dismissed(&self) -> bool {
        self.dismissed
    }

    pub fn feedback(&self) -> &BTreeMap<String, Feedback> {
        &self.feedback
    }

    /// Marks the recommendation as dismissed. Returns false if it already was.
    pub fn dismiss(&mut self) -> bool {
        let changed = !self.dismissed;
        self.dismissed = true;
        changed
    }

    /// Records feedback under a fresh key and returns that key.
    pub fn add_feedback(&mut self, helpful: bool, comment: Option<String>, date: NaiveDateTime) -> String {
        let key = format!("fb-{}", uuid::Uuid::new_v4().simple());
        self.feedback.insert(
            key.clone(),
            Feedback {
                helpful,
                comment: comment.filter(|c| !c.trim().is_empty()),
                date,
            },
        );
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn test_json_shape() {
        let r = Recommendation::new(RecommendationKind::AiPersonalized, "Cook at home", day());
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["type"], "AI_PERSONALIZED");
        assert_eq!(v["message"], "Cook at home");
        assert_eq!(v["dateCreated"], "2024-05-01");
        assert_eq!(v["dismissed"], false);
        assert!(v.get("feedback").is_none());
        assert!(r.id().starts_with("rec-"));
    }

    #[test]
    fn test_deserialize_without_feedback() {
        let json = r#"{"id":"r1","type":"HOLIDAY_RELATED","message":"m","dateCreated":"2024-12-01","dismissed":true}"#;
        let r: Recommendation = serde_json::from_str(json).unwrap();
        assert_eq!(r.kind(), RecommendationKind::HolidayRelated);
        assert!(r.is_dismissed());
        assert!(r.feedback().is_empty());
    }

    #[test]
    fn test_dismiss_is_idempotent() {
        let mut r = Recommendation::new(RecommendationKind::AiPersonalized, "m", day());
        assert!(r.dismiss());
        assert!(!r.dismiss());
        assert!(r.is_dismissed());
    }

    #[test]
    fn test_feedback_accumulates() {
        let mut r = Recommendation::new(RecommendationKind::AiPersonalized, "m", day());
        let now = day().and_hms_opt(9, 0, 0).unwrap();
        let a = r.add_feedback(true, Some("nice".to_string()), now);
        let b = r.add_feedback(false, Some(" ".to_string()), now);
        assert_ne!(a, b);
        assert_eq!(r.feedback().len(), 2);
        assert_eq!(r.feedback()[&a].comment.as_deref(), Some("nice"));
        assert_eq!(r.feedback()[&b].comment, None);
    }
}
