//! Virtual profile snapshots derived from journal entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One analysis run over a user's latest entry.
///
/// Every field is optional on the wire because the model produces it. When
/// the model's output could not be parsed, only `raw_analysis` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
    pub personality_traits: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_state: Option<String>,

    #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
    pub interests_hobbies: Vec<String>,

    #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
    pub habits_patterns: Vec<String>,

    #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
    pub values_priorities: Vec<String>,

    #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
    pub challenges_concerns: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavioral_insights: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mental_health_indicators: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_insights: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_analysis: Option<String>,
}

fn string_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) if s.trim().is_empty() => Vec::new(),
        Some(Value::String(s)) => vec![s],
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(other) => vec![other.to_string()],
    })
}

impl VirtualProfile {
    /// Fallback snapshot holding the model's unparsed output.
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            raw_analysis: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn is_raw(&self) -> bool {
        self.raw_analysis.is_some() && self.summary.is_none() && self.personality_traits.is_empty()
    }

    /// Labelled lines for the non-empty fields, in a fixed order.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        let mut list = |label: &'static str, items: &[String]| {
            if !items.is_empty() {
                out.push((label, items.join(", ")));
            }
        };
        list("Personality traits", &self.personality_traits);
        list("Interests & hobbies", &self.interests_hobbies);
        list("Habits & patterns", &self.habits_patterns);
        list("Values & priorities", &self.values_priorities);
        list("Challenges & concerns", &self.challenges_concerns);

        let scalars = [
            ("Emotional state", &self.emotional_state),
            ("Behavioral insights", &self.behavioral_insights),
            ("Mental health indicators", &self.mental_health_indicators),
            ("Relationship insights", &self.relationship_insights),
            ("Summary", &self.summary),
            ("Raw analysis", &self.raw_analysis),
        ];
        for (label, value) in scalars {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                out.push((label, v.to_string()));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lists_accept_strings_or_arrays() {
        let p: VirtualProfile = serde_json::from_value(json!({
            "personality_traits": ["curious", "reflective"],
            "interests_hobbies": "running",
            "summary": "Doing well."
        }))
        .unwrap();
        assert_eq!(p.personality_traits, vec!["curious", "reflective"]);
        assert_eq!(p.interests_hobbies, vec!["running"]);
        assert!(!p.is_raw());
    }

    #[test]
    fn raw_fallback_renders_only_raw_field() {
        let p = VirtualProfile::raw("not json");
        assert!(p.is_raw());
        assert_eq!(p.fields(), vec![("Raw analysis", "not json".to_string())]);
    }
}
