//! Long-term memory items.
//!
//! Memory is scoped to a session and is model-agnostic: the context compiler
//! ranks enabled items against each request and slots them into the
//! ContextPack by type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Free-form JSON object held by a memory item.
pub type MemoryValue = serde_json::Map<String, serde_json::Value>;

/// What kind of knowledge a memory item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryItemType {
    Fact,
    Preference,
    Decision,
    ArtifactRef,
}

impl MemoryItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "FACT",
            Self::Preference => "PREFERENCE",
            Self::Decision => "DECISION",
            Self::ArtifactRef => "ARTIFACT_REF",
        }
    }
}

impl std::fmt::Display for MemoryItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryItemType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FACT" => Ok(Self::Fact),
            "PREFERENCE" => Ok(Self::Preference),
            "DECISION" => Ok(Self::Decision),
            "ARTIFACT_REF" => Ok(Self::ArtifactRef),
            other => Err(format!("unknown memory type '{other}'")),
        }
    }
}

/// A single memory item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub session_id: String,

    #[serde(rename = "type")]
    pub item_type: MemoryItemType,

    pub key: String,
    pub value: MemoryValue,

    /// 0.0..=1.0, used to break relevance ties
    pub confidence: f64,

    /// Disabled items are never compiled into a ContextPack
    pub enabled: bool,

    /// The run that produced this item, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_run_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryItem {
    /// Build an enabled item with the default confidence of 0.5.
    pub fn new(
        session_id: impl Into<String>,
        item_type: MemoryItemType,
        key: impl Into<String>,
        value: MemoryValue,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            item_type,
            key: key.into(),
            value,
            confidence: 0.5,
            enabled: true,
            source_run_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_source_run(mut self, run_id: impl Into<String>) -> Self {
        self.source_run_id = Some(run_id.into());
        self
    }

    /// Check key length and confidence range.
    pub fn validate(&self) -> Result<()> {
        let key_len = self.key.chars().count();
        if key_len == 0 || key_len > 200 {
            return Err(Error::validation(format!(
                "memory key must be 1..=200 characters, got {key_len}"
            )));
        }
        validate_confidence(self.confidence)
    }
}

/// Partial update of a memory item. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<MemoryValue>,
}

impl MemoryPatch {
    pub fn validate(&self) -> Result<()> {
        match self.confidence {
            Some(confidence) => validate_confidence(confidence),
            None => Ok(()),
        }
    }

    /// Apply the patch in place, bumping `updated_at`.
    pub fn apply(&self, item: &mut MemoryItem) {
        if let Some(enabled) = self.enabled {
            item.enabled = enabled;
        }
        if let Some(confidence) = self.confidence {
            item.confidence = confidence;
        }
        if let Some(value) = &self.value {
            item.value = value.clone();
        }
        item.updated_at = Utc::now();
    }
}

fn validate_confidence(confidence: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(Error::validation(format!(
            "confidence must be within 0..=1, got {confidence}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn value(v: serde_json::Value) -> MemoryValue {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn new_item_defaults() {
        let item = MemoryItem::new("s1", MemoryItemType::Fact, "stack", value(json!({"lang": "rust"})));
        assert!(item.enabled);
        assert!((item.confidence - 0.5).abs() < f64::EPSILON);
        assert!(item.source_run_id.is_none());
        assert!(item.validate().is_ok());
    }

    #[test]
    fn rejects_empty_key_and_bad_confidence() {
        let item = MemoryItem::new("s1", MemoryItemType::Fact, "", MemoryValue::new());
        assert!(item.validate().is_err());

        let item = MemoryItem::new("s1", MemoryItemType::Fact, "k", MemoryValue::new())
            .with_confidence(1.5);
        assert!(item.validate().is_err());
    }

    #[test]
    fn patch_only_touches_set_fields() {
        let mut item = MemoryItem::new("s1", MemoryItemType::Decision, "db", value(json!({"use": "sqlite"})));
        let patch = MemoryPatch {
            enabled: Some(false),
            ..Default::default()
        };
        patch.apply(&mut item);
        assert!(!item.enabled);
        assert_eq!(item.value["use"], "sqlite");
        assert!((item.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn item_type_serializes_screaming() {
        let json = serde_json::to_string(&MemoryItemType::ArtifactRef).unwrap();
        assert_eq!(json, "\"ARTIFACT_REF\"");
        assert_eq!("fact".parse::<MemoryItemType>().unwrap(), MemoryItemType::Fact);
    }
}
