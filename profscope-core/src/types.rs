//! Fundamental data types shared across the pipeline.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// A single student review of an instructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    #[serde(default)]
    pub professor: String,
    #[serde(default)]
    pub subject: String,
    /// Star rating (1-5). Stored sources sometimes carry it as a string.
    #[serde(default, deserialize_with = "deserialize_stars")]
    pub stars: f64,
    #[serde(default)]
    pub review: String,
}

impl ReviewRecord {
    pub fn new(
        professor: impl Into<String>,
        subject: impl Into<String>,
        stars: f64,
        review: impl Into<String>,
    ) -> Self {
        Self {
            professor: professor.into(),
            subject: subject.into(),
            stars,
            review: review.into(),
        }
    }

    /// Text used both for keyword matching and for embedding.
    pub fn searchable_text(&self) -> String {
        format!("{} {} {}", self.professor, self.subject, self.review)
    }

    /// Star rating rendered without a trailing `.0` for whole numbers.
    pub fn stars_display(&self) -> String {
        if self.stars.fract() == 0.0 {
            format!("{:.0}", self.stars)
        } else {
            self.stars.to_string()
        }
    }
}

/// Accept a JSON number, a numeric string, or null. Anything unparseable is 0.
fn deserialize_stars<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    })
}

/// A review returned by a retrieval tier, with its 1-based rank in the result list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedReview {
    pub rank: usize,
    #[serde(flatten)]
    pub record: ReviewRecord,
}

impl RetrievedReview {
    /// Assign ranks by position.
    pub fn ranked(records: impl IntoIterator<Item = ReviewRecord>) -> Vec<Self> {
        records
            .into_iter()
            .enumerate()
            .map(|(i, record)| Self { rank: i + 1, record })
            .collect()
    }

    pub fn professor(&self) -> &str {
        &self.record.professor
    }
}

/// Per-request state built once and discarded with the response.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub raw_query: String,
    pub retrieved_reviews: Vec<RetrievedReview>,
    /// Professor names referenced by the query, in first-seen retrieval order.
    pub mentioned_professors: Vec<String>,
}

impl QueryContext {
    /// Names of every professor present in the retrieval results.
    pub fn retrieved_professors(&self) -> BTreeSet<&str> {
        self.retrieved_reviews.iter().map(|r| r.professor()).collect()
    }
}

/// Output of the statistical prediction model for one professor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub avg_rating: f64,
    pub avg_difficulty: f64,
    pub confidence: f64,
    #[serde(default)]
    pub rating_consistency: f64,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub individual_predictions: Option<Vec<f64>>,
}

/// Predictions keyed by professor name, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionSet {
    entries: Vec<(String, PredictionResult)>,
}

impl PredictionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the prediction for `professor`.
    pub fn insert(&mut self, professor: impl Into<String>, prediction: PredictionResult) {
        let professor = professor.into();
        match self.entries.iter_mut().find(|(name, _)| *name == professor) {
            Some(entry) => entry.1 = prediction,
            None => self.entries.push((professor, prediction)),
        }
    }

    pub fn get(&self, professor: &str) -> Option<&PredictionResult> {
        self.entries
            .iter()
            .find(|(name, _)| name == professor)
            .map(|(_, p)| p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PredictionResult)> {
        self.entries.iter().map(|(name, p)| (name.as_str(), p))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Participant role in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One turn of the inbound conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Content of the most recent user turn, if any.
pub fn last_user_query(turns: &[ChatTurn]) -> Option<&str> {
    turns
        .iter()
        .rev()
        .find(|t| t.role == Role::User)
        .map(|t| t.content.as_str())
}
