use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Opaque ID types for readability
pub type PlayerId = String;
pub type ImageHash = String;
pub type DocumentId = String;

/// Fields every score document carries, used for query projections
pub const SCORE_FIELDS: &[&str] = &[
    "player_id",
    "created_at",
    "ai_score",
    "player_score",
    "rounds",
    "prediction_city",
    "label_city",
    "user_city_answer",
];

/// Index hint for all per-player score queries
pub const PLAYER_INDEX: &str = "_design/player_id";

/// Score submitted by the game client for the round just played
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreRequest {
    pub ai_score: i64,
    pub player_score: i64,
    pub rounds: u32,
    #[serde(default)]
    pub prediction_city: String,
    #[serde(default)]
    pub label_city: String,
    #[serde(default)]
    pub user_city_answer: String,
}

/// One scoring event as persisted in the document store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreRecord {
    pub player_id: PlayerId,
    /// Wall-clock seconds since the epoch
    pub created_at: f64,
    pub ai_score: i64,
    pub player_score: i64,
    pub rounds: u32,
    #[serde(default)]
    pub prediction_city: String,
    #[serde(default)]
    pub label_city: String,
    #[serde(default)]
    pub user_city_answer: String,
}

impl ScoreRecord {
    pub fn from_request(player_id: &str, request: &ScoreRequest, created_at: f64) -> Self {
        Self {
            player_id: player_id.to_string(),
            created_at,
            ai_score: request.ai_score,
            player_score: request.player_score,
            rounds: request.rounds,
            prediction_city: request.prediction_city.clone(),
            label_city: request.label_city.clone(),
            user_city_answer: request.user_city_answer.clone(),
        }
    }
}

/// Per-player list of the images shown so far, keyed by player id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentRecord {
    pub player_id: PlayerId,
    pub created_at: f64,
    #[serde(default)]
    pub images: Vec<ImageHash>,
}

impl ExperimentRecord {
    pub fn new(player_id: &str, created_at: f64) -> Self {
        Self {
            player_id: player_id.to_string(),
            created_at,
            images: Vec::new(),
        }
    }
}

/// Which pre-recorded AI answer a player asked for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResponseRoute {
    Predict,
    Explain,
}

impl ResponseRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseRoute::Predict => "predict",
            ResponseRoute::Explain => "explain",
        }
    }
}

/// Log entry for every predict/explain request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestRecord {
    pub player_id: PlayerId,
    pub created_at: f64,
    pub route: ResponseRoute,
    pub image_hash: ImageHash,
}

/// Kind of identifier a tracked collector record can be looked up by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedIdType {
    PredictionId,
    ExplanationId,
}

impl TrackedIdType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "prediction_id" => Some(TrackedIdType::PredictionId),
            "explanation_id" => Some(TrackedIdType::ExplanationId),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackedIdType::PredictionId => "prediction_id",
            TrackedIdType::ExplanationId => "explanation_id",
        }
    }

    /// Dotted path of the identifier inside a tracked record
    pub fn field_path(&self) -> String {
        format!("data.tracked.data.response.decoded.{}", self.as_str())
    }
}

/// A record written by the experiment tracking collector.
/// Unknown fields (`_id`, `_rev`, ...) are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub id: String,
    pub timestamp: f64,
    pub service: String,
    pub data: HashMap<String, HashMap<String, Value>>,
}

/// Image payload for the next round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Streetview {
    /// `data:image/png;base64,...` URL
    pub image: String,
    pub class_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinishedResponse {
    pub has_finished: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttentionCheckResponse {
    pub attention_check: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageResponse {
    pub data: String,
}

/// Current wall-clock time in fractional seconds
pub fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
