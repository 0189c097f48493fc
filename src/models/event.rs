use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A persisted event: a titled point location in decimal degrees.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create-event request body. The browser form submits `lat`/`lng` as text,
/// API clients send numbers; both shapes are accepted.
#[derive(Debug, Deserialize)]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub lat: CoordinateInput,
    pub lng: CoordinateInput,
}

/// A coordinate field as received on the wire: JSON number or string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CoordinateInput {
    Number(f64),
    Text(String),
}

impl CoordinateInput {
    /// Parses the raw field to a float. Returns `None` when the text form is
    /// not a number; range checking is the caller's concern.
    pub fn parse(&self) -> Option<f64> {
        match self {
            CoordinateInput::Number(value) => Some(*value),
            CoordinateInput::Text(text) => text.trim().parse().ok(),
        }
    }
}
