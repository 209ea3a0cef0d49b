use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Game {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub game_type: String,
    pub difficulty: Option<String>,
    pub target_age_min: Option<i32>,
    pub target_age_max: Option<i32>,
    pub image_url: Option<String>,
    pub config: Option<Value>,
    pub created_by: Option<i32>,
    #[serde(serialize_with = "iso_timestamp")]
    pub created_at: Option<NaiveDateTime>,
    pub plays_count: Option<i32>,
    pub average_score: Option<f64>,
    pub is_active: Option<bool>,
}

fn iso_timestamp<S: Serializer>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(ts) => serializer.serialize_str(&ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        None => serializer.serialize_none(),
    }
}

/// Optional filters combined with AND
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameFilter {
    pub game_type: Option<String>,
    pub difficulty: Option<String>,
    pub active_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGame {
    pub title: String,
    pub description: String,
    pub game_type: String,
    pub difficulty: String,
    pub target_age_min: Option<i32>,
    pub target_age_max: Option<i32>,
    pub image_url: Option<String>,
    pub config: Value,
    pub created_by: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGameResult {
    pub game_id: i32,
    pub student_id: i32,
    pub score: i32,
    pub max_score: i32,
    pub time_spent: i32,
    pub details: Value,
}

impl NewGameResult {
    /// Score as a percentage of the maximum, the unit `games.average_score` is kept in
    pub fn percent(&self) -> f64 {
        f64::from(self.score) / f64::from(self.max_score) * 100.0
    }
}
