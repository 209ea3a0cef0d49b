// handlers/games.rs - GET /get-games and POST /save-game handlers

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::Method,
    response::Response,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::database::models::{GameFilter, NewGame};
use crate::error::ApiError;
use crate::middleware::{parse_body, ApiResult, Endpoint};
use crate::state::{release, AppState};

const LIST_ENDPOINT: Endpoint = Endpoint::new(&["GET"], "Content-Type, X-User-Id");
const SAVE_ENDPOINT: Endpoint = Endpoint::new(&["POST"], "Content-Type, X-User-Id");

const DEFAULT_DIFFICULTY: &str = "medium";

/// GET /get-games - catalog filtered by `game_type`, `difficulty` and `is_active`
pub async fn get_games(
    State(state): State<AppState>,
    method: Method,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    LIST_ENDPOINT.dispatch(&method, || list(state, params)).await
}

/// `is_active` defaults to `"true"` (any case); any other value disables the active filter
fn filter_from(params: &HashMap<String, String>) -> GameFilter {
    let non_empty = |key: &str| params.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    GameFilter {
        game_type: non_empty("game_type"),
        difficulty: non_empty("difficulty"),
        active_only: params.get("is_active").map_or(true, |v| v.trim().eq_ignore_ascii_case("true")),
    }
}

async fn list(state: AppState, params: HashMap<String, String>) -> ApiResult<Value> {
    let filter = filter_from(&params);
    let mut store = state.open_store().await?;
    let games = store.list_games(&filter).await;
    release(store).await;
    let games = games?;

    Ok(json!({
        "success": true,
        "count": games.len(),
        "games": games,
    }))
}

#[derive(Debug, Deserialize)]
struct SaveGameRequest {
    game_type: Option<String>,
    title: Option<String>,
    description: Option<String>,
    difficulty: Option<String>,
    target_age_min: Option<i32>,
    target_age_max: Option<i32>,
    image_url: Option<String>,
    config: Option<Value>,
    created_by: Option<i32>,
}

impl SaveGameRequest {
    fn into_new_game(self) -> ApiResult<NewGame> {
        let required = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let (Some(game_type), Some(title)) = (required(self.game_type), required(self.title)) else {
            return Err(ApiError::bad_request("game_type and title are required"));
        };
        Ok(NewGame {
            title,
            description: self.description.unwrap_or_default(),
            game_type,
            difficulty: self
                .difficulty
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DIFFICULTY.to_string()),
            target_age_min: self.target_age_min,
            target_age_max: self.target_age_max,
            image_url: self.image_url,
            config: match self.config {
                Some(Value::Null) | None => json!({}),
                Some(config) => config,
            },
            created_by: self.created_by,
        })
    }
}

/// POST /save-game - add a game definition to the catalog
pub async fn save_game(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    SAVE_ENDPOINT.dispatch(&method, || save(state, body)).await
}

async fn save(state: AppState, body: Bytes) -> ApiResult<Value> {
    let game = parse_body::<SaveGameRequest>(&body)?.into_new_game()?;
    let title = game.title.clone();

    let mut store = state.open_store().await?;
    let inserted = store.insert_game(game).await;
    release(store).await;
    let game_id = inserted?;

    info!("Saved game {} ({})", game_id, title);
    Ok(json!({
        "success": true,
        "game_id": game_id,
        "message": "Game saved successfully",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{call, configured, state};
    use crate::testing::{FakeCrm, MemoryDb};
    use axum::http::StatusCode;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn active_filter_defaults_on() {
        assert!(filter_from(&params(&[])).active_only);
        assert!(!filter_from(&params(&[("is_active", "false")])).active_only);
        assert!(!filter_from(&params(&[("is_active", "all")])).active_only);
        assert!(filter_from(&params(&[("is_active", "True")])).active_only);
        assert!(filter_from(&params(&[("is_active", "TRUE")])).active_only);
        let filter = filter_from(&params(&[("game_type", "speech"), ("difficulty", "")]));
        assert_eq!(filter.game_type.as_deref(), Some("speech"));
        assert_eq!(filter.difficulty, None);
    }

    #[tokio::test]
    async fn lists_active_games_newest_first() {
        let db = MemoryDb::new();
        db.seed_game("Old", "speech", "easy", true);
        db.seed_game("Hidden", "speech", "easy", false);
        db.seed_game("New", "memory", "hard", true);

        let (status, _, body) = call(state(configured(), &db, &FakeCrm::default()), "GET", "/get-games", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["games"][0]["title"], "New");
        assert_eq!(body["games"][1]["title"], "Old");

        let (_, _, body) = call(
            state(configured(), &db, &FakeCrm::default()),
            "GET",
            "/get-games?game_type=speech&is_active=false",
            "",
        )
        .await;
        assert_eq!(body["count"], 2);
    }

    #[tokio::test]
    async fn save_applies_defaults() {
        let db = MemoryDb::new();
        let (status, _, body) = call(
            state(configured(), &db, &FakeCrm::default()),
            "POST",
            "/save-game",
            r#"{"game_type":"speech","title":"Звуки"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Game saved successfully");

        let game = db.game(body["game_id"].as_i64().unwrap() as i32).unwrap();
        assert_eq!(game.difficulty.as_deref(), Some("medium"));
        assert_eq!(game.description.as_deref(), Some(""));
        assert_eq!(game.config, Some(json!({})));
        assert_eq!(db.connections(), (1, 1));
    }

    #[tokio::test]
    async fn save_requires_type_and_title() {
        let db = MemoryDb::new();
        let (status, _, body) = call(
            state(configured(), &db, &FakeCrm::default()),
            "POST",
            "/save-game",
            r#"{"title":"Без типа"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "game_type and title are required");
        assert_eq!(db.connections(), (0, 0));
    }
}
