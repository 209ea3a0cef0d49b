// handlers/results.rs - POST /save-game-result handler

use axum::{body::Bytes, extract::State, http::Method, response::Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::database::models::NewGameResult;
use crate::error::ApiError;
use crate::middleware::{parse_body, ApiResult, Endpoint};
use crate::state::{release, AppState};

const ENDPOINT: Endpoint = Endpoint::new(&["POST"], "Content-Type, X-User-Id");

#[derive(Debug, Deserialize)]
struct SaveResultRequest {
    game_id: Option<i32>,
    student_id: Option<i32>,
    score: Option<i32>,
    max_score: Option<i32>,
    time_spent: Option<i32>,
    details: Option<Value>,
}

impl SaveResultRequest {
    fn into_result(self) -> ApiResult<NewGameResult> {
        let (Some(game_id), Some(student_id), Some(score), Some(max_score)) =
            (self.game_id, self.student_id, self.score, self.max_score)
        else {
            return Err(ApiError::bad_request(
                "game_id, student_id, score, and max_score are required",
            ));
        };
        if max_score <= 0 {
            return Err(ApiError::bad_request("max_score must be greater than zero"));
        }
        Ok(NewGameResult {
            game_id,
            student_id,
            score,
            max_score,
            time_spent: self.time_spent.unwrap_or(0),
            details: match self.details {
                Some(Value::Null) | None => json!({}),
                Some(details) => details,
            },
        })
    }
}

/// POST /save-game-result - store one play and refresh the game's play count and average
pub async fn save_game_result(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    ENDPOINT.dispatch(&method, || save(state, body)).await
}

async fn save(state: AppState, body: Bytes) -> ApiResult<Value> {
    let result = parse_body::<SaveResultRequest>(&body)?.into_result()?;
    let (game_id, percent) = (result.game_id, result.percent());

    let mut store = state.open_store().await?;
    let recorded = store.record_game_result(result).await;
    release(store).await;
    let result_id = recorded?;

    info!("Recorded result {} for game {} ({:.1}%)", result_id, game_id, percent);
    Ok(json!({
        "success": true,
        "result_id": result_id,
        "message": "Result saved successfully",
    }))
}
