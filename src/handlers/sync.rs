// handlers/sync.rs - POST /alfacrm-sync handler

use axum::{extract::State, http::Method, response::Response};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use crate::middleware::{ApiResult, Endpoint};
use crate::state::{release, AppState};
use crate::sync::{SyncEngine, SyncReport};

const ENDPOINT: Endpoint = Endpoint::new(&["POST"], "Content-Type, X-Api-Key");

/// POST /alfacrm-sync - pull students, teachers and lessons from AlfaCRM into the database
///
/// Needs both the database and the full CRM configuration. Per-record failures are
/// counted in `stats.failed`; a failed CRM call aborts with the mapped upstream error.
pub async fn alfacrm_sync(State(state): State<AppState>, method: Method) -> Response {
    ENDPOINT.dispatch(&method, || run(state)).await
}

async fn run(state: AppState) -> ApiResult<Value> {
    let report = sync_once(&state).await?;
    Ok(json!({
        "success": true,
        "stats": report.stats(),
        "errors": report.errors,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// One full sync run against the configured CRM branch and database
pub async fn sync_once(state: &AppState) -> ApiResult<SyncReport> {
    let credentials = state.config.crm.credentials()?;
    let branch_id = credentials.require_branch()?;
    state.config.database.require_url()?;

    let source = state.open_crm(&credentials)?;
    let mut store = state.open_store().await?;
    let outcome = SyncEngine::new(source.as_ref(), store.as_mut(), branch_id).run().await;
    release(store).await;
    let report = outcome?;

    info!(
        "AlfaCRM sync finished: {} skipped, {} failed",
        report.skipped(),
        report.failed()
    );
    Ok(report)
}
