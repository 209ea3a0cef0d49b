pub mod cli;
pub mod config;
pub mod crm;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;
pub mod sync;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

use axum::{routing::any, Router};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// All endpoints. Routes accept any method; each handler answers OPTIONS and 405 itself
pub fn app(state: AppState) -> Router {
    let request_logging = state.config.server.enable_request_logging;

    let router = Router::new()
        .route("/health", any(handlers::health))
        .route("/admin-login", any(handlers::admin_login))
        .route("/get-students", any(handlers::get_students))
        .route("/get-games", any(handlers::get_games))
        .route("/save-game", any(handlers::save_game))
        .route("/save-game-result", any(handlers::save_game_result))
        .route("/alfacrm", any(handlers::alfacrm_proxy))
        .route("/get-branches", any(handlers::get_branches))
        .route("/alfacrm-sync", any(handlers::alfacrm_sync))
        .with_state(state);

    if request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}
