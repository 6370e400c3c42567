use axum::{routing::{get, post, put}, Router};

use super::handlers::*;
use super::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/npm/stats", get(npm_stats_handler))
        .route("/api/npm/versions", get(npm_versions_handler))
        .route("/api/npm/trends", get(npm_trends_handler))
        .route("/api/npm/sync", post(npm_sync_handler))
        .route("/api/users", get(list_users_handler))
        .route("/api/users/:id/role", put(update_role_handler))
        .route("/api/deployments", post(record_deployment_handler))
        .route("/api/deployments/history", get(deployment_history_handler))
        .route(
            "/api/deployments/usage",
            get(get_usage_handler).put(put_usage_handler),
        )
        .route("/api/deployments/:id/rollback", post(rollback_handler))
        .with_state(state)
}
