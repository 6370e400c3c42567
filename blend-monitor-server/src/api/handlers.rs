use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use super::auth::{AuthUser, Role};
use super::error::ApiError;
use super::types::*;
use super::AppState;
use crate::alerts;
use crate::db::models::{Deployment, DeploymentStatus, NewDeployment, UsageSnapshot};
use crate::db::Store;
use crate::retry::retry;
use crate::sanitize::{clamp_i64, parse_clamped};
use crate::sync::SyncHandler;

const MAX_PAGE: i64 = 100;
const MAX_TREND_DAYS: i64 = 365;

fn sync_handler(state: &AppState) -> SyncHandler<'_, dyn Store, dyn crate::npm::RegistrySource> {
    SyncHandler::new(&*state.store, &*state.registry, &state.settings.package_name)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

fn required(field: &str, value: Option<String>) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{} is required", field)))
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthReport> {
    let database = match state.store.ping().await {
        Ok(()) => ComponentHealth { ok: true, error: None },
        Err(e) => {
            tracing::warn!("Health check: database unreachable: {}", e);
            ComponentHealth { ok: false, error: Some(e.to_string()) }
        }
    };

    let registry = match state.registry.ping(state.settings.health_timeout).await {
        Ok(()) => ComponentHealth { ok: true, error: None },
        Err(e) => {
            tracing::warn!("Health check: registry unreachable: {}", e);
            ComponentHealth { ok: false, error: Some(e.to_string()) }
        }
    };

    let status = if database.ok && registry.ok {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    Json(HealthReport { status, database, registry })
}

pub async fn npm_stats_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let served = sync_handler(&state).stats().await?;
    Ok(([(DATA_SOURCE_HEADER, served.source.as_str())], Json(served.data)))
}

pub async fn npm_versions_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let served = sync_handler(&state).versions().await?;
    Ok(([(DATA_SOURCE_HEADER, served.source.as_str())], Json(served.data)))
}

pub async fn npm_trends_handler(
    State(state): State<AppState>,
    Query(params): Query<TrendsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let default_days = state.settings.trend_days;
    let days = params
        .days
        .as_deref()
        .map(|raw| parse_clamped(raw, default_days, 1, MAX_TREND_DAYS))
        .unwrap_or_else(|| clamp_i64(default_days, 1, MAX_TREND_DAYS));

    let served = sync_handler(&state).trends(days).await?;
    Ok(([(DATA_SOURCE_HEADER, served.source.as_str())], Json(served.data)))
}

pub async fn npm_sync_handler(State(state): State<AppState>) -> (StatusCode, Json<SyncResponse>) {
    let report = sync_handler(&state).full_sync(state.settings.trend_days).await;

    let status = if report.is_total_failure() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };

    (
        status,
        Json(SyncResponse {
            success: report.is_complete(),
            duration_ms: report.duration_ms,
            results: SyncResults {
                stats: report.stats,
                versions: report.versions,
                trends: report.trends,
            },
        }),
    )
}

pub async fn list_users_handler(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(params): Query<ListQuery>,
) -> Result<Json<UsersResponse>, ApiError> {
    let limit = clamp_i64(params.limit.unwrap_or(50), 1, MAX_PAGE);
    let offset = params.offset.unwrap_or(0).max(0);
    tracing::debug!("{} listing users (limit {}, offset {})", principal.user_id, limit, offset);

    let store: &dyn Store = &*state.store;
    match retry(&state.settings.retry, "list users", move || store.list_users(limit, offset)).await {
        Ok((users, total)) => Ok(Json(UsersResponse {
            success: true,
            users,
            total,
        })),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

pub async fn update_role_handler(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(user_id): Path<String>,
    payload: Result<Json<RoleUpdateRequest>, JsonRejection>,
) -> Result<Json<RoleUpdateResponse>, ApiError> {
    principal.require(&[Role::Admin])?;

    let body = json_body(payload)?;
    let role: Role = required("role", body.role)?.parse().map_err(ApiError::BadRequest)?;

    match state.store.update_user_role(&user_id, role.as_str(), &principal.user_id).await? {
        Some(change) => {
            tracing::info!(
                "{} changed role of {} from {} to {}",
                principal.user_id, change.user_id, change.old_role, change.new_role
            );
            Ok(Json(RoleUpdateResponse {
                success: true,
                user_id: change.user_id,
                old_role: change.old_role,
                new_role: change.new_role,
            }))
        }
        None => Err(ApiError::NotFound(format!("user {} not found", user_id))),
    }
}

pub async fn deployment_history_handler(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<Deployment>>, ApiError> {
    let limit = clamp_i64(params.limit.unwrap_or(20), 1, MAX_PAGE);
    let environment = params.environment.as_deref().map(str::trim).filter(|e| !e.is_empty());

    let history = state.store.deployment_history(environment, limit).await?;
    Ok(Json(history))
}

pub async fn record_deployment_handler(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    payload: Result<Json<DeploymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Deployment>), ApiError> {
    principal.require(&[Role::Admin, Role::Developer])?;

    let body = json_body(payload)?;
    let environment = required("environment", body.environment)?;
    let version = required("version", body.version)?;
    let status = match body.status.as_deref() {
        Some(raw) => DeploymentStatus::parse(raw.trim())
            .ok_or_else(|| ApiError::BadRequest(format!("unknown deployment status '{}'", raw)))?,
        None => DeploymentStatus::Success,
    };

    let deployment = state
        .store
        .record_deployment(&NewDeployment {
            environment,
            version,
            status,
            deployed_by: principal.user_id.clone(),
            commit_sha: body.commit_sha.filter(|s| !s.trim().is_empty()),
        })
        .await?;

    tracing::info!(
        "Recorded deployment {} of {} to {} by {}",
        deployment.id, deployment.version, deployment.environment, principal.user_id
    );
    Ok((StatusCode::CREATED, Json(deployment)))
}

pub async fn rollback_handler(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<String>,
    payload: Option<Json<RollbackRequest>>,
) -> Result<Json<RollbackResponse>, ApiError> {
    principal.require(&[Role::Admin, Role::Developer])?;

    let id = Uuid::parse_str(id.trim()).map_err(|_| ApiError::BadRequest(format!("invalid deployment id '{}'", id)))?;
    let reason = payload.and_then(|Json(body)| body.reason);

    let rollback = state
        .store
        .rollback_deployment(id, &principal.user_id, reason.as_deref())
        .await?;

    tracing::info!(
        "{} rolled back {} in {}: {} -> {}",
        principal.user_id,
        rollback.rolled_back.id,
        rollback.deployment.environment,
        rollback.rolled_back.version,
        rollback.deployment.version
    );
    Ok(Json(RollbackResponse {
        success: true,
        rolled_back: rollback.rolled_back,
        deployment: rollback.deployment,
    }))
}

/// Latest snapshot with the alerts the configured thresholds raise for it.
pub async fn get_usage_handler(State(state): State<AppState>) -> Result<Json<UsageReport>, ApiError> {
    match state.store.latest_usage().await? {
        Some(snapshot) => {
            let alerts = alerts::evaluate(&snapshot, &state.settings.thresholds);
            Ok(Json(UsageReport { snapshot, alerts }))
        }
        None => Err(ApiError::NotFound("no usage snapshot recorded yet".to_string())),
    }
}

pub async fn put_usage_handler(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    payload: Result<Json<UsageSnapshot>, JsonRejection>,
) -> Result<Json<UsageReport>, ApiError> {
    let snapshot = json_body(payload)?;

    let fields = [
        ("hosting_bandwidth_used", snapshot.hosting_bandwidth_used),
        ("hosting_bandwidth_limit", snapshot.hosting_bandwidth_limit),
        ("firestore_reads_used", snapshot.firestore_reads_used),
        ("firestore_reads_limit", snapshot.firestore_reads_limit),
        ("billing_current", snapshot.billing_current),
        ("billing_budget", snapshot.billing_budget),
    ];
    if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite() || *v < 0.0) {
        return Err(ApiError::BadRequest(format!("{} must be a non-negative number", name)));
    }

    if let Err(e) = state.store.save_usage(&snapshot).await {
        tracing::warn!("Failed to store usage snapshot from {}: {}", principal.user_id, e);
    }

    let alerts = alerts::evaluate(&snapshot, &state.settings.thresholds);
    if !alerts.is_empty() {
        tracing::warn!("Usage snapshot raised {} alert(s)", alerts.len());
    }

    Ok(Json(UsageReport { snapshot, alerts }))
}
