//! Handlers for protection groups and recovery plans.
//!
//! Rejection bodies carry a machine-readable `error` code plus the
//! violating quantity, limit, and an actionable recommendation.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use drplan_admission::{AdmissionError, Warning};
use drplan_admission::resolve;
use drplan_core::{validate_name, ProtectionGroup, RecoveryPlan, ServerSelection, Wave};
use drplan_state::StateError;

use crate::ApiState;

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub(crate) fn error_body(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

/// Map admission failures onto the wire contract.
pub(crate) fn admission_error_response(e: AdmissionError) -> Response {
    match e {
        AdmissionError::QuotaExceeded {
            quota_type,
            count,
            max,
            recommendation,
            wave_breakdown,
        } => {
            let mut body = json!({
                "error": "QUOTA_EXCEEDED",
                "quotaType": quota_type,
                "serverCount": count,
                "maxServers": max,
                "recommendation": recommendation,
            });
            if !wave_breakdown.is_empty() {
                body["waveBreakdown"] = json!(wave_breakdown);
            }
            error_body(StatusCode::BAD_REQUEST, body)
        }
        AdmissionError::Validation(e) => error_body(
            StatusCode::BAD_REQUEST,
            json!({ "error": "VALIDATION_ERROR", "message": e.to_string() }),
        ),
        AdmissionError::UnknownGroup(id) => error_body(
            StatusCode::BAD_REQUEST,
            json!({ "error": "UNKNOWN_GROUP", "message": format!("unknown protection group '{id}'") }),
        ),
        AdmissionError::Remote(e) => error_body(
            StatusCode::BAD_GATEWAY,
            json!({ "error": "REMOTE_UNAVAILABLE", "message": e.to_string() }),
        ),
        AdmissionError::State(e) => error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "INTERNAL", "message": e.to_string() }),
        ),
    }
}

fn state_error_response(e: StateError) -> Response {
    match e {
        StateError::NameTaken(name) => error_body(
            StatusCode::CONFLICT,
            json!({ "error": "NAME_TAKEN", "message": format!("name '{name}' is already in use") }),
        ),
        StateError::GroupInUse { group_id, plan_ids } => error_body(
            StatusCode::CONFLICT,
            json!({
                "error": "GROUP_IN_USE",
                "message": format!("protection group '{group_id}' is referenced by existing plans"),
                "planIds": plan_ids,
            }),
        ),
        StateError::UnknownGroup(id) => error_body(
            StatusCode::BAD_REQUEST,
            json!({ "error": "UNKNOWN_GROUP", "message": format!("unknown protection group '{id}'") }),
        ),
        StateError::NotFound(what) => error_body(
            StatusCode::NOT_FOUND,
            json!({ "error": "NOT_FOUND", "message": what }),
        ),
        other => error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "INTERNAL", "message": other.to_string() }),
        ),
    }
}

// ── Protection groups ──────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    pub region: String,
    pub selection: ServerSelection,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResponse {
    #[serde(flatten)]
    pub group: ProtectionGroup,
    pub server_count: usize,
}

/// POST /api/v1/protection-groups
pub async fn create_protection_group(
    State(state): State<ApiState>,
    Json(req): Json<CreateGroupRequest>,
) -> Response {
    if let Err(e) = validate_name(&req.name) {
        return admission_error_response(AdmissionError::Validation(e));
    }
    let server_count = match state
        .validator
        .validate_group_size(&req.region, &req.selection)
        .await
    {
        Ok(count) => count,
        Err(e) => return admission_error_response(e),
    };

    let now = epoch_secs();
    let group = ProtectionGroup {
        id: Uuid::new_v4().to_string(),
        name: req.name,
        region: req.region,
        selection: req.selection,
        created_at: now,
        updated_at: now,
    };
    match state.store.create_protection_group(&group) {
        Ok(()) => {
            info!(group_id = %group.id, server_count, "protection group created");
            (StatusCode::CREATED, Json(GroupResponse { group, server_count })).into_response()
        }
        Err(e) => state_error_response(e),
    }
}

/// GET /api/v1/protection-groups
pub async fn list_protection_groups(State(state): State<ApiState>) -> Response {
    match state.store.list_protection_groups() {
        Ok(groups) => Json(groups).into_response(),
        Err(e) => state_error_response(e),
    }
}

/// GET /api/v1/protection-groups/{id}
pub async fn get_protection_group(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get_protection_group(&id) {
        Ok(Some(group)) => Json(group).into_response(),
        Ok(None) => error_body(
            StatusCode::NOT_FOUND,
            json!({ "error": "NOT_FOUND", "message": format!("protection group '{id}'") }),
        ),
        Err(e) => state_error_response(e),
    }
}

/// DELETE /api/v1/protection-groups/{id}
///
/// Rejected with 409 while any recovery plan still references the group.
pub async fn delete_protection_group(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.delete_protection_group(&id) {
        Ok(true) => Json(json!({ "deleted": true })).into_response(),
        Ok(false) => error_body(
            StatusCode::NOT_FOUND,
            json!({ "error": "NOT_FOUND", "message": format!("protection group '{id}'") }),
        ),
        Err(e) => state_error_response(e),
    }
}

// ── Recovery plans ─────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlanRequest {
    pub name: String,
    pub waves: Vec<Wave>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    #[serde(flatten)]
    pub plan: RecoveryPlan,
    pub warnings: Vec<Warning>,
}

/// POST /api/v1/recovery-plans
///
/// Hard quota and structural violations reject with 400; advisory
/// conditions (concurrent-job saturation, server conflicts) are returned
/// as `warnings` on the 201 because they can clear before execution.
pub async fn create_recovery_plan(
    State(state): State<ApiState>,
    Json(req): Json<CreatePlanRequest>,
) -> Response {
    if let Err(e) = validate_name(&req.name) {
        return admission_error_response(AdmissionError::Validation(e));
    }
    let now = epoch_secs();
    let plan = RecoveryPlan {
        id: Uuid::new_v4().to_string(),
        name: req.name,
        waves: req.waves,
        created_at: now,
        updated_at: now,
    };
    if let Err(e) = state.validator.validate_plan_waves(&plan).await {
        return admission_error_response(e);
    }
    if let Err(e) = state.store.create_recovery_plan(&plan) {
        return state_error_response(e);
    }

    let mut warnings = Vec::new();
    if let Ok(regions) = resolve::wave_regions(&state.store, &plan.waves) {
        for region in regions {
            if let Some(warning) = state.validator.concurrency_advisory(&region).await {
                warnings.push(warning);
            }
        }
    }
    if let Some(warning) = state
        .validator
        .server_conflicts_advisory(&state.detector, &plan)
        .await
    {
        warnings.push(warning);
    }

    info!(plan_id = %plan.id, waves = plan.waves.len(), warnings = warnings.len(), "recovery plan created");
    (StatusCode::CREATED, Json(PlanResponse { plan, warnings })).into_response()
}

/// GET /api/v1/recovery-plans
pub async fn list_recovery_plans(State(state): State<ApiState>) -> Response {
    match state.store.list_recovery_plans() {
        Ok(plans) => Json(plans).into_response(),
        Err(e) => state_error_response(e),
    }
}

/// GET /api/v1/recovery-plans/{id}
pub async fn get_recovery_plan(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.store.get_recovery_plan(&id) {
        Ok(Some(plan)) => Json(plan).into_response(),
        Ok(None) => error_body(
            StatusCode::NOT_FOUND,
            json!({ "error": "NOT_FOUND", "message": format!("recovery plan '{id}'") }),
        ),
        Err(e) => state_error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{body_json, test_state};
    use std::collections::BTreeSet;

    fn explicit_selection(n: usize) -> ServerSelection {
        ServerSelection::Explicit {
            server_ids: (0..n).map(|i| format!("s-{i}")).collect(),
        }
    }

    fn group_request(name: &str, n: usize) -> CreateGroupRequest {
        CreateGroupRequest {
            name: name.to_string(),
            region: "us-east-1".to_string(),
            selection: explicit_selection(n),
        }
    }

    fn wave_over(id: &str, group_id: &str) -> Wave {
        Wave {
            id: id.to_string(),
            name: id.to_string(),
            protection_group_ids: vec![group_id.to_string()],
            depends_on: BTreeSet::new(),
            pause_before: false,
        }
    }

    #[tokio::test]
    async fn group_of_100_returns_201() {
        let (state, _mock) = test_state();
        let resp =
            create_protection_group(State(state), Json(group_request("db-tier", 100))).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = body_json(resp).await;
        assert_eq!(body["serverCount"], 100);
        assert_eq!(body["name"], "db-tier");
        assert_eq!(body["selection"]["type"], "explicit");
    }

    #[tokio::test]
    async fn group_of_101_returns_quota_error() {
        let (state, _mock) = test_state();
        let resp =
            create_protection_group(State(state), Json(group_request("db-tier", 101))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "QUOTA_EXCEEDED");
        assert_eq!(body["quotaType"], "servers_per_job");
        assert_eq!(body["serverCount"], 101);
        assert_eq!(body["maxServers"], 100);
        assert!(body["recommendation"].as_str().unwrap().contains("split"));
    }

    #[tokio::test]
    async fn empty_name_rejected() {
        let (state, _mock) = test_state();
        let resp = create_protection_group(State(state), Json(group_request("", 1))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn duplicate_group_name_conflicts() {
        let (state, _mock) = test_state();
        let resp = create_protection_group(State(state.clone()), Json(group_request("web", 1)))
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = create_protection_group(State(state), Json(group_request("WEB", 1))).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "NAME_TAKEN");
    }

    #[tokio::test]
    async fn get_and_delete_group_roundtrip() {
        let (state, _mock) = test_state();
        let resp = create_protection_group(State(state.clone()), Json(group_request("web", 2)))
            .await;
        let id = body_json(resp).await["id"].as_str().unwrap().to_string();

        let resp = get_protection_group(State(state.clone()), Path(id.clone())).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = delete_protection_group(State(state.clone()), Path(id.clone())).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = get_protection_group(State(state), Path(id)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_referenced_group_returns_409() {
        let (state, _mock) = test_state();
        let resp = create_protection_group(State(state.clone()), Json(group_request("web", 2)))
            .await;
        let group_id = body_json(resp).await["id"].as_str().unwrap().to_string();

        let req = CreatePlanRequest {
            name: "failover".to_string(),
            waves: vec![wave_over("w1", &group_id)],
        };
        let resp = create_recovery_plan(State(state.clone()), Json(req)).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = delete_protection_group(State(state), Path(group_id)).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "GROUP_IN_USE");
        assert_eq!(body["planIds"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn six_full_waves_rejected_with_breakdown() {
        let (state, _mock) = test_state();
        let mut waves = Vec::new();
        for i in 0..6 {
            let resp = create_protection_group(
                State(state.clone()),
                Json(group_request(&format!("tier-{i}"), 100)),
            )
            .await;
            let group_id = body_json(resp).await["id"].as_str().unwrap().to_string();
            waves.push(wave_over(&format!("w{i}"), &group_id));
        }

        let req = CreatePlanRequest {
            name: "everything-at-once".to_string(),
            waves,
        };
        let resp = create_recovery_plan(State(state), Json(req)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "QUOTA_EXCEEDED");
        assert_eq!(body["quotaType"], "total_servers_in_jobs");
        assert_eq!(body["serverCount"], 600);
        assert_eq!(body["maxServers"], 500);
        let breakdown = body["waveBreakdown"].as_array().unwrap();
        assert_eq!(breakdown.len(), 6);
        assert_eq!(breakdown[0]["serverCount"], 100);
    }

    #[tokio::test]
    async fn cyclic_plan_rejected() {
        let (state, _mock) = test_state();
        let resp = create_protection_group(State(state.clone()), Json(group_request("web", 1)))
            .await;
        let group_id = body_json(resp).await["id"].as_str().unwrap().to_string();

        let mut wave = wave_over("w1", &group_id);
        wave.depends_on = BTreeSet::from(["w1".to_string()]);
        let req = CreatePlanRequest {
            name: "cyclic".to_string(),
            waves: vec![wave],
        };
        let resp = create_recovery_plan(State(state), Json(req)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn saturated_region_yields_advisory_warning() {
        let (state, mock) = test_state();
        for i in 0..20 {
            mock.add_external_job("us-east-1", &format!("ext-{i}"), vec![format!("x-{i}")]);
        }
        let resp = create_protection_group(State(state.clone()), Json(group_request("web", 1)))
            .await;
        let group_id = body_json(resp).await["id"].as_str().unwrap().to_string();

        let req = CreatePlanRequest {
            name: "failover".to_string(),
            waves: vec![wave_over("w1", &group_id)],
        };
        let resp = create_recovery_plan(State(state), Json(req)).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = body_json(resp).await;
        let warnings = body["warnings"].as_array().unwrap();
        assert_eq!(warnings[0]["code"], "CONCURRENT_JOBS_AT_LIMIT");
        assert_eq!(warnings[0]["canExecuteNow"], false);
    }
}
