//! Handlers for executions and capacity snapshots.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use drplan_capacity::Topology;
use drplan_core::ExecutionOptions;
use drplan_orchestrator::OrchestratorError;

use crate::handlers::{admission_error_response, error_body};
use crate::ApiState;

fn orchestrator_error_response(e: OrchestratorError) -> Response {
    match e {
        OrchestratorError::ConflictsDetected(conflicts) => error_body(
            StatusCode::CONFLICT,
            json!({
                "error": "SERVER_CONFLICTS_DETECTED",
                "conflicts": conflicts,
            }),
        ),
        OrchestratorError::UnknownPlan(id) => error_body(
            StatusCode::NOT_FOUND,
            json!({ "error": "NOT_FOUND", "message": format!("recovery plan '{id}'") }),
        ),
        OrchestratorError::UnknownExecution(id) => error_body(
            StatusCode::NOT_FOUND,
            json!({ "error": "NOT_FOUND", "message": format!("execution '{id}'") }),
        ),
        OrchestratorError::AlreadyTerminal(id) => error_body(
            StatusCode::CONFLICT,
            json!({ "error": "ALREADY_TERMINAL", "message": format!("execution '{id}' is already terminal") }),
        ),
        OrchestratorError::NothingToPause(id) => error_body(
            StatusCode::CONFLICT,
            json!({ "error": "NOTHING_TO_PAUSE", "message": format!("execution '{id}' has no wave left to pause before") }),
        ),
        OrchestratorError::NotWaiting(id) => error_body(
            StatusCode::CONFLICT,
            json!({ "error": "NOT_WAITING", "message": format!("execution '{id}' is not waiting for resume") }),
        ),
        OrchestratorError::TokenMismatch(_) => error_body(
            StatusCode::CONFLICT,
            json!({ "error": "TOKEN_MISMATCH", "message": "resume token does not match" }),
        ),
        OrchestratorError::Admission(e) => admission_error_response(e),
        OrchestratorError::State(e) => error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "INTERNAL", "message": e.to_string() }),
        ),
        OrchestratorError::Remote(e) => error_body(
            StatusCode::BAD_GATEWAY,
            json!({ "error": "REMOTE_UNAVAILABLE", "message": e.to_string() }),
        ),
    }
}

// ── Executions ─────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExecutionRequest {
    pub plan_id: String,
    #[serde(default)]
    pub options: ExecutionOptions,
}

/// POST /api/v1/executions
///
/// Runs a fresh full-plan conflict check; any conflict rejects with the
/// complete list. Accepted executions are advanced by the orchestrator
/// loop, not inline.
pub async fn create_execution(
    State(state): State<ApiState>,
    Json(req): Json<StartExecutionRequest>,
) -> Response {
    match state.orchestrator.start(&req.plan_id, req.options).await {
        Ok(execution) => {
            info!(execution_id = %execution.id, plan_id = %req.plan_id, "execution accepted");
            (
                StatusCode::ACCEPTED,
                Json(json!({ "executionId": execution.id, "status": execution.status })),
            )
                .into_response()
        }
        Err(e) => orchestrator_error_response(e),
    }
}

/// GET /api/v1/executions
pub async fn list_executions(State(state): State<ApiState>) -> Response {
    match state.store.list_executions() {
        Ok(executions) => Json(executions).into_response(),
        Err(e) => error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "INTERNAL", "message": e.to_string() }),
        ),
    }
}

/// GET /api/v1/executions/{id}
pub async fn get_execution(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.store.get_execution(&id) {
        Ok(Some(execution)) => Json(execution).into_response(),
        Ok(None) => error_body(
            StatusCode::NOT_FOUND,
            json!({ "error": "NOT_FOUND", "message": format!("execution '{id}'") }),
        ),
        Err(e) => error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "INTERNAL", "message": e.to_string() }),
        ),
    }
}

/// POST /api/v1/executions/{id}/pause
///
/// Parks the execution ahead of its next pending wave and returns the
/// resume token.
pub async fn pause_execution(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.orchestrator.pause(&id) {
        Ok(execution) => match execution.waiting {
            Some(gate) => Json(json!({
                "executionId": execution.id,
                "waveId": gate.wave_id,
                "token": gate.token,
                "pausedAt": gate.paused_at,
            }))
            .into_response(),
            None => error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "INTERNAL", "message": "pause did not record a gate" }),
            ),
        },
        Err(e) => orchestrator_error_response(e),
    }
}

#[derive(Deserialize)]
pub struct ResumeRequest {
    pub token: String,
}

/// POST /api/v1/executions/{id}/resume
pub async fn resume_execution(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<ResumeRequest>,
) -> Response {
    match state.orchestrator.resume(&id, &req.token) {
        Ok(execution) => Json(execution).into_response(),
        Err(e) => orchestrator_error_response(e),
    }
}

/// POST /api/v1/executions/{id}/cancel
pub async fn cancel_execution(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.orchestrator.cancel(&id) {
        Ok(execution) => (
            StatusCode::ACCEPTED,
            Json(json!({ "executionId": execution.id, "cancelRequested": true })),
        )
            .into_response(),
        Err(e) => orchestrator_error_response(e),
    }
}

// ── Capacity ───────────────────────────────────────────────────────

/// GET /api/v1/accounts/{id}/capacity
///
/// Computed fresh per request. Asking about the configured target
/// account sweeps the full topology including staging accounts; any other
/// account is swept alone across the configured regions.
pub async fn get_capacity(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let topology = if id == state.topology.target_account {
        state.topology.clone()
    } else {
        Topology {
            target_account: id,
            staging_accounts: Vec::new(),
            regions: state.topology.regions.clone(),
        }
    };
    let snapshot = state.tracker.combined_capacity(&topology).await;
    Json(snapshot).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{create_protection_group, create_recovery_plan, CreateGroupRequest, CreatePlanRequest};
    use crate::test_support::{body_json, test_state};
    use drplan_core::{ServerSelection, Wave};
    use drplan_remote::mock::replicating_server;
    use std::collections::BTreeSet;

    async fn seed_plan(state: &ApiState, name: &str, servers: &[&str]) -> String {
        let resp = create_protection_group(
            State(state.clone()),
            Json(CreateGroupRequest {
                name: format!("{name}-group"),
                region: "us-east-1".to_string(),
                selection: ServerSelection::Explicit {
                    server_ids: servers.iter().map(|s| s.to_string()).collect(),
                },
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let group_id = body_json(resp).await["id"].as_str().unwrap().to_string();

        let resp = create_recovery_plan(
            State(state.clone()),
            Json(CreatePlanRequest {
                name: name.to_string(),
                waves: vec![Wave {
                    id: "w1".to_string(),
                    name: "wave 1".to_string(),
                    protection_group_ids: vec![group_id],
                    depends_on: BTreeSet::new(),
                    pause_before: false,
                }],
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        body_json(resp).await["id"].as_str().unwrap().to_string()
    }

    fn start_request(plan_id: &str) -> StartExecutionRequest {
        StartExecutionRequest {
            plan_id: plan_id.to_string(),
            options: ExecutionOptions::default(),
        }
    }

    #[tokio::test]
    async fn execution_accepted_with_202() {
        let (state, _mock) = test_state();
        let plan_id = seed_plan(&state, "failover", &["s-1"]).await;

        let resp = create_execution(State(state.clone()), Json(start_request(&plan_id))).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body = body_json(resp).await;
        let execution_id = body["executionId"].as_str().unwrap().to_string();
        assert_eq!(body["status"], "PENDING");

        let resp = get_execution(State(state), Path(execution_id)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["waves"][0]["status"], "PENDING");
    }

    #[tokio::test]
    async fn conflicting_execution_rejected_with_409() {
        let (state, _mock) = test_state();
        let plan_a = seed_plan(&state, "first", &["s-1"]).await;
        let plan_b = seed_plan(&state, "second", &["s-1", "s-2"]).await;

        let resp = create_execution(State(state.clone()), Json(start_request(&plan_a))).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let resp = create_execution(State(state), Json(start_request(&plan_b))).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "SERVER_CONFLICTS_DETECTED");
        let conflicts = body["conflicts"].as_array().unwrap();
        assert_eq!(conflicts[0]["serverId"], "s-1");
        assert_eq!(conflicts[0]["conflictSource"], "execution");
    }

    #[tokio::test]
    async fn unknown_plan_is_404() {
        let (state, _mock) = test_state();
        let resp = create_execution(State(state), Json(start_request("nope"))).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn pause_resume_roundtrip() {
        let (state, _mock) = test_state();
        let plan_id = seed_plan(&state, "failover", &["s-1"]).await;
        let resp = create_execution(State(state.clone()), Json(start_request(&plan_id))).await;
        let execution_id = body_json(resp).await["executionId"]
            .as_str()
            .unwrap()
            .to_string();

        let resp = pause_execution(State(state.clone()), Path(execution_id.clone())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        let token = body["token"].as_str().unwrap().to_string();
        assert_eq!(body["waveId"], "w1");

        let resp = resume_execution(
            State(state.clone()),
            Path(execution_id.clone()),
            Json(ResumeRequest {
                token: "wrong".to_string(),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "TOKEN_MISMATCH");

        let resp = resume_execution(
            State(state),
            Path(execution_id),
            Json(ResumeRequest { token }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert!(body.get("waiting").is_none());
    }

    #[tokio::test]
    async fn cancel_returns_202_and_terminal_cancel_conflicts() {
        let (state, _mock) = test_state();
        let plan_id = seed_plan(&state, "failover", &["s-1"]).await;
        let resp = create_execution(State(state.clone()), Json(start_request(&plan_id))).await;
        let execution_id = body_json(resp).await["executionId"]
            .as_str()
            .unwrap()
            .to_string();

        let resp = cancel_execution(State(state.clone()), Path(execution_id.clone())).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        state.orchestrator.tick(&execution_id).await.unwrap();
        let resp = cancel_execution(State(state), Path(execution_id)).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn capacity_snapshot_reports_the_topology() {
        let (state, mock) = test_state();
        let servers: Vec<_> = (0..200)
            .map(|i| replicating_server(&format!("s-{i}"), "111122223333"))
            .collect();
        mock.set_inventory("111122223333", "us-east-1", servers);

        let resp = get_capacity(State(state), Path("111122223333".to_string())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "INFO");
        assert_eq!(body["accounts"][0]["activeRegions"], 1);
        assert_eq!(body["accounts"][0]["availableSlots"], 100);
    }

    #[tokio::test]
    async fn capacity_for_other_account_sweeps_it_alone() {
        let (state, mock) = test_state();
        mock.set_inventory(
            "999988887777",
            "us-east-1",
            vec![replicating_server("s-1", "999988887777")],
        );

        let resp = get_capacity(State(state), Path("999988887777".to_string())).await;
        let body = body_json(resp).await;
        assert_eq!(body["accounts"].as_array().unwrap().len(), 1);
        assert_eq!(body["accounts"][0]["accountId"], "999988887777");
    }
}
