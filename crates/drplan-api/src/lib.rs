//! drplan-api — REST API for the recovery orchestration engine.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/protection-groups` | List protection groups |
//! | POST | `/api/v1/protection-groups` | Create a protection group |
//! | GET | `/api/v1/protection-groups/{id}` | Get a protection group |
//! | DELETE | `/api/v1/protection-groups/{id}` | Delete a protection group |
//! | GET | `/api/v1/recovery-plans` | List recovery plans |
//! | POST | `/api/v1/recovery-plans` | Create a recovery plan |
//! | GET | `/api/v1/recovery-plans/{id}` | Get a recovery plan |
//! | GET | `/api/v1/executions` | List executions |
//! | POST | `/api/v1/executions` | Start a plan execution |
//! | GET | `/api/v1/executions/{id}` | Get execution state |
//! | POST | `/api/v1/executions/{id}/pause` | Pause between waves |
//! | POST | `/api/v1/executions/{id}/resume` | Resume a parked execution |
//! | POST | `/api/v1/executions/{id}/cancel` | Cancel an execution |
//! | GET | `/api/v1/accounts/{id}/capacity` | Fresh capacity snapshot |

pub mod execution_handlers;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use drplan_admission::{ConflictDetector, QuotaValidator};
use drplan_capacity::{CapacityTracker, Topology};
use drplan_orchestrator::Orchestrator;
use drplan_remote::ServiceFactory;
use drplan_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub validator: Arc<QuotaValidator>,
    pub detector: Arc<ConflictDetector>,
    pub orchestrator: Arc<Orchestrator>,
    pub tracker: Arc<CapacityTracker>,
    pub topology: Topology,
}

impl ApiState {
    /// Wire up the full handler stack over one store and service factory.
    pub fn new(
        store: StateStore,
        factory: Arc<dyn ServiceFactory>,
        topology: Topology,
    ) -> Self {
        let account_id = topology.target_account.clone();
        Self {
            validator: Arc::new(QuotaValidator::new(
                factory.clone(),
                store.clone(),
                &account_id,
            )),
            detector: Arc::new(ConflictDetector::new(
                factory.clone(),
                store.clone(),
                &account_id,
            )),
            orchestrator: Arc::new(Orchestrator::new(
                store.clone(),
                factory.clone(),
                &account_id,
            )),
            tracker: Arc::new(CapacityTracker::new(factory)),
            store,
            topology,
        }
    }
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route(
            "/protection-groups",
            get(handlers::list_protection_groups).post(handlers::create_protection_group),
        )
        .route(
            "/protection-groups/{id}",
            get(handlers::get_protection_group).delete(handlers::delete_protection_group),
        )
        .route(
            "/recovery-plans",
            get(handlers::list_recovery_plans).post(handlers::create_recovery_plan),
        )
        .route("/recovery-plans/{id}", get(handlers::get_recovery_plan))
        .route(
            "/executions",
            get(execution_handlers::list_executions).post(execution_handlers::create_execution),
        )
        .route("/executions/{id}", get(execution_handlers::get_execution))
        .route(
            "/executions/{id}/pause",
            post(execution_handlers::pause_execution),
        )
        .route(
            "/executions/{id}/resume",
            post(execution_handlers::resume_execution),
        )
        .route(
            "/executions/{id}/cancel",
            post(execution_handlers::cancel_execution),
        )
        .route(
            "/accounts/{id}/capacity",
            get(execution_handlers::get_capacity),
        )
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use axum::response::Response;
    use drplan_remote::mock::{MockFactory, MockRecoveryService};

    pub fn test_state() -> (ApiState, Arc<MockRecoveryService>) {
        let mock = MockRecoveryService::new();
        let factory = MockFactory::new(mock.clone());
        let store = StateStore::open_in_memory().unwrap();
        let topology = Topology {
            target_account: "111122223333".to_string(),
            staging_accounts: Vec::new(),
            regions: vec!["us-east-1".to_string()],
        };
        (ApiState::new(store, factory, topology), mock)
    }

    pub async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
