//! Instance lifecycle routes
//!
//! Discovery endpoints serve public views; participant endpoints serve the
//! richer view with the confidentiality boundary applied at construction.
//! Transcript turns are internal and have no route. Guard conflicts from
//! the store surface as 409s; the caller retries or gives up, nothing is
//! locked.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use parley_engine::terminal_event_for;
use parley_types::{
    CommitInstance, CreateInstance, InstanceStatus, ParticipantInstanceView, ProgressEvent,
    PublicInstanceView,
};

use crate::auth::{CallerIdentity, OptionalIdentity};
use crate::error::ApiError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/instances", post(create_instance).get(list_instances))
        .route("/instances/mine", get(my_instances))
        .route("/instances/:id", get(get_instance).delete(cancel_instance))
        .route("/instances/:id/commit", post(commit_instance))
        .route("/instances/:id/run", post(run_instance))
        .route("/instances/:id/stream", get(stream_instance))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        database: state.db.health_check().await,
    })
}

#[derive(Serialize)]
struct CreatedResponse {
    id: String,
    status: InstanceStatus,
    buyer_address: String,
}

async fn create_instance(
    State(state): State<AppState>,
    CallerIdentity(address): CallerIdentity,
    Json(input): Json<CreateInstance>,
) -> Result<Json<CreatedResponse>, ApiError> {
    if input.buyer_requirement.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "buyer_requirement must not be empty".to_string(),
        ));
    }
    if !input.max_payment.is_finite() || input.max_payment <= 0.0 {
        return Err(ApiError::BadRequest(
            "max_payment must be positive".to_string(),
        ));
    }
    if input.max_turns == Some(0) {
        return Err(ApiError::BadRequest(
            "max_turns must be at least 1".to_string(),
        ));
    }

    let instance = state.db.instance_repo().create(&input, &address).await?;

    Ok(Json(CreatedResponse {
        id: instance.id,
        status: instance.status,
        buyer_address: instance.buyer_address,
    }))
}

#[derive(Deserialize)]
struct ListQuery {
    status: Option<String>,
}

#[derive(Serialize)]
struct InstanceListResponse {
    instances: Vec<PublicInstanceView>,
}

async fn list_instances(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<InstanceListResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<InstanceStatus>)
        .transpose()
        .map_err(|_| ApiError::BadRequest("Invalid status filter".to_string()))?;

    let instances = state.db.instance_repo().list(status).await?;

    Ok(Json(InstanceListResponse {
        instances: instances.iter().map(PublicInstanceView::from_instance).collect(),
    }))
}

#[derive(Serialize)]
struct MyInstancesResponse {
    as_buyer: Vec<ParticipantInstanceView>,
    as_seller: Vec<ParticipantInstanceView>,
}

async fn my_instances(
    State(state): State<AppState>,
    CallerIdentity(address): CallerIdentity,
) -> Result<Json<MyInstancesResponse>, ApiError> {
    let (as_buyer, as_seller) = state.db.instance_repo().list_by_address(&address).await?;

    Ok(Json(MyInstancesResponse {
        as_buyer: as_buyer
            .iter()
            .map(|i| ParticipantInstanceView::for_viewer(i, &address))
            .collect(),
        as_seller: as_seller
            .iter()
            .map(|i| ParticipantInstanceView::for_viewer(i, &address))
            .collect(),
    }))
}

/// Participants get the full view, everyone else the public one
#[derive(Serialize)]
#[serde(untagged)]
enum InstanceViewResponse {
    Participant(ParticipantInstanceView),
    Public(PublicInstanceView),
}

async fn get_instance(
    State(state): State<AppState>,
    OptionalIdentity(address): OptionalIdentity,
    Path(id): Path<String>,
) -> Result<Json<InstanceViewResponse>, ApiError> {
    let instance = state
        .db
        .instance_repo()
        .find_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Instance not found".to_string()))?;

    let view = match address {
        Some(ref address) if instance.is_participant(address) => {
            InstanceViewResponse::Participant(ParticipantInstanceView::for_viewer(
                &instance, address,
            ))
        }
        _ => InstanceViewResponse::Public(PublicInstanceView::from_instance(&instance)),
    };

    Ok(Json(view))
}

#[derive(Serialize)]
struct TransitionResponse {
    id: String,
    status: InstanceStatus,
}

async fn commit_instance(
    State(state): State<AppState>,
    CallerIdentity(address): CallerIdentity,
    Path(id): Path<String>,
    Json(input): Json<CommitInstance>,
) -> Result<Json<TransitionResponse>, ApiError> {
    if input.seller_info.trim().is_empty() || input.seller_proof.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "seller_info and seller_proof are required".to_string(),
        ));
    }

    let instances = state.db.instance_repo();
    let instance = instances
        .find_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Instance not found".to_string()))?;

    if instance.buyer_address == address {
        return Err(ApiError::Forbidden(
            "Cannot commit to your own instance".to_string(),
        ));
    }

    let committed = instances
        .commit(&id, &input, &address)
        .await?
        .ok_or_else(|| ApiError::Conflict("Instance not available for commitment".to_string()))?;

    Ok(Json(TransitionResponse {
        id: committed.id,
        status: committed.status,
    }))
}

async fn run_instance(
    State(state): State<AppState>,
    CallerIdentity(address): CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let instances = state.db.instance_repo();
    let instance = instances
        .find_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Instance not found".to_string()))?;

    if instance.buyer_address != address {
        return Err(ApiError::Forbidden(
            "Only the buyer can start the negotiation".to_string(),
        ));
    }
    if instance.status != InstanceStatus::Committed {
        return Err(ApiError::Conflict(
            "Instance must be in committed status".to_string(),
        ));
    }

    let usage = state.db.usage_repo();
    if usage.count_today(&address).await? >= state.config.max_negotiations_per_day {
        return Err(ApiError::RateLimited);
    }

    // The conditional write decides the race; a loser sees a conflict here
    let started = instances
        .start(&id, &address)
        .await?
        .ok_or_else(|| ApiError::Conflict("Instance not available to start".to_string()))?;

    usage.increment(&address).await?;

    state
        .runs
        .start(started.clone())
        .map_err(|e| ApiError::Conflict(e.to_string()))?;

    Ok(Json(TransitionResponse {
        id: started.id,
        status: started.status,
    }))
}

type EventStream = BoxStream<'static, Result<Event, Infallible>>;

async fn stream_instance(
    State(state): State<AppState>,
    CallerIdentity(address): CallerIdentity,
    Path(id): Path<String>,
) -> Result<Sse<EventStream>, ApiError> {
    let instance = state
        .db
        .instance_repo()
        .find_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Instance not found".to_string()))?;

    if !instance.is_participant(&address) {
        return Err(ApiError::Forbidden("Not a participant".to_string()));
    }

    let stream: EventStream = if let Some(rx) = state.runs.subscribe(&id) {
        relay_stream(rx, state.db.clone(), id)
    } else if let Some(terminal) = terminal_event_for(&instance) {
        // The run already finished; replay its recorded terminal event
        Box::pin(futures::stream::once(async move {
            Ok(to_sse_event(&terminal))
        }))
    } else {
        return Err(ApiError::Conflict("Instance is not running".to_string()));
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

#[derive(Serialize)]
struct DeletedResponse {
    deleted: bool,
}

async fn cancel_instance(
    State(state): State<AppState>,
    CallerIdentity(address): CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let deleted = state.db.instance_repo().delete(&id, &address).await?;
    if !deleted {
        return Err(ApiError::NotFound(
            "Instance not found or cannot be deleted".to_string(),
        ));
    }

    state.db.transcript_repo().purge(&id).await?;

    Ok(Json(DeletedResponse { deleted: true }))
}

fn relay_stream(
    mut rx: broadcast::Receiver<ProgressEvent>,
    db: parley_db::Database,
    id: String,
) -> EventStream {
    Box::pin(async_stream::stream! {
        let mut sent_terminal = false;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    yield Ok(to_sse_event(&event));
                    if terminal {
                        sent_terminal = true;
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        // A subscriber that attached between the terminal event and the run
        // task's deregistration sees a closed channel; replay the recorded
        // terminal state so the stream contract still holds.
        if !sent_terminal {
            if let Ok(Some(row)) = db.instance_repo().find_by_id(&id).await {
                if let Some(terminal) = terminal_event_for(&row) {
                    yield Ok(to_sse_event(&terminal));
                }
            }
        }
    })
}

fn to_sse_event(event: &ProgressEvent) -> Event {
    let data = serde_json::to_value(event)
        .ok()
        .and_then(|v| v.get("data").cloned())
        .unwrap_or(serde_json::Value::Null);

    Event::default().event(event.kind()).data(data.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::header::AUTHORIZATION;
    use axum::http::{HeaderValue, StatusCode};
    use axum_test::TestServer;
    use serde_json::{json, Value};

    use parley_db::Database;
    use parley_engine::{EngineConfig, NegotiationEngine, RunManager};
    use parley_llm::DeterministicProvider;

    use crate::auth::StaticTokenVerifier;
    use crate::config::ServerConfig;

    async fn test_server_with(
        provider: Arc<DeterministicProvider>,
        config: ServerConfig,
    ) -> (TestServer, Database) {
        let db = Database::in_memory().await.unwrap();
        let engine = Arc::new(NegotiationEngine::new(
            db.clone(),
            provider,
            EngineConfig::default(),
        ));
        let state = AppState {
            db: db.clone(),
            runs: Arc::new(RunManager::new(engine)),
            verifier: Arc::new(
                StaticTokenVerifier::new()
                    .with_token("buyer-token", "0xbuyer")
                    .with_token("seller-token", "0xseller")
                    .with_token("other-token", "0xother"),
            ),
            config: Arc::new(config),
        };

        (TestServer::new(router(state)).unwrap(), db)
    }

    async fn test_server(provider: Arc<DeterministicProvider>) -> (TestServer, Database) {
        test_server_with(provider, ServerConfig::default()).await
    }

    fn bearer(token: &str) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
    }

    async fn create_instance_as_buyer(server: &TestServer) -> String {
        let response = server
            .post("/instances")
            .add_header(AUTHORIZATION, bearer("buyer-token"))
            .json(&json!({
                "buyer_requirement": "X",
                "max_payment": 100.0,
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        response.json::<Value>()["id"].as_str().unwrap().to_string()
    }

    async fn commit_as_seller(server: &TestServer, id: &str) {
        let response = server
            .post(&format!("/instances/{id}/commit"))
            .add_header(AUTHORIZATION, bearer("seller-token"))
            .json(&json!({
                "seller_info": "Y",
                "seller_proof": "Z",
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_requires_auth_and_valid_input() {
        let (server, _db) = test_server(Arc::new(DeterministicProvider::new())).await;

        let response = server
            .post("/instances")
            .json(&json!({"buyer_requirement": "X", "max_payment": 100.0}))
            .await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

        let response = server
            .post("/instances")
            .add_header(AUTHORIZATION, bearer("buyer-token"))
            .json(&json!({"buyer_requirement": "X", "max_payment": -5.0}))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_self_commit_is_forbidden() {
        let (server, _db) = test_server(Arc::new(DeterministicProvider::new())).await;
        let id = create_instance_as_buyer(&server).await;

        let response = server
            .post(&format!("/instances/{id}/commit"))
            .add_header(AUTHORIZATION, bearer("buyer-token"))
            .json(&json!({"seller_info": "Y", "seller_proof": "Z"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_second_commit_conflicts() {
        let (server, _db) = test_server(Arc::new(DeterministicProvider::new())).await;
        let id = create_instance_as_buyer(&server).await;
        commit_as_seller(&server, &id).await;

        let response = server
            .post(&format!("/instances/{id}/commit"))
            .add_header(AUTHORIZATION, bearer("other-token"))
            .json(&json!({"seller_info": "Y2", "seller_proof": "Z2"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_run_guards() {
        let (server, _db) = test_server(Arc::new(DeterministicProvider::new())).await;
        let id = create_instance_as_buyer(&server).await;

        // Not committed yet
        let response = server
            .post(&format!("/instances/{id}/run"))
            .add_header(AUTHORIZATION, bearer("buyer-token"))
            .await;
        assert_eq!(response.status_code(), StatusCode::CONFLICT);

        commit_as_seller(&server, &id).await;

        // Only the buyer may start
        let response = server
            .post(&format!("/instances/{id}/run"))
            .add_header(AUTHORIZATION, bearer("seller-token"))
            .await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_daily_limit_blocks_run() {
        let config = ServerConfig {
            max_negotiations_per_day: 0,
            ..ServerConfig::default()
        };
        let (server, _db) =
            test_server_with(Arc::new(DeterministicProvider::new()), config).await;
        let id = create_instance_as_buyer(&server).await;
        commit_as_seller(&server, &id).await;

        let response = server
            .post(&format!("/instances/{id}/run"))
            .add_header(AUTHORIZATION, bearer("buyer-token"))
            .await;
        assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_full_negotiation_reveals_info_to_buyer_only() {
        let provider = Arc::new(DeterministicProvider::with_script([
            "Premium insight available.",
            "DECISION: ACCEPT $80 - good value",
        ]));
        let (server, db) = test_server(provider).await;

        let id = create_instance_as_buyer(&server).await;
        commit_as_seller(&server, &id).await;

        let response = server
            .post(&format!("/instances/{id}/run"))
            .add_header(AUTHORIZATION, bearer("buyer-token"))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.json::<Value>()["status"], "running");

        // The run completes in the background
        let repo = db.instance_repo();
        let mut completed = false;
        for _ in 0..100 {
            let row = repo.find_by_id(&id).await.unwrap().unwrap();
            if row.status.is_terminal() {
                completed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(completed, "negotiation did not finish in time");

        // Buyer sees the confidential info
        let response = server
            .get(&format!("/instances/{id}"))
            .add_header(AUTHORIZATION, bearer("buyer-token"))
            .await;
        let body = response.json::<Value>();
        assert_eq!(body["outcome"], "ACCEPT");
        assert_eq!(body["final_price"], 80.0);
        assert_eq!(body["seller_info"], "Y");

        // Seller and public do not
        let response = server
            .get(&format!("/instances/{id}"))
            .add_header(AUTHORIZATION, bearer("seller-token"))
            .await;
        assert!(response.json::<Value>().get("seller_info").is_none());

        let response = server.get(&format!("/instances/{id}")).await;
        let body = response.json::<Value>();
        assert!(body.get("seller_info").is_none());
        assert!(body.get("outcome").is_none());

        // Late stream subscribers still get the terminal event
        let response = server
            .get(&format!("/instances/{id}/stream"))
            .add_header(AUTHORIZATION, bearer("buyer-token"))
            .await;
        let text = response.text();
        assert!(text.contains("event: complete"));
        assert!(text.contains("ACCEPT"));
    }

    #[tokio::test]
    async fn test_stream_requires_participant() {
        let provider = Arc::new(DeterministicProvider::new());
        let (server, _db) = test_server(provider).await;
        let id = create_instance_as_buyer(&server).await;

        let response = server
            .get(&format!("/instances/{id}/stream"))
            .add_header(AUTHORIZATION, bearer("other-token"))
            .await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

        // Participant, but nothing is running yet
        let response = server
            .get(&format!("/instances/{id}/stream"))
            .add_header(AUTHORIZATION, bearer("buyer-token"))
            .await;
        assert_eq!(response.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_cancel_before_commitment() {
        let (server, db) = test_server(Arc::new(DeterministicProvider::new())).await;
        let id = create_instance_as_buyer(&server).await;

        let response = server
            .delete(&format!("/instances/{id}"))
            .add_header(AUTHORIZATION, bearer("seller-token"))
            .await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

        let response = server
            .delete(&format!("/instances/{id}"))
            .add_header(AUTHORIZATION, bearer("buyer-token"))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert!(db.instance_repo().find_by_id(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listing_and_status_filter() {
        let (server, _db) = test_server(Arc::new(DeterministicProvider::new())).await;
        let id = create_instance_as_buyer(&server).await;

        let response = server.get("/instances").add_query_param("status", "bogus").await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

        let response = server.get("/instances").add_query_param("status", "created").await;
        let body = response.json::<Value>();
        assert_eq!(body["instances"].as_array().unwrap().len(), 1);
        assert_eq!(body["instances"][0]["id"], id.as_str());
        // Public listing never carries seller fields
        assert!(body["instances"][0].get("seller_info").is_none());

        let response = server
            .get("/instances/mine")
            .add_header(AUTHORIZATION, bearer("buyer-token"))
            .await;
        let body = response.json::<Value>();
        assert_eq!(body["as_buyer"].as_array().unwrap().len(), 1);
        assert!(body["as_seller"].as_array().unwrap().is_empty());
    }
}
