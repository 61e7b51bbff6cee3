//! # Routes & Handlers
//!
//! Thin axum handlers over the journal, saga store, key distribution, and
//! bus DLQ views. Handlers translate domain errors to HTTP statuses and
//! never leak internals beyond the error message.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use lm_03_journal::{Journal, JournalEntry, TimeRange};
use lm_04_saga::{SagaInstance, SagaStore, SagaStoreError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_bus::{QueueTransport, TransportError};
use shared_crypto::KeyDistribution;
use shared_types::ResourceUrn;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Journal to query flows from.
    pub journal: Arc<dyn Journal>,
    /// Saga store to inspect instances in.
    pub sagas: Arc<dyn SagaStore>,
    /// Source of the published verification keys.
    pub keys: Arc<dyn KeyDistribution>,
    /// Bus, for dead-letter views.
    pub bus: Arc<dyn QueueTransport>,
}

/// HTTP-mapped errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The requested entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A backing store failed.
    #[error("{0}")]
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<SagaStoreError> for ApiError {
    fn from(e: SagaStoreError) -> Self {
        match e {
            SagaStoreError::NotFound(id) => ApiError::NotFound(format!("unknown saga: {id}")),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<TransportError> for ApiError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::UnknownQueue(q) => ApiError::NotFound(format!("unknown queue: {q}")),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

/// Build the gateway router over the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/keys", get(list_keys))
        .route("/events/:correlation_id", get(events_by_correlation))
        .route(
            "/resources/:service/:entity/:id/events",
            get(events_by_resource),
        )
        .route("/sagas/:saga_id", get(saga_by_id))
        .route("/queues/:queue/dead-letters", get(dead_letters))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Wire form of one published key.
#[derive(Debug, Serialize)]
struct PublishedKeyView {
    key_id: String,
    algorithm: String,
    /// base64url, unpadded.
    public_key: String,
}

async fn list_keys(
    State(state): State<AppState>,
) -> Result<Json<Vec<PublishedKeyView>>, ApiError> {
    let keys = state
        .keys
        .fetch_keys()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    Ok(Json(
        keys.into_iter()
            .map(|k| PublishedKeyView {
                key_id: k.key_id,
                algorithm: k.algorithm,
                public_key: URL_SAFE_NO_PAD.encode(k.public_key),
            })
            .collect(),
    ))
}

async fn events_by_correlation(
    State(state): State<AppState>,
    Path(correlation_id): Path<Uuid>,
) -> Result<Json<Vec<JournalEntry>>, ApiError> {
    let entries = state
        .journal
        .by_correlation(correlation_id)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    if entries.is_empty() {
        return Err(ApiError::NotFound(format!(
            "no events for correlation {correlation_id}"
        )));
    }
    Ok(Json(entries))
}

/// Optional `?from=..&to=..` window on resource queries (RFC 3339).
#[derive(Debug, Deserialize)]
struct TimeWindowQuery {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

async fn events_by_resource(
    State(state): State<AppState>,
    Path((service, entity, id)): Path<(String, String, String)>,
    Query(window): Query<TimeWindowQuery>,
) -> Result<Json<Vec<JournalEntry>>, ApiError> {
    let urn = ResourceUrn::new(&service, &entity, &id)
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    let range = TimeRange {
        from: window.from,
        to: window.to,
    };
    let entries = state
        .journal
        .by_resource(&urn, range)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    if entries.is_empty() {
        return Err(ApiError::NotFound(format!("no events for {urn}")));
    }
    Ok(Json(entries))
}

async fn saga_by_id(
    State(state): State<AppState>,
    Path(saga_id): Path<Uuid>,
) -> Result<Json<SagaInstance>, ApiError> {
    let instance = state.sagas.load(saga_id).await?;
    Ok(Json(instance))
}

/// Wire form of one dead letter.
#[derive(Debug, Serialize)]
struct DeadLetterView {
    source: String,
    detail_type: String,
    resource: String,
    correlation_id: Uuid,
    reasons: Vec<String>,
    dead_lettered_at: DateTime<Utc>,
}

async fn dead_letters(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> Result<Json<Vec<DeadLetterView>>, ApiError> {
    let dead = state.bus.dead_letters(&queue).await?;
    Ok(Json(
        dead.into_iter()
            .map(|d| DeadLetterView {
                source: d.envelope.source().to_string(),
                detail_type: d.envelope.detail_type().to_string(),
                resource: d.envelope.resource().to_string(),
                correlation_id: d.envelope.correlation_id(),
                reasons: d.reasons,
                dead_lettered_at: d.dead_lettered_at,
            })
            .collect(),
    ))
}
