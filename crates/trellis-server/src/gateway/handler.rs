use axum::{Json, extract::State, http::StatusCode, response::Response};
use axum::response::IntoResponse;
use tracing::{debug, info, instrument};

use trellis::cache::KvBackend;
use trellis::graph::GraphBackend;

use super::error::GatewayError;
use super::payload::{
    CommunitySearchResponsePayload, EdgeSearchResponsePayload, EpisodeSearchRequestPayload,
    EpisodeSearchResponsePayload, HealthResponsePayload, IngestionEventPayload,
    InvalidationResponsePayload, KindSearchRequestPayload, NodeSearchResponsePayload,
    SearchRequestPayload, SearchResponsePayload,
};
use super::state::GatewayState;

fn parse_body<T: serde::de::DeserializeOwned>(body: serde_json::Value) -> Result<T, GatewayError> {
    serde_json::from_value(body)
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid request schema: {e}")))
}

/// `POST /search` — combined search across all four kinds.
#[instrument(skip(state, body))]
pub async fn search_handler<G, K>(
    State(state): State<GatewayState<G, K>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<SearchResponsePayload>, GatewayError>
where
    G: GraphBackend + 'static,
    K: KvBackend + 'static,
{
    let payload: SearchRequestPayload = parse_body(body)?;
    debug!(query_len = payload.query.len(), "combined search");

    let outcome = state.service.search(payload.into_request()).await?;
    Ok(Json(SearchResponsePayload::from_outcome(&outcome)))
}

/// `POST /search/edges` — edge specialization with a flattened config.
#[instrument(skip(state, body))]
pub async fn search_edges_handler<G, K>(
    State(state): State<GatewayState<G, K>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<EdgeSearchResponsePayload>, GatewayError>
where
    G: GraphBackend + 'static,
    K: KvBackend + 'static,
{
    let payload: KindSearchRequestPayload = parse_body(body)?;
    let config = payload.config.to_edge_config();
    let outcome = state.service.search(payload.into_request(config)).await?;

    let full = SearchResponsePayload::from_outcome(&outcome);
    Ok(Json(EdgeSearchResponsePayload {
        edges: full.edges,
        latency_ms: full.latency_ms,
        degraded: full.degraded,
    }))
}

/// `POST /search/nodes` — node specialization with a flattened config.
#[instrument(skip(state, body))]
pub async fn search_nodes_handler<G, K>(
    State(state): State<GatewayState<G, K>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<NodeSearchResponsePayload>, GatewayError>
where
    G: GraphBackend + 'static,
    K: KvBackend + 'static,
{
    let payload: KindSearchRequestPayload = parse_body(body)?;
    let config = payload.config.to_node_config();
    let outcome = state.service.search(payload.into_request(config)).await?;

    let full = SearchResponsePayload::from_outcome(&outcome);
    Ok(Json(NodeSearchResponsePayload {
        nodes: full.nodes,
        latency_ms: full.latency_ms,
        degraded: full.degraded,
    }))
}

/// `POST /search/episodes` — episode specialization (full-text only).
#[instrument(skip(state, body))]
pub async fn search_episodes_handler<G, K>(
    State(state): State<GatewayState<G, K>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<EpisodeSearchResponsePayload>, GatewayError>
where
    G: GraphBackend + 'static,
    K: KvBackend + 'static,
{
    let payload: EpisodeSearchRequestPayload = parse_body(body)?;
    let outcome = state.service.search(payload.into_request()).await?;

    let full = SearchResponsePayload::from_outcome(&outcome);
    Ok(Json(EpisodeSearchResponsePayload {
        episodes: full.episodes,
        latency_ms: full.latency_ms,
        degraded: full.degraded,
    }))
}

/// `POST /search/communities` — community specialization.
#[instrument(skip(state, body))]
pub async fn search_communities_handler<G, K>(
    State(state): State<GatewayState<G, K>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<CommunitySearchResponsePayload>, GatewayError>
where
    G: GraphBackend + 'static,
    K: KvBackend + 'static,
{
    let payload: KindSearchRequestPayload = parse_body(body)?;
    let config = payload.config.to_community_config();
    let outcome = state.service.search(payload.into_request(config)).await?;

    let full = SearchResponsePayload::from_outcome(&outcome);
    Ok(Json(CommunitySearchResponsePayload {
        communities: full.communities,
        latency_ms: full.latency_ms,
        degraded: full.degraded,
    }))
}

/// `GET /health` — liveness plus database reachability.
#[instrument(skip(state))]
pub async fn health_handler<G, K>(State(state): State<GatewayState<G, K>>) -> Response
where
    G: GraphBackend + 'static,
    K: KvBackend + 'static,
{
    let health = state.service.health().await;
    let body = HealthResponsePayload {
        status: if health.is_healthy() {
            "healthy"
        } else {
            "degraded"
        },
        database: if health.database_ok {
            "ok"
        } else {
            "unreachable"
        },
    };
    let status = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

/// `GET /metrics` — cache and request counters.
#[instrument(skip(state))]
pub async fn metrics_handler<G, K>(
    State(state): State<GatewayState<G, K>>,
) -> Json<trellis::service::MetricsSnapshot>
where
    G: GraphBackend + 'static,
    K: KvBackend + 'static,
{
    Json(state.service.metrics_snapshot())
}

/// `POST /webhooks/ingestion` — cache invalidation on ingestion writes.
/// Idempotent: re-delivering the same event is harmless.
#[instrument(skip(state, body))]
pub async fn ingestion_webhook_handler<G, K>(
    State(state): State<GatewayState<G, K>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<InvalidationResponsePayload>, GatewayError>
where
    G: GraphBackend + 'static,
    K: KvBackend + 'static,
{
    let event: IngestionEventPayload = parse_body(body)?;
    info!(
        operation = %event.operation,
        group_id = %event.group_id,
        entities = event.entity_ids.len(),
        "ingestion event received"
    );

    let invalidated = state.service.invalidate_group(&event.group_id).await;
    Ok(Json(InvalidationResponsePayload { invalidated }))
}
