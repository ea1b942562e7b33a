//! HTTP gateway (Axum) over the search core.

pub mod error;
pub mod handler;
pub mod payload;
pub mod state;

#[cfg(test)]
mod handler_tests;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use trellis::cache::KvBackend;
use trellis::graph::GraphBackend;

pub use handler::{
    health_handler, ingestion_webhook_handler, metrics_handler, search_communities_handler,
    search_edges_handler, search_episodes_handler, search_handler, search_nodes_handler,
};
pub use state::GatewayState;

/// Builds the full route table over a shared service.
pub fn create_router_with_state<G, K>(state: GatewayState<G, K>) -> Router
where
    G: GraphBackend + 'static,
    K: KvBackend + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/search", post(search_handler))
        .route("/search/edges", post(search_edges_handler))
        .route("/search/nodes", post(search_nodes_handler))
        .route("/search/episodes", post(search_episodes_handler))
        .route("/search/communities", post(search_communities_handler))
        .route("/webhooks/ingestion", post(ingestion_webhook_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
