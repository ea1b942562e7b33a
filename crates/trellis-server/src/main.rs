//! Trellis HTTP server entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use trellis::cache::{RedisKvBackend, ResultCache, ResultCacheConfig};
use trellis::config::{Config, GraphDialect};
use trellis::embedding::{EmbeddingCache, EmbeddingClientConfig, EmbeddingProvider, HttpEmbedder};
use trellis::graph::{CypherBackend, GraphBackend, RedisGraphBackend};
use trellis::query::QueryPreparer;
use trellis::search::{EngineConfig, RetrievalEngine};
use trellis::service::SearchService;
use trellis_server::gateway::{GatewayState, create_router_with_state};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "--health-check") {
        std::process::exit(run_health_check());
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    config.validate()?;

    info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        dialect = ?config.graph_dialect,
        "Trellis search core starting"
    );

    let acquire_timeout = Duration::from_secs(config.pool_acquire_timeout_secs);
    match config.graph_dialect {
        GraphDialect::Cypher => {
            let graph = CypherBackend::connect(
                &config.graph_url,
                config.graph_user.as_deref(),
                config.graph_password.as_deref(),
                config.pool_size,
                acquire_timeout,
            )
            .await?;
            serve(config, graph).await
        }
        GraphDialect::RedisGraph => {
            let graph = RedisGraphBackend::connect(
                &config.graph_url,
                &config.graph_name,
                config.pool_size,
                acquire_timeout,
            )
            .await?;
            serve(config, graph).await
        }
    }
}

async fn serve<G: GraphBackend + 'static>(config: Config, graph: G) -> anyhow::Result<()> {
    let graph = Arc::new(graph);

    let embedder = HttpEmbedder::new(EmbeddingClientConfig {
        url: config.embedding_url.clone(),
        model: config.embedding_model.clone(),
        dimension: config.embedding_dim,
        max_concurrency: config.max_concurrent_embeddings,
        ..EmbeddingClientConfig::default()
    })?;
    let embedding_cache = Arc::new(EmbeddingCache::with_settings(
        config.l1_embedding_capacity,
        Duration::from_secs(config.embedding_ttl_secs),
    ));
    let preparer = QueryPreparer::new(
        Arc::new(embedder) as Arc<dyn EmbeddingProvider>,
        embedding_cache,
        config.allow_unscoped_queries,
    );

    let kv = match &config.cache_url {
        Some(url) => match RedisKvBackend::connect(url).await {
            Ok(backend) => {
                info!(url = %url, "L2 cache connected");
                Some(backend)
            }
            Err(e) => {
                warn!(error = %e, "L2 cache unavailable, running L1-only");
                None
            }
        },
        None => {
            info!("no TRELLIS_CACHE_URL configured, running L1-only");
            None
        }
    };
    let cache = ResultCache::new(
        kv,
        ResultCacheConfig {
            version: config.cache_version,
            prefix: config.cache_prefix.clone(),
            default_ttl: Duration::from_secs(config.result_ttl_secs),
            l1_capacity: config.l1_result_capacity,
        },
    );

    let engine = RetrievalEngine::new(
        Arc::clone(&graph),
        EngineConfig {
            method_timeout: Duration::from_secs(config.method_timeout_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            ..EngineConfig::default()
        },
    );

    let service = SearchService::new(preparer, cache, engine, config.max_concurrent_requests);
    let state = GatewayState::new(service);
    let app = create_router_with_state(state);

    let addr: SocketAddr = config.socket_addr().parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Trellis shutdown complete");
    Ok(())
}

fn run_health_check() -> i32 {
    let port = std::env::var("TRELLIS_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(3004);

    let url = format!("http://127.0.0.1:{port}/health");

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime");

    rt.block_on(async {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(1))
            .build()
            .expect("failed to build client");

        match client.get(&url).send().await {
            Ok(res) if res.status().is_success() => 0,
            _ => 1,
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("received SIGTERM, initiating graceful shutdown");
        }
    }
}
