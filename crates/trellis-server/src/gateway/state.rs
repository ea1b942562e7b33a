use std::sync::Arc;

use trellis::cache::KvBackend;
use trellis::graph::GraphBackend;
use trellis::service::SearchService;

/// Shared handler state: the composition root behind an `Arc`.
pub struct GatewayState<G: GraphBackend, K: KvBackend> {
    pub service: Arc<SearchService<G, K>>,
}

impl<G: GraphBackend, K: KvBackend> Clone for GatewayState<G, K> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<G: GraphBackend, K: KvBackend> GatewayState<G, K> {
    pub fn new(service: SearchService<G, K>) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
