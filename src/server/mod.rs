//! Query core: resource cache, pagination and the facade that combines them

pub mod pagination;
pub mod query;
pub mod resource_cache;
pub mod resources;
pub mod tool_registry;

pub use pagination::{Cursor, Page, PageCodec};
pub use query::{PageResult, QueryFacade};
pub use resource_cache::{
    CacheRead, CacheStats, EntryState, Freshness, ResourceCache, ResourceRegistration,
    ResourceStatus,
};
pub use resources::ResourceKind;
pub use tool_registry::{ToolCategory, ToolSpec, ToolTable};

use crate::client::{Fetcher, HomeyFetcher, HomeyHttpClient};
use crate::config::ServerConfig;
use crate::error::Result;
use crate::error_recovery::{CircuitBreaker, ResilientFetcher};
use std::sync::Arc;
use tracing::info;

/// Wire the HomeyPro client, resilience layer, cache and codec from configuration
pub fn build_query_facade(config: &ServerConfig) -> Result<QueryFacade> {
    let client = Arc::new(HomeyHttpClient::new(&config.homey)?);
    let breaker = config
        .resilience
        .circuit_breaker
        .clone()
        .map(|breaker_config| Arc::new(CircuitBreaker::new("homey", breaker_config)));

    let registrations = ResourceKind::ALL.into_iter().map(|kind| {
        let fetcher = ResilientFetcher::from_config(
            HomeyFetcher::new(Arc::clone(&client), kind),
            config.homey.timeout,
            &config.resilience,
            breaker.clone(),
        );
        let ttl = config.cache.ttl_for(kind);
        info!("Resource {} ({}) cached for {:?}", kind.key(), kind.uri(), ttl);
        ResourceRegistration::new(kind.key(), ttl, Arc::new(fetcher) as Arc<dyn Fetcher>)
    });
    let cache = ResourceCache::from_registrations(registrations)?;

    let codec = PageCodec::new(
        config.pagination.default_page_size,
        config.pagination.max_page_size,
    )?;

    Ok(QueryFacade::new(Arc::new(cache), codec))
}
