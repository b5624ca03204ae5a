//! Query facade: cached resources served as cursor-paginated pages

use crate::error::{ErrorDetail, HomeyError, Result};
use crate::server::pagination::{Cursor, Page, PageCodec};
use crate::server::resource_cache::{CacheRead, CacheStats, ResourceCache, ResourceStatus};
use crate::server::resources::ResourceKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// One page of a resource, as returned to tool and resource handlers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResult {
    pub resource: String,
    pub items: Vec<Value>,
    pub total_count: usize,
    pub offset: usize,
    pub page_size: usize,
    pub has_next: bool,
    pub next_cursor: Option<String>,
    /// Served from cache after a failed refresh
    pub stale: bool,
    pub fetched_at: DateTime<Utc>,
    /// Why the data is stale, if it is
    pub error: Option<ErrorDetail>,
}

impl PageResult {
    fn from_page(resource: &str, page: Page<Value>, read: &CacheRead) -> Self {
        Self {
            resource: resource.to_string(),
            items: page.items,
            total_count: page.total_count,
            offset: page.offset,
            page_size: page.page_size,
            has_next: page.has_next,
            next_cursor: page.next_cursor,
            stale: read.is_stale(),
            fetched_at: read.fetched_at,
            error: read.error.as_ref().map(|e| {
                let failed_at = read.failed_at.unwrap_or(read.fetched_at);
                ErrorDetail::from_fetch_error(resource, e, failed_at)
            }),
        }
    }
}

/// Entry point for paginated, cached resource reads
#[derive(Debug, Clone)]
pub struct QueryFacade {
    cache: Arc<ResourceCache>,
    codec: PageCodec,
}

impl QueryFacade {
    pub fn new(cache: Arc<ResourceCache>, codec: PageCodec) -> Self {
        Self { cache, codec }
    }

    /// Read one page of `resource_key`.
    ///
    /// Unknown keys and bad cursors are rejected before any upstream I/O. Sequence
    /// values are paginated; anything else comes back as a single-item page.
    pub async fn get(&self, resource_key: &str, cursor: Option<&str>) -> Result<PageResult> {
        if !self.cache.contains(resource_key) {
            return Err(HomeyError::unknown_resource(resource_key));
        }
        let cursor = self.codec.decode(cursor)?;

        let read = self.read(resource_key).await?;
        let page = match read.value.as_ref() {
            Value::Array(items) => self.codec.paginate(items, &cursor),
            document => single_page(document),
        };
        debug!(
            "{}: {} of {} items from offset {}",
            resource_key,
            page.items.len(),
            page.total_count,
            page.offset
        );

        Ok(PageResult::from_page(resource_key, page, &read))
    }

    /// Read a resource by its `homey://` URI
    pub async fn get_uri(&self, uri: &str, cursor: Option<&str>) -> Result<PageResult> {
        let kind = ResourceKind::from_uri(uri).ok_or_else(|| HomeyError::unknown_resource(uri))?;
        self.get(kind.key(), cursor).await
    }

    /// Every item of a resource as one page.
    ///
    /// The cache is read once and that snapshot is walked at the maximum page
    /// size, so a refresh between pages cannot mix two versions of the data.
    pub async fn get_all(&self, resource_key: &str) -> Result<PageResult> {
        if !self.cache.contains(resource_key) {
            return Err(HomeyError::unknown_resource(resource_key));
        }

        let read = self.read(resource_key).await?;
        let items = match read.value.as_ref() {
            Value::Array(items) => items,
            document => {
                return Ok(PageResult::from_page(
                    resource_key,
                    single_page(document),
                    &read,
                ))
            }
        };

        let mut cursor = Cursor {
            offset: 0,
            page_size: self.codec.max_page_size(),
        };
        let mut collected = Vec::with_capacity(items.len());
        loop {
            let page = self.codec.paginate(items, &cursor);
            collected.extend(page.items);
            if !page.has_next {
                break;
            }
            cursor.offset += cursor.page_size;
        }

        let page = Page {
            total_count: items.len(),
            page_size: collected.len(),
            items: collected,
            offset: 0,
            has_next: false,
            next_cursor: None,
        };
        Ok(PageResult::from_page(resource_key, page, &read))
    }

    /// Force the next read of `resource_key` to refresh
    pub async fn invalidate(&self, resource_key: &str) -> Result<()> {
        self.cache.invalidate(resource_key).await
    }

    /// Registered resource keys
    pub fn resources(&self) -> Vec<&str> {
        self.cache.keys()
    }

    pub async fn cache_status(&self) -> Vec<ResourceStatus> {
        self.cache.status().await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn codec(&self) -> &PageCodec {
        &self.codec
    }

    async fn read(&self, resource_key: &str) -> Result<CacheRead> {
        let read = self.cache.get(resource_key).await?;
        if let Some(error) = &read.error {
            warn!("Serving stale {}: {}", resource_key, error);
        }
        Ok(read)
    }
}

fn single_page(document: &Value) -> Page<Value> {
    Page {
        items: vec![document.clone()],
        total_count: 1,
        offset: 0,
        page_size: 1,
        has_next: false,
        next_cursor: None,
    }
}
