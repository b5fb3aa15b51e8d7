use crate::composer::ScraperContext;
use crate::error::Result;
use crate::models::{BinaryResult, Catalog, Chapter, Page, Series};
use crate::taskpool::Priority;
use tokio_util::sync::CancellationToken;

/// Decides whether a URL belongs to a site. Must not touch the network.
pub trait UrlCapability: Send + Sync {
    fn validate_url(&self, url: &str) -> bool;
}

/// Extracts a single series from its URL
#[async_trait::async_trait]
pub trait SeriesCapability: Send + Sync {
    async fn fetch_series(&self, ctx: &ScraperContext, catalog: &Catalog, url: &str) -> Result<Series>;
}

/// Extracts the full series catalog of a site
#[async_trait::async_trait]
pub trait SeriesListCapability: Send + Sync {
    async fn fetch_series_list(&self, ctx: &ScraperContext, catalog: &Catalog) -> Result<Vec<Series>>;
}

/// Extracts the chapters of one series
#[async_trait::async_trait]
pub trait ChapterListCapability: Send + Sync {
    async fn fetch_chapters(&self, ctx: &ScraperContext, series: &Series) -> Result<Vec<Chapter>>;
}

/// Extracts the pages of one chapter
#[async_trait::async_trait]
pub trait PageListCapability: Send + Sync {
    async fn fetch_pages(&self, ctx: &ScraperContext, chapter: &Chapter) -> Result<Vec<Page>>;
}

/// Downloads the image behind a page through the shared task pool
#[async_trait::async_trait]
pub trait ImageCapability: Send + Sync {
    async fn fetch_image(
        &self,
        ctx: &ScraperContext,
        page: &Page,
        priority: Priority,
        cancel: CancellationToken,
    ) -> Result<BinaryResult>;
}
