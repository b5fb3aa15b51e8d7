use crate::error::{Result, ScrapeError};
use crate::fetch::FetchProvider;
use crate::models::{BinaryResult, Catalog, Chapter, Page, Series, SiteInfo};
use crate::taskpool::{Priority, TaskPool};
use crate::traits::{
    ChapterListCapability, ImageCapability, PageListCapability, SeriesCapability,
    SeriesListCapability, UrlCapability,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Everything a capability may use: site identity, the fetch provider,
/// per-site request headers and the shared image pool.
#[derive(Clone)]
pub struct ScraperContext {
    pub info: SiteInfo,
    pub fetcher: Arc<dyn FetchProvider>,
    pub pool: Arc<TaskPool>,
    pub headers: BTreeMap<String, String>,
}

impl ScraperContext {
    pub fn new(info: SiteInfo, fetcher: Arc<dyn FetchProvider>, pool: Arc<TaskPool>) -> Self {
        Self {
            info,
            fetcher,
            pool,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ValidateUrl,
    Series,
    SeriesList,
    Chapters,
    Pages,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Replace,
    Wrap,
}

/// One entry of the composition trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub stage: Stage,
    pub name: &'static str,
    pub mode: Mode,
}

/// Base strategy for every stage.
pub struct Unsupported;

impl UrlCapability for Unsupported {
    fn validate_url(&self, _url: &str) -> bool {
        false
    }
}

#[async_trait::async_trait]
impl SeriesCapability for Unsupported {
    async fn fetch_series(&self, ctx: &ScraperContext, _catalog: &Catalog, _url: &str) -> Result<Series> {
        Err(ScrapeError::unsupported(&ctx.info.id, "fetch_series"))
    }
}

#[async_trait::async_trait]
impl SeriesListCapability for Unsupported {
    async fn fetch_series_list(&self, ctx: &ScraperContext, _catalog: &Catalog) -> Result<Vec<Series>> {
        Err(ScrapeError::unsupported(&ctx.info.id, "fetch_series_list"))
    }
}

#[async_trait::async_trait]
impl ChapterListCapability for Unsupported {
    async fn fetch_chapters(&self, ctx: &ScraperContext, _series: &Series) -> Result<Vec<Chapter>> {
        Err(ScrapeError::unsupported(&ctx.info.id, "fetch_chapters"))
    }
}

#[async_trait::async_trait]
impl PageListCapability for Unsupported {
    async fn fetch_pages(&self, ctx: &ScraperContext, _chapter: &Chapter) -> Result<Vec<Page>> {
        Err(ScrapeError::unsupported(&ctx.info.id, "fetch_pages"))
    }
}

#[async_trait::async_trait]
impl ImageCapability for Unsupported {
    async fn fetch_image(
        &self,
        ctx: &ScraperContext,
        _page: &Page,
        _priority: Priority,
        _cancel: CancellationToken,
    ) -> Result<BinaryResult> {
        Err(ScrapeError::unsupported(&ctx.info.id, "fetch_image"))
    }
}

/// A composed scraper: one resolved strategy per stage.
pub struct Scraper {
    ctx: ScraperContext,
    url: Arc<dyn UrlCapability>,
    series: Arc<dyn SeriesCapability>,
    series_list: Arc<dyn SeriesListCapability>,
    chapters: Arc<dyn ChapterListCapability>,
    pages: Arc<dyn PageListCapability>,
    image: Arc<dyn ImageCapability>,
    trail: Vec<Attachment>,
}

impl Scraper {
    pub fn builder(ctx: ScraperContext) -> ScraperBuilder {
        ScraperBuilder::new(ctx)
    }

    pub fn info(&self) -> &SiteInfo {
        &self.ctx.info
    }

    pub fn context(&self) -> &ScraperContext {
        &self.ctx
    }

    pub fn catalog(&self) -> Catalog {
        Catalog {
            id: self.ctx.info.id.clone(),
            label: self.ctx.info.label.clone(),
        }
    }

    /// Attachments in the order they were declared.
    pub fn capabilities(&self) -> &[Attachment] {
        &self.trail
    }

    pub fn validate_url(&self, url: &str) -> bool {
        self.url.validate_url(url)
    }

    pub async fn fetch_series(&self, catalog: &Catalog, url: &str) -> Result<Series> {
        self.series.fetch_series(&self.ctx, catalog, url).await
    }

    pub async fn fetch_series_list(&self, catalog: &Catalog) -> Result<Vec<Series>> {
        self.series_list.fetch_series_list(&self.ctx, catalog).await
    }

    pub async fn fetch_chapters(&self, series: &Series) -> Result<Vec<Chapter>> {
        self.chapters.fetch_chapters(&self.ctx, series).await
    }

    pub async fn fetch_pages(&self, chapter: &Chapter) -> Result<Vec<Page>> {
        self.pages.fetch_pages(&self.ctx, chapter).await
    }

    pub async fn fetch_image(&self, page: &Page, priority: Priority, cancel: CancellationToken) -> Result<BinaryResult> {
        self.image.fetch_image(&self.ctx, page, priority, cancel).await
    }
}

/// Every stage starts out `Unsupported`. Attaching replaces a stage's strategy,
/// wrapping hands the current one to the new strategy for delegation.
pub struct ScraperBuilder {
    scraper: Scraper,
}

impl ScraperBuilder {
    pub fn new(ctx: ScraperContext) -> Self {
        let base = Arc::new(Unsupported);
        Self {
            scraper: Scraper {
                ctx,
                url: base.clone(),
                series: base.clone(),
                series_list: base.clone(),
                chapters: base.clone(),
                pages: base.clone(),
                image: base,
                trail: Vec::new(),
            },
        }
    }

    pub fn context(&self) -> &ScraperContext {
        &self.scraper.ctx
    }

    fn record(&mut self, stage: Stage, name: &'static str, mode: Mode) {
        debug!("[COMPOSER] {}: {:?} {:?} with '{}'", self.scraper.ctx.info.id, mode, stage, name);
        self.scraper.trail.push(Attachment { stage, name, mode });
    }

    pub fn url(mut self, name: &'static str, capability: impl UrlCapability + 'static) -> Self {
        self.record(Stage::ValidateUrl, name, Mode::Replace);
        self.scraper.url = Arc::new(capability);
        self
    }

    pub fn series(mut self, name: &'static str, capability: impl SeriesCapability + 'static) -> Self {
        self.record(Stage::Series, name, Mode::Replace);
        self.scraper.series = Arc::new(capability);
        self
    }

    pub fn series_list(mut self, name: &'static str, capability: impl SeriesListCapability + 'static) -> Self {
        self.record(Stage::SeriesList, name, Mode::Replace);
        self.scraper.series_list = Arc::new(capability);
        self
    }

    pub fn chapters(mut self, name: &'static str, capability: impl ChapterListCapability + 'static) -> Self {
        self.record(Stage::Chapters, name, Mode::Replace);
        self.scraper.chapters = Arc::new(capability);
        self
    }

    pub fn pages(mut self, name: &'static str, capability: impl PageListCapability + 'static) -> Self {
        self.record(Stage::Pages, name, Mode::Replace);
        self.scraper.pages = Arc::new(capability);
        self
    }

    pub fn image(mut self, name: &'static str, capability: impl ImageCapability + 'static) -> Self {
        self.record(Stage::Image, name, Mode::Replace);
        self.scraper.image = Arc::new(capability);
        self
    }

    pub fn wrap_url<C, F>(mut self, name: &'static str, wrap: F) -> Self
    where
        C: UrlCapability + 'static,
        F: FnOnce(Arc<dyn UrlCapability>) -> C,
    {
        self.record(Stage::ValidateUrl, name, Mode::Wrap);
        let previous = self.scraper.url.clone();
        self.scraper.url = Arc::new(wrap(previous));
        self
    }

    pub fn wrap_series<C, F>(mut self, name: &'static str, wrap: F) -> Self
    where
        C: SeriesCapability + 'static,
        F: FnOnce(Arc<dyn SeriesCapability>) -> C,
    {
        self.record(Stage::Series, name, Mode::Wrap);
        let previous = self.scraper.series.clone();
        self.scraper.series = Arc::new(wrap(previous));
        self
    }

    pub fn wrap_series_list<C, F>(mut self, name: &'static str, wrap: F) -> Self
    where
        C: SeriesListCapability + 'static,
        F: FnOnce(Arc<dyn SeriesListCapability>) -> C,
    {
        self.record(Stage::SeriesList, name, Mode::Wrap);
        let previous = self.scraper.series_list.clone();
        self.scraper.series_list = Arc::new(wrap(previous));
        self
    }

    pub fn wrap_chapters<C, F>(mut self, name: &'static str, wrap: F) -> Self
    where
        C: ChapterListCapability + 'static,
        F: FnOnce(Arc<dyn ChapterListCapability>) -> C,
    {
        self.record(Stage::Chapters, name, Mode::Wrap);
        let previous = self.scraper.chapters.clone();
        self.scraper.chapters = Arc::new(wrap(previous));
        self
    }

    pub fn wrap_pages<C, F>(mut self, name: &'static str, wrap: F) -> Self
    where
        C: PageListCapability + 'static,
        F: FnOnce(Arc<dyn PageListCapability>) -> C,
    {
        self.record(Stage::Pages, name, Mode::Wrap);
        let previous = self.scraper.pages.clone();
        self.scraper.pages = Arc::new(wrap(previous));
        self
    }

    pub fn wrap_image<C, F>(mut self, name: &'static str, wrap: F) -> Self
    where
        C: ImageCapability + 'static,
        F: FnOnce(Arc<dyn ImageCapability>) -> C,
    {
        self.record(Stage::Image, name, Mode::Wrap);
        let previous = self.scraper.image.clone();
        self.scraper.image = Arc::new(wrap(previous));
        self
    }

    pub fn build(self) -> Scraper {
        self.scraper
    }
}
