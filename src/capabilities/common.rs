use crate::composer::ScraperContext;
use crate::error::Result;
use crate::extract::{
    default_image_extractor, default_info_extractor, fetch_chapters_single_page, fetch_pages_single_page,
    fetch_series_css, fetch_series_single_page, site_request, ImageExtractor, InfoExtractor,
};
use crate::models::{BinaryResult, Catalog, Chapter, Page, Series};
use crate::pagination::{fetch_series_multi_page, MultiPage};
use crate::sniff::{detect_mime, MimeType};
use crate::taskpool::Priority;
use crate::traits::{
    ChapterListCapability, ImageCapability, PageListCapability, SeriesCapability, SeriesListCapability,
    UrlCapability,
};
use regex::Regex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PatternUrl {
    pattern: Regex,
}

impl PatternUrl {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl UrlCapability for PatternUrl {
    fn validate_url(&self, url: &str) -> bool {
        self.pattern.is_match(url)
    }
}

/// The series identifier is the URL path; the title comes from the element
/// matched by `query` (the `content` attribute for `<meta>`).
#[derive(Debug, Clone)]
pub struct SeriesCss {
    query: String,
}

impl SeriesCss {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into() }
    }
}

#[async_trait::async_trait]
impl SeriesCapability for SeriesCss {
    async fn fetch_series(&self, ctx: &ScraperContext, catalog: &Catalog, url: &str) -> Result<Series> {
        fetch_series_css(ctx, catalog, url, &self.query).await
    }
}

pub struct SeriesListSinglePage {
    path: String,
    query: String,
    extract: InfoExtractor,
}

impl SeriesListSinglePage {
    pub fn new(path: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: query.into(),
            extract: default_info_extractor(),
        }
    }

    pub fn extractor(mut self, extract: InfoExtractor) -> Self {
        self.extract = extract;
        self
    }
}

#[async_trait::async_trait]
impl SeriesListCapability for SeriesListSinglePage {
    async fn fetch_series_list(&self, ctx: &ScraperContext, catalog: &Catalog) -> Result<Vec<Series>> {
        fetch_series_single_page(ctx, catalog, &self.path, &self.query, &self.extract).await
    }
}

pub struct SeriesListMultiPage {
    params: MultiPage,
}

impl SeriesListMultiPage {
    pub fn new(params: MultiPage) -> Self {
        Self { params }
    }
}

#[async_trait::async_trait]
impl SeriesListCapability for SeriesListMultiPage {
    async fn fetch_series_list(&self, ctx: &ScraperContext, catalog: &Catalog) -> Result<Vec<Series>> {
        fetch_series_multi_page(ctx, catalog, &self.params).await
    }
}

pub struct ChaptersSinglePage {
    query: String,
    extract: InfoExtractor,
}

impl ChaptersSinglePage {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            extract: default_info_extractor(),
        }
    }

    pub fn extractor(mut self, extract: InfoExtractor) -> Self {
        self.extract = extract;
        self
    }
}

#[async_trait::async_trait]
impl ChapterListCapability for ChaptersSinglePage {
    async fn fetch_chapters(&self, ctx: &ScraperContext, series: &Series) -> Result<Vec<Chapter>> {
        fetch_chapters_single_page(ctx, series, &self.query, &self.extract).await
    }
}

pub struct RewriteChapters {
    previous: Arc<dyn ChapterListCapability>,
    rewrite: Arc<dyn Fn(Chapter) -> Result<Chapter> + Send + Sync>,
}

impl RewriteChapters {
    pub fn new(
        previous: Arc<dyn ChapterListCapability>,
        rewrite: impl Fn(Chapter) -> Result<Chapter> + Send + Sync + 'static,
    ) -> Self {
        Self {
            previous,
            rewrite: Arc::new(rewrite),
        }
    }
}

#[async_trait::async_trait]
impl ChapterListCapability for RewriteChapters {
    async fn fetch_chapters(&self, ctx: &ScraperContext, series: &Series) -> Result<Vec<Chapter>> {
        let chapters = self.previous.fetch_chapters(ctx, series).await?;
        chapters.into_iter().map(|chapter| (self.rewrite)(chapter)).collect()
    }
}

pub struct PagesSinglePage {
    query: String,
    extract: ImageExtractor,
}

impl PagesSinglePage {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            extract: default_image_extractor(),
        }
    }

    pub fn extractor(mut self, extract: ImageExtractor) -> Self {
        self.extract = extract;
        self
    }
}

#[async_trait::async_trait]
impl PageListCapability for PagesSinglePage {
    async fn fetch_pages(&self, ctx: &ScraperContext, chapter: &Chapter) -> Result<Vec<Page>> {
        fetch_pages_single_page(ctx, chapter, &self.query, &self.extract).await
    }
}

/// Downloads the page image through the shared pool.
///
/// With `detect_mime` the content type is sniffed from the bytes; otherwise
/// the server's `Content-Type` is trusted.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDirect {
    detect_mime: bool,
}

impl ImageDirect {
    pub fn new(detect_mime: bool) -> Self {
        Self { detect_mime }
    }
}

#[async_trait::async_trait]
impl ImageCapability for ImageDirect {
    async fn fetch_image(
        &self,
        ctx: &ScraperContext,
        page: &Page,
        priority: Priority,
        cancel: CancellationToken,
    ) -> Result<BinaryResult> {
        let referer = if page.parameters.referer.is_empty() {
            page.url.origin().ascii_serialization()
        } else {
            page.parameters.referer.clone()
        };
        let request = site_request(ctx, page.url.clone()).referer(referer);
        let fetcher = ctx.fetcher.clone();
        let detect = self.detect_mime;

        ctx.pool
            .add(
                move |token| async move {
                    let response = fetcher.fetch(request.with_cancel(token)).await?;
                    let content_type = if detect {
                        detect_mime(&response.body).as_str().to_string()
                    } else {
                        response
                            .content_type
                            .unwrap_or_else(|| MimeType::OctetStream.as_str().to_string())
                    };
                    debug!("[IMAGE] {} -> {} ({} bytes)", response.url, content_type, response.body.len());
                    Ok(BinaryResult {
                        data: response.body,
                        content_type,
                    })
                },
                priority,
                cancel,
            )
            .await
    }
}
