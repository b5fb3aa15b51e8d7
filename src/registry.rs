use crate::capabilities::common::{
    ChaptersSinglePage, ImageDirect, PagesSinglePage, PatternUrl, SeriesCss, SeriesListMultiPage,
    SeriesListSinglePage,
};
use crate::capabilities::mangastream;
use crate::composer::{Scraper, ScraperBuilder, ScraperContext};
use crate::config::{Config, PaginationConfig, Preset, SiteConfig, TerminationConfig};
use crate::error::{Result, ScrapeError};
use crate::extract::{anchor_info_extractor, InfoExtractor};
use crate::fetch::FetchProvider;
use crate::models::{Series, SiteInfo};
use crate::pagination::{EmptyPage, MultiPage, RepeatedIdentifier, TerminationPolicy, PAGE_PLACEHOLDER};
use crate::taskpool::TaskPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Registry of composed scrapers. All of them share one image pool so the
/// configured concurrency caps downloads across every site.
pub struct SiteRegistry {
    scrapers: BTreeMap<String, Scraper>,
    pool: Arc<TaskPool>,
}

impl SiteRegistry {
    pub fn new(pool: Arc<TaskPool>) -> Self {
        Self {
            scrapers: BTreeMap::new(),
            pool,
        }
    }

    pub fn from_config(config: &Config, fetcher: Arc<dyn FetchProvider>) -> Result<Self> {
        let pool = Arc::new(TaskPool::new(config.task_pool.concurrency));
        let mut registry = Self::new(pool.clone());

        for (id, site) in &config.sites {
            let scraper = build_site(id, site, fetcher.clone(), pool.clone())?;
            registry.register(scraper);
        }

        info!(
            "[REGISTRY] {} sites registered, image concurrency {}",
            registry.scrapers.len(),
            pool.concurrency()
        );
        Ok(registry)
    }

    pub fn register(&mut self, scraper: Scraper) {
        self.scrapers.insert(scraper.info().id.clone(), scraper);
    }

    pub fn get(&self, id: &str) -> Option<&Scraper> {
        self.scrapers.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&Scraper> {
        self.get(id).ok_or_else(|| ScrapeError::site_not_supported(id))
    }

    /// First site (in id order) whose URL capability accepts `url`.
    pub fn find_by_url(&self, url: &str) -> Option<&Scraper> {
        self.scrapers.values().find(|scraper| scraper.validate_url(url))
    }

    pub fn sites(&self) -> impl Iterator<Item = &Scraper> {
        self.scrapers.values()
    }

    pub fn pool(&self) -> &Arc<TaskPool> {
        &self.pool
    }
}

/// Composes the scraper described by one `[sites.<id>]` table.
pub fn build_site(
    id: &str,
    site: &SiteConfig,
    fetcher: Arc<dyn FetchProvider>,
    pool: Arc<TaskPool>,
) -> Result<Scraper> {
    let info = SiteInfo {
        id: id.to_string(),
        label: site.label.clone(),
        base_url: Url::parse(&site.base_url)?,
        icon: site.icon.clone(),
    };

    let mut ctx = ScraperContext::new(info, fetcher, pool);
    if let Some(user_agent) = &site.user_agent {
        ctx = ctx.with_header("User-Agent", user_agent);
    }
    if let Some(headers) = &site.headers {
        for (name, value) in headers {
            ctx = ctx.with_header(name, value);
        }
    }

    let pattern = PatternUrl::new(&site.url_pattern)?;
    let selectors = &site.selectors;
    let builder = Scraper::builder(ctx);

    let builder = match site.preset {
        Preset::MangaStream => {
            let defaults = mangastream::Queries::default();
            let queries = mangastream::Queries {
                series_title: selectors.series_title.clone().unwrap_or(defaults.series_title),
                series_list_path: selectors.series_list_path.clone().unwrap_or(defaults.series_list_path),
                series_list: selectors.series_list.clone().unwrap_or(defaults.series_list),
                chapter_list: selectors.chapter_list.clone().unwrap_or(defaults.chapter_list),
                chapter_title: selectors.chapter_title.clone().or(defaults.chapter_title),
                chapter_title_bloat: selectors.chapter_title_bloat.clone(),
                page_list: selectors.page_list.clone().unwrap_or(defaults.page_list),
            };
            let paging = queries.series_list_path.contains(PAGE_PLACEHOLDER).then(|| {
                paged_list(
                    &queries.series_list_path,
                    &queries.series_list,
                    anchor_info_extractor(selectors.use_title_attribute),
                    &site.pagination,
                )
            });
            mangastream::attach(builder, pattern, queries, paging)
        }
        Preset::Generic => attach_generic(builder, pattern, site),
    };

    let scraper = builder.image("image-direct", ImageDirect::new(site.detect_mime)).build();
    debug!("[REGISTRY] {} composed from {:?}", id, scraper.capabilities());
    Ok(scraper)
}

/// Attaches only the stages whose selectors are configured; the rest stay unsupported.
fn attach_generic(builder: ScraperBuilder, pattern: PatternUrl, site: &SiteConfig) -> ScraperBuilder {
    let selectors = &site.selectors;
    let extract = anchor_info_extractor(selectors.use_title_attribute);
    let mut builder = builder.url("pattern-url", pattern);

    if let Some(query) = &selectors.series_title {
        builder = builder.series("series-css", SeriesCss::new(query));
    }

    if let (Some(path), Some(query)) = (&selectors.series_list_path, &selectors.series_list) {
        builder = if path.contains(PAGE_PLACEHOLDER) {
            let params = paged_list(path, query, extract.clone(), &site.pagination);
            builder.series_list("series-list-paged", SeriesListMultiPage::new(params))
        } else {
            builder.series_list(
                "series-list",
                SeriesListSinglePage::new(path, query).extractor(extract.clone()),
            )
        };
    }

    if let Some(query) = &selectors.chapter_list {
        let chapters = match (&selectors.chapter_title, &selectors.chapter_title_bloat) {
            (None, None) => ChaptersSinglePage::new(query).extractor(extract),
            (title, bloat) => ChaptersSinglePage::new(query)
                .extractor(mangastream::chapter_info_extractor(title.clone(), bloat.clone())),
        };
        builder = builder.chapters("chapters-css", chapters);
    }

    if let Some(query) = &selectors.page_list {
        builder = builder.pages("pages-css", PagesSinglePage::new(query));
    }

    builder
}

fn paged_list(path: &str, query: &str, extract: InfoExtractor, pagination: &PaginationConfig) -> MultiPage {
    let termination: Arc<dyn TerminationPolicy<Series>> = match pagination.termination {
        TerminationConfig::EmptyPage => Arc::new(EmptyPage),
        TerminationConfig::RepeatedId => Arc::new(RepeatedIdentifier::by_series_id()),
    };

    MultiPage::new(path, query, extract)
        .start(pagination.start)
        .throttle(Duration::from_millis(pagination.throttle_ms))
        .termination(termination)
}
