use crate::composer::ScraperContext;
use crate::error::{Result, ScrapeError};
use crate::fetch::{Element, FetchRequest};
use crate::models::{Catalog, Chapter, MediaInfo, Page, Series};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Maps a matched element to an identifier and title.
pub type InfoExtractor = Arc<dyn Fn(&Element) -> Result<MediaInfo> + Send + Sync>;

/// Maps a matched element to the (possibly relative) location of an image.
pub type ImageExtractor = Arc<dyn Fn(&Element) -> Result<String> + Send + Sync>;

/// Reads the identifier from the anchor's path and the title from its text,
/// or from its `title` attribute when `use_title_attribute` is set.
pub fn anchor_info_extractor(use_title_attribute: bool) -> InfoExtractor {
    Arc::new(move |element: &Element| {
        let id = element.href()?.path().to_string();
        let title = if use_title_attribute {
            element.attr("title").unwrap_or_default().trim().to_string()
        } else {
            element.text.trim().to_string()
        };
        Ok(MediaInfo { id, title })
    })
}

pub fn default_info_extractor() -> InfoExtractor {
    anchor_info_extractor(false)
}

pub fn default_image_extractor() -> ImageExtractor {
    Arc::new(|element: &Element| {
        element
            .non_empty_attr("data-src")
            .or_else(|| element.non_empty_attr("src"))
            .map(str::to_string)
            .ok_or_else(|| ScrapeError::malformed(format!("<{}> carries no image source", element.name)))
    })
}

pub fn site_request(ctx: &ScraperContext, url: Url) -> FetchRequest {
    FetchRequest::get(url).headers(ctx.headers.iter())
}

/// Fetches `url` and takes the series title from the first element matching `query`.
pub async fn fetch_series_css(
    ctx: &ScraperContext,
    catalog: &Catalog,
    url: &str,
    query: &str,
) -> Result<Series> {
    let uri = Url::parse(url)?;
    let elements = ctx.fetcher.fetch_css(site_request(ctx, uri.clone()), query).await?;
    let element = elements
        .first()
        .ok_or_else(|| ScrapeError::not_found(format!("'{query}' on {uri}")))?;

    let title = if element.is_meta() {
        element.attr("content").unwrap_or_default().trim().to_string()
    } else {
        element.text.trim().to_string()
    };
    debug!("[EXTRACT] series '{}' at {}", title, uri.path());

    Ok(Series::new(catalog, uri.path(), title))
}

pub async fn fetch_series_single_page(
    ctx: &ScraperContext,
    catalog: &Catalog,
    path: &str,
    query: &str,
    extract: &InfoExtractor,
) -> Result<Vec<Series>> {
    let uri = ctx.info.base_url.join(path)?;
    let elements = ctx.fetcher.fetch_css(site_request(ctx, uri), query).await?;
    elements
        .iter()
        .map(|element| {
            let MediaInfo { id, title } = extract(element)?;
            Ok(Series::new(catalog, id, title))
        })
        .collect()
}

pub async fn fetch_chapters_single_page(
    ctx: &ScraperContext,
    series: &Series,
    query: &str,
    extract: &InfoExtractor,
) -> Result<Vec<Chapter>> {
    let uri = series.resolve(&ctx.info.base_url)?;
    let elements = ctx.fetcher.fetch_css(site_request(ctx, uri), query).await?;
    let chapters = elements
        .iter()
        .map(|element| {
            let MediaInfo { id, title } = extract(element)?;
            Ok(Chapter::new(series, id, &title))
        })
        .collect::<Result<Vec<_>>>()?;

    info!("[EXTRACT] {} chapters for {}", chapters.len(), series.title);
    Ok(chapters)
}

/// Resolves every image against the chapter's request URL and stamps that URL
/// as the page's Referer.
pub async fn fetch_pages_single_page(
    ctx: &ScraperContext,
    chapter: &Chapter,
    query: &str,
    extract: &ImageExtractor,
) -> Result<Vec<Page>> {
    let uri = chapter.resolve(&ctx.info.base_url)?;
    let request = site_request(ctx, uri.clone());
    let elements = ctx.fetcher.fetch_css(request, query).await?;
    let pages = elements
        .iter()
        .map(|element| {
            let link = uri.join(extract(element)?.trim())?;
            Ok(Page::new(chapter, link, uri.as_str()))
        })
        .collect::<Result<Vec<_>>>()?;

    info!("[EXTRACT] {} pages for {}", pages.len(), chapter.title);
    Ok(pages)
}
