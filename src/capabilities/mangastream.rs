use crate::capabilities::common::{
    ChaptersSinglePage, PagesSinglePage, PatternUrl, SeriesCss, SeriesListMultiPage, SeriesListSinglePage,
};
use crate::composer::ScraperBuilder;
use crate::error::{Result, ScrapeError};
use crate::extract::{default_info_extractor, ImageExtractor, InfoExtractor};
use crate::fetch::Element;
use crate::models::MediaInfo;
use crate::pagination::{MultiPage, PAGE_PLACEHOLDER};
use std::sync::Arc;
use url::Url;

pub const SERIES_LIST_PATH: &str = "/manga/list-mode/";
pub const QUERY_SERIES_TITLE: &str = "div#content div.postbody article h1";
pub const QUERY_SERIES_LIST: &str = "div#content div.soralist ul li a.series";
pub const QUERY_CHAPTER_LIST: &str = "div#chapterlist ul li div.eph-num a";
pub const QUERY_CHAPTER_TITLE: &str = "span.chapternum";
pub const QUERY_PAGE_LIST: &str = r#"div#readerarea img[src]:not([src=""])"#;

#[derive(Debug, Clone)]
pub struct Queries {
    pub series_title: String,
    pub series_list_path: String,
    pub series_list: String,
    pub chapter_list: String,
    pub chapter_title: Option<String>,
    pub chapter_title_bloat: Option<String>,
    pub page_list: String,
}

impl Default for Queries {
    fn default() -> Self {
        Self {
            series_title: QUERY_SERIES_TITLE.to_string(),
            series_list_path: SERIES_LIST_PATH.to_string(),
            series_list: QUERY_SERIES_LIST.to_string(),
            chapter_list: QUERY_CHAPTER_LIST.to_string(),
            chapter_title: Some(QUERY_CHAPTER_TITLE.to_string()),
            chapter_title_bloat: None,
            page_list: QUERY_PAGE_LIST.to_string(),
        }
    }
}

/// Chapter links may be wrapped by the nofil.net link shortener; the real
/// target sits in its `url` query parameter.
fn unwrap_shortener(link: Url) -> Result<Url> {
    if link.host_str() != Some("nofil.net") || !link.path().contains("safeme") {
        return Ok(link);
    }
    let target = link
        .query_pairs()
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned());
    match target {
        Some(target) => Ok(Url::parse(&target)?),
        None => Ok(link),
    }
}

pub fn chapter_info_extractor(title_query: Option<String>, bloat_query: Option<String>) -> InfoExtractor {
    Arc::new(move |anchor: &Element| {
        let link = unwrap_shortener(anchor.href()?)?;

        let holder = match &title_query {
            Some(query) => anchor
                .select(query)?
                .into_iter()
                .next()
                .ok_or_else(|| ScrapeError::not_found(format!("chapter title '{query}'")))?,
            None => anchor.clone(),
        };
        let title = match &bloat_query {
            Some(query) => holder.text_without(query)?,
            None => holder.text,
        };

        Ok(MediaInfo {
            id: link.path().to_string(),
            title: title.trim().to_string(),
        })
    })
}

/// Lazy-loading attributes win over `src`; the result is absolute against the site.
pub fn image_extractor(base_url: Url) -> ImageExtractor {
    Arc::new(move |image: &Element| {
        let source = ["data-lazy-src", "data-src", "original", "src"]
            .iter()
            .find_map(|attr| image.non_empty_attr(attr))
            .ok_or_else(|| ScrapeError::malformed("image without source attribute"))?;
        Ok(base_url.join(source)?.to_string())
    })
}

/// Attaches the theme's capabilities. Image download is left to the caller.
pub fn attach(builder: ScraperBuilder, pattern: PatternUrl, queries: Queries, paging: Option<MultiPage>) -> ScraperBuilder {
    let base_url = builder.context().info.base_url.clone();

    let builder = builder
        .url("mangastream-url", pattern)
        .series("mangastream-series", SeriesCss::new(queries.series_title));

    let builder = if queries.series_list_path.contains(PAGE_PLACEHOLDER) {
        let params = paging.unwrap_or_else(|| {
            MultiPage::new(
                queries.series_list_path.clone(),
                queries.series_list.clone(),
                default_info_extractor(),
            )
        });
        builder.series_list("mangastream-series-list-paged", SeriesListMultiPage::new(params))
    } else {
        builder.series_list(
            "mangastream-series-list",
            SeriesListSinglePage::new(queries.series_list_path, queries.series_list),
        )
    };

    builder
        .chapters(
            "mangastream-chapters",
            ChaptersSinglePage::new(queries.chapter_list)
                .extractor(chapter_info_extractor(queries.chapter_title, queries.chapter_title_bloat)),
        )
        .pages(
            "mangastream-pages",
            PagesSinglePage::new(queries.page_list).extractor(image_extractor(base_url)),
        )
}
