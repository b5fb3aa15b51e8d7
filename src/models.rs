use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteInfo {
    pub id: String,
    pub label: String,
    pub base_url: Url,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Catalog {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Series {
    pub catalog_id: String,
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chapter {
    pub catalog_id: String,
    pub series_id: String,
    pub series_title: String,
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageParameters {
    pub referer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub chapter_id: String,
    pub url: Url,
    pub parameters: PageParameters,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryResult {
    pub data: Vec<u8>,
    pub content_type: String,
}

impl Series {
    pub fn new(catalog: &Catalog, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            catalog_id: catalog.id.clone(),
            id: id.into(),
            title: title.into(),
        }
    }

    pub fn resolve(&self, base_url: &Url) -> crate::error::Result<Url> {
        Ok(base_url.join(&self.id)?)
    }
}

impl Chapter {
    pub fn new(series: &Series, id: impl Into<String>, raw_title: &str) -> Self {
        Self {
            catalog_id: series.catalog_id.clone(),
            series_id: series.id.clone(),
            series_title: series.title.clone(),
            id: id.into(),
            title: derive_chapter_title(raw_title, &series.title),
        }
    }

    pub fn resolve(&self, base_url: &Url) -> crate::error::Result<Url> {
        Ok(base_url.join(&self.id)?)
    }
}

impl Page {
    pub fn new(chapter: &Chapter, url: Url, referer: impl Into<String>) -> Self {
        Self {
            chapter_id: chapter.id.clone(),
            url,
            parameters: PageParameters {
                referer: referer.into(),
            },
        }
    }
}

impl BinaryResult {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

pub fn derive_chapter_title(raw: &str, series_title: &str) -> String {
    let stripped = if series_title.is_empty() {
        raw.to_string()
    } else {
        raw.replacen(series_title, "", 1)
    };
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        series_title.to_string()
    } else {
        trimmed.to_string()
    }
}

impl std::fmt::Display for Series {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.title, self.id)
    }
}

impl std::fmt::Display for Chapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.title, self.id)
    }
}
