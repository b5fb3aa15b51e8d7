use crate::config::HttpConfig;
use crate::error::{Result, ScrapeError};
use reqwest::{Client, Method};
use scraper::{ElementRef, Html, Selector};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub cancel: Option<CancellationToken>,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Owned snapshot of a matched DOM element.
///
/// Parsed documents cannot be held across await points, so queries copy out
/// what extractors need: tag name, attributes, text and the outer HTML for
/// follow-up sub-queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: BTreeMap<String, String>,
    pub text: String,
    pub html: String,
    /// URL of the document the element was found in.
    pub document_url: Url,
}

#[async_trait::async_trait]
pub trait FetchProvider: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse>;

    /// Fetches `request` as HTML and returns every element matching `query`.
    async fn fetch_css(&self, request: FetchRequest, query: &str) -> Result<Vec<Element>> {
        let response = self.fetch(request).await?;
        let html = String::from_utf8_lossy(&response.body);
        parse_css(&html, query, &response.url)
    }
}

/// Fetches `request` and decodes the body as JSON, for sites that speak JSON.
pub async fn fetch_json<T: DeserializeOwned>(
    provider: &dyn FetchProvider,
    request: FetchRequest,
) -> Result<T> {
    let response = provider.fetch(request).await?;
    Ok(serde_json::from_slice(&response.body)?)
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: Vec::new(),
            cancel: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<'a, I>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (name, value) in headers {
            self.headers.push((name.clone(), value.clone()));
        }
        self
    }

    pub fn referer(self, referer: impl Into<String>) -> Self {
        self.header("Referer", referer)
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Attribute value, ignoring empty strings.
    pub fn non_empty_attr(&self, name: &str) -> Option<&str> {
        self.attr(name).map(str::trim).filter(|value| !value.is_empty())
    }

    pub fn is_meta(&self) -> bool {
        self.name.eq_ignore_ascii_case("meta")
    }

    pub fn href(&self) -> Result<Url> {
        let href = self
            .non_empty_attr("href")
            .ok_or_else(|| ScrapeError::malformed(format!("<{}> has no href", self.name)))?;
        Ok(self.document_url.join(href)?)
    }

    /// Runs `query` inside this element and returns the matches.
    pub fn select(&self, query: &str) -> Result<Vec<Element>> {
        let selector = compile(query)?;
        let fragment = Html::parse_fragment(&self.html);
        Ok(fragment
            .select(&selector)
            .map(|el| snapshot(el, &self.document_url))
            .collect())
    }

    /// Text of this element with every descendant matching `query` left out.
    pub fn text_without(&self, query: &str) -> Result<String> {
        let selector = compile(query)?;
        let fragment = Html::parse_fragment(&self.html);
        let removed: Vec<_> = fragment.select(&selector).map(|el| el.id()).collect();

        Ok(fragment
            .tree
            .root()
            .descendants()
            .filter(|node| !node.ancestors().any(|ancestor| removed.contains(&ancestor.id())))
            .filter_map(|node| node.value().as_text())
            .map(|text| &**text)
            .collect())
    }
}

/// Parses `html` and snapshots every element matching `query`.
pub fn parse_css(html: &str, query: &str, document_url: &Url) -> Result<Vec<Element>> {
    let selector = compile(query)?;
    let document = Html::parse_document(html);
    Ok(document
        .select(&selector)
        .map(|el| snapshot(el, document_url))
        .collect())
}

fn compile(query: &str) -> Result<Selector> {
    Selector::parse(query).map_err(|e| ScrapeError::selector(format!("{query}: {e}")))
}

fn snapshot(el: ElementRef<'_>, document_url: &Url) -> Element {
    Element {
        name: el.value().name().to_string(),
        attrs: el
            .value()
            .attrs()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
        text: el.text().collect::<String>(),
        html: el.html(),
        document_url: document_url.clone(),
    }
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { client })
    }

    async fn send(&self, request: FetchRequest) -> Result<FetchResponse> {
        let mut builder = self.client.request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::HttpStatus {
                status: status.as_u16(),
                url: request.url.to_string(),
            });
        }

        let url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();
        debug!("[FETCH] {} {} -> {} bytes", request.method, url, body.len());

        Ok(FetchResponse {
            url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

#[async_trait::async_trait]
impl FetchProvider for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        match request.cancel.clone() {
            Some(token) => {
                if token.is_cancelled() {
                    return Err(ScrapeError::Cancelled);
                }
                // Dropping the send future aborts the transfer; partial bodies are lost.
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(ScrapeError::Cancelled),
                    result = self.send(request) => result,
                }
            }
            None => self.send(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.org/manga/one/").unwrap()
    }

    #[test]
    fn parse_css_snapshots_attributes_and_text() {
        let html = r#"<ul><li><a href="ch-1/" title=" First ">Chapter <b>1</b></a></li>
                      <li><a href="/manga/one/ch-2/">Chapter 2</a></li></ul>"#;
        let elements = parse_css(html, "li a", &base()).unwrap();

        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].name, "a");
        assert_eq!(elements[0].text, "Chapter 1");
        assert_eq!(elements[0].attr("title"), Some(" First "));
        assert_eq!(
            elements[0].href().unwrap().as_str(),
            "https://example.org/manga/one/ch-1/"
        );
        assert_eq!(elements[1].href().unwrap().path(), "/manga/one/ch-2/");
    }

    #[test]
    fn meta_elements_are_recognised() {
        let html = r#"<html><head><meta property="og:title" content="Demo"></head></html>"#;
        let elements = parse_css(html, "meta[property='og:title']", &base()).unwrap();
        assert!(elements[0].is_meta());
        assert_eq!(elements[0].attr("content"), Some("Demo"));
    }

    #[test]
    fn sub_queries_and_bloat_removal() {
        let html = r#"<a href="/c/1/"><span class="num">Chapter 1</span><span class="new">NEW</span></a>"#;
        let anchor = parse_css(html, "a", &base()).unwrap().remove(0);

        let num = anchor.select("span.num").unwrap();
        assert_eq!(num[0].text, "Chapter 1");
        assert_eq!(anchor.text_without("span.new").unwrap(), "Chapter 1");
    }

    #[test]
    fn bloat_removal_drops_matched_nodes_only() {
        let html = r#"<a href="/c/3/">NEW Chapter 3 <em class="new">NEW</em></a>"#;
        let anchor = parse_css(html, "a", &base()).unwrap().remove(0);

        assert_eq!(anchor.text_without("em.new").unwrap(), "NEW Chapter 3 ");
        assert_eq!(anchor.text_without("em.missing").unwrap(), anchor.text);
    }

    #[test]
    fn invalid_selector_is_reported() {
        let err = parse_css("<p></p>", "p[[", &base()).unwrap_err();
        assert!(matches!(err, ScrapeError::Selector(_)));
    }

    #[test]
    fn request_builder_collects_headers() {
        let request = FetchRequest::get(base()).referer("https://example.org/").header("X-A", "1");
        assert_eq!(request.header_value("referer"), Some("https://example.org/"));
        assert_eq!(request.header_value("x-a"), Some("1"));
        assert!(request.cancel.is_none());
    }
}
