use mangapipe::capabilities::mangastream;
use mangapipe::config::{PaginationConfig, Preset, SelectorsConfig, SiteConfig, TerminationConfig};
use mangapipe::config::HttpConfig;
use mangapipe::fetch::{fetch_json, FetchRequest};
use mangapipe::registry::build_site;
use mangapipe::{ErrorKind, HttpFetcher, Priority, Scraper, ScrapeError, TaskPool};
use mockito::{Matcher, Server, ServerGuard};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

const SERIES_PAGE: &str = r#"<html><body><div id="content"><div class="postbody"><article>
    <h1> Demo Title </h1>
    <div id="chapterlist"><ul>
      <li><div class="eph-num"><a href="/demo-title-chapter-2/"><span class="chapternum">Demo Title Chapter 2</span><span class="chapterdate">May 2</span></a></div></li>
      <li><div class="eph-num"><a href="/demo-title-chapter-1/"><span class="chapternum">Demo Title</span></a></div></li>
    </ul></div>
    </article></div></div></body></html>"#;

const CHAPTER_PAGE: &str = r#"<html><body><div id="readerarea">
    <img src="/img/001.png">
    <img src="/blank.gif" data-lazy-src="/img/002.png">
    <img src="">
    </div></body></html>"#;

fn mangastream_site(server: &ServerGuard, detect_mime: bool) -> SiteConfig {
    SiteConfig {
        label: "Demo Stream".into(),
        base_url: server.url(),
        icon: None,
        preset: Preset::MangaStream,
        url_pattern: format!("^{}/manga/[^/]+/$", regex::escape(&server.url())),
        detect_mime,
        user_agent: Some("MangaPipeTest/1.0".into()),
        headers: None,
        selectors: SelectorsConfig::default(),
        pagination: PaginationConfig::default(),
    }
}

fn build(site: &SiteConfig, pool: Arc<TaskPool>) -> Scraper {
    let fetcher = Arc::new(HttpFetcher::new(&HttpConfig::default()).unwrap());
    build_site("demo", site, fetcher, pool).unwrap()
}

#[tokio::test]
async fn mangastream_site_walks_series_chapters_and_pages() {
    let mut server = Server::new_async().await;
    let series_mock = server
        .mock("GET", "/manga/demo-title/")
        .match_header("user-agent", "MangaPipeTest/1.0")
        .with_header("content-type", "text/html")
        .with_body(SERIES_PAGE)
        .expect(2)
        .create_async()
        .await;
    let chapter_mock = server
        .mock("GET", "/demo-title-chapter-2/")
        .with_header("content-type", "text/html")
        .with_body(CHAPTER_PAGE)
        .create_async()
        .await;

    let scraper = build(&mangastream_site(&server, true), Arc::new(TaskPool::new(2)));
    let series_url = format!("{}/manga/demo-title/", server.url());
    assert!(scraper.validate_url(&series_url));
    assert!(!scraper.validate_url(&format!("{}/other/demo-title/", server.url())));

    let series = scraper.fetch_series(&scraper.catalog(), &series_url).await.unwrap();
    assert_eq!(series.id, "/manga/demo-title/");
    assert_eq!(series.title, "Demo Title");
    assert_eq!(series.catalog_id, "demo");

    let chapters = scraper.fetch_chapters(&series).await.unwrap();
    let listed: Vec<_> = chapters.iter().map(|c| (c.id.as_str(), c.title.as_str())).collect();
    assert_eq!(
        listed,
        vec![("/demo-title-chapter-2/", "Chapter 2"), ("/demo-title-chapter-1/", "Demo Title")]
    );

    let pages = scraper.fetch_pages(&chapters[0]).await.unwrap();
    let chapter_url = format!("{}/demo-title-chapter-2/", server.url());
    let urls: Vec<_> = pages.iter().map(|p| p.url.to_string()).collect();
    assert_eq!(
        urls,
        vec![format!("{}/img/001.png", server.url()), format!("{}/img/002.png", server.url())]
    );
    assert!(pages.iter().all(|p| p.parameters.referer == chapter_url));
    assert!(pages.iter().all(|p| p.chapter_id == "/demo-title-chapter-2/"));

    series_mock.assert_async().await;
    chapter_mock.assert_async().await;
}

#[tokio::test]
async fn image_download_sends_referer_and_sniffs_content_type() {
    let mut server = Server::new_async().await;
    let chapter_url = format!("{}/demo-title-chapter-2/", server.url());
    server
        .mock("GET", "/demo-title-chapter-2/")
        .with_body(CHAPTER_PAGE)
        .expect(2)
        .create_async()
        .await;
    let image_mock = server
        .mock("GET", Matcher::Regex(r"^/img/00[12]\.png$".into()))
        .match_header("referer", chapter_url.as_str())
        .with_header("content-type", "image/jpeg")
        .with_body(PNG_BYTES)
        .expect(4)
        .create_async()
        .await;

    for (detect_mime, expected) in [(true, "image/png"), (false, "image/jpeg")] {
        let scraper = build(&mangastream_site(&server, detect_mime), Arc::new(TaskPool::new(1)));
        let series = mangapipe::Series::new(&scraper.catalog(), "/manga/demo-title/", "Demo Title");
        let chapter = mangapipe::Chapter::new(&series, "/demo-title-chapter-2/", "Demo Title Chapter 2");

        let pages = scraper.fetch_pages(&chapter).await.unwrap();
        for page in &pages {
            let image = scraper
                .fetch_image(page, Priority::NORMAL, CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(image.content_type, expected);
            assert_eq!(image.data, PNG_BYTES);
        }
    }

    image_mock.assert_async().await;
}

#[tokio::test]
async fn cancelling_a_queued_image_never_reaches_the_network() {
    let mut server = Server::new_async().await;
    let image_mock = server.mock("GET", "/img/001.png").with_body(PNG_BYTES).expect(0).create_async().await;

    let pool = Arc::new(TaskPool::new(1));
    let scraper = build(&mangastream_site(&server, true), pool.clone());

    // Occupy the only slot until the test is done.
    let (release, held) = tokio::sync::oneshot::channel::<()>();
    let blocker = tokio::spawn({
        let pool = pool.clone();
        async move {
            pool.add(
                |_token| async move {
                    let _ = held.await;
                    Ok::<_, ScrapeError>(())
                },
                Priority::HIGH,
                CancellationToken::new(),
            )
            .await
        }
    });
    while pool.stats().running == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let series = mangapipe::Series::new(&scraper.catalog(), "/manga/demo-title/", "Demo Title");
    let chapter = mangapipe::Chapter::new(&series, "/demo-title-chapter-2/", "Chapter 2");
    let page = mangapipe::Page::new(
        &chapter,
        url::Url::parse(&format!("{}/img/001.png", server.url())).unwrap(),
        "",
    );

    let cancel = CancellationToken::new();
    let (result, _) = tokio::join!(scraper.fetch_image(&page, Priority::NORMAL, cancel.clone()), async {
        while pool.stats().queued == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
    });

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(pool.stats().queued, 0);

    release.send(()).unwrap();
    blocker.await.unwrap().unwrap();
    assert_eq!(pool.stats().running, 0);
    image_mock.assert_async().await;
}

#[tokio::test]
async fn missing_series_title_is_not_found() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/manga/empty/")
        .with_body("<html><body><p>Nothing here</p></body></html>")
        .create_async()
        .await;

    let scraper = build(&mangastream_site(&server, true), Arc::new(TaskPool::new(1)));
    let err = scraper
        .fetch_series(&scraper.catalog(), &format!("{}/manga/empty/", server.url()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn http_error_status_is_a_network_failure() {
    let mut server = Server::new_async().await;
    server.mock("GET", "/manga/gone/").with_status(404).create_async().await;

    let scraper = build(&mangastream_site(&server, true), Arc::new(TaskPool::new(1)));
    let err = scraper
        .fetch_series(&scraper.catalog(), &format!("{}/manga/gone/", server.url()))
        .await
        .unwrap_err();
    assert!(matches!(err, ScrapeError::HttpStatus { status: 404, .. }));
    assert_eq!(err.kind(), ErrorKind::NetworkFailure);
}

fn list_page(items: &[(&str, &str)]) -> String {
    let links: String = items
        .iter()
        .map(|(href, title)| format!(r#"<li><a class="series" href="{href}">{title}</a></li>"#))
        .collect();
    format!(r#"<html><body><ul class="list">{links}</ul></body></html>"#)
}

fn generic_list_site(server: &ServerGuard, termination: TerminationConfig) -> SiteConfig {
    SiteConfig {
        label: "Paged".into(),
        base_url: server.url(),
        icon: None,
        preset: Preset::Generic,
        url_pattern: format!("^{}/series/", regex::escape(&server.url())),
        detect_mime: false,
        user_agent: None,
        headers: Some([("X-Requested-With".to_string(), "mangapipe".to_string())].into_iter().collect()),
        selectors: SelectorsConfig {
            series_list_path: Some("/list/page/{page}/".into()),
            series_list: Some("ul.list a.series".into()),
            ..SelectorsConfig::default()
        },
        pagination: PaginationConfig {
            start: 1,
            throttle_ms: 20,
            termination,
        },
    }
}

#[tokio::test]
async fn paged_series_list_stops_at_first_empty_page() {
    let mut server = Server::new_async().await;
    let mut mocks = Vec::new();
    for (page, body) in [
        (1, list_page(&[("/series/a/", "A"), ("/series/b/", "B")])),
        (2, list_page(&[("/series/c/", "C")])),
        (3, list_page(&[])),
    ] {
        mocks.push(
            server
                .mock("GET", format!("/list/page/{page}/").as_str())
                .match_header("x-requested-with", "mangapipe")
                .with_body(body)
                .expect(1)
                .create_async()
                .await,
        );
    }

    let scraper = build(&generic_list_site(&server, TerminationConfig::EmptyPage), Arc::new(TaskPool::new(1)));
    let started = std::time::Instant::now();
    let list = scraper.fetch_series_list(&scraper.catalog()).await.unwrap();

    let ids: Vec<_> = list.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["/series/a/", "/series/b/", "/series/c/"]);
    assert_eq!(list[2].title, "C");
    // Two throttled gaps between three fetches.
    assert!(started.elapsed() >= Duration::from_millis(40));
    for mock in mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn paged_series_list_can_stop_on_repeated_page() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/list/page/1/")
        .with_body(list_page(&[("/series/a/", "A")]))
        .create_async()
        .await;
    // Sites that clamp out-of-range pages keep serving the last one.
    let last = server
        .mock("GET", Matcher::Regex(r"^/list/page/[23]/$".into()))
        .with_body(list_page(&[("/series/z/", "Z")]))
        .expect(2)
        .create_async()
        .await;

    let scraper = build(&generic_list_site(&server, TerminationConfig::RepeatedId), Arc::new(TaskPool::new(1)));
    let list = scraper.fetch_series_list(&scraper.catalog()).await.unwrap();

    let ids: Vec<_> = list.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["/series/a/", "/series/z/"]);
    last.assert_async().await;
}

#[tokio::test]
async fn failing_page_discards_the_whole_list() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/list/page/1/")
        .with_body(list_page(&[("/series/a/", "A")]))
        .create_async()
        .await;
    server.mock("GET", "/list/page/2/").with_status(500).create_async().await;

    let scraper = build(&generic_list_site(&server, TerminationConfig::EmptyPage), Arc::new(TaskPool::new(1)));
    let err = scraper.fetch_series_list(&scraper.catalog()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NetworkFailure);
}

#[derive(serde::Deserialize, Debug, PartialEq)]
struct ChapterFeed {
    chapters: Vec<String>,
}

#[tokio::test]
async fn json_endpoints_decode_through_the_fetcher() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/chapters")
        .with_header("content-type", "application/json")
        .with_body(r#"{"chapters": ["/c/1/", "/c/2/"]}"#)
        .create_async()
        .await;
    server.mock("GET", "/api/broken").with_body("<html>").create_async().await;

    let fetcher = HttpFetcher::new(&HttpConfig::default()).unwrap();
    let url = url::Url::parse(&server.url()).unwrap();

    let feed: ChapterFeed = fetch_json(&fetcher, FetchRequest::get(url.join("/api/chapters").unwrap()))
        .await
        .unwrap();
    assert_eq!(feed.chapters, vec!["/c/1/", "/c/2/"]);

    let err = fetch_json::<ChapterFeed>(&fetcher, FetchRequest::get(url.join("/api/broken").unwrap()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedData);
}

#[test]
fn default_queries_match_the_theme() {
    let queries = mangastream::Queries::default();
    assert_eq!(queries.series_list_path, mangastream::SERIES_LIST_PATH);
    assert_eq!(queries.chapter_title.as_deref(), Some(mangastream::QUERY_CHAPTER_TITLE));
}
