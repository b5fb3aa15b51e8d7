use crate::composer::ScraperContext;
use crate::error::{Result, ScrapeError};
use crate::extract::{fetch_series_single_page, InfoExtractor};
use crate::models::{Catalog, Series};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Placeholder substituted with the page index in path templates.
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Decides whether one page of results ends the pagination run.
pub trait TerminationPolicy<T>: Send + Sync {
    /// `batch` is the freshly extracted page, `previous` the last page that was kept.
    fn is_last(&self, batch: &[T], previous: Option<&[T]>) -> bool;
}

/// Stops on the first page that yields nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyPage;

impl<T> TerminationPolicy<T> for EmptyPage {
    fn is_last(&self, batch: &[T], _previous: Option<&[T]>) -> bool {
        batch.is_empty()
    }
}

/// For sites that serve their last page again instead of an empty one: also
/// stops when the last identifier of a page equals the previous page's.
pub struct RepeatedIdentifier<T> {
    key: Arc<dyn Fn(&T) -> String + Send + Sync>,
}

impl<T> RepeatedIdentifier<T> {
    pub fn new(key: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        Self { key: Arc::new(key) }
    }
}

impl RepeatedIdentifier<Series> {
    pub fn by_series_id() -> Self {
        Self::new(|series: &Series| series.id.clone())
    }
}

impl<T> TerminationPolicy<T> for RepeatedIdentifier<T> {
    fn is_last(&self, batch: &[T], previous: Option<&[T]>) -> bool {
        let (Some(current), Some(last)) = (batch.last(), previous.and_then(|p| p.last())) else {
            return batch.is_empty();
        };
        (self.key)(current) == (self.key)(last)
    }
}

/// Runs `fetch_page` for `start, start + 1, ...` until `policy` reports the last page.
/// The terminating page is dropped; earlier pages are concatenated in order.
/// `throttle` is awaited before every fetch but the first. Any error discards
/// everything collected so far.
pub async fn paginate<T, F, Fut>(
    start: u32,
    throttle: Duration,
    policy: &dyn TerminationPolicy<T>,
    mut fetch_page: F,
) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut collected: Vec<T> = Vec::new();
    let mut previous_len: Option<usize> = None;
    let mut page = start;

    loop {
        if page != start && !throttle.is_zero() {
            tokio::time::sleep(throttle).await;
        }

        let batch = fetch_page(page).await?;
        let previous = previous_len.map(|len| &collected[collected.len() - len..]);
        if policy.is_last(&batch, previous) {
            debug!("[PAGINATION] page {} ends the run", page);
            break;
        }

        debug!("[PAGINATION] page {} yielded {} entries", page, batch.len());
        previous_len = Some(batch.len());
        collected.extend(batch);
        page = page
            .checked_add(1)
            .ok_or_else(|| ScrapeError::malformed(format!("pagination never ended (last page {page})")))?;
    }

    Ok(collected)
}

/// Parameters of a paged series list.
#[derive(Clone)]
pub struct MultiPage {
    pub path: String,
    pub query: String,
    pub start: u32,
    pub throttle: Duration,
    pub extract: InfoExtractor,
    pub termination: Arc<dyn TerminationPolicy<Series>>,
}

impl MultiPage {
    pub fn new(path: impl Into<String>, query: impl Into<String>, extract: InfoExtractor) -> Self {
        Self {
            path: path.into(),
            query: query.into(),
            start: 1,
            throttle: Duration::ZERO,
            extract,
            termination: Arc::new(EmptyPage),
        }
    }

    pub fn start(mut self, start: u32) -> Self {
        self.start = start;
        self
    }

    pub fn throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn termination(mut self, policy: Arc<dyn TerminationPolicy<Series>>) -> Self {
        self.termination = policy;
        self
    }
}

pub async fn fetch_series_multi_page(
    ctx: &ScraperContext,
    catalog: &Catalog,
    params: &MultiPage,
) -> Result<Vec<Series>> {
    let series = paginate(
        params.start,
        params.throttle,
        params.termination.as_ref(),
        |page| {
            let path = params.path.replace(PAGE_PLACEHOLDER, &page.to_string());
            async move {
                fetch_series_single_page(ctx, catalog, &path, &params.query, &params.extract).await
            }
        },
    )
    .await?;

    info!("[PAGINATION] {} series collected for {}", series.len(), catalog.label);
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;
    use tokio_test::assert_err;

    fn pages(data: Vec<Vec<u32>>) -> Arc<Mutex<Vec<Vec<u32>>>> {
        Arc::new(Mutex::new(data))
    }

    #[tokio::test]
    async fn concatenates_pages_until_empty() {
        let source = pages(vec![vec![1, 2], vec![3], vec![4, 5, 6], vec![], vec![99]]);
        let requested = Arc::new(Mutex::new(Vec::new()));

        let result = paginate(1, Duration::ZERO, &EmptyPage, |page| {
            let source = source.clone();
            let requested = requested.clone();
            async move {
                requested.lock().unwrap().push(page);
                Ok(source.lock().unwrap()[(page - 1) as usize].clone())
            }
        })
        .await
        .unwrap();

        assert_eq!(result, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(*requested.lock().unwrap(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn honours_start_index() {
        let result = paginate(0, Duration::ZERO, &EmptyPage, |page| async move {
            Ok(if page < 2 { vec![page] } else { vec![] })
        })
        .await
        .unwrap();

        assert_eq!(result, vec![0, 1]);
    }

    #[tokio::test]
    async fn error_discards_accumulated_entries() {
        let result: Result<Vec<u32>> = paginate(1, Duration::ZERO, &EmptyPage, |page| async move {
            if page == 3 {
                Err(ScrapeError::HttpStatus { status: 502, url: format!("/list/{page}") })
            } else {
                Ok(vec![page])
            }
        })
        .await;

        assert_err!(result);
    }

    #[tokio::test]
    async fn throttle_spaces_requests() {
        let throttle = Duration::from_millis(30);
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let started = Instant::now();

        paginate(1, throttle, &EmptyPage, |page| {
            let stamps = stamps.clone();
            async move {
                stamps.lock().unwrap().push(Instant::now());
                Ok(if page <= 2 { vec![page] } else { vec![] })
            }
        })
        .await
        .unwrap();

        let stamps = stamps.lock().unwrap();
        assert_eq!(stamps.len(), 3);
        // No delay before the first request.
        assert!(stamps[0].duration_since(started) < throttle);
        for pair in stamps.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= throttle);
        }
    }

    #[tokio::test]
    async fn repeated_identifier_stops_on_replayed_page() {
        // Page 3 onwards replays page 2 forever.
        let policy = RepeatedIdentifier::new(|n: &u32| n.to_string());
        let result = paginate(1, Duration::ZERO, &policy, |page| async move {
            Ok(match page {
                1 => vec![1, 2],
                _ => vec![3, 4],
            })
        })
        .await
        .unwrap();

        assert_eq!(result, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn repeated_identifier_still_stops_on_empty_page() {
        let policy = RepeatedIdentifier::new(|n: &u32| n.to_string());
        let result = paginate(1, Duration::ZERO, &policy, |page| async move {
            Ok(if page == 1 { vec![7] } else { vec![] })
        })
        .await
        .unwrap();

        assert_eq!(result, vec![7]);
    }

    #[tokio::test]
    async fn page_index_overflow_is_an_error() {
        let err = paginate(u32::MAX - 1, Duration::ZERO, &EmptyPage, |page| async move { Ok(vec![page]) })
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::MalformedData(_)));
    }
}
