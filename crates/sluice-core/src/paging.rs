//! Page-following fetch loop.
//!
//! Maps skip/take hints onto 1-based page numbers, pulls pages from a
//! [`PageSource`] one at a time and publishes each page as a single chunk to
//! a [`ChunkSink`]. The loop is a small state machine:
//!
//! ```text
//! NotStarted -> FetchingPage -> Publishing -> FetchingPage ...
//!                     |              |
//!                     v              v
//!            Done | Cancelled | Failed
//! ```
//!
//! Termination:
//! - an empty page ends the fetch;
//! - a page shorter than the page size ends it after publishing, without a
//!   trailing call;
//! - an exhausted take budget ends it after publishing;
//! - cancellation is checked before every page call.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::cancel::CancellationSignal;
use crate::error::FetchError;
use crate::observer::{FetchObserver, LoggingObserver, ObserverGuard};

/// One page request. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
}

impl PageRequest {
    /// Zero-based index of the first row on this page.
    pub fn offset(&self) -> usize {
        (self.page - 1) * self.page_size
    }
}

/// Row-window hints from the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchHints {
    pub skip: Option<usize>,
    pub take: Option<usize>,
}

impl FetchHints {
    pub fn take(take: Option<usize>) -> Self {
        Self { skip: None, take }
    }
}

/// A remote list API bound to one rendered query.
#[async_trait]
pub trait PageSource: fmt::Debug + Send + Sync {
    type Item: Send + Sync + 'static;

    /// Fetch one page. An error here aborts the fetch.
    async fn fetch_page(
        &self,
        request: PageRequest,
        cancel: &CancellationSignal,
    ) -> anyhow::Result<Vec<Self::Item>>;

    /// Optionally fetch extended details for one item. `Ok(None)` keeps the
    /// item as listed; an error also keeps it as listed.
    async fn enrich(
        &self,
        _item: &Self::Item,
        _cancel: &CancellationSignal,
    ) -> anyhow::Result<Option<Self::Item>> {
        Ok(None)
    }
}

/// Destination for published chunks.
#[async_trait]
pub trait ChunkSink<T: Send>: Send {
    /// Hand over one chunk. Returns `false` once the consumer is gone.
    async fn publish(&mut self, chunk: Vec<T>) -> bool;
}

#[async_trait]
impl<T: Send + 'static> ChunkSink<T> for mpsc::Sender<Vec<T>> {
    async fn publish(&mut self, chunk: Vec<T>) -> bool {
        self.send(chunk).await.is_ok()
    }
}

/// Transient position of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCursor {
    pub page: usize,
    pub page_size: usize,
    pub rows_emitted: usize,
    /// Remaining row budget; `None` is unbounded.
    pub remaining: Option<usize>,
    /// Leading rows of the current page that fall before `skip`.
    pub skip_in_page: usize,
    pub pages_fetched: usize,
}

impl FetchCursor {
    pub fn new(page_size: usize, hints: FetchHints) -> Self {
        let page_size = page_size.max(1);
        let skip = hints.skip.unwrap_or(0);
        Self {
            page: skip / page_size + 1,
            page_size,
            rows_emitted: 0,
            remaining: hints.take,
            skip_in_page: skip % page_size,
            pages_fetched: 0,
        }
    }

    pub fn request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            page_size: self.page_size,
        }
    }

    pub fn budget_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Drop rows before `skip` and cut the page down to the budget.
    fn admit<T>(&mut self, mut items: Vec<T>) -> Vec<T> {
        if self.skip_in_page > 0 {
            let skipped = self.skip_in_page.min(items.len());
            items.drain(..skipped);
            self.skip_in_page = 0;
        }
        if let Some(remaining) = self.remaining {
            items.truncate(remaining);
        }
        items
    }

    fn record_published(&mut self, count: usize) {
        self.rows_emitted += count;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(count);
        }
    }
}

/// How a fetch that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The remote ran out of rows.
    Exhausted,
    /// The take budget was used up.
    LimitReached,
    /// Cancellation was requested or the consumer went away.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    pub outcome: FetchOutcome,
    pub pages_fetched: usize,
    pub rows_emitted: usize,
}

enum FetchState<T> {
    NotStarted,
    FetchingPage,
    Publishing { items: Vec<T>, short_page: bool },
    Done(FetchOutcome),
    Cancelled,
    Failed(FetchError),
}

/// One fetch invocation over a [`PageSource`].
pub struct FetchLoop<'a, S: PageSource + ?Sized> {
    source_name: &'a str,
    source: &'a S,
    page_size: usize,
    hints: FetchHints,
    cancel: CancellationSignal,
    observer: Arc<dyn FetchObserver>,
}

impl<'a, S: PageSource + ?Sized> FetchLoop<'a, S> {
    pub fn new(source_name: &'a str, source: &'a S, page_size: usize) -> Self {
        Self {
            source_name,
            source,
            page_size,
            hints: FetchHints::default(),
            cancel: CancellationSignal::never(),
            observer: Arc::new(LoggingObserver),
        }
    }

    pub fn with_hints(mut self, hints: FetchHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn FetchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run to completion, publishing chunks into `sink`.
    pub async fn run<K>(self, sink: &mut K) -> Result<FetchSummary, FetchError>
    where
        K: ChunkSink<S::Item> + ?Sized,
    {
        let mut guard = ObserverGuard::begin(self.observer.as_ref(), self.source_name);
        let mut cursor = FetchCursor::new(self.page_size, self.hints);
        let mut state = FetchState::NotStarted;

        loop {
            state = match state {
                FetchState::NotStarted => {
                    if cursor.budget_exhausted() {
                        FetchState::Done(FetchOutcome::LimitReached)
                    } else {
                        FetchState::FetchingPage
                    }
                }
                FetchState::FetchingPage => self.fetch_page(&mut cursor).await,
                FetchState::Publishing { items, short_page } => {
                    let items = self.enrich_all(items).await;
                    let count = items.len();
                    if count > 0 && !sink.publish(items).await {
                        FetchState::Cancelled
                    } else {
                        cursor.record_published(count);
                        if count > 0 {
                            guard.rows_read(count);
                        }
                        if short_page {
                            FetchState::Done(FetchOutcome::Exhausted)
                        } else if cursor.budget_exhausted() {
                            FetchState::Done(FetchOutcome::LimitReached)
                        } else {
                            cursor.page += 1;
                            FetchState::FetchingPage
                        }
                    }
                }
                FetchState::Done(outcome) => {
                    return Ok(summary(outcome, &cursor));
                }
                FetchState::Cancelled => {
                    debug!(source = self.source_name, page = cursor.page, "fetch cancelled");
                    return Ok(summary(FetchOutcome::Cancelled, &cursor));
                }
                FetchState::Failed(err) => return Err(err),
            };
        }
    }

    async fn fetch_page(&self, cursor: &mut FetchCursor) -> FetchState<S::Item> {
        if self.cancel.is_cancelled() {
            return FetchState::Cancelled;
        }

        let request = cursor.request();
        debug!(
            source = self.source_name,
            page = request.page,
            page_size = request.page_size,
            "fetching page"
        );

        match self.source.fetch_page(request, &self.cancel).await {
            Ok(items) => {
                cursor.pages_fetched += 1;
                if items.is_empty() {
                    return FetchState::Done(FetchOutcome::Exhausted);
                }
                let short_page = items.len() < cursor.page_size;
                FetchState::Publishing {
                    items: cursor.admit(items),
                    short_page,
                }
            }
            Err(_) if self.cancel.is_cancelled() => FetchState::Cancelled,
            Err(source) => {
                error!(
                    source = self.source_name,
                    page = request.page,
                    error = %source,
                    "page fetch failed"
                );
                FetchState::Failed(FetchError::Remote {
                    source_name: self.source_name.to_string(),
                    page: request.page,
                    source,
                })
            }
        }
    }

    /// Enrich items one by one, keeping the listed item whenever enrichment
    /// fails or is skipped.
    async fn enrich_all(&self, items: Vec<S::Item>) -> Vec<S::Item> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if self.cancel.is_cancelled() {
                out.push(item);
                continue;
            }
            match self.source.enrich(&item, &self.cancel).await {
                Ok(Some(enriched)) => out.push(enriched),
                Ok(None) => out.push(item),
                Err(e) => {
                    warn!(
                        source = self.source_name,
                        error = %e,
                        "enrichment failed, keeping listed item"
                    );
                    out.push(item);
                }
            }
        }
        out
    }
}

fn summary(outcome: FetchOutcome, cursor: &FetchCursor) -> FetchSummary {
    FetchSummary {
        outcome,
        pages_fetched: cursor.pages_fetched,
        rows_emitted: cursor.rows_emitted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationHandle;
    use crate::observer::tests::RecordingObserver;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Serves pages of the given sizes; items are their global row index.
    #[derive(Debug, Default)]
    struct ScriptedPages {
        page_sizes: Vec<usize>,
        requests: Mutex<Vec<PageRequest>>,
        fail_on_page: Option<usize>,
        failing_items: HashSet<usize>,
        cancel_after_page: Option<(usize, Arc<CancellationHandle>)>,
    }

    impl ScriptedPages {
        fn new(page_sizes: &[usize]) -> Self {
            Self {
                page_sizes: page_sizes.to_vec(),
                ..Default::default()
            }
        }

        fn requests(&self) -> Vec<PageRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn pages_requested(&self) -> Vec<usize> {
            self.requests().iter().map(|r| r.page).collect()
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        index: usize,
        enriched: bool,
    }

    #[async_trait]
    impl PageSource for ScriptedPages {
        type Item = Row;

        async fn fetch_page(
            &self,
            request: PageRequest,
            _cancel: &CancellationSignal,
        ) -> anyhow::Result<Vec<Row>> {
            self.requests.lock().unwrap().push(request);
            if self.fail_on_page == Some(request.page) {
                anyhow::bail!("HTTP 503 from remote");
            }
            if let Some((page, handle)) = &self.cancel_after_page {
                if *page == request.page {
                    handle.cancel();
                }
            }
            let size = self.page_sizes.get(request.page - 1).copied().unwrap_or(0);
            let start = request.offset();
            Ok((start..start + size)
                .map(|index| Row {
                    index,
                    enriched: false,
                })
                .collect())
        }

        async fn enrich(
            &self,
            item: &Row,
            _cancel: &CancellationSignal,
        ) -> anyhow::Result<Option<Row>> {
            if self.failing_items.contains(&item.index) {
                anyhow::bail!("detail call failed for {}", item.index);
            }
            Ok(Some(Row {
                index: item.index,
                enriched: true,
            }))
        }
    }

    /// Collects chunks; optionally closes after a number of chunks.
    #[derive(Default)]
    struct VecSink {
        chunks: Vec<Vec<Row>>,
        close_after: Option<usize>,
    }

    impl VecSink {
        fn rows(&self) -> Vec<Row> {
            self.chunks.iter().flatten().cloned().collect()
        }
    }

    #[async_trait]
    impl ChunkSink<Row> for VecSink {
        async fn publish(&mut self, chunk: Vec<Row>) -> bool {
            if self.close_after == Some(self.chunks.len()) {
                return false;
            }
            self.chunks.push(chunk);
            true
        }
    }

    async fn run(source: &ScriptedPages, page_size: usize, hints: FetchHints) -> (FetchSummary, VecSink) {
        let mut sink = VecSink::default();
        let summary = FetchLoop::new("test", source, page_size)
            .with_hints(hints)
            .run(&mut sink)
            .await
            .unwrap();
        (summary, sink)
    }

    #[test]
    fn test_cursor_maps_skip_to_page() {
        let cursor = FetchCursor::new(
            100,
            FetchHints {
                skip: Some(250),
                take: None,
            },
        );
        assert_eq!(cursor.page, 3);
        assert_eq!(cursor.skip_in_page, 50);
        assert_eq!(cursor.request().offset(), 200);
    }

    #[test]
    fn test_cursor_zero_page_size_is_clamped() {
        let cursor = FetchCursor::new(0, FetchHints::default());
        assert_eq!(cursor.page_size, 1);
        assert_eq!(cursor.page, 1);
    }

    #[tokio::test]
    async fn test_short_page_stops_without_extra_call() {
        let source = ScriptedPages::new(&[100, 100, 37]);
        let (summary, sink) = run(&source, 100, FetchHints::default()).await;
        assert_eq!(source.pages_requested(), vec![1, 2, 3]);
        assert_eq!(summary.outcome, FetchOutcome::Exhausted);
        assert_eq!(summary.rows_emitted, 237);
        assert_eq!(sink.chunks.len(), 3);
        assert_eq!(sink.chunks[2].len(), 37);
    }

    #[tokio::test]
    async fn test_empty_page_stops_after_fourth_call() {
        let source = ScriptedPages::new(&[100, 100, 100, 0]);
        let (summary, sink) = run(&source, 100, FetchHints::default()).await;
        assert_eq!(source.pages_requested(), vec![1, 2, 3, 4]);
        assert_eq!(summary.pages_fetched, 4);
        assert_eq!(summary.rows_emitted, 300);
        assert_eq!(sink.chunks.len(), 3);
    }

    #[tokio::test]
    async fn test_skip_starts_at_containing_page() {
        let source = ScriptedPages::new(&[100, 100, 100, 100, 20]);
        let hints = FetchHints {
            skip: Some(250),
            take: None,
        };
        let (summary, sink) = run(&source, 100, hints).await;
        assert_eq!(source.requests()[0].page, 3);
        assert_eq!(source.pages_requested(), vec![3, 4, 5]);
        let rows = sink.rows();
        assert_eq!(rows.first().map(|r| r.index), Some(250));
        assert_eq!(rows.last().map(|r| r.index), Some(419));
        assert_eq!(summary.rows_emitted, 170);
    }

    #[tokio::test]
    async fn test_take_truncates_first_page() {
        let source = ScriptedPages::new(&[100, 100]);
        let (summary, sink) = run(&source, 100, FetchHints::take(Some(5))).await;
        assert_eq!(source.pages_requested(), vec![1]);
        assert_eq!(sink.rows().len(), 5);
        assert_eq!(summary.outcome, FetchOutcome::LimitReached);
    }

    #[tokio::test]
    async fn test_take_spanning_pages() {
        let source = ScriptedPages::new(&[10, 10, 10]);
        let (_, sink) = run(&source, 10, FetchHints::take(Some(15))).await;
        assert_eq!(source.pages_requested(), vec![1, 2]);
        assert_eq!(sink.chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![10, 5]);
    }

    #[tokio::test]
    async fn test_take_zero_issues_no_calls() {
        let source = ScriptedPages::new(&[10]);
        let (summary, sink) = run(&source, 10, FetchHints::take(Some(0))).await;
        assert!(source.requests().is_empty());
        assert!(sink.chunks.is_empty());
        assert_eq!(summary.outcome, FetchOutcome::LimitReached);
    }

    #[tokio::test]
    async fn test_rows_keep_remote_order() {
        let source = ScriptedPages::new(&[3, 3, 1]);
        let (_, sink) = run(&source, 3, FetchHints::default()).await;
        let indices: Vec<usize> = sink.rows().iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_enrichment_failure_keeps_listed_item() {
        let mut source = ScriptedPages::new(&[4]);
        source.failing_items.insert(2);
        let (_, sink) = run(&source, 10, FetchHints::default()).await;
        let rows = sink.rows();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows.iter().filter(|r| r.enriched).count(), 3);
        assert!(!rows[2].enriched);
    }

    #[tokio::test]
    async fn test_page_failure_aborts_with_source_name() {
        let mut source = ScriptedPages::new(&[10, 10, 10]);
        source.fail_on_page = Some(2);
        let mut sink = VecSink::default();
        let err = FetchLoop::new("jira_issues", &source, 10)
            .run(&mut sink)
            .await
            .unwrap_err();
        assert_eq!(err.source_name(), "jira_issues");
        assert!(err.to_string().contains("jira_issues"));
        assert!(err.to_string().contains("HTTP 503"));
        assert_eq!(sink.chunks.len(), 1);
        assert_eq!(source.pages_requested(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_cancel_before_start_makes_no_calls() {
        let source = ScriptedPages::new(&[10, 10]);
        let handle = CancellationHandle::new();
        handle.cancel();
        let mut sink = VecSink::default();
        let summary = FetchLoop::new("test", &source, 10)
            .with_cancellation(handle.signal())
            .run(&mut sink)
            .await
            .unwrap();
        assert_eq!(summary.outcome, FetchOutcome::Cancelled);
        assert!(source.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_between_pages_stops_cleanly() {
        let handle = Arc::new(CancellationHandle::new());
        let mut source = ScriptedPages::new(&[10, 10, 10]);
        source.cancel_after_page = Some((2, handle.clone()));
        let mut sink = VecSink::default();
        let summary = FetchLoop::new("test", &source, 10)
            .with_cancellation(handle.signal())
            .run(&mut sink)
            .await
            .unwrap();
        assert_eq!(summary.outcome, FetchOutcome::Cancelled);
        assert_eq!(source.pages_requested(), vec![1, 2]);
        // Page 2 was already fetched, so it is still published.
        assert_eq!(sink.rows().len(), 20);
    }

    #[tokio::test]
    async fn test_closed_sink_is_treated_as_cancellation() {
        let source = ScriptedPages::new(&[10, 10, 10]);
        let mut sink = VecSink {
            close_after: Some(1),
            ..Default::default()
        };
        let summary = FetchLoop::new("test", &source, 10)
            .run(&mut sink)
            .await
            .unwrap();
        assert_eq!(summary.outcome, FetchOutcome::Cancelled);
        assert_eq!(source.pages_requested(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_observer_brackets_success_and_failure() {
        let observer = Arc::new(RecordingObserver::default());
        let source = ScriptedPages::new(&[2, 1]);
        let mut sink = VecSink::default();
        FetchLoop::new("gh", &source, 2)
            .with_observer(observer.clone())
            .run(&mut sink)
            .await
            .unwrap();
        assert_eq!(
            observer.events(),
            vec!["begin:gh", "rows:gh:2", "rows:gh:1", "end:gh:3"]
        );

        let observer = Arc::new(RecordingObserver::default());
        let mut source = ScriptedPages::new(&[2, 2]);
        source.fail_on_page = Some(2);
        let mut sink = VecSink::default();
        let result = FetchLoop::new("gh", &source, 2)
            .with_observer(observer.clone())
            .run(&mut sink)
            .await;
        assert!(result.is_err());
        assert_eq!(
            observer.events(),
            vec!["begin:gh", "rows:gh:2", "end:gh:2"]
        );
    }

    #[tokio::test]
    async fn test_mpsc_sender_as_sink() {
        let source = ScriptedPages::new(&[2, 2, 1]);
        let (mut tx, mut rx) = mpsc::channel::<Vec<Row>>(1);
        let consumer = tokio::spawn(async move {
            let mut total = 0;
            while let Some(chunk) = rx.recv().await {
                total += chunk.len();
            }
            total
        });
        FetchLoop::new("test", &source, 2).run(&mut tx).await.unwrap();
        drop(tx);
        assert_eq!(consumer.await.unwrap(), 5);
    }
}
