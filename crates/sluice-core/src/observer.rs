//! Observability sink for fetch lifecycles.

use std::sync::Arc;

use tracing::{debug, info};

/// Receives begin/row-count/end notifications bracketing one fetch.
pub trait FetchObserver: Send + Sync {
    fn report_begin(&self, source: &str);
    fn report_rows_read(&self, source: &str, count: usize);
    fn report_end(&self, source: &str, total: usize);
}

/// Writes the fetch lifecycle to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl FetchObserver for LoggingObserver {
    fn report_begin(&self, source: &str) {
        debug!(source, "fetch started");
    }

    fn report_rows_read(&self, source: &str, count: usize) {
        debug!(source, count, "rows read");
    }

    fn report_end(&self, source: &str, total: usize) {
        info!(source, total, "fetch finished");
    }
}

/// Fans notifications out to several observers in order.
#[derive(Clone, Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn FetchObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn FetchObserver>>) -> Self {
        Self { observers }
    }
}

impl FetchObserver for CompositeObserver {
    fn report_begin(&self, source: &str) {
        for o in &self.observers {
            o.report_begin(source);
        }
    }

    fn report_rows_read(&self, source: &str, count: usize) {
        for o in &self.observers {
            o.report_rows_read(source, count);
        }
    }

    fn report_end(&self, source: &str, total: usize) {
        for o in &self.observers {
            o.report_end(source, total);
        }
    }
}

/// Reports `begin` on creation and `end` exactly once when dropped, so the
/// end notification fires on success, error and abandonment alike.
pub(crate) struct ObserverGuard<'a> {
    observer: &'a dyn FetchObserver,
    source: &'a str,
    total: usize,
}

impl<'a> ObserverGuard<'a> {
    pub(crate) fn begin(observer: &'a dyn FetchObserver, source: &'a str) -> Self {
        observer.report_begin(source);
        Self {
            observer,
            source,
            total: 0,
        }
    }

    pub(crate) fn rows_read(&mut self, count: usize) {
        self.total += count;
        self.observer.report_rows_read(self.source, count);
    }
}

impl Drop for ObserverGuard<'_> {
    fn drop(&mut self) {
        self.observer.report_end(self.source, self.total);
    }
}
