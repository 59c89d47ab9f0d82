//! Prometheus metrics for connector fetches.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use std::sync::Arc;

use crate::observer::FetchObserver;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct SourceLabel(pub String);

impl prometheus_client::encoding::EncodeLabelSet for SourceLabel {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("source", self.0.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Per-source fetch counters; also usable as a [`FetchObserver`].
#[derive(Clone)]
pub struct MetricsObserver {
    pub fetches_started: Family<SourceLabel, Counter>,
    pub rows_read: Family<SourceLabel, Counter>,
    pub fetches_finished: Family<SourceLabel, Counter>,
    pub registry: Arc<Registry>,
}

impl MetricsObserver {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let fetches_started = Family::<SourceLabel, Counter>::default();
        registry.register(
            "sluice_fetches_started",
            "Remote fetches started per source",
            fetches_started.clone(),
        );

        let rows_read = Family::<SourceLabel, Counter>::default();
        registry.register(
            "sluice_rows_read",
            "Rows published to the query engine per source",
            rows_read.clone(),
        );

        let fetches_finished = Family::<SourceLabel, Counter>::default();
        registry.register(
            "sluice_fetches_finished",
            "Remote fetches finished per source, whatever the outcome",
            fetches_finished.clone(),
        );

        Self {
            fetches_started,
            rows_read,
            fetches_finished,
            registry: Arc::new(registry),
        }
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

impl Default for MetricsObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchObserver for MetricsObserver {
    fn report_begin(&self, source: &str) {
        self.fetches_started
            .get_or_create(&SourceLabel(source.to_string()))
            .inc();
    }

    fn report_rows_read(&self, source: &str, count: usize) {
        self.rows_read
            .get_or_create(&SourceLabel(source.to_string()))
            .inc_by(count as u64);
    }

    fn report_end(&self, source: &str, _total: usize) {
        self.fetches_finished
            .get_or_create(&SourceLabel(source.to_string()))
            .inc();
    }
}
