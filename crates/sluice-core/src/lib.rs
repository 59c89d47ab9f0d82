//! Sluice Core - predicate pushdown and paginated fetch engine
//!
//! Shared machinery for the remote-API table connectors:
//! - a filter tree lowered from DataFusion expressions ([`expr`])
//! - conservative extraction into per-source vocabularies ([`extract`])
//! - a page-following fetch loop with skip/take and cancellation ([`paging`])
//! - static column maps turning entities into Arrow batches ([`columns`])
//! - fetch observers for logging and Prometheus metrics

pub mod cancel;
pub mod columns;
pub mod error;
pub mod expr;
pub mod extract;
pub mod metrics;
pub mod observer;
pub mod paging;

pub use cancel::{CancelOnDrop, CancellationHandle, CancellationSignal};
pub use columns::{Column, ColumnDescription, ColumnKind, ColumnMap, ColumnValue, RowResolver};
pub use error::FetchError;
pub use expr::{CompareOp, Comparison, FilterExpr, FilterLiteral};
pub use extract::{extract, FilterVocabulary};
pub use metrics::MetricsObserver;
pub use observer::{CompositeObserver, FetchObserver, LoggingObserver};
pub use paging::{
    ChunkSink, FetchCursor, FetchHints, FetchLoop, FetchOutcome, FetchSummary, PageRequest,
    PageSource,
};
