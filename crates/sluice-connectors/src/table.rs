//! DataFusion surface shared by every remote source.
//!
//! Contains both [`RemoteTable`] (the `TableProvider`) and [`RemoteScanExec`]
//! (the lazy `ExecutionPlan` that runs the fetch loop when executed).
//!
//! Every filter is reported to DataFusion as `Inexact`: the remote query is
//! only ever a superset and DataFusion re-applies the full predicate.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use datafusion::catalog::Session;
use datafusion::common::ScalarValue;
use datafusion::datasource::TableProvider;
use datafusion::error::{DataFusionError, Result as DFResult};
use datafusion::execution::TaskContext;
use datafusion::logical_expr::{TableProviderFilterPushDown, TableType};
use datafusion::physical_expr::EquivalenceProperties;
use datafusion::physical_plan::execution_plan::{Boundedness, EmissionType};
use datafusion::physical_plan::stream::RecordBatchStreamAdapter;
use datafusion::physical_plan::{
    DisplayAs, DisplayFormatType, ExecutionPlan, Partitioning, PlanProperties,
    SendableRecordBatchStream,
};
use datafusion::prelude::Expr;
use sluice_core::{
    extract, CancellationHandle, ChunkSink, ColumnDescription, ColumnMap, FetchHints, FetchLoop,
    FetchObserver, FilterExpr, FilterVocabulary, LoggingObserver, PageSource,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::ConnectorError;

/// Batches buffered between the fetch task and the consumer.
const CHANNEL_CAPACITY: usize = 2;

/// A remote list API exposed as a table.
pub trait RemoteTableSource: fmt::Debug + Send + Sync + 'static {
    type Entity: Send + Sync + 'static;
    type Filter: FilterVocabulary + fmt::Debug + Send;

    /// Name used in logs, metrics and errors.
    fn source_name(&self) -> &str;

    fn columns(&self) -> &'static ColumnMap<Self::Entity>;

    fn page_size(&self) -> usize;

    /// Bind the pushed-down filter into a page source for one scan.
    /// `projection` lets a source skip work for columns nobody reads.
    fn open(
        &self,
        filter: Self::Filter,
        projection: Option<&[usize]>,
    ) -> Arc<dyn PageSource<Item = Self::Entity>>;
}

// ===========================================================================
// RemoteTable: the TableProvider
// ===========================================================================

pub struct RemoteTable<S: RemoteTableSource> {
    source: Arc<S>,
    observer: Arc<dyn FetchObserver>,
}

impl<S: RemoteTableSource> fmt::Debug for RemoteTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTable")
            .field("source", &self.source)
            .finish()
    }
}

impl<S: RemoteTableSource> RemoteTable<S> {
    pub fn from_source(source: S) -> Self {
        Self {
            source: Arc::new(source),
            observer: Arc::new(LoggingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn FetchObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// `(name, declared type)` for every column.
    pub fn describe(&self) -> Vec<ColumnDescription> {
        self.source.columns().describe()
    }
}

#[async_trait]
impl<S: RemoteTableSource> TableProvider for RemoteTable<S> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> SchemaRef {
        self.source.columns().schema()
    }

    fn table_type(&self) -> TableType {
        TableType::Base
    }

    fn supports_filters_pushdown(
        &self,
        filters: &[&Expr],
    ) -> DFResult<Vec<TableProviderFilterPushDown>> {
        Ok(vec![TableProviderFilterPushDown::Inexact; filters.len()])
    }

    async fn scan(
        &self,
        _state: &dyn Session,
        projection: Option<&Vec<usize>>,
        filters: &[Expr],
        limit: Option<usize>,
    ) -> DFResult<Arc<dyn ExecutionPlan>> {
        let tree = FilterExpr::from_df_filters(filters);
        let filter: S::Filter = extract(&tree);
        debug!(
            source = self.source.source_name(),
            pushed = ?filter,
            ?limit,
            "planned remote scan"
        );

        let projection = projection.cloned();
        let pages = self.source.open(filter, projection.as_deref());
        let exec = RemoteScanExec::try_new(
            self.source.source_name().to_string(),
            pages,
            self.source.columns(),
            projection,
            self.source.page_size(),
            limit,
            Arc::clone(&self.observer),
        )?;
        Ok(Arc::new(exec))
    }
}

// ===========================================================================
// RemoteScanExec: the lazy ExecutionPlan
// ===========================================================================

/// Leaf node with one output partition. The remote is not contacted until
/// `execute()` is called; the fetch then runs on its own task and feeds a
/// bounded channel, so a slow consumer throttles page requests. Dropping the
/// output stream cancels the fetch.
pub struct RemoteScanExec<E: Send + Sync + 'static> {
    source_name: String,
    pages: Arc<dyn PageSource<Item = E>>,
    columns: &'static ColumnMap<E>,
    projection: Option<Vec<usize>>,
    schema: SchemaRef,
    page_size: usize,
    limit: Option<usize>,
    observer: Arc<dyn FetchObserver>,
    properties: PlanProperties,
}

impl<E: Send + Sync + 'static> fmt::Debug for RemoteScanExec<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteScanExec")
            .field("source_name", &self.source_name)
            .field("pages", &self.pages)
            .field("projection", &self.projection)
            .field("page_size", &self.page_size)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<E: Send + Sync + 'static> RemoteScanExec<E> {
    pub fn try_new(
        source_name: String,
        pages: Arc<dyn PageSource<Item = E>>,
        columns: &'static ColumnMap<E>,
        projection: Option<Vec<usize>>,
        page_size: usize,
        limit: Option<usize>,
        observer: Arc<dyn FetchObserver>,
    ) -> DFResult<Self> {
        let schema = columns.projected_schema(projection.as_deref())?;
        let properties = PlanProperties::new(
            EquivalenceProperties::new(Arc::clone(&schema)),
            Partitioning::UnknownPartitioning(1),
            EmissionType::Incremental,
            Boundedness::Bounded,
        );
        Ok(Self {
            source_name,
            pages,
            columns,
            projection,
            schema,
            page_size,
            limit,
            observer,
            properties,
        })
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

impl<E: Send + Sync + 'static> ExecutionPlan for RemoteScanExec<E> {
    fn name(&self) -> &str {
        "RemoteScanExec"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn properties(&self) -> &PlanProperties {
        &self.properties
    }

    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![]
    }

    fn with_new_children(
        self: Arc<Self>,
        children: Vec<Arc<dyn ExecutionPlan>>,
    ) -> DFResult<Arc<dyn ExecutionPlan>> {
        if children.is_empty() {
            Ok(self)
        } else {
            Err(DataFusionError::Internal(
                "RemoteScanExec is a leaf node and cannot have children".to_string(),
            ))
        }
    }

    fn execute(
        &self,
        partition: usize,
        _context: Arc<TaskContext>,
    ) -> DFResult<SendableRecordBatchStream> {
        if partition != 0 {
            return Err(DataFusionError::Internal(format!(
                "RemoteScanExec only supports partition 0, got {}",
                partition
            )));
        }

        let (tx, rx) = mpsc::channel::<DFResult<RecordBatch>>(CHANNEL_CAPACITY);
        let handle = CancellationHandle::new();
        let signal = handle.signal();
        let cancel_guard = handle.cancel_on_drop();

        let source_name = self.source_name.clone();
        let pages = Arc::clone(&self.pages);
        let page_size = self.page_size;
        let hints = FetchHints::take(self.limit);
        let observer = Arc::clone(&self.observer);
        let mut sink = BatchSink {
            tx: tx.clone(),
            columns: self.columns,
            projection: self.projection.clone(),
        };

        tokio::spawn(async move {
            let result = FetchLoop::new(&source_name, pages.as_ref(), page_size)
                .with_hints(hints)
                .with_cancellation(signal)
                .with_observer(observer)
                .run(&mut sink)
                .await;
            match result {
                Ok(summary) => info!(
                    source = %source_name,
                    pages = summary.pages_fetched,
                    rows = summary.rows_emitted,
                    outcome = ?summary.outcome,
                    "remote scan finished"
                ),
                Err(e) => {
                    let _ = tx.send(Err(DataFusionError::External(Box::new(e)))).await;
                }
            }
        });

        // The guard rides along with the receiver so dropping the stream
        // cancels the fetch task.
        let stream = futures::stream::unfold((rx, cancel_guard), |(mut rx, guard)| async move {
            rx.recv().await.map(|item| (item, (rx, guard)))
        });

        Ok(Box::pin(RecordBatchStreamAdapter::new(
            Arc::clone(&self.schema),
            stream,
        )))
    }
}

impl<E: Send + Sync + 'static> DisplayAs for RemoteScanExec<E> {
    fn fmt_as(&self, _t: DisplayFormatType, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "RemoteScanExec: source={}, page_size={}",
            self.source_name, self.page_size
        )?;
        if let Some(limit) = self.limit {
            write!(f, ", limit={}", limit)?;
        }
        Ok(())
    }
}

/// Converts each published chunk into a projected `RecordBatch`.
struct BatchSink<E: 'static> {
    tx: mpsc::Sender<DFResult<RecordBatch>>,
    columns: &'static ColumnMap<E>,
    projection: Option<Vec<usize>>,
}

#[async_trait]
impl<E: Send + Sync + 'static> ChunkSink<E> for BatchSink<E> {
    async fn publish(&mut self, chunk: Vec<E>) -> bool {
        let batch = self
            .columns
            .to_record_batch(&chunk, self.projection.as_deref())
            .map_err(DataFusionError::from);
        let failed = batch.is_err();
        // A conversion error ends the scan the same way a closed consumer does.
        self.tx.send(batch).await.is_ok() && !failed
    }
}

// ---------------------------------------------------------------------------
// Table function arguments
// ---------------------------------------------------------------------------

/// Read positional string arguments of a table function. SQL `NULL` and the
/// empty string both read as `None`.
pub(crate) fn string_args(
    function: &str,
    args: &[Expr],
    min: usize,
    max: usize,
) -> Result<Vec<Option<String>>, ConnectorError> {
    if args.len() < min || args.len() > max {
        return Err(ConnectorError::InvalidArgument(format!(
            "{} expects {} to {} arguments, got {}",
            function,
            min,
            max,
            args.len()
        )));
    }
    args.iter()
        .enumerate()
        .map(|(i, arg)| match arg {
            Expr::Literal(
                ScalarValue::Utf8(value)
                | ScalarValue::LargeUtf8(value)
                | ScalarValue::Utf8View(value),
            ) => Ok(value.clone().filter(|s| !s.trim().is_empty())),
            Expr::Literal(ScalarValue::Null) => Ok(None),
            other => Err(ConnectorError::InvalidArgument(format!(
                "{} argument {} must be a string literal, got {}",
                function,
                i + 1,
                other
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::prelude::{col, lit};

    #[test]
    fn test_string_args() {
        let args = vec![lit("ABC"), lit(""), Expr::Literal(ScalarValue::Null)];
        let parsed = string_args("f", &args, 1, 3).unwrap();
        assert_eq!(parsed, vec![Some("ABC".to_string()), None, None]);
    }

    #[test]
    fn test_string_args_arity() {
        let err = string_args("jira_issues", &[], 1, 3).unwrap_err();
        assert!(err.to_string().contains("jira_issues expects 1 to 3 arguments"));
    }

    #[test]
    fn test_string_args_rejects_non_literals() {
        assert!(string_args("f", &[col("x")], 1, 1).is_err());
        assert!(string_args("f", &[lit(3i64)], 1, 1).is_err());
    }
}
