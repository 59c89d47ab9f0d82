//! Static column tables for remote entity types.
//!
//! A [`ColumnMap`] is built once per entity type and shared read-only by
//! every scan. It owns the Arrow schema, resolves column names to ordinals
//! and turns a chunk of entities into a `RecordBatch`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Int64Array, ListBuilder, RecordBatch, RecordBatchOptions,
    StringArray, StringBuilder, TimestampMillisecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::error::ArrowError;
use chrono::{DateTime, Utc};

/// A single cell as read from an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Utf8(String),
    Int64(i64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    List(Vec<String>),
}

impl From<Option<String>> for ColumnValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(ColumnValue::Null, ColumnValue::Utf8)
    }
}

impl From<Option<i64>> for ColumnValue {
    fn from(value: Option<i64>) -> Self {
        value.map_or(ColumnValue::Null, ColumnValue::Int64)
    }
}

impl From<Option<bool>> for ColumnValue {
    fn from(value: Option<bool>) -> Self {
        value.map_or(ColumnValue::Null, ColumnValue::Boolean)
    }
}

impl From<Option<DateTime<Utc>>> for ColumnValue {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(ColumnValue::Null, ColumnValue::Timestamp)
    }
}

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Utf8,
    Int64,
    Boolean,
    /// Millisecond precision, UTC.
    Timestamp,
    Utf8List,
}

impl ColumnKind {
    pub fn data_type(self) -> DataType {
        match self {
            ColumnKind::Utf8 => DataType::Utf8,
            ColumnKind::Int64 => DataType::Int64,
            ColumnKind::Boolean => DataType::Boolean,
            ColumnKind::Timestamp => DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
            ColumnKind::Utf8List => {
                DataType::List(Arc::new(Field::new("item", DataType::Utf8, true)))
            }
        }
    }
}

/// One column: name, declared type and how to read it from `T`.
pub struct Column<T> {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub accessor: fn(&T) -> ColumnValue,
}

impl<T> Column<T> {
    pub fn new(name: &'static str, kind: ColumnKind, accessor: fn(&T) -> ColumnValue) -> Self {
        Self {
            name,
            kind,
            accessor,
        }
    }
}

impl<T> fmt::Debug for Column<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// `(name, declared type)` pair for metadata queries.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescription {
    pub name: String,
    pub data_type: DataType,
}

impl fmt::Display for ColumnDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.data_type)
    }
}

pub struct ColumnMap<T> {
    columns: Vec<Column<T>>,
    ordinals: HashMap<&'static str, usize>,
    schema: SchemaRef,
}

impl<T> fmt::Debug for ColumnMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.columns.iter().map(|c| c.name))
            .finish()
    }
}

impl<T> ColumnMap<T> {
    /// Build the map. Column names must be unique; a later duplicate shadows
    /// the earlier one for name lookups.
    pub fn new(columns: Vec<Column<T>>) -> Self {
        let ordinals = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name, i))
            .collect();
        let fields: Vec<Field> = columns
            .iter()
            .map(|c| Field::new(c.name, c.kind.data_type(), true))
            .collect();
        Self {
            columns,
            ordinals,
            schema: Arc::new(Schema::new(fields)),
        }
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.ordinals.get(name).copied()
    }

    pub fn column(&self, ordinal: usize) -> Option<&Column<T>> {
        self.columns.get(ordinal)
    }

    pub fn describe(&self) -> Vec<ColumnDescription> {
        self.columns
            .iter()
            .map(|c| ColumnDescription {
                name: c.name.to_string(),
                data_type: c.kind.data_type(),
            })
            .collect()
    }

    pub fn resolve<'a>(&'a self, entity: &'a T) -> RowResolver<'a, T> {
        RowResolver { map: self, entity }
    }

    /// Schema restricted to `projection`, in projection order.
    pub fn projected_schema(&self, projection: Option<&[usize]>) -> Result<SchemaRef, ArrowError> {
        match projection {
            Some(indices) => Ok(Arc::new(self.schema.project(indices)?)),
            None => Ok(self.schema()),
        }
    }

    /// Convert a chunk of entities into a batch holding the projected columns.
    pub fn to_record_batch(
        &self,
        entities: &[T],
        projection: Option<&[usize]>,
    ) -> Result<RecordBatch, ArrowError> {
        let schema = self.projected_schema(projection)?;
        let ordinals: Vec<usize> = match projection {
            Some(indices) => indices.to_vec(),
            None => (0..self.columns.len()).collect(),
        };

        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(ordinals.len());
        for ordinal in ordinals {
            let column = self.columns.get(ordinal).ok_or_else(|| {
                ArrowError::InvalidArgumentError(format!("no column at ordinal {}", ordinal))
            })?;
            arrays.push(build_array(column, entities));
        }

        let options = RecordBatchOptions::new().with_row_count(Some(entities.len()));
        RecordBatch::try_new_with_options(schema, arrays, &options)
    }
}

fn build_array<T>(column: &Column<T>, entities: &[T]) -> ArrayRef {
    let values = entities.iter().map(|e| (column.accessor)(e));
    match column.kind {
        ColumnKind::Utf8 => {
            let values: Vec<Option<String>> = values
                .map(|v| match v {
                    ColumnValue::Utf8(s) => Some(s),
                    _ => None,
                })
                .collect();
            Arc::new(StringArray::from(values))
        }
        ColumnKind::Int64 => {
            let values: Vec<Option<i64>> = values
                .map(|v| match v {
                    ColumnValue::Int64(n) => Some(n),
                    _ => None,
                })
                .collect();
            Arc::new(Int64Array::from(values))
        }
        ColumnKind::Boolean => {
            let values: Vec<Option<bool>> = values
                .map(|v| match v {
                    ColumnValue::Boolean(b) => Some(b),
                    _ => None,
                })
                .collect();
            Arc::new(BooleanArray::from(values))
        }
        ColumnKind::Timestamp => {
            let values: Vec<Option<i64>> = values
                .map(|v| match v {
                    ColumnValue::Timestamp(ts) => Some(ts.timestamp_millis()),
                    _ => None,
                })
                .collect();
            Arc::new(TimestampMillisecondArray::from(values).with_timezone("UTC"))
        }
        ColumnKind::Utf8List => {
            let mut builder = ListBuilder::new(StringBuilder::new());
            for value in values {
                match value {
                    ColumnValue::List(items) => {
                        for item in items {
                            builder.values().append_value(item);
                        }
                        builder.append(true);
                    }
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
    }
}

/// Name- or ordinal-addressed view over one entity.
pub struct RowResolver<'a, T> {
    map: &'a ColumnMap<T>,
    entity: &'a T,
}

impl<T> RowResolver<'_, T> {
    pub fn get(&self, name: &str) -> Option<ColumnValue> {
        self.get_ordinal(self.map.ordinal(name)?)
    }

    pub fn get_ordinal(&self, ordinal: usize) -> Option<ColumnValue> {
        self.map
            .column(ordinal)
            .map(|column| (column.accessor)(self.entity))
    }
}
