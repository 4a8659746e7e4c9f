//!
//! The tabular side: schemas, rows, recordsets and the
//! collaborator that hands recordsets to the engine.
//!

use std::collections::VecDeque;
use std::sync::Arc;

use crate::value::Value;
use crate::RowGraphResult;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub sql_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }
}

/// Ordered column schema shared by all rows of a recordset.
/// Names are not required to be unique.
#[derive(Debug)]
pub struct Schema {
    columns: Vec<Column>,
    signature: Arc<[String]>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        let signature = columns
            .iter()
            .map(|column| column.name.clone())
            .collect::<Vec<_>>()
            .into();

        Self { columns, signature }
    }

    /// Schema of untyped columns.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|name| Column::new(name, "sql_variant"))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|column| column.name.as_str())
    }

    /// The ordered column names, which key every cached plan.
    pub fn signature(&self) -> &Arc<[String]> {
        &self.signature
    }

    /// First column with the given name, case-insensitive.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.name.eq_ignore_ascii_case(name))
    }
}

static NULL: Value = Value::Null;

#[derive(Clone, Debug)]
pub struct Row {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Row {
    /// Short rows are padded with NULL, long rows truncated to the schema.
    pub fn new(schema: Arc<Schema>, mut values: Vec<Value>) -> Self {
        values.resize(schema.len(), Value::Null);
        Self { schema, values }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.schema.name(index)
    }

    pub fn value(&self, index: usize) -> &Value {
        self.values.get(index).unwrap_or(&NULL)
    }

    /// Value of the first column with the given name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).map(|index| &self.values[index])
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// One single-pass tabular result.
pub struct Recordset {
    schema: Arc<Schema>,
    rows: Box<dyn Iterator<Item = Vec<Value>> + Send>,
}

impl Recordset {
    pub fn new<I>(schema: Schema, rows: I) -> Self
    where
        I: IntoIterator<Item = Vec<Value>>,
        I::IntoIter: Send + 'static,
    {
        Self {
            schema: Arc::new(schema),
            rows: Box::new(rows.into_iter()),
        }
    }

    /// In-memory recordset of untyped columns.
    pub fn from_rows<S: AsRef<str>>(names: &[S], rows: Vec<Vec<Value>>) -> Self {
        Self::new(
            Schema::from_names(names.iter().map(|name| name.as_ref().to_owned())),
            rows,
        )
    }

    /// Stand-in for a recordset the collaborator never delivered.
    pub fn empty() -> Self {
        Self::new(Schema::new(vec![]), Vec::new())
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

impl Iterator for Recordset {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        let values = self.rows.next()?;
        Some(Row::new(self.schema.clone(), values))
    }
}

impl std::fmt::Debug for Recordset {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        write!(fmt, "Recordset {:?}", self.schema.signature())
    }
}

///
/// Pull-based cursor over the recordsets of one command, implemented by
/// whatever executes the command. `None` means the sequence has ended.
///
pub trait ResultReader {
    fn next_recordset(&mut self) -> RowGraphResult<Option<Recordset>>;
}

/// Recordsets that are already materialized.
#[derive(Debug, Default)]
pub struct Recordsets {
    queue: VecDeque<Recordset>,
}

impl Recordsets {
    pub fn new(recordsets: Vec<Recordset>) -> Self {
        Self {
            queue: recordsets.into(),
        }
    }

    pub fn push(&mut self, recordset: Recordset) {
        self.queue.push_back(recordset);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl From<Vec<Recordset>> for Recordsets {
    fn from(recordsets: Vec<Recordset>) -> Self {
        Self::new(recordsets)
    }
}

impl ResultReader for Recordsets {
    fn next_recordset(&mut self) -> RowGraphResult<Option<Recordset>> {
        Ok(self.queue.pop_front())
    }
}
