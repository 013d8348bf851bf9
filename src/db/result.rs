//! Result sets and result collections.
//!
//! Adapters hand back a buffered [`RowCursor`] per result. A [`ResultSet`]
//! owns one cursor and materializes its rows on demand into either an
//! array-shaped or an object-shaped cache. Once one shape is cached the other
//! is derived from it without touching the cursor again. Typed rows are
//! derived through serde from the object-shaped cache.

use crate::error::{DbError, DbResult};
use crate::models::Value;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldData {
    pub name: String,
    /// Engine type name, e.g. `INT4`, `VARCHAR`, `nvarchar`
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
}

impl FieldData {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            max_length: None,
            scale: None,
            nullable: None,
        }
    }
}

/// Buffered rows of one result, as produced by an adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowCursor {
    columns: Vec<FieldData>,
    rows: Vec<Vec<Value>>,
    position: usize,
}

impl RowCursor {
    pub fn new(columns: Vec<FieldData>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            position: 0,
        }
    }

    pub fn columns(&self) -> &[FieldData] {
        &self.columns
    }

    pub fn set_columns(&mut self, columns: Vec<FieldData>) {
        self.columns = columns;
    }

    pub fn push(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row `n` without moving the cursor.
    pub fn get(&self, n: usize) -> Option<&[Value]> {
        self.rows.get(n).map(Vec::as_slice)
    }

    /// Next row at the cursor position, advancing it.
    fn fetch(&mut self) -> Option<Vec<Value>> {
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        row
    }

    fn seek(&mut self, n: usize) -> bool {
        if n < self.rows.len() {
            self.position = n;
            true
        } else {
            false
        }
    }

    /// Move every row out; the cursor is exhausted afterwards.
    fn take_rows(&mut self) -> Vec<Vec<Value>> {
        self.position = 0;
        std::mem::take(&mut self.rows)
    }
}

/// An object-shaped row: column names paired with values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Value of a column by name (first match).
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.iter()
                .map(|(k, v)| (k.to_string(), v.to_json()))
                .collect(),
        )
    }
}

impl Serialize for Row {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Requested row shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowShape {
    /// Positional values
    Array,
    /// Name → value
    Object,
}

/// A single row in the requested shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultRow<'a> {
    Array(&'a [Value]),
    Object(&'a Row),
}

/// Owned row handed out by [`ResultSet::unbuffered_row`].
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedRow {
    Array(Vec<Value>),
    Object(Row),
}

/// Materialization state of a result set.
#[derive(Debug, Clone, Default)]
enum Materialized {
    #[default]
    Pending,
    Array(Vec<Vec<Value>>),
    Object(Vec<Row>),
    Both(Vec<Vec<Value>>, Vec<Row>),
}

/// One result of a statement or routine call.
#[derive(Debug, Clone)]
pub struct ResultSet {
    cursor: Option<RowCursor>,
    fields: Vec<FieldData>,
    names: Arc<[String]>,
    state: Materialized,
    num_rows: Option<usize>,
    current_row: usize,
    freed: bool,
}

impl ResultSet {
    pub fn new(cursor: RowCursor) -> Self {
        let fields = cursor.columns().to_vec();
        let names: Arc<[String]> = fields.iter().map(|f| f.name.clone()).collect();
        Self {
            cursor: Some(cursor),
            fields,
            names,
            state: Materialized::Pending,
            num_rows: None,
            current_row: 0,
            freed: false,
        }
    }

    /// Result set with no columns and no rows.
    pub fn empty() -> Self {
        Self::new(RowCursor::default())
    }

    /// Number of rows, memoized after the first call.
    pub fn num_rows(&mut self) -> usize {
        if let Some(n) = self.num_rows {
            return n;
        }
        let n = match &self.state {
            Materialized::Array(rows) | Materialized::Both(rows, _) => rows.len(),
            Materialized::Object(rows) => rows.len(),
            Materialized::Pending => self.cursor.as_ref().map_or(0, RowCursor::len),
        };
        self.num_rows = Some(n);
        n
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn list_fields(&self) -> Vec<String> {
        self.names.to_vec()
    }

    pub fn field_data(&self) -> &[FieldData] {
        &self.fields
    }

    /// True once `free_result` released the cursor.
    pub fn is_freed(&self) -> bool {
        self.freed
    }

    fn pull_rows(&mut self) -> Vec<Vec<Value>> {
        self.cursor
            .as_mut()
            .map(RowCursor::take_rows)
            .unwrap_or_default()
    }

    fn ensure_array(&mut self) {
        if self.freed {
            return;
        }
        self.state = match std::mem::take(&mut self.state) {
            Materialized::Pending => Materialized::Array(self.pull_rows()),
            Materialized::Object(objects) => {
                let arrays = objects.iter().map(|r| r.values.clone()).collect();
                Materialized::Both(arrays, objects)
            }
            done => done,
        };
    }

    fn ensure_object(&mut self) {
        if self.freed {
            return;
        }
        self.state = match std::mem::take(&mut self.state) {
            Materialized::Pending => {
                let names = Arc::clone(&self.names);
                Materialized::Object(
                    self.pull_rows()
                        .into_iter()
                        .map(|values| Row::new(Arc::clone(&names), values))
                        .collect(),
                )
            }
            Materialized::Array(arrays) => {
                let objects = arrays
                    .iter()
                    .map(|values| Row::new(Arc::clone(&self.names), values.clone()))
                    .collect();
                Materialized::Both(arrays, objects)
            }
            done => done,
        };
    }

    /// All rows as positional arrays.
    pub fn result_array(&mut self) -> &[Vec<Value>] {
        self.ensure_array();
        match &self.state {
            Materialized::Array(rows) | Materialized::Both(rows, _) => rows,
            _ => &[],
        }
    }

    /// All rows as name → value objects.
    pub fn result_object(&mut self) -> &[Row] {
        self.ensure_object();
        match &self.state {
            Materialized::Object(rows) | Materialized::Both(_, rows) => rows,
            _ => &[],
        }
    }

    /// All rows in the requested shape.
    pub fn result(&mut self, shape: RowShape) -> Vec<ResultRow<'_>> {
        match shape {
            RowShape::Array => self
                .result_array()
                .iter()
                .map(|r| ResultRow::Array(r))
                .collect(),
            RowShape::Object => self.result_object().iter().map(ResultRow::Object).collect(),
        }
    }

    /// All rows deserialized into `T` (matched by column name).
    pub fn custom_result_object<T: DeserializeOwned>(&mut self) -> DbResult<Vec<T>> {
        self.result_object().iter().map(row_into).collect()
    }

    pub fn row_array(&mut self, n: usize) -> Option<&[Value]> {
        self.result_array().get(n).map(Vec::as_slice)
    }

    pub fn row_object(&mut self, n: usize) -> Option<&Row> {
        self.result_object().get(n)
    }

    /// Row `n` in the requested shape; `None` when out of range.
    pub fn row(&mut self, n: usize, shape: RowShape) -> Option<ResultRow<'_>> {
        match shape {
            RowShape::Array => self.row_array(n).map(ResultRow::Array),
            RowShape::Object => self.row_object(n).map(ResultRow::Object),
        }
    }

    pub fn custom_row_object<T: DeserializeOwned>(&mut self, n: usize) -> DbResult<Option<T>> {
        self.row_object(n).map(row_into).transpose()
    }

    pub fn first_row(&mut self, shape: RowShape) -> Option<ResultRow<'_>> {
        self.current_row = 0;
        self.row(0, shape)
    }

    pub fn last_row(&mut self, shape: RowShape) -> Option<ResultRow<'_>> {
        let n = self.num_rows();
        if n == 0 {
            return None;
        }
        self.current_row = n - 1;
        self.row(n - 1, shape)
    }

    /// Advance the row cursor; stays put and returns `None` at the end.
    pub fn next_row(&mut self, shape: RowShape) -> Option<ResultRow<'_>> {
        let next = self.current_row + 1;
        if next >= self.num_rows() {
            return None;
        }
        self.current_row = next;
        self.row(next, shape)
    }

    /// Step the row cursor back; stays put and returns `None` at the start.
    pub fn previous_row(&mut self, shape: RowShape) -> Option<ResultRow<'_>> {
        if self.current_row == 0 || self.num_rows() == 0 {
            return None;
        }
        self.current_row -= 1;
        self.row(self.current_row, shape)
    }

    pub fn current_row(&self) -> usize {
        self.current_row
    }

    /// Read the next row straight from the cursor without caching it.
    pub fn unbuffered_row(&mut self, shape: RowShape) -> Option<OwnedRow> {
        let values = self.cursor.as_mut()?.fetch()?;
        Some(match shape {
            RowShape::Array => OwnedRow::Array(values),
            RowShape::Object => OwnedRow::Object(Row::new(Arc::clone(&self.names), values)),
        })
    }

    /// Reposition the cursor used by `unbuffered_row`.
    pub fn data_seek(&mut self, n: usize) -> bool {
        self.cursor.as_mut().is_some_and(|c| c.seek(n))
    }

    /// Release the cursor and the caches. Safe to call more than once.
    pub fn free_result(&mut self) {
        self.cursor = None;
        self.state = Materialized::Pending;
        self.num_rows = Some(0);
        self.current_row = 0;
        self.freed = true;
    }

    pub fn to_json(&mut self) -> JsonValue {
        JsonValue::Array(self.result_object().iter().map(Row::to_json).collect())
    }
}

impl Default for ResultSet {
    fn default() -> Self {
        Self::empty()
    }
}

fn row_into<T: DeserializeOwned>(row: &Row) -> DbResult<T> {
    serde_json::from_value(row.to_json())
        .map_err(|e| DbError::decode(format!("Failed to map row: {}", e)))
}

/// Output parameter values in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutputParameters {
    values: Vec<(String, Value)>,
}

impl OutputParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    /// Lookup by name, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.iter()
                .map(|(k, v)| (k.to_string(), v.to_json()))
                .collect(),
        )
    }
}

/// Ordered result sets plus output parameters from one invocation.
#[derive(Debug, Clone, Default)]
pub struct ResultCollection {
    sets: Vec<ResultSet>,
    outputs: Option<OutputParameters>,
}

impl ResultCollection {
    pub fn new(sets: Vec<ResultSet>, outputs: Option<OutputParameters>) -> Self {
        Self { sets, outputs }
    }

    pub fn get(&self, index: usize) -> Option<&ResultSet> {
        self.sets.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ResultSet> {
        self.sets.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ResultSet> {
        self.sets.iter_mut()
    }

    pub fn outputs(&self) -> Option<&OutputParameters> {
        self.outputs.as_ref()
    }

    /// First result set, or an empty one.
    pub fn into_first(self) -> ResultSet {
        self.sets.into_iter().next().unwrap_or_default()
    }

    pub fn into_parts(self) -> (Vec<ResultSet>, Option<OutputParameters>) {
        (self.sets, self.outputs)
    }

    /// Free every contained result set.
    pub fn free_all(&mut self) {
        for set in &mut self.sets {
            set.free_result();
        }
    }

    pub fn to_json(&mut self) -> JsonValue {
        let sets: Vec<JsonValue> = self.sets.iter_mut().map(ResultSet::to_json).collect();
        serde_json::json!({
            "result_sets": sets,
            "outputs": self.outputs.as_ref().map(OutputParameters::to_json),
        })
    }
}
