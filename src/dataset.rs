//! In-memory traffic dataset and the grouping/aggregation query over it.
//!
//! The dataset keeps nlbwmon's columnar layout: one list of column names and
//! a list of rows holding positional values.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{MonitorError, Result};

/// Counters summed when several rows fall into the same group.
pub const COUNTER_COLUMNS: [&str; 5] = ["conns", "rx_bytes", "rx_pkts", "tx_bytes", "tx_pkts"];

/// Column name -> positional index.
#[derive(Debug, Default, Clone)]
pub struct Columns(HashMap<String, usize>);

impl Columns {
    pub fn index(&self, name: &str) -> Option<usize> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Value of column `name` in `row`, if both exist.
    pub fn get<'r>(&self, row: &'r [Value], name: &str) -> Option<&'r Value> {
        self.index(name).and_then(|i| row.get(i))
    }

    pub fn get_str<'r>(&self, row: &'r [Value], name: &str) -> Option<&'r str> {
        self.get(row, name).and_then(Value::as_str)
    }

    pub fn get_u64(&self, row: &[Value], name: &str) -> u64 {
        self.get(row, name).map_or(0, as_count)
    }
}

pub type RowFilter<'a> = dyn Fn(&Columns, &[Value]) -> bool + 'a;
pub type RecordOrder<'a> = dyn Fn(&Record, &Record) -> Ordering + 'a;

pub enum Grouping<'a> {
    /// Composite key of the listed columns; missing columns are skipped.
    Columns(Vec<String>),
    Key(Box<dyn Fn(&Columns, &[Value]) -> String + 'a>),
}

impl Default for Grouping<'_> {
    fn default() -> Self {
        Grouping::Columns(vec!["mac".to_string()])
    }
}

impl<'a> Grouping<'a> {
    pub fn columns<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Grouping::Columns(names.into_iter().map(Into::into).collect())
    }

    pub fn key(f: impl Fn(&Columns, &[Value]) -> String + 'a) -> Self {
        Grouping::Key(Box::new(f))
    }

    fn key_of(&self, columns: &Columns, row: &[Value]) -> String {
        match self {
            Grouping::Key(f) => f(columns, row),
            Grouping::Columns(names) => names
                .iter()
                .filter_map(|name| columns.get(row, name))
                .map(stringify)
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// One aggregated output row, keyed by column name.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.0.get(column).and_then(Value::as_str)
    }

    pub fn get_u64(&self, column: &str) -> u64 {
        self.0.get(column).map_or(0, as_count)
    }

    /// Display form of a column, `None` when absent or falsy (null, empty,
    /// `false` or zero).
    pub fn display(&self, column: &str) -> Option<String> {
        match self.0.get(column)? {
            Value::Null | Value::Bool(false) => None,
            Value::Number(n) if n.as_f64() == Some(0.0) => None,
            v => Some(stringify(v)).filter(|s| !s.is_empty()),
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.get_u64("rx_bytes") + self.get_u64("tx_bytes")
    }

    fn add_counter(&mut self, column: &str, value: &Value) {
        let Some(slot) = self.0.get_mut(column) else {
            return;
        };
        // a null counter counts as zero
        *slot = match (&*slot, value) {
            (Value::Null, Value::Number(b)) => Value::Number(b.clone()),
            (Value::Null, Value::Null) => Value::from(0u64),
            (Value::Number(a), Value::Number(b)) => match (a.as_u64(), b.as_u64()) {
                (Some(a), Some(b)) => Value::Number(Number::from(a.saturating_add(b))),
                _ => Number::from_f64(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0))
                    .map_or(Value::Null, Value::Number),
            },
            _ => return,
        };
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TrafficDataset {
    columns: Vec<String>,
    #[serde(rename = "data")]
    rows: Vec<Vec<Value>>,
}

impl TrafficDataset {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(MonitorError::Dataset(format!(
                "row {i} has {} values for {} columns",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Parses nlbwmon's `{"columns": [...], "data": [[...], ...]}` output.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: TrafficDataset = serde_json::from_str(json)?;
        Self::new(raw.columns, raw.rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self) -> Columns {
        Columns(
            self.columns
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i))
                .collect(),
        )
    }

    /// Filters, groups and aggregates the rows.
    ///
    /// Records come out in first-occurrence order of their group key unless
    /// `order` is given. The first row of a group provides every column; later
    /// rows only add to [`COUNTER_COLUMNS`].
    pub fn query(
        &self,
        filter: Option<&RowFilter<'_>>,
        group: &Grouping<'_>,
        order: Option<&RecordOrder<'_>>,
    ) -> Vec<Record> {
        let columns = self.column_index();
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut result: Vec<Record> = Vec::new();

        for row in &self.rows {
            if let Some(filter) = filter {
                if !filter(&columns, row) {
                    continue;
                }
            }

            let key = group.key_of(&columns, row);
            match slots.get(&key) {
                None => {
                    let record = self
                        .columns
                        .iter()
                        .cloned()
                        .zip(row.iter().cloned())
                        .collect();
                    slots.insert(key, result.len());
                    result.push(Record(record));
                }
                Some(&slot) => {
                    let record = &mut result[slot];
                    for counter in COUNTER_COLUMNS {
                        if let Some(value) = columns.get(row, counter) {
                            record.add_counter(counter, value);
                        }
                    }
                }
            }
        }

        if let Some(order) = order {
            result.sort_by(|a, b| order(a, b));
        }

        result
    }
}

/// Key/label form of a cell value.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

fn as_count(value: &Value) -> u64 {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
        .unwrap_or(0)
}
