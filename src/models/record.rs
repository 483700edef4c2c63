use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Ordered column name -> scalar value mapping
pub type Record = serde_json::Map<String, Value>;

/// Adapter parameters as passed to `get_data`
pub type Params = serde_json::Map<String, Value>;

/// Rectangular, ordered sequence of records sharing one column list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl RecordSet {
    /// Build a rectangular record set from raw adapter output.
    ///
    /// Columns follow first-seen order across the whole sequence. Keys a record
    /// lacks are filled with null.
    pub fn normalize(raw: Vec<Record>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for record in &raw {
            for key in record.keys() {
                if seen.insert(key.as_str()) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = raw
            .into_iter()
            .map(|mut record| {
                let mut row = Record::new();
                for column in &columns {
                    row.insert(column.clone(), record.remove(column).unwrap_or(Value::Null));
                }
                row
            })
            .collect();

        Self { columns, rows }
    }

    /// Build from rows already known to be rectangular over `columns`
    pub(crate) fn from_parts(columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// Keep the rows `keep` accepts; columns are unchanged
    pub fn retain<F>(mut self, keep: F) -> Self
    where
        F: FnMut(&Record) -> bool,
    {
        self.rows.retain(keep);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep only the named columns, in the given order. Columns absent from
    /// the set come back as null.
    pub fn project(&self, columns: &[String]) -> RecordSet {
        let rows = self
            .rows
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| (c.clone(), record.get(c).cloned().unwrap_or(Value::Null)))
                    .collect::<Record>()
            })
            .collect();
        RecordSet {
            columns: columns.to_vec(),
            rows,
        }
    }

    /// Same data, row-major table representation
    pub fn into_table(self) -> TableView {
        let rows = self
            .rows
            .into_iter()
            .map(|mut record| {
                self.columns
                    .iter()
                    .map(|c| record.remove(c).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        TableView {
            columns: self.columns,
            rows,
        }
    }
}

/// Tabular view over a record set: one header row, one value vector per record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableView {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl TableView {
    /// All values of one column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    pub fn into_record_set(self) -> RecordSet {
        let rows = self
            .rows
            .into_iter()
            .map(|values| self.columns.iter().cloned().zip(values).collect::<Record>())
            .collect();
        RecordSet {
            columns: self.columns,
            rows,
        }
    }
}

/// Result of `get_data`: the same data as records or as a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum DataOutput {
    Records(RecordSet),
    Table(TableView),
}

impl DataOutput {
    pub fn len(&self) -> usize {
        match self {
            DataOutput::Records(records) => records.len(),
            DataOutput::Table(table) => table.rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_record_set(self) -> RecordSet {
        match self {
            DataOutput::Records(records) => records,
            DataOutput::Table(table) => table.into_record_set(),
        }
    }
}
