use anyhow::{Result, anyhow, bail};
use serde_json::Value;
use std::fmt;

/// Reserved identifier of the dataset that lists every other dataset.
pub(crate) const ALL_DATASETS: &str = "allDatasets";

pub const DATASET_ID: &str = "datasetID";
pub const TITLE: &str = "title";

/// Columns the free-text search looks at, when present.
pub(crate) const SEARCHABLE_COLUMNS: &[&str] = &[DATASET_ID, TITLE, "long_name", "standard_name"];

/// ERDDAP `.json` table reply: `{"table": {"columnNames": [...], "rows": [[...]]}}`.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct TableReply {
    table: TableBody,
}

#[derive(Debug, serde::Deserialize)]
struct TableBody {
    #[serde(alias = "columnNames", alias = "column_names")]
    column_names: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

impl TableReply {
    /// Values of the first column, in row order.
    pub(crate) fn first_column(&self) -> Vec<&Value> {
        self.table.rows.iter().filter_map(|r| r.first()).collect()
    }

    /// Converts the reply into a catalog, dropping the leading `allDatasets`
    /// row unless asked to keep it.
    pub(crate) fn into_catalog(self, include_meta_row: bool) -> Result<LayerTable> {
        let TableBody { column_names, rows } = self.table;
        let width = column_names.len();
        let mut rows: Vec<Row> = rows
            .into_iter()
            .map(|r| {
                let mut cells: Row = r.into_iter().map(cell_text).collect();
                cells.resize(width, None);
                cells
            })
            .collect();
        if !include_meta_row && !rows.is_empty() {
            rows.remove(0);
        }
        LayerTable::new(column_names, rows)
    }
}

fn cell_text(v: Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

pub(crate) type Row = Vec<Option<String>>;

/// Tabular view of the catalog, one row per dataset.
///
/// Always carries a `datasetID` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerTable {
    columns: Vec<String>,
    rows: Vec<Row>,
    id_column: usize,
}

impl LayerTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Result<Self> {
        let id_column = columns
            .iter()
            .position(|c| c == DATASET_ID)
            .ok_or_else(|| anyhow!("catalog has no `{}` column", DATASET_ID))?;
        if let Some(bad) = rows.iter().position(|r| r.len() != columns.len()) {
            bail!(
                "catalog row {} has {} cell(s), expected {}",
                bad,
                rows[bad].len(),
                columns.len()
            );
        }
        Ok(Self {
            columns,
            rows,
            id_column,
        })
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

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell text at (`row`, `column`); `None` for missing cells or columns.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column_index(column)?;
        self.rows.get(row)?.get(col)?.as_deref()
    }

    pub fn dataset_ids(&self) -> Vec<&str> {
        self.rows.iter().map(|r| self.row_id(r)).collect()
    }

    pub(crate) fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub(crate) fn row_id<'a>(&self, row: &'a Row) -> &'a str {
        row.get(self.id_column)
            .and_then(|c| c.as_deref())
            .unwrap_or_default()
    }

    /// New table with the same columns holding copies of `rows`.
    pub(crate) fn with_rows(&self, rows: &[&Row]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: rows.iter().map(|r| (*r).clone()).collect(),
            id_column: self.id_column,
        }
    }

    /// Keeps the named columns that exist, in the given order.
    pub(crate) fn project(&self, names: &[&str]) -> Self {
        let keep: Vec<usize> = names.iter().filter_map(|n| self.column_index(n)).collect();
        let columns: Vec<String> = keep.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|r| keep.iter().map(|&i| r[i].clone()).collect())
            .collect();
        let id_column = columns.iter().position(|c| c == DATASET_ID).unwrap_or(0);
        Self {
            columns,
            rows,
            id_column,
        }
    }
}

impl fmt::Display for LayerTable {
    /// Tab-separated, header first.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.columns.join("\t"))?;
        for row in &self.rows {
            let cells: Vec<&str> = row.iter().map(|c| c.as_deref().unwrap_or("")).collect();
            writeln!(f, "{}", cells.join("\t"))?;
        }
        Ok(())
    }
}
