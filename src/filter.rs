//! Layer filter pipeline.
//!
//! Filters run in a fixed order: search, variables, time period, scenario,
//! depth. Each multi-valued filter is a union over its tokens: rows are
//! collected token by token and concatenated, so a row matching two tokens
//! appears twice and row order follows token order.

use anyhow::{Context, Result};
use regex::RegexBuilder;

use crate::catalog::{DATASET_ID, LayerTable, Row, SEARCHABLE_COLUMNS, TITLE};
use crate::query::{LayerQuery, OutputShape, Selection};
use crate::util::case_variants;

/// Start-decade segment of a dataset identifier (`<var>_<scenario>_<start>_<end>_...`).
const START_DECADE_SEGMENT: usize = 2;
const PRESENT_DECADE: &str = "2000";
const FUTURE_DECADE: &str = "2020";

/// Result of a layer query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerListing {
    Table(LayerTable),
    Ids(Vec<String>),
}

impl LayerListing {
    pub fn as_table(&self) -> Option<&LayerTable> {
        match self {
            LayerListing::Table(t) => Some(t),
            LayerListing::Ids(_) => None,
        }
    }

    pub fn as_ids(&self) -> Option<&[String]> {
        match self {
            LayerListing::Ids(ids) => Some(ids),
            LayerListing::Table(_) => None,
        }
    }

    /// Dataset identifiers in listing order, whatever the shape.
    pub fn dataset_ids(&self) -> Vec<&str> {
        match self {
            LayerListing::Table(t) => t.dataset_ids(),
            LayerListing::Ids(ids) => ids.iter().map(String::as_str).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            LayerListing::Table(t) => t.len(),
            LayerListing::Ids(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Applies `query` to `catalog`.
pub fn filter_layers(catalog: &LayerTable, query: &LayerQuery) -> Result<LayerListing> {
    let mut rows: Vec<&Row> = catalog.rows().iter().collect();

    if let Some(terms) = given(&query.search) {
        rows = search(catalog, rows, terms)?;
    }
    if let Some(variables) = given(&query.variables) {
        rows = union_by(catalog, &rows, variables, |id, v| {
            id.starts_with(&v.to_lowercase())
        });
    }
    if let Some(period) = given(&query.time_period) {
        rows = time_period(catalog, rows, period);
    }
    if let Some(ssp) = given(&query.ssp) {
        rows = union_by(catalog, &rows, ssp, |id, s| {
            case_variants(s).iter().any(|form| id.contains(form.as_str()))
        });
    }
    if let Some(depth) = given(&query.depth) {
        rows = union_by(catalog, &rows, depth, |id, d| {
            case_variants(d)
                .iter()
                .any(|form| id.contains(&format!("depth{}", form)))
        });
    }

    Ok(match query.shape {
        OutputShape::Ids => {
            LayerListing::Ids(rows.iter().map(|r| catalog.row_id(r).to_string()).collect())
        }
        OutputShape::Table => {
            let table = catalog.with_rows(&rows);
            if query.simplify {
                LayerListing::Table(table.project(&[DATASET_ID, TITLE]))
            } else {
                LayerListing::Table(table)
            }
        }
    })
}

/// An empty selection is the same as no selection.
fn given(selection: &Option<Selection>) -> Option<&Selection> {
    selection.as_ref().filter(|s| !s.is_empty())
}

/// Keeps rows where any searchable column matches any term, case-insensitively.
fn search<'a>(catalog: &LayerTable, rows: Vec<&'a Row>, terms: &Selection) -> Result<Vec<&'a Row>> {
    let pattern = terms.iter().map(regex::escape).collect::<Vec<_>>().join("|");
    let re = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("invalid search terms: {}", terms))?;

    let mut columns: Vec<usize> = SEARCHABLE_COLUMNS
        .iter()
        .filter_map(|c| catalog.column_index(c))
        .collect();
    if columns.is_empty() {
        columns.extend(catalog.column_index(DATASET_ID));
    }

    Ok(rows
        .into_iter()
        .filter(|row| {
            columns.iter().any(|&c| {
                row.get(c)
                    .and_then(|cell| cell.as_deref())
                    .is_some_and(|text| re.is_match(text))
            })
        })
        .collect())
}

fn union_by<'a, F>(catalog: &LayerTable, rows: &[&'a Row], tokens: &Selection, matches: F) -> Vec<&'a Row>
where
    F: Fn(&str, &str) -> bool,
{
    let mut out = Vec::new();
    for token in tokens.iter() {
        out.extend(
            rows.iter()
                .copied()
                .filter(|row| matches(catalog.row_id(row), token)),
        );
    }
    out
}

/// `present` keeps identifiers starting in 2000, `future` those starting in
/// 2020. Anything else leaves the rows untouched.
fn time_period<'a>(catalog: &LayerTable, rows: Vec<&'a Row>, period: &Selection) -> Vec<&'a Row> {
    let decade = match period.single().map(str::to_lowercase).as_deref() {
        Some("present") => PRESENT_DECADE,
        Some("future") => FUTURE_DECADE,
        _ => return rows,
    };
    rows.into_iter()
        .filter(|row| catalog.row_id(row).split('_').nth(START_DECADE_SEGMENT) == Some(decade))
        .collect()
}
