use crate::types::{CategoryFilter, Dataset};
use std::collections::HashSet;
use tracing::debug;

pub const DEFAULT_SELECTION: usize = 3;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum FilterError {
    #[error("Aucune colonne catégorique trouvée")]
    Unavailable,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterRequest {
    pub column: Option<String>,
    /// `None` until the user has picked values for `column`.
    pub values: Option<Vec<String>>,
}

/// Columns holding text values. A column is numeric when every non-blank
/// cell parses as a number, and boolean when every cell is `True`/`False`.
pub fn categorical_columns(dataset: &Dataset) -> Vec<String> {
    dataset
        .headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| is_categorical(dataset, *idx))
        .map(|(_, name)| name.clone())
        .collect()
}

fn is_categorical(dataset: &Dataset, column: usize) -> bool {
    let mut cells = dataset.rows.iter().map(|row| dataset.value(row, column));
    let numeric = cells.clone().all(|v| v.trim().is_empty() || v.trim().parse::<f64>().is_ok());
    let boolean = !dataset.is_empty() && cells.all(|v| v == "True" || v == "False");
    !numeric && !boolean
}

pub fn distinct_values(dataset: &Dataset, column: &str) -> Vec<String> {
    let Some(idx) = dataset.column_index(column) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    dataset
        .rows
        .iter()
        .map(|row| dataset.value(row, idx))
        .filter(|value| seen.insert(*value))
        .map(str::to_string)
        .collect()
}

pub fn default_selection(values: &[String]) -> Vec<String> {
    values.iter().take(DEFAULT_SELECTION).cloned().collect()
}

/// Unknown or numeric columns fall back to the first categorical one.
pub fn resolve(dataset: &Dataset, request: &FilterRequest) -> Result<CategoryFilter, FilterError> {
    let candidates = categorical_columns(dataset);
    let column = request
        .column
        .as_ref()
        .filter(|c| candidates.contains(c))
        .or_else(|| candidates.first())
        .cloned()
        .ok_or(FilterError::Unavailable)?;

    let allowed = match &request.values {
        Some(values) if request.column.as_ref() == Some(&column) => values.clone(),
        _ => default_selection(&distinct_values(dataset, &column)),
    };

    Ok(CategoryFilter { column, allowed })
}

pub fn apply(dataset: &Dataset, filter: &CategoryFilter) -> Dataset {
    let Some(idx) = dataset.column_index(&filter.column) else {
        return dataset.clone();
    };

    let rows: Vec<_> = dataset
        .rows
        .iter()
        .filter(|row| filter.allowed.iter().any(|a| a == dataset.value(row, idx)))
        .cloned()
        .collect();

    debug!("filter on '{}' kept {} of {} rows", filter.column, rows.len(), dataset.len());
    dataset.with_rows(rows)
}
