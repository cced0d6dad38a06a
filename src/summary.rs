use crate::render::{mean_center, RenderError};
use crate::types::Dataset;
use csv::WriterBuilder;
use serde::Serialize;

pub const MAP_EXPORT_NAME: &str = "carte_interactive.html";
pub const MAP_EXPORT_MIME: &str = "text/html";
pub const CSV_EXPORT_NAME: &str = "donnees_filtrees.csv";
pub const CSV_EXPORT_MIME: &str = "text/csv";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write CSV: {0}")]
    Buffer(String),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean_latitude: f64,
    pub mean_longitude: f64,
}

impl Summary {
    pub fn compute(dataset: &Dataset) -> Result<Self, RenderError> {
        let center = mean_center(dataset)?;
        Ok(Summary {
            count: dataset.len(),
            mean_latitude: center.y(),
            mean_longitude: center.x(),
        })
    }

    pub fn latitude_display(&self) -> String {
        format!("{:.4}", self.mean_latitude)
    }

    pub fn longitude_display(&self) -> String {
        format!("{:.4}", self.mean_longitude)
    }
}

/// Serialize the dataset back to CSV: header row plus the original cell text, no index column.
pub fn export_csv(dataset: &Dataset) -> Result<String, ExportError> {
    let mut wtr = WriterBuilder::new().from_writer(Vec::new());
    wtr.write_record(&dataset.headers)?;
    for row in &dataset.rows {
        wtr.write_record(&row.fields)?;
    }
    let bytes = wtr.into_inner().map_err(|e| ExportError::Buffer(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ExportError::Buffer(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::load_csv;
    use crate::filter::apply;
    use crate::types::CategoryFilter;

    #[test]
    fn summary_of_two_points() {
        let ds = load_csv(b"Nom,latitude,longitude\nA,6.50,2.63\nB,6.36,2.42\n").unwrap();
        let summary = Summary::compute(&ds).unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.latitude_display(), "6.4300");
        assert_eq!(summary.longitude_display(), "2.5250");
    }

    #[test]
    fn summary_of_nothing_is_an_error() {
        let ds = load_csv(b"latitude,longitude\n").unwrap();
        assert_eq!(Summary::compute(&ds), Err(RenderError::EmptyDataset));
    }

    #[test]
    fn export_round_trips_rows_and_coordinates() {
        let csv = "Nom,latitude,longitude,type\n\"Forage, Nord\",6.4969,2.6289,puits\nB,6.3654,2.4183,lac\nC,9.337,2.6303,puits\n";
        let ds = load_csv(csv.as_bytes()).unwrap();
        let filtered = apply(
            &ds,
            &CategoryFilter { column: "type".to_string(), allowed: vec!["puits".to_string()] },
        );

        let exported = export_csv(&filtered).unwrap();
        let reloaded = load_csv(exported.as_bytes()).unwrap();

        assert_eq!(reloaded.headers, ds.headers);
        assert_eq!(reloaded.len(), filtered.len());
        for (a, b) in reloaded.rows.iter().zip(&filtered.rows) {
            assert!((a.point.y() - b.point.y()).abs() < 1e-12);
            assert!((a.point.x() - b.point.x()).abs() < 1e-12);
            assert_eq!(a.fields, b.fields);
        }
        assert_eq!(reloaded.rows[0].fields[0], "Forage, Nord");
    }

    #[test]
    fn export_has_no_index_column() {
        let ds = load_csv(b"latitude,longitude\n1,2\n").unwrap();
        assert_eq!(export_csv(&ds).unwrap(), "latitude,longitude\n1,2\n");
    }
}
