use crate::types::{Dataset, Row, LATITUDE, LONGITUDE};
use csv::ReaderBuilder;
use geo::Point;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("malformed CSV: {0}")]
    Parse(#[from] csv::Error),
    #[error("line {line}: expected {expected} fields, found {found}")]
    TooManyFields { line: u64, expected: usize, found: usize },
    #[error("Le fichier doit contenir les colonnes 'latitude' et 'longitude' (missing: {})", .missing.join(", "))]
    Schema { missing: Vec<String> },
    #[error("row {row}: column '{column}' is not a number: '{value}'")]
    InvalidCoordinate { row: usize, column: String, value: String },
}

/// Short rows are padded with empty fields, long rows are rejected.
pub fn load_csv(bytes: &[u8]) -> Result<Dataset, LoadError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

    let missing: Vec<String> = [LATITUDE, LONGITUDE]
        .into_iter()
        .filter(|required| !headers.iter().any(|h| h == required))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::Schema { missing });
    }

    // Checked above, the positions exist.
    let lat_idx = headers.iter().position(|h| h == LATITUDE).unwrap_or_default();
    let lon_idx = headers.iter().position(|h| h == LONGITUDE).unwrap_or_default();

    let mut rows = Vec::new();
    for (position, result) in rdr.records().enumerate() {
        let record = result?;
        if record.len() > headers.len() {
            return Err(LoadError::TooManyFields {
                line: record.position().map_or(0, |p| p.line()),
                expected: headers.len(),
                found: record.len(),
            });
        }

        let mut fields: Vec<String> = record.iter().map(str::to_string).collect();
        fields.resize(headers.len(), String::new());

        let lat = parse_coordinate(&fields[lat_idx], position, LATITUDE)?;
        let lon = parse_coordinate(&fields[lon_idx], position, LONGITUDE)?;

        rows.push(Row {
            position,
            fields,
            point: Point::new(lon, lat),
        });
    }

    debug!("parsed {} rows with {} columns", rows.len(), headers.len());
    Ok(Dataset { headers, rows })
}

fn parse_coordinate(raw: &str, row: usize, column: &str) -> Result<f64, LoadError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| LoadError::InvalidCoordinate {
            row,
            column: column.to_string(),
            value: raw.to_string(),
        })
}

/// The static table shown on the welcome page.
pub fn example_dataset() -> Dataset {
    let rows = [("Forage A", 6.4969, 2.6289), ("Forage B", 6.3654, 2.4183), ("Forage C", 9.3370, 2.6303)]
        .into_iter()
        .enumerate()
        .map(|(position, (name, lat, lon))| Row {
            position,
            fields: vec![name.to_string(), format!("{:.4}", lat), format!("{:.4}", lon)],
            point: Point::new(lon, lat),
        })
        .collect();

    Dataset {
        headers: vec!["Nom".to_string(), LATITUDE.to_string(), LONGITUDE.to_string()],
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_points_and_passthrough_columns() {
        let csv = "Nom,latitude,longitude,type\nA,6.50,2.63,puits\nB,6.36,2.42,forage\n";
        let ds = load_csv(csv.as_bytes()).unwrap();
        assert_eq!(ds.headers, vec!["Nom", "latitude", "longitude", "type"]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.rows[1].fields[3], "forage");
        assert!((ds.rows[0].point.y() - 6.50).abs() < 1e-12);
        assert!((ds.rows[0].point.x() - 2.63).abs() < 1e-12);
        assert_eq!(ds.rows[1].position, 1);
    }

    #[test]
    fn missing_longitude_is_schema_error() {
        let err = load_csv(b"Nom,latitude\nA,6.5\n").unwrap_err();
        match err {
            LoadError::Schema { missing } => assert_eq!(missing, vec!["longitude"]),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn column_names_are_case_sensitive() {
        let err = load_csv(b"Latitude,Longitude\n6.5,2.6\n").unwrap_err();
        assert!(matches!(err, LoadError::Schema { ref missing } if missing.len() == 2));
    }

    #[test]
    fn header_only_file_loads_empty() {
        let ds = load_csv(b"latitude,longitude\n").unwrap();
        assert!(ds.is_empty());
    }

    #[test]
    fn non_numeric_coordinate_names_row_and_column() {
        let err = load_csv(b"latitude,longitude\n6.5,2.6\nabc,2.4\n").unwrap_err();
        match err {
            LoadError::InvalidCoordinate { row, column, value } => {
                assert_eq!(row, 1);
                assert_eq!(column, "latitude");
                assert_eq!(value, "abc");
            }
            other => panic!("expected invalid coordinate, got {other:?}"),
        }
    }

    #[test]
    fn nan_and_blank_coordinates_are_rejected() {
        assert!(matches!(
            load_csv(b"latitude,longitude\nNaN,2.6\n"),
            Err(LoadError::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            load_csv(b"latitude,longitude\n6.5,\n"),
            Err(LoadError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn long_rows_are_malformed() {
        let err = load_csv(b"latitude,longitude\n6.5,2.6,extra\n").unwrap_err();
        assert!(matches!(err, LoadError::TooManyFields { expected: 2, found: 3, .. }));
    }

    #[test]
    fn short_rows_are_padded() {
        let ds = load_csv(b"latitude,longitude,Nom\n6.5,2.6\n").unwrap();
        assert_eq!(ds.rows[0].fields, vec!["6.5", "2.6", ""]);
    }

    #[test]
    fn strips_utf8_bom() {
        let ds = load_csv(b"\xEF\xBB\xBFlatitude,longitude\n1,2\n").unwrap();
        assert_eq!(ds.headers[0], "latitude");
    }

    #[test]
    fn example_has_expected_schema() {
        let ds = example_dataset();
        assert_eq!(ds.headers, vec!["Nom", "latitude", "longitude"]);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.rows[2].fields[1], "9.3370");
    }
}
