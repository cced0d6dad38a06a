use geo::Point;
use serde::Serialize;

pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";
pub const LABEL_COLUMN: &str = "Nom";

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Zero-based position in the uploaded file, kept through filtering.
    pub position: usize,
    pub fields: Vec<String>,
    pub point: Point<f64>, // x = longitude, y = latitude
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn value<'a>(&self, row: &'a Row, column: usize) -> &'a str {
        row.fields.get(column).map_or("", String::as_str)
    }

    pub fn with_rows(&self, rows: Vec<Row>) -> Dataset {
        Dataset {
            headers: self.headers.clone(),
            rows,
        }
    }

    /// Popup text for a row: the `Nom` column when present, else `Point {position}`.
    pub fn label(&self, row: &Row) -> String {
        match self.column_index(LABEL_COLUMN) {
            Some(idx) => self.value(row, idx).to_string(),
            None => format!("Point {}", row.position),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VizMode {
    Markers,
    Clusters,
    Heatmap,
}

impl VizMode {
    pub const ALL: [VizMode; 3] = [VizMode::Markers, VizMode::Clusters, VizMode::Heatmap];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "markers" | "marqueurs" => Some(Self::Markers),
            "clusters" => Some(Self::Clusters),
            "heatmap" => Some(Self::Heatmap),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Markers => "markers",
            Self::Clusters => "clusters",
            Self::Heatmap => "heatmap",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Markers => "Marqueurs",
            Self::Clusters => "Clusters",
            Self::Heatmap => "Heatmap",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub [u8; 3]);

impl Color {
    pub fn parse(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Color([r, g, b]))
    }

    pub fn to_hex(self) -> String {
        let [r, g, b] = self.0;
        format!("#{:02X}{:02X}{:02X}", r, g, b)
    }
}

/// Resolved categorical filter: keep rows whose `column` value is in `allowed`.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryFilter {
    pub column: String,
    pub allowed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferParams {
    pub radius_km: f64,
}

impl BufferParams {
    pub fn radius_m(&self) -> f64 {
        self.radius_km * 1000.0
    }
}
