use crate::config::MapConfig;
use crate::params::RenderParams;
use crate::types::{BufferParams, Dataset, VizMode};
use geo::{Centroid, MultiPoint, Point};
use serde::Serialize;
use tracing::debug;

const BUFFER_COLOR: &str = "blue";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RenderError {
    #[error("no points left to display: mean position of an empty dataset is undefined")]
    EmptyDataset,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MarkerSpec {
    pub lat: f64,
    pub lon: f64,
    pub popup: String,
}

/// One visual layer of the map, in drawing order.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Layer {
    CircleMarkers {
        markers: Vec<MarkerSpec>,
        color: String,
        radius_px: u32,
    },
    Cluster {
        markers: Vec<MarkerSpec>,
    },
    Heat {
        points: Vec<[f64; 2]>, // [lat, lon]
        radius_px: u32,
    },
    Buffers {
        centers: Vec<[f64; 2]>, // [lat, lon]
        radius_m: f64,
        color: String,
        fill_opacity: f64,
        weight: u32,
        popup: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MapArtifact {
    /// [lat, lon]
    pub center: [f64; 2],
    pub zoom: u8,
    pub tiles_url: String,
    pub tiles_attribution: String,
    pub layers: Vec<Layer>,
}

impl MapArtifact {
    pub fn marker_count(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| match layer {
                Layer::CircleMarkers { markers, .. } | Layer::Cluster { markers } => markers.len(),
                _ => 0,
            })
            .sum()
    }
}

/// Arithmetic mean of every row's position.
pub fn mean_center(dataset: &Dataset) -> Result<Point<f64>, RenderError> {
    let points: MultiPoint<f64> = dataset.rows.iter().map(|row| row.point).collect();
    points.centroid().ok_or(RenderError::EmptyDataset)
}

pub fn build_map(dataset: &Dataset, params: &RenderParams, config: &MapConfig) -> Result<MapArtifact, RenderError> {
    let center = mean_center(dataset)?;
    let mut layers = Vec::new();

    // Buffers go underneath so markers stay clickable.
    if let Some(buffer) = params.buffer() {
        layers.push(buffer_layer(dataset, &buffer, params.mode));
    }

    match params.mode {
        VizMode::Markers => layers.push(Layer::CircleMarkers {
            markers: marker_specs(dataset),
            color: params.color.to_hex(),
            radius_px: config.marker_radius_px,
        }),
        VizMode::Clusters => layers.push(Layer::Cluster {
            markers: marker_specs(dataset),
        }),
        VizMode::Heatmap => layers.push(Layer::Heat {
            points: lat_lon_pairs(dataset),
            radius_px: config.heat_radius_px,
        }),
    }

    debug!("built {} map with {} layers for {} points", params.mode.as_str(), layers.len(), dataset.len());

    Ok(MapArtifact {
        center: [center.y(), center.x()],
        zoom: config.zoom_start,
        tiles_url: config.tiles_url.clone(),
        tiles_attribution: config.tiles_attribution.clone(),
        layers,
    })
}

fn marker_specs(dataset: &Dataset) -> Vec<MarkerSpec> {
    dataset
        .rows
        .iter()
        .map(|row| MarkerSpec {
            lat: row.point.y(),
            lon: row.point.x(),
            popup: dataset.label(row),
        })
        .collect()
}

fn lat_lon_pairs(dataset: &Dataset) -> Vec<[f64; 2]> {
    dataset.rows.iter().map(|row| [row.point.y(), row.point.x()]).collect()
}

/// Planar circles of the requested radius, not geodesic buffers.
fn buffer_layer(dataset: &Dataset, buffer: &BufferParams, mode: VizMode) -> Layer {
    let (fill_opacity, weight) = match mode {
        VizMode::Heatmap => (0.05, 1),
        VizMode::Markers | VizMode::Clusters => (0.1, 2),
    };
    Layer::Buffers {
        centers: lat_lon_pairs(dataset),
        radius_m: buffer.radius_m(),
        color: BUFFER_COLOR.to_string(),
        fill_opacity,
        weight,
        popup: format!("Buffer {:.1}km", buffer.radius_km),
    }
}
