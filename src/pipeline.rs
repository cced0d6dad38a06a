use crate::config::MapConfig;
use crate::data::{self, LoadError};
use crate::filter::{self, FilterError};
use crate::params::{ParamError, RenderParams};
use crate::render::{self, MapArtifact, RenderError};
use crate::summary::{ExportError, Summary};
use crate::types::{CategoryFilter, Dataset};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Params(#[from] ParamError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("template error: {0}")]
    Template(#[from] tera::Error),
}

impl PipelineError {
    pub fn is_schema(&self) -> bool {
        matches!(self, PipelineError::Load(LoadError::Schema { .. }))
    }
}

/// What the sidebar needs to draw the filter widgets.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChoices {
    pub columns: Vec<String>,
    pub values: Vec<String>,
    pub applied: CategoryFilter,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// After filtering.
    pub dataset: Dataset,
    pub filter: Option<FilterChoices>,
    pub warnings: Vec<FilterError>,
    pub summary: Summary,
    pub map: MapArtifact,
}

#[derive(Debug, Clone)]
pub struct Prepared {
    pub dataset: Dataset,
    pub filter: Option<FilterChoices>,
    pub warnings: Vec<FilterError>,
}

pub fn run(bytes: &[u8], params: &RenderParams, config: &MapConfig) -> Result<PipelineOutput, PipelineError> {
    finish(prepare(bytes, params)?, params, config)
}

// Load and filter only; `finish` computes everything derived from the points.
pub fn prepare(bytes: &[u8], params: &RenderParams) -> Result<Prepared, PipelineError> {
    let loaded = data::load_csv(bytes)?;
    info!("loaded {} rows", loaded.len());

    let mut warnings = Vec::new();
    let (dataset, filter) = match &params.filter {
        None => (loaded, None),
        Some(request) => match filter::resolve(&loaded, request) {
            Ok(applied) => {
                let filtered = filter::apply(&loaded, &applied);
                let choices = FilterChoices {
                    columns: filter::categorical_columns(&loaded),
                    values: filter::distinct_values(&loaded, &applied.column),
                    applied,
                };
                (filtered, Some(choices))
            }
            Err(e) => {
                warn!("filter skipped: {}", e);
                warnings.push(e);
                (loaded, None)
            }
        },
    };

    Ok(Prepared {
        dataset,
        filter,
        warnings,
    })
}

pub fn finish(prepared: Prepared, params: &RenderParams, config: &MapConfig) -> Result<PipelineOutput, PipelineError> {
    let Prepared { dataset, filter, warnings } = prepared;
    let summary = Summary::compute(&dataset)?;
    let map = render::build_map(&dataset, params, config)?;
    info!("rendered {} points ({} markers) as {}", dataset.len(), map.marker_count(), params.mode.as_str());

    Ok(PipelineOutput {
        dataset,
        filter,
        warnings,
        summary,
        map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterRequest;
    use crate::render::Layer;
    use crate::types::{Color, VizMode};

    const POINTS: &str = "Nom,latitude,longitude,type\nA,6.50,2.63,puits\nB,6.36,2.42,forage\nC,9.34,2.63,puits\n";

    fn params() -> RenderParams {
        RenderParams::new(Color([0x33, 0xFF, 0xFC]))
    }

    #[test]
    fn runs_without_filter() {
        let out = run(POINTS.as_bytes(), &params(), &MapConfig::default()).unwrap();
        assert_eq!(out.summary.count, 3);
        assert_eq!(out.map.marker_count(), 3);
        assert!(out.filter.is_none());
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn schema_error_stops_before_rendering() {
        let err = run(b"Nom,lat,lon\nA,1,2\n", &params(), &MapConfig::default()).unwrap_err();
        assert!(err.is_schema());
    }

    #[test]
    fn bad_coordinates_are_not_schema_errors() {
        let err = run(b"latitude,longitude\nx,2\n", &params(), &MapConfig::default()).unwrap_err();
        assert!(!err.is_schema());
        assert!(matches!(err, PipelineError::Load(LoadError::InvalidCoordinate { .. })));
    }

    #[test]
    fn filter_narrows_map_and_summary() {
        let mut p = params();
        p.filter = Some(FilterRequest {
            column: Some("type".to_string()),
            values: Some(vec!["puits".to_string()]),
        });
        let out = run(POINTS.as_bytes(), &p, &MapConfig::default()).unwrap();
        assert_eq!(out.summary.count, 2);
        assert!((out.summary.mean_latitude - (6.50 + 9.34) / 2.0).abs() < 1e-9);
        let choices = out.filter.unwrap();
        assert_eq!(choices.columns, vec!["Nom", "type"]);
        assert_eq!(choices.values, vec!["puits", "forage"]);
        assert_eq!(choices.applied.allowed, vec!["puits"]);
    }

    #[test]
    fn empty_after_filter_is_reported() {
        let mut p = params();
        p.filter = Some(FilterRequest {
            column: Some("type".to_string()),
            values: Some(vec![]),
        });
        let err = run(POINTS.as_bytes(), &p, &MapConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Render(RenderError::EmptyDataset)));
    }

    #[test]
    fn filter_without_text_columns_warns_and_passes_through() {
        let mut p = params();
        p.filter = Some(FilterRequest::default());
        let out = run(b"latitude,longitude\n1,2\n3,4\n", &p, &MapConfig::default()).unwrap();
        assert_eq!(out.warnings, vec![FilterError::Unavailable]);
        assert_eq!(out.summary.count, 2);
    }

    #[test]
    fn prepared_data_renders_in_every_mode() {
        let mut p = params();
        p.filter = Some(FilterRequest::default());
        let prepared = prepare(b"latitude,longitude\n1,2\n3,4\n", &p).unwrap();
        assert_eq!(prepared.warnings, vec![FilterError::Unavailable]);

        for mode in VizMode::ALL {
            p.mode = mode;
            let out = finish(prepared.clone(), &p, &MapConfig::default()).unwrap();
            assert_eq!(out.summary.count, 2);
            assert_eq!(out.clone().warnings, prepared.warnings);
        }
    }

    #[test]
    fn heatmap_with_buffers() {
        let mut p = params();
        p.mode = VizMode::Heatmap;
        p.buffer = true;
        p.radius_km = 2.0;
        let out = run(POINTS.as_bytes(), &p, &MapConfig::default()).unwrap();
        assert_eq!(out.map.marker_count(), 0);
        assert!(out.map.layers.iter().any(|l| matches!(l, Layer::Heat { radius_px: 15, .. })));
        assert!(out
            .map
            .layers
            .iter()
            .any(|l| matches!(l, Layer::Buffers { radius_m, .. } if (*radius_m - 2000.0).abs() < 1e-9)));
    }
}
