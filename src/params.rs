use crate::filter::FilterRequest;
use crate::types::{BufferParams, Color, VizMode};

pub const MIN_RADIUS_KM: f64 = 0.1;
pub const MAX_RADIUS_KM: f64 = 10.0;
pub const DEFAULT_RADIUS_KM: f64 = 1.0;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParamError {
    #[error("unknown visualization mode: {0}")]
    Mode(String),
    #[error("invalid marker color: {0}")]
    Color(String),
    #[error("invalid buffer radius: {0}")]
    Radius(String),
}

/// Widget state for one interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderParams {
    pub mode: VizMode,
    pub color: Color,
    pub filter: Option<FilterRequest>,
    /// Slider value; only applied when `buffer` is set.
    pub radius_km: f64,
    pub buffer: bool,
    pub address: Option<String>,
}

impl RenderParams {
    pub fn new(default_color: Color) -> Self {
        Self {
            mode: VizMode::Markers,
            color: default_color,
            filter: None,
            radius_km: DEFAULT_RADIUS_KM,
            buffer: false,
            address: None,
        }
    }

    pub fn buffer(&self) -> Option<BufferParams> {
        self.buffer.then_some(BufferParams { radius_km: self.radius_km })
    }

    /// Bind query-string pairs. Repeated `value` keys form the multi-select;
    /// `values_for` names the column those values were picked for.
    pub fn from_pairs(pairs: &[(String, String)], default_color: Color) -> Result<Self, ParamError> {
        let mut params = Self::new(default_color);
        let mut filter_on = false;
        let mut column = None;
        let mut values = Vec::new();
        let mut values_for = None;

        for (key, value) in pairs {
            match key.as_str() {
                "mode" => {
                    params.mode = VizMode::parse(value).ok_or_else(|| ParamError::Mode(value.clone()))?;
                }
                "color" => {
                    params.color = Color::parse(value).ok_or_else(|| ParamError::Color(value.clone()))?;
                }
                "radius_km" => params.radius_km = parse_radius(value)?,
                "buffer" => params.buffer = parse_flag(value),
                "filter" => filter_on = parse_flag(value),
                "column" if !value.is_empty() => column = Some(value.clone()),
                "value" => values.push(value.clone()),
                "values_for" if !value.is_empty() => values_for = Some(value.clone()),
                "address" if !value.trim().is_empty() => params.address = Some(value.trim().to_string()),
                _ => {}
            }
        }

        if filter_on {
            let picked = values_for.is_some() && values_for == column;
            params.filter = Some(FilterRequest {
                column,
                values: picked.then_some(values),
            });
        }

        Ok(params)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "on" | "yes")
}

/// Snap to the slider's 0.1 km step and clamp to its range.
fn parse_radius(value: &str) -> Result<f64, ParamError> {
    let km: f64 = value
        .trim()
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| ParamError::Radius(value.to_string()))?;
    Ok(((km * 10.0).round() / 10.0).clamp(MIN_RADIUS_KM, MAX_RADIUS_KM))
}
