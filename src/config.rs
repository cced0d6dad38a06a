use serde::Deserialize;
use std::path::Path;
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub map: MapConfig,
    pub geocoder: GeocoderConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
            max_upload_mb: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    pub zoom_start: u8,
    pub tiles_url: String,
    pub tiles_attribution: String,
    pub marker_radius_px: u32,
    pub heat_radius_px: u32,
    pub default_color: String, // Hex code
    pub height_px: u32,
    pub preview_rows: usize,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            zoom_start: 10,
            tiles_url: "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png".to_string(),
            tiles_attribution: "&copy; OpenStreetMap contributors &copy; CARTO".to_string(),
            marker_radius_px: 6,
            heat_radius_px: 15,
            default_color: "#33FFFC".to_string(),
            height_px: 500,
            preview_rows: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: "geoviz_app".to_string(),
            timeout_secs: 10,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Like `load_from_file`, but a missing file falls back to the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::warn!("config file {:?} not found, using defaults", path);
            Ok(Self::default())
        }
    }
}
