pub mod types;
pub mod config;
pub mod data;
pub mod filter;
pub mod params;
pub mod render;
pub mod summary;
pub mod geocode;
pub mod pipeline;
pub mod template_engine;
pub mod server;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the interactive dashboard
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Render one CSV to carte_interactive.html and donnees_filtrees.csv
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long, value_name = "CSV")]
        input: PathBuf,
        /// markers, clusters or heatmap
        #[arg(short, long, default_value = "markers")]
        mode: String,
        /// Marker color as #RRGGBB
        #[arg(long)]
        color: Option<String>,
        /// Draw a buffer of this radius (km) around every point
        #[arg(long, value_name = "KM")]
        buffer_km: Option<f64>,
        #[arg(long, value_name = "COLUMN")]
        filter_column: Option<String>,
        /// Allowed value of the filter column, repeatable
        #[arg(long = "filter-value", value_name = "VALUE")]
        filter_values: Vec<String>,
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        out_dir: PathBuf,
    },
    /// Look up the coordinates of an address
    Geocode {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        address: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let app_config = config::AppConfig::load_or_default(&config)?;
            server::start_server(app_config).await?;
        }
        Commands::Render {
            config,
            input,
            mode,
            color,
            buffer_km,
            filter_column,
            filter_values,
            out_dir,
        } => {
            let app_config = config::AppConfig::load_or_default(&config)?;
            let default_color = types::Color::parse(&app_config.map.default_color)
                .ok_or_else(|| anyhow!("invalid map.default_color: {}", app_config.map.default_color))?;

            let pairs = render_pairs(&mode, color, buffer_km, filter_column, filter_values);
            let render_params = params::RenderParams::from_pairs(&pairs, default_color)?;

            let bytes = fs::read(&input).with_context(|| format!("Failed to read CSV file: {:?}", input))?;
            let out = pipeline::run(&bytes, &render_params, &app_config.map)?;
            for warning in &out.warnings {
                eprintln!("warning: {}", warning);
            }

            let engine = template_engine::TemplateEngine::new()?;
            let html = engine.render_map(&out.map, app_config.map.height_px)?;
            let csv = summary::export_csv(&out.dataset)?;

            fs::create_dir_all(&out_dir).with_context(|| format!("Failed to create {:?}", out_dir))?;
            let map_path = out_dir.join(summary::MAP_EXPORT_NAME);
            let csv_path = out_dir.join(summary::CSV_EXPORT_NAME);
            fs::write(&map_path, html).with_context(|| format!("Failed to write {:?}", map_path))?;
            fs::write(&csv_path, csv).with_context(|| format!("Failed to write {:?}", csv_path))?;
            info!("wrote {:?} and {:?}", map_path, csv_path);

            println!("Nombre de points: {}", out.summary.count);
            println!("Latitude moyenne: {}", out.summary.latitude_display());
            println!("Longitude moyenne: {}", out.summary.longitude_display());
        }
        Commands::Geocode { config, address } => {
            let app_config = config::AppConfig::load_or_default(&config)?;
            let geocoder = geocode::Geocoder::new(&app_config.geocoder)?;
            match geocoder.lookup(&address).await? {
                Some(hit) => {
                    println!("Adresse trouvée: {}", hit.rounded());
                    println!("{}", hit.full());
                }
                None => println!("Adresse non trouvée"),
            }
        }
    }

    Ok(())
}

/// Express CLI flags as the same key/value pairs the dashboard sends.
fn render_pairs(
    mode: &str,
    color: Option<String>,
    buffer_km: Option<f64>,
    filter_column: Option<String>,
    filter_values: Vec<String>,
) -> Vec<(String, String)> {
    let mut pairs = vec![("mode".to_string(), mode.to_string())];
    if let Some(color) = color {
        pairs.push(("color".to_string(), color));
    }
    if let Some(km) = buffer_km {
        pairs.push(("buffer".to_string(), "on".to_string()));
        pairs.push(("radius_km".to_string(), km.to_string()));
    }
    if filter_column.is_some() || !filter_values.is_empty() {
        pairs.push(("filter".to_string(), "on".to_string()));
    }
    if let Some(column) = filter_column {
        if !filter_values.is_empty() {
            pairs.push(("values_for".to_string(), column.clone()));
        }
        pairs.push(("column".to_string(), column));
    }
    pairs.extend(filter_values.into_iter().map(|v| ("value".to_string(), v)));
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_bind_like_the_dashboard() {
        let pairs = render_pairs(
            "heatmap",
            Some("#FF0000".to_string()),
            Some(2.0),
            Some("type".to_string()),
            vec!["puits".to_string()],
        );
        let p = params::RenderParams::from_pairs(&pairs, types::Color([0, 0, 0])).unwrap();
        assert_eq!(p.mode, types::VizMode::Heatmap);
        assert_eq!(p.color, types::Color([255, 0, 0]));
        assert!((p.buffer().unwrap().radius_m() - 2000.0).abs() < 1e-9);
        let filter = p.filter.unwrap();
        assert_eq!(filter.column.as_deref(), Some("type"));
        assert_eq!(filter.values, Some(vec!["puits".to_string()]));
    }

    #[test]
    fn filter_column_alone_uses_default_values() {
        let pairs = render_pairs("markers", None, None, Some("type".to_string()), vec![]);
        let p = params::RenderParams::from_pairs(&pairs, types::Color([0, 0, 0])).unwrap();
        assert!(p.buffer().is_none());
        assert_eq!(p.filter.as_ref().unwrap().values, None);
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
