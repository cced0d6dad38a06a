use crate::render::MapArtifact;
use tera::{Context, Tera};

const MAP_TEMPLATE: &str = "map.html";
const DASHBOARD_TEMPLATE: &str = "dashboard.html";

pub const PAGE_TITLE: &str = "GeoViz App";

/// HTML templates compiled into the binary so exported maps need no files on disk.
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    pub fn new() -> tera::Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (MAP_TEMPLATE, include_str!("../templates/map.html")),
            (DASHBOARD_TEMPLATE, include_str!("../templates/dashboard.html")),
        ])?;
        Ok(Self { tera })
    }

    /// Standalone Leaflet document for `map`.
    pub fn render_map(&self, map: &MapArtifact, height_px: u32) -> tera::Result<String> {
        // The JSON lands inside a <script> block.
        let map_json = serde_json::to_string(map)
            .map_err(|e| tera::Error::msg(format!("failed to serialize map: {e}")))?
            .replace("</", "<\\/");

        let mut context = Context::new();
        context.insert("title", PAGE_TITLE);
        context.insert("height_px", &height_px);
        context.insert("map_json", &map_json);
        self.tera.render(MAP_TEMPLATE, &context)
    }

    pub fn render_dashboard<T: serde::Serialize>(&self, view: &T) -> tera::Result<String> {
        let context = Context::from_serialize(view)?;
        self.tera.render(DASHBOARD_TEMPLATE, &context)
    }
}
