use crate::config::AppConfig;
use crate::data;
use crate::geocode::{GeocodeError, GeocodeHit, Geocoder};
use crate::params::RenderParams;
use crate::pipeline::{self, FilterChoices, PipelineError, PipelineOutput};
use crate::summary::{self, Summary, CSV_EXPORT_MIME, CSV_EXPORT_NAME, MAP_EXPORT_MIME, MAP_EXPORT_NAME};
use crate::template_engine::{TemplateEngine, PAGE_TITLE};
use crate::types::{Color, Dataset, VizMode};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// The single in-memory upload. Every interaction re-parses it from scratch.
#[derive(Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Bytes,
}

pub struct AppState {
    pub config: AppConfig,
    pub default_color: Color,
    pub templates: TemplateEngine,
    pub geocoder: Geocoder,
    pub upload: RwLock<Option<Upload>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let default_color = Color::parse(&config.map.default_color)
            .ok_or_else(|| anyhow!("invalid map.default_color: {}", config.map.default_color))?;
        let templates = TemplateEngine::new().context("Failed to compile templates")?;
        let geocoder = Geocoder::new(&config.geocoder).context("Failed to build geocoder client")?;
        Ok(Self {
            config,
            default_color,
            templates,
            geocoder,
            upload: RwLock::new(None),
        })
    }
}

type Pairs = Vec<(String, String)>;

pub fn router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.server.max_upload_mb * 1024 * 1024;

    Router::new()
        .route("/", get(dashboard_handler))
        .route("/upload", post(upload_handler).layer(DefaultBodyLimit::max(upload_limit)))
        .route("/map", get(map_handler))
        .route("/export/map", get(export_map_handler))
        .route("/export/csv", get(export_csv_handler))
        .route("/api/geocode", get(geocode_handler))
        .route("/api/summary", get(summary_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;
    let state = Arc::new(AppState::new(config)?);

    info!("starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// --- Views ---

#[derive(Serialize)]
struct ModeOption {
    value: &'static str,
    label: &'static str,
    selected: bool,
}

#[derive(Serialize)]
struct ColumnOption {
    name: String,
    selected: bool,
}

#[derive(Serialize)]
struct ValueOption {
    value: String,
    selected: bool,
}

#[derive(Serialize)]
struct FilterView {
    columns: Vec<ColumnOption>,
    column: String,
    values: Vec<ValueOption>,
}

impl From<&FilterChoices> for FilterView {
    fn from(choices: &FilterChoices) -> Self {
        FilterView {
            columns: choices
                .columns
                .iter()
                .map(|name| ColumnOption {
                    selected: *name == choices.applied.column,
                    name: name.clone(),
                })
                .collect(),
            column: choices.applied.column.clone(),
            values: choices
                .values
                .iter()
                .map(|value| ValueOption {
                    selected: choices.applied.allowed.contains(value),
                    value: value.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct TableView {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TableView {
    fn head(dataset: &Dataset, limit: usize) -> Self {
        TableView {
            headers: dataset.headers.clone(),
            rows: dataset.rows.iter().take(limit).map(|r| r.fields.clone()).collect(),
        }
    }
}

#[derive(Serialize)]
struct SummaryView {
    count: usize,
    latitude: String,
    longitude: String,
}

impl From<&Summary> for SummaryView {
    fn from(s: &Summary) -> Self {
        SummaryView {
            count: s.count,
            latitude: s.latitude_display(),
            longitude: s.longitude_display(),
        }
    }
}

#[derive(Serialize, Debug, PartialEq)]
struct GeocodeView {
    level: &'static str,
    message: String,
    copy: Option<String>,
}

impl GeocodeView {
    fn from_lookup(result: &Result<Option<GeocodeHit>, GeocodeError>) -> Self {
        match result {
            Ok(Some(hit)) => GeocodeView {
                level: "success",
                message: format!("Adresse trouvée: {}", hit.rounded()),
                copy: Some(hit.full()),
            },
            Ok(None) => GeocodeView {
                level: "warning",
                message: "Adresse non trouvée".to_string(),
                copy: None,
            },
            Err(e) => GeocodeView {
                level: "warning",
                message: format!("Erreur géocodage: {}", e),
                copy: None,
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorView {
    blocking: bool,
    message: String,
}

impl From<&PipelineError> for ErrorView {
    fn from(e: &PipelineError) -> Self {
        ErrorView {
            blocking: e.is_schema(),
            message: e.to_string(),
        }
    }
}

#[derive(Serialize)]
struct UploadView {
    file_name: String,
}

#[derive(Serialize)]
struct DashboardView {
    title: &'static str,
    map_height: u32,
    modes: Vec<ModeOption>,
    color: String,
    filter_on: bool,
    filter: Option<FilterView>,
    filter_warning: Option<String>,
    buffer: bool,
    radius_km: String,
    address: String,
    geocode: Option<GeocodeView>,
    upload: Option<UploadView>,
    example: TableView,
    preview: Option<TableView>,
    summary: Option<SummaryView>,
    query: String,
    error: Option<ErrorView>,
}

// --- Handlers ---

async fn dashboard_handler(State(state): State<Arc<AppState>>, Query(pairs): Query<Pairs>) -> Response {
    let (params, mut error) = match RenderParams::from_pairs(&pairs, state.default_color) {
        Ok(p) => (p, None),
        Err(e) => (RenderParams::new(state.default_color), Some(ErrorView::from(&PipelineError::from(e)))),
    };

    // Independent of the upload: a failed lookup only produces a warning.
    let geocode = match &params.address {
        Some(address) => {
            let result = state.geocoder.lookup(address).await;
            if let Err(e) = &result {
                warn!("geocoding '{}' failed: {}", address, e);
            }
            Some(GeocodeView::from_lookup(&result))
        }
        None => None,
    };

    let upload = state.upload.read().await.clone();
    let mut view = DashboardView {
        title: PAGE_TITLE,
        map_height: state.config.map.height_px,
        modes: VizMode::ALL
            .iter()
            .map(|m| ModeOption { value: m.as_str(), label: m.label(), selected: *m == params.mode })
            .collect(),
        color: params.color.to_hex(),
        filter_on: params.filter.is_some(),
        filter: None,
        filter_warning: None,
        buffer: params.buffer,
        radius_km: format!("{:.1}", params.radius_km),
        address: params.address.clone().unwrap_or_default(),
        geocode,
        upload: upload.as_ref().map(|u| UploadView { file_name: u.file_name.clone() }),
        example: TableView::head(&data::example_dataset(), usize::MAX),
        preview: None,
        summary: None,
        query: canonical_query(&pairs),
        error: None,
    };

    if let Some(upload) = upload.as_ref().filter(|_| error.is_none()) {
        match pipeline::prepare(&upload.bytes, &params) {
            Ok(prepared) => {
                view.filter = prepared.filter.as_ref().map(FilterView::from);
                view.filter_warning = prepared.warnings.first().map(ToString::to_string);
                match pipeline::finish(prepared, &params, &state.config.map) {
                    Ok(out) => {
                        view.preview = Some(TableView::head(&out.dataset, state.config.map.preview_rows));
                        view.summary = Some(SummaryView::from(&out.summary));
                    }
                    Err(e) => error = Some(ErrorView::from(&e)),
                }
            }
            Err(e) => error = Some(ErrorView::from(&e)),
        }
    }
    if let Some(e) = &error {
        warn!("dashboard error: {}", e.message);
    }
    view.error = error;

    match state.templates.render_dashboard(&view) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("dashboard template error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "error rendering page").into_response()
        }
    }
}

async fn upload_handler(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let mut query = String::new();
    let mut upload = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return (StatusCode::BAD_REQUEST, format!("invalid upload: {}", e)).into_response(),
        };
        match field.name() {
            Some("query") => match field.text().await {
                Ok(text) => query = text,
                Err(e) => return (StatusCode::BAD_REQUEST, format!("invalid upload: {}", e)).into_response(),
            },
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload.csv").to_string();
                if !file_name.to_lowercase().ends_with(".csv") {
                    return (StatusCode::BAD_REQUEST, format!("unsupported file type: {}", file_name)).into_response();
                }
                let bytes = match field.bytes().await {
                    Ok(b) => b,
                    Err(e) => return (StatusCode::BAD_REQUEST, format!("invalid upload: {}", e)).into_response(),
                };
                upload = Some(Upload { file_name, bytes });
            }
            _ => continue,
        }
    }

    let Some(upload) = upload else {
        return (StatusCode::BAD_REQUEST, "missing 'file' field").into_response();
    };
    info!("received {} ({} bytes)", upload.file_name, upload.bytes.len());
    *state.upload.write().await = Some(upload);
    Redirect::to(&dashboard_location(&query)).into_response()
}

/// Back to the dashboard with the sidebar values the upload form carried.
fn dashboard_location(query: &str) -> String {
    let pairs: Pairs = url::form_urlencoded::parse(query.as_bytes()).into_owned().collect();
    let query = canonical_query(&pairs);
    if query.is_empty() {
        "/".to_string()
    } else {
        format!("/?{query}")
    }
}

async fn map_handler(State(state): State<Arc<AppState>>, Query(pairs): Query<Pairs>) -> Response {
    match render_map_document(&state, &pairs).await {
        Ok(html) => Html(html).into_response(),
        Err(resp) => resp,
    }
}

async fn export_map_handler(State(state): State<Arc<AppState>>, Query(pairs): Query<Pairs>) -> Response {
    match render_map_document(&state, &pairs).await {
        Ok(html) => attachment(MAP_EXPORT_MIME, MAP_EXPORT_NAME, html),
        Err(resp) => resp,
    }
}

async fn export_csv_handler(State(state): State<Arc<AppState>>, Query(pairs): Query<Pairs>) -> Response {
    let out = match run_current(&state, &pairs).await {
        Ok(out) => out,
        Err(resp) => return resp,
    };
    match summary::export_csv(&out.dataset) {
        Ok(csv) => attachment(CSV_EXPORT_MIME, CSV_EXPORT_NAME, csv),
        Err(e) => error_response(&PipelineError::from(e)),
    }
}

async fn summary_handler(State(state): State<Arc<AppState>>, Query(pairs): Query<Pairs>) -> Response {
    match run_current(&state, &pairs).await {
        Ok(out) => Json(out.summary).into_response(),
        Err(resp) => resp,
    }
}

#[derive(Deserialize)]
struct GeocodeQuery {
    #[serde(default)]
    address: String,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum GeocodeResponse {
    Found {
        latitude: f64,
        longitude: f64,
        rounded: String,
        display_name: Option<String>,
    },
    NotFound,
    Error {
        message: String,
    },
}

async fn geocode_handler(State(state): State<Arc<AppState>>, Query(query): Query<GeocodeQuery>) -> Json<GeocodeResponse> {
    let response = match state.geocoder.lookup(&query.address).await {
        Ok(Some(hit)) => GeocodeResponse::Found {
            latitude: hit.latitude,
            longitude: hit.longitude,
            rounded: hit.rounded(),
            display_name: hit.display_name,
        },
        Ok(None) => GeocodeResponse::NotFound,
        Err(e) => {
            warn!("geocoding '{}' failed: {}", query.address, e);
            GeocodeResponse::Error { message: e.to_string() }
        }
    };
    Json(response)
}

// --- Helpers ---

async fn run_current(state: &AppState, pairs: &[(String, String)]) -> Result<PipelineOutput, Response> {
    let Some(upload) = state.upload.read().await.clone() else {
        return Err((StatusCode::NOT_FOUND, "no file uploaded").into_response());
    };
    RenderParams::from_pairs(pairs, state.default_color)
        .map_err(PipelineError::from)
        .and_then(|params| pipeline::run(&upload.bytes, &params, &state.config.map))
        .map_err(|e| error_response(&e))
}

async fn render_map_document(state: &AppState, pairs: &[(String, String)]) -> Result<String, Response> {
    let out = run_current(state, pairs).await?;
    state
        .templates
        .render_map(&out.map, state.config.map.height_px)
        .map_err(|e| error_response(&PipelineError::from(e)))
}

fn error_response(e: &PipelineError) -> Response {
    let status = match e {
        _ if e.is_schema() => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Params(_) | PipelineError::Load(_) | PipelineError::Render(_) => StatusCode::BAD_REQUEST,
        PipelineError::Export(_) | PipelineError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!("request failed ({}): {}", status, e);
    (status, e.to_string()).into_response()
}

fn attachment(mime: &str, file_name: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, format!("{mime}; charset=utf-8")),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{file_name}\"")),
        ],
        body,
    )
        .into_response()
}

/// Widget values for the embedded map and download links. The address is
/// left out so those requests never hit the geocoder.
fn canonical_query(pairs: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().filter(|(k, _)| k != "address"))
        .finish()
}
