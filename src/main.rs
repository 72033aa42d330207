//! Question Sheet Extractor - turns a scanned question paper and answer sheet
//! into a categorized question workbook.

mod answer_key;
mod assembler;
mod classifier;
mod config;
mod enrichment;
mod error;
mod ocr;
mod openrouter;
mod oracle;
mod pipeline;
mod records;
mod segmenter;
mod workbook;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use config::{ConfigStore, Settings};
use error::ApiError;
use ocr::mathpix::MathpixProvider;
use ocr::{OcrInput, OcrPoller};
use openrouter::OpenRouterClient;
use pipeline::{Pipeline, FINAL_WORKBOOK};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const QUESTION_PAPER_FIELD: &str = "questionPaper";
const ANSWER_SHEET_FIELD: &str = "answerSheet";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    configs: Arc<ConfigStore>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "question_sheet_extractor=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    let configs = ConfigStore::load_from_dir(&settings.config_dir)?;
    info!("Loaded {} vocabularies: {:?}", configs.list().len(), configs.list());

    let client = reqwest::Client::new();
    let mathpix = MathpixProvider::new(
        client.clone(),
        settings.mathpix_app_id.clone(),
        settings.mathpix_api_key.clone(),
    );

    let mut openrouter = OpenRouterClient::new(client, settings.openrouter_api_key.clone());
    if let Some(model) = &settings.openrouter_model {
        openrouter = openrouter.with_model(model.clone());
    }
    info!("OpenRouter client initialized (model={})", openrouter.model());

    let pipeline = Pipeline::new(
        Arc::new(mathpix),
        OcrPoller::new(settings.poll),
        Arc::new(openrouter),
    );
    info!(
        "OCR polling every {:?}, at most {} attempts",
        settings.poll.interval, settings.poll.max_attempts
    );

    let state = AppState {
        pipeline: Arc::new(pipeline),
        configs: Arc::new(configs),
    };

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!("Server listening on http://{}", settings.bind_addr);
    axum::serve(listener, app(state)).await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/configs", get(list_configs))
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024)) // 100MB
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// List available vocabularies.
async fn list_configs(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.configs.list())
}

#[derive(serde::Deserialize)]
struct UploadQuery {
    config: Option<String>,
}

/// Accept a question paper and answer sheet, return the enriched workbook.
async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let vocab = state
        .configs
        .resolve(query.config.as_deref())
        .ok_or_else(|| ApiError::UnknownConfig {
            name: query.config.clone().unwrap_or_default(),
            available: state.configs.list(),
        })?;

    let mut question_paper: Option<OcrInput> = None;
    let mut answer_sheet: Option<OcrInput> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Multipart(e.to_string()))?
    {
        let slot = match field.name() {
            Some(QUESTION_PAPER_FIELD) => &mut question_paper,
            Some(ANSWER_SHEET_FIELD) => &mut answer_sheet,
            _ => continue,
        };

        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::Multipart(format!("Failed to read file: {}", e)))?
            .to_vec();

        *slot = Some(OcrInput {
            filename,
            content_type,
            data,
        });
    }

    let (Some(question_paper), Some(answer_sheet)) = (question_paper, answer_sheet) else {
        return Err(ApiError::MissingFiles);
    };
    if question_paper.filename.is_empty() || answer_sheet.filename.is_empty() {
        return Err(ApiError::EmptyFilename);
    }

    info!(
        "Received {} ({} bytes) and {} ({} bytes) with vocabulary: {}",
        question_paper.filename,
        question_paper.data.len(),
        answer_sheet.filename,
        answer_sheet.data.len(),
        vocab.name
    );

    let output = state
        .pipeline
        .process(&question_paper, &answer_sheet, vocab)
        .await?;

    if !output.dropped.is_empty() {
        let labels: Vec<String> = output
            .dropped
            .iter()
            .map(|d| format!("{} ({} options)", d.label, d.option_count))
            .collect();
        warn!(
            "[{}] Questions left out of every sheet: {}",
            output.run_id,
            labels.join(", ")
        );
    }
    info!(
        "[{}] Returning {} ({} enriched, {} failed enrichment)",
        output.run_id, FINAL_WORKBOOK, output.enrichment.enriched, output.enrichment.failed
    );

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_MIME.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", FINAL_WORKBOOK),
            ),
        ],
        output.workbook,
    )
        .into_response())
}
