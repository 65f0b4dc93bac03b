use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::criteria::loader::criteria_from_value;
use crate::criteria::{
    CriteriaDivergence, CriteriaSet, CriteriaStore, CriterionField, DivergenceImpact,
};
use crate::eligibility::evaluator::evaluate;
use crate::eligibility::{EvaluationResult, FeatureWarning};
use crate::error::ScreeningError;
use crate::patients::{Dataset, PatientRecord};
use crate::report::{build_dashboard, feature_distribution, DashboardReport, FeatureDistribution};

#[derive(Clone)]
struct ApiState {
    config: Config,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<ScreeningError> for ApiError {
    fn from(error: ScreeningError) -> Self {
        Self::bad_request(error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Clone, Deserialize)]
struct FieldEdit {
    name: String,
    field: String,
    raw: String,
}

#[derive(Debug, Clone, Deserialize)]
struct EvaluateRequest {
    patients: Vec<PatientRecord>,
    criteria: Value,
    #[serde(default)]
    edits: Vec<FieldEdit>,
    limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReviewRequest {
    criteria: Value,
    #[serde(default)]
    edits: Vec<FieldEdit>,
    #[serde(default)]
    patients: Vec<PatientRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct DistributionRequest {
    patients: Vec<PatientRecord>,
    criteria: Value,
    #[serde(default)]
    edits: Vec<FieldEdit>,
    feature: String,
    bins: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct EvaluateResponse {
    results: Vec<EvaluationResult>,
    warnings: Vec<FeatureWarning>,
    #[serde(flatten)]
    dashboard: DashboardReport,
}

#[derive(Debug, Serialize)]
struct ReviewResponse {
    diverged: bool,
    divergences: Vec<CriteriaDivergence>,
    impact: Option<DivergenceImpact>,
}

pub async fn run_server(config: Config, bind: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("REST API listening on http://{bind}");
    axum::serve(listener, router(config)).await?;
    Ok(())
}

fn router(config: Config) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/v1/config", get(show_config))
        .route("/v1/evaluate", post(evaluate_dataset))
        .route("/v1/review", post(review))
        .route("/v1/distribution", post(distribution))
        .layer(cors)
        .with_state(ApiState { config })
}

async fn health() -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn show_config(State(state): State<ApiState>) -> Json<ApiResponse<Config>> {
    ok(state.config)
}

async fn evaluate_dataset(
    State(state): State<ApiState>,
    Json(request): Json<EvaluateRequest>,
) -> ApiResult<EvaluateResponse> {
    let dataset = Dataset::new(request.patients)?;
    let store = build_store(request.criteria, &request.edits)?;
    let criteria = store.active_criteria()?;
    let run = evaluate(dataset.patients(), &criteria, state.config.match_policy());
    let limit = request
        .limit
        .unwrap_or(state.config.report.terminal_case_limit);
    let dashboard = build_dashboard(&run, limit)?;

    Ok(ok(EvaluateResponse {
        results: run.results,
        warnings: run.warnings,
        dashboard,
    }))
}

async fn review(
    State(state): State<ApiState>,
    Json(request): Json<ReviewRequest>,
) -> ApiResult<ReviewResponse> {
    let store = build_store(request.criteria, &request.edits)?;
    let impact = if request.patients.is_empty() {
        None
    } else {
        let dataset = Dataset::new(request.patients)?;
        let policy = state.config.match_policy();
        let before = evaluate(dataset.patients(), store.original(), policy);
        let after = evaluate(dataset.patients(), &store.active_criteria()?, policy);
        Some(crate::criteria::classify_divergence_impact(&before, &after))
    };

    Ok(ok(ReviewResponse {
        diverged: store.has_diverged(),
        divergences: store.diff(),
        impact,
    }))
}

async fn distribution(
    State(state): State<ApiState>,
    Json(request): Json<DistributionRequest>,
) -> ApiResult<FeatureDistribution> {
    let dataset = Dataset::new(request.patients)?;
    let store = build_store(request.criteria, &request.edits)?;
    let run = evaluate(
        dataset.patients(),
        &store.active_criteria()?,
        state.config.match_policy(),
    );
    let bins = request
        .bins
        .unwrap_or(state.config.report.histogram_bins)
        .max(1);
    Ok(ok(feature_distribution(
        dataset.patients(),
        &run,
        &request.feature,
        bins,
    )))
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}

fn build_store(criteria: Value, edits: &[FieldEdit]) -> std::result::Result<CriteriaStore, ApiError> {
    let set: CriteriaSet =
        criteria_from_value(criteria).map_err(|error| ApiError::bad_request(error.to_string()))?;
    let mut store = CriteriaStore::from_extracted(set)?;
    for edit in edits {
        let field = CriterionField::from_str(&edit.field)
            .map_err(|error| ApiError::bad_request(error.to_string()))?;
        store.set_field(&edit.name, field, &edit.raw)?;
    }
    store.finalize()?;
    Ok(store)
}
