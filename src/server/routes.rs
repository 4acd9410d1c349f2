use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::backtest::{self, BacktestReport, BacktestSettings};
use crate::classifier::{ranked_feature_importances, FeatureImportance};
use crate::context::AppContext;
use crate::error::ApiResult;
use crate::predictor::{self, PredictionReport};

/// Feature importances are reported for at most this many features.
const MAX_REPORTED_FEATURES: usize = 15;

const DASHBOARD_HTML: &str = include_str!("../../static/index.html");
const DASHBOARD_JS: &str = include_str!("../../static/js/main.js");

pub async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

pub async fn dashboard_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        DASHBOARD_JS,
    )
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// `GET /api/backtest` — train/test evaluation over the historical dataset.
pub async fn backtest(State(ctx): State<AppContext>) -> ApiResult<Json<BacktestReport>> {
    let data = ctx.dataset()?;
    let settings = BacktestSettings::from_config(ctx.config());
    let report = backtest::run(data, &settings)
        .map_err(|error| crate::error::ApiError::Internal(error.to_string()))?;
    Ok(Json(report))
}

/// `GET /api/predict` — score the forward sample with the cached model.
pub async fn predict(State(ctx): State<AppContext>) -> ApiResult<Json<PredictionReport>> {
    let model = ctx.model()?;
    let forward = ctx.forward_sample()?;
    let report = predictor::predict(model, &forward, ctx.config().probability_cutoff)?;
    Ok(Json(report))
}

#[derive(Debug, Serialize)]
pub struct FeatureImportanceResponse {
    pub features: Vec<FeatureImportance>,
}

/// `GET /api/feature_importance` — top features of the cached model.
pub async fn feature_importance(
    State(ctx): State<AppContext>,
) -> ApiResult<Json<FeatureImportanceResponse>> {
    let data = ctx.dataset()?;
    let model = ctx.model()?;

    let mut features = ranked_feature_importances(model, &data.feature_names);
    features.truncate(MAX_REPORTED_FEATURES);
    Ok(Json(FeatureImportanceResponse { features }))
}

#[derive(Debug, Serialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Serialize)]
pub struct DatasetInfoResponse {
    pub training_samples: usize,
    pub forward_samples: usize,
    pub features_count: usize,
    pub date_range: Option<DateRange>,
    pub market_index: String,
}

/// `GET /api/dataset_info` — row counts and metadata of both CSVs.
pub async fn dataset_info(State(ctx): State<AppContext>) -> ApiResult<Json<DatasetInfoResponse>> {
    let data = ctx.dataset()?;
    let forward = ctx.forward_sample()?;

    let date_range = data.date_range().map(|(start, end)| DateRange {
        start: start.to_string(),
        end: end.to_string(),
    });

    Ok(Json(DatasetInfoResponse {
        training_samples: data.n_samples(),
        forward_samples: forward.n_samples(),
        features_count: data.n_features(),
        date_range,
        market_index: data.index_column.clone(),
    }))
}
