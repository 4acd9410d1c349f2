use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use statrs::statistics::Statistics;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::config::FetchConfig;
use crate::context::AppContext;

/// Forward horizon the labels are computed over, in trading days.
const FORWARD_HORIZON: usize = 252;
/// Sampling stride between historical snapshots of the same ticker.
const SNAPSHOT_STRIDE: usize = 21;

const MA_SHORT: usize = 50;
const MA_LONG: usize = 200;
const MOMENTUM_SHORT: usize = 63;
const MOMENTUM_LONG: usize = 126;
const VOLATILITY_WINDOW: usize = 21;

const FEATURE_COLUMNS: [&str; 5] = [
    "price_to_ma_50",
    "price_to_ma_200",
    "momentum_63",
    "momentum_126",
    "volatility_21",
];

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub async fn run(app: &AppContext) -> Result<()> {
    let fetch_config = FetchConfig::from_env()?;
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build the HTTP client")?;

    info!(
        "Fetching {} tickers plus index {} from {}",
        fetch_config.tickers.len(),
        fetch_config.index_symbol,
        fetch_config.base_url
    );

    let index_series = fetch_series(&client, &fetch_config, &fetch_config.index_symbol)
        .await
        .with_context(|| {
            format!(
                "failed to fetch the index series {}",
                fetch_config.index_symbol
            )
        })?;
    let index = IndexSeries::new(&index_series);

    let pb = ProgressBar::new(fetch_config.tickers.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut training_rows = Vec::new();
    let mut forward_rows = Vec::new();
    let mut fetched = 0usize;
    for ticker in &fetch_config.tickers {
        match fetch_series(&client, &fetch_config, ticker).await {
            Ok(series) => {
                training_rows.extend(training_snapshots(ticker, &series, &index));
                forward_rows.extend(forward_snapshot(ticker, &series, &index));
                fetched += 1;
            }
            Err(error) => {
                warn!("Skipping {}: {}", ticker, error);
            }
        }
        pb.inc(1);
        tokio::time::sleep(Duration::from_millis(fetch_config.delay_ms)).await;
    }
    pb.finish_and_clear();

    if fetched == 0 {
        return Err(anyhow!("no ticker could be fetched; nothing written"));
    }

    let config = app.config();
    write_rows(
        &config.keystats_path,
        &fetch_config.index_column,
        &training_rows,
    )?;
    write_rows(
        &config.forward_sample_path,
        &fetch_config.index_column,
        &forward_rows,
    )?;

    info!(
        "Fetched {}/{} tickers; wrote {} training rows to {} and {} forward rows to {}",
        fetched,
        fetch_config.tickers.len(),
        training_rows.len(),
        config.keystats_path.display(),
        forward_rows.len(),
        config.forward_sample_path.display()
    );
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

/// One daily close observation.
#[derive(Debug, Clone, Copy)]
struct PricePoint {
    unix: i64,
    date: NaiveDate,
    close: f64,
}

/// Daily closes of one symbol, oldest first, with gaps removed.
#[derive(Debug, Clone)]
struct PriceSeries {
    points: Vec<PricePoint>,
}

async fn fetch_series(
    client: &Client,
    config: &FetchConfig,
    symbol: &str,
) -> Result<PriceSeries> {
    let url = format!(
        "{}/{}?range={}&interval=1d",
        config.base_url, symbol, config.range
    );
    let response: ChartResponse = client
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    if let Some(error) = response.chart.error {
        return Err(anyhow!("chart endpoint returned an error: {}", error));
    }
    let result = response
        .chart
        .result
        .and_then(|mut results| (!results.is_empty()).then(|| results.remove(0)))
        .ok_or_else(|| anyhow!("chart endpoint returned no result"))?;

    let timestamps = result
        .timestamp
        .ok_or_else(|| anyhow!("chart result has no timestamps"))?;
    let closes = result
        .indicators
        .quote
        .first()
        .and_then(|quote| quote.close.as_ref())
        .ok_or_else(|| anyhow!("chart result has no close series"))?;

    let mut points = Vec::with_capacity(timestamps.len());
    for (&unix, close) in timestamps.iter().zip(closes.iter().copied()) {
        let Some(close) = close.filter(|value| value.is_finite() && *value > 0.0) else {
            continue;
        };
        let Some(date) = DateTime::from_timestamp(unix, 0).map(|dt| dt.date_naive()) else {
            continue;
        };
        points.push(PricePoint { unix, date, close });
    }

    if points.len() <= MA_LONG {
        return Err(anyhow!(
            "series too short: {} usable closes, need more than {}",
            points.len(),
            MA_LONG
        ));
    }
    Ok(PriceSeries { points })
}

/// Index closes and forward changes keyed by date, for joining against
/// per-ticker snapshots.
struct IndexSeries {
    by_date: HashMap<NaiveDate, (f64, Option<f64>)>,
}

impl IndexSeries {
    fn new(series: &PriceSeries) -> Self {
        let points = &series.points;
        let by_date = points
            .iter()
            .enumerate()
            .map(|(i, point)| {
                let forward = points
                    .get(i + FORWARD_HORIZON)
                    .map(|future| percent_change(point.close, future.close));
                (point.date, (point.close, forward))
            })
            .collect();
        Self { by_date }
    }

    fn level(&self, date: NaiveDate) -> Option<f64> {
        self.by_date.get(&date).map(|(level, _)| *level)
    }

    fn forward_change(&self, date: NaiveDate) -> Option<f64> {
        self.by_date.get(&date).and_then(|(_, change)| *change)
    }
}

/// One output CSV row; change and index fields stay empty in the forward
/// sample.
struct SnapshotRow {
    date: NaiveDate,
    unix: i64,
    ticker: String,
    price: f64,
    stock_change: Option<f64>,
    index_level: Option<f64>,
    index_change: Option<f64>,
    features: Vec<f64>,
}

/// Percentage change from `from` to `to`.
fn percent_change(from: f64, to: f64) -> f64 {
    (to / from - 1.0) * 100.0
}

/// Price-derived features at position `i`, or None while the trailing
/// windows are not yet full.
fn features_at(points: &[PricePoint], i: usize) -> Option<Vec<f64>> {
    if i + 1 < MA_LONG || i < MOMENTUM_LONG {
        return None;
    }
    let close = points[i].close;

    let ma = |window: usize| -> f64 {
        let slice: Vec<f64> = points[i + 1 - window..=i]
            .iter()
            .map(|point| point.close)
            .collect();
        slice.mean()
    };

    let daily_returns: Vec<f64> = points[i - VOLATILITY_WINDOW..=i]
        .windows(2)
        .map(|pair| percent_change(pair[0].close, pair[1].close))
        .collect();

    Some(vec![
        close / ma(MA_SHORT),
        close / ma(MA_LONG),
        percent_change(points[i - MOMENTUM_SHORT].close, close),
        percent_change(points[i - MOMENTUM_LONG].close, close),
        daily_returns.std_dev(),
    ])
}

/// Historical snapshots of one ticker with realized forward changes, sampled
/// every [`SNAPSHOT_STRIDE`] trading days. Snapshots whose date is missing
/// from the index series are skipped.
fn training_snapshots(ticker: &str, series: &PriceSeries, index: &IndexSeries) -> Vec<SnapshotRow> {
    let points = &series.points;
    let mut rows = Vec::new();
    let start = MA_LONG.max(MOMENTUM_LONG);

    let mut i = start;
    while i + FORWARD_HORIZON < points.len() {
        let point = points[i];
        let (Some(index_level), Some(index_change)) =
            (index.level(point.date), index.forward_change(point.date))
        else {
            i += SNAPSHOT_STRIDE;
            continue;
        };
        let Some(features) = features_at(points, i) else {
            i += SNAPSHOT_STRIDE;
            continue;
        };

        rows.push(SnapshotRow {
            date: point.date,
            unix: point.unix,
            ticker: ticker.to_string(),
            price: point.close,
            stock_change: Some(percent_change(
                point.close,
                points[i + FORWARD_HORIZON].close,
            )),
            index_level: Some(index_level),
            index_change: Some(index_change),
            features,
        });
        i += SNAPSHOT_STRIDE;
    }
    rows
}

/// The most recent snapshot of one ticker, with empty realized-change
/// columns.
fn forward_snapshot(ticker: &str, series: &PriceSeries, index: &IndexSeries) -> Option<SnapshotRow> {
    let points = &series.points;
    let i = points.len() - 1;
    let point = points[i];
    let features = features_at(points, i)?;

    Some(SnapshotRow {
        date: point.date,
        unix: point.unix,
        ticker: ticker.to_string(),
        price: point.close,
        stock_change: None,
        index_level: index.level(point.date),
        index_change: None,
        features,
    })
}

fn write_rows(path: &Path, index_column: &str, rows: &[SnapshotRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    let mut header = vec![
        "Date".to_string(),
        "Unix".to_string(),
        "Ticker".to_string(),
        "Price".to_string(),
        "stock_p_change".to_string(),
        index_column.to_string(),
        format!("{}_p_change", index_column),
    ];
    header.extend(FEATURE_COLUMNS.iter().map(|name| name.to_string()));
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![
            row.date.to_string(),
            row.unix.to_string(),
            row.ticker.clone(),
            format!("{:.4}", row.price),
            optional_cell(row.stock_change),
            optional_cell(row.index_level),
            optional_cell(row.index_change),
        ];
        record.extend(row.features.iter().map(|value| format!("{:.6}", value)));
        writer.write_record(&record)?;
    }

    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn optional_cell(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{:.4}", value),
        None => String::new(),
    }
}
