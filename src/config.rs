use anyhow::{anyhow, Result};
use std::path::PathBuf;

use crate::classifier::ForestParams;

pub const DEFAULT_KEYSTATS_FILE: &str = "keystats.csv";
pub const DEFAULT_FORWARD_SAMPLE_FILE: &str = "forward_sample.csv";

const DEFAULT_FETCH_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const DEFAULT_FETCH_TICKERS: &str = "AAPL,MSFT,AMZN,GOOGL,META,NVDA,JPM,JNJ,V,PG,XOM,UNH,HD,MA,KO";

/// Runtime configuration shared by the server and the CLI commands.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub keystats_path: PathBuf,
    pub forward_sample_path: PathBuf,
    /// Percentage points of outperformance over the index required for a
    /// positive training label.
    pub outperformance_threshold: f64,
    /// Positive-class probability a row must exceed to count as predicted.
    pub probability_cutoff: f64,
    /// Override for the index column name; auto-detected from the CSV header
    /// when unset.
    pub index_column: Option<String>,
    pub backtest_test_ratio: f64,
    pub backtest_seed: u64,
    pub forest: ForestParams,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            keystats_path: PathBuf::from(DEFAULT_KEYSTATS_FILE),
            forward_sample_path: PathBuf::from(DEFAULT_FORWARD_SAMPLE_FILE),
            outperformance_threshold: 10.0,
            probability_cutoff: 0.5,
            index_column: None,
            backtest_test_ratio: 0.2,
            backtest_seed: 42,
            forest: ForestParams::default(),
        }
    }
}

impl AppConfig {
    /// Build the configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let mut forest = defaults.forest;
        forest.n_trees = env_usize("FOREST_TREES", forest.n_trees, 1)?;
        forest.max_depth = env_usize("FOREST_MAX_DEPTH", forest.max_depth, 1)?;
        forest.seed = env_u64("FOREST_SEED", forest.seed)?;

        Ok(Self {
            keystats_path: env_path("KEYSTATS_PATH", &defaults.keystats_path),
            forward_sample_path: env_path("FORWARD_SAMPLE_PATH", &defaults.forward_sample_path),
            outperformance_threshold: env_f64(
                "OUTPERFORMANCE_THRESHOLD",
                defaults.outperformance_threshold,
                None,
                None,
            )?,
            probability_cutoff: env_f64(
                "PREDICTION_PROBABILITY_CUTOFF",
                defaults.probability_cutoff,
                Some(0.0),
                Some(1.0),
            )?,
            index_column: env_raw("MARKET_INDEX_COLUMN"),
            backtest_test_ratio: env_f64(
                "BACKTEST_TEST_RATIO",
                defaults.backtest_test_ratio,
                Some(0.0),
                Some(1.0),
            )?,
            backtest_seed: env_u64("BACKTEST_SEED", defaults.backtest_seed)?,
            forest,
        })
    }
}

/// Settings of the one-off data fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Base URL of the chart endpoint; overridable for tests.
    pub base_url: String,
    pub tickers: Vec<String>,
    /// Symbol fetched for the market index series.
    pub index_symbol: String,
    /// Column name the index series is written under.
    pub index_column: String,
    /// History window requested per symbol.
    pub range: String,
    /// Pause between requests, in milliseconds.
    pub delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_FETCH_BASE_URL.to_string(),
            tickers: DEFAULT_FETCH_TICKERS
                .split(',')
                .map(|ticker| ticker.to_string())
                .collect(),
            index_symbol: "^GSPC".to_string(),
            index_column: "SP500".to_string(),
            range: "10y".to_string(),
            delay_ms: 250,
        }
    }
}

impl FetchConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let tickers = match env_raw("FETCH_TICKERS") {
            Some(raw) => {
                let parsed: Vec<String> = raw
                    .split(',')
                    .map(|ticker| ticker.trim().to_string())
                    .filter(|ticker| !ticker.is_empty())
                    .collect();
                if parsed.is_empty() {
                    return Err(anyhow!("Setting FETCH_TICKERS must list at least one symbol"));
                }
                parsed
            }
            None => defaults.tickers,
        };

        Ok(Self {
            base_url: env_raw("FETCH_BASE_URL").unwrap_or(defaults.base_url),
            tickers,
            index_symbol: env_raw("FETCH_INDEX_SYMBOL").unwrap_or(defaults.index_symbol),
            index_column: env_raw("FETCH_INDEX_COLUMN").unwrap_or(defaults.index_column),
            range: env_raw("FETCH_RANGE").unwrap_or(defaults.range),
            delay_ms: env_u64("FETCH_DELAY_MS", defaults.delay_ms)?,
        })
    }
}

fn env_path(key: &str, default: &PathBuf) -> PathBuf {
    match env_raw(key) {
        Some(value) => PathBuf::from(value),
        None => default.clone(),
    }
}

fn env_f64(key: &str, default: f64, min: Option<f64>, max: Option<f64>) -> Result<f64> {
    let Some(raw) = env_raw(key) else {
        return Ok(default);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if let Some(min_value) = min {
        if value < min_value {
            return Err(anyhow!(
                "Setting {} must be >= {} (value: {})",
                key,
                min_value,
                raw
            ));
        }
    }
    if let Some(max_value) = max {
        if value > max_value {
            return Err(anyhow!(
                "Setting {} must be <= {} (value: {})",
                key,
                max_value,
                raw
            ));
        }
    }
    Ok(value)
}

fn env_usize(key: &str, default: usize, min: usize) -> Result<usize> {
    let Some(raw) = env_raw(key) else {
        return Ok(default);
    };
    let value = raw
        .parse::<usize>()
        .map_err(|_| anyhow!("Setting {} must be an integer (value: {})", key, raw))?;
    if value < min {
        return Err(anyhow!(
            "Setting {} must be >= {} (value: {})",
            key,
            min,
            raw
        ));
    }
    Ok(value)
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    let Some(raw) = env_raw(key) else {
        return Ok(default);
    };
    raw.parse::<u64>()
        .map_err(|_| anyhow!("Setting {} must be an integer (value: {})", key, raw))
}

fn env_raw(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
