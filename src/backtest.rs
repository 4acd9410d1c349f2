use anyhow::{anyhow, Result};
use log::info;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::classifier::{ForestParams, RandomForest};
use crate::config::AppConfig;
use crate::dataset::TrainingData;
use crate::labels::outperformance_labels;
use crate::metrics;

#[derive(Debug, Clone, Copy)]
pub struct BacktestSettings {
    pub test_ratio: f64,
    pub seed: u64,
    pub probability_cutoff: f64,
    pub outperformance_threshold: f64,
    pub forest: ForestParams,
}

impl BacktestSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            test_ratio: config.backtest_test_ratio,
            seed: config.backtest_seed,
            probability_cutoff: config.probability_cutoff,
            outperformance_threshold: config.outperformance_threshold,
            forest: config.forest,
        }
    }
}

/// Summary of one train/test evaluation over the historical dataset.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub accuracy: f64,
    pub precision: f64,
    /// Number of held-out rows predicted positive.
    pub total_trades: usize,
    pub avg_stock_return: f64,
    pub avg_market_return: f64,
    pub outperformance: f64,
}

/// Split the dataset, fit a fresh forest on the training side, and score the
/// held-out side. The cached model is never touched; the split and the fit
/// are fully deterministic for a fixed seed.
pub fn run(data: &TrainingData, settings: &BacktestSettings) -> Result<BacktestReport> {
    let n = data.n_samples();
    if n < 2 {
        return Err(anyhow!(
            "backtest needs at least 2 training rows, found {}",
            n
        ));
    }

    let labels = outperformance_labels(
        &data.stock_changes(),
        &data.index_changes(),
        settings.outperformance_threshold,
    );
    let (train_indices, test_indices) = split_indices(n, settings.test_ratio, settings.seed);

    let train_features: Vec<Vec<f64>> = train_indices
        .iter()
        .map(|&i| data.rows[i].features.clone())
        .collect();
    let train_labels: Vec<bool> = train_indices.iter().map(|&i| labels[i]).collect();
    let model = RandomForest::fit(settings.forest, &train_features, &train_labels)?;

    let test_features: Vec<Vec<f64>> = test_indices
        .iter()
        .map(|&i| data.rows[i].features.clone())
        .collect();
    let probabilities = model.positive_probabilities(&test_features);
    let predicted: Vec<bool> = probabilities
        .iter()
        .map(|&p| p > settings.probability_cutoff)
        .collect();
    let actual: Vec<bool> = test_indices.iter().map(|&i| labels[i]).collect();

    let accuracy = metrics::accuracy(&predicted, &actual);
    let precision = metrics::precision(&predicted, &actual);

    // Aggregate realized returns over positive-predicted rows as growth
    // factors, then convert back to percentages.
    let mut stock_growth = Vec::new();
    let mut market_growth = Vec::new();
    for (slot, &test_idx) in predicted.iter().zip(test_indices.iter()) {
        if *slot {
            let row = &data.rows[test_idx];
            stock_growth.push(row.stock_change / 100.0 + 1.0);
            market_growth.push(row.index_change / 100.0 + 1.0);
        }
    }

    let total_trades = stock_growth.len();
    let (avg_stock_return, avg_market_return) = if total_trades > 0 {
        (
            (stock_growth.clone().mean() - 1.0) * 100.0,
            (market_growth.clone().mean() - 1.0) * 100.0,
        )
    } else {
        (0.0, 0.0)
    };

    info!(
        "Backtest over {} held-out rows: accuracy={:.4} precision={:.4} trades={}",
        test_indices.len(),
        accuracy,
        precision,
        total_trades
    );

    Ok(BacktestReport {
        accuracy,
        precision,
        total_trades,
        avg_stock_return,
        avg_market_return,
        outperformance: avg_stock_return - avg_market_return,
    })
}

/// Deterministic shuffled split; the first `test_ratio` share of the shuffled
/// order becomes the held-out set. Both sides are kept non-empty.
pub fn split_indices(n: usize, test_ratio: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);

    let test_size = ((test_ratio * n as f64) as usize).clamp(1, n.saturating_sub(1).max(1));
    let (test, train) = indices.split_at(test_size);
    (train.to_vec(), test.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::TrainingRow;
    use chrono::NaiveDate;

    fn synthetic_data(n: usize) -> TrainingData {
        // Stock change tracks the single feature; the index is flat, so the
        // label boundary is exactly feature > 10 for a 10-point threshold.
        let rows: Vec<TrainingRow> = (0..n)
            .map(|i| {
                let signal = i as f64 * 20.0 / n as f64;
                TrainingRow {
                    date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                    ticker: format!("T{i}"),
                    stock_change: signal,
                    index_change: 0.0,
                    features: vec![signal, (i % 7) as f64],
                }
            })
            .collect();

        TrainingData {
            index_column: "SP500".to_string(),
            feature_names: vec!["signal".to_string(), "noise".to_string()],
            rows,
        }
    }

    fn settings() -> BacktestSettings {
        BacktestSettings {
            test_ratio: 0.2,
            seed: 42,
            probability_cutoff: 0.5,
            outperformance_threshold: 10.0,
            forest: ForestParams {
                n_trees: 25,
                max_depth: 5,
                ..Default::default()
            },
        }
    }

    #[test]
    fn split_is_deterministic_and_disjoint() {
        let (train_a, test_a) = split_indices(100, 0.2, 42);
        let (train_b, test_b) = split_indices(100, 0.2, 42);
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
        assert_eq!(test_a.len(), 20);
        assert_eq!(train_a.len(), 80);

        let mut all: Vec<usize> = train_a.iter().chain(test_a.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let data = synthetic_data(100);
        let report = run(&data, &settings()).expect("backtest");
        assert!((0.0..=1.0).contains(&report.accuracy));
        assert!((0.0..=1.0).contains(&report.precision));
    }

    #[test]
    fn separable_data_scores_perfectly() {
        let data = synthetic_data(200);
        let report = run(&data, &settings()).expect("backtest");
        assert!(report.accuracy > 0.95);
        assert!(report.precision > 0.95);
        assert!(report.total_trades > 0);
        // Positive-predicted rows all outperformed the flat index.
        assert!(report.avg_stock_return > 10.0);
        assert_eq!(report.avg_market_return, 0.0);
        assert!((report.outperformance - report.avg_stock_return).abs() < 1e-9);
    }

    #[test]
    fn impossible_cutoff_yields_zero_trades_and_zero_precision() {
        let data = synthetic_data(100);
        let mut strict = settings();
        strict.probability_cutoff = 1.0;
        let report = run(&data, &strict).expect("backtest");
        assert_eq!(report.total_trades, 0);
        assert_eq!(report.precision, 0.0);
        assert_eq!(report.avg_stock_return, 0.0);
        assert_eq!(report.avg_market_return, 0.0);
        assert_eq!(report.outperformance, 0.0);
    }

    #[test]
    fn rejects_datasets_too_small_to_split() {
        let data = synthetic_data(1);
        assert!(run(&data, &settings()).is_err());
    }
}
