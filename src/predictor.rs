use log::info;
use serde::Serialize;

use crate::classifier::RandomForest;
use crate::dataset::{DatasetError, ForwardData};

/// One stock the model expects to outperform the index, with the forest's
/// confidence.
#[derive(Debug, Clone, Serialize)]
pub struct RankedPrediction {
    pub ticker: String,
    pub probability: f64,
}

/// Output of a prediction pass over the forward sample.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionReport {
    /// Number of stocks predicted to outperform.
    pub total_stocks: usize,
    /// Their tickers, most confident first.
    pub predicted_stocks: Vec<String>,
    pub detailed_predictions: Vec<RankedPrediction>,
}

/// Score the forward sample and keep the rows whose positive probability
/// clears the cutoff, sorted most confident first.
pub fn predict(
    model: &RandomForest,
    forward: &ForwardData,
    probability_cutoff: f64,
) -> Result<PredictionReport, DatasetError> {
    if forward.feature_names.len() != model.n_features() {
        return Err(DatasetError::Schema(format!(
            "forward sample has {} feature columns but the model was trained on {}",
            forward.feature_names.len(),
            model.n_features()
        )));
    }

    let features: Vec<Vec<f64>> = forward.rows.iter().map(|row| row.features.clone()).collect();
    let probabilities = model.positive_probabilities(&features);

    let mut detailed: Vec<RankedPrediction> = forward
        .rows
        .iter()
        .zip(probabilities.iter())
        .filter(|(_, &p)| p > probability_cutoff)
        .map(|(row, &p)| RankedPrediction {
            ticker: row.ticker.clone(),
            probability: p,
        })
        .collect();
    detailed.sort_by(|a, b| b.probability.total_cmp(&a.probability));

    info!(
        "Predicted {} of {} forward stocks above cutoff {}",
        detailed.len(),
        forward.n_samples(),
        probability_cutoff
    );

    let predicted_stocks: Vec<String> = detailed.iter().map(|p| p.ticker.clone()).collect();
    Ok(PredictionReport {
        total_stocks: predicted_stocks.len(),
        predicted_stocks,
        detailed_predictions: detailed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ForestParams;
    use crate::dataset::ForwardRow;
    use chrono::NaiveDate;

    fn trained_model() -> RandomForest {
        let features: Vec<Vec<f64>> = (0..200).map(|i| vec![i as f64 / 20.0]).collect();
        let labels: Vec<bool> = (0..200).map(|i| i as f64 / 20.0 > 5.0).collect();
        let params = ForestParams {
            n_trees: 25,
            max_depth: 5,
            ..Default::default()
        };
        RandomForest::fit(params, &features, &labels).expect("fit")
    }

    fn forward(rows: Vec<(&str, f64)>) -> ForwardData {
        ForwardData {
            feature_names: vec!["signal".to_string()],
            rows: rows
                .into_iter()
                .map(|(ticker, value)| ForwardRow {
                    date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                    ticker: ticker.to_string(),
                    features: vec![value],
                })
                .collect(),
        }
    }

    #[test]
    fn keeps_only_confident_rows_sorted_descending() {
        let model = trained_model();
        let data = forward(vec![("LOW", 1.0), ("HIGH", 9.0), ("MID", 6.5)]);

        let report = predict(&model, &data, 0.5).expect("predict");
        assert_eq!(report.total_stocks, report.predicted_stocks.len());
        assert_eq!(report.total_stocks, report.detailed_predictions.len());

        let tickers: Vec<&str> = report
            .detailed_predictions
            .iter()
            .map(|p| p.ticker.as_str())
            .collect();
        assert!(tickers.contains(&"HIGH"));
        assert!(!tickers.contains(&"LOW"));
        for pair in report.detailed_predictions.windows(2) {
            assert!(pair[0].probability >= pair[1].probability);
        }
    }

    #[test]
    fn cutoff_of_one_predicts_nothing() {
        let model = trained_model();
        let data = forward(vec![("HIGH", 9.5)]);
        let report = predict(&model, &data, 1.0).expect("predict");
        assert_eq!(report.total_stocks, 0);
        assert!(report.predicted_stocks.is_empty());
        assert!(report.detailed_predictions.is_empty());
    }

    #[test]
    fn feature_count_mismatch_is_a_schema_error() {
        let model = trained_model();
        let data = ForwardData {
            feature_names: vec!["a".to_string(), "b".to_string()],
            rows: vec![],
        };
        let error = predict(&model, &data, 0.5).expect_err("should fail");
        assert!(matches!(error, DatasetError::Schema(_)));
    }
}
