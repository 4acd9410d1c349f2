use log::info;
use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::classifier::RandomForest;
use crate::config::AppConfig;
use crate::dataset::{self, ForwardData, TrainingData};
use crate::error::{ApiError, ApiResult};
use crate::labels::outperformance_labels;

/// Shared application state. The historical dataset and the model trained on
/// it are loaded once and cached for the lifetime of the process; the forward
/// sample is re-read on every prediction so a fresh fetch is picked up
/// without a restart.
#[derive(Clone)]
pub struct AppContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    config: AppConfig,
    dataset: OnceCell<TrainingData>,
    model: OnceCell<RandomForest>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                config,
                dataset: OnceCell::new(),
                model: OnceCell::new(),
            }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// The historical dataset, loaded on first use.
    pub fn dataset(&self) -> ApiResult<&TrainingData> {
        self.inner.dataset.get_or_try_init(|| {
            let config = &self.inner.config;
            let data = dataset::load_keystats(
                &config.keystats_path,
                config.index_column.as_deref(),
            )?;
            Ok(data)
        })
    }

    /// The forest trained on the full historical dataset, fit on first use.
    pub fn model(&self) -> ApiResult<&RandomForest> {
        self.inner.model.get_or_try_init(|| {
            let config = &self.inner.config;
            let data = self.dataset()?;
            let labels = outperformance_labels(
                &data.stock_changes(),
                &data.index_changes(),
                config.outperformance_threshold,
            );
            let model = RandomForest::fit(config.forest, &data.feature_matrix(), &labels)
                .map_err(|error| ApiError::ModelNotTrained(error.to_string()))?;
            info!(
                "Trained forest: {} trees over {} rows and {} features",
                model.n_trees(),
                data.n_samples(),
                data.n_features()
            );
            Ok(model)
        })
    }

    /// The forward sample, read fresh on every call.
    pub fn forward_sample(&self) -> ApiResult<ForwardData> {
        let config = &self.inner.config;
        let data = dataset::load_forward_sample(
            &config.forward_sample_path,
            config.index_column.as_deref(),
        )?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    const HEADER: &str =
        "Date,Unix,Ticker,Price,stock_p_change,SP500,SP500_p_change,Trailing P/E\n";

    fn write_keystats(dir: &std::path::Path, rows: usize) -> PathBuf {
        let path = dir.join("keystats.csv");
        let mut file = std::fs::File::create(&path).expect("create csv");
        file.write_all(HEADER.as_bytes()).expect("header");
        for i in 0..rows {
            let signal = i as f64 * 20.0 / rows as f64;
            writeln!(
                file,
                "2020-01-02,1577923200,T{i},100.0,{signal},3200.0,0.0,{signal}"
            )
            .expect("row");
        }
        path
    }

    #[test]
    fn dataset_and_model_are_cached_after_first_use() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            keystats_path: write_keystats(dir.path(), 100),
            ..Default::default()
        };
        let ctx = AppContext::new(config);

        let first = ctx.dataset().expect("dataset") as *const TrainingData;
        let second = ctx.dataset().expect("dataset") as *const TrainingData;
        assert_eq!(first, second);

        let model_a = ctx.model().expect("model") as *const RandomForest;
        let model_b = ctx.model().expect("model") as *const RandomForest;
        assert_eq!(model_a, model_b);
    }

    #[test]
    fn missing_keystats_surfaces_data_unavailable() {
        let config = AppConfig {
            keystats_path: PathBuf::from("no-such-keystats.csv"),
            ..Default::default()
        };
        let ctx = AppContext::new(config);
        let error = ctx.dataset().expect_err("should fail");
        assert!(matches!(error, ApiError::DataUnavailable(_)));
    }

    #[test]
    fn missing_forward_sample_surfaces_data_unavailable() {
        let config = AppConfig {
            forward_sample_path: PathBuf::from("no-such-forward.csv"),
            ..Default::default()
        };
        let ctx = AppContext::new(config);
        let error = ctx.forward_sample().expect_err("should fail");
        assert!(matches!(error, ApiError::DataUnavailable(_)));
    }
}
