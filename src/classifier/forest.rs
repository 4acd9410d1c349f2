use anyhow::{anyhow, Result};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;

use super::tree::{ClassificationTree, TreeParams};

/// Hyperparameters of the ensemble. Defaults mirror a stock 100-tree
/// classifier with a fixed seed.
#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; sqrt of the feature count when unset.
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: None,
            seed: 0,
        }
    }
}

/// A bagged ensemble of classification trees.
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<ClassificationTree>,
    importances: Vec<f64>,
    n_features: usize,
}

impl RandomForest {
    /// Fit the forest: each tree is trained on a seeded bootstrap sample with
    /// sqrt-feature subsampling, in parallel.
    pub fn fit(params: ForestParams, features: &[Vec<f64>], labels: &[bool]) -> Result<Self> {
        if features.is_empty() {
            return Err(anyhow!("cannot fit a forest on an empty dataset"));
        }
        if features.len() != labels.len() {
            return Err(anyhow!(
                "feature rows ({}) and labels ({}) differ in length",
                features.len(),
                labels.len()
            ));
        }
        let n_features = features[0].len();
        if n_features == 0 {
            return Err(anyhow!("cannot fit a forest without feature columns"));
        }
        if let Some(row) = features.iter().find(|row| row.len() != n_features) {
            return Err(anyhow!(
                "ragged feature matrix: expected {} columns, found a row with {}",
                n_features,
                row.len()
            ));
        }

        let max_features = params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().ceil() as usize)
            .clamp(1, n_features);

        let trees: Vec<ClassificationTree> = (0..params.n_trees)
            .into_par_iter()
            .map(|i| {
                let tree_seed = params.seed.wrapping_add(i as u64);
                let tree_params = TreeParams {
                    max_depth: params.max_depth,
                    min_samples_split: params.min_samples_split,
                    min_samples_leaf: params.min_samples_leaf,
                    max_features: Some(max_features),
                    seed: tree_seed,
                };

                let sample = bootstrap_indices(features.len(), tree_seed);
                let sample_features: Vec<Vec<f64>> =
                    sample.iter().map(|&idx| features[idx].clone()).collect();
                let sample_labels: Vec<bool> = sample.iter().map(|&idx| labels[idx]).collect();
                ClassificationTree::fit(tree_params, &sample_features, &sample_labels)
            })
            .collect();

        let mut importances = vec![0.0; n_features];
        for tree in &trees {
            for (slot, value) in importances.iter_mut().zip(tree.importances()) {
                *slot += value;
            }
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for value in &mut importances {
                *value /= total;
            }
        }

        Ok(Self {
            trees,
            importances,
            n_features,
        })
    }

    /// Fraction of trees voting for the positive class.
    pub fn positive_probability(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let votes = self.trees.iter().filter(|tree| tree.predict(row)).count();
        votes as f64 / self.trees.len() as f64
    }

    /// Positive-class probabilities for a batch of rows.
    pub fn positive_probabilities(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.par_iter()
            .map(|row| self.positive_probability(row))
            .collect()
    }

    /// Normalized per-feature importances (sums to 1 when non-degenerate).
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

fn bootstrap_indices(n: usize, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(0..n)).collect()
}

/// One feature with its importance score, as reported by the API.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Pair importances with feature names positionally and sort descending.
pub fn ranked_feature_importances(
    model: &RandomForest,
    feature_names: &[String],
) -> Vec<FeatureImportance> {
    let mut ranked: Vec<FeatureImportance> = feature_names
        .iter()
        .zip(model.feature_importances())
        .map(|(name, &importance)| FeatureImportance {
            feature: name.clone(),
            importance,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable_data() -> (Vec<Vec<f64>>, Vec<bool>) {
        let features: Vec<Vec<f64>> = (0..200)
            .map(|i| vec![i as f64 / 20.0, ((i * 7) % 13) as f64])
            .collect();
        let labels: Vec<bool> = (0..200).map(|i| i as f64 / 20.0 > 5.0).collect();
        (features, labels)
    }

    #[test]
    fn classifies_separable_data() {
        let (features, labels) = separable_data();
        let params = ForestParams {
            n_trees: 25,
            max_depth: 5,
            ..Default::default()
        };
        let forest = RandomForest::fit(params, &features, &labels).expect("fit");

        let probabilities = forest.positive_probabilities(&features);
        let correct = probabilities
            .iter()
            .zip(labels.iter())
            .filter(|(&p, &label)| (p > 0.5) == label)
            .count();
        assert!(correct as f64 / labels.len() as f64 > 0.95);
    }

    #[test]
    fn fit_is_deterministic_for_a_fixed_seed() {
        let (features, labels) = separable_data();
        let params = ForestParams {
            n_trees: 10,
            ..Default::default()
        };
        let first = RandomForest::fit(params, &features, &labels).expect("fit");
        let second = RandomForest::fit(params, &features, &labels).expect("fit");
        assert_eq!(
            first.positive_probabilities(&features),
            second.positive_probabilities(&features)
        );
        assert_eq!(first.feature_importances(), second.feature_importances());
    }

    #[test]
    fn importances_are_normalized_and_ranked() {
        let (features, labels) = separable_data();
        let params = ForestParams {
            n_trees: 10,
            ..Default::default()
        };
        let forest = RandomForest::fit(params, &features, &labels).expect("fit");

        let total: f64 = forest.feature_importances().iter().sum();
        assert!((total - 1.0).abs() < 1e-9);

        let names = vec!["signal".to_string(), "noise".to_string()];
        let ranked = ranked_feature_importances(&forest, &names);
        assert_eq!(ranked[0].feature, "signal");
        assert!(ranked[0].importance >= ranked[1].importance);
    }

    #[test]
    fn rejects_empty_and_ragged_input() {
        assert!(RandomForest::fit(ForestParams::default(), &[], &[]).is_err());

        let ragged = vec![vec![1.0, 2.0], vec![3.0]];
        let labels = vec![true, false];
        assert!(RandomForest::fit(ForestParams::default(), &ragged, &labels).is_err());
    }
}
