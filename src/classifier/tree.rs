use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Parameters for a single CART-style classification tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Number of features considered per split; all features when unset.
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: None,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        positive_probability: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A binary classification tree splitting on Gini impurity.
#[derive(Debug, Clone)]
pub struct ClassificationTree {
    root: Node,
    /// Unnormalized importance per feature: impurity decrease weighted by the
    /// number of samples reaching the split.
    importances: Vec<f64>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
    importance: f64,
}

impl ClassificationTree {
    /// Fit a tree on the given rows. `features` is row-major; `labels` must
    /// be the same length.
    pub fn fit(params: TreeParams, features: &[Vec<f64>], labels: &[bool]) -> Self {
        debug_assert_eq!(features.len(), labels.len());
        let n_features = features.first().map(|row| row.len()).unwrap_or(0);
        let mut importances = vec![0.0; n_features];
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);

        let indices: Vec<usize> = (0..features.len()).collect();
        let root = build_node(
            &params,
            features,
            labels,
            &indices,
            0,
            &mut rng,
            &mut importances,
        );

        Self { root, importances }
    }

    /// Probability of the positive class at the leaf this row lands in.
    pub fn positive_probability(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf {
                    positive_probability,
                } => return *positive_probability,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row.get(*feature).copied().unwrap_or(f64::NAN) <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    /// Hard class vote for this row.
    pub fn predict(&self, row: &[f64]) -> bool {
        self.positive_probability(row) > 0.5
    }

    pub fn importances(&self) -> &[f64] {
        &self.importances
    }
}

fn build_node(
    params: &TreeParams,
    features: &[Vec<f64>],
    labels: &[bool],
    indices: &[usize],
    depth: usize,
    rng: &mut ChaCha8Rng,
    importances: &mut [f64],
) -> Node {
    let impurity = gini(labels, indices);
    if depth >= params.max_depth || indices.len() < params.min_samples_split || impurity < 1e-10 {
        return leaf(labels, indices);
    }

    let Some(split) = best_split(params, features, labels, indices, impurity, rng) else {
        return leaf(labels, indices);
    };

    if split.left.len() < params.min_samples_leaf || split.right.len() < params.min_samples_leaf {
        return leaf(labels, indices);
    }

    importances[split.feature] += split.importance;
    let left = build_node(
        params,
        features,
        labels,
        &split.left,
        depth + 1,
        rng,
        importances,
    );
    let right = build_node(
        params,
        features,
        labels,
        &split.right,
        depth + 1,
        rng,
        importances,
    );

    Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn best_split(
    params: &TreeParams,
    features: &[Vec<f64>],
    labels: &[bool],
    indices: &[usize],
    parent_impurity: f64,
    rng: &mut ChaCha8Rng,
) -> Option<SplitCandidate> {
    let n_features = features.first().map(|row| row.len()).unwrap_or(0);
    let considered = params.max_features.unwrap_or(n_features).min(n_features);

    let mut candidates: Vec<usize> = (0..n_features).collect();
    candidates.shuffle(rng);
    candidates.truncate(considered);

    let mut best_gain = 0.0;
    let mut best: Option<SplitCandidate> = None;

    for feature in candidates {
        let mut values: Vec<f64> = indices.iter().map(|&i| features[i][feature]).collect();
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();

        for window in values.windows(2) {
            let threshold = (window[0] + window[1]) / 2.0;
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| features[i][feature] <= threshold);
            if left.is_empty() || right.is_empty() {
                continue;
            }

            let n_left = left.len() as f64;
            let n_right = right.len() as f64;
            let weighted = (n_left * gini(labels, &left) + n_right * gini(labels, &right))
                / (n_left + n_right);
            let gain = parent_impurity - weighted;

            if gain > best_gain {
                best_gain = gain;
                let importance = gain * indices.len() as f64;
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    left,
                    right,
                    importance,
                });
            }
        }
    }

    best
}

fn leaf(labels: &[bool], indices: &[usize]) -> Node {
    Node::Leaf {
        positive_probability: positive_ratio(labels, indices),
    }
}

fn positive_ratio(labels: &[bool], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.5;
    }
    let positive = indices.iter().filter(|&&i| labels[i]).count();
    positive as f64 / indices.len() as f64
}

fn gini(labels: &[bool], indices: &[usize]) -> f64 {
    let p = positive_ratio(labels, indices);
    2.0 * p * (1.0 - p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable_data() -> (Vec<Vec<f64>>, Vec<bool>) {
        let features: Vec<Vec<f64>> = (0..100).map(|i| vec![i as f64 / 10.0]).collect();
        let labels: Vec<bool> = (0..100).map(|i| i as f64 / 10.0 > 5.0).collect();
        (features, labels)
    }

    #[test]
    fn learns_a_separable_boundary() {
        let (features, labels) = separable_data();
        let tree = ClassificationTree::fit(TreeParams::default(), &features, &labels);

        let correct = features
            .iter()
            .zip(labels.iter())
            .filter(|(row, &label)| tree.predict(row) == label)
            .count();
        assert!(correct as f64 / labels.len() as f64 > 0.95);
    }

    #[test]
    fn importance_lands_on_the_informative_feature() {
        let features: Vec<Vec<f64>> = (0..100)
            .map(|i| vec![1.0, i as f64 / 10.0, (i % 3) as f64])
            .collect();
        let labels: Vec<bool> = (0..100).map(|i| i as f64 / 10.0 > 5.0).collect();

        let tree = ClassificationTree::fit(TreeParams::default(), &features, &labels);
        let importances = tree.importances();
        assert!(importances[1] > importances[0]);
        assert!(importances[1] > importances[2]);
    }

    #[test]
    fn pure_node_becomes_a_leaf() {
        let features = vec![vec![1.0], vec![2.0], vec![3.0]];
        let labels = vec![true, true, true];
        let tree = ClassificationTree::fit(TreeParams::default(), &features, &labels);
        assert!(tree.predict(&[10.0]));
        assert_eq!(tree.positive_probability(&[10.0]), 1.0);
    }
}
