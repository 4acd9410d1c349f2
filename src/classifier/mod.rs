mod forest;
mod tree;

pub use forest::{ranked_feature_importances, FeatureImportance, ForestParams, RandomForest};
pub use tree::{ClassificationTree, TreeParams};
