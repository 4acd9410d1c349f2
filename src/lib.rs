pub mod backtest;
pub mod classifier;
pub mod commands;
pub mod config;
pub mod context;
pub mod dataset;
pub mod error;
pub mod labels;
pub mod metrics;
pub mod predictor;
pub mod server;
