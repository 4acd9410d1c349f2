pub mod backtest;
pub mod fetch;
pub mod predict;
pub mod serve;
