use anyhow::Result;
use log::info;

use crate::backtest::{self, BacktestSettings};
use crate::context::AppContext;

pub async fn run(app: &AppContext) -> Result<()> {
    info!("Running backtest over the historical dataset");
    let data = app.dataset()?;
    let settings = BacktestSettings::from_config(app.config());
    let report = backtest::run(data, &settings)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
