use anyhow::Result;
use log::info;

use crate::context::AppContext;
use crate::predictor;

pub async fn run(app: &AppContext) -> Result<()> {
    info!("Scoring the forward sample");
    let model = app.model()?;
    let forward = app.forward_sample()?;
    let report = predictor::predict(model, &forward, app.config().probability_cutoff)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
