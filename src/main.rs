use alphascreen::commands::{backtest, fetch, predict, serve};
use alphascreen::config::AppConfig;
use alphascreen::context::AppContext;
use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "alphascreen")]
#[command(about = "Trains a random forest on stock fundamentals and serves outperformance predictions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server with the dashboard and JSON API
    Serve,
    /// Evaluate the strategy on a held-out split and print the report
    Backtest,
    /// Score the forward sample and print the predicted outperformers
    Predict,
    /// Fetch price history and rebuild the CSV datasets
    Fetch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()?;
    let app_context = AppContext::new(config);

    match cli.command {
        Commands::Serve => {
            serve::run(&app_context).await?;
        }
        Commands::Backtest => {
            backtest::run(&app_context).await?;
        }
        Commands::Predict => {
            predict::run(&app_context).await?;
        }
        Commands::Fetch => {
            fetch::run(&app_context).await?;
        }
    }

    Ok(())
}
