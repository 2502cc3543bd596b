use anyhow::{Context, Result};
use arb_core::{connect, BotConfig, Engine, PairRegistry};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command line arguments for arb-bot.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the bot configuration YAML
    #[arg(long, default_value = "config/default.yml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let bot_cfg = BotConfig::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config))?;
    bot_cfg.validate()?;
    info!(
        symbols = ?bot_cfg.symbols,
        min_profit_pct = %bot_cfg.min_profit_pct,
        predictor = bot_cfg.predictor.enabled,
        "Configuration loaded"
    );

    let venues = connect(&bot_cfg)?;
    let registry = PairRegistry::bootstrap(&venues, &bot_cfg.symbols)
        .await
        .context("pair registry bootstrap failed")?;
    info!(pairs = registry.pairs().len(), "Pair registry ready");

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let engine = Engine::new(&bot_cfg, venues, registry, shutdown_rx)?;

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, finishing the current cycle"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
        shutdown_tx.send(()).await.ok();
    });

    let ledger = engine.run().await?;
    for row in ledger.report() {
        info!(
            asset = %row.asset,
            venue_a = %row.balance_a,
            venue_b = %row.balance_b,
            change_pct = ?row.change_pct,
            "Final portfolio"
        );
    }
    Ok(())
}
