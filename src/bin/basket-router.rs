//! # Basket Router CLI
//!
//! Operator entry point: validate configuration, preview and execute aging
//! sweeps, reclaim an agent's customers, re-run classification for one
//! customer, or run the aging loop in the foreground.

use anyhow::{bail, Context, Result};
use basket_router::config::ConfigManager;
use basket_router::drivers::{BasketFilter, BasketSelector};
use basket_router::logging::init_structured_logging;
use basket_router::models::{AgentId, BasketId, CustomerId};
use basket_router::router::BasketRouter;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "basket-router")]
#[command(about = "Route customer leads between telesales baskets")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Environment overlay to load (development, test, production)
    #[arg(short, long)]
    environment: Option<String>,

    /// Configuration directory (default: config, or BASKET_ROUTER_CONFIG_DIR)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate configuration and the basket catalog
    ValidateConfig,

    /// Show the moves the next aging sweep of a basket would make
    Preview {
        #[arg(short, long)]
        basket: i32,
    },

    /// Run an aging sweep for one basket, or every aging basket
    Sweep {
        #[arg(short, long)]
        basket: Option<i32>,

        /// Report planned moves without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Release an agent's customers to the linked pool baskets
    Reclaim {
        #[arg(long)]
        operator: i64,

        #[arg(long)]
        agent: i64,

        /// Basket to reclaim from as ID or ID:LIMIT; repeatable. Defaults to
        /// every agent-owned basket
        #[arg(short, long = "basket", value_parser = parse_selector)]
        baskets: Vec<BasketSelector>,
    },

    /// Re-run classification for one customer as a fix-script repair
    Reclassify {
        #[arg(long)]
        operator: i64,

        #[arg(long)]
        customer: i64,

        #[arg(long)]
        note: Option<String>,
    },

    /// Run the periodic aging loop until interrupted
    Run,
}

fn parse_selector(raw: &str) -> std::result::Result<BasketSelector, String> {
    let (basket, limit) = match raw.split_once(':') {
        Some((basket, limit)) => (basket, Some(limit)),
        None => (raw, None),
    };
    let basket = basket
        .trim()
        .parse::<i32>()
        .map_err(|e| format!("invalid basket id '{basket}': {e}"))?;
    let limit = limit
        .map(|limit| {
            limit
                .trim()
                .parse::<usize>()
                .map_err(|e| format!("invalid limit '{limit}': {e}"))
        })
        .transpose()?;
    Ok(BasketSelector {
        basket: BasketId(basket),
        limit,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(cli: &Cli) -> Result<ConfigManager> {
    let manager = match &cli.environment {
        Some(environment) => {
            ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment)
        }
        None => ConfigManager::load_from_directory(cli.config_dir.clone()),
    };
    manager.context("failed to load router configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    init_structured_logging();
    let cli = Cli::parse();
    let manager = load_config(&cli)?;

    if let Commands::ValidateConfig = cli.command {
        println!("Environment: {}", manager.environment());
        println!("Config directory: {}", manager.config_directory().display());
        let catalog = manager.config().catalog()?;
        println!(
            "Baskets: {} ({} with a dwell timeout)",
            catalog.len(),
            catalog.aging_baskets().count()
        );
        print_json(&manager.debug_config())?;
        println!("Configuration is valid");
        return Ok(());
    }

    let router = BasketRouter::connect(manager.into_config())
        .await
        .context("failed to connect basket router")?;
    let operator = router.operator();

    match cli.command {
        Commands::ValidateConfig => {}
        Commands::Preview { basket } => {
            print_json(&operator.preview_aging_transitions(BasketId(basket)).await?)?;
        }
        Commands::Sweep {
            basket: Some(basket),
            dry_run,
        } => {
            let report = router.aging().sweep_basket(BasketId(basket), dry_run).await?;
            print_json(&report)?;
        }
        Commands::Sweep {
            basket: None,
            dry_run,
        } => {
            print_json(&router.aging().sweep_all(dry_run).await)?;
        }
        Commands::Reclaim {
            operator: operator_id,
            agent,
            baskets,
        } => {
            let filter = if baskets.is_empty() {
                BasketFilter::AllAgentOwned
            } else {
                BasketFilter::Baskets(baskets)
            };
            let report = operator
                .reclaim_customers(AgentId(operator_id), AgentId(agent), filter)
                .await?;
            print_json(&report)?;
            if !report.failures.is_empty() {
                bail!("{} customers could not be reclaimed", report.failures.len());
            }
            if report.failed_baskets() > 0 {
                bail!("{} baskets could not be read", report.failed_baskets());
            }
        }
        Commands::Reclassify {
            operator: operator_id,
            customer,
            note,
        } => {
            let outcome = operator
                .reclassify_customer(AgentId(operator_id), CustomerId(customer), note)
                .await?;
            print_json(&outcome)?;
        }
        Commands::Run => {
            let aging = router.spawn_aging();
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
            router.shutdown();
            aging.await.context("aging loop panicked")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selector_with_and_without_limit() {
        assert_eq!(parse_selector("38").unwrap(), BasketSelector::all(BasketId(38)));
        assert_eq!(
            parse_selector("39:25").unwrap(),
            BasketSelector::limited(BasketId(39), 25)
        );
        assert!(parse_selector("x:1").is_err());
        assert!(parse_selector("39:-1").is_err());
    }
}
