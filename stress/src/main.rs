// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Elastic Stress
//!
//! Entry point for the `elastic-stress` binary. Loads `.env`, parses the CLI,
//! initializes logging, connects to the node and runs the fuzz driver against
//! the requested token.
//!
//! Exits 0 when the run completes (or the token has nothing to fuzz) and 1
//! with the full error chain on any setup failure.

mod cli;
mod logging;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use elastic_harness::chain::RpcChain;
use elastic_harness::config::EXCHANGE_CONTRACT;
use elastic_harness::exchange::Exchange;
use elastic_harness::fuzz::needs_exchange;
use elastic_harness::metrics::DriverMetrics;
use elastic_harness::{Driver, Token};

use cli::StressCli;
use logging::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = StressCli::parse();

    logging::init_logging(
        "elastic_stress=info,elastic_harness=info",
        LogFormat::from_str_lossy(&cli.log_format),
    );

    let config = cli.to_config()?;
    let token_address = config.contracts.resolve(&config.token)?;

    tracing::info!(
        network = %config.network,
        rpc_url = %config.rpc_url,
        token = %config.token,
        signing = ?config.signing,
        "starting elastic-stress"
    );

    let chain = Arc::new(
        RpcChain::connect(
            &config.rpc_url,
            &config.credential,
            config.signing,
            config.polling,
        )
        .await
        .with_context(|| format!("failed to set up operating account at {}", config.rpc_url))?,
    );

    let token = Token::resolve(chain.clone(), token_address, config.rate_policy)
        .await
        .with_context(|| format!("failed to resolve token {} at {}", config.token, token_address))?;
    let exchange = if needs_exchange(&token, &config.setup) {
        let address = config.contracts.resolve(EXCHANGE_CONTRACT)?;
        Some(Exchange::new(chain.clone(), address))
    } else {
        tracing::info!("exchange not needed for this run");
        None
    };
    let metrics = DriverMetrics::new().context("failed to create metrics registry")?;

    let mut driver = Driver::new(&config, token, exchange, metrics);
    if config.network.has_simulated_clock() {
        driver = driver.with_clock(chain);
    }

    let report = driver.run().await?;
    tracing::info!(%report, "run finished");

    let exposition = driver
        .metrics()
        .encode()
        .context("failed to encode metrics")?;
    print!("{exposition}");
    Ok(())
}
