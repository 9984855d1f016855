//! # CLI Interface
//!
//! Command-line arguments for `elastic-stress`, parsed with `clap` derive.
//! Every connection setting can also come from the environment (or a `.env`
//! file loaded before parsing).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use elastic_harness::config::{
    AddressBook, Credential, DriverConfig, HarnessConfig, Network, RatePolicy, SigningMode,
    DEFAULT_RPC_URL, DEFAULT_TOKEN,
};

/// Randomized stress test for a deployed elastic supply token.
///
/// Resolves TOKEN from the build artifacts, prepares the operating account,
/// then performs random deposits, withdrawals, swaps and rebases until the
/// iteration budget runs out.
#[derive(Parser, Debug)]
#[command(name = "elastic-stress", version)]
pub struct StressCli {
    /// Contract name of the token to fuzz, as found in the build artifacts.
    #[arg(default_value = DEFAULT_TOKEN)]
    pub token: String,

    /// Target network: mainnet, ropsten, rinkeby, kovan, goerli or development.
    #[arg(long, env = "NETWORK", default_value = "development")]
    pub network: String,

    /// Hex-encoded private key of the operating account.
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// JSON-RPC endpoint of the target network.
    #[arg(long, env = "RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// Hand the key to the node and let it sign (development nodes only).
    #[arg(long)]
    pub node_signing: bool,

    /// Directory holding the deployment build artifacts.
    #[arg(long, env = "ARTIFACTS_DIR", default_value = "build/contracts")]
    pub artifacts_dir: PathBuf,

    /// Number of fuzz loop iterations.
    #[arg(long, default_value_t = 1000)]
    pub iterations: u64,

    /// Seconds to sleep between iterations.
    #[arg(long, default_value_t = 5)]
    pub delay_secs: u64,

    /// Upper bound (exclusive) of simulated seconds skipped per iteration.
    #[arg(long, default_value_t = 86_400)]
    pub max_time_advance_secs: u64,

    /// Seed for a reproducible action sequence.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Skip approvals, faucet mints and rebase configuration.
    #[arg(long)]
    pub skip_setup: bool,

    /// Retries for exchange-rate reads that fail without reverting.
    #[arg(long, default_value_t = 0)]
    pub rate_retries: u32,

    /// Log format: "pretty" or "json".
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

impl StressCli {
    /// Assembles the harness configuration. Every failure here is fatal.
    pub fn to_config(&self) -> Result<HarnessConfig> {
        let network: Network = self.network.parse()?;
        let credential = Credential::require(self.private_key.as_deref())?;
        let contracts = AddressBook::from_artifacts(&self.artifacts_dir, network)
            .with_context(|| {
                format!(
                    "failed to load address book from {}",
                    self.artifacts_dir.display()
                )
            })?;
        let mut config = HarnessConfig::new(network, &self.rpc_url, credential, contracts);
        config.token = self.token.clone();
        if self.node_signing {
            config.signing = SigningMode::Node;
        }
        config.driver = DriverConfig {
            max_iterations: self.iterations,
            iteration_delay: Duration::from_secs(self.delay_secs),
            max_time_advance: Duration::from_secs(self.max_time_advance_secs),
            seed: self.seed,
        };
        config.setup.enabled = !self.skip_setup;
        config.rate_policy = RatePolicy {
            retries: self.rate_retries,
        };
        Ok(config)
    }
}
