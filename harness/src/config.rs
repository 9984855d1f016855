//! # Harness Configuration & Constants
//!
//! Every tunable of a stress run lives here, together with the defaults the
//! reference runs used. The binary assembles a [`HarnessConfig`] from CLI
//! flags and environment variables and passes it down explicitly; nothing in
//! the library reads the environment on its own.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Iterations performed by a full run.
pub const DEFAULT_MAX_ITERATIONS: u64 = 1000;

/// Wall-clock pause between iterations, to stay friendly with the endpoint.
pub const DEFAULT_ITERATION_DELAY: Duration = Duration::from_secs(5);

/// Upper bound (exclusive) of the simulated time skipped per iteration.
pub const DEFAULT_MAX_TIME_ADVANCE: Duration = Duration::from_secs(24 * 60 * 60);

/// Endpoint of a local development node.
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545/";

/// Contract name fuzzed when none is given.
pub const DEFAULT_TOKEN: &str = "rAAVE";

/// Contract name of the faucet/exchange collaborator in the address book.
pub const EXCHANGE_CONTRACT: &str = "GUniswapV2Exchange";

/// Decimal width of the native currency.
pub const NATIVE_DECIMALS: u8 = 18;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while assembling a configuration. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No signing key was supplied.
    #[error("unknown private key: set PRIVATE_KEY or pass --private-key")]
    MissingCredential,

    /// The signing key is not 32 bytes of hex.
    #[error("invalid private key: {0}")]
    InvalidCredential(String),

    /// The network name is not in the network table.
    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    /// The address book has no deployment of `name` on `network`.
    #[error("no deployed address for {name} on {network}")]
    UnknownContract {
        /// Contract name as used in the build artifacts.
        name: String,
        /// Network the lookup was made for.
        network: Network,
    },

    /// A build artifact could not be read or parsed.
    #[error("failed to load artifact {path}: {reason}")]
    Artifact {
        /// File that failed.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Target chains the deployment pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Mainnet,
    Ropsten,
    Rinkeby,
    Kovan,
    Goerli,
    /// Local ganache fork of mainnet.
    Development,
}

impl Network {
    /// Every known network, in table order.
    pub const ALL: [Network; 6] = [
        Network::Mainnet,
        Network::Ropsten,
        Network::Rinkeby,
        Network::Kovan,
        Network::Goerli,
        Network::Development,
    ];

    /// Name used on the command line and in `NETWORK`.
    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Ropsten => "ropsten",
            Network::Rinkeby => "rinkeby",
            Network::Kovan => "kovan",
            Network::Goerli => "goerli",
            Network::Development => "development",
        }
    }

    /// Network id the build artifacts are keyed by.
    ///
    /// Development shares mainnet's id because the local node is a mainnet
    /// fork and the pipeline records its deployments under that id.
    pub fn network_id(&self) -> &'static str {
        match self {
            Network::Mainnet => "1",
            Network::Ropsten => "3",
            Network::Rinkeby => "4",
            Network::Kovan => "42",
            Network::Goerli => "5",
            Network::Development => "1",
        }
    }

    /// Whether the node exposes `evm_increaseTime` / `evm_mine`.
    pub fn has_simulated_clock(&self) -> bool {
        matches!(self, Network::Development)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Network::ALL
            .into_iter()
            .find(|n| n.name() == s)
            .ok_or_else(|| ConfigError::UnknownNetwork(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Signing key of the operating account.
///
/// Never printed: the `Debug` impl is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential([u8; 32]);

impl Credential {
    /// Parses a 32-byte hex key, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, ConfigError> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| ConfigError::InvalidCredential(e.to_string()))?;
        let key: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            ConfigError::InvalidCredential(format!("expected 32 bytes, got {}", b.len()))
        })?;
        Ok(Self(key))
    }

    /// Parses an optional key, treating absence as a missing credential.
    pub fn require(s: Option<&str>) -> Result<Self, ConfigError> {
        match s {
            Some(s) if !s.trim().is_empty() => Self::from_hex(s),
            _ => Err(ConfigError::MissingCredential),
        }
    }

    /// Unprefixed hex encoding, as `personal_importRawKey` expects it.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw secret for a local signer.
    pub fn secret(&self) -> B256 {
        B256::from(self.0)
    }
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Who signs the operating account's transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigningMode {
    /// Sign in-process and submit with `eth_sendRawTransaction`. Works
    /// against any endpoint.
    #[default]
    Local,
    /// Import the key into the node and let it sign `eth_sendTransaction`.
    /// Only development nodes expose the `personal_` namespace this needs.
    Node,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Address Book
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Artifact {
    contract_name: String,
    #[serde(default)]
    networks: HashMap<String, ArtifactDeployment>,
}

#[derive(Deserialize)]
struct ArtifactDeployment {
    address: Address,
}

/// Deployed contract addresses for one network.
#[derive(Debug, Clone)]
pub struct AddressBook {
    network: Network,
    contracts: HashMap<String, Address>,
}

impl AddressBook {
    /// An empty book for `network`.
    pub fn new(network: Network) -> Self {
        Self {
            network,
            contracts: HashMap::new(),
        }
    }

    /// Loads every `*.json` build artifact in `dir` and keeps the contracts
    /// deployed on `network`.
    pub fn from_artifacts(dir: &Path, network: Network) -> Result<Self, ConfigError> {
        let artifact_error = |path: &Path, reason: String| ConfigError::Artifact {
            path: path.to_path_buf(),
            reason,
        };

        let mut book = Self::new(network);
        let entries = std::fs::read_dir(dir).map_err(|e| artifact_error(dir, e.to_string()))?;
        for entry in entries {
            let path = entry.map_err(|e| artifact_error(dir, e.to_string()))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw =
                std::fs::read_to_string(&path).map_err(|e| artifact_error(&path, e.to_string()))?;
            let artifact: Artifact =
                serde_json::from_str(&raw).map_err(|e| artifact_error(&path, e.to_string()))?;
            if let Some(deployment) = artifact.networks.get(network.network_id()) {
                book.insert(artifact.contract_name, deployment.address);
            }
        }
        Ok(book)
    }

    /// Records a deployment.
    pub fn insert(&mut self, name: impl Into<String>, address: Address) {
        self.contracts.insert(name.into(), address);
    }

    /// Looks up the address of `name`.
    pub fn resolve(&self, name: &str) -> Result<Address, ConfigError> {
        self.contracts
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownContract {
                name: name.to_string(),
                network: self.network,
            })
    }

    /// Network this book was loaded for.
    pub fn network(&self) -> Network {
        self.network
    }

    /// Number of known deployments.
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// Returns `true` if no deployment is known.
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tunables
// ---------------------------------------------------------------------------

/// How long to wait for a submitted transaction to be mined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptPolling {
    /// Pause between receipt lookups.
    pub interval: Duration,
    /// Lookups before giving up.
    pub attempts: u32,
}

impl Default for ReceiptPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            attempts: 240,
        }
    }
}

/// What to do when an optional exchange-rate read fails.
///
/// A revert means the deployment does not support the read and yields
/// "unknown" immediately. Any other failure is retried `retries` times before
/// also yielding "unknown". Zero retries reproduces the historical behaviour
/// of treating every failure as "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RatePolicy {
    pub retries: u32,
}

/// Control-loop tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    pub max_iterations: u64,
    pub iteration_delay: Duration,
    /// Simulated time per iteration is drawn from `[0, max_time_advance)`.
    pub max_time_advance: Duration,
    /// Seed for reproducible runs. `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            iteration_delay: DEFAULT_ITERATION_DELAY,
            max_time_advance: DEFAULT_MAX_TIME_ADVANCE,
            seed: None,
        }
    }
}

/// Rebase configuration applied to an elastic token before fuzzing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebaseParameters {
    pub minimum_deviation: u64,
    pub dampening_factor: u64,
    pub treasury_mint_percent: u64,
    pub minimum_interval: u64,
    pub window_offset: u64,
    pub window_length: u64,
}

impl Default for RebaseParameters {
    /// Rebase as eagerly as the contract allows: any deviation, no dampening,
    /// no treasury cut, one window per day open for 23 hours.
    fn default() -> Self {
        Self {
            minimum_deviation: 1,
            dampening_factor: 1,
            treasury_mint_percent: 0,
            minimum_interval: 24 * 60 * 60,
            window_offset: 0,
            window_length: 23 * 60 * 60,
        }
    }
}

/// One-time preparation performed before the loop starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupConfig {
    pub enabled: bool,
    /// Reserve-token allowance granted to a vault token.
    pub approval: String,
    /// Reserve-token amount minted from the faucet for a vault token.
    pub reserve_mint: String,
    /// Reference-token amount minted from the faucet for an elastic token.
    pub reference_mint: String,
    /// Maximum native currency paid per faucet mint.
    pub mint_cost: String,
    pub rebase: RebaseParameters,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            approval: "1000000000".to_string(),
            reserve_mint: "1".to_string(),
            reference_mint: "0.0001".to_string(),
            mint_cost: "1".to_string(),
            rebase: RebaseParameters::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// HarnessConfig
// ---------------------------------------------------------------------------

/// Everything a stress run needs, passed explicitly into the driver.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub network: Network,
    pub rpc_url: String,
    pub credential: Credential,
    pub signing: SigningMode,
    pub contracts: AddressBook,
    /// Contract name of the token to fuzz.
    pub token: String,
    pub driver: DriverConfig,
    pub setup: SetupConfig,
    pub rate_policy: RatePolicy,
    pub polling: ReceiptPolling,
}

impl HarnessConfig {
    /// A configuration with default tunables.
    pub fn new(
        network: Network,
        rpc_url: impl Into<String>,
        credential: Credential,
        contracts: AddressBook,
    ) -> Self {
        Self {
            network,
            rpc_url: rpc_url.into(),
            credential,
            signing: SigningMode::default(),
            contracts,
            token: DEFAULT_TOKEN.to_string(),
            driver: DriverConfig::default(),
            setup: SetupConfig::default(),
            rate_policy: RatePolicy::default(),
            polling: ReceiptPolling::default(),
        }
    }
}
