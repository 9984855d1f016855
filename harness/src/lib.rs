// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Elastic Harness: Core Library
//!
//! Everything needed to hammer a deployed elastic supply token with random
//! economic actions and live to read the logs afterwards.
//!
//! ## Architecture
//!
//! The library is split along the path a single action travels:
//!
//! - **amount**: Exact text-based conversion between human amounts and
//!   on-chain base units. No floats, ever.
//! - **abi**: Solidity interfaces of the contracts we talk to.
//! - **chain**: The remote capability interface (`Chain`, `Clock`) and its
//!   JSON-RPC implementation.
//! - **token**: Facades for plain, vault-style and elastic tokens.
//! - **exchange**: Faucet and direct-swap collaborator.
//! - **actions**: Which actions a token makes legal.
//! - **fuzz**: The setup phase and the fuzz loop itself.
//! - **config**: Networks, credentials, address book and driver tunables.
//! - **metrics**: Prometheus counters for a run.
//!
//! ## Rules of the road
//!
//! 1. Amounts cross public APIs as decimal strings. Base units only exist
//!    right next to the ABI encoder.
//! 2. A failing action never stops the run. A failing setup always does.
//! 3. One remote call in flight at a time.

pub mod abi;
pub mod actions;
pub mod amount;
pub mod chain;
pub mod config;
pub mod exchange;
pub mod fuzz;
pub mod metrics;
pub mod token;

pub use actions::{catalog, Action, Capability};
pub use amount::AmountError;
pub use chain::{Chain, ChainError, Clock};
pub use config::HarnessConfig;
pub use exchange::Exchange;
pub use fuzz::{Driver, DriverError, RunOutcome, RunReport};
pub use metrics::DriverMetrics;
pub use token::{ElasticToken, Erc20, Token, TokenError, VaultToken};
