//! # Chain Capability Interface
//!
//! The harness never touches a node directly. Everything remote goes through
//! two narrow traits:
//!
//! - [`Chain`]: read calls, gas estimates, transaction submission and native
//!   balances, always on behalf of a single operating account.
//! - [`Clock`]: time travel and block production, which only exist on local
//!   test chains.
//!
//! [`client::RpcChain`] implements both over HTTP JSON-RPC. Tests implement
//! them in memory.

pub mod client;
pub mod rpc;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use thiserror::Error;

pub use client::RpcChain;
pub use rpc::TransactionReceipt;

/// Errors surfaced by a [`Chain`] or [`Clock`] implementation.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// The request never produced a JSON-RPC answer (connection, HTTP, body).
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error that is not a revert.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Node-supplied message.
        message: String,
    },

    /// The EVM reverted the call or transaction.
    #[error("execution reverted: {0}")]
    Reverted(String),

    /// The node answered, but not with what the ABI or wire format promised.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The operating key could not be loaded or could not sign.
    #[error("signing error: {0}")]
    Signing(String),

    /// The transaction was accepted but no receipt showed up in time.
    #[error("no receipt for transaction {tx_hash} after {attempts} polls")]
    ReceiptTimeout {
        /// Hash returned by the node on submission.
        tx_hash: B256,
        /// Number of receipt polls performed.
        attempts: u32,
    },
}

impl ChainError {
    /// Returns `true` if the EVM itself rejected the call.
    ///
    /// A revert is deterministic and retrying it is pointless; everything
    /// else may be transient.
    pub fn is_revert(&self) -> bool {
        matches!(self, ChainError::Reverted(_))
    }
}

/// A state-changing call, before the signer fills in nonce and gas price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    /// Target contract.
    pub to: Address,
    /// ABI-encoded calldata.
    pub data: Bytes,
    /// Native value attached to the call.
    pub value: U256,
    /// Gas estimate, if the caller already has one.
    pub gas: Option<U256>,
}

impl TxRequest {
    /// A call with no native value attached.
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            value: U256::ZERO,
            gas: None,
        }
    }

    /// Attaches native value (for payable functions).
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Reuses an earlier gas estimate instead of asking the node again.
    pub fn with_gas(mut self, gas: U256) -> Self {
        self.gas = Some(gas);
        self
    }
}

/// Remote chain access on behalf of one operating account.
///
/// Implementations must be usable from a single task at a time; the driver
/// never issues two calls concurrently.
#[async_trait]
pub trait Chain: Send + Sync {
    /// The account every transaction is sent from.
    fn account(&self) -> Address;

    /// Executes a read-only call against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    /// Estimates the gas a transaction would consume.
    async fn estimate_gas(&self, tx: &TxRequest) -> Result<U256, ChainError>;

    /// Submits a transaction and waits for its receipt.
    ///
    /// A mined-but-failed transaction is returned as a receipt with a zero
    /// status; a revert detected before mining is a [`ChainError::Reverted`].
    async fn send(&self, tx: &TxRequest) -> Result<TransactionReceipt, ChainError>;

    /// Native currency balance of `owner`, in wei.
    async fn native_balance(&self, owner: Address) -> Result<U256, ChainError>;
}

/// Simulated time control. Only local test chains provide one.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Moves the chain's notion of "now" forward.
    async fn advance_time(&self, seconds: u64) -> Result<(), ChainError>;

    /// Forces the chain to produce one block.
    async fn mine_block(&self) -> Result<(), ChainError>;
}
