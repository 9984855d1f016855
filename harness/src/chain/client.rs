//! # HTTP JSON-RPC Client
//!
//! [`RpcChain`] implements [`Chain`] and [`Clock`] against any node that
//! speaks Ethereum JSON-RPC over HTTP.
//!
//! Transactions are signed one of two ways, chosen by [`SigningMode`]:
//!
//! - **Local**: the operating key stays in the process. Each transaction is
//!   built as an EIP-155 legacy transaction with the node's pending nonce and
//!   current gas price, signed, and submitted with `eth_sendRawTransaction`.
//! - **Node**: the key is imported with `personal_importRawKey` and unlocked
//!   for the lifetime of the node process, and transactions go out through
//!   `eth_sendTransaction`. Only development nodes offer this.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSignerSync;
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, trace};

use super::rpc::{CallRequest, RpcMethod, RpcRequest, RpcResponse, TransactionReceipt};
use super::{Chain, ChainError, Clock, TxRequest};
use crate::config::{Credential, ReceiptPolling, SigningMode};

/// Passphrase the imported key is stored under on the node.
const IMPORT_PASSPHRASE: &str = "";

/// Unlock duration in seconds. Zero means "until the node restarts".
const UNLOCK_FOREVER: u64 = 0;

/// Gas limit of a locally signed transaction is the estimate plus this share
/// (in percent) of it.
const GAS_HEADROOM_PERCENT: u64 = 20;

enum Signer {
    Node,
    Local { key: PrivateKeySigner, chain_id: u64 },
}

/// JSON-RPC backed chain access for a single operating account.
pub struct RpcChain {
    http: reqwest::Client,
    url: String,
    account: Address,
    signer: Signer,
    next_id: AtomicU64,
    polling: ReceiptPolling,
}

impl RpcChain {
    /// Connects to `url` and makes `credential` the operating account.
    ///
    /// Fails if the key is unusable, the node refuses it or the node cannot
    /// be reached. All of these are setup errors.
    pub async fn connect(
        url: &str,
        credential: &Credential,
        signing: SigningMode,
        polling: ReceiptPolling,
    ) -> Result<Self, ChainError> {
        match signing {
            SigningMode::Local => Self::connect_local(url, credential, polling).await,
            SigningMode::Node => Self::connect_node(url, credential, polling).await,
        }
    }

    async fn connect_local(
        url: &str,
        credential: &Credential,
        polling: ReceiptPolling,
    ) -> Result<Self, ChainError> {
        let key = PrivateKeySigner::from_bytes(&credential.secret())
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        let mut chain = Self::with_account(url, key.address(), polling);

        let chain_id: U256 = chain.request(RpcMethod::ChainId, json!([])).await?;
        let chain_id: u64 = narrow(chain_id, "chain id")?;

        info!(account = %chain.account, chain_id, url, "operating account ready, signing locally");
        chain.signer = Signer::Local { key, chain_id };
        Ok(chain)
    }

    async fn connect_node(
        url: &str,
        credential: &Credential,
        polling: ReceiptPolling,
    ) -> Result<Self, ChainError> {
        let mut chain = Self::with_account(url, Address::ZERO, polling);

        let account: Address = chain
            .request(
                RpcMethod::ImportRawKey,
                json!([credential.to_hex(), IMPORT_PASSPHRASE]),
            )
            .await?;
        let unlocked: bool = chain
            .request(
                RpcMethod::UnlockAccount,
                json!([account, IMPORT_PASSPHRASE, UNLOCK_FOREVER]),
            )
            .await?;
        if !unlocked {
            return Err(ChainError::Rpc {
                code: 0,
                message: format!("node refused to unlock {account}"),
            });
        }

        chain.account = account;
        info!(%account, url, "operating account ready, node signs");
        Ok(chain)
    }

    /// Builds a client for an account the node can already sign for.
    pub fn with_account(url: &str, account: Address, polling: ReceiptPolling) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.to_string(),
            account,
            signer: Signer::Node,
            next_id: AtomicU64::new(1),
            polling,
        }
    }

    fn call_request(&self, to: Address, data: Bytes, value: U256) -> CallRequest {
        CallRequest {
            from: self.account,
            to,
            data,
            value,
        }
    }

    /// Sends one request and returns the raw `result`, mapping JSON-RPC errors
    /// onto [`ChainError`].
    async fn raw(
        &self,
        method: RpcMethod,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!(id, method = method.as_str(), %params, "rpc request");

        let request = RpcRequest::new(id, method, params);
        let response: RpcResponse = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ChainError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        if let Some(error) = response.error {
            debug!(id, method = method.as_str(), code = error.code, message = %error.message, "rpc error");
            return Err(if error.is_revert() {
                ChainError::Reverted(error.message)
            } else {
                ChainError::Rpc {
                    code: error.code,
                    message: error.message,
                }
            });
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: RpcMethod,
        params: serde_json::Value,
    ) -> Result<T, ChainError> {
        let value = self.raw(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| ChainError::Decode(format!("{}: {}", method.as_str(), e)))
    }

    /// Builds and signs a legacy transaction for `tx`, returning its
    /// EIP-2718 encoding.
    async fn sign_locally(
        &self,
        key: &PrivateKeySigner,
        chain_id: u64,
        tx: &TxRequest,
    ) -> Result<Bytes, ChainError> {
        let gas = match tx.gas {
            Some(gas) => gas,
            None => self.estimate_gas(tx).await?,
        };
        let gas_limit = gas + gas * U256::from(GAS_HEADROOM_PERCENT) / U256::from(100u64);
        let nonce: U256 = self
            .request(RpcMethod::GetTransactionCount, json!([self.account, "pending"]))
            .await?;
        let gas_price: U256 = self.request(RpcMethod::GasPrice, json!([])).await?;

        let mut unsigned = TxLegacy {
            chain_id: Some(chain_id),
            nonce: narrow(nonce, "nonce")?,
            gas_price: narrow(gas_price, "gas price")?,
            gas_limit: narrow(gas_limit, "gas limit")?,
            to: TxKind::Call(tx.to),
            value: tx.value,
            input: tx.data.clone(),
        };
        let signature = key
            .sign_transaction_sync(&mut unsigned)
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        let envelope = TxEnvelope::from(unsigned.into_signed(signature));
        Ok(envelope.encoded_2718().into())
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt, ChainError> {
        for _ in 0..self.polling.attempts {
            let receipt: Option<TransactionReceipt> = self
                .request(RpcMethod::GetTransactionReceipt, json!([tx_hash]))
                .await?;
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            tokio::time::sleep(self.polling.interval).await;
        }
        Err(ChainError::ReceiptTimeout {
            tx_hash,
            attempts: self.polling.attempts,
        })
    }
}

/// Narrows a quantity returned by the node to the width a transaction field
/// holds.
fn narrow<T: TryFrom<U256>>(value: U256, what: &str) -> Result<T, ChainError> {
    T::try_from(value).map_err(|_| ChainError::Decode(format!("{what} out of range: {value}")))
}

#[async_trait]
impl Chain for RpcChain {
    fn account(&self) -> Address {
        self.account
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let call = self.call_request(to, data, U256::ZERO);
        self.request(RpcMethod::Call, json!([call, "latest"])).await
    }

    async fn estimate_gas(&self, tx: &TxRequest) -> Result<U256, ChainError> {
        let call = self.call_request(tx.to, tx.data.clone(), tx.value);
        self.request(RpcMethod::EstimateGas, json!([call])).await
    }

    async fn send(&self, tx: &TxRequest) -> Result<TransactionReceipt, ChainError> {
        let tx_hash: B256 = match &self.signer {
            Signer::Node => {
                let call = self.call_request(tx.to, tx.data.clone(), tx.value);
                self.request(RpcMethod::SendTransaction, json!([call]))
                    .await?
            }
            Signer::Local { key, chain_id } => {
                let raw = self.sign_locally(key, *chain_id, tx).await?;
                self.request(RpcMethod::SendRawTransaction, json!([raw]))
                    .await?
            }
        };
        debug!(%tx_hash, to = %tx.to, "transaction submitted");
        self.wait_for_receipt(tx_hash).await
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, ChainError> {
        self.request(RpcMethod::GetBalance, json!([owner, "latest"]))
            .await
    }
}

#[async_trait]
impl Clock for RpcChain {
    async fn advance_time(&self, seconds: u64) -> Result<(), ChainError> {
        self.raw(RpcMethod::IncreaseTime, json!([seconds])).await?;
        Ok(())
    }

    async fn mine_block(&self) -> Result<(), ChainError> {
        self.raw(RpcMethod::Mine, json!([])).await?;
        Ok(())
    }
}
