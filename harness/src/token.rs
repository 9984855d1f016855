//! # Token Facade
//!
//! Typed access to a deployed token. Public amounts are always decimal
//! strings in the token's own precision; base units only exist at the ABI
//! boundary inside this module.
//!
//! A token is resolved once with [`Token::resolve`], which reads the ERC-20
//! metadata and then probes for the optional capabilities:
//!
//! | Probe              | Resolves to        | Related token |
//! |--------------------|--------------------|---------------|
//! | `reserveToken()`   | [`Token::Vault`]   | reserve       |
//! | `referenceToken()` | [`Token::Elastic`] | reference     |
//! | both revert        | [`Token::Base`]    | none          |
//!
//! A reverted probe means the capability is absent. Any other failure is
//! fatal, since it says nothing about the contract.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::abi::{IElasticToken, IVaultToken, IERC20};
use crate::amount::{self, AmountError};
use crate::chain::{Chain, ChainError, TransactionReceipt, TxRequest};
use crate::config::{RatePolicy, RebaseParameters};

/// Errors raised by token and exchange operations.
#[derive(Debug, Clone, Error)]
pub enum TokenError {
    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The EVM rejected a state-changing call, either before mining or with
    /// a failed receipt.
    #[error("{method} reverted: {reason}")]
    TransactionReverted {
        /// Solidity signature of the call.
        method: String,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// ABI helpers
// ---------------------------------------------------------------------------

/// Performs a read-only call and decodes its return values.
pub(crate) async fn read<C>(chain: &dyn Chain, to: Address, call: &C) -> Result<C::Return, ChainError>
where
    C: SolCall + Sync,
{
    let data = chain.call(to, call.abi_encode().into()).await?;
    C::abi_decode_returns(&data, true)
        .map_err(|e| ChainError::Decode(format!("{}: {}", C::SIGNATURE, e)))
}

/// Submits a call as a transaction without judging the receipt.
///
/// The gas estimate is informative only; a failed estimate is logged and the
/// transaction is sent anyway so the node reports the real outcome.
pub(crate) async fn submit<C>(
    chain: &dyn Chain,
    to: Address,
    call: &C,
    value: U256,
) -> Result<TransactionReceipt, TokenError>
where
    C: SolCall + Sync,
{
    let method = C::SIGNATURE;
    let mut tx = TxRequest::new(to, call.abi_encode()).with_value(value);

    match chain.estimate_gas(&tx).await {
        Ok(gas) => {
            info!(method, %gas, "gas estimate");
            tx = tx.with_gas(gas);
        }
        Err(e) => warn!(method, error = %e, "gas estimate failed"),
    }

    let receipt = chain.send(&tx).await.map_err(|e| match e {
        ChainError::Reverted(reason) => TokenError::TransactionReverted {
            method: method.to_string(),
            reason,
        },
        other => TokenError::Chain(other),
    })?;
    info!(
        method,
        tx_hash = %receipt.transaction_hash,
        gas_used = %receipt.gas_used,
        success = receipt.succeeded(),
        "transaction mined"
    );
    Ok(receipt)
}

/// Submits a call and fails unless the receipt reports success.
pub(crate) async fn transact<C>(
    chain: &dyn Chain,
    to: Address,
    call: &C,
    value: U256,
) -> Result<TransactionReceipt, TokenError>
where
    C: SolCall + Sync,
{
    let receipt = submit(chain, to, call, value).await?;
    if !receipt.succeeded() {
        return Err(TokenError::TransactionReverted {
            method: C::SIGNATURE.to_string(),
            reason: format!("failed receipt for {}", receipt.transaction_hash),
        });
    }
    Ok(receipt)
}

// ---------------------------------------------------------------------------
// Erc20
// ---------------------------------------------------------------------------

/// A plain ERC-20 token with its metadata cached at resolution.
#[derive(Clone)]
pub struct Erc20 {
    address: Address,
    name: String,
    symbol: String,
    decimals: u8,
    chain: Arc<dyn Chain>,
}

impl fmt::Debug for Erc20 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Erc20")
            .field("address", &self.address)
            .field("name", &self.name)
            .field("symbol", &self.symbol)
            .field("decimals", &self.decimals)
            .finish()
    }
}

impl Erc20 {
    /// Reads name, symbol and decimals of the token at `address`.
    pub async fn resolve(chain: Arc<dyn Chain>, address: Address) -> Result<Self, TokenError> {
        let name = read(&*chain, address, &IERC20::nameCall {}).await?._0;
        let symbol = read(&*chain, address, &IERC20::symbolCall {}).await?._0;
        let decimals = read(&*chain, address, &IERC20::decimalsCall {}).await?._0;
        Ok(Self {
            address,
            name,
            symbol,
            decimals,
            chain,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub(crate) fn chain(&self) -> &dyn Chain {
        &*self.chain
    }

    pub async fn total_supply(&self) -> Result<String, TokenError> {
        let supply = read(self.chain(), self.address, &IERC20::totalSupplyCall {})
            .await?
            ._0;
        Ok(amount::u256_to_coins(supply, self.decimals))
    }

    pub async fn balance_of(&self, owner: Address) -> Result<String, TokenError> {
        let balance = read(self.chain(), self.address, &IERC20::balanceOfCall { owner })
            .await?
            ._0;
        Ok(amount::u256_to_coins(balance, self.decimals))
    }

    pub async fn allowance(&self, owner: Address, spender: Address) -> Result<String, TokenError> {
        let allowance = read(
            self.chain(),
            self.address,
            &IERC20::allowanceCall { owner, spender },
        )
        .await?
        ._0;
        Ok(amount::u256_to_coins(allowance, self.decimals))
    }

    /// Lets `spender` move up to `amount` of the operating account's tokens.
    ///
    /// Returns `true` once the approval is mined. A revert, before mining or
    /// in the receipt, is [`TokenError::TransactionReverted`].
    pub async fn approve(&self, spender: Address, amount: &str) -> Result<bool, TokenError> {
        let amount = amount::to_units_u256(amount, self.decimals)?;
        let receipt = transact(
            self.chain(),
            self.address,
            &IERC20::approveCall { spender, amount },
            U256::ZERO,
        )
        .await?;
        Ok(receipt.succeeded())
    }
}

// ---------------------------------------------------------------------------
// VaultToken
// ---------------------------------------------------------------------------

/// A token minted against deposits of a reserve token.
#[derive(Debug, Clone)]
pub struct VaultToken {
    base: Erc20,
    reserve: Erc20,
}

impl VaultToken {
    pub fn base(&self) -> &Erc20 {
        &self.base
    }

    pub fn reserve_token(&self) -> &Erc20 {
        &self.reserve
    }

    /// Reserve held by the vault, in reserve-token precision.
    pub async fn total_reserve(&self) -> Result<String, TokenError> {
        let reserve = read(
            self.base.chain(),
            self.base.address,
            &IVaultToken::totalReserveCall {},
        )
        .await?
        ._0;
        Ok(amount::u256_to_coins(reserve, self.reserve.decimals))
    }

    /// Deposits `cost` of the reserve token.
    pub async fn deposit(&self, cost: &str) -> Result<(), TokenError> {
        let cost = amount::to_units_u256(cost, self.reserve.decimals)?;
        transact(
            self.base.chain(),
            self.base.address,
            &IVaultToken::depositCall { cost },
            U256::ZERO,
        )
        .await?;
        Ok(())
    }

    /// Burns `gross_shares` of the vault token for reserve.
    pub async fn withdraw(&self, gross_shares: &str) -> Result<(), TokenError> {
        let gross_shares = amount::to_units_u256(gross_shares, self.base.decimals)?;
        transact(
            self.base.chain(),
            self.base.address,
            &IVaultToken::withdrawCall {
                grossShares: gross_shares,
            },
            U256::ZERO,
        )
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ElasticToken
// ---------------------------------------------------------------------------

/// A rebasing token that tracks a reference token.
#[derive(Debug, Clone)]
pub struct ElasticToken {
    base: Erc20,
    reference: Erc20,
    rate_policy: RatePolicy,
}

impl ElasticToken {
    pub fn base(&self) -> &Erc20 {
        &self.base
    }

    pub fn reference_token(&self) -> &Erc20 {
        &self.reference
    }

    pub async fn scaling_factor(&self) -> Result<String, TokenError> {
        let factor = read(
            self.base.chain(),
            self.base.address,
            &IElasticToken::scalingFactorCall {},
        )
        .await?
        ._0;
        Ok(amount::u256_to_coins(factor, self.base.decimals))
    }

    /// Exchange rate observed at the last rebase, if the deployment reports one.
    pub async fn last_exchange_rate(&self) -> Option<String> {
        self.optional_rate(&IElasticToken::lastExchangeRateCall {}, |r| r._0)
            .await
    }

    /// Exchange rate right now, if the deployment reports one.
    pub async fn current_exchange_rate(&self) -> Option<String> {
        self.optional_rate(&IElasticToken::currentExchangeRateCall {}, |r| r._0)
            .await
    }

    async fn optional_rate<C>(&self, call: &C, rate: fn(C::Return) -> U256) -> Option<String>
    where
        C: SolCall + Sync,
    {
        let method = C::SIGNATURE;
        let mut retries = 0;
        loop {
            match read(self.base.chain(), self.base.address, call).await {
                Ok(ret) => return Some(amount::u256_to_coins(rate(ret), self.base.decimals)),
                Err(e) if e.is_revert() => {
                    debug!(method, "rate not reported");
                    return None;
                }
                Err(e) if retries < self.rate_policy.retries => {
                    retries += 1;
                    debug!(method, retries, error = %e, "retrying rate read");
                }
                Err(e) => {
                    warn!(method, error = %e, "rate unavailable");
                    return None;
                }
            }
        }
    }

    pub async fn rebase_available(&self) -> Result<bool, TokenError> {
        Ok(read(
            self.base.chain(),
            self.base.address,
            &IElasticToken::rebaseAvailableCall {},
        )
        .await?
        ._0)
    }

    pub async fn rebase(&self) -> Result<(), TokenError> {
        transact(
            self.base.chain(),
            self.base.address,
            &IElasticToken::rebaseCall {},
            U256::ZERO,
        )
        .await?;
        Ok(())
    }

    pub async fn set_rebase_minimum_deviation(&self, minimum_deviation: u64) -> Result<(), TokenError> {
        self.configure(&IElasticToken::setRebaseMinimumDeviationCall {
            minimumDeviation: U256::from(minimum_deviation),
        })
        .await
    }

    pub async fn set_rebase_dampening_factor(&self, dampening_factor: u64) -> Result<(), TokenError> {
        self.configure(&IElasticToken::setRebaseDampeningFactorCall {
            dampeningFactor: U256::from(dampening_factor),
        })
        .await
    }

    pub async fn set_rebase_treasury_mint_percent(
        &self,
        treasury_mint_percent: u64,
    ) -> Result<(), TokenError> {
        self.configure(&IElasticToken::setRebaseTreasuryMintPercentCall {
            treasuryMintPercent: U256::from(treasury_mint_percent),
        })
        .await
    }

    pub async fn set_rebase_timing_parameters(
        &self,
        minimum_interval: u64,
        window_offset: u64,
        window_length: u64,
    ) -> Result<(), TokenError> {
        self.configure(&IElasticToken::setRebaseTimingParametersCall {
            minimumInterval: U256::from(minimum_interval),
            windowOffset: U256::from(window_offset),
            windowLength: U256::from(window_length),
        })
        .await
    }

    /// Applies a full set of rebase parameters, setter by setter.
    pub async fn apply_rebase_parameters(&self, params: &RebaseParameters) -> Result<(), TokenError> {
        self.set_rebase_minimum_deviation(params.minimum_deviation)
            .await?;
        self.set_rebase_dampening_factor(params.dampening_factor)
            .await?;
        self.set_rebase_treasury_mint_percent(params.treasury_mint_percent)
            .await?;
        self.set_rebase_timing_parameters(
            params.minimum_interval,
            params.window_offset,
            params.window_length,
        )
        .await
    }

    // Setters skip the gas estimate log; only the receipt matters.
    async fn configure<C: SolCall + Sync>(&self, call: &C) -> Result<(), TokenError> {
        let tx = TxRequest::new(self.base.address, call.abi_encode());
        let receipt = self.base.chain().send(&tx).await.map_err(|e| match e {
            ChainError::Reverted(reason) => TokenError::TransactionReverted {
                method: C::SIGNATURE.to_string(),
                reason,
            },
            other => TokenError::Chain(other),
        })?;
        if !receipt.succeeded() {
            return Err(TokenError::TransactionReverted {
                method: C::SIGNATURE.to_string(),
                reason: format!("failed receipt for {}", receipt.transaction_hash),
            });
        }
        debug!(method = C::SIGNATURE, tx_hash = %receipt.transaction_hash, "parameter set");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// A resolved token, tagged with the capability its contract exposes.
#[derive(Debug, Clone)]
pub enum Token {
    Base(Erc20),
    Vault(VaultToken),
    Elastic(ElasticToken),
}

impl Token {
    /// Resolves the token at `address` and selects its capability.
    pub async fn resolve(
        chain: Arc<dyn Chain>,
        address: Address,
        rate_policy: RatePolicy,
    ) -> Result<Self, TokenError> {
        let base = Erc20::resolve(chain.clone(), address).await?;

        if let Some(reserve) =
            probe(&*chain, address, &IVaultToken::reserveTokenCall {}, |r| r._0).await?
        {
            let reserve = Erc20::resolve(chain, reserve).await?;
            debug!(token = %base.symbol, reserve = %reserve.symbol, "vault token");
            return Ok(Token::Vault(VaultToken { base, reserve }));
        }

        if let Some(reference) =
            probe(&*chain, address, &IElasticToken::referenceTokenCall {}, |r| r._0).await?
        {
            let reference = Erc20::resolve(chain, reference).await?;
            debug!(token = %base.symbol, reference = %reference.symbol, "elastic token");
            return Ok(Token::Elastic(ElasticToken {
                base,
                reference,
                rate_policy,
            }));
        }

        debug!(token = %base.symbol, "plain token");
        Ok(Token::Base(base))
    }

    pub fn base(&self) -> &Erc20 {
        match self {
            Token::Base(base) => base,
            Token::Vault(vault) => &vault.base,
            Token::Elastic(elastic) => &elastic.base,
        }
    }

    pub fn reserve_token(&self) -> Option<&Erc20> {
        self.as_vault().map(VaultToken::reserve_token)
    }

    pub fn reference_token(&self) -> Option<&Erc20> {
        self.as_elastic().map(ElasticToken::reference_token)
    }

    pub fn as_vault(&self) -> Option<&VaultToken> {
        match self {
            Token::Vault(vault) => Some(vault),
            _ => None,
        }
    }

    pub fn as_elastic(&self) -> Option<&ElasticToken> {
        match self {
            Token::Elastic(elastic) => Some(elastic),
            _ => None,
        }
    }
}

/// Reads an address-returning capability probe. A revert or the zero
/// address means the capability is absent.
async fn probe<C>(
    chain: &dyn Chain,
    to: Address,
    call: &C,
    address: fn(C::Return) -> Address,
) -> Result<Option<Address>, ChainError>
where
    C: SolCall + Sync,
{
    match read(chain, to, call).await {
        Ok(ret) => Ok(Some(address(ret)).filter(|a| !a.is_zero())),
        Err(e) if e.is_revert() => Ok(None),
        Err(e) => Err(e),
    }
}
