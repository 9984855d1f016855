//! Faucet and direct-swap collaborator.
//!
//! The exchange contract mints test liquidity for native currency and swaps
//! one token directly into another. Both are only meaningful on networks where
//! the deployment pipeline installed it.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use tracing::info;

use crate::abi::IExchange;
use crate::amount;
use crate::chain::Chain;
use crate::config::NATIVE_DECIMALS;
use crate::token::{transact, Erc20, TokenError};

#[derive(Clone)]
pub struct Exchange {
    address: Address,
    chain: Arc<dyn Chain>,
}

impl Exchange {
    pub fn new(chain: Arc<dyn Chain>, address: Address) -> Self {
        Self { address, chain }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Mints `amount` of `token` to the operating account, paying at most
    /// `max_cost` of native currency.
    pub async fn faucet(&self, token: &Erc20, amount: &str, max_cost: &str) -> Result<(), TokenError> {
        let units = amount::to_units_u256(amount, token.decimals())?;
        let value = amount::to_units_u256(max_cost, NATIVE_DECIMALS)?;
        transact(
            &*self.chain,
            self.address,
            &IExchange::faucetCall {
                token: token.address(),
                amount: units,
            },
            value,
        )
        .await?;
        info!(token = token.symbol(), amount, max_cost, "faucet mint");
        Ok(())
    }

    /// Swaps `amount` of `from` into `to`, approving the exchange first.
    pub async fn convert(&self, from: &Erc20, to: &Erc20, amount: &str) -> Result<(), TokenError> {
        from.approve(self.address, amount).await?;
        let units = amount::to_units_u256(amount, from.decimals())?;
        transact(
            &*self.chain,
            self.address,
            &IExchange::directCall {
                from: from.address(),
                to: to.address(),
                amount: units,
            },
            U256::ZERO,
        )
        .await?;
        Ok(())
    }
}
