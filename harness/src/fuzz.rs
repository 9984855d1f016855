//! # Fuzz Driver
//!
//! Prepares the operating account, then hammers the token with randomly
//! chosen legal actions until the iteration budget runs out.
//!
//! ## Iteration
//!
//! Each iteration, strictly in order:
//!
//! 1. Log a snapshot of supply, reserve, rates and balances. A failed read is
//!    a warning, nothing more.
//! 2. Sleep `iteration_delay`.
//! 3. On chains with a simulated clock, skip a random stretch of time in
//!    `[0, max_time_advance)` and mine a block.
//! 4. Pick one action uniformly from the catalog.
//! 5. Read the balance the action consumes and draw an amount from it (or
//!    take all of it for the `*All` actions).
//! 6. Skip zero amounts and unavailable rebases, execute everything else.
//!
//! Steps 3 to 6 form one failure boundary: whatever goes wrong there is
//! logged, counted as [`IterationOutcome::Failed`], and the loop moves on.
//!
//! ## Setup
//!
//! Setup runs once before the loop and every failure in it is fatal. It
//! approves the vault for the reserve token, mints starting liquidity from the
//! exchange faucet and makes an elastic token rebase as eagerly as possible.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::Address;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::actions::{catalog, Action};
use crate::amount;
use crate::chain::{ChainError, Clock};
use crate::config::{DriverConfig, HarnessConfig, Network, SetupConfig, NATIVE_DECIMALS};
use crate::exchange::Exchange;
use crate::metrics::{DriverMetrics, OUTCOME_EXECUTED, OUTCOME_FAILED, OUTCOME_SKIPPED};
use crate::token::{Erc20, Token, TokenError};

/// Fatal driver errors. Per-action failures never surface here.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("setup failed: {0}")]
    Setup(#[from] TokenError),

    /// The token needs the faucet/exchange, but none was provided.
    #[error("no exchange configured, but {0} needs one")]
    MissingExchange(String),
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The iteration budget was spent.
    Completed,
    /// The token exposes neither capability, so there was nothing to do.
    NoActionsAvailable,
}

/// Result of one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    Executed,
    /// Zero amount or no rebase available.
    Skipped,
    Failed(String),
}

impl IterationOutcome {
    fn label(&self) -> &'static str {
        match self {
            IterationOutcome::Executed => OUTCOME_EXECUTED,
            IterationOutcome::Skipped => OUTCOME_SKIPPED,
            IterationOutcome::Failed(_) => OUTCOME_FAILED,
        }
    }
}

/// Tally of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub iterations: u64,
    pub executed: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl RunReport {
    fn new(outcome: RunOutcome) -> Self {
        Self {
            outcome,
            iterations: 0,
            executed: 0,
            skipped: 0,
            failed: 0,
        }
    }

    fn record(&mut self, outcome: &IterationOutcome) {
        self.iterations += 1;
        match outcome {
            IterationOutcome::Executed => self.executed += 1,
            IterationOutcome::Skipped => self.skipped += 1,
            IterationOutcome::Failed(_) => self.failed += 1,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}: {} iterations ({} executed, {} skipped, {} failed)",
            self.outcome, self.iterations, self.executed, self.skipped, self.failed
        )
    }
}

/// Point-in-time view of the token and the operating account.
///
/// Fields that only exist for one capability are `None` otherwise, and the
/// exchange rates are `None` when the deployment does not report them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub total_supply: String,
    pub total_reserve: Option<String>,
    pub scaling_factor: Option<String>,
    pub last_exchange_rate: Option<String>,
    pub current_exchange_rate: Option<String>,
    pub token_balance: String,
    pub reserve_balance: Option<String>,
    pub reference_balance: Option<String>,
    pub native_balance: String,
}

/// Drives one token through setup and the fuzz loop.
pub struct Driver {
    token: Token,
    exchange: Option<Exchange>,
    clock: Option<Arc<dyn Clock>>,
    account: Address,
    network: Network,
    config: DriverConfig,
    setup: SetupConfig,
    metrics: DriverMetrics,
    rng: StdRng,
}

impl Driver {
    /// Creates a driver without a simulated clock.
    ///
    /// `exchange` may be `None` when [`needs_exchange`] says the run never
    /// touches it.
    pub fn new(
        config: &HarnessConfig,
        token: Token,
        exchange: Option<Exchange>,
        metrics: DriverMetrics,
    ) -> Self {
        let rng = match config.driver.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            account: token.base().chain().account(),
            token,
            exchange,
            clock: None,
            network: config.network,
            config: config.driver.clone(),
            setup: config.setup.clone(),
            metrics,
            rng,
        }
    }

    /// Enables time travel between iterations.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn metrics(&self) -> &DriverMetrics {
        &self.metrics
    }

    /// Runs setup (unless disabled) and the loop.
    pub async fn run(&mut self) -> Result<RunReport, DriverError> {
        self.log_metadata();

        let actions = catalog(&self.token);
        if actions.is_empty() {
            warn!(
                token = self.token.base().symbol(),
                "token has no vault or elastic capability, nothing to fuzz"
            );
            return Ok(RunReport::new(RunOutcome::NoActionsAvailable));
        }
        if self.exchange.is_none() && needs_exchange(&self.token, &self.setup) {
            return Err(self.missing_exchange());
        }

        if self.setup.enabled {
            self.setup().await?;
        } else {
            info!("setup skipped");
        }

        let mut report = RunReport::new(RunOutcome::Completed);
        info!(
            max_iterations = self.config.max_iterations,
            actions = actions.len(),
            "fuzz loop starting"
        );
        for iteration in 0..self.config.max_iterations {
            self.metrics.iterations_total.inc();
            let outcome = self
                .run_iteration(&actions)
                .instrument(info_span!("iteration", iteration))
                .await;
            report.record(&outcome);
        }
        info!(%report, "fuzz loop finished");
        Ok(report)
    }

    /// One-time preparation of the operating account and the token.
    pub async fn setup(&mut self) -> Result<(), DriverError> {
        if let Token::Vault(vault) = &self.token {
            let reserve = vault.reserve_token();
            let spender = vault.base().address();
            reserve.approve(spender, &self.setup.approval).await?;
            let allowance = reserve.allowance(self.account, spender).await?;
            info!(
                %allowance,
                symbol = reserve.symbol(),
                "reserve approved for vault"
            );
        }

        self.snapshot().await?;

        if let Some(reserve) = self.token.reserve_token() {
            info!(symbol = reserve.symbol(), "minting reserve token");
            self.exchange
                .as_ref()
                .ok_or_else(|| self.missing_exchange())?
                .faucet(reserve, &self.setup.reserve_mint, &self.setup.mint_cost)
                .await?;
        }
        if let Some(elastic) = self.token.as_elastic() {
            let reference = elastic.reference_token();
            info!(symbol = reference.symbol(), "minting reference token");
            self.exchange
                .as_ref()
                .ok_or_else(|| self.missing_exchange())?
                .faucet(reference, &self.setup.reference_mint, &self.setup.mint_cost)
                .await?;

            info!(params = ?self.setup.rebase, "setting rebase parameters");
            elastic.apply_rebase_parameters(&self.setup.rebase).await?;
        }
        Ok(())
    }

    /// Reads and logs the current state.
    pub async fn snapshot(&self) -> Result<Snapshot, TokenError> {
        let base = self.token.base();

        let total_reserve = match self.token.as_vault() {
            Some(vault) => Some(vault.total_reserve().await?),
            None => None,
        };
        let (scaling_factor, last_exchange_rate, current_exchange_rate) =
            match self.token.as_elastic() {
                Some(elastic) => (
                    Some(elastic.scaling_factor().await?),
                    elastic.last_exchange_rate().await,
                    elastic.current_exchange_rate().await,
                ),
                None => (None, None, None),
            };
        let reserve_balance = match self.token.reserve_token() {
            Some(reserve) => Some(reserve.balance_of(self.account).await?),
            None => None,
        };
        let reference_balance = match self.token.reference_token() {
            Some(reference) => Some(reference.balance_of(self.account).await?),
            None => None,
        };
        let native = base.chain().native_balance(self.account).await?;

        let snapshot = Snapshot {
            total_supply: base.total_supply().await?,
            total_reserve,
            scaling_factor,
            last_exchange_rate,
            current_exchange_rate,
            token_balance: base.balance_of(self.account).await?,
            reserve_balance,
            reference_balance,
            native_balance: amount::u256_to_coins(native, NATIVE_DECIMALS),
        };
        info!(
            total_supply = %snapshot.total_supply,
            total_reserve = ?snapshot.total_reserve,
            scaling_factor = ?snapshot.scaling_factor,
            last_exchange_rate = ?snapshot.last_exchange_rate,
            current_exchange_rate = ?snapshot.current_exchange_rate,
            token_balance = %snapshot.token_balance,
            reserve_balance = ?snapshot.reserve_balance,
            reference_balance = ?snapshot.reference_balance,
            native_balance = %snapshot.native_balance,
            "snapshot"
        );
        Ok(snapshot)
    }

    fn missing_exchange(&self) -> DriverError {
        DriverError::MissingExchange(self.token.base().symbol().to_string())
    }

    fn log_metadata(&self) {
        info!(network = %self.network, account = %self.account, "target");
        let tokens = [
            Some(self.token.base()),
            self.token.reserve_token(),
            self.token.reference_token(),
        ];
        for token in tokens.into_iter().flatten() {
            info!(
                name = token.name(),
                symbol = token.symbol(),
                decimals = token.decimals(),
                address = %token.address(),
                "token"
            );
        }
    }

    async fn run_iteration(&mut self, actions: &[Action]) -> IterationOutcome {
        if let Err(e) = self.snapshot().await {
            warn!(error = %e, "snapshot failed");
            self.metrics.snapshot_failures_total.inc();
        }

        tokio::time::sleep(self.config.iteration_delay).await;

        if let Err(e) = self.advance_clock().await {
            warn!(error = %e, "clock advance failed");
            self.metrics.clock_failures_total.inc();
            return IterationOutcome::Failed(e.to_string());
        }

        let action = actions[self.rng.gen_range(0..actions.len())];
        let outcome = match self.execute_action(action).await {
            Ok(true) => IterationOutcome::Executed,
            Ok(false) => IterationOutcome::Skipped,
            Err(e) => {
                warn!(%action, error = %e, "action failed");
                IterationOutcome::Failed(e.to_string())
            }
        };
        self.metrics.record_action(action, outcome.label());
        outcome
    }

    async fn advance_clock(&mut self) -> Result<(), ChainError> {
        let Some(clock) = &self.clock else {
            return Ok(());
        };
        let max = self.config.max_time_advance.as_secs();
        let seconds = if max == 0 {
            0
        } else {
            self.rng.gen_range(0..max)
        };
        clock.advance_time(seconds).await?;
        clock.mine_block().await?;
        debug!(seconds, "clock advanced");
        Ok(())
    }

    /// Executes `action`. Returns `false` when it was skipped.
    async fn execute_action(&mut self, action: Action) -> Result<bool, TokenError> {
        let account = self.account;
        let rng = &mut self.rng;

        match (action, &self.token, self.exchange.as_ref()) {
            (Action::Rebase, Token::Elastic(elastic), _) => {
                let available = elastic.rebase_available().await?;
                info!(%action, available, symbol = elastic.base().symbol());
                if !available {
                    return Ok(false);
                }
                elastic.rebase().await?;
            }
            (Action::Deposit | Action::DepositAll, Token::Vault(vault), _) => {
                let amount = draw_amount(rng, account, action, vault.reserve_token()).await?;
                if amount::is_zero(&amount) {
                    return Ok(false);
                }
                vault.deposit(&amount).await?;
            }
            (Action::Withdraw | Action::WithdrawAll, Token::Vault(vault), _) => {
                let amount = draw_amount(rng, account, action, vault.base()).await?;
                if amount::is_zero(&amount) {
                    return Ok(false);
                }
                vault.withdraw(&amount).await?;
            }
            (Action::Buy | Action::BuyAll, Token::Elastic(elastic), Some(exchange)) => {
                let reference = elastic.reference_token();
                let amount = draw_amount(rng, account, action, reference).await?;
                if amount::is_zero(&amount) {
                    return Ok(false);
                }
                exchange.convert(reference, elastic.base(), &amount).await?;
            }
            (Action::Sell | Action::SellAll, Token::Elastic(elastic), Some(exchange)) => {
                let amount = draw_amount(rng, account, action, elastic.base()).await?;
                if amount::is_zero(&amount) {
                    return Ok(false);
                }
                exchange
                    .convert(elastic.base(), elastic.reference_token(), &amount)
                    .await?;
            }
            (action, _, _) => {
                debug!(%action, "action not supported by token");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Whether a run over `token` with `setup` calls the faucet/exchange.
///
/// Elastic tokens always do, since buying and selling go through it. Vault
/// tokens only need it to mint the reserve during setup.
pub fn needs_exchange(token: &Token, setup: &SetupConfig) -> bool {
    token.as_elastic().is_some() || (setup.enabled && token.reserve_token().is_some())
}

/// Reads `owner`'s balance of `token` and picks the amount `action` spends.
async fn draw_amount(
    rng: &mut StdRng,
    owner: Address,
    action: Action,
    token: &Erc20,
) -> Result<String, TokenError> {
    let balance = token.balance_of(owner).await?;
    let amount = if action.is_all() {
        balance
    } else {
        amount::random_amount(rng, &balance, token.decimals())?
    };
    info!(%action, %amount, symbol = token.symbol());
    Ok(amount)
}
