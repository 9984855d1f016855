//! End-to-end driver tests against an in-memory chain.
//!
//! The mock answers reads by selector from a small static ledger and fails
//! transactions on demand, which is enough to exercise resolution, setup and
//! the failure boundary of the loop without a node.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;

use elastic_harness::abi::{IElasticToken, IExchange, IVaultToken, IERC20};
use elastic_harness::actions::{catalog, Action};
use elastic_harness::chain::{Chain, ChainError, Clock, TransactionReceipt, TxRequest};
use elastic_harness::config::{AddressBook, Credential, HarnessConfig, Network, RatePolicy};
use elastic_harness::exchange::Exchange;
use elastic_harness::fuzz::{needs_exchange, Driver, DriverError, RunOutcome};
use elastic_harness::metrics::DriverMetrics;
use elastic_harness::token::{Token, TokenError};

const TOKEN: Address = Address::repeat_byte(0x10);
const RESERVE: Address = Address::repeat_byte(0x20);
const REFERENCE: Address = Address::repeat_byte(0x30);
const EXCHANGE: Address = Address::repeat_byte(0xee);
const ACCOUNT: Address = Address::repeat_byte(0xaa);

fn ether(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}

// ---------------------------------------------------------------------------
// Mock chain
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Kind {
    Base,
    Vault,
    Elastic,
}

struct Sent {
    to: Address,
    selector: [u8; 4],
    value: U256,
}

struct MockChain {
    kind: Kind,
    balances: HashMap<Address, U256>,
    rate_error: Option<ChainError>,
    fail_send: Box<dyn Fn(usize) -> bool + Send + Sync>,
    failed_receipt: Box<dyn Fn([u8; 4]) -> bool + Send + Sync>,
    sent: Mutex<Vec<Sent>>,
    rate_reads: Mutex<usize>,
}

impl MockChain {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            balances: HashMap::new(),
            rate_error: None,
            fail_send: Box::new(|_| false),
            failed_receipt: Box::new(|_| false),
            sent: Mutex::new(Vec::new()),
            rate_reads: Mutex::new(0),
        }
    }

    fn balance(mut self, token: Address, amount: U256) -> Self {
        self.balances.insert(token, amount);
        self
    }

    fn failing_sends(mut self, fail: impl Fn(usize) -> bool + Send + Sync + 'static) -> Self {
        self.fail_send = Box::new(fail);
        self
    }

    /// Mines calls with `selector` but reports a failed receipt.
    fn failing_receipts(mut self, selector: [u8; 4]) -> Self {
        self.failed_receipt = Box::new(move |s| s == selector);
        self
    }

    fn rate_error(mut self, error: ChainError) -> Self {
        self.rate_error = Some(error);
        self
    }

    fn selectors(&self) -> Vec<[u8; 4]> {
        self.sent.lock().unwrap().iter().map(|s| s.selector).collect()
    }

    fn symbol(to: Address) -> &'static str {
        if to == TOKEN {
            "rTKN"
        } else if to == RESERVE {
            "RSV"
        } else if to == REFERENCE {
            "REF"
        } else {
            "???"
        }
    }

    fn read(&self, to: Address, selector: [u8; 4]) -> Result<Vec<u8>, ChainError> {
        let is = |s: [u8; 4]| selector == s;
        let data = if is(IERC20::nameCall::SELECTOR) {
            IERC20::nameCall::abi_encode_returns(&(Self::symbol(to).to_string(),))
        } else if is(IERC20::symbolCall::SELECTOR) {
            IERC20::symbolCall::abi_encode_returns(&(Self::symbol(to).to_string(),))
        } else if is(IERC20::decimalsCall::SELECTOR) {
            IERC20::decimalsCall::abi_encode_returns(&(18u8,))
        } else if is(IERC20::totalSupplyCall::SELECTOR) {
            IERC20::totalSupplyCall::abi_encode_returns(&(ether(1_000_000),))
        } else if is(IERC20::balanceOfCall::SELECTOR) {
            let balance = self.balances.get(&to).copied().unwrap_or_default();
            IERC20::balanceOfCall::abi_encode_returns(&(balance,))
        } else if is(IERC20::allowanceCall::SELECTOR) {
            IERC20::allowanceCall::abi_encode_returns(&(ether(1_000_000_000),))
        } else if is(IVaultToken::reserveTokenCall::SELECTOR)
            && to == TOKEN
            && matches!(self.kind, Kind::Vault)
        {
            IVaultToken::reserveTokenCall::abi_encode_returns(&(RESERVE,))
        } else if is(IVaultToken::totalReserveCall::SELECTOR) {
            IVaultToken::totalReserveCall::abi_encode_returns(&(ether(42),))
        } else if is(IElasticToken::referenceTokenCall::SELECTOR)
            && to == TOKEN
            && matches!(self.kind, Kind::Elastic)
        {
            IElasticToken::referenceTokenCall::abi_encode_returns(&(REFERENCE,))
        } else if is(IElasticToken::scalingFactorCall::SELECTOR) {
            IElasticToken::scalingFactorCall::abi_encode_returns(&(ether(1),))
        } else if is(IElasticToken::lastExchangeRateCall::SELECTOR)
            || is(IElasticToken::currentExchangeRateCall::SELECTOR)
        {
            *self.rate_reads.lock().unwrap() += 1;
            if let Some(error) = &self.rate_error {
                return Err(error.clone());
            }
            IElasticToken::lastExchangeRateCall::abi_encode_returns(&(ether(2),))
        } else if is(IElasticToken::rebaseAvailableCall::SELECTOR) {
            IElasticToken::rebaseAvailableCall::abi_encode_returns(&(true,))
        } else {
            return Err(ChainError::Reverted("function not found".into()));
        };
        Ok(data)
    }
}

#[async_trait]
impl Chain for MockChain {
    fn account(&self) -> Address {
        ACCOUNT
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| ChainError::Decode("short calldata".into()))?;
        self.read(to, selector).map(Bytes::from)
    }

    async fn estimate_gas(&self, _tx: &TxRequest) -> Result<U256, ChainError> {
        Ok(U256::from(60_000u64))
    }

    async fn send(&self, tx: &TxRequest) -> Result<TransactionReceipt, ChainError> {
        let mut sent = self.sent.lock().unwrap();
        let index = sent.len();
        let selector: [u8; 4] = tx.data[..4].try_into().unwrap();
        sent.push(Sent {
            to: tx.to,
            selector,
            value: tx.value,
        });
        if (self.fail_send)(index) {
            return Err(ChainError::Reverted("mock revert".into()));
        }
        let status = if (self.failed_receipt)(selector) { 0u64 } else { 1 };
        Ok(TransactionReceipt {
            transaction_hash: B256::with_last_byte(index as u8),
            status: Some(U256::from(status)),
            gas_used: U256::from(50_000u64),
        })
    }

    async fn native_balance(&self, _owner: Address) -> Result<U256, ChainError> {
        Ok(ether(100))
    }
}

#[derive(Default)]
struct MockClock {
    fail: bool,
    advances: Mutex<Vec<u64>>,
    mined: Mutex<usize>,
}

#[async_trait]
impl Clock for MockClock {
    async fn advance_time(&self, seconds: u64) -> Result<(), ChainError> {
        if self.fail {
            return Err(ChainError::Transport("node went away".into()));
        }
        self.advances.lock().unwrap().push(seconds);
        Ok(())
    }

    async fn mine_block(&self) -> Result<(), ChainError> {
        *self.mined.lock().unwrap() += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config(iterations: u64) -> HarnessConfig {
    let mut config = HarnessConfig::new(
        Network::Development,
        "http://localhost:8545/",
        Credential::from_hex(&"01".repeat(32)).unwrap(),
        AddressBook::new(Network::Development),
    );
    config.driver.max_iterations = iterations;
    config.driver.seed = Some(7);
    config.setup.enabled = false;
    config
}

async fn resolve(chain: &Arc<MockChain>, config: &HarnessConfig) -> Token {
    Token::resolve(chain.clone(), TOKEN, config.rate_policy)
        .await
        .unwrap()
}

async fn driver(chain: &Arc<MockChain>, config: &HarnessConfig) -> Driver {
    let token = resolve(chain, config).await;
    let exchange = Exchange::new(chain.clone(), EXCHANGE);
    Driver::new(config, token, Some(exchange), DriverMetrics::new().unwrap())
}

async fn driver_without_exchange(chain: &Arc<MockChain>, config: &HarnessConfig) -> Driver {
    let token = resolve(chain, config).await;
    Driver::new(config, token, None, DriverMetrics::new().unwrap())
}

fn picks(driver: &Driver, action: Action) -> u64 {
    ["executed", "skipped", "failed"]
        .into_iter()
        .map(|outcome| {
            driver
                .metrics()
                .actions_total
                .with_label_values(&[action.label(), outcome])
                .get()
        })
        .sum()
}

// ---------------------------------------------------------------------------
// Token resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resolution_selects_capability() {
    let vault = Token::resolve(Arc::new(MockChain::new(Kind::Vault)), TOKEN, RatePolicy::default())
        .await
        .unwrap();
    assert_eq!(vault.reserve_token().unwrap().symbol(), "RSV");
    assert!(vault.reference_token().is_none());

    let elastic = Token::resolve(
        Arc::new(MockChain::new(Kind::Elastic)),
        TOKEN,
        RatePolicy::default(),
    )
    .await
    .unwrap();
    assert_eq!(elastic.reference_token().unwrap().symbol(), "REF");
    assert!(elastic.as_vault().is_none());

    let base = Token::resolve(Arc::new(MockChain::new(Kind::Base)), TOKEN, RatePolicy::default())
        .await
        .unwrap();
    assert!(matches!(base, Token::Base(_)));
    assert_eq!(base.base().symbol(), "rTKN");
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[tokio::test]
async fn catalog_matches_capability() {
    let config = config(0);

    let base = resolve(&Arc::new(MockChain::new(Kind::Base)), &config).await;
    assert!(catalog(&base).is_empty());

    let vault = resolve(&Arc::new(MockChain::new(Kind::Vault)), &config).await;
    assert_eq!(
        catalog(&vault),
        vec![
            Action::Deposit,
            Action::DepositAll,
            Action::Withdraw,
            Action::WithdrawAll
        ]
    );

    let elastic = resolve(&Arc::new(MockChain::new(Kind::Elastic)), &config).await;
    assert_eq!(
        catalog(&elastic),
        vec![
            Action::Rebase,
            Action::Buy,
            Action::BuyAll,
            Action::Sell,
            Action::SellAll
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn actions_are_picked_uniformly() {
    let chain = Arc::new(MockChain::new(Kind::Elastic));
    let config = config(500);
    let mut driver = driver(&chain, &config).await;

    driver.run().await.unwrap();

    let counts: Vec<u64> = Action::ELASTIC
        .into_iter()
        .map(|action| picks(&driver, action))
        .collect();
    assert_eq!(counts.iter().sum::<u64>(), 500);
    for count in counts {
        assert!((50..=150).contains(&count), "skewed selection: {count}");
    }
    for action in Action::VAULT {
        assert_eq!(picks(&driver, action), 0);
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn every_iteration_runs_even_when_every_action_fails() {
    let chain = Arc::new(
        MockChain::new(Kind::Elastic)
            .balance(TOKEN, ether(5))
            .balance(REFERENCE, ether(5))
            .failing_sends(|_| true),
    );
    let config = config(20);
    let mut driver = driver(&chain, &config).await;

    let report = driver.run().await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.iterations, 20);
    assert_eq!(report.executed, 0);
    assert_eq!(report.failed, 20);
    assert_eq!(chain.selectors().len(), 20);

    let text = driver.metrics().encode().unwrap();
    assert!(text.contains("elastic_stress_iterations_total 20"));
    assert!(text.contains(r#"outcome="failed""#));
}

#[tokio::test(start_paused = true)]
async fn failure_does_not_stop_the_next_iteration() {
    let chain = Arc::new(
        MockChain::new(Kind::Vault)
            .balance(TOKEN, ether(3))
            .balance(RESERVE, ether(3))
            .failing_sends(|n| n % 2 == 1),
    );
    let config = config(10);
    let mut driver = driver(&chain, &config).await;

    let report = driver.run().await.unwrap();
    assert_eq!(report.iterations, 10);
    assert_eq!(report.executed, 5);
    assert_eq!(report.failed, 5);

    let vault_methods = [
        IVaultToken::depositCall::SELECTOR,
        IVaultToken::withdrawCall::SELECTOR,
    ];
    assert!(chain
        .selectors()
        .iter()
        .all(|s| vault_methods.contains(s)));
}

#[tokio::test(start_paused = true)]
async fn zero_balances_are_skipped() {
    let chain = Arc::new(MockChain::new(Kind::Vault).failing_sends(|_| true));
    let config = config(8);
    let mut driver = driver(&chain, &config).await;

    let report = driver.run().await.unwrap();
    assert_eq!(report.iterations, 8);
    assert_eq!(report.skipped, 8);
    assert!(chain.selectors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn plain_token_has_nothing_to_fuzz() {
    let chain = Arc::new(MockChain::new(Kind::Base));
    let mut config = config(50);
    config.setup.enabled = true;
    let mut driver = driver(&chain, &config).await;

    let report = driver.run().await.unwrap();
    assert_eq!(report.outcome, RunOutcome::NoActionsAvailable);
    assert_eq!(report.iterations, 0);
    assert!(chain.selectors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn seeded_runs_are_reproducible() {
    let mut runs = Vec::new();
    for _ in 0..2 {
        let chain = Arc::new(
            MockChain::new(Kind::Elastic)
                .balance(TOKEN, ether(1))
                .balance(REFERENCE, ether(1)),
        );
        let config = config(15);
        let mut driver = driver(&chain, &config).await;
        driver.run().await.unwrap();
        runs.push(chain.selectors());
    }
    assert_eq!(runs[0], runs[1]);
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn clock_advances_once_per_iteration() {
    let chain = Arc::new(MockChain::new(Kind::Vault));
    let clock = Arc::new(MockClock::default());
    let config = config(12);
    let mut driver = driver(&chain, &config).await.with_clock(clock.clone());

    driver.run().await.unwrap();
    let advances = clock.advances.lock().unwrap();
    assert_eq!(advances.len(), 12);
    assert!(advances.iter().all(|&s| s < 24 * 60 * 60));
    assert_eq!(*clock.mined.lock().unwrap(), 12);
}

#[tokio::test(start_paused = true)]
async fn clock_failure_is_contained() {
    let chain = Arc::new(MockChain::new(Kind::Vault).balance(RESERVE, ether(1)));
    let clock = Arc::new(MockClock {
        fail: true,
        ..Default::default()
    });
    let config = config(4);
    let mut driver = driver(&chain, &config).await.with_clock(clock);

    let report = driver.run().await.unwrap();
    assert_eq!(report.iterations, 4);
    assert_eq!(report.failed, 4);
    assert!(chain.selectors().is_empty());
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn elastic_setup_mints_and_configures_rebase() {
    let chain = Arc::new(MockChain::new(Kind::Elastic));
    let mut config = config(0);
    config.setup.enabled = true;
    let mut driver = driver(&chain, &config).await;

    driver.run().await.unwrap();

    assert_eq!(
        chain.selectors(),
        vec![
            IExchange::faucetCall::SELECTOR,
            IElasticToken::setRebaseMinimumDeviationCall::SELECTOR,
            IElasticToken::setRebaseDampeningFactorCall::SELECTOR,
            IElasticToken::setRebaseTreasuryMintPercentCall::SELECTOR,
            IElasticToken::setRebaseTimingParametersCall::SELECTOR,
        ]
    );
    let sent = chain.sent.lock().unwrap();
    assert_eq!(sent[0].to, EXCHANGE);
    assert_eq!(sent[0].value, ether(1));
    assert!(sent[1..].iter().all(|s| s.to == TOKEN));
}

#[tokio::test(start_paused = true)]
async fn vault_setup_approves_then_mints_reserve() {
    let chain = Arc::new(MockChain::new(Kind::Vault));
    let mut config = config(0);
    config.setup.enabled = true;
    let mut driver = driver(&chain, &config).await;

    driver.run().await.unwrap();

    assert_eq!(
        chain.selectors(),
        vec![IERC20::approveCall::SELECTOR, IExchange::faucetCall::SELECTOR]
    );
    assert_eq!(chain.sent.lock().unwrap()[0].to, RESERVE);
}

#[tokio::test(start_paused = true)]
async fn setup_failure_is_fatal() {
    let chain = Arc::new(MockChain::new(Kind::Vault).failing_sends(|_| true));
    let mut config = config(10);
    config.setup.enabled = true;
    let mut driver = driver(&chain, &config).await;

    let err = driver.run().await.unwrap_err();
    assert!(matches!(
        err,
        DriverError::Setup(TokenError::TransactionReverted { .. })
    ));
    assert_eq!(chain.selectors().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_approval_receipt_aborts_setup() {
    let chain = Arc::new(
        MockChain::new(Kind::Vault).failing_receipts(IERC20::approveCall::SELECTOR),
    );
    let mut config = config(10);
    config.setup.enabled = true;
    let mut driver = driver(&chain, &config).await;

    let err = driver.run().await.unwrap_err();
    assert!(matches!(
        err,
        DriverError::Setup(TokenError::TransactionReverted { .. })
    ));
    assert_eq!(chain.selectors(), vec![IERC20::approveCall::SELECTOR]);
}

#[tokio::test(start_paused = true)]
async fn failed_approval_receipt_blocks_the_swap() {
    let chain = Arc::new(
        MockChain::new(Kind::Elastic)
            .balance(TOKEN, ether(5))
            .balance(REFERENCE, ether(5))
            .failing_receipts(IERC20::approveCall::SELECTOR),
    );
    let config = config(30);
    let mut driver = driver(&chain, &config).await;

    let report = driver.run().await.unwrap();
    let selectors = chain.selectors();
    assert!(!selectors.contains(&IExchange::directCall::SELECTOR));

    let swaps = selectors
        .iter()
        .filter(|s| **s == IERC20::approveCall::SELECTOR)
        .count() as u64;
    assert!(swaps > 0);
    assert_eq!(report.failed, swaps);
}

// ---------------------------------------------------------------------------
// Exchange requirement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn exchange_requirement_follows_token_and_setup() {
    let mut config = config(0);
    let vault = resolve(&Arc::new(MockChain::new(Kind::Vault)), &config).await;
    let elastic = resolve(&Arc::new(MockChain::new(Kind::Elastic)), &config).await;
    let base = resolve(&Arc::new(MockChain::new(Kind::Base)), &config).await;

    assert!(!needs_exchange(&vault, &config.setup));
    assert!(needs_exchange(&elastic, &config.setup));
    assert!(!needs_exchange(&base, &config.setup));

    config.setup.enabled = true;
    assert!(needs_exchange(&vault, &config.setup));
}

#[tokio::test(start_paused = true)]
async fn vault_without_setup_runs_without_exchange() {
    let chain = Arc::new(
        MockChain::new(Kind::Vault)
            .balance(TOKEN, ether(2))
            .balance(RESERVE, ether(2)),
    );
    let config = config(6);
    let mut driver = driver_without_exchange(&chain, &config).await;

    let report = driver.run().await.unwrap();
    assert_eq!(report.iterations, 6);
    assert!(chain.sent.lock().unwrap().iter().all(|s| s.to != EXCHANGE));
}

#[tokio::test(start_paused = true)]
async fn elastic_without_exchange_is_fatal() {
    let chain = Arc::new(MockChain::new(Kind::Elastic));
    let config = config(6);
    let mut driver = driver_without_exchange(&chain, &config).await;

    let err = driver.run().await.unwrap_err();
    assert!(matches!(err, DriverError::MissingExchange(_)));
    assert!(chain.selectors().is_empty());
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[tokio::test]
async fn snapshot_reports_unknown_rates_on_revert() {
    let chain = Arc::new(
        MockChain::new(Kind::Elastic).rate_error(ChainError::Reverted("not implemented".into())),
    );
    let driver = driver(&chain, &config(0)).await;

    let snapshot = driver.snapshot().await.unwrap();
    assert_eq!(snapshot.scaling_factor.as_deref(), Some("1"));
    assert_eq!(snapshot.last_exchange_rate, None);
    assert_eq!(snapshot.current_exchange_rate, None);
    assert_eq!(snapshot.total_reserve, None);
    assert_eq!(snapshot.native_balance, "100");
    assert_eq!(*chain.rate_reads.lock().unwrap(), 2);
}

#[tokio::test]
async fn transient_rate_failures_are_retried_then_unknown() {
    let chain = Arc::new(
        MockChain::new(Kind::Elastic).rate_error(ChainError::Transport("timeout".into())),
    );
    let mut config = config(0);
    config.rate_policy = RatePolicy { retries: 2 };
    let driver = driver(&chain, &config).await;

    let snapshot = driver.snapshot().await.unwrap();
    assert_eq!(snapshot.last_exchange_rate, None);
    assert_eq!(snapshot.current_exchange_rate, None);
    assert_eq!(*chain.rate_reads.lock().unwrap(), 6);
}

#[tokio::test]
async fn vault_snapshot_scales_reserve() {
    let chain = Arc::new(MockChain::new(Kind::Vault).balance(RESERVE, ether(3) / U256::from(2u64)));
    let driver = driver(&chain, &config(0)).await;

    let snapshot = driver.snapshot().await.unwrap();
    assert_eq!(snapshot.total_reserve.as_deref(), Some("42"));
    assert_eq!(snapshot.reserve_balance.as_deref(), Some("1.5"));
    assert_eq!(snapshot.token_balance, "0");
    assert_eq!(snapshot.reference_balance, None);
}
