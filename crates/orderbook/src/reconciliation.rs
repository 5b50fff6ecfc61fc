//! Periodic comparison of the off-chain ledger against authoritative
//! on-chain balances.

use {
    anyhow::{ensure, Context, Result},
    chrono::{DateTime, Utc},
    ledger::Ledger,
    primitive_types::{H160, U256},
    std::{
        collections::VecDeque,
        sync::{Arc, Mutex, MutexGuard},
        time::Duration,
    },
};

/// Relative deviations are measured in parts per million so the comparison
/// stays in integer arithmetic.
pub const PPM: u64 = 1_000_000;

/// Authoritative balance source, injected so the engine never talks to a
/// chain directly.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BalanceLookup: Send + Sync {
    async fn on_chain_balance(&self, user: H160, token_id: U256) -> Result<U256>;
}

/// Dry-run stand-in that mirrors the ledger itself, for deployments without
/// a configured chain endpoint.
pub struct LedgerMirrorLookup(pub Arc<Ledger>);

#[async_trait::async_trait]
impl BalanceLookup for LedgerMirrorLookup {
    async fn on_chain_balance(&self, user: H160, token_id: U256) -> Result<U256> {
        Ok(self.0.get_balance(user, token_id).total())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub interval: Duration,
    /// Flag rows deviating by more than this many parts per million
    /// (default 100 = 0.01%).
    pub threshold_ppm: u64,
    /// How many run reports to retain.
    pub history: usize,
    /// Pause after this many consecutive discrepant runs.
    pub pause_after: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            threshold_ppm: 100,
            history: 100,
            pause_after: 3,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Discrepancy {
    pub user: H160,
    pub token_id: U256,
    pub off_chain: U256,
    pub on_chain: U256,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub at: DateTime<Utc>,
    pub checked: usize,
    pub lookup_failures: usize,
    pub discrepancies: Vec<Discrepancy>,
}

#[derive(Debug, Default)]
struct State {
    history: VecDeque<RunReport>,
    consecutive_discrepant: u32,
    paused: bool,
}

pub struct Reconciler {
    ledger: Arc<Ledger>,
    lookup: Arc<dyn BalanceLookup>,
    config: Config,
    state: Mutex<State>,
}

impl Reconciler {
    pub fn new(ledger: Arc<Ledger>, lookup: Arc<dyn BalanceLookup>, config: Config) -> Result<Self> {
        ensure!(
            config.interval >= Duration::from_secs(1),
            "reconciliation interval must be at least one second"
        );
        ensure!(
            config.threshold_ppm > 0 && config.threshold_ppm <= PPM,
            "threshold must be within (0, 1]"
        );
        Ok(Self {
            ledger,
            lookup,
            config,
            state: Default::default(),
        })
    }

    /// Compares every ledger row against the on-chain source once. Lookup
    /// failures are counted but do not flag the row.
    pub async fn run_once(&self) -> RunReport {
        let rows = self.ledger.balances();
        let mut report = RunReport {
            at: Utc::now(),
            checked: 0,
            lookup_failures: 0,
            discrepancies: Vec::new(),
        };
        for (user, token_id, balance) in rows {
            let on_chain = match self
                .lookup
                .on_chain_balance(user, token_id)
                .await
                .with_context(|| format!("lookup failed for {user:?}/{token_id}"))
            {
                Ok(balance) => balance,
                Err(err) => {
                    tracing::warn!(?err, "balance lookup failed");
                    report.lookup_failures += 1;
                    continue;
                }
            };
            report.checked += 1;
            let off_chain = balance.total();
            if exceeds_threshold(off_chain, on_chain, self.config.threshold_ppm) {
                tracing::warn!(
                    ?user,
                    %token_id,
                    %off_chain,
                    %on_chain,
                    "balance discrepancy"
                );
                report.discrepancies.push(Discrepancy {
                    user,
                    token_id,
                    off_chain,
                    on_chain,
                });
            }
        }

        let mut state = self.state();
        if report.discrepancies.is_empty() {
            state.consecutive_discrepant = 0;
        } else {
            state.consecutive_discrepant += 1;
            if state.consecutive_discrepant >= self.config.pause_after && !state.paused {
                state.paused = true;
                tracing::error!(
                    runs = state.consecutive_discrepant,
                    "sustained discrepancies, pausing reconciliation"
                );
            }
        }
        state.history.push_back(report.clone());
        while state.history.len() > self.config.history {
            state.history.pop_front();
        }
        report
    }

    /// Healthy means the most recent run saw no discrepancies and the task
    /// is not paused. No runs yet counts as healthy.
    pub fn is_healthy(&self) -> bool {
        let state = self.state();
        !state.paused
            && state
                .history
                .back()
                .map(|report| report.discrepancies.is_empty())
                .unwrap_or(true)
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    /// Operator acknowledgement; clears the pause and the discrepancy streak.
    pub fn resume(&self) {
        let mut state = self.state();
        state.paused = false;
        state.consecutive_discrepant = 0;
    }

    pub fn history(&self) -> Vec<RunReport> {
        self.state().history.iter().cloned().collect()
    }

    pub async fn run_forever(self: Arc<Self>) -> ! {
        let mut interval = tokio::time::interval(self.config.interval);
        loop {
            interval.tick().await;
            if self.is_paused() {
                continue;
            }
            let report = self.run_once().await;
            tracing::debug!(
                checked = report.checked,
                discrepancies = report.discrepancies.len(),
                "reconciliation run"
            );
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }
}

/// `|off - on| / on > threshold`, evaluated as
/// `|off - on| * PPM > threshold * on` to stay integral. A zero on-chain
/// balance flags any non zero off-chain value.
fn exceeds_threshold(off_chain: U256, on_chain: U256, threshold_ppm: u64) -> bool {
    let difference = if off_chain > on_chain {
        off_chain - on_chain
    } else {
        on_chain - off_chain
    };
    if on_chain.is_zero() {
        return !difference.is_zero();
    }
    difference.full_mul(PPM.into()) > on_chain.full_mul(threshold_ppm.into())
}
