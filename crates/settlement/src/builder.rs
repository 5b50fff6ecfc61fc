use {
    crate::{
        chain::{ChainSink, TxId},
        merkle::MerkleTree,
        Error,
    },
    chrono::{DateTime, Utc},
    model::{
        order::Order,
        trade::{MatchType, Trade},
    },
    num::{BigInt, Signed},
    number::{conversions::big_int_to_u256, u256_ext::U256Ext},
    primitive_types::{H160, H256, U256},
    serde::Serialize,
    std::{
        collections::{BTreeMap, HashMap, HashSet, VecDeque},
        sync::{Arc, Mutex, MutexGuard},
        time::Duration,
    },
};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// At most this many trades per epoch.
    pub batch_size: usize,
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 100,
            retry: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Committed,
    Settled,
    Failed,
}

/// What a user needs to claim their credit on chain.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimProof {
    pub amount: U256,
    pub path: Vec<H256>,
}

#[derive(Debug, Clone)]
pub struct SettlementBatch {
    pub epoch_id: u64,
    pub trades: Vec<Trade>,
    /// Signed collateral delta per user over the batch's trades.
    pub deltas: HashMap<H160, BigInt>,
    /// Sum of all positive deltas; what the epoch makes claimable.
    pub total: U256,
    pub merkle_root: H256,
    pub proofs: HashMap<H160, ClaimProof>,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
    /// `(trade id, error)` for trades the chain sink rejected.
    pub failures: Vec<(u64, String)>,
}

#[derive(Debug, Default)]
struct State {
    pending: VecDeque<Trade>,
    /// Signed orders by hash, so settlement can hand the original pair to
    /// the chain.
    // TODO: drop order records once no pending trade or unsettled batch
    // references them.
    orders: HashMap<H256, Order>,
    cancelled: HashSet<H256>,
    batches: BTreeMap<u64, SettlementBatch>,
    current_epoch: u64,
}

pub struct SettlementBuilder {
    config: Config,
    sink: Arc<dyn ChainSink>,
    state: Mutex<State>,
}

impl SettlementBuilder {
    pub fn new(config: Config, sink: Arc<dyn ChainSink>) -> Self {
        Self {
            config,
            sink,
            state: Default::default(),
        }
    }

    /// Stores a signed order for later on-chain execution of its fills.
    pub fn register_order(&self, hash: H256, order: Order) {
        self.state().orders.insert(hash, order);
    }

    pub fn enqueue_trade(&self, trade: Trade) {
        self.state().pending.push_back(trade);
    }

    /// Trades referencing this order hash are excluded from every future
    /// cut. Marking is idempotent.
    pub fn mark_cancelled(&self, order_hash: H256) {
        self.state().cancelled.insert(order_hash);
    }

    pub fn pending_trades(&self) -> usize {
        self.state().pending.len()
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    /// Cuts an epoch: drains up to the configured number of trades, nets
    /// the collateral deltas per user and commits the positive side into a
    /// Merkle tree. Returns `None` when there is nothing to settle.
    pub fn create_batch(&self) -> Result<Option<SettlementBatch>, Error> {
        let mut state = self.state();
        let take = state.pending.len().min(self.config.batch_size);
        if take == 0 {
            return Ok(None);
        }
        let drained: Vec<Trade> = state.pending.drain(..take).collect();
        let before = drained.len();
        let trades: Vec<Trade> = drained
            .into_iter()
            .filter(|trade| {
                !state.cancelled.contains(&trade.taker_order)
                    && !state.cancelled.contains(&trade.maker_order)
            })
            .collect();
        if trades.len() < before {
            tracing::info!(
                excluded = before - trades.len(),
                "dropped trades referencing cancelled orders"
            );
        }

        let mut deltas: HashMap<H160, BigInt> = HashMap::new();
        for trade in &trades {
            let cost = trade
                .price
                .full_mul_div(&trade.amount, &number::one())
                .ok_or(Error::Math)?;
            let cost = number::conversions::u256_to_big_int(&cost);
            *deltas.entry(trade.maker).or_default() -= &cost;
            *deltas.entry(trade.taker).or_default() += &cost;
        }
        let leaves: Vec<(H160, U256)> = deltas
            .iter()
            .filter(|(_, delta)| delta.is_positive())
            .map(|(user, delta)| Ok((*user, big_int_to_u256(delta).map_err(|_| Error::Math)?)))
            .collect::<Result<_, Error>>()?;
        if leaves.is_empty() {
            if !trades.is_empty() {
                tracing::warn!(
                    trades = trades.len(),
                    "cut aborted: no positive credits in batch"
                );
            }
            return Ok(None);
        }
        let total = leaves
            .iter()
            .try_fold(U256::zero(), |acc, (_, amount)| acc.checked_add(*amount))
            .ok_or(Error::Math)?;

        let tree = MerkleTree::new(leaves.iter().copied())?;
        let proofs = leaves
            .iter()
            .map(|&(user, amount)| {
                // Every leaf is in the tree it was just built from.
                let path = tree.proof(user, amount).expect("leaf is in tree");
                (user, ClaimProof { amount, path })
            })
            .collect();

        state.current_epoch += 1;
        let batch = SettlementBatch {
            epoch_id: state.current_epoch,
            trades,
            deltas,
            total,
            merkle_root: tree.root(),
            proofs,
            status: BatchStatus::Pending,
            created_at: Utc::now(),
            failures: Vec::new(),
        };
        tracing::info!(
            epoch = batch.epoch_id,
            trades = batch.trades.len(),
            total = %batch.total,
            root = ?batch.merkle_root,
            "cut settlement epoch"
        );
        state.batches.insert(batch.epoch_id, batch.clone());
        Ok(Some(batch))
    }

    /// Commits the epoch root to the chain sink, retrying transient
    /// failures with exponential backoff. Exhausting the retries marks the
    /// batch failed; that never unwinds ledger state.
    pub async fn commit(&self, epoch_id: u64) -> Result<TxId, Error> {
        let (root, total) = {
            let state = self.state();
            let batch = state.batches.get(&epoch_id).ok_or(Error::UnknownEpoch(epoch_id))?;
            if batch.status != BatchStatus::Pending {
                return Err(Error::InvalidStatus(epoch_id));
            }
            (batch.merkle_root, batch.total)
        };

        let mut attempt = 0;
        let mut delay = self.config.retry.base_delay;
        loop {
            match self.sink.commit_epoch(root, total).await {
                Ok(tx) => {
                    self.set_status(epoch_id, BatchStatus::Committed);
                    tracing::info!(epoch = epoch_id, ?tx, "epoch committed");
                    return Ok(tx);
                }
                Err(err) if attempt < self.config.retry.max_retries => {
                    attempt += 1;
                    tracing::warn!(epoch = epoch_id, ?err, attempt, "commit failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.config.retry.max_delay);
                }
                Err(err) => {
                    self.set_status(epoch_id, BatchStatus::Failed);
                    tracing::error!(epoch = epoch_id, ?err, "commit failed permanently");
                    return Err(Error::CommitFailed(err));
                }
            }
        }
    }

    /// Hands every trade's original order pair to the chain sink, grouped
    /// by match type. All trades succeeding settles the batch, all failing
    /// fails it, anything in between leaves it committed with the failures
    /// recorded for the operator.
    pub async fn execute(&self, epoch_id: u64) -> Result<BatchStatus, Error> {
        let executions = {
            let state = self.state();
            let batch = state.batches.get(&epoch_id).ok_or(Error::UnknownEpoch(epoch_id))?;
            if batch.status != BatchStatus::Committed {
                return Err(Error::InvalidStatus(epoch_id));
            }
            let mut executions = Vec::with_capacity(batch.trades.len());
            for trade in &batch.trades {
                let taker = lookup_order(&state, trade.taker_order)?;
                let maker = lookup_order(&state, trade.maker_order)?;
                executions.push((trade.clone(), taker, maker));
            }
            executions
        };

        let mut failures = Vec::new();
        let mut settled = 0usize;
        for match_type in [MatchType::Complementary, MatchType::Mint, MatchType::Merge] {
            for (trade, taker, maker) in executions
                .iter()
                .filter(|(trade, _, _)| trade.match_type == match_type)
            {
                let result = self
                    .sink
                    .match_orders(
                        taker.clone(),
                        vec![maker.clone()],
                        trade.amount,
                        vec![trade.amount],
                    )
                    .await;
                match result {
                    Ok(_) => settled += 1,
                    Err(err) => {
                        tracing::warn!(trade = trade.id, ?err, "trade execution failed");
                        failures.push((trade.id, err.to_string()));
                    }
                }
            }
        }

        let status = if failures.is_empty() {
            BatchStatus::Settled
        } else if settled == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::Committed
        };
        let mut state = self.state();
        if let Some(batch) = state.batches.get_mut(&epoch_id) {
            batch.status = status;
            batch.failures = failures;
        }
        Ok(status)
    }

    pub fn get_batch(&self, epoch_id: u64) -> Option<SettlementBatch> {
        self.state().batches.get(&epoch_id).cloned()
    }

    pub fn batches(&self) -> Vec<SettlementBatch> {
        self.state().batches.values().cloned().collect()
    }

    pub fn get_proof(&self, epoch_id: u64, user: H160) -> Option<ClaimProof> {
        self.state()
            .batches
            .get(&epoch_id)?
            .proofs
            .get(&user)
            .cloned()
    }

    /// Epochs in which the user has a credit leaf.
    pub fn unclaimed_epochs(&self, user: H160) -> Vec<u64> {
        self.state()
            .batches
            .values()
            .filter(|batch| batch.proofs.contains_key(&user))
            .map(|batch| batch.epoch_id)
            .collect()
    }

    fn set_status(&self, epoch_id: u64, status: BatchStatus) {
        if let Some(batch) = self.state().batches.get_mut(&epoch_id) {
            batch.status = status;
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }
}

fn lookup_order(state: &State, hash: H256) -> Result<Order, Error> {
    state
        .orders
        .get(&hash)
        .cloned()
        .ok_or(Error::MissingOrder(hash))
}
