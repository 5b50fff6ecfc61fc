use {
    chrono::Utc,
    dashmap::DashMap,
    events::{BalanceData, Broadcaster, Event, OrderData, PriceData},
    ledger::Ledger,
    matching::{MatchResult, MatchingEngine},
    model::{
        order::{Order, Side},
        trade::Trade,
        DomainSeparator,
    },
    number::u256_ext::U256Ext,
    primitive_types::{H160, H256, U256},
    risk::RiskEngine,
    serde::Serialize,
    settlement::SettlementBuilder,
    std::sync::Arc,
    tokio::sync::{Mutex, Notify},
};

/// Machine readable rejection reasons, stable across the wire.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCode {
    InvalidSignature,
    InvalidNonce,
    InsufficientBalance,
    OrderExpired,
    RiskLimitExceeded,
    OrderNotFound,
    OrderNotOwned,
    InvalidOrder,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub code: RejectionCode,
    pub details: String,
}

impl Rejection {
    fn new(code: RejectionCode, details: impl Into<String>) -> Self {
        Self {
            code,
            details: details.into(),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Accepted {
    pub order_hash: H256,
    pub trades: Vec<Trade>,
    /// Outcome tokens left resting; zero means the order filled completely.
    pub remaining_size: U256,
}

/// The order service: runs every submission through the validation pipeline
/// and orchestrates the engine, risk accounting, settlement queue and event
/// fan-out behind it.
pub struct Orderbook {
    domain_separator: DomainSeparator,
    ledger: Arc<Ledger>,
    risk: Arc<RiskEngine>,
    matching: Arc<MatchingEngine>,
    settlement: Arc<SettlementBuilder>,
    broadcaster: Arc<Broadcaster>,
    /// Full batches should be cut before the timer fires.
    batch_ready: Arc<Notify>,
    /// Serializes the validation-to-lock sequence per maker so concurrent
    /// submissions cannot both act on the same nonce and balance reads.
    submission_locks: DashMap<H160, Arc<Mutex<()>>>,
}

impl Orderbook {
    pub fn new(
        domain_separator: DomainSeparator,
        ledger: Arc<Ledger>,
        risk: Arc<RiskEngine>,
        matching: Arc<MatchingEngine>,
        settlement: Arc<SettlementBuilder>,
        broadcaster: Arc<Broadcaster>,
        batch_ready: Arc<Notify>,
    ) -> Self {
        Self {
            domain_separator,
            ledger,
            risk,
            matching,
            settlement,
            broadcaster,
            batch_ready,
            submission_locks: Default::default(),
        }
    }

    /// The validation pipeline, in strict order: signature, nonce, balance,
    /// risk limits, expiration, then the matching engine. The first failing
    /// step rejects the order.
    pub async fn add_order(&self, order: Order) -> Result<Accepted, Rejection> {
        let maker_lock = self.submission_lock(order.maker);
        let _guard = maker_lock.lock().await;

        if !order.verify_signature(&self.domain_separator) {
            return Err(Rejection::new(
                RejectionCode::InvalidSignature,
                "signature does not recover to the maker",
            ));
        }
        let current_nonce = self.ledger.get_nonce(order.maker);
        if order.nonce != current_nonce {
            return Err(Rejection::new(
                RejectionCode::InvalidNonce,
                format!("order nonce {} != current nonce {current_nonce}", order.nonce),
            ));
        }
        let funding_token = match order.side {
            Side::Buy => ledger::collateral_token(),
            Side::Sell => order.token_id,
        };
        if !self
            .ledger
            .has_sufficient(order.maker, funding_token, order.maker_amount)
        {
            return Err(Rejection::new(
                RejectionCode::InsufficientBalance,
                "available balance does not cover the maker amount",
            ));
        }
        self.risk
            .validate_order(order.maker, order.maker_amount, Utc::now())
            .map_err(|err| Rejection::new(RejectionCode::RiskLimitExceeded, err.to_string()))?;
        if order.is_expired(Utc::now().timestamp() as u64) {
            return Err(Rejection::new(
                RejectionCode::OrderExpired,
                "expiration is in the past",
            ));
        }

        let result = self.matching.add_order(order.clone()).map_err(|err| {
            match err {
                matching::Error::InsufficientBalance => {
                    Rejection::new(RejectionCode::InsufficientBalance, err.to_string())
                }
                matching::Error::InvalidOrder => {
                    Rejection::new(RejectionCode::InvalidOrder, err.to_string())
                }
                matching::Error::Ledger(ref inner) => {
                    // The book accepted a fill the ledger would not settle;
                    // this cannot happen while the funding invariant holds.
                    tracing::error!(?err, ?inner, "ledger rejected a matched fill");
                    Rejection::new(RejectionCode::InvalidOrder, err.to_string())
                }
                matching::Error::OrderNotFound | matching::Error::NotOwner => {
                    Rejection::new(RejectionCode::InvalidOrder, err.to_string())
                }
            }
        })?;

        self.settlement.register_order(result.order_hash, order.clone());
        self.risk
            .record_order(order.maker, result.order_hash, order.maker_amount, Utc::now());
        // Exposure only covers what is still resting on the book.
        let still_locked = self
            .matching
            .get_entry(result.order_hash)
            .map(|entry| entry.remaining)
            .unwrap_or_default();
        let released = order.maker_amount.saturating_sub(still_locked);
        if !released.is_zero() {
            self.risk
                .release_order(order.maker, result.order_hash, released);
        }

        self.publish_submission_events(&order, &result);
        for trade in &result.trades {
            // The resting maker's exposure shrinks by the funding each fill
            // consumed: tokens for a sell, collateral for a buy.
            let maker_released = match order.side {
                Side::Buy => trade.amount,
                Side::Sell => trade
                    .price
                    .full_mul_div(&trade.amount, &number::one())
                    .unwrap_or_default(),
            };
            if !maker_released.is_zero() {
                self.risk
                    .release_order(trade.maker, trade.maker_order, maker_released);
            }
            self.settlement.enqueue_trade(trade.clone());
        }
        if self.settlement.pending_trades() >= self.settlement.batch_size() {
            self.batch_ready.notify_one();
        }

        tracing::info!(
            order = ?result.order_hash,
            maker = ?order.maker,
            fills = result.trades.len(),
            "order accepted"
        );
        Ok(Accepted {
            order_hash: result.order_hash,
            trades: result.trades,
            remaining_size: result.remaining_size,
        })
    }

    /// Cancels a resting order on behalf of its maker. Losing the race
    /// against a concurrent fill is a normal outcome and surfaces as
    /// `ORDER_NOT_FOUND`.
    pub async fn cancel_order(&self, order_hash: H256, maker: H160) -> Result<U256, Rejection> {
        let maker_lock = self.submission_lock(maker);
        let _guard = maker_lock.lock().await;

        let entry = self.matching.get_entry(order_hash);
        let unlocked = match self.matching.cancel_order(order_hash, maker) {
            Ok(unlocked) => unlocked,
            Err(matching::Error::OrderNotFound) => {
                return Err(Rejection::new(
                    RejectionCode::OrderNotFound,
                    "unknown, filled or already cancelled",
                ))
            }
            Err(matching::Error::NotOwner) => {
                return Err(Rejection::new(
                    RejectionCode::OrderNotOwned,
                    "only the maker may cancel",
                ))
            }
            Err(err) => {
                tracing::error!(?err, order = ?order_hash, "cancellation failed unexpectedly");
                return Err(Rejection::new(RejectionCode::InvalidOrder, err.to_string()));
            }
        };

        self.risk.release_order(maker, order_hash, unlocked);
        self.settlement.mark_cancelled(order_hash);
        if let Some(entry) = entry {
            let (market_id, token_id) = (entry.order.market_id, entry.order.token_id);
            self.broadcaster.publish_orderbook(
                market_id,
                token_id,
                Event::order_removed(
                    market_id,
                    token_id,
                    order_data(order_hash, &entry.order, 0.into()),
                ),
            );
            self.publish_balances(maker, &[funding_token(&entry.order)]);
            self.publish_price(market_id, token_id);
        }
        tracing::info!(order = ?order_hash, ?maker, unlocked = %unlocked, "order cancelled");
        Ok(unlocked)
    }

    /// Withdraws collateral or outcome tokens off the exchange, subject to
    /// the per day risk cap. The actual on-chain payout travels through the
    /// settlement pipeline; here the funds just leave the ledger.
    pub async fn withdraw(
        &self,
        user: H160,
        token_id: U256,
        amount: U256,
    ) -> Result<(), Rejection> {
        let user_lock = self.submission_lock(user);
        let _guard = user_lock.lock().await;

        let today = Utc::now().date_naive();
        self.risk
            .validate_withdrawal(user, amount, today)
            .map_err(|err| Rejection::new(RejectionCode::RiskLimitExceeded, err.to_string()))?;
        self.ledger.debit(user, token_id, amount).map_err(|err| {
            Rejection::new(RejectionCode::InsufficientBalance, err.to_string())
        })?;
        self.risk.record_withdrawal(user, amount, today);
        self.publish_balances(user, &[token_id]);
        tracing::info!(?user, %token_id, %amount, "withdrawal executed");
        Ok(())
    }

    fn submission_lock(&self, maker: H160) -> Arc<Mutex<()>> {
        self.submission_locks
            .entry(maker)
            .or_default()
            .value()
            .clone()
    }

    /// Order, trade, balance and price events for one accepted submission.
    /// Balance updates for a fill follow the fill's trade event immediately,
    /// preserving their relative order on every channel.
    fn publish_submission_events(&self, order: &Order, result: &MatchResult) {
        let (market_id, token_id) = (order.market_id, order.token_id);
        if !result.remaining_size.is_zero() {
            self.broadcaster.publish_orderbook(
                market_id,
                token_id,
                Event::order_added(
                    market_id,
                    token_id,
                    order_data(result.order_hash, order, result.remaining_size),
                ),
            );
        }
        for trade in &result.trades {
            self.broadcaster
                .publish_orderbook(market_id, token_id, Event::trade(trade.clone()));
            match self.matching.get_entry(trade.maker_order) {
                Some(entry) => self.broadcaster.publish_orderbook(
                    market_id,
                    token_id,
                    Event::order_updated(
                        market_id,
                        token_id,
                        order_data(entry.hash, &entry.order, entry.remaining_size()),
                    ),
                ),
                None => self.broadcaster.publish_orderbook(
                    market_id,
                    token_id,
                    Event::order_removed(
                        market_id,
                        token_id,
                        OrderData {
                            order: trade.maker_order,
                            maker: trade.maker,
                            side: order.side.opposite(),
                            price: trade.price,
                            remaining_size: 0.into(),
                        },
                    ),
                ),
            }
            self.publish_balances(trade.taker, &[ledger::collateral_token(), token_id]);
            self.publish_balances(trade.maker, &[ledger::collateral_token(), token_id]);
        }
        if !result.trades.is_empty() || !result.remaining_size.is_zero() {
            self.publish_price(market_id, token_id);
        }
    }

    fn publish_balances(&self, user: H160, token_ids: &[U256]) {
        for &token_id in token_ids {
            let balance = self.ledger.get_balance(user, token_id);
            self.broadcaster.publish_balance(
                user,
                Event::balance_update(
                    user,
                    BalanceData {
                        token_id,
                        available: balance.available,
                        locked: balance.locked,
                    },
                ),
            );
        }
    }

    fn publish_price(&self, market_id: H256, token_id: U256) {
        let (best_bid, best_ask) = self.matching.best_prices(market_id, token_id);
        self.broadcaster.publish_orderbook(
            market_id,
            token_id,
            Event::price_update(market_id, token_id, PriceData { best_bid, best_ask }),
        );
    }
}

fn funding_token(order: &Order) -> U256 {
    match order.side {
        Side::Buy => ledger::collateral_token(),
        Side::Sell => order.token_id,
    }
}

fn order_data(hash: H256, order: &Order, remaining_size: U256) -> OrderData {
    OrderData {
        order: hash,
        maker: order.maker,
        side: order.side,
        price: matching::order_price(order).unwrap_or_default(),
        remaining_size,
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        model::{order::OrderBuilder, signature::SigningScheme},
        number::u256_ext::U256Ext,
        risk::{Limits, Tier},
        secp256k1::SecretKey,
        settlement::DryRunChainSink,
    };

    fn domain() -> DomainSeparator {
        DomainSeparator::new(137, H160::from_low_u64_be(0xeeee))
    }

    fn key(seed: u8) -> SecretKey {
        SecretKey::from_slice(&[seed; 32]).unwrap()
    }

    fn address(seed: u8) -> H160 {
        let secp = secp256k1::Secp256k1::signing_only();
        model::signature::public_key_address(&secp256k1::PublicKey::from_secret_key(
            &secp,
            &key(seed),
        ))
    }

    fn market() -> H256 {
        H256::from_low_u64_be(1)
    }

    fn price(tenths: u64) -> U256 {
        number::one() / 10 * tenths
    }

    fn tokens(count: u64) -> U256 {
        number::one() * count
    }

    struct Fixture {
        ledger: Arc<Ledger>,
        risk: Arc<RiskEngine>,
        settlement: Arc<SettlementBuilder>,
        broadcaster: Arc<Broadcaster>,
        orderbook: Orderbook,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(Ledger::new());
        let risk = Arc::new(RiskEngine::new(Default::default()));
        let matching = Arc::new(MatchingEngine::new(ledger.clone(), domain()));
        let settlement = Arc::new(SettlementBuilder::new(
            Default::default(),
            Arc::new(DryRunChainSink),
        ));
        let broadcaster = Arc::new(Broadcaster::new());
        let orderbook = Orderbook::new(
            domain(),
            ledger.clone(),
            risk.clone(),
            matching,
            settlement.clone(),
            broadcaster.clone(),
            Arc::new(Notify::new()),
        );
        Fixture {
            ledger,
            risk,
            settlement,
            broadcaster,
            orderbook,
        }
    }

    struct OrderSpec {
        seed: u8,
        side: Side,
        price: U256,
        tokens: U256,
        salt: u64,
        nonce: U256,
        expiration: U256,
    }

    impl OrderSpec {
        fn new(seed: u8, side: Side, price: U256, tokens: U256, salt: u64) -> Self {
            Self {
                seed,
                side,
                price,
                tokens,
                salt,
                nonce: 0.into(),
                expiration: 0.into(),
            }
        }

        fn nonce(mut self, nonce: u64) -> Self {
            self.nonce = nonce.into();
            self
        }

        fn expiration(mut self, expiration: u64) -> Self {
            self.expiration = expiration.into();
            self
        }

        fn sign(self) -> Order {
            let collateral = self
                .price
                .full_mul_div(&self.tokens, &number::one())
                .unwrap();
            let (maker_amount, taker_amount) = match self.side {
                Side::Buy => (collateral, self.tokens),
                Side::Sell => (self.tokens, collateral),
            };
            OrderBuilder::default()
                .with_salt(self.salt.into())
                .with_market_id(market())
                .with_token_id(1.into())
                .with_side(self.side)
                .with_maker_amount(maker_amount)
                .with_taker_amount(taker_amount)
                .with_nonce(self.nonce)
                .with_expiration(self.expiration)
                .sign_with(SigningScheme::Eip712, &domain(), &key(self.seed))
                .build()
        }
    }

    #[tokio::test]
    async fn full_pipeline_crosses_and_fans_out() {
        let fixture = fixture();
        let (alice, bob) = (1, 2);
        fixture
            .ledger
            .credit(address(alice), ledger::collateral_token(), tokens(1000))
            .unwrap();
        fixture
            .ledger
            .credit(address(bob), 1.into(), tokens(100))
            .unwrap();
        let mut book_events = fixture.broadcaster.subscribe_orderbook(market(), 1.into());
        let mut balance_events = fixture.broadcaster.subscribe_balance(address(alice));

        let sell = OrderSpec::new(bob, Side::Sell, price(5), tokens(100), 1).sign();
        let resting = fixture.orderbook.add_order(sell).await.unwrap();
        assert!(resting.trades.is_empty());

        let buy = OrderSpec::new(alice, Side::Buy, price(6), tokens(100), 2).sign();
        let accepted = fixture.orderbook.add_order(buy).await.unwrap();
        assert_eq!(accepted.trades.len(), 1);
        assert_eq!(accepted.trades[0].price, number::one() / 2);
        assert_eq!(accepted.remaining_size, 0.into());

        // Ledger effects as in the crossing scenario.
        let alice_collateral = fixture
            .ledger
            .get_balance(address(alice), ledger::collateral_token());
        assert_eq!(alice_collateral.available, tokens(950));
        assert_eq!(alice_collateral.locked, 0.into());
        assert_eq!(
            fixture.ledger.get_balance(address(alice), 1.into()).available,
            tokens(100)
        );

        // The fill is queued for settlement.
        assert_eq!(fixture.settlement.pending_trades(), 1);

        // Book channel: resting sell, its quote, then the fill.
        assert!(matches!(
            book_events.events.try_recv().unwrap(),
            Event::OrderAdded { .. }
        ));
        assert!(matches!(
            book_events.events.try_recv().unwrap(),
            Event::PriceUpdate { .. }
        ));
        assert!(matches!(
            book_events.events.try_recv().unwrap(),
            Event::Trade { .. }
        ));
        assert!(matches!(
            book_events.events.try_recv().unwrap(),
            Event::OrderRemoved { .. }
        ));
        assert!(matches!(
            book_events.events.try_recv().unwrap(),
            Event::PriceUpdate { .. }
        ));
        assert!(book_events.events.try_recv().is_err());

        // Alice's balance channel saw her collateral and token rows move.
        assert!(matches!(
            balance_events.events.try_recv().unwrap(),
            Event::BalanceUpdate { .. }
        ));
        assert!(matches!(
            balance_events.events.try_recv().unwrap(),
            Event::BalanceUpdate { .. }
        ));
    }

    #[tokio::test]
    async fn nonce_must_match_exactly() {
        let fixture = fixture();
        fixture
            .ledger
            .credit(address(1), ledger::collateral_token(), tokens(1000))
            .unwrap();
        fixture.ledger.set_nonce(address(1), 5.into());

        for stale_or_future in [4u64, 6] {
            let order = OrderSpec::new(1, Side::Buy, price(5), tokens(10), stale_or_future)
                .nonce(stale_or_future)
                .sign();
            let rejection = fixture.orderbook.add_order(order).await.unwrap_err();
            assert_eq!(rejection.code, RejectionCode::InvalidNonce);
        }

        let current = OrderSpec::new(1, Side::Buy, price(5), tokens(10), 7)
            .nonce(5)
            .sign();
        assert!(fixture.orderbook.add_order(current).await.is_ok());
    }

    #[tokio::test]
    async fn tampered_orders_are_rejected() {
        let fixture = fixture();
        fixture
            .ledger
            .credit(address(1), ledger::collateral_token(), tokens(1000))
            .unwrap();
        let mut order = OrderSpec::new(1, Side::Buy, price(5), tokens(10), 1).sign();
        order.maker_amount += U256::one();
        let rejection = fixture.orderbook.add_order(order).await.unwrap_err();
        assert_eq!(rejection.code, RejectionCode::InvalidSignature);
    }

    #[tokio::test]
    async fn expired_orders_are_rejected() {
        let fixture = fixture();
        fixture
            .ledger
            .credit(address(1), ledger::collateral_token(), tokens(1000))
            .unwrap();
        let order = OrderSpec::new(1, Side::Buy, price(5), tokens(10), 1)
            .expiration(1)
            .sign();
        let rejection = fixture.orderbook.add_order(order).await.unwrap_err();
        assert_eq!(rejection.code, RejectionCode::OrderExpired);

        // Zero means the order never expires.
        let order = OrderSpec::new(1, Side::Buy, price(5), tokens(10), 2)
            .expiration(0)
            .sign();
        assert!(fixture.orderbook.add_order(order).await.is_ok());
    }

    #[tokio::test]
    async fn unfunded_makers_are_rejected() {
        let fixture = fixture();
        let order = OrderSpec::new(1, Side::Buy, price(5), tokens(10), 1).sign();
        let rejection = fixture.orderbook.add_order(order).await.unwrap_err();
        assert_eq!(rejection.code, RejectionCode::InsufficientBalance);
    }

    #[tokio::test]
    async fn locked_funds_do_not_count_for_new_orders() {
        let fixture = fixture();
        fixture
            .ledger
            .credit(address(1), ledger::collateral_token(), tokens(10))
            .unwrap();
        let first = OrderSpec::new(1, Side::Buy, price(5), tokens(20), 1).sign();
        fixture.orderbook.add_order(first).await.unwrap();
        // The full budget is locked behind the resting order now.
        let second = OrderSpec::new(1, Side::Buy, price(5), tokens(20), 2).sign();
        let rejection = fixture.orderbook.add_order(second).await.unwrap_err();
        assert_eq!(rejection.code, RejectionCode::InsufficientBalance);
    }

    #[tokio::test]
    async fn risk_limits_reject_with_reason() {
        let fixture = fixture();
        fixture
            .ledger
            .credit(address(1), ledger::collateral_token(), tokens(1000))
            .unwrap();
        fixture.risk.set_custom_limits(
            address(1),
            Limits {
                max_order_size: 1.into(),
                ..Tier::Standard.default_limits()
            },
        );
        let order = OrderSpec::new(1, Side::Buy, price(5), tokens(10), 1).sign();
        let rejection = fixture.orderbook.add_order(order).await.unwrap_err();
        assert_eq!(rejection.code, RejectionCode::RiskLimitExceeded);
        assert!(rejection.details.contains("order size"));
    }

    #[tokio::test]
    async fn cancel_releases_balance_and_risk() {
        let fixture = fixture();
        fixture
            .ledger
            .credit(address(1), ledger::collateral_token(), tokens(100))
            .unwrap();
        let order = OrderSpec::new(1, Side::Buy, price(5), tokens(100), 1).sign();
        let accepted = fixture.orderbook.add_order(order).await.unwrap();
        assert_eq!(
            fixture
                .ledger
                .get_balance(address(1), ledger::collateral_token())
                .locked,
            tokens(50)
        );
        assert_eq!(fixture.risk.exposure(address(1)), tokens(50));

        let unlocked = fixture
            .orderbook
            .cancel_order(accepted.order_hash, address(1))
            .await
            .unwrap();
        assert_eq!(unlocked, tokens(50));
        let balance = fixture
            .ledger
            .get_balance(address(1), ledger::collateral_token());
        assert_eq!(balance.locked, 0.into());
        assert_eq!(balance.available, tokens(100));
        assert_eq!(fixture.risk.exposure(address(1)), 0.into());

        // Cancelling an already cancelled order is a normal outcome.
        let rejection = fixture
            .orderbook
            .cancel_order(accepted.order_hash, address(1))
            .await
            .unwrap_err();
        assert_eq!(rejection.code, RejectionCode::OrderNotFound);
    }

    #[tokio::test]
    async fn cancel_by_non_maker_is_rejected() {
        let fixture = fixture();
        fixture
            .ledger
            .credit(address(1), ledger::collateral_token(), tokens(100))
            .unwrap();
        let order = OrderSpec::new(1, Side::Buy, price(5), tokens(100), 1).sign();
        let accepted = fixture.orderbook.add_order(order).await.unwrap();
        let rejection = fixture
            .orderbook
            .cancel_order(accepted.order_hash, address(2))
            .await
            .unwrap_err();
        assert_eq!(rejection.code, RejectionCode::OrderNotOwned);
    }

    #[tokio::test]
    async fn filled_orders_release_taker_exposure() {
        let fixture = fixture();
        fixture
            .ledger
            .credit(address(1), ledger::collateral_token(), tokens(1000))
            .unwrap();
        fixture
            .ledger
            .credit(address(2), 1.into(), tokens(100))
            .unwrap();
        let sell = OrderSpec::new(2, Side::Sell, price(5), tokens(100), 1).sign();
        fixture.orderbook.add_order(sell).await.unwrap();
        let buy = OrderSpec::new(1, Side::Buy, price(5), tokens(100), 2).sign();
        fixture.orderbook.add_order(buy).await.unwrap();

        // Nothing of the taker's order rests, so no exposure remains.
        assert_eq!(fixture.risk.exposure(address(1)), 0.into());
    }

    #[tokio::test]
    async fn withdrawals_respect_ledger_and_risk() {
        let fixture = fixture();
        fixture
            .ledger
            .credit(address(1), ledger::collateral_token(), tokens(100))
            .unwrap();

        fixture
            .orderbook
            .withdraw(address(1), ledger::collateral_token(), tokens(40))
            .await
            .unwrap();
        assert_eq!(
            fixture
                .ledger
                .get_balance(address(1), ledger::collateral_token())
                .available,
            tokens(60)
        );

        let rejection = fixture
            .orderbook
            .withdraw(address(1), ledger::collateral_token(), tokens(200))
            .await
            .unwrap_err();
        assert_eq!(rejection.code, RejectionCode::InsufficientBalance);

        fixture.risk.set_custom_limits(
            address(1),
            Limits {
                max_daily_withdrawal: tokens(50),
                ..Tier::Standard.default_limits()
            },
        );
        let rejection = fixture
            .orderbook
            .withdraw(address(1), ledger::collateral_token(), tokens(45))
            .await
            .unwrap_err();
        assert_eq!(rejection.code, RejectionCode::RiskLimitExceeded);
    }
}
