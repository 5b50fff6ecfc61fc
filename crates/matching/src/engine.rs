use {
    crate::{
        book::{BookEntry, OrderBook, PriceLevel},
        fees, order_price, Error,
    },
    chrono::Utc,
    dashmap::DashMap,
    ledger::Ledger,
    model::{
        order::{Order, Side},
        trade::{MatchType, Trade},
        DomainSeparator,
    },
    number::u256_ext::U256Ext,
    primitive_types::{H160, H256, U256},
    std::sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

/// Books are keyed by `(market, outcome token)`.
pub type BookKey = (H256, U256);

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MatchResult {
    pub order_hash: H256,
    /// Fills in match order: best price first, FIFO within a price.
    pub trades: Vec<Trade>,
    /// Outcome tokens left resting on the book; zero means fully filled.
    pub remaining_size: U256,
}

pub struct MatchingEngine {
    ledger: Arc<Ledger>,
    domain_separator: DomainSeparator,
    books: DashMap<BookKey, Arc<Mutex<OrderBook>>>,
    index: DashMap<H256, BookKey>,
    next_trade_id: AtomicU64,
    next_sequence: AtomicU64,
}

impl MatchingEngine {
    pub fn new(ledger: Arc<Ledger>, domain_separator: DomainSeparator) -> Self {
        Self {
            ledger,
            domain_separator,
            books: Default::default(),
            index: Default::default(),
            next_trade_id: AtomicU64::new(1),
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Locks the maker's funding, crosses the order against the opposite
    /// side of its book and rests any residual at price-time priority.
    ///
    /// Fills execute at the resting order's price. Whenever the incoming
    /// order fills below its own limit the difference stays locked for
    /// nothing, so it is explicitly unlocked back to the maker.
    pub fn add_order(&self, order: Order) -> Result<MatchResult, Error> {
        if order.maker_amount.is_zero() || order.taker_amount.is_zero() {
            return Err(Error::InvalidOrder);
        }
        let price = order_price(&order).ok_or(Error::InvalidOrder)?;
        let hash = order.hash(&self.domain_separator);
        if self.index.contains_key(&hash) {
            return Err(Error::InvalidOrder);
        }

        let funding_token = match order.side {
            Side::Buy => ledger::collateral_token(),
            Side::Sell => order.token_id,
        };
        self.ledger
            .lock(order.maker, funding_token, order.maker_amount)
            .map_err(|err| match err {
                ledger::Error::UserNotFound | ledger::Error::InsufficientBalance => {
                    Error::InsufficientBalance
                }
                other => Error::Ledger(other),
            })?;

        let key = (order.market_id, order.token_id);
        let book = Arc::clone(self.books.entry(key).or_default().value());
        let mut book = lock(&book);

        let mut size_left = match order.side {
            Side::Buy => order.taker_amount,
            Side::Sell => order.maker_amount,
        };
        let mut collateral_spent = U256::zero();
        let mut trades = Vec::new();
        let now = Utc::now();

        while !size_left.is_zero() {
            let Some(top) = book.opposite(order.side).first() else {
                break;
            };
            let crosses = match order.side {
                Side::Buy => top.price <= price,
                Side::Sell => top.price >= price,
            };
            if !crosses {
                break;
            }
            let (maker_price, maker_addr, maker_hash) = (top.price, top.order.maker, top.hash);
            let maker_size = top.remaining_size();
            if maker_size.is_zero() {
                self.drop_top(&mut book, order.side)?;
                continue;
            }

            let fill = size_left.min(maker_size);
            let cost = maker_price
                .full_mul_div(&fill, &number::one())
                .ok_or(Error::InvalidOrder)?;

            // Both legs come out of locked columns: the buyer pre-locked
            // collateral, the seller pre-locked the outcome tokens.
            let (buyer, seller) = match order.side {
                Side::Buy => (order.maker, maker_addr),
                Side::Sell => (maker_addr, order.maker),
            };
            if !cost.is_zero() {
                self.ledger
                    .transfer(buyer, seller, ledger::collateral_token(), cost, true)?;
            }
            self.ledger
                .transfer(seller, buyer, order.token_id, fill, true)?;

            // The resting entry's lock shrinks by what it delivered: tokens
            // for a sell, collateral for a buy.
            let consumed = match order.side {
                Side::Buy => fill,
                Side::Sell => cost,
            };
            {
                let opposite = book.opposite(order.side);
                let top = &mut opposite[0];
                top.remaining = top.remaining.saturating_sub(consumed);
                if top.remaining_size().is_zero() {
                    self.drop_top(&mut book, order.side)?;
                }
            }
            if order.side == Side::Buy {
                collateral_spent += cost;
            }

            trades.push(Trade {
                id: self.next_trade_id.fetch_add(1, Ordering::Relaxed),
                taker_order: hash,
                maker_order: maker_hash,
                maker: maker_addr,
                taker: order.maker,
                market_id: order.market_id,
                token_id: order.token_id,
                amount: fill,
                price: maker_price,
                match_type: MatchType::Complementary,
                fee: fees::fee_amount(maker_price, fill, order.fee_rate_bps),
                fee_rate_bps: order.fee_rate_bps,
                timestamp: now,
            });
            size_left -= fill;
        }

        // Residual funding requirement and refund of everything else.
        let residual_lock = match order.side {
            Side::Buy if !size_left.is_zero() => order
                .maker_amount
                .full_mul_div_ceil(&size_left, &order.taker_amount)
                .ok_or(Error::InvalidOrder)?,
            Side::Buy => U256::zero(),
            Side::Sell => size_left,
        };
        if order.side == Side::Buy {
            let refund = order
                .maker_amount
                .saturating_sub(collateral_spent)
                .saturating_sub(residual_lock);
            if !refund.is_zero() {
                self.ledger
                    .unlock(order.maker, ledger::collateral_token(), refund)?;
            }
        }
        if !size_left.is_zero() {
            book.insert(BookEntry {
                hash,
                order,
                price,
                remaining: residual_lock,
                sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
            });
            self.index.insert(hash, key);
        }

        tracing::debug!(
            order = ?hash,
            fills = trades.len(),
            resting = %size_left,
            "order processed"
        );
        Ok(MatchResult {
            order_hash: hash,
            trades,
            remaining_size: size_left,
        })
    }

    /// Removes a resting order and unlocks whatever it still had funded.
    /// Only the order's maker may cancel; a concurrent fill of the same
    /// entry surfaces as [`Error::OrderNotFound`].
    pub fn cancel_order(&self, hash: H256, maker: H160) -> Result<U256, Error> {
        let key = match self.index.get(&hash) {
            Some(entry) => *entry.value(),
            None => return Err(Error::OrderNotFound),
        };
        let book = match self.books.get(&key) {
            Some(book) => Arc::clone(book.value()),
            None => return Err(Error::OrderNotFound),
        };
        let mut book = lock(&book);
        let owner = match book.get(hash) {
            Some(entry) => entry.order.maker,
            None => return Err(Error::OrderNotFound),
        };
        if owner != maker {
            return Err(Error::NotOwner);
        }
        let Some(entry) = book.remove(hash) else {
            return Err(Error::OrderNotFound);
        };
        self.index.remove(&hash);
        self.unlock_entry(&entry)?;
        tracing::debug!(order = ?hash, unlocked = %entry.remaining, "order cancelled");
        Ok(entry.remaining)
    }

    pub fn get_entry(&self, hash: H256) -> Option<BookEntry> {
        let key = *self.index.get(&hash)?.value();
        let book = Arc::clone(self.books.get(&key)?.value());
        let book = lock(&book);
        book.get(hash).cloned()
    }

    pub fn best_prices(&self, market_id: H256, token_id: U256) -> (Option<U256>, Option<U256>) {
        match self.books.get(&(market_id, token_id)) {
            Some(book) => {
                let book = lock(book.value());
                (book.best_bid(), book.best_ask())
            }
            None => (None, None),
        }
    }

    pub fn depth(
        &self,
        market_id: H256,
        token_id: U256,
        levels: usize,
    ) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
        match self.books.get(&(market_id, token_id)) {
            Some(book) => lock(book.value()).depth(levels),
            None => (Vec::new(), Vec::new()),
        }
    }

    /// Every resting entry across all books, for persistence checkpoints.
    pub fn open_orders(&self) -> Vec<BookEntry> {
        let mut entries = Vec::new();
        for book in self.books.iter() {
            let book = lock(book.value());
            entries.extend(book.entries().cloned());
        }
        entries
    }

    /// Drops the current top of the opposite side, unlocking any funding
    /// dust it still held.
    fn drop_top(&self, book: &mut OrderBook, incoming: Side) -> Result<(), Error> {
        let entry = book.opposite(incoming).remove(0);
        self.index.remove(&entry.hash);
        self.unlock_entry(&entry)
    }

    fn unlock_entry(&self, entry: &BookEntry) -> Result<(), Error> {
        if entry.remaining.is_zero() {
            return Ok(());
        }
        let token = match entry.order.side {
            Side::Buy => ledger::collateral_token(),
            Side::Sell => entry.order.token_id,
        };
        self.ledger
            .unlock(entry.order.maker, token, entry.remaining)?;
        Ok(())
    }
}

fn lock(book: &Mutex<OrderBook>) -> MutexGuard<'_, OrderBook> {
    book.lock().unwrap_or_else(|err| err.into_inner())
}
