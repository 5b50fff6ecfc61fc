use {
    model::order::{Order, Side},
    number::u256_ext::U256Ext,
    primitive_types::{H256, U256},
};

/// A resting order. `remaining` is denominated in the resource the maker
/// locked (collateral for buys, outcome tokens for sells) so the funding
/// invariant `locked >= remaining` is a direct field comparison.
#[derive(Debug, Clone)]
pub struct BookEntry {
    pub hash: H256,
    pub order: Order,
    pub price: U256,
    pub remaining: U256,
    pub sequence: u64,
}

impl BookEntry {
    /// Outcome tokens this entry can still trade.
    pub fn remaining_size(&self) -> U256 {
        match self.order.side {
            Side::Buy => self
                .remaining
                .full_mul_div(&number::one(), &self.price)
                .unwrap_or_default(),
            Side::Sell => self.remaining,
        }
    }
}

/// One price level of a depth snapshot.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PriceLevel {
    pub price: U256,
    pub size: U256,
}

/// Bids sorted by descending price, asks by ascending price, FIFO within a
/// price. Entries with nothing left to trade are never kept.
#[derive(Debug, Default)]
pub struct OrderBook {
    bids: Vec<BookEntry>,
    asks: Vec<BookEntry>,
}

impl OrderBook {
    pub fn insert(&mut self, entry: BookEntry) {
        match entry.order.side {
            Side::Buy => {
                let at = self
                    .bids
                    .partition_point(|resting| resting.price >= entry.price);
                self.bids.insert(at, entry);
            }
            Side::Sell => {
                let at = self
                    .asks
                    .partition_point(|resting| resting.price <= entry.price);
                self.asks.insert(at, entry);
            }
        }
    }

    /// The side an incoming order of `side` crosses against.
    pub fn opposite(&mut self, side: Side) -> &mut Vec<BookEntry> {
        match side {
            Side::Buy => &mut self.asks,
            Side::Sell => &mut self.bids,
        }
    }

    pub fn remove(&mut self, hash: H256) -> Option<BookEntry> {
        for entries in [&mut self.bids, &mut self.asks] {
            if let Some(at) = entries.iter().position(|entry| entry.hash == hash) {
                return Some(entries.remove(at));
            }
        }
        None
    }

    pub fn get(&self, hash: H256) -> Option<&BookEntry> {
        self.entries().find(|entry| entry.hash == hash)
    }

    pub fn entries(&self) -> impl Iterator<Item = &BookEntry> {
        self.bids.iter().chain(self.asks.iter())
    }

    pub fn best_bid(&self) -> Option<U256> {
        self.bids.first().map(|entry| entry.price)
    }

    pub fn best_ask(&self) -> Option<U256> {
        self.asks.first().map(|entry| entry.price)
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Aggregated size per price, best levels first, at most `levels` deep
    /// per side.
    pub fn depth(&self, levels: usize) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
        (
            aggregate(&self.bids, levels),
            aggregate(&self.asks, levels),
        )
    }
}

fn aggregate(entries: &[BookEntry], levels: usize) -> Vec<PriceLevel> {
    let mut result: Vec<PriceLevel> = Vec::new();
    for entry in entries {
        match result.last_mut() {
            Some(level) if level.price == entry.price => {
                level.size += entry.remaining_size();
            }
            _ => {
                if result.len() == levels {
                    break;
                }
                result.push(PriceLevel {
                    price: entry.price,
                    size: entry.remaining_size(),
                });
            }
        }
    }
    result
}
