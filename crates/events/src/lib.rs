//! Typed engine events and their fan-out to subscribed clients.

pub mod broadcaster;

pub use crate::broadcaster::{
    spawn_sweeper,
    Broadcaster,
    Liveness,
    Subscription,
    SubscriptionId,
    SweepHandle,
};

use {
    chrono::{DateTime, Utc},
    model::{order::Side, trade::Trade},
    number::serialization::HexOrDecimalU256,
    primitive_types::{H160, H256, U256},
    serde::Serialize,
    serde_with::serde_as,
};

/// Summary of a book entry as carried by order events.
#[serde_as]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    pub order: H256,
    pub maker: H160,
    pub side: Side,
    #[serde_as(as = "HexOrDecimalU256")]
    pub price: U256,
    #[serde_as(as = "HexOrDecimalU256")]
    pub remaining_size: U256,
}

#[serde_as]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceData {
    #[serde_as(as = "Option<HexOrDecimalU256>")]
    pub best_bid: Option<U256>,
    #[serde_as(as = "Option<HexOrDecimalU256>")]
    pub best_ask: Option<U256>,
}

#[serde_as]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceData {
    #[serde_as(as = "HexOrDecimalU256")]
    pub token_id: U256,
    #[serde_as(as = "HexOrDecimalU256")]
    pub available: U256,
    #[serde_as(as = "HexOrDecimalU256")]
    pub locked: U256,
}

#[serde_as]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochData {
    pub epoch_id: u64,
    pub merkle_root: H256,
    #[serde_as(as = "HexOrDecimalU256")]
    pub total: U256,
    pub tx: H256,
}

/// Everything the engine tells the outside world. Serializes to the wire
/// envelope `{event, timestamp, <routing keys>, data}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Event {
    OrderAdded {
        timestamp: DateTime<Utc>,
        market_id: H256,
        token_id: U256,
        data: OrderData,
    },
    OrderRemoved {
        timestamp: DateTime<Utc>,
        market_id: H256,
        token_id: U256,
        data: OrderData,
    },
    OrderUpdated {
        timestamp: DateTime<Utc>,
        market_id: H256,
        token_id: U256,
        data: OrderData,
    },
    Trade {
        timestamp: DateTime<Utc>,
        market_id: H256,
        token_id: U256,
        data: Trade,
    },
    PriceUpdate {
        timestamp: DateTime<Utc>,
        market_id: H256,
        token_id: U256,
        data: PriceData,
    },
    BalanceUpdate {
        timestamp: DateTime<Utc>,
        user: H160,
        data: BalanceData,
    },
    EpochCommitted {
        timestamp: DateTime<Utc>,
        data: EpochData,
    },
}

impl Event {
    /// All events carry the server time they were emitted at; every
    /// constructor stamps it here.
    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    pub fn order_added(market_id: H256, token_id: U256, data: OrderData) -> Self {
        Self::OrderAdded {
            timestamp: Self::now(),
            market_id,
            token_id,
            data,
        }
    }

    pub fn order_removed(market_id: H256, token_id: U256, data: OrderData) -> Self {
        Self::OrderRemoved {
            timestamp: Self::now(),
            market_id,
            token_id,
            data,
        }
    }

    pub fn order_updated(market_id: H256, token_id: U256, data: OrderData) -> Self {
        Self::OrderUpdated {
            timestamp: Self::now(),
            market_id,
            token_id,
            data,
        }
    }

    pub fn trade(data: Trade) -> Self {
        Self::Trade {
            timestamp: Self::now(),
            market_id: data.market_id,
            token_id: data.token_id,
            data,
        }
    }

    pub fn price_update(market_id: H256, token_id: U256, data: PriceData) -> Self {
        Self::PriceUpdate {
            timestamp: Self::now(),
            market_id,
            token_id,
            data,
        }
    }

    pub fn balance_update(user: H160, data: BalanceData) -> Self {
        Self::BalanceUpdate {
            timestamp: Self::now(),
            user,
            data,
        }
    }

    pub fn epoch_committed(data: EpochData) -> Self {
        Self::EpochCommitted {
            timestamp: Self::now(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let event = Event::order_added(
            H256::from_low_u64_be(7),
            1.into(),
            OrderData {
                order: H256::from_low_u64_be(1),
                maker: H160::from_low_u64_be(2),
                side: Side::Buy,
                price: number::one() / 2,
                remaining_size: number::one(),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "order_added");
        assert!(json["timestamp"].is_string());
        assert!(json.get("marketId").is_some());
        assert!(json.get("tokenId").is_some());
        assert_eq!(json["data"]["side"], "buy");
        assert_eq!(json["data"]["price"], "500000000000000000");
    }

    #[test]
    fn epoch_events_have_no_routing_keys() {
        let event = Event::epoch_committed(EpochData {
            epoch_id: 3,
            merkle_root: H256::from_low_u64_be(1),
            total: 10.into(),
            tx: H256::from_low_u64_be(2),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "epoch_committed");
        assert!(json.get("marketId").is_none());
        assert_eq!(json["data"]["epochId"], 3);
    }
}
