//! Per user trading limits.
//!
//! Limits resolve with precedence custom override > tier default > STANDARD
//! default. Exposure tracks the sum of open maker amounts, the rate limit
//! counts orders in a trailing one minute window, and withdrawals accumulate
//! into per day buckets.

use {
    chrono::{DateTime, Duration, NaiveDate, Utc},
    primitive_types::{H160, H256, U256},
    std::{
        collections::{HashMap, HashSet, VecDeque},
        sync::Mutex,
    },
};

/// Trailing window for the order rate limit.
const RATE_WINDOW_MS: i64 = 60_000;
/// Only this many recent order timestamps are retained per user.
const TIMESTAMP_BUFFER: usize = 100;

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("order size exceeds limit")]
    OrderSizeExceeded,
    #[error("total exposure exceeds limit")]
    ExposureExceeded,
    #[error("order rate limit exceeded")]
    RateLimitExceeded,
    #[error("daily withdrawal limit exceeded")]
    WithdrawalLimitExceeded,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum Tier {
    #[default]
    Standard,
    Premium,
    Vip,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Limits {
    pub max_order_size: U256,
    pub max_exposure: U256,
    pub max_orders_per_minute: usize,
    pub max_daily_withdrawal: U256,
}

impl Tier {
    pub fn default_limits(self) -> Limits {
        match self {
            Self::Standard => Limits {
                max_order_size: U256::exp10(23),
                max_exposure: U256::exp10(24),
                max_orders_per_minute: 30,
                max_daily_withdrawal: U256::exp10(23),
            },
            Self::Premium => Limits {
                max_order_size: U256::exp10(24),
                max_exposure: U256::exp10(25),
                max_orders_per_minute: 60,
                max_daily_withdrawal: U256::exp10(24),
            },
            Self::Vip => Limits {
                max_order_size: U256::exp10(25),
                max_exposure: U256::exp10(26),
                max_orders_per_minute: 120,
                max_daily_withdrawal: U256::exp10(25),
            },
        }
    }
}

/// Operator supplied replacements for the built in tier defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub tier_limits: HashMap<Tier, Limits>,
}

impl Config {
    fn limits(&self, tier: Tier) -> Limits {
        self.tier_limits
            .get(&tier)
            .copied()
            .unwrap_or_else(|| tier.default_limits())
    }
}

#[derive(Debug, Default)]
struct UserState {
    tier: Tier,
    custom: Option<Limits>,
    recent_orders: VecDeque<DateTime<Utc>>,
    exposure: U256,
    withdrawal_bucket: Option<(NaiveDate, U256)>,
    active_orders: HashSet<H256>,
}

#[derive(Debug, Default)]
pub struct RiskEngine {
    config: Config,
    users: Mutex<HashMap<H160, UserState>>,
}

impl RiskEngine {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            users: Default::default(),
        }
    }

    /// Effective limits for the user: custom override if set, otherwise the
    /// tier's (possibly operator overridden) defaults.
    pub fn limits(&self, user: H160) -> Limits {
        let users = self.users();
        match users.get(&user) {
            Some(state) => state
                .custom
                .unwrap_or_else(|| self.config.limits(state.tier)),
            None => self.config.limits(Tier::Standard),
        }
    }

    /// Assigning a tier clears any custom override.
    pub fn set_tier(&self, user: H160, tier: Tier) {
        let mut users = self.users();
        let state = users.entry(user).or_default();
        state.tier = tier;
        state.custom = None;
    }

    pub fn set_custom_limits(&self, user: H160, limits: Limits) {
        self.users().entry(user).or_default().custom = Some(limits);
    }

    pub fn tier(&self, user: H160) -> Tier {
        self.users().get(&user).map(|s| s.tier).unwrap_or_default()
    }

    pub fn exposure(&self, user: H160) -> U256 {
        self.users()
            .get(&user)
            .map(|s| s.exposure)
            .unwrap_or_default()
    }

    /// Checks size, exposure and rate limits in that order; the first
    /// violated limit is reported.
    pub fn validate_order(
        &self,
        user: H160,
        maker_amount: U256,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let limits = self.limits(user);
        if maker_amount > limits.max_order_size {
            return Err(Error::OrderSizeExceeded);
        }
        let users = self.users();
        let (exposure, recent) = match users.get(&user) {
            Some(state) => (state.exposure, &state.recent_orders),
            None => return Ok(()),
        };
        if exposure.saturating_add(maker_amount) > limits.max_exposure {
            return Err(Error::ExposureExceeded);
        }
        let window_start = now - Duration::milliseconds(RATE_WINDOW_MS);
        let in_window = recent.iter().filter(|at| **at > window_start).count();
        if in_window >= limits.max_orders_per_minute {
            return Err(Error::RateLimitExceeded);
        }
        Ok(())
    }

    pub fn validate_withdrawal(
        &self,
        user: H160,
        amount: U256,
        date: NaiveDate,
    ) -> Result<(), Error> {
        let limits = self.limits(user);
        let spent = self.withdrawn_today(user, date);
        if spent.saturating_add(amount) > limits.max_daily_withdrawal {
            return Err(Error::WithdrawalLimitExceeded);
        }
        Ok(())
    }

    pub fn record_withdrawal(&self, user: H160, amount: U256, date: NaiveDate) {
        let mut users = self.users();
        let state = users.entry(user).or_default();
        state.withdrawal_bucket = Some(match state.withdrawal_bucket {
            Some((day, spent)) if day == date => (day, spent.saturating_add(amount)),
            _ => (date, amount),
        });
    }

    pub fn withdrawn_today(&self, user: H160, date: NaiveDate) -> U256 {
        self.users()
            .get(&user)
            .and_then(|state| state.withdrawal_bucket)
            .filter(|(day, _)| *day == date)
            .map(|(_, spent)| spent)
            .unwrap_or_default()
    }

    /// Accounts an accepted order: exposure grows by the maker amount and
    /// the order counts against the rate window.
    pub fn record_order(&self, user: H160, order: H256, maker_amount: U256, now: DateTime<Utc>) {
        let mut users = self.users();
        let state = users.entry(user).or_default();
        state.exposure = state.exposure.saturating_add(maker_amount);
        state.active_orders.insert(order);
        state.recent_orders.push_back(now);
        while state.recent_orders.len() > TIMESTAMP_BUFFER {
            state.recent_orders.pop_front();
        }
    }

    /// Releases exposure when an order fills or is cancelled. The released
    /// amount is floored at zero so double releases cannot underflow.
    pub fn release_order(&self, user: H160, order: H256, released: U256) {
        let mut users = self.users();
        let Some(state) = users.get_mut(&user) else {
            tracing::warn!(?user, ?order, "released order for untracked user");
            return;
        };
        state.active_orders.remove(&order);
        state.exposure = state.exposure.saturating_sub(released);
    }

    pub fn active_orders(&self, user: H160) -> usize {
        self.users()
            .get(&user)
            .map(|s| s.active_orders.len())
            .unwrap_or_default()
    }

    fn users(&self) -> std::sync::MutexGuard<'_, HashMap<H160, UserState>> {
        self.users.lock().unwrap_or_else(|err| err.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> H160 {
        H160::from_low_u64_be(1)
    }

    fn order(n: u64) -> H256 {
        H256::from_low_u64_be(n)
    }

    #[test]
    fn rejects_oversized_order() {
        let engine = RiskEngine::new(Config::default());
        let too_big = U256::exp10(23) + 1;
        assert_eq!(
            engine.validate_order(user(), too_big, Utc::now()),
            Err(Error::OrderSizeExceeded)
        );
        assert_eq!(engine.validate_order(user(), U256::exp10(23), Utc::now()), Ok(()));
    }

    #[test]
    fn rejects_exposure_above_limit() {
        let engine = RiskEngine::new(Config::default());
        let now = Utc::now();
        engine.record_order(user(), order(1), U256::exp10(24) - 1, now);
        assert_eq!(
            engine.validate_order(user(), 2.into(), now),
            Err(Error::ExposureExceeded)
        );
        engine.release_order(user(), order(1), U256::exp10(24) - 1);
        assert_eq!(engine.validate_order(user(), 2.into(), now), Ok(()));
        assert_eq!(engine.exposure(user()), 0.into());
    }

    #[test]
    fn release_floors_at_zero() {
        let engine = RiskEngine::new(Config::default());
        engine.record_order(user(), order(1), 10.into(), Utc::now());
        engine.release_order(user(), order(1), 100.into());
        assert_eq!(engine.exposure(user()), 0.into());
    }

    #[test]
    fn rate_limit_counts_trailing_minute() {
        let engine = RiskEngine::new(Config::default());
        let now = Utc::now();
        for n in 0..30 {
            engine.record_order(user(), order(n), 1.into(), now);
        }
        assert_eq!(
            engine.validate_order(user(), 1.into(), now),
            Err(Error::RateLimitExceeded)
        );
        // The same orders fall out of the window a minute later.
        let later = now + Duration::milliseconds(RATE_WINDOW_MS + 1);
        assert_eq!(engine.validate_order(user(), 1.into(), later), Ok(()));
    }

    #[test]
    fn timestamp_buffer_is_bounded() {
        let engine = RiskEngine::new(Config::default());
        let now = Utc::now();
        for n in 0..500 {
            engine.record_order(user(), order(n), 1.into(), now);
        }
        let users = engine.users();
        assert_eq!(users[&user()].recent_orders.len(), TIMESTAMP_BUFFER);
    }

    #[test]
    fn tier_assignment_clears_custom_limits() {
        let engine = RiskEngine::new(Config::default());
        engine.set_custom_limits(
            user(),
            Limits {
                max_order_size: 1.into(),
                ..Tier::Standard.default_limits()
            },
        );
        assert_eq!(engine.limits(user()).max_order_size, 1.into());
        engine.set_tier(user(), Tier::Premium);
        assert_eq!(
            engine.limits(user()).max_order_size,
            Tier::Premium.default_limits().max_order_size
        );
    }

    #[test]
    fn operator_tier_overrides_apply() {
        let mut config = Config::default();
        config.tier_limits.insert(
            Tier::Standard,
            Limits {
                max_orders_per_minute: 1,
                ..Tier::Standard.default_limits()
            },
        );
        let engine = RiskEngine::new(config);
        let now = Utc::now();
        engine.record_order(user(), order(1), 1.into(), now);
        assert_eq!(
            engine.validate_order(user(), 1.into(), now),
            Err(Error::RateLimitExceeded)
        );
    }

    #[test]
    fn withdrawals_bucket_by_day() {
        let engine = RiskEngine::new(Config::default());
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let tomorrow = today.succ_opt().unwrap();
        let limit = Tier::Standard.default_limits().max_daily_withdrawal;
        engine.record_withdrawal(user(), limit, today);
        assert_eq!(
            engine.validate_withdrawal(user(), 1.into(), today),
            Err(Error::WithdrawalLimitExceeded)
        );
        assert_eq!(engine.validate_withdrawal(user(), limit, tomorrow), Ok(()));
        engine.record_withdrawal(user(), 5.into(), tomorrow);
        assert_eq!(engine.withdrawn_today(user(), tomorrow), 5.into());
    }
}
