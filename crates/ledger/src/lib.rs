//! The single source of truth for off-chain balances and signing nonces.
//!
//! Balances are segregated per `(user, token)` into an available and a locked
//! column. Credits and debits move value across the ledger boundary, locking
//! rebalances between the two columns of one row, and transfers move value
//! between users without changing the per token total.

use {
    primitive_types::{H160, U256},
    std::{
        collections::HashMap,
        sync::Mutex,
    },
};

/// The settlement asset outcome tokens are priced against.
pub fn collateral_token() -> U256 {
    U256::zero()
}

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("amount must be positive")]
    InvalidAmount,
    #[error("user has no balance for this token")]
    UserNotFound,
    #[error("insufficient available balance")]
    InsufficientBalance,
    #[error("insufficient locked balance")]
    InsufficientLocked,
}

#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct Balance {
    pub available: U256,
    pub locked: U256,
}

impl Balance {
    pub fn total(&self) -> U256 {
        // Both columns fit the supply of real tokens so the sum cannot
        // overflow 256 bits.
        self.available + self.locked
    }
}

#[derive(Debug, Default)]
struct State {
    balances: HashMap<(H160, U256), Balance>,
    nonces: HashMap<H160, U256>,
}

/// All operations take the interior lock, so each call is atomic with
/// respect to every other, including the two-row `transfer`.
#[derive(Debug, Default)]
pub struct Ledger {
    state: Mutex<State>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credit(&self, user: H160, token_id: U256, amount: U256) -> Result<(), Error> {
        ensure_positive(amount)?;
        let mut state = self.state();
        let balance = state.balances.entry((user, token_id)).or_default();
        balance.available = balance
            .available
            .checked_add(amount)
            .ok_or(Error::InvalidAmount)?;
        Ok(())
    }

    pub fn debit(&self, user: H160, token_id: U256, amount: U256) -> Result<(), Error> {
        ensure_positive(amount)?;
        let mut state = self.state();
        let balance = existing(&mut state, user, token_id)?;
        balance.available = balance
            .available
            .checked_sub(amount)
            .ok_or(Error::InsufficientBalance)?;
        Ok(())
    }

    /// Moves `amount` from available to locked; the row total is unchanged.
    pub fn lock(&self, user: H160, token_id: U256, amount: U256) -> Result<(), Error> {
        ensure_positive(amount)?;
        let mut state = self.state();
        let balance = existing(&mut state, user, token_id)?;
        balance.available = balance
            .available
            .checked_sub(amount)
            .ok_or(Error::InsufficientBalance)?;
        balance.locked += amount;
        Ok(())
    }

    pub fn unlock(&self, user: H160, token_id: U256, amount: U256) -> Result<(), Error> {
        ensure_positive(amount)?;
        let mut state = self.state();
        let balance = existing(&mut state, user, token_id)?;
        balance.locked = balance
            .locked
            .checked_sub(amount)
            .ok_or(Error::InsufficientLocked)?;
        balance.available += amount;
        Ok(())
    }

    /// Moves `amount` from `from` to the available column of `to`. The debit
    /// comes out of `from`'s locked column when `from_locked` is set,
    /// otherwise out of available. The per token total across all users is
    /// invariant.
    pub fn transfer(
        &self,
        from: H160,
        to: H160,
        token_id: U256,
        amount: U256,
        from_locked: bool,
    ) -> Result<(), Error> {
        ensure_positive(amount)?;
        let mut state = self.state();
        let balance = existing(&mut state, from, token_id)?;
        if from_locked {
            balance.locked = balance
                .locked
                .checked_sub(amount)
                .ok_or(Error::InsufficientLocked)?;
        } else {
            balance.available = balance
                .available
                .checked_sub(amount)
                .ok_or(Error::InsufficientBalance)?;
        }
        state.balances.entry((to, token_id)).or_default().available += amount;
        Ok(())
    }

    /// Zero balance if the row does not exist; no row is created.
    pub fn get_balance(&self, user: H160, token_id: U256) -> Balance {
        self.state()
            .balances
            .get(&(user, token_id))
            .copied()
            .unwrap_or_default()
    }

    /// Read only probe of the available column.
    pub fn has_sufficient(&self, user: H160, token_id: U256, amount: U256) -> bool {
        self.get_balance(user, token_id).available >= amount
    }

    pub fn get_nonce(&self, user: H160) -> U256 {
        self.state().nonces.get(&user).copied().unwrap_or_default()
    }

    /// Only ever raises the stored nonce; lower values are silently ignored.
    pub fn set_nonce(&self, user: H160, nonce: U256) {
        let mut state = self.state();
        let current = state.nonces.entry(user).or_default();
        if nonce > *current {
            *current = nonce;
        }
    }

    pub fn increment_nonce(&self, user: H160) -> U256 {
        let mut state = self.state();
        let current = state.nonces.entry(user).or_default();
        *current += U256::one();
        *current
    }

    /// All balance rows, for reconciliation sweeps and persistence
    /// checkpoints.
    pub fn balances(&self) -> Vec<(H160, U256, Balance)> {
        self.state()
            .balances
            .iter()
            .map(|(&(user, token_id), &balance)| (user, token_id, balance))
            .collect()
    }

    pub fn nonces(&self) -> Vec<(H160, U256)> {
        self.state()
            .nonces
            .iter()
            .map(|(&user, &nonce)| (user, nonce))
            .collect()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        // Lock poisoning only happens if another thread panicked while
        // holding the guard, at which point the engine is already lost.
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }
}

fn ensure_positive(amount: U256) -> Result<(), Error> {
    if amount.is_zero() {
        return Err(Error::InvalidAmount);
    }
    Ok(())
}

fn existing<'a>(
    state: &'a mut State,
    user: H160,
    token_id: U256,
) -> Result<&'a mut Balance, Error> {
    state
        .balances
        .get_mut(&(user, token_id))
        .ok_or(Error::UserNotFound)
}
