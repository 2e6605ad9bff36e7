//! Ownership-share balances with snapshot checkpoints.
//!
//! The supply is fixed when the ledger is created and only moves between
//! accounts afterwards. Historical balances are kept copy-on-write: the first
//! time an account's balance changes after snapshot `n` was taken, its
//! pre-change balance is stored as checkpoint `n`. Reading the balance at
//! snapshot `n` returns the first checkpoint with id `>= n`, or the live
//! balance if the account has not changed since.

use std::collections::HashMap;

use lineage_core::error::VaultError;
use lineage_core::types::Address;

/// Balance of an account as of a snapshot id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Checkpoint {
    snapshot_id: u64,
    balance: u64,
}

/// Fixed-supply share ledger.
#[derive(Debug, Clone, Default)]
pub struct ShareLedger {
    total_supply: u64,
    balances: HashMap<Address, u64>,
    checkpoints: HashMap<Address, Vec<Checkpoint>>,
    current_snapshot_id: u64,
}

impl ShareLedger {
    /// Mint `total_supply` across `allocations`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidAllocation`] if the allocations do not sum to
    ///   `total_supply`
    pub fn with_allocations(total_supply: u64, allocations: &[(Address, u64)]) -> Result<Self, VaultError> {
        let mut balances: HashMap<Address, u64> = HashMap::new();
        let mut sum: u64 = 0;
        for (account, amount) in allocations {
            sum = sum.checked_add(*amount).ok_or(VaultError::ArithmeticOverflow)?;
            if *amount > 0 {
                *balances.entry(*account).or_insert(0) += *amount;
            }
        }
        if sum != total_supply {
            return Err(VaultError::InvalidAllocation(format!(
                "allocations sum to {sum}, supply is {total_supply}"
            )));
        }
        Ok(Self {
            total_supply,
            balances,
            checkpoints: HashMap::new(),
            current_snapshot_id: 0,
        })
    }

    /// Fixed total supply.
    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Live balance of `account`.
    pub fn balance_of(&self, account: &Address) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Id of the most recent snapshot (0 before the first).
    pub fn current_snapshot_id(&self) -> u64 {
        self.current_snapshot_id
    }

    /// Take a snapshot and return its id.
    pub fn snapshot(&mut self) -> u64 {
        self.current_snapshot_id += 1;
        self.current_snapshot_id
    }

    /// Balance `account` held when snapshot `snapshot_id` was taken.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NonexistentSnapshot`] for id 0 or an id not yet taken
    pub fn balance_at(&self, account: &Address, snapshot_id: u64) -> Result<u64, VaultError> {
        if snapshot_id == 0 || snapshot_id > self.current_snapshot_id {
            return Err(VaultError::NonexistentSnapshot(snapshot_id));
        }
        let Some(history) = self.checkpoints.get(account) else {
            return Ok(self.balance_of(account));
        };
        let idx = history.partition_point(|cp| cp.snapshot_id < snapshot_id);
        Ok(match history.get(idx) {
            Some(cp) => cp.balance,
            None => self.balance_of(account),
        })
    }

    /// Move `amount` from `from` to `to`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InsufficientShares`] if `from` holds less than `amount`
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: u64) -> Result<(), VaultError> {
        let have = self.balance_of(from);
        if have < amount {
            return Err(VaultError::InsufficientShares { have, need: amount });
        }
        if from == to || amount == 0 {
            return Ok(());
        }
        self.record_checkpoint(from);
        self.record_checkpoint(to);
        self.balances.insert(*from, have - amount);
        *self.balances.entry(*to).or_insert(0) += amount;
        Ok(())
    }

    fn record_checkpoint(&mut self, account: &Address) {
        if self.current_snapshot_id == 0 {
            return;
        }
        let balance = self.balance_of(account);
        let history = self.checkpoints.entry(*account).or_default();
        let stale = history
            .last()
            .map(|cp| cp.snapshot_id < self.current_snapshot_id)
            .unwrap_or(true);
        if stale {
            history.push(Checkpoint {
                snapshot_id: self.current_snapshot_id,
                balance,
            });
        }
    }

    /// Non-zero holders sorted by address.
    pub fn holders(&self) -> Vec<(Address, u64)> {
        let mut out: Vec<_> = self
            .balances
            .iter()
            .filter(|(_, b)| **b > 0)
            .map(|(a, b)| (*a, *b))
            .collect();
        out.sort();
        out
    }

    /// Sum of every live balance; equals the supply unless the ledger is
    /// corrupt.
    pub fn sum_of_balances(&self) -> u64 {
        self.balances.values().fold(0u64, |acc, b| acc.saturating_add(*b))
    }
}
