//! External revenue-token balances.
//!
//! [`RevenueLedger`] models the token balances of accounts that live outside
//! the protocol: payers funding deposits and holders receiving claims.
//! Vaults and pools keep their own custody accounting and never appear here.

use std::collections::HashMap;

use tracing::debug;

use crate::error::LedgerError;
use crate::types::{Address, TokenId};

/// In-memory balance table keyed by `(account, token)`.
#[derive(Debug, Clone, Default)]
pub struct RevenueLedger {
    balances: HashMap<(Address, TokenId), u64>,
    /// Total units ever minted per token.
    minted: HashMap<TokenId, u64>,
}

impl RevenueLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `account` in `token`. Unknown pairs are zero.
    pub fn balance(&self, account: &Address, token: &TokenId) -> u64 {
        self.balances.get(&(*account, *token)).copied().unwrap_or(0)
    }

    /// Total units of `token` ever minted into the ledger.
    pub fn total_minted(&self, token: &TokenId) -> u64 {
        self.minted.get(token).copied().unwrap_or(0)
    }

    /// Create `amount` new units of `token` for `account`.
    pub fn mint(&mut self, account: Address, token: TokenId, amount: u64) -> Result<(), LedgerError> {
        let minted = self.total_minted(&token);
        let new_minted = minted
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.credit(account, token, amount)?;
        self.minted.insert(token, new_minted);
        debug!(account = %account.short(), token = %token.short(), amount, "ledger: minted");
        Ok(())
    }

    /// Add `amount` to `account`'s balance.
    pub fn credit(&mut self, account: Address, token: TokenId, amount: u64) -> Result<(), LedgerError> {
        let entry = self.balances.entry((account, token)).or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        Ok(())
    }

    /// Remove `amount` from `account`'s balance.
    ///
    /// Fails without changing anything if the balance is insufficient.
    pub fn debit(&mut self, account: Address, token: TokenId, amount: u64) -> Result<(), LedgerError> {
        let have = self.balance(&account, &token);
        if have < amount {
            return Err(LedgerError::InsufficientFunds {
                account,
                have,
                need: amount,
            });
        }
        self.balances.insert((account, token), have - amount);
        Ok(())
    }

    /// All non-zero balances, sorted by account then token.
    pub fn non_zero_balances(&self) -> Vec<(Address, TokenId, u64)> {
        let mut out: Vec<_> = self
            .balances
            .iter()
            .filter(|(_, v)| **v > 0)
            .map(|((a, t), v)| (*a, *t, *v))
            .collect();
        out.sort();
        out
    }
}
