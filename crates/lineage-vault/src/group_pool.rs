//! Even-split reward pool of a group node.
//!
//! Rewards are tracked with a per-member accumulator. Every deposit is added
//! to the carried remainder of earlier deposits, `pending / member_count` is
//! added to `acc_per_member` and `pending % member_count` is carried as dust,
//! so the carry is always below the member count. A member's available reward is `acc_per_member - reward_debt`,
//! where the debt starts at the accumulator value when the member joins and
//! catches up whenever the member is paid. A late joiner therefore only
//! shares in deposits made after joining.
//!
//! Dust is never paid out directly; it stays in custody and rolls into the
//! next deposit.

use std::collections::{BTreeMap, BTreeSet};

use lineage_core::error::PoolError;
use lineage_core::types::{pool_address, vault_address, Address, IpId, Payout, TokenId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Membership record of one member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberEntry {
    pub joined_at: u64,
    reward_debt: BTreeMap<TokenId, u64>,
}

impl MemberEntry {
    pub fn reward_debt(&self, token: &TokenId) -> u64 {
        self.reward_debt.get(token).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
struct TokenBook {
    acc_per_member: u64,
    balance: u64,
    total_deposited: u64,
    dust: u64,
}

/// Reward pool of a single group.
#[derive(Debug, Clone)]
pub struct GroupRewardPool {
    group: IpId,
    address: Address,
    members: BTreeMap<IpId, MemberEntry>,
    books: BTreeMap<TokenId, TokenBook>,
}

impl GroupRewardPool {
    pub fn new(group: IpId) -> Self {
        Self {
            group,
            address: pool_address(&group),
            members: BTreeMap::new(),
            books: BTreeMap::new(),
        }
    }

    /// Add `member`, returning false if it is already present.
    pub fn add_member(&mut self, member: IpId, now: u64) -> bool {
        if self.members.contains_key(&member) {
            return false;
        }
        let reward_debt = self
            .books
            .iter()
            .map(|(token, book)| (*token, book.acc_per_member))
            .collect();
        self.members.insert(
            member,
            MemberEntry {
                joined_at: now,
                reward_debt,
            },
        );
        info!(group = %self.group.short(), member = %member.short(), count = self.members.len(), "pool: member added");
        true
    }

    /// Credit `amount` of `token` to the pool, split evenly across the
    /// current members.
    ///
    /// # Errors
    ///
    /// - [`PoolError::NoMembers`] if the pool is empty
    pub fn deposit_reward(&mut self, token: TokenId, amount: u64) -> Result<(), PoolError> {
        let count = self.members.len() as u64;
        if count == 0 {
            return Err(PoolError::NoMembers);
        }
        let current = self.books.get(&token).cloned().unwrap_or_default();
        let pending = current.dust.checked_add(amount).ok_or(PoolError::ArithmeticOverflow)?;
        let per_member = pending / count;
        let remainder = pending % count;

        let next = TokenBook {
            acc_per_member: current
                .acc_per_member
                .checked_add(per_member)
                .ok_or(PoolError::ArithmeticOverflow)?,
            balance: current.balance.checked_add(amount).ok_or(PoolError::ArithmeticOverflow)?,
            total_deposited: current
                .total_deposited
                .checked_add(amount)
                .ok_or(PoolError::ArithmeticOverflow)?,
            dust: remainder,
        };
        self.books.insert(token, next);
        debug!(group = %self.group.short(), token = %token.short(), amount, per_member, remainder, "pool: reward deposited");
        Ok(())
    }

    /// Reward of `token` accrued to `member` and not yet paid.
    ///
    /// # Errors
    ///
    /// - [`PoolError::NotAMember`]
    pub fn available_reward(&self, token: &TokenId, member: &IpId) -> Result<u64, PoolError> {
        let entry = self.members.get(member).ok_or(PoolError::NotAMember(*member))?;
        Ok(self.acc_per_member(token).saturating_sub(entry.reward_debt(token)))
    }

    /// Pay every listed member its available reward of `token`.
    ///
    /// Payouts are addressed to each member's vault. All members are
    /// validated before anything is paid.
    pub fn distribute(&mut self, token: TokenId, members: &[IpId]) -> Result<Vec<Payout>, PoolError> {
        let mut seen = BTreeSet::new();
        let mut amounts = Vec::new();
        for member in members {
            let amount = self.available_reward(&token, member)?;
            if seen.insert(*member) && amount > 0 {
                amounts.push((*member, amount));
            }
        }
        let total = amounts
            .iter()
            .try_fold(0u64, |acc, (_, a)| acc.checked_add(*a))
            .ok_or(PoolError::ArithmeticOverflow)?;
        let have = self.balance(&token);
        if total > have {
            return Err(PoolError::InsufficientBalance { have, need: total });
        }

        let acc = self.acc_per_member(&token);
        let mut payouts = Vec::with_capacity(amounts.len());
        for (member, amount) in amounts {
            if let Some(entry) = self.members.get_mut(&member) {
                entry.reward_debt.insert(token, acc);
            }
            payouts.push(Payout {
                from: self.address,
                to: vault_address(&member),
                token,
                amount,
            });
        }
        if let Some(book) = self.books.get_mut(&token) {
            book.balance -= total;
        }
        debug!(group = %self.group.short(), token = %token.short(), paid = payouts.len(), total, "pool: distributed");
        Ok(payouts)
    }

    /// Pay `member` everything it is owed, then remove it.
    pub fn remove_member(&mut self, member: &IpId) -> Result<Vec<Payout>, PoolError> {
        if !self.members.contains_key(member) {
            return Err(PoolError::NotAMember(*member));
        }
        let mut payouts = Vec::new();
        for token in self.tokens() {
            payouts.extend(self.distribute(token, &[*member])?);
        }
        self.members.remove(member);
        info!(group = %self.group.short(), member = %member.short(), count = self.members.len(), "pool: member removed");
        Ok(payouts)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn group(&self) -> IpId {
        self.group
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_member(&self, member: &IpId) -> bool {
        self.members.contains_key(member)
    }

    pub fn members(&self) -> Vec<IpId> {
        self.members.keys().copied().collect()
    }

    pub fn joined_at(&self, member: &IpId) -> Option<u64> {
        self.members.get(member).map(|e| e.joined_at)
    }

    pub fn reward_debt(&self, member: &IpId, token: &TokenId) -> Option<u64> {
        self.members.get(member).map(|e| e.reward_debt(token))
    }

    pub fn acc_per_member(&self, token: &TokenId) -> u64 {
        self.books.get(token).map(|b| b.acc_per_member).unwrap_or(0)
    }

    pub fn balance(&self, token: &TokenId) -> u64 {
        self.books.get(token).map(|b| b.balance).unwrap_or(0)
    }

    pub fn total_deposited(&self, token: &TokenId) -> u64 {
        self.books.get(token).map(|b| b.total_deposited).unwrap_or(0)
    }

    /// Remainder carried into the next deposit of `token`.
    pub fn dust(&self, token: &TokenId) -> u64 {
        self.books.get(token).map(|b| b.dust).unwrap_or(0)
    }

    /// Tokens the pool has ever received.
    pub fn tokens(&self) -> Vec<TokenId> {
        self.books.keys().copied().collect()
    }

    /// Custody equals dust plus every member's unpaid reward.
    pub fn conservation_holds(&self) -> bool {
        self.books.iter().all(|(token, book)| {
            let owed = self
                .members
                .values()
                .map(|e| book.acc_per_member.saturating_sub(e.reward_debt(token)))
                .fold(book.dust, u64::saturating_add);
            owed == book.balance
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ip(seed: u8) -> IpId {
        IpId([seed; 32])
    }

    fn token(seed: u8) -> TokenId {
        TokenId([seed; 32])
    }

    fn pool() -> GroupRewardPool {
        GroupRewardPool::new(ip(100))
    }

    #[test]
    fn deposit_without_members_rejected() {
        let mut p = pool();
        assert_eq!(p.deposit_reward(token(1), 10), Err(PoolError::NoMembers));
        assert_eq!(p.balance(&token(1)), 0);
    }

    #[test]
    fn add_member_is_idempotent() {
        let mut p = pool();
        assert!(p.add_member(ip(1), 5));
        assert!(!p.add_member(ip(1), 9));
        assert_eq!(p.joined_at(&ip(1)), Some(5));
        assert_eq!(p.member_count(), 1);
    }

    #[test]
    fn late_member_shares_only_later_deposits() {
        let mut p = pool();
        p.add_member(ip(1), 0);
        p.deposit_reward(token(1), 100).unwrap();
        p.add_member(ip(2), 1);
        assert_eq!(p.reward_debt(&ip(2), &token(1)), Some(100));
        p.deposit_reward(token(1), 100).unwrap();

        assert_eq!(p.available_reward(&token(1), &ip(1)), Ok(150));
        assert_eq!(p.available_reward(&token(1), &ip(2)), Ok(50));

        let payouts = p.distribute(token(1), &[ip(1), ip(2)]).unwrap();
        let amounts: Vec<u64> = payouts.iter().map(|p| p.amount).collect();
        assert_eq!(amounts, vec![150, 50]);
        assert_eq!(payouts[0].to, vault_address(&ip(1)));
        assert_eq!(p.balance(&token(1)), 0);
        assert!(p.conservation_holds());
    }

    #[test]
    fn remainder_kept_as_dust() {
        let mut p = pool();
        for seed in 1..=3 {
            p.add_member(ip(seed), 0);
        }
        p.deposit_reward(token(1), 100).unwrap();
        assert_eq!(p.acc_per_member(&token(1)), 33);
        assert_eq!(p.dust(&token(1)), 1);
        p.distribute(token(1), &[ip(1), ip(2), ip(3)]).unwrap();
        assert_eq!(p.balance(&token(1)), 1);
        assert!(p.conservation_holds());
    }

    #[test]
    fn small_deposits_accumulate_before_split() {
        let mut p = pool();
        p.add_member(ip(1), 0);
        p.add_member(ip(2), 0);
        p.deposit_reward(token(1), 1).unwrap();
        assert_eq!(p.dust(&token(1)), 1);
        p.deposit_reward(token(1), 1).unwrap();
        assert_eq!(p.dust(&token(1)), 0);

        let amounts: Vec<u64> = p
            .distribute(token(1), &[ip(1), ip(2)])
            .unwrap()
            .iter()
            .map(|p| p.amount)
            .collect();
        assert_eq!(amounts, vec![1, 1]);
        assert_eq!(p.balance(&token(1)), 0);
        assert!(p.conservation_holds());
    }

    #[test]
    fn carry_stays_below_member_count() {
        let mut p = pool();
        for seed in 1..=3 {
            p.add_member(ip(seed), 0);
        }
        for amount in [1, 1, 1, 2, 5, 7] {
            p.deposit_reward(token(1), amount).unwrap();
            assert!(p.dust(&token(1)) < 3);
        }
        // 17 deposited: 5 each, 2 carried.
        assert_eq!(p.acc_per_member(&token(1)), 5);
        assert_eq!(p.dust(&token(1)), 2);
        let paid: u64 = p
            .distribute(token(1), &[ip(1), ip(2), ip(3)])
            .unwrap()
            .iter()
            .map(|p| p.amount)
            .sum();
        assert_eq!(paid, 15);
        assert!(p.conservation_holds());
    }

    #[test]
    fn distribute_twice_pays_once() {
        let mut p = pool();
        p.add_member(ip(1), 0);
        p.deposit_reward(token(1), 10).unwrap();
        assert_eq!(p.distribute(token(1), &[ip(1), ip(1)]).unwrap().len(), 1);
        assert!(p.distribute(token(1), &[ip(1)]).unwrap().is_empty());
    }

    #[test]
    fn distribute_validates_all_members_first() {
        let mut p = pool();
        p.add_member(ip(1), 0);
        p.deposit_reward(token(1), 10).unwrap();
        assert_eq!(
            p.distribute(token(1), &[ip(1), ip(7)]),
            Err(PoolError::NotAMember(ip(7)))
        );
        assert_eq!(p.available_reward(&token(1), &ip(1)), Ok(10));
    }

    #[test]
    fn remove_member_pays_out_first() {
        let mut p = pool();
        p.add_member(ip(1), 0);
        p.add_member(ip(2), 0);
        p.deposit_reward(token(1), 40).unwrap();
        p.deposit_reward(token(2), 8).unwrap();
        let payouts = p.remove_member(&ip(1)).unwrap();
        assert_eq!(payouts.len(), 2);
        assert!(!p.is_member(&ip(1)));
        assert_eq!(p.member_count(), 1);
        p.deposit_reward(token(1), 10).unwrap();
        assert_eq!(p.available_reward(&token(1), &ip(2)), Ok(30));
        assert!(p.conservation_holds());
    }

    #[test]
    fn remove_unknown_member_rejected() {
        let mut p = pool();
        assert_eq!(p.remove_member(&ip(1)), Err(PoolError::NotAMember(ip(1))));
    }

    proptest! {
        #[test]
        fn custody_matches_owed_rewards(
            ops in prop::collection::vec((0u8..4, 1u8..6, 0u64..1_000), 1..40),
        ) {
            let mut p = pool();
            let mut paid: u64 = 0;
            let mut deposited: u64 = 0;
            for (op, seed, amount) in ops {
                match op {
                    0 => { p.add_member(ip(seed), 0); }
                    1 => {
                        if p.deposit_reward(token(1), amount).is_ok() {
                            deposited += amount;
                        }
                    }
                    2 => {
                        let members = p.members();
                        for payout in p.distribute(token(1), &members).unwrap() {
                            paid += payout.amount;
                        }
                    }
                    _ => {
                        if let Ok(payouts) = p.remove_member(&ip(seed)) {
                            paid += payouts.iter().map(|p| p.amount).sum::<u64>();
                        }
                    }
                }
                prop_assert!(p.conservation_holds());
                prop_assert_eq!(p.balance(&token(1)) + paid, deposited);
            }
        }
    }
}
