//! Per-node royalty vault.
//!
//! A vault holds the revenue tokens paid to one node and the ownership-share
//! ledger of that node. Revenue only becomes claimable through a snapshot:
//! at snapshot time the revenue that arrived since the previous snapshot is
//! split between the ancestor reserve (in proportion to the unclaimed
//! reserve units still held by the vault itself) and the holder claim pool.
//!
//! Custody per token always satisfies
//! `on_hand >= claim_pool + ancestor_reserve`; the difference is revenue not
//! yet covered by a snapshot.
//!
//! Outward transfers are returned as [`Payout`] values. Every mutating
//! method validates first and commits its accounting before returning them,
//! so a caller acting on a payout never observes a half-applied vault.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use lineage_core::constants::TOTAL_SHARE_SUPPLY;
use lineage_core::error::VaultError;
use lineage_core::math::mul_div;
use lineage_core::traits::DisputeStatus;
use lineage_core::types::{vault_address, Address, IpId, Payout, TokenId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::shares::ShareLedger;

/// State captured by one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Snapshot id, starting at 1.
    pub id: u64,
    /// Caller-supplied time the snapshot was taken.
    pub timestamp: u64,
    /// Unclaimed reserve units held by the vault at snapshot time.
    pub unclaimed_units: u64,
    /// Revenue added to the claim pool by this snapshot, per token.
    pub claimable: BTreeMap<TokenId, u64>,
}

/// Royalty vault of a single node.
#[derive(Clone)]
pub struct RoyaltyVault {
    ip: IpId,
    address: Address,
    shares: ShareLedger,
    unclaimed_units: u64,
    snapshot_interval: u64,
    last_snapshot_at: u64,
    tokens: BTreeSet<TokenId>,
    on_hand: HashMap<TokenId, u64>,
    claim_pool: HashMap<TokenId, u64>,
    ancestor_reserve: HashMap<TokenId, u64>,
    snapshots: Vec<SnapshotRecord>,
    claimed: HashSet<(u64, Address, TokenId)>,
    disputes: Arc<dyn DisputeStatus>,
}

impl fmt::Debug for RoyaltyVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoyaltyVault")
            .field("ip", &self.ip)
            .field("address", &self.address)
            .field("unclaimed_units", &self.unclaimed_units)
            .field("current_snapshot_id", &self.shares.current_snapshot_id())
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl RoyaltyVault {
    /// Create the vault of `ip`.
    ///
    /// `holder` receives `TOTAL_SHARE_SUPPLY - unclaimed_units` shares; the
    /// remaining `unclaimed_units` are held by the vault's own address as the
    /// ancestor reserve. `created_at` counts as the first snapshot time.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidAllocation`] if `unclaimed_units` exceeds the
    ///   total supply
    pub fn new(
        ip: IpId,
        holder: Address,
        unclaimed_units: u64,
        created_at: u64,
        snapshot_interval: u64,
        disputes: Arc<dyn DisputeStatus>,
    ) -> Result<Self, VaultError> {
        let Some(holder_units) = TOTAL_SHARE_SUPPLY.checked_sub(unclaimed_units) else {
            return Err(VaultError::InvalidAllocation(format!(
                "unclaimed units {unclaimed_units} exceed supply {TOTAL_SHARE_SUPPLY}"
            )));
        };
        let address = vault_address(&ip);
        let shares = ShareLedger::with_allocations(
            TOTAL_SHARE_SUPPLY,
            &[(holder, holder_units), (address, unclaimed_units)],
        )?;
        debug!(ip = %ip.short(), unclaimed_units, "vault: created");
        Ok(Self {
            ip,
            address,
            shares,
            unclaimed_units,
            snapshot_interval,
            last_snapshot_at: created_at,
            tokens: BTreeSet::new(),
            on_hand: HashMap::new(),
            claim_pool: HashMap::new(),
            ancestor_reserve: HashMap::new(),
            snapshots: Vec::new(),
            claimed: HashSet::new(),
            disputes,
        })
    }

    // ------------------------------------------------------------------
    // Revenue
    // ------------------------------------------------------------------

    /// Take custody of `amount` units of `token`.
    pub fn deposit(&mut self, token: TokenId, amount: u64) -> Result<(), VaultError> {
        let held = self.on_hand(&token);
        let new_held = held.checked_add(amount).ok_or(VaultError::ArithmeticOverflow)?;
        self.on_hand.insert(token, new_held);
        self.tokens.insert(token);
        debug!(ip = %self.ip.short(), token = %token.short(), amount, "vault: deposit");
        Ok(())
    }

    /// Revenue of `token` received since the last snapshot.
    pub fn pending_revenue(&self, token: &TokenId) -> u64 {
        self.on_hand(token)
            .saturating_sub(self.claim_pool(token))
            .saturating_sub(self.ancestor_reserve(token))
    }

    /// Take a snapshot at `now` and return its id.
    ///
    /// # Errors
    ///
    /// - [`VaultError::IntervalTooShort`] if less than the snapshot interval
    ///   has passed since the previous snapshot (or creation)
    pub fn snapshot(&mut self, now: u64) -> Result<u64, VaultError> {
        let next_allowed = self.last_snapshot_at.saturating_add(self.snapshot_interval);
        if now < next_allowed {
            return Err(VaultError::IntervalTooShort { next_allowed, now });
        }

        // Compute every split before touching state.
        let mut splits: Vec<(TokenId, u64, u64)> = Vec::with_capacity(self.tokens.len());
        for token in &self.tokens {
            let new_revenue = self.pending_revenue(token);
            let ancestor_share = mul_div(new_revenue, self.unclaimed_units, self.shares.total_supply())
                .ok_or(VaultError::ArithmeticOverflow)?;
            let claimable = new_revenue - ancestor_share;
            splits.push((*token, ancestor_share, claimable));
        }

        let id = self.shares.snapshot();
        let mut record = SnapshotRecord {
            id,
            timestamp: now,
            unclaimed_units: self.unclaimed_units,
            claimable: BTreeMap::new(),
        };
        for (token, ancestor_share, claimable) in splits {
            *self.ancestor_reserve.entry(token).or_insert(0) += ancestor_share;
            *self.claim_pool.entry(token).or_insert(0) += claimable;
            record.claimable.insert(token, claimable);
        }
        let on_hand = &self.on_hand;
        self.tokens.retain(|t| on_hand.get(t).copied().unwrap_or(0) > 0);
        self.last_snapshot_at = now;
        self.snapshots.push(record);

        debug!(ip = %self.ip.short(), id, now, tokens = self.tokens.len(), "vault: snapshot taken");
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Claims
    // ------------------------------------------------------------------

    /// Revenue of `token` that `holder` may claim from snapshot `snapshot_id`.
    ///
    /// Zero when already claimed, when the holder is the vault itself, when
    /// no holder shares existed at the snapshot, or while the node is frozen.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NonexistentSnapshot`] for unknown ids
    pub fn claimable_revenue(
        &self,
        holder: &Address,
        snapshot_id: u64,
        token: &TokenId,
    ) -> Result<u64, VaultError> {
        let record = self.record(snapshot_id)?;
        let balance = self.shares.balance_at(holder, snapshot_id)?;
        if self.disputes.is_frozen(&self.ip)
            || *holder == self.address
            || self.claimed.contains(&(snapshot_id, *holder, *token))
        {
            return Ok(0);
        }
        let claimable = record.claimable.get(token).copied().unwrap_or(0);
        let holder_supply = self.shares.total_supply() - record.unclaimed_units;
        if holder_supply == 0 {
            return Ok(0);
        }
        mul_div(balance, claimable, holder_supply).ok_or(VaultError::ArithmeticOverflow)
    }

    /// Claim several tokens from one snapshot on behalf of `holder`.
    ///
    /// Duplicate tokens in the batch are claimed once. Returns one payout per
    /// token with a positive amount.
    pub fn claim_by_token_batch(
        &mut self,
        holder: Address,
        snapshot_id: u64,
        tokens: &[TokenId],
    ) -> Result<Vec<Payout>, VaultError> {
        let mut seen = BTreeSet::new();
        let mut claims = Vec::new();
        for token in tokens {
            if !seen.insert(*token) {
                continue;
            }
            let amount = self.claimable_revenue(&holder, snapshot_id, token)?;
            claims.push((snapshot_id, *token, amount));
        }
        if self.forfeit(&holder) {
            return Ok(Vec::new());
        }
        self.commit_claims(holder, &claims)
    }

    /// Claim one token across several snapshots on behalf of `holder`.
    ///
    /// The amounts are summed into a single payout.
    pub fn claim_by_snapshot_batch(
        &mut self,
        holder: Address,
        snapshot_ids: &[u64],
        token: TokenId,
    ) -> Result<Vec<Payout>, VaultError> {
        let mut seen = BTreeSet::new();
        let mut claims = Vec::new();
        for id in snapshot_ids {
            if !seen.insert(*id) {
                continue;
            }
            let amount = self.claimable_revenue(&holder, *id, &token)?;
            claims.push((*id, token, amount));
        }
        if self.forfeit(&holder) {
            return Ok(Vec::new());
        }
        self.commit_claims(holder, &claims)
    }

    fn forfeit(&self, holder: &Address) -> bool {
        if self.disputes.is_frozen(&self.ip) {
            warn!(ip = %self.ip.short(), holder = %holder.short(), "vault: claim on frozen node forfeited");
            return true;
        }
        false
    }

    /// Mark claims and release the revenue. Amounts are aggregated per token.
    fn commit_claims(
        &mut self,
        holder: Address,
        claims: &[(u64, TokenId, u64)],
    ) -> Result<Vec<Payout>, VaultError> {
        let mut totals: BTreeMap<TokenId, u64> = BTreeMap::new();
        for (_, token, amount) in claims {
            let total = totals.entry(*token).or_insert(0);
            *total = total.checked_add(*amount).ok_or(VaultError::ArithmeticOverflow)?;
        }
        for (token, amount) in &totals {
            let pool = self.claim_pool(token);
            if pool < *amount {
                return Err(VaultError::InsufficientRevenue { have: pool, need: *amount });
            }
        }

        for (id, token, amount) in claims {
            if *amount > 0 {
                self.claimed.insert((*id, holder, *token));
            }
        }
        let mut payouts = Vec::new();
        for (token, amount) in totals {
            if amount == 0 {
                continue;
            }
            self.release(&token, amount, Release::ClaimPool);
            debug!(ip = %self.ip.short(), holder = %holder.short(), token = %token.short(), amount, "vault: revenue claimed");
            payouts.push(Payout {
                from: self.address,
                to: holder,
                token,
                amount,
            });
        }
        Ok(payouts)
    }

    fn release(&mut self, token: &TokenId, amount: u64, from: Release) {
        let bucket = match from {
            Release::ClaimPool => &mut self.claim_pool,
            Release::Reserve => &mut self.ancestor_reserve,
        };
        if let Some(v) = bucket.get_mut(token) {
            *v -= amount;
        }
        if let Some(v) = self.on_hand.get_mut(token) {
            *v -= amount;
        }
    }

    /// Whether `holder` has claimed `token` from snapshot `snapshot_id`.
    pub fn is_claimed(&self, snapshot_id: u64, holder: &Address, token: &TokenId) -> bool {
        self.claimed.contains(&(snapshot_id, *holder, *token))
    }

    // ------------------------------------------------------------------
    // Ancestor collection
    // ------------------------------------------------------------------

    /// Move `units` reserve shares to `ancestor_vault` together with the
    /// matching part of the ancestor reserve of every token.
    ///
    /// A collector taking every remaining unclaimed unit receives the exact
    /// remaining reserve, so rounding never strands revenue.
    ///
    /// # Errors
    ///
    /// - [`VaultError::ExceedsUnclaimed`] if `units` exceeds the unclaimed
    ///   reserve units
    pub fn collect_ancestor_share(
        &mut self,
        ancestor_vault: Address,
        units: u64,
    ) -> Result<Vec<Payout>, VaultError> {
        let unclaimed_before = self.unclaimed_units;
        if units > unclaimed_before {
            return Err(VaultError::ExceedsUnclaimed {
                units,
                unclaimed: unclaimed_before,
            });
        }
        if units == 0 {
            return Ok(Vec::new());
        }

        let mut amounts = Vec::new();
        for token in &self.tokens {
            let reserve = self.ancestor_reserve(token);
            let amount = if units == unclaimed_before {
                reserve
            } else {
                mul_div(reserve, units, unclaimed_before).ok_or(VaultError::ArithmeticOverflow)?
            };
            amounts.push((*token, amount));
        }

        let own = self.address;
        self.shares.transfer(&own, &ancestor_vault, units)?;
        self.unclaimed_units = unclaimed_before - units;

        let mut payouts = Vec::new();
        for (token, amount) in amounts {
            if amount == 0 {
                continue;
            }
            self.release(&token, amount, Release::Reserve);
            payouts.push(Payout {
                from: self.address,
                to: ancestor_vault,
                token,
                amount,
            });
        }
        info!(
            ip = %self.ip.short(),
            ancestor_vault = %ancestor_vault.short(),
            units,
            remaining = self.unclaimed_units,
            "vault: ancestor share collected"
        );
        Ok(payouts)
    }

    // ------------------------------------------------------------------
    // Shares
    // ------------------------------------------------------------------

    /// Move ownership shares between holders.
    ///
    /// # Errors
    ///
    /// - [`VaultError::ReservedShares`] if `from` is the vault itself
    /// - [`VaultError::InsufficientShares`]
    pub fn transfer_shares(&mut self, from: &Address, to: &Address, amount: u64) -> Result<(), VaultError> {
        if *from == self.address {
            return Err(VaultError::ReservedShares);
        }
        self.shares.transfer(from, to, amount)?;
        debug!(ip = %self.ip.short(), from = %from.short(), to = %to.short(), amount, "vault: shares transferred");
        Ok(())
    }

    /// Live share balance of `account`.
    pub fn share_balance(&self, account: &Address) -> u64 {
        self.shares.balance_of(account)
    }

    /// Share balance of `account` at snapshot `snapshot_id`.
    pub fn share_balance_at(&self, account: &Address, snapshot_id: u64) -> Result<u64, VaultError> {
        self.shares.balance_at(account, snapshot_id)
    }

    /// Non-zero share holders, including the vault's own reserve.
    pub fn share_holders(&self) -> Vec<(Address, u64)> {
        self.shares.holders()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn ip(&self) -> IpId {
        self.ip
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn unclaimed_units(&self) -> u64 {
        self.unclaimed_units
    }

    pub fn unclaimed_at_snapshot(&self, snapshot_id: u64) -> Result<u64, VaultError> {
        Ok(self.record(snapshot_id)?.unclaimed_units)
    }

    pub fn claim_pool(&self, token: &TokenId) -> u64 {
        self.claim_pool.get(token).copied().unwrap_or(0)
    }

    pub fn ancestor_reserve(&self, token: &TokenId) -> u64 {
        self.ancestor_reserve.get(token).copied().unwrap_or(0)
    }

    pub fn on_hand(&self, token: &TokenId) -> u64 {
        self.on_hand.get(token).copied().unwrap_or(0)
    }

    pub fn claimable_at_snapshot(&self, snapshot_id: u64, token: &TokenId) -> Result<u64, VaultError> {
        Ok(self.record(snapshot_id)?.claimable.get(token).copied().unwrap_or(0))
    }

    pub fn current_snapshot_id(&self) -> u64 {
        self.shares.current_snapshot_id()
    }

    pub fn last_snapshot_at(&self) -> u64 {
        self.last_snapshot_at
    }

    pub fn snapshot_interval(&self) -> u64 {
        self.snapshot_interval
    }

    /// Tokens currently registered with the vault.
    pub fn tokens(&self) -> Vec<TokenId> {
        self.tokens.iter().copied().collect()
    }

    /// The record of snapshot `snapshot_id`.
    pub fn snapshot_record(&self, snapshot_id: u64) -> Option<&SnapshotRecord> {
        let idx = usize::try_from(snapshot_id.checked_sub(1)?).ok()?;
        self.snapshots.get(idx)
    }

    fn record(&self, snapshot_id: u64) -> Result<&SnapshotRecord, VaultError> {
        self.snapshot_record(snapshot_id)
            .ok_or(VaultError::NonexistentSnapshot(snapshot_id))
    }

    /// Custody and share-supply invariants.
    pub fn conservation_holds(&self) -> bool {
        let custody = self.on_hand.iter().all(|(token, held)| {
            self.claim_pool(token)
                .checked_add(self.ancestor_reserve(token))
                .is_some_and(|owed| owed <= *held)
        });
        custody
            && self.shares.sum_of_balances() == self.shares.total_supply()
            && self.shares.balance_of(&self.address) == self.unclaimed_units
    }
}

#[derive(Clone, Copy)]
enum Release {
    ClaimPool,
    Reserve,
}
