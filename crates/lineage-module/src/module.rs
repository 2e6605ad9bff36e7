//! The royalty module: one entry surface over graph, policies, vaults and
//! group pools.
//!
//! Every entry point validates fully before mutating. Payouts returned by a
//! vault or pool are executed here: a payout to a vault address becomes a
//! deposit into that vault, a payout to a pool address becomes a reward
//! deposit into that pool, and anything else is credited on the external
//! [`RevenueLedger`]. A batch is applied only when every recipient can take
//! it; otherwise the vault or pool it came from is restored. The optional
//! [`PayoutHook`] is notified of external payouts only after every internal
//! effect of the call has been applied.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use lineage_core::collaborators::OpenAccess;
use lineage_core::error::{LedgerError, PoolError, VaultError};
use lineage_core::ledger::RevenueLedger;
use lineage_core::traits::{AccessControl, DisputeStatus, IpRegistry, NoDisputes, OpenRegistry, PayoutHook};
use lineage_core::types::{vault_address, Address, IpId, Payout, TokenId};
use lineage_graph::GraphOracle;
use lineage_policy::{AncestorStackPolicy, PathDecayPolicy, PathLink, StackLink};
use lineage_vault::{GroupRewardPool, RoyaltyVault};
use tracing::{debug, info, warn};

use crate::config::RoyaltyConfig;
use crate::error::ModuleError;

/// Handles to the systems the module consults but does not own.
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn IpRegistry>,
    pub disputes: Arc<dyn DisputeStatus>,
    pub access: Arc<dyn AccessControl>,
    pub hook: Option<Arc<dyn PayoutHook>>,
}

impl Collaborators {
    /// Every node registered, none frozen, every caller authorized.
    pub fn open() -> Self {
        Self {
            registry: Arc::new(OpenRegistry),
            disputes: Arc::new(NoDisputes),
            access: Arc::new(OpenAccess),
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn PayoutHook>) -> Self {
        self.hook = Some(hook);
        self
    }
}

/// Pre-call copy of the component a batch of payouts is drawn from.
enum Custody {
    Vault(IpId, RoyaltyVault),
    Pool(IpId, GroupRewardPool),
}

/// Composition root of the protocol.
pub struct RoyaltyModule {
    config: RoyaltyConfig,
    oracle: GraphOracle,
    lap: AncestorStackPolicy,
    lrp: PathDecayPolicy,
    vaults: HashMap<IpId, RoyaltyVault>,
    vault_owners: HashMap<Address, IpId>,
    pools: HashMap<IpId, GroupRewardPool>,
    pool_owners: HashMap<Address, IpId>,
    ledger: RevenueLedger,
    collaborators: Collaborators,
}

impl RoyaltyModule {
    /// Build a module from a validated configuration.
    pub fn new(config: RoyaltyConfig, collaborators: Collaborators) -> Result<Self, ModuleError> {
        config.validate()?;
        info!(
            snapshot_interval_secs = config.snapshot_interval_secs,
            max_parents = config.max_parents,
            max_ancestors = config.max_ancestors,
            max_royalty_stack = config.max_royalty_stack,
            "module: initialized"
        );
        Ok(Self {
            lap: AncestorStackPolicy::new(config.stack_limits()),
            lrp: PathDecayPolicy::new(config.max_royalty_stack),
            config,
            oracle: GraphOracle::new(),
            vaults: HashMap::new(),
            vault_owners: HashMap::new(),
            pools: HashMap::new(),
            pool_owners: HashMap::new(),
            ledger: RevenueLedger::new(),
            collaborators,
        })
    }

    // ------------------------------------------------------------------
    // Guards
    // ------------------------------------------------------------------

    fn ensure_registered(&self, ip: &IpId) -> Result<(), ModuleError> {
        if !self.collaborators.registry.is_registered(ip) {
            return Err(ModuleError::NotRegistered(*ip));
        }
        Ok(())
    }

    fn ensure_authorized(&self, ip: &IpId, caller: &Address) -> Result<(), ModuleError> {
        if !self.collaborators.access.is_authorized(ip, caller) {
            warn!(ip = %ip.short(), caller = %caller.short(), "module: unauthorized caller");
            return Err(ModuleError::Unauthorized { ip: *ip, caller: *caller });
        }
        Ok(())
    }

    fn ensure_not_frozen(&self, ip: &IpId) -> Result<(), ModuleError> {
        if self.collaborators.disputes.is_frozen(ip) {
            warn!(ip = %ip.short(), "module: frozen asset");
            return Err(ModuleError::FrozenAsset(*ip));
        }
        Ok(())
    }

    fn ensure_no_vault(&self, ip: &IpId) -> Result<(), ModuleError> {
        if self.vaults.contains_key(ip) {
            return Err(ModuleError::VaultExists(*ip));
        }
        Ok(())
    }

    fn vault_ref(&self, ip: &IpId) -> Result<&RoyaltyVault, ModuleError> {
        self.vaults.get(ip).ok_or(ModuleError::UnknownVault(*ip))
    }

    fn vault_mut(&mut self, ip: &IpId) -> Result<&mut RoyaltyVault, ModuleError> {
        self.vaults.get_mut(ip).ok_or(ModuleError::UnknownVault(*ip))
    }

    fn pool_ref(&self, group: &IpId) -> Result<&GroupRewardPool, ModuleError> {
        self.pools.get(group).ok_or(ModuleError::UnknownGroup(*group))
    }

    fn pool_mut(&mut self, group: &IpId) -> Result<&mut GroupRewardPool, ModuleError> {
        self.pools.get_mut(group).ok_or(ModuleError::UnknownGroup(*group))
    }

    fn open_vault(&mut self, ip: IpId, unclaimed_units: u64, now: u64) -> Result<(), ModuleError> {
        let vault = RoyaltyVault::new(
            ip,
            Address::from(ip),
            unclaimed_units,
            now,
            self.config.snapshot_interval_secs,
            Arc::clone(&self.collaborators.disputes),
        )?;
        self.vault_owners.insert(vault.address(), ip);
        self.vaults.insert(ip, vault);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Payout execution
    // ------------------------------------------------------------------

    /// Check that every recipient of `payouts` can absorb its total without
    /// overflow. Nothing is changed.
    fn check_routable(&self, payouts: &[Payout]) -> Result<(), ModuleError> {
        let mut totals: BTreeMap<(Address, TokenId), u64> = BTreeMap::new();
        for payout in payouts {
            let total = totals.entry((payout.to, payout.token)).or_insert(0);
            *total = total
                .checked_add(payout.amount)
                .ok_or(LedgerError::ArithmeticOverflow)?;
        }
        for ((to, token), amount) in totals {
            if let Some(ip) = self.vault_owners.get(&to) {
                self.vault_ref(ip)?
                    .on_hand(&token)
                    .checked_add(amount)
                    .ok_or(VaultError::ArithmeticOverflow)?;
                continue;
            }
            if let Some(group) = self.pool_owners.get(&to) {
                let pool = self.pool_ref(group)?;
                if pool.member_count() > 0 {
                    // Balance and dust never exceed the cumulative total.
                    pool.total_deposited(&token)
                        .checked_add(amount)
                        .ok_or(PoolError::ArithmeticOverflow)?;
                    continue;
                }
            }
            self.ledger
                .balance(&to, &token)
                .checked_add(amount)
                .ok_or(LedgerError::ArithmeticOverflow)?;
        }
        Ok(())
    }

    /// Put `backup` back in place if `payouts` cannot be routed, so the
    /// source of the payouts is left as it was before the call.
    fn ensure_routable(&mut self, backup: Custody, payouts: &[Payout]) -> Result<(), ModuleError> {
        let Err(e) = self.check_routable(payouts) else {
            return Ok(());
        };
        match backup {
            Custody::Vault(ip, vault) => {
                self.vaults.insert(ip, vault);
            }
            Custody::Pool(group, pool) => {
                self.pools.insert(group, pool);
            }
        }
        warn!(error = %e, "module: payouts not routable, source restored");
        Err(e)
    }

    /// Apply `payouts` and return those that left the protocol.
    fn route(&mut self, payouts: &[Payout]) -> Result<Vec<Payout>, ModuleError> {
        let mut external = Vec::new();
        for payout in payouts {
            if let Some(ip) = self.vault_owners.get(&payout.to).copied() {
                self.vault_mut(&ip)?.deposit(payout.token, payout.amount)?;
                continue;
            }
            if let Some(group) = self.pool_owners.get(&payout.to).copied() {
                let pool = self.pool_mut(&group)?;
                if pool.member_count() > 0 {
                    pool.deposit_reward(payout.token, payout.amount)?;
                    continue;
                }
                warn!(group = %group.short(), amount = payout.amount, "module: pool has no members, crediting pool account");
            }
            self.ledger.credit(payout.to, payout.token, payout.amount)?;
            debug!(%payout, "module: external payout");
            external.push(*payout);
        }
        Ok(external)
    }

    fn notify(&self, external: &[Payout]) {
        if let Some(hook) = &self.collaborators.hook {
            for payout in external {
                hook.on_payout(payout);
            }
        }
    }

    fn execute(&mut self, payouts: Vec<Payout>) -> Result<Vec<Payout>, ModuleError> {
        let external = self.route(&payouts)?;
        self.notify(&external);
        Ok(payouts)
    }

    // ------------------------------------------------------------------
    // Registration and linking
    // ------------------------------------------------------------------

    /// Register `ip` as a root node with its own vault.
    pub fn register_root(&mut self, caller: Address, ip: IpId, now: u64) -> Result<(), ModuleError> {
        self.ensure_registered(&ip)?;
        self.ensure_authorized(&ip, &caller)?;
        self.ensure_no_vault(&ip)?;
        self.lap.on_root(ip)?;
        self.open_vault(ip, 0, now)?;
        info!(ip = %ip.short(), "module: root registered");
        Ok(())
    }

    /// Link `child` to `parents` under the additive ancestor-stack policy.
    ///
    /// The child's vault reserves `royalty_stack` share units for its
    /// ancestors to collect.
    pub fn link_to_parents(
        &mut self,
        caller: Address,
        child: IpId,
        parents: &[IpId],
        percents: &[u64],
        now: u64,
    ) -> Result<StackLink, ModuleError> {
        self.ensure_registered(&child)?;
        self.ensure_authorized(&child, &caller)?;
        self.ensure_not_frozen(&child)?;
        self.ensure_no_vault(&child)?;
        for parent in parents {
            self.ensure_registered(parent)?;
            self.ensure_not_frozen(parent)?;
            self.vault_ref(parent)?;
        }

        let link = self
            .lap
            .on_link_to_parents(&mut self.oracle, child, parents, percents)?;
        self.open_vault(child, link.royalty_stack, now)?;
        Ok(link)
    }

    /// Link `child` to a single `parent` under the path-decay policy.
    ///
    /// Settlements are paid in child shares at link time: the child's
    /// holder account transfers each settlement to the ancestor's vault.
    pub fn link_to_parent(
        &mut self,
        caller: Address,
        child: IpId,
        parent: IpId,
        royalty_percent: u64,
        now: u64,
    ) -> Result<PathLink, ModuleError> {
        self.ensure_registered(&child)?;
        self.ensure_registered(&parent)?;
        self.ensure_authorized(&child, &caller)?;
        self.ensure_not_frozen(&child)?;
        self.ensure_not_frozen(&parent)?;
        self.ensure_no_vault(&child)?;
        self.vault_ref(&parent)?;

        let link = self
            .lrp
            .on_link_to_parent(&mut self.oracle, child, parent, royalty_percent)?;
        self.open_vault(child, 0, now)?;
        let holder = Address::from(child);
        let vault = self.vault_mut(&child)?;
        for settlement in &link.settlements {
            vault.transfer_shares(&holder, &vault_address(&settlement.ancestor), settlement.units)?;
        }
        Ok(link)
    }

    // ------------------------------------------------------------------
    // Revenue
    // ------------------------------------------------------------------

    /// Create `amount` of `token` for an external account.
    pub fn fund(&mut self, account: Address, token: TokenId, amount: u64) -> Result<(), ModuleError> {
        self.ledger.mint(account, token, amount)?;
        Ok(())
    }

    /// Pay `amount` of `token` from an external `payer` into the vault of
    /// `ip`.
    pub fn pay(&mut self, payer: Address, ip: IpId, token: TokenId, amount: u64) -> Result<(), ModuleError> {
        let vault = self.vault_ref(&ip)?;
        vault
            .on_hand(&token)
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticOverflow)?;
        self.ledger.debit(payer, token, amount)?;
        self.vault_mut(&ip)?.deposit(token, amount)?;
        debug!(payer = %payer.short(), ip = %ip.short(), amount, "module: revenue paid");
        Ok(())
    }

    pub fn snapshot(&mut self, ip: &IpId, now: u64) -> Result<u64, ModuleError> {
        Ok(self.vault_mut(ip)?.snapshot(now)?)
    }

    pub fn claimable_revenue(
        &self,
        holder: &Address,
        ip: &IpId,
        snapshot_id: u64,
        token: &TokenId,
    ) -> Result<u64, ModuleError> {
        Ok(self.vault_ref(ip)?.claimable_revenue(holder, snapshot_id, token)?)
    }

    /// Claim several tokens from one snapshot of `ip`'s vault. Pays `caller`.
    pub fn claim_by_token_batch(
        &mut self,
        caller: Address,
        ip: &IpId,
        snapshot_id: u64,
        tokens: &[TokenId],
    ) -> Result<Vec<Payout>, ModuleError> {
        let backup = Custody::Vault(*ip, self.vault_ref(ip)?.clone());
        let payouts = self.vault_mut(ip)?.claim_by_token_batch(caller, snapshot_id, tokens)?;
        self.ensure_routable(backup, &payouts)?;
        self.execute(payouts)
    }

    /// Claim one token across several snapshots of `ip`'s vault. Pays
    /// `caller`.
    pub fn claim_by_snapshot_batch(
        &mut self,
        caller: Address,
        ip: &IpId,
        snapshot_ids: &[u64],
        token: TokenId,
    ) -> Result<Vec<Payout>, ModuleError> {
        let backup = Custody::Vault(*ip, self.vault_ref(ip)?.clone());
        let payouts = self
            .vault_mut(ip)?
            .claim_by_snapshot_batch(caller, snapshot_ids, token)?;
        self.ensure_routable(backup, &payouts)?;
        self.execute(payouts)
    }

    /// Claim, on behalf of `claimer`'s vault, the revenue its shares earned
    /// in `target`'s vault. The revenue is deposited into `claimer`'s vault.
    pub fn claim_as_vault(
        &mut self,
        claimer: &IpId,
        target: &IpId,
        snapshot_ids: &[u64],
        token: TokenId,
    ) -> Result<Vec<Payout>, ModuleError> {
        let holder = self.vault_ref(claimer)?.address();
        let backup = Custody::Vault(*target, self.vault_ref(target)?.clone());
        let payouts = self
            .vault_mut(target)?
            .claim_by_snapshot_batch(holder, snapshot_ids, token)?;
        self.ensure_routable(backup, &payouts)?;
        self.execute(payouts)
    }

    /// Collect `ancestor`'s reserved share of `child` together with the
    /// revenue accrued to that reserve.
    pub fn collect_ancestor_share(
        &mut self,
        caller: Address,
        child: &IpId,
        ancestor: &IpId,
    ) -> Result<Vec<Payout>, ModuleError> {
        if !self.collaborators.access.is_authorized(child, &caller)
            && !self.collaborators.access.is_authorized(ancestor, &caller)
        {
            warn!(child = %child.short(), caller = %caller.short(), "module: unauthorized collector");
            return Err(ModuleError::Unauthorized { ip: *child, caller });
        }
        self.ensure_not_frozen(child)?;
        self.ensure_not_frozen(ancestor)?;
        self.vault_ref(ancestor)?;
        let units = self.lap.pending_collection(child, ancestor)?;

        let ancestor_vault = vault_address(ancestor);
        let backup = Custody::Vault(*child, self.vault_ref(child)?.clone());
        let payouts = self
            .vault_mut(child)?
            .collect_ancestor_share(ancestor_vault, units)?;
        self.ensure_routable(backup, &payouts)?;
        self.lap.mark_collected(child, ancestor)?;
        info!(child = %child.short(), ancestor = %ancestor.short(), units, "module: ancestor share collected");
        self.execute(payouts)
    }

    /// Move ownership shares of `ip` from `from` to `to`.
    ///
    /// `caller` must be `from`, or authorized for `ip` when moving shares
    /// held by the node's own account.
    pub fn transfer_shares(
        &mut self,
        caller: Address,
        ip: &IpId,
        from: Address,
        to: Address,
        amount: u64,
    ) -> Result<(), ModuleError> {
        if caller != from {
            if from != Address::from(*ip) {
                return Err(ModuleError::Unauthorized { ip: *ip, caller });
            }
            self.ensure_authorized(ip, &caller)?;
        }
        self.vault_mut(ip)?.transfer_shares(&from, &to, amount)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Open a reward pool for `group`.
    pub fn register_group(&mut self, caller: Address, group: IpId, now: u64) -> Result<(), ModuleError> {
        self.ensure_registered(&group)?;
        self.ensure_authorized(&group, &caller)?;
        if self.pools.contains_key(&group) {
            return Err(ModuleError::GroupExists(group));
        }
        let pool = GroupRewardPool::new(group);
        self.pool_owners.insert(pool.address(), group);
        self.pools.insert(group, pool);
        info!(group = %group.short(), now, "module: group registered");
        Ok(())
    }

    /// Add `member` to `group`. Returns false if already a member.
    pub fn add_member(&mut self, caller: Address, group: &IpId, member: IpId, now: u64) -> Result<bool, ModuleError> {
        self.ensure_authorized(group, &caller)?;
        self.pool_ref(group)?;
        self.ensure_registered(&member)?;
        self.vault_ref(&member)?;
        Ok(self.pool_mut(group)?.add_member(member, now))
    }

    /// Pay out everything `member` is owed, then remove it from `group`.
    pub fn remove_member(&mut self, caller: Address, group: &IpId, member: &IpId) -> Result<Vec<Payout>, ModuleError> {
        self.ensure_authorized(group, &caller)?;
        let backup = Custody::Pool(*group, self.pool_ref(group)?.clone());
        let payouts = self.pool_mut(group)?.remove_member(member)?;
        self.ensure_routable(backup, &payouts)?;
        self.execute(payouts)
    }

    /// Pay `amount` of `token` from an external `payer` into `group`'s pool.
    pub fn deposit_reward(
        &mut self,
        payer: Address,
        group: &IpId,
        token: TokenId,
        amount: u64,
    ) -> Result<(), ModuleError> {
        let pool = self.pool_ref(group)?;
        if pool.member_count() == 0 {
            return Err(PoolError::NoMembers.into());
        }
        self.ledger.debit(payer, token, amount)?;
        self.pool_mut(group)?.deposit_reward(token, amount)?;
        Ok(())
    }

    /// Claim the group node's own vault revenue into its reward pool.
    /// Returns the amount moved.
    pub fn collect_from_vault(&mut self, group: &IpId, snapshot_ids: &[u64], token: TokenId) -> Result<u64, ModuleError> {
        if self.pool_ref(group)?.member_count() == 0 {
            return Err(PoolError::NoMembers.into());
        }
        let backup = self.vault_ref(group)?.clone();
        let payouts = self
            .vault_mut(group)?
            .claim_by_snapshot_batch(Address::from(*group), snapshot_ids, token)?;
        let amount: u64 = payouts.iter().map(|p| p.amount).sum();
        if amount > 0 {
            if let Err(e) = self.pool_mut(group)?.deposit_reward(token, amount) {
                self.vaults.insert(*group, backup);
                return Err(e.into());
            }
        }
        debug!(group = %group.short(), amount, "module: vault revenue moved to pool");
        Ok(amount)
    }

    /// Pay each listed member its available reward into its vault.
    pub fn distribute(&mut self, group: &IpId, token: TokenId, members: &[IpId]) -> Result<Vec<Payout>, ModuleError> {
        let backup = Custody::Pool(*group, self.pool_ref(group)?.clone());
        let payouts = self.pool_mut(group)?.distribute(token, members)?;
        self.ensure_routable(backup, &payouts)?;
        self.execute(payouts)
    }

    pub fn available_reward(&self, group: &IpId, token: &TokenId, member: &IpId) -> Result<u64, ModuleError> {
        Ok(self.pool_ref(group)?.available_reward(token, member)?)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn config(&self) -> &RoyaltyConfig {
        &self.config
    }

    pub fn oracle(&self) -> &GraphOracle {
        &self.oracle
    }

    pub fn stack_policy(&self) -> &AncestorStackPolicy {
        &self.lap
    }

    pub fn path_policy(&self) -> &PathDecayPolicy {
        &self.lrp
    }

    pub fn vault(&self, ip: &IpId) -> Option<&RoyaltyVault> {
        self.vaults.get(ip)
    }

    pub fn pool(&self, group: &IpId) -> Option<&GroupRewardPool> {
        self.pools.get(group)
    }

    pub fn ledger(&self) -> &RevenueLedger {
        &self.ledger
    }

    /// Vault nodes, sorted.
    pub fn vault_ids(&self) -> Vec<IpId> {
        let mut ids: Vec<IpId> = self.vaults.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Group nodes with a pool, sorted.
    pub fn group_ids(&self) -> Vec<IpId> {
        let mut ids: Vec<IpId> = self.pools.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Every unit of `token` held anywhere: external accounts, vaults and
    /// pools.
    pub fn total_custody(&self, token: &TokenId) -> u64 {
        let external: u64 = self
            .ledger
            .non_zero_balances()
            .iter()
            .filter(|(_, t, _)| t == token)
            .map(|(_, _, amount)| *amount)
            .sum();
        let vaults: u64 = self.vaults.values().map(|v| v.on_hand(token)).sum();
        let pools: u64 = self.pools.values().map(|p| p.balance(token)).sum();
        external + vaults + pools
    }

    /// Per-component invariants plus global conservation of every token
    /// ever minted.
    pub fn conservation_holds(&self, tokens: &[TokenId]) -> bool {
        self.vaults.values().all(RoyaltyVault::conservation_holds)
            && self.pools.values().all(GroupRewardPool::conservation_holds)
            && tokens
                .iter()
                .all(|t| self.total_custody(t) == self.ledger.total_minted(t))
    }
}
