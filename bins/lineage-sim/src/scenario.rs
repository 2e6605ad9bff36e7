//! Scenario steps and the runner that applies them to a module.
//!
//! Nodes, accounts and tokens are named by labels and resolved with
//! `from_label`. Party strings select an account kind:
//! - `ip:<name>`: the node's own account
//! - `vault:<name>`: the node's vault
//! - anything else: an external account

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use lineage_core::collaborators::MemoryDisputes;
use lineage_core::types::{vault_address, Address, IpId, TokenId};
use lineage_module::{Collaborators, RoyaltyConfig, RoyaltyModule};
use serde::Deserialize;
use tracing::{debug, info};

use crate::report::{LedgerRow, PoolRow, Report, TokenRow, VaultRow};

/// Caller used for every permissioned entry point.
const OPERATOR: &str = "sim-operator";

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parsing scenario")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    RegisterRoot { ip: String, #[serde(default)] at: u64 },
    LinkParents { child: String, parents: Vec<String>, percents: Vec<u64>, #[serde(default)] at: u64 },
    LinkParent { child: String, parent: String, percent: u64, #[serde(default)] at: u64 },
    Fund { account: String, token: String, amount: u64 },
    Pay { payer: String, ip: String, token: String, amount: u64 },
    Snapshot { ip: String, at: u64 },
    Claim { holder: String, ip: String, snapshots: Vec<u64>, token: String },
    ClaimAsVault { claimer: String, target: String, snapshots: Vec<u64>, token: String },
    Collect { child: String, ancestor: String },
    TransferShares { ip: String, from: String, to: String, amount: u64 },
    RegisterGroup { group: String, #[serde(default)] at: u64 },
    AddMember { group: String, member: String, #[serde(default)] at: u64 },
    RemoveMember { group: String, member: String },
    DepositReward { payer: String, group: String, token: String, amount: u64 },
    CollectFromVault { group: String, snapshots: Vec<u64>, token: String },
    Distribute { group: String, token: String, members: Vec<String> },
    Freeze { ip: String },
    Unfreeze { ip: String },
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::RegisterRoot { .. } => "register_root",
            Step::LinkParents { .. } => "link_parents",
            Step::LinkParent { .. } => "link_parent",
            Step::Fund { .. } => "fund",
            Step::Pay { .. } => "pay",
            Step::Snapshot { .. } => "snapshot",
            Step::Claim { .. } => "claim",
            Step::ClaimAsVault { .. } => "claim_as_vault",
            Step::Collect { .. } => "collect",
            Step::TransferShares { .. } => "transfer_shares",
            Step::RegisterGroup { .. } => "register_group",
            Step::AddMember { .. } => "add_member",
            Step::RemoveMember { .. } => "remove_member",
            Step::DepositReward { .. } => "deposit_reward",
            Step::CollectFromVault { .. } => "collect_from_vault",
            Step::Distribute { .. } => "distribute",
            Step::Freeze { .. } => "freeze",
            Step::Unfreeze { .. } => "unfreeze",
        }
    }
}

/// Applies steps to an in-memory module and remembers the labels it saw.
pub struct Runner {
    module: RoyaltyModule,
    disputes: Arc<MemoryDisputes>,
    operator: Address,
    nodes: BTreeMap<String, String>,
    accounts: BTreeMap<String, String>,
    tokens: BTreeMap<String, TokenId>,
    applied: usize,
}

impl Runner {
    pub fn new(config: RoyaltyConfig) -> Result<Self> {
        let disputes = Arc::new(MemoryDisputes::new());
        let collaborators = Collaborators {
            disputes: disputes.clone(),
            ..Collaborators::open()
        };
        let module = RoyaltyModule::new(config, collaborators).context("building module")?;
        Ok(Self {
            module,
            disputes,
            operator: Address::from_label(OPERATOR),
            nodes: BTreeMap::new(),
            accounts: BTreeMap::new(),
            tokens: BTreeMap::new(),
            applied: 0,
        })
    }

    fn ip(&mut self, name: &str) -> IpId {
        let id = IpId::from_label(name);
        self.nodes.insert(id.to_string(), name.to_string());
        self.accounts
            .entry(vault_address(&id).to_string())
            .or_insert_with(|| format!("vault:{name}"));
        self.accounts
            .entry(Address::from(id).to_string())
            .or_insert_with(|| format!("ip:{name}"));
        id
    }

    fn token(&mut self, name: &str) -> TokenId {
        let id = TokenId::from_label(name);
        self.tokens.insert(name.to_string(), id);
        id
    }

    fn party(&mut self, name: &str) -> Address {
        let address = if let Some(node) = name.strip_prefix("ip:") {
            Address::from(self.ip(node))
        } else if let Some(node) = name.strip_prefix("vault:") {
            vault_address(&self.ip(node))
        } else {
            Address::from_label(name)
        };
        self.accounts.insert(address.to_string(), name.to_string());
        address
    }

    /// Apply every step in order, stopping at the first failure.
    pub fn run(&mut self, scenario: &Scenario) -> Result<()> {
        for (index, step) in scenario.steps.iter().enumerate() {
            self.apply(step)
                .with_context(|| format!("step {index} ({}) failed", step.name()))?;
            self.applied += 1;
        }
        info!(steps = self.applied, "sim: scenario complete");
        Ok(())
    }

    fn apply(&mut self, step: &Step) -> Result<()> {
        debug!(op = step.name(), "sim: applying step");
        let op = self.operator;
        match step {
            Step::RegisterRoot { ip, at } => {
                let ip = self.ip(ip);
                self.module.register_root(op, ip, *at)?;
            }
            Step::LinkParents { child, parents, percents, at } => {
                let child = self.ip(child);
                let parents: Vec<IpId> = parents.iter().map(|p| self.ip(p)).collect();
                self.module.link_to_parents(op, child, &parents, percents, *at)?;
            }
            Step::LinkParent { child, parent, percent, at } => {
                let child = self.ip(child);
                let parent = self.ip(parent);
                self.module.link_to_parent(op, child, parent, *percent, *at)?;
            }
            Step::Fund { account, token, amount } => {
                let account = self.party(account);
                let token = self.token(token);
                self.module.fund(account, token, *amount)?;
            }
            Step::Pay { payer, ip, token, amount } => {
                let payer = self.party(payer);
                let ip = self.ip(ip);
                let token = self.token(token);
                self.module.pay(payer, ip, token, *amount)?;
            }
            Step::Snapshot { ip, at } => {
                let ip = self.ip(ip);
                self.module.snapshot(&ip, *at)?;
            }
            Step::Claim { holder, ip, snapshots, token } => {
                let holder = self.party(holder);
                let ip = self.ip(ip);
                let token = self.token(token);
                self.module.claim_by_snapshot_batch(holder, &ip, snapshots, token)?;
            }
            Step::ClaimAsVault { claimer, target, snapshots, token } => {
                let claimer = self.ip(claimer);
                let target = self.ip(target);
                let token = self.token(token);
                self.module.claim_as_vault(&claimer, &target, snapshots, token)?;
            }
            Step::Collect { child, ancestor } => {
                let child = self.ip(child);
                let ancestor = self.ip(ancestor);
                self.module.collect_ancestor_share(op, &child, &ancestor)?;
            }
            Step::TransferShares { ip, from, to, amount } => {
                let ip = self.ip(ip);
                let from = self.party(from);
                let to = self.party(to);
                self.module.transfer_shares(op, &ip, from, to, *amount)?;
            }
            Step::RegisterGroup { group, at } => {
                let group = self.ip(group);
                self.module.register_group(op, group, *at)?;
            }
            Step::AddMember { group, member, at } => {
                let group = self.ip(group);
                let member = self.ip(member);
                self.module.add_member(op, &group, member, *at)?;
            }
            Step::RemoveMember { group, member } => {
                let group = self.ip(group);
                let member = self.ip(member);
                self.module.remove_member(op, &group, &member)?;
            }
            Step::DepositReward { payer, group, token, amount } => {
                let payer = self.party(payer);
                let group = self.ip(group);
                let token = self.token(token);
                self.module.deposit_reward(payer, &group, token, *amount)?;
            }
            Step::CollectFromVault { group, snapshots, token } => {
                let group = self.ip(group);
                let token = self.token(token);
                self.module.collect_from_vault(&group, snapshots, token)?;
            }
            Step::Distribute { group, token, members } => {
                let group = self.ip(group);
                let token = self.token(token);
                let members: Vec<IpId> = members.iter().map(|m| self.ip(m)).collect();
                self.module.distribute(&group, token, &members)?;
            }
            Step::Freeze { ip } => {
                let ip = self.ip(ip);
                self.disputes.freeze(ip);
            }
            Step::Unfreeze { ip } => {
                let ip = self.ip(ip);
                self.disputes.unfreeze(&ip);
            }
        }
        Ok(())
    }

    fn node_label(&self, key: String) -> String {
        self.nodes.get(&key).cloned().unwrap_or(key)
    }

    fn account_label(&self, key: String) -> String {
        self.accounts.get(&key).cloned().unwrap_or(key)
    }

    /// Counters of every vault and pool plus the external ledger.
    pub fn report(&self) -> Report {
        let m = &self.module;
        let vaults = m
            .vault_ids()
            .into_iter()
            .filter_map(|id| m.vault(&id))
            .map(|vault| VaultRow {
                ip: self.node_label(vault.ip().to_string()),
                unclaimed_units: vault.unclaimed_units(),
                snapshots: vault.current_snapshot_id(),
                holders: vault
                    .share_holders()
                    .into_iter()
                    .map(|(a, units)| (self.account_label(a.to_string()), units))
                    .collect(),
                tokens: self
                    .tokens
                    .iter()
                    .filter(|(_, t)| vault.on_hand(t) > 0 || vault.ancestor_reserve(t) > 0)
                    .map(|(name, t)| TokenRow {
                        token: name.clone(),
                        on_hand: vault.on_hand(t),
                        claim_pool: vault.claim_pool(t),
                        ancestor_reserve: vault.ancestor_reserve(t),
                    })
                    .collect(),
            })
            .collect();
        let pools = m
            .group_ids()
            .into_iter()
            .filter_map(|id| m.pool(&id))
            .map(|pool| PoolRow {
                group: self.node_label(pool.group().to_string()),
                members: pool.members().iter().map(|id| self.node_label(id.to_string())).collect(),
                balances: self
                    .tokens
                    .iter()
                    .map(|(name, t)| (name.clone(), pool.balance(t)))
                    .filter(|(_, b)| *b > 0)
                    .collect(),
            })
            .collect();
        let token_names: BTreeMap<String, String> =
            self.tokens.iter().map(|(name, t)| (t.to_string(), name.clone())).collect();
        let ledger = m
            .ledger()
            .non_zero_balances()
            .into_iter()
            .map(|(account, token, balance)| LedgerRow {
                account: self.account_label(account.to_string()),
                token: token_names.get(&token.to_string()).cloned().unwrap_or_else(|| token.to_string()),
                balance,
            })
            .collect();
        let tokens: Vec<TokenId> = self.tokens.values().copied().collect();
        Report {
            steps: self.applied,
            conservation: m.conservation_holds(&tokens),
            vaults,
            pools,
            ledger,
        }
    }
}
