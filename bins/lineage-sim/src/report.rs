//! JSON report printed after a scenario run.
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Number of steps applied.
    pub steps: usize,
    /// Whether every vault, pool and token balanced at the end of the run.
    pub conservation: bool,
    pub vaults: Vec<VaultRow>,
    pub pools: Vec<PoolRow>,
    pub ledger: Vec<LedgerRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VaultRow {
    pub ip: String,
    pub unclaimed_units: u64,
    pub snapshots: u64,
    pub holders: Vec<(String, u64)>,
    pub tokens: Vec<TokenRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenRow {
    pub token: String,
    pub on_hand: u64,
    pub claim_pool: u64,
    pub ancestor_reserve: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolRow {
    pub group: String,
    pub members: Vec<String>,
    pub balances: Vec<(String, u64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerRow {
    pub account: String,
    pub token: String,
    pub balance: u64,
}
