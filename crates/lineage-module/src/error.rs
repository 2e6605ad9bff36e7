//! Errors returned by the royalty module.
use lineage_core::error::{GraphError, LedgerError, PolicyError, PoolError, VaultError};
use lineage_core::types::{Address, IpId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    #[error("{caller} is not authorized for {ip}")] Unauthorized { ip: IpId, caller: Address },
    #[error("node not registered: {0}")] NotRegistered(IpId),
    #[error("node is frozen by a dispute: {0}")] FrozenAsset(IpId),
    #[error("no vault for node: {0}")] UnknownVault(IpId),
    #[error("no reward pool for group: {0}")] UnknownGroup(IpId),
    #[error("vault already exists for node: {0}")] VaultExists(IpId),
    #[error("reward pool already exists for group: {0}")] GroupExists(IpId),
    #[error("reentrant call rejected")] Reentrancy,
    #[error("invalid configuration: {0}")] Config(String),
    #[error(transparent)] Graph(#[from] GraphError),
    #[error(transparent)] Policy(#[from] PolicyError),
    #[error(transparent)] Vault(#[from] VaultError),
    #[error(transparent)] Pool(#[from] PoolError),
    #[error(transparent)] Ledger(#[from] LedgerError),
}
