//! Protocol constants. Royalty percentages and ownership shares share one
//! fixed-point unit: `100_000_000` units = 100%.

/// Denominator for every royalty percentage (100.000000%).
pub const PERCENT_DENOMINATOR: u64 = 100_000_000;

/// Total ownership-share supply minted for every node's vault.
///
/// One share unit equals one unit of royalty-percent resolution.
pub const TOTAL_SHARE_SUPPLY: u64 = PERCENT_DENOMINATOR;

/// Display-only decimal places of the ownership-share token.
pub const SHARE_DECIMALS: u8 = 6;

/// Upper bound on a node's additive royalty stack.
pub const MAX_ROYALTY_STACK: u64 = PERCENT_DENOMINATOR;

/// Maximum number of direct parents in a single stack link.
pub const MAX_PARENTS: usize = 14;

/// Maximum size of a node's ancestor closure under the stack policy.
pub const MAX_ANCESTORS: usize = 14;

/// Default minimum time between two vault snapshots (7 days).
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Domain separator for vault address derivation.
pub const VAULT_ADDRESS_DOMAIN: &[u8] = b"lineage/royalty-vault/v1";

/// Domain separator for group pool address derivation.
pub const POOL_ADDRESS_DOMAIN: &[u8] = b"lineage/group-pool/v1";

/// Domain separator for label-derived identifiers.
pub const LABEL_DOMAIN: &[u8] = b"lineage/label/v1";
