//! Reentrancy-guarded handle to a [`RoyaltyModule`].
//!
//! Calls from different threads serialize on a reentrant mutex. A call made
//! on a thread that is already inside the module (for example a
//! [`PayoutHook`](lineage_core::traits::PayoutHook) calling back while a
//! claim is being paid) re-acquires the mutex but finds the module already
//! borrowed, and fails with [`ModuleError::Reentrancy`] without touching any
//! state.

use std::cell::RefCell;
use std::sync::Arc;

use lineage_core::types::{Address, IpId, Payout, TokenId};
use parking_lot::ReentrantMutex;
use tracing::warn;

use crate::error::ModuleError;
use crate::module::RoyaltyModule;

/// Cloneable, thread-safe handle to one module instance.
#[derive(Clone)]
pub struct SharedRoyaltyModule {
    inner: Arc<ReentrantMutex<RefCell<RoyaltyModule>>>,
}

impl SharedRoyaltyModule {
    pub fn new(module: RoyaltyModule) -> Self {
        Self {
            inner: Arc::new(ReentrantMutex::new(RefCell::new(module))),
        }
    }

    /// Run `f` with exclusive access to the module.
    pub fn with<R>(&self, f: impl FnOnce(&mut RoyaltyModule) -> Result<R, ModuleError>) -> Result<R, ModuleError> {
        let guard = self.inner.lock();
        let mut module = guard.try_borrow_mut().map_err(|_| {
            warn!("module: reentrant call rejected");
            ModuleError::Reentrancy
        })?;
        f(&mut module)
    }

    /// Run `f` with shared access to the module.
    pub fn read<R>(&self, f: impl FnOnce(&RoyaltyModule) -> R) -> Result<R, ModuleError> {
        let guard = self.inner.lock();
        let module = guard.try_borrow().map_err(|_| {
            warn!("module: reentrant read rejected");
            ModuleError::Reentrancy
        })?;
        Ok(f(&module))
    }

    pub fn pay(&self, payer: Address, ip: IpId, token: TokenId, amount: u64) -> Result<(), ModuleError> {
        self.with(|m| m.pay(payer, ip, token, amount))
    }

    pub fn snapshot(&self, ip: &IpId, now: u64) -> Result<u64, ModuleError> {
        self.with(|m| m.snapshot(ip, now))
    }

    pub fn claim_by_token_batch(
        &self,
        caller: Address,
        ip: &IpId,
        snapshot_id: u64,
        tokens: &[TokenId],
    ) -> Result<Vec<Payout>, ModuleError> {
        self.with(|m| m.claim_by_token_batch(caller, ip, snapshot_id, tokens))
    }

    pub fn claim_by_snapshot_batch(
        &self,
        caller: Address,
        ip: &IpId,
        snapshot_ids: &[u64],
        token: TokenId,
    ) -> Result<Vec<Payout>, ModuleError> {
        self.with(|m| m.claim_by_snapshot_batch(caller, ip, snapshot_ids, token))
    }

    pub fn collect_ancestor_share(&self, caller: Address, child: &IpId, ancestor: &IpId) -> Result<Vec<Payout>, ModuleError> {
        self.with(|m| m.collect_ancestor_share(caller, child, ancestor))
    }

    pub fn distribute(&self, group: &IpId, token: TokenId, members: &[IpId]) -> Result<Vec<Payout>, ModuleError> {
        self.with(|m| m.distribute(group, token, members))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoyaltyConfig;
    use crate::module::Collaborators;
    use lineage_core::traits::PayoutHook;
    use parking_lot::Mutex;
    use std::thread;

    const WEEK: u64 = 7 * 24 * 3600;

    /// Hook that tries to claim again from inside a payout.
    #[derive(Default)]
    struct Reentrant {
        handle: Mutex<Option<SharedRoyaltyModule>>,
        outcomes: Mutex<Vec<Result<Vec<Payout>, ModuleError>>>,
    }

    impl PayoutHook for Reentrant {
        fn on_payout(&self, payout: &Payout) {
            let handle = self.handle.lock().clone();
            if let Some(handle) = handle {
                let again = handle.claim_by_token_batch(payout.to, &IpId::from_label("a"), 1, &[payout.token]);
                self.outcomes.lock().push(again);
            }
        }
    }

    fn funded(collaborators: Collaborators) -> SharedRoyaltyModule {
        let mut m = RoyaltyModule::new(RoyaltyConfig::default(), collaborators).unwrap();
        let a = IpId::from_label("a");
        m.register_root(Address::from_label("op"), a, 0).unwrap();
        m.fund(Address::from_label("payer"), TokenId::from_label("usd"), 100).unwrap();
        m.pay(Address::from_label("payer"), a, TokenId::from_label("usd"), 100).unwrap();
        m.snapshot(&a, WEEK).unwrap();
        SharedRoyaltyModule::new(m)
    }

    #[test]
    fn hook_reentry_rejected() {
        let hook = Arc::new(Reentrant::default());
        let shared = funded(Collaborators::open().with_hook(hook.clone()));
        *hook.handle.lock() = Some(shared.clone());

        let a = IpId::from_label("a");
        let usd = TokenId::from_label("usd");
        let paid = shared.claim_by_token_batch(Address::from(a), &a, 1, &[usd]).unwrap();
        assert_eq!(paid[0].amount, 100);

        let outcomes = hook.outcomes.lock();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0], Err(ModuleError::Reentrancy));

        let balance = shared.read(|m| m.ledger().balance(&Address::from(a), &usd)).unwrap();
        assert_eq!(balance, 100);
        *hook.handle.lock() = None;
    }

    #[test]
    fn threads_serialize() {
        let shared = funded(Collaborators::open());
        let a = IpId::from_label("a");
        let usd = TokenId::from_label("usd");
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || shared.claim_by_token_batch(Address::from(a), &a, 1, &[usd]).unwrap())
            })
            .collect();
        let total: u64 = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .map(|p| p.amount)
            .sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn reads_after_writes_see_state() {
        let shared = funded(Collaborators::open());
        let id = shared.read(|m| m.vault(&IpId::from_label("a")).map(|v| v.current_snapshot_id())).unwrap();
        assert_eq!(id, Some(1));
    }
}
