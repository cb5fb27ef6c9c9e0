//! Claim Engine
//!
//! Orchestrates the register/claim/whoami state machine over the ledger
//! store and the transfer client.
//!
//! A claim runs in two phases so the system-wide store lock is never held
//! across the network call: the cooldown check runs under the lock and
//! stamps a persisted `claim_pending_since` marker before releasing it, the
//! transfer runs without the lock, and the commit re-acquires the lock. The
//! persisted marker serializes claims per identity across threads and
//! independent processes; concurrent attempts while it is live are rejected
//! as `ClaimInProgress`. `last_claim_at` moves if and only if the transfer
//! service confirmed success, and once committed a cooldown window is
//! binding.

use std::sync::Arc;

use tracing::{info, warn};

use crate::address::Address;
use crate::client::TransferApi;
use crate::error::FaucetError;
use crate::store::{Commit, LedgerStore};

/// Time source in unix seconds; injectable for deterministic tests.
pub type TimeSource = Arc<dyn Fn() -> i64 + Send + Sync>;

fn system_time_source() -> TimeSource {
    Arc::new(|| chrono::Utc::now().timestamp())
}

/// Tunables for the claim state machine.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Credits moved per successful claim.
    pub amount: u64,
    /// Cooldown window between successful claims, in seconds.
    pub cooldown_secs: i64,
    /// Age after which a dangling pending marker (crash between check and
    /// commit) is treated as abandoned. Must exceed the transfer timeout.
    pub claim_stale_secs: i64,
}

/// Result of a successful registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub address: Address,
}

/// Result of a successful claim: what was sent, and the balances the
/// transfer service reported.
#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    pub address: Address,
    pub amount: u64,
    pub from_credits: i64,
    pub to_credits: i64,
}

/// Read-only view of an identity's registration and cooldown state.
#[derive(Debug, Clone)]
pub struct WhoAmI {
    pub address: Address,
    /// Seconds until the next claim is allowed; 0 when ready.
    pub cooldown_remaining_secs: i64,
}

pub struct ClaimEngine {
    store: LedgerStore,
    client: Arc<dyn TransferApi>,
    settings: EngineSettings,
    /// The faucet's own source account, resolved once at startup. `None`
    /// degrades the self-address guard without blocking operation.
    operator_address: Option<Address>,
    now: TimeSource,
}

impl ClaimEngine {
    pub fn new(store: LedgerStore, client: Arc<dyn TransferApi>, settings: EngineSettings) -> Self {
        Self {
            store,
            client,
            settings,
            operator_address: None,
            now: system_time_source(),
        }
    }

    pub fn with_operator_address(mut self, address: Option<Address>) -> Self {
        self.operator_address = address;
        self
    }

    pub fn with_time_source(mut self, now: TimeSource) -> Self {
        self.now = now;
        self
    }

    pub fn operator_address(&self) -> Option<&Address> {
        self.operator_address.as_ref()
    }

    /// Resolve the operator's own payout address via `GET /me`, best-effort.
    /// Failure skips the self-address guard; it never blocks startup.
    pub async fn resolve_operator_address(&mut self) {
        match self.client.identify().await {
            Ok(identity) => match Address::parse(&identity.account_id) {
                Ok(addr) => {
                    info!(operator = %addr, "resolved faucet source address");
                    self.operator_address = Some(addr);
                }
                Err(_) => {
                    warn!(
                        account_id = %identity.account_id,
                        "operator account id is not a valid address; self-address guard disabled"
                    );
                }
            },
            Err(e) => {
                warn!("could not resolve operator address ({e}); self-address guard disabled");
            }
        }
    }

    fn is_operator(&self, address: &Address) -> bool {
        self.operator_address.as_ref() == Some(address)
    }

    /// Register (or re-register) the payout address for an identity.
    ///
    /// Re-registration replaces the address and refreshes `registered_at`
    /// but never resets the cooldown.
    pub fn register(&self, identity: &str, raw_address: &str) -> Result<Registration, FaucetError> {
        let address = Address::parse(raw_address)?;
        if self.is_operator(&address) {
            return Err(FaucetError::SelfAddressRejected);
        }

        let now = (self.now)();
        let stored = self.store.with_exclusive(|ledger| {
            let rec = ledger.entry(identity);
            rec.address = Some(address.clone());
            rec.registered_at = now;
            Ok::<_, FaucetError>((address.clone(), Commit::Persist))
        })?;

        info!(identity, address = %stored, "address registered");
        Ok(Registration { address: stored })
    }

    /// Attempt a claim for an identity.
    pub async fn claim(&self, identity: &str) -> Result<ClaimOutcome, FaucetError> {
        let now = (self.now)();
        let cooldown = self.settings.cooldown_secs;
        let stale = self.settings.claim_stale_secs;
        let operator = self.operator_address.clone();

        // Phase 1: eligibility check and pending marker, under the lock.
        let destination = self.store.with_exclusive(|ledger| {
            let Some(rec) = ledger.users.get_mut(identity) else {
                return Err(FaucetError::NotRegistered);
            };
            let Some(address) = rec.address.clone() else {
                return Err(FaucetError::NotRegistered);
            };
            // Re-check in case the operator address was learned after this
            // identity registered.
            if operator.as_ref() == Some(&address) {
                return Err(FaucetError::SelfAddressRejected);
            }
            if let Some(since) = rec.claim_pending_since {
                if now - since < stale {
                    return Err(FaucetError::ClaimInProgress);
                }
                warn!(identity, since, "reclaiming stale pending-claim marker");
            }
            if rec.last_claim_at != 0 && now < rec.last_claim_at + cooldown {
                return Err(FaucetError::CooldownActive {
                    remaining_secs: rec.last_claim_at + cooldown - now,
                });
            }
            rec.claim_pending_since = Some(now);
            Ok((address, Commit::Persist))
        })?;

        // Phase 2: the only long-latency call, outside the lock.
        let transfer_result = self.client.transfer(&destination, self.settings.amount).await;

        let receipt = match transfer_result {
            Ok(receipt) => receipt,
            Err(e) => {
                self.clear_pending_marker(identity);
                return Err(FaucetError::from_transfer(e));
            }
        };

        // Commit: re-acquire the lock and bind the cooldown window. A save
        // failure here must reach the caller; the transfer happened, and
        // silently losing the cooldown would permit a double-spend.
        let outcome = self.store.with_exclusive(|ledger| {
            let rec = ledger.entry(identity);
            rec.claim_pending_since = None;
            rec.last_claim_at = now;
            Ok::<_, FaucetError>((
                ClaimOutcome {
                    address: destination.clone(),
                    amount: self.settings.amount,
                    from_credits: receipt.from_credits,
                    to_credits: receipt.to_credits,
                },
                Commit::Persist,
            ))
        })?;

        info!(
            identity,
            address = %outcome.address,
            amount = outcome.amount,
            "claim committed"
        );
        Ok(outcome)
    }

    /// Read-only registration and cooldown status: one consistent read.
    pub fn whoami(&self, identity: &str) -> Result<WhoAmI, FaucetError> {
        let now = (self.now)();
        let cooldown = self.settings.cooldown_secs;
        self.store.with_exclusive(|ledger| {
            let rec = ledger.get(identity).ok_or(FaucetError::NotRegistered)?;
            let address = rec.address.clone().ok_or(FaucetError::NotRegistered)?;
            let remaining = if rec.last_claim_at == 0 {
                0
            } else {
                (rec.last_claim_at + cooldown - now).max(0)
            };
            Ok((
                WhoAmI {
                    address,
                    cooldown_remaining_secs: remaining,
                },
                Commit::Discard,
            ))
        })
    }

    /// Clear the pending marker after a failed transfer. A store failure
    /// here is logged, not propagated: the claim already failed, and the
    /// stale-marker TTL reclaims a marker we could not clear.
    fn clear_pending_marker(&self, identity: &str) {
        let result = self.store.with_exclusive(|ledger| {
            if let Some(rec) = ledger.users.get_mut(identity) {
                rec.claim_pending_since = None;
            }
            Ok::<_, FaucetError>(((), Commit::Persist))
        });
        if let Err(e) = result {
            warn!(identity, "failed to clear pending-claim marker: {e}");
        }
    }
}
