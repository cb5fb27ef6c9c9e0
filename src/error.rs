//! Faucet Error Taxonomy
//!
//! Every variant is recoverable from the caller's perspective and maps to a
//! user-facing message. The only fatal condition in the system is missing
//! required configuration at startup, which never reaches this type.

use std::fmt;

use thiserror::Error;

use crate::client::TransferError;
use crate::store::StoreError;

/// Why a transfer-phase claim failed. Drives three distinct user-facing
/// outcomes, kept distinguishable end to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimFailureReason {
    /// Destination address unknown to the transfer service.
    UnknownRecipient,
    /// The faucet source account is out of credits.
    FaucetExhausted,
    /// Anything else: auth, transport, timeout, malformed response.
    Generic,
}

impl fmt::Display for ClaimFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnknownRecipient => "unknown-recipient",
            Self::FaucetExhausted => "faucet-exhausted",
            Self::Generic => "generic",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum FaucetError {
    #[error("invalid address format: expected exactly 40 hex characters")]
    InvalidFormat,

    #[error("address equals the faucet's own source account")]
    SelfAddressRejected,

    #[error("identity has no registered address")]
    NotRegistered,

    #[error("cooldown active: {remaining_secs}s remaining")]
    CooldownActive { remaining_secs: i64 },

    #[error("a claim for this identity is already in progress")]
    ClaimInProgress,

    #[error("claim failed ({reason}): {detail}")]
    ClaimFailed {
        reason: ClaimFailureReason,
        detail: String,
    },

    #[error("ledger store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("transfer service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl FaucetError {
    /// Map a transfer-phase failure to the claim taxonomy. No state is
    /// mutated for any of these; a timed-out call is a generic failure,
    /// never an assumed success.
    pub fn from_transfer(err: TransferError) -> Self {
        let reason = match &err {
            TransferError::UnknownRecipient => ClaimFailureReason::UnknownRecipient,
            TransferError::InsufficientFunds => ClaimFailureReason::FaucetExhausted,
            TransferError::AuthFailed
            | TransferError::ServiceUnavailable(_)
            | TransferError::MalformedResponse(_) => ClaimFailureReason::Generic,
        };
        Self::ClaimFailed {
            reason,
            detail: err.to_string(),
        }
    }
}

impl From<crate::address::AddressError> for FaucetError {
    fn from(_: crate::address::AddressError) -> Self {
        Self::InvalidFormat
    }
}
