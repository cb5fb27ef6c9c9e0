//! credit_faucet - Rate-Limited Faucet Claim Engine
//!
//! Dispenses faucet credits to distinct identities at most once per cooldown
//! window, with a crash-safe persistent ledger and a protocol client for the
//! external funds-transfer service.
//!
//! # Modules
//!
//! - [`address`] - Canonical 40-hex payout address type
//! - [`store`] - Durable ledger with cross-process exclusive access
//! - [`client`] - Transfer service protocol adapter and error taxonomy
//! - [`engine`] - Register/claim/whoami state machine (two-phase locking)
//! - [`error`] - User-facing error taxonomy
//! - [`gateway`] - HTTP surface for the downstream front end
//! - [`config`] - YAML + env configuration
//! - [`logging`] - tracing setup

pub mod address;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod store;

// Convenient re-exports at crate root
pub use address::{Address, AddressError};
pub use client::{HttpTransferClient, OperatorIdentity, TransferApi, TransferError, TransferReceipt};
pub use config::FaucetConfig;
pub use engine::{ClaimEngine, ClaimOutcome, EngineSettings, Registration, WhoAmI};
pub use error::{ClaimFailureReason, FaucetError};
pub use store::{Commit, Ledger, LedgerStore, StoreError, UserRecord};

#[cfg(feature = "mock-api")]
pub use client::MockTransferApi;
