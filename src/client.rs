//! Transfer Service Client
//!
//! Protocol adapter for the external funds-transfer service. The engine
//! depends on the [`TransferApi`] seam only; [`HttpTransferClient`] is the
//! real reqwest-backed implementation and [`MockTransferApi`] (feature
//! `mock-api`) drives tests without a live service.
//!
//! Error classification is structural: variants are derived from the HTTP
//! status code, never from substring matching on free-text detail. The
//! taxonomy is load-bearing for the engine's user-facing messaging.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::address::Address;

const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(20);
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum TransferError {
    /// 404: the destination address does not exist on the service.
    #[error("unknown recipient address")]
    UnknownRecipient,

    /// 400: the source account cannot cover the transfer.
    #[error("insufficient faucet credits")]
    InsufficientFunds,

    /// 401/403: the operator credential was rejected.
    #[error("transfer service rejected the credential")]
    AuthFailed,

    /// Transport failure, timeout, or an unexpected status.
    #[error("transfer service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A 200 response whose body did not parse as the expected shape.
    #[error("malformed transfer service response: {0}")]
    MalformedResponse(String),
}

/// `GET /me` response: the account behind the presented credential.
#[derive(Debug, Clone, Deserialize)]
pub struct OperatorIdentity {
    pub account_id: String,
}

/// `POST /transfer` success response: balances after the transfer.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TransferReceipt {
    pub from_credits: i64,
    pub to_credits: i64,
}

#[derive(Debug, Serialize)]
struct TransferRequestBody<'a> {
    to_address: &'a str,
    amount: u64,
}

/// Seam between the claim engine and the funds-transfer service.
#[async_trait]
pub trait TransferApi: Send + Sync {
    /// Resolve the account behind the operator credential (`GET /me`).
    async fn identify(&self) -> Result<OperatorIdentity, TransferError>;

    /// Move `amount` credits to `to` (`POST /transfer`).
    async fn transfer(&self, to: &Address, amount: u64) -> Result<TransferReceipt, TransferError>;
}

/// HTTP implementation of [`TransferApi`].
pub struct HttpTransferClient {
    client: reqwest::Client,
    base_url: String,
    credential: String,
}

impl HttpTransferClient {
    pub fn new(base_url: &str, credential: &str) -> Result<Self, TransferError> {
        let client = reqwest::Client::builder()
            .timeout(TRANSFER_TIMEOUT)
            .build()
            .map_err(|e| {
                TransferError::ServiceUnavailable(format!("failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credential: credential.to_string(),
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.credential)
    }
}

/// Map a non-200 status to the closed error taxonomy.
///
/// 404 is the service's unknown-recipient response and 400 its
/// insufficient-credits response on `/transfer`; the body detail is carried
/// as data only.
fn classify_status(status: u16, body: &str) -> TransferError {
    match status {
        404 => TransferError::UnknownRecipient,
        400 => TransferError::InsufficientFunds,
        401 | 403 => TransferError::AuthFailed,
        _ => TransferError::ServiceUnavailable(format!("status {status}: {body}")),
    }
}

#[async_trait]
impl TransferApi for HttpTransferClient {
    async fn identify(&self) -> Result<OperatorIdentity, TransferError> {
        let url = format!("{}/me", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", self.bearer())
            .timeout(IDENTIFY_TIMEOUT)
            .send()
            .await
            .map_err(|e| TransferError::ServiceUnavailable(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransferError::ServiceUnavailable(e.to_string()))?;
        if status != 200 {
            return Err(classify_status(status, &body));
        }

        let identity: OperatorIdentity = serde_json::from_str(&body)
            .map_err(|e| TransferError::MalformedResponse(e.to_string()))?;
        debug!(account_id = %identity.account_id, "resolved operator identity");
        Ok(identity)
    }

    async fn transfer(&self, to: &Address, amount: u64) -> Result<TransferReceipt, TransferError> {
        let url = format!("{}/transfer", self.base_url);
        let payload = TransferRequestBody {
            to_address: to.as_str(),
            amount,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.bearer())
            .json(&payload)
            .timeout(TRANSFER_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                warn!(to = %to, "transfer request failed: {e}");
                TransferError::ServiceUnavailable(e.to_string())
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransferError::ServiceUnavailable(e.to_string()))?;
        if status != 200 {
            return Err(classify_status(status, &body));
        }

        let receipt: TransferReceipt = serde_json::from_str(&body)
            .map_err(|e| TransferError::MalformedResponse(e.to_string()))?;
        debug!(
            to = %to,
            amount,
            from_credits = receipt.from_credits,
            to_credits = receipt.to_credits,
            "transfer confirmed"
        );
        Ok(receipt)
    }
}

#[cfg(any(test, feature = "mock-api"))]
pub use mock::MockTransferApi;

#[cfg(any(test, feature = "mock-api"))]
pub mod mock {
    //! Scriptable in-memory transfer service for tests.

    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::{Mutex, Notify};

    use super::*;

    /// Mock [`TransferApi`]: queued responses, call recording, and an
    /// optional gate that holds `transfer` open so tests can interleave
    /// concurrent claims.
    #[derive(Default)]
    pub struct MockTransferApi {
        identity: Mutex<Option<OperatorIdentity>>,
        responses: Mutex<VecDeque<Result<TransferReceipt, TransferError>>>,
        calls: Mutex<Vec<(Address, u64)>>,
        started: AtomicUsize,
        gate: Mutex<Option<Arc<Notify>>>,
    }

    impl MockTransferApi {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn set_identity(&self, account_id: &str) {
            *self.identity.lock().await = Some(OperatorIdentity {
                account_id: account_id.to_string(),
            });
        }

        pub async fn push_success(&self, from_credits: i64, to_credits: i64) {
            self.responses.lock().await.push_back(Ok(TransferReceipt {
                from_credits,
                to_credits,
            }));
        }

        pub async fn push_failure(&self, err: TransferError) {
            self.responses.lock().await.push_back(Err(err));
        }

        /// Make every subsequent `transfer` wait for `notify_one` on the
        /// returned handle after recording the call.
        pub async fn hold_transfers(&self) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            *self.gate.lock().await = Some(Arc::clone(&gate));
            gate
        }

        /// Number of `transfer` calls that have started (possibly gated).
        pub fn transfers_started(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }

        pub async fn calls(&self) -> Vec<(Address, u64)> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl TransferApi for MockTransferApi {
        async fn identify(&self) -> Result<OperatorIdentity, TransferError> {
            self.identity
                .lock()
                .await
                .clone()
                .ok_or_else(|| TransferError::ServiceUnavailable("no identity scripted".into()))
        }

        async fn transfer(
            &self,
            to: &Address,
            amount: u64,
        ) -> Result<TransferReceipt, TransferError> {
            self.calls.lock().await.push((to.clone(), amount));
            self.started.fetch_add(1, Ordering::SeqCst);

            let gate = self.gate.lock().await.clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }

            self.responses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(TransferError::ServiceUnavailable("no response scripted".into())))
        }
    }
}
