//! Gateway API Layer
//!
//! HTTP surface for the three downstream operations: register, claim,
//! whoami. Handlers translate between JSON and the claim engine; nothing
//! here knows about any particular front end.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::ClaimEngine;
use crate::error::{ClaimFailureReason, FaucetError};

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterApiRequest {
    /// Opaque stable requester identity.
    pub identity: String,
    /// Raw payout address (40 hex characters, any case).
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct ClaimApiRequest {
    pub identity: String,
}

#[derive(Debug, Deserialize)]
pub struct WhoAmIParams {
    pub identity: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterApiResponse {
    /// Stored canonical address.
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct ClaimApiResponse {
    pub address: String,
    pub amount: u64,
    pub from_credits: i64,
    pub to_credits: i64,
}

#[derive(Debug, Serialize)]
pub struct WhoAmIApiResponse {
    pub address: String,
    /// Seconds until the next claim is allowed; 0 when ready.
    pub cooldown_remaining_secs: i64,
}

/// API wrapper for standard response format
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            data: Some(data),
            msg: None,
        }
    }

    pub fn error(code: i32, msg: impl ToString) -> Self {
        Self {
            code,
            data: None,
            msg: Some(msg.to_string()),
        }
    }
}

// ============================================================================
// Error Codes
// ============================================================================

pub mod error_codes {
    pub const INVALID_FORMAT: i32 = -2001;
    pub const SELF_ADDRESS_REJECTED: i32 = -2002;
    pub const NOT_REGISTERED: i32 = -2003;
    pub const COOLDOWN_ACTIVE: i32 = -2004;
    pub const CLAIM_IN_PROGRESS: i32 = -2005;
    pub const CLAIM_FAILED_UNKNOWN_RECIPIENT: i32 = -2006;
    pub const CLAIM_FAILED_FAUCET_EXHAUSTED: i32 = -2007;
    pub const CLAIM_FAILED_GENERIC: i32 = -2008;
    pub const STORE_UNAVAILABLE: i32 = -2009;
    pub const SERVICE_UNAVAILABLE: i32 = -2010;
}

/// Map an engine error to (HTTP status, API code). Every variant is
/// recoverable and renders a user-facing message.
pub fn error_status(err: &FaucetError) -> (StatusCode, i32) {
    use error_codes::*;
    match err {
        FaucetError::InvalidFormat => (StatusCode::BAD_REQUEST, INVALID_FORMAT),
        FaucetError::SelfAddressRejected => (StatusCode::BAD_REQUEST, SELF_ADDRESS_REJECTED),
        FaucetError::NotRegistered => (StatusCode::NOT_FOUND, NOT_REGISTERED),
        FaucetError::CooldownActive { .. } => (StatusCode::TOO_MANY_REQUESTS, COOLDOWN_ACTIVE),
        FaucetError::ClaimInProgress => (StatusCode::CONFLICT, CLAIM_IN_PROGRESS),
        FaucetError::ClaimFailed { reason, .. } => {
            let code = match reason {
                ClaimFailureReason::UnknownRecipient => CLAIM_FAILED_UNKNOWN_RECIPIENT,
                ClaimFailureReason::FaucetExhausted => CLAIM_FAILED_FAUCET_EXHAUSTED,
                ClaimFailureReason::Generic => CLAIM_FAILED_GENERIC,
            };
            (StatusCode::BAD_GATEWAY, code)
        }
        FaucetError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, STORE_UNAVAILABLE),
        FaucetError::ServiceUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, SERVICE_UNAVAILABLE)
        }
    }
}

fn error_response<T: Serialize>(err: FaucetError) -> Response {
    let (status, code) = error_status(&err);
    debug!(code, %err, "request rejected");
    (status, Json(ApiResponse::<T>::error(code, &err))).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

async fn register_handler(
    State(engine): State<Arc<ClaimEngine>>,
    Json(req): Json<RegisterApiRequest>,
) -> Response {
    match engine.register(&req.identity, &req.address) {
        Ok(reg) => Json(ApiResponse::success(RegisterApiResponse {
            address: reg.address.to_string(),
        }))
        .into_response(),
        Err(e) => error_response::<RegisterApiResponse>(e),
    }
}

async fn claim_handler(
    State(engine): State<Arc<ClaimEngine>>,
    Json(req): Json<ClaimApiRequest>,
) -> Response {
    match engine.claim(&req.identity).await {
        Ok(outcome) => Json(ApiResponse::success(ClaimApiResponse {
            address: outcome.address.to_string(),
            amount: outcome.amount,
            from_credits: outcome.from_credits,
            to_credits: outcome.to_credits,
        }))
        .into_response(),
        Err(e) => error_response::<ClaimApiResponse>(e),
    }
}

async fn whoami_handler(
    State(engine): State<Arc<ClaimEngine>>,
    Query(params): Query<WhoAmIParams>,
) -> Response {
    match engine.whoami(&params.identity) {
        Ok(who) => Json(ApiResponse::success(WhoAmIApiResponse {
            address: who.address.to_string(),
            cooldown_remaining_secs: who.cooldown_remaining_secs,
        }))
        .into_response(),
        Err(e) => error_response::<WhoAmIApiResponse>(e),
    }
}

pub fn router(engine: Arc<ClaimEngine>) -> Router {
    Router::new()
        .route("/register", post(register_handler))
        .route("/claim", post(claim_handler))
        .route("/whoami", get(whoami_handler))
        .with_state(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClaimFailureReason;
    use crate::store::StoreError;
    use std::time::Duration;

    #[test]
    fn test_error_status_mapping() {
        let cases: Vec<(FaucetError, StatusCode, i32)> = vec![
            (
                FaucetError::InvalidFormat,
                StatusCode::BAD_REQUEST,
                error_codes::INVALID_FORMAT,
            ),
            (
                FaucetError::SelfAddressRejected,
                StatusCode::BAD_REQUEST,
                error_codes::SELF_ADDRESS_REJECTED,
            ),
            (
                FaucetError::NotRegistered,
                StatusCode::NOT_FOUND,
                error_codes::NOT_REGISTERED,
            ),
            (
                FaucetError::CooldownActive { remaining_secs: 10 },
                StatusCode::TOO_MANY_REQUESTS,
                error_codes::COOLDOWN_ACTIVE,
            ),
            (
                FaucetError::ClaimInProgress,
                StatusCode::CONFLICT,
                error_codes::CLAIM_IN_PROGRESS,
            ),
            (
                FaucetError::ClaimFailed {
                    reason: ClaimFailureReason::UnknownRecipient,
                    detail: "x".into(),
                },
                StatusCode::BAD_GATEWAY,
                error_codes::CLAIM_FAILED_UNKNOWN_RECIPIENT,
            ),
            (
                FaucetError::ClaimFailed {
                    reason: ClaimFailureReason::FaucetExhausted,
                    detail: "x".into(),
                },
                StatusCode::BAD_GATEWAY,
                error_codes::CLAIM_FAILED_FAUCET_EXHAUSTED,
            ),
            (
                FaucetError::ClaimFailed {
                    reason: ClaimFailureReason::Generic,
                    detail: "x".into(),
                },
                StatusCode::BAD_GATEWAY,
                error_codes::CLAIM_FAILED_GENERIC,
            ),
            (
                FaucetError::StoreUnavailable(StoreError::LockTimeout(Duration::from_secs(5))),
                StatusCode::SERVICE_UNAVAILABLE,
                error_codes::STORE_UNAVAILABLE,
            ),
            (
                FaucetError::ServiceUnavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                error_codes::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, expected_status, expected_code) in cases {
            let (status, code) = error_status(&err);
            assert_eq!(status, expected_status, "for {err:?}");
            assert_eq!(code, expected_code, "for {err:?}");
        }
    }

    #[test]
    fn test_api_response_shape() {
        let ok = ApiResponse::success(RegisterApiResponse {
            address: "b".repeat(40),
        });
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["code"], 0);
        assert_eq!(json["data"]["address"], "b".repeat(40));
        assert!(json.get("msg").is_none());

        let err = ApiResponse::<RegisterApiResponse>::error(-2001, "bad address");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], -2001);
        assert_eq!(json["msg"], "bad address");
        assert!(json.get("data").is_none());
    }
}
