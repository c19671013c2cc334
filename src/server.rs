//! HTTP server for the payment gateway
//!
//! Serves the public payment site API (submission, on-chain verification,
//! public config) and the moderation dashboard (listing, status updates,
//! metrics). Dashboard routes authenticate with a shared-secret `token`
//! query parameter, checked before any storage access.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::bscscan::BscScanClient;
use crate::claims::{self, ClaimStatus, NewClaim, PaymentMethod};
use crate::config::Config;
use crate::links;
use crate::notify::Notifier;
use crate::pg_storage::{self, PgStorage, TransitionOutcome};
use crate::proof::{self, ProofUpload};

/// Submissions may carry a proof screenshot, so the body limit is generous.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// How many claims the metrics endpoint returns in its recent feed.
const RECENT_CLAIMS_LIMIT: i64 = 10;

// ============================================================================
// STATE
// ============================================================================

/// Shared application state
pub struct AppState {
    pub storage: PgStorage,
    pub notifier: Notifier,
    pub chain: BscScanClient,
    pub config: Config,
    /// Dashboard secret. `None` disables every admin route.
    pub admin_token: Option<String>,
    pub started_at: Instant,
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the axum router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config/public", get(public_config_handler))
        .route("/api/payments", post(submit_payment_handler))
        .route("/api/verify-bsc", post(verify_bsc_handler))
        .route("/api/token/balance", get(token_balance_handler))
        .route("/admin/payments", get(list_payments_handler))
        .route("/admin/payments/update", post(update_payment_handler))
        .route("/admin/payments/user/:user_id", get(user_payments_handler))
        .route("/admin/payments/:id", get(payment_detail_handler))
        .route("/admin/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// AUTH
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AdminAuth {
    token: Option<String>,
}

/// Exact-match check against the configured dashboard secret. An unset
/// secret refuses every request rather than letting everything through.
fn authorized(provided: Option<&str>, expected: Option<&str>) -> bool {
    match (provided, expected) {
        (Some(provided), Some(expected)) => provided == expected,
        _ => false,
    }
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    api_error(StatusCode::UNAUTHORIZED, "unauthorized")
}

fn api_error(code: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (code, Json(json!({ "success": false, "error": message })))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// ============================================================================
// PUBLIC HANDLERS
// ============================================================================

/// GET /health - server status
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "slh-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

/// GET /config/public - non-secret settings for the payment site
async fn public_config_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "price_nis": config.payments.price_nis,
        "payment_urls": {
            "paybox": config.payments.paybox_url,
            "bit": config.payments.bit_url,
            "paypal": config.payments.paypal_url,
        },
        "community_group_link": config.site.community_group_link,
        "token": {
            "symbol": config.chain.token_symbol,
            "contract": config.chain.token_contract,
            "decimals": config.chain.token_decimals,
        },
    }))
}

/// Fields collected from the multipart submission form
#[derive(Debug, Default)]
struct SubmissionForm {
    user_id: Option<String>,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    payment_method: Option<String>,
    wallet_address: Option<String>,
    tx_hash: Option<String>,
    proof_image: Option<ProofUpload>,
}

async fn read_submission(mut multipart: Multipart) -> Result<SubmissionForm> {
    let mut form = SubmissionForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "proofImage" => {
                let original_name = field.file_name().unwrap_or("proof").to_string();
                let data = field.bytes().await?.to_vec();
                if !data.is_empty() {
                    form.proof_image = Some(ProofUpload {
                        original_name,
                        data,
                    });
                }
            }
            "userId" => form.user_id = Some(field.text().await?),
            "username" => form.username = Some(field.text().await?),
            "firstName" => form.first_name = Some(field.text().await?),
            "lastName" => form.last_name = Some(field.text().await?),
            "paymentMethod" => form.payment_method = Some(field.text().await?),
            "walletAddress" => form.wallet_address = Some(field.text().await?),
            "txHash" => form.tx_hash = Some(field.text().await?),
            _ => {}
        }
    }

    Ok(form)
}

/// POST /api/payments - manual payment submission from the website
async fn submit_payment_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    let form = match read_submission(multipart).await {
        Ok(form) => form,
        Err(e) => {
            warn!("Malformed payment submission: {}", e);
            return api_error(StatusCode::BAD_REQUEST, "malformed form data");
        }
    };

    let method = match form
        .payment_method
        .as_deref()
        .unwrap_or("")
        .parse::<PaymentMethod>()
    {
        Ok(method) => method,
        Err(e) => {
            warn!("Payment submission rejected: {}", e);
            return api_error(StatusCode::BAD_REQUEST, "unknown payment method");
        }
    };

    let user_id = form.user_id.unwrap_or_default();

    // A failed proof still leaves a reviewable claim, just without evidence.
    let upload_dir = PathBuf::from(&state.config.uploads.dir);
    let proof = match proof::resolve(method, form.proof_image, form.tx_hash.as_deref(), &upload_dir)
    {
        Ok(resolved) => resolved.stored_value().to_string(),
        Err(e) => {
            warn!("Proof storage failed for user {}: {:#}", user_id, e);
            String::new()
        }
    };

    let personal_link = links::generate(&state.config.site.root_url, &user_id);
    let claim = NewClaim::submitted(
        user_id,
        non_empty(form.username),
        form.first_name.unwrap_or_default(),
        non_empty(form.last_name),
        method,
        proof,
        non_empty(form.wallet_address),
        personal_link,
    );

    let stored = match state.storage.insert_claim(&claim).await {
        Ok(stored) => stored,
        Err(e) if pg_storage::is_unique_violation(&e) => {
            warn!("Duplicate transaction hash in submission: {:#}", e);
            return api_error(StatusCode::CONFLICT, "transaction already claimed");
        }
        Err(e) => {
            error!("Failed to store payment claim: {:#}", e);
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to store payment");
        }
    };

    info!(
        "Stored payment claim #{} from user {} via {}",
        stored.id, stored.user_id, stored.method
    );

    if let Err(e) = state.notifier.notify_moderators(&stored).await {
        warn!("Moderator alert for claim #{} failed: {:#}", stored.id, e);
    }

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "paymentId": stored.id,
            "personalLink": stored.personal_link,
            "message": "✅ אישור התשלום התקבל! הצוות יבדוק ויאשר בהקדם.",
        })),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyBscRequest {
    pub tx_hash: String,
    pub user_address: String,
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// POST /api/verify-bsc - verify an on-chain token transfer and record it
///
/// A claim is only written when the explorer confirms the transfer, and it
/// is born approved since the chain already settled the payment.
async fn verify_bsc_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyBscRequest>,
) -> (StatusCode, Json<Value>) {
    let verified = match state
        .chain
        .verify_transfer(&request.tx_hash, &request.user_address)
        .await
    {
        Ok(verified) => verified,
        Err(e) => {
            warn!("Explorer lookup for {} failed: {:#}", request.tx_hash, e);
            false
        }
    };

    if !verified {
        return api_error(StatusCode::BAD_REQUEST, "transaction could not be verified");
    }

    let personal_link = links::generate(&state.config.site.root_url, &request.user_id);
    let claim = NewClaim::chain_verified(
        request.user_id,
        non_empty(request.username),
        request.first_name.unwrap_or_default(),
        non_empty(request.last_name),
        request.tx_hash.clone(),
        request.user_address,
        personal_link,
    );

    match state.storage.insert_claim(&claim).await {
        Ok(stored) => {
            info!(
                "Recorded verified transfer {} as claim #{}",
                request.tx_hash, stored.id
            );
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "paymentId": stored.id,
                    "personalLink": stored.personal_link,
                })),
            )
        }
        Err(e) if pg_storage::is_unique_violation(&e) => {
            warn!("Transaction {} was already claimed", request.tx_hash);
            api_error(StatusCode::CONFLICT, "transaction already claimed")
        }
        Err(e) => {
            error!("Failed to store verified claim: {:#}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to store payment")
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub address: String,
}

/// GET /api/token/balance?address=0x... - token balance for a wallet
async fn token_balance_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BalanceQuery>,
) -> Json<Value> {
    let balance = state.chain.token_balance(&query.address).await;
    Json(json!({
        "address": query.address,
        "balance": balance,
        "symbol": state.config.chain.token_symbol,
    }))
}

// ============================================================================
// ADMIN HANDLERS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListPaymentsQuery {
    pub status: Option<ClaimStatus>,
    pub token: Option<String>,
}

/// GET /admin/payments?status=pending - claims in one status, newest first
async fn list_payments_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListPaymentsQuery>,
) -> (StatusCode, Json<Value>) {
    if !authorized(query.token.as_deref(), state.admin_token.as_deref()) {
        return unauthorized();
    }

    let status = query.status.unwrap_or(ClaimStatus::Pending);
    match state.storage.claims_by_status(status).await {
        Ok(payments) => (
            StatusCode::OK,
            Json(json!({ "success": true, "payments": payments })),
        ),
        Err(e) => {
            error!("Failed to list {} claims: {:#}", status, e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to list payments")
        }
    }
}

/// GET /admin/payments/:id - single claim
async fn payment_detail_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Query(auth): Query<AdminAuth>,
) -> (StatusCode, Json<Value>) {
    if !authorized(auth.token.as_deref(), state.admin_token.as_deref()) {
        return unauthorized();
    }

    match state.storage.claim_by_id(id).await {
        Ok(Some(payment)) => (
            StatusCode::OK,
            Json(json!({ "success": true, "payment": payment })),
        ),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "payment not found"),
        Err(e) => {
            error!("Failed to load claim #{}: {:#}", id, e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to load payment")
        }
    }
}

/// GET /admin/payments/user/:user_id - full history for one user
async fn user_payments_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(auth): Query<AdminAuth>,
) -> (StatusCode, Json<Value>) {
    if !authorized(auth.token.as_deref(), state.admin_token.as_deref()) {
        return unauthorized();
    }

    match state.storage.claims_by_user(&user_id).await {
        Ok(payments) => (
            StatusCode::OK,
            Json(json!({ "success": true, "payments": payments })),
        ),
        Err(e) => {
            error!("Failed to list claims for user {}: {:#}", user_id, e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to list payments")
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentRequest {
    pub payment_id: i32,
    pub status: ClaimStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

/// POST /admin/payments/update - move a pending claim to approved or rejected
async fn update_payment_handler(
    State(state): State<Arc<AppState>>,
    Query(auth): Query<AdminAuth>,
    Json(request): Json<UpdatePaymentRequest>,
) -> (StatusCode, Json<Value>) {
    if !authorized(auth.token.as_deref(), state.admin_token.as_deref()) {
        return unauthorized();
    }

    // Claims only ever leave pending, never re-enter it.
    if !claims::transition_allowed(ClaimStatus::Pending, request.status) {
        return api_error(
            StatusCode::BAD_REQUEST,
            "claims can only move to approved or rejected",
        );
    }

    let notes = non_empty(request.notes);
    let outcome = match state
        .storage
        .transition_status(request.payment_id, request.status, notes.as_deref())
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Transition of claim #{} failed: {:#}", request.payment_id, e);
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to update payment");
        }
    };

    match outcome {
        TransitionOutcome::Applied(updated) => {
            info!("Claim #{} moved to {}", updated.id, updated.status);

            // Approval is the one moment the user hears back from us.
            if updated.status == ClaimStatus::Approved {
                if let Err(e) = state
                    .notifier
                    .notify_user(&updated.user_id, &updated.personal_link)
                    .await
                {
                    warn!(
                        "Approval notification for claim #{} failed: {:#}",
                        updated.id, e
                    );
                }
            }

            (
                StatusCode::OK,
                Json(json!({ "success": true, "payment": updated })),
            )
        }
        TransitionOutcome::NotFound => api_error(StatusCode::NOT_FOUND, "payment not found"),
        TransitionOutcome::AlreadyFinal(current) => (
            StatusCode::CONFLICT,
            Json(json!({
                "success": false,
                "error": format!("payment already {}", current),
            })),
        ),
    }
}

/// GET /admin/metrics - claim counts and a recent feed for the dashboard
async fn metrics_handler(
    State(state): State<Arc<AppState>>,
    Query(auth): Query<AdminAuth>,
) -> (StatusCode, Json<Value>) {
    if !authorized(auth.token.as_deref(), state.admin_token.as_deref()) {
        return unauthorized();
    }

    match load_metrics(&state).await {
        Ok(body) => (StatusCode::OK, Json(body)),
        Err(e) => {
            error!("Failed to load metrics: {:#}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to load metrics")
        }
    }
}

async fn load_metrics(state: &AppState) -> Result<Value> {
    let by_status = state.storage.status_counts().await?;
    let by_method = state.storage.method_counts().await?;
    let recent = state.storage.recent_claims(RECENT_CLAIMS_LIMIT).await?;
    let total: i64 = by_status.iter().map(|entry| entry.count).sum();

    Ok(json!({
        "success": true,
        "total": total,
        "byStatus": by_status,
        "byMethod": by_method,
        "recent": recent,
    }))
}

// ============================================================================
// SERVER
// ============================================================================

/// Run the HTTP server
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> Result<()> {
    let app = create_router(state);
    let addr = format!("{}:{}", host, port);

    info!("Starting payment gateway server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_auth_exact_match_only() {
        assert!(authorized(Some("s3cret"), Some("s3cret")));
        assert!(!authorized(Some("wrong"), Some("s3cret")));
        assert!(!authorized(Some("s3cre"), Some("s3cret")));
        assert!(!authorized(None, Some("s3cret")));
    }

    #[test]
    fn test_unset_secret_refuses_everything() {
        assert!(!authorized(Some("anything"), None));
        assert!(!authorized(Some(""), None));
        assert!(!authorized(None, None));
    }

    #[test]
    fn test_update_request_rejects_unknown_status() {
        let bad = serde_json::from_str::<UpdatePaymentRequest>(
            r#"{"paymentId": 7, "status": "archived"}"#,
        );
        assert!(bad.is_err());

        let ok: UpdatePaymentRequest =
            serde_json::from_str(r#"{"paymentId": 7, "status": "approved"}"#).unwrap();
        assert_eq!(ok.payment_id, 7);
        assert_eq!(ok.status, ClaimStatus::Approved);
        assert!(ok.notes.is_none());
    }

    #[test]
    fn test_pending_is_never_a_transition_target() {
        assert!(!claims::transition_allowed(
            ClaimStatus::Pending,
            ClaimStatus::Pending
        ));
        assert!(claims::transition_allowed(
            ClaimStatus::Pending,
            ClaimStatus::Rejected
        ));
    }

    #[test]
    fn test_empty_form_values_become_none() {
        assert_eq!(non_empty(Some(String::new())), None);
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some("dan".into())), Some("dan".into()));
    }
}
