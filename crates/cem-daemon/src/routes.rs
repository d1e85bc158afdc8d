//! Axum router and all HTTP handlers for cem-daemon (§6).
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! the correlation-id, CORS, and tracing middleware layers. Handlers are
//! `pub(crate)` so integration tests can compose the router directly,
//! mirroring the teacher's `mqk-daemon::routes`.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cem_schemas::inquiry::{normalize_name, OutboundInquiry};
use cem_schemas::message::{AttachmentDescriptor, ExtractedData, InboundMessage, ProcessingStatus};
use cem_schemas::review::ReviewResolution;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api_types::*;
use crate::signature::{verify_hex_signature, verify_svix_signature};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/webhooks/inline", post(webhook_inline))
        .route("/v1/webhooks/hosted", post(webhook_hosted))
        .route("/v1/inquiries", post(create_inquiry))
        .route("/v1/jobs", get(list_jobs))
        .route("/v1/jobs/:id", get(get_job))
        .route("/v1/jobs/:id/retry", post(retry_job))
        .route("/v1/reviews", get(list_reviews))
        .route("/v1/reviews/stats", get(review_stats))
        .route("/v1/reviews/claim-next", post(claim_next_review))
        .route("/v1/reviews/:id/claim", post(claim_review))
        .route("/v1/reviews/:id/resolve", post(resolve_review))
        .route("/v1/reviews/:id/email", get(review_email))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let status = cem_db::status(&st.pool).await;
    let (ok, has_core_schema) = status.map(|s| (s.ok, s.has_core_schema)).unwrap_or((false, false));

    (
        StatusCode::OK,
        Json(HealthResponse {
            ok,
            service: st.build.service,
            version: st.build.version,
            has_core_schema,
        }),
    )
}

// ---------------------------------------------------------------------------
// Ingress (§6 "Ingress (inbound)")
// ---------------------------------------------------------------------------

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

/// Full-body webhook delivery. Signature check is a flat
/// `HMAC-SHA256(body)` under `x-webhook-signature`, matching the inline
/// provider's simpler header (§6, grounded in `verify_webhook_signature`).
pub(crate) async fn webhook_inline(State(st): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(secret) = &st.inline_webhook_secret {
        let sig = headers.get("x-webhook-signature").and_then(|v| v.to_str().ok()).unwrap_or("");
        if !verify_hex_signature(&body, sig, secret) {
            return error_response(StatusCode::UNAUTHORIZED, "invalid webhook signature");
        }
    }

    let payload: InlineWebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, format!("invalid payload: {err}")),
    };

    if let Some(existing) = db_get_by_webhook_id(&st, &payload.webhook_id).await {
        return accepted_or_duplicate(existing, true);
    }

    let mut message = InboundMessage::new(payload.webhook_id.clone(), payload.from_email, payload.subject);
    message.raw_html_body = payload.body_html;
    message.raw_text_body = payload.body_text;
    message.attachments = payload
        .attachments
        .into_iter()
        .map(|a| AttachmentDescriptor {
            external_id: a.external_id,
            filename: a.filename,
            mime_type: a.mime_type,
            url: a.url,
            size_bytes: a.size_bytes,
        })
        .collect();

    ingest_message(&st, message).await
}

/// Provider-hosted-inbox webhook delivery: only a message id, Svix-style
/// signed (§6). Fetching the actual body from the provider's API is an
/// external collaborator concern, out of scope here (§1); the worker
/// pipeline runs against whatever bodies are present.
pub(crate) async fn webhook_hosted(State(st): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(secret) = &st.hosted_webhook_secret {
        let id = headers.get("svix-id").and_then(|v| v.to_str().ok()).unwrap_or("");
        let ts = headers.get("svix-timestamp").and_then(|v| v.to_str().ok()).unwrap_or("");
        let sig = headers.get("svix-signature").and_then(|v| v.to_str().ok()).unwrap_or("");
        if !verify_svix_signature(id, ts, &body, sig, secret) {
            return error_response(StatusCode::UNAUTHORIZED, "invalid webhook signature");
        }
    }

    let payload: HostedInboxWebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, format!("invalid payload: {err}")),
    };

    if let Some(existing) = db_get_by_webhook_id(&st, &payload.webhook_id).await {
        return accepted_or_duplicate(existing, true);
    }

    let message = InboundMessage::new(payload.webhook_id.clone(), payload.from_email, payload.subject);
    ingest_message(&st, message).await
}

async fn db_get_by_webhook_id(st: &AppState, webhook_id: &str) -> Option<InboundMessage> {
    cem_db::messages::get_by_webhook_id(&st.pool, webhook_id).await.ok().flatten()
}

fn accepted_or_duplicate(existing: InboundMessage, duplicate: bool) -> Response {
    if duplicate {
        (
            StatusCode::OK,
            Json(IngressResponse {
                status: IngressStatus::Duplicate,
                message: "webhook id already ingested".to_string(),
                id: Some(existing.id),
            }),
        )
            .into_response()
    } else {
        (
            StatusCode::OK,
            Json(IngressResponse {
                status: IngressStatus::Accepted,
                message: "queued".to_string(),
                id: Some(existing.id),
            }),
        )
            .into_response()
    }
}

/// Shared insert-then-queue path for both ingress endpoints. Ingress
/// responds 200 immediately after enqueue (§4.9 "user-visible behaviour on
/// failure"); the pipeline itself runs out of band in `cem-worker`.
async fn ingest_message(st: &AppState, message: InboundMessage) -> Response {
    let id = message.id;
    match cem_db::messages::insert_if_new(&st.pool, &message).await {
        Ok(true) => {
            if let Err(err) = cem_db::messages::update_status(&st.pool, id, ProcessingStatus::Queued, None).await {
                warn!(%id, error = %err, "ingress_queue_stamp_failed");
            }
            info!(%id, external_webhook_id = %message.external_webhook_id, "message_ingested");
            (
                StatusCode::OK,
                Json(IngressResponse {
                    status: IngressStatus::Accepted,
                    message: "queued".to_string(),
                    id: Some(id),
                }),
            )
                .into_response()
        }
        Ok(false) => {
            // Lost a race against a concurrent delivery of the same webhook id.
            match db_get_by_webhook_id(st, &message.external_webhook_id).await {
                Some(existing) => accepted_or_duplicate(existing, true),
                None => error_response(StatusCode::INTERNAL_SERVER_ERROR, "dedup race with no winner found"),
            }
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Outbound-inquiry ingest (§6)
// ---------------------------------------------------------------------------

pub(crate) async fn create_inquiry(State(st): State<Arc<AppState>>, Json(req): Json<CreateInquiryRequest>) -> Response {
    let inquiry = OutboundInquiry {
        id: Uuid::new_v4(),
        client_name: req.client.name.clone(),
        client_name_normalized: normalize_name(&req.client.name),
        creditor_name: req.creditor.name,
        creditor_name_normalized: normalize_name(&req.creditor.name),
        creditor_address: req.creditor.address,
        creditor_email: req.creditor.email,
        debt_amount: req.debt.amount,
        reference_number: req.reference_numbers.into_iter().next(),
        external_ticket_id: req.external_ticket_id,
        external_side_conversation_id: req.external_side_conversation_id,
        external_email_provider_id: req.provider,
        sent_at: req.sent_at,
        status: "sent".to_string(),
    };

    match cem_db::inquiries::insert_if_new(&st.pool, &inquiry).await {
        Ok(created) => (
            StatusCode::OK,
            Json(CreateInquiryResponse { created, id: inquiry.id }),
        )
            .into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Status API (§6)
// ---------------------------------------------------------------------------

pub(crate) async fn list_jobs(State(st): State<Arc<AppState>>, Query(q): Query<ListJobsQuery>) -> Response {
    let status = match q.status.as_deref().map(ProcessingStatus::from_str) {
        Some(Ok(s)) => Some(s),
        Some(Err(err)) => return error_response(StatusCode::BAD_REQUEST, err),
        None => None,
    };
    let limit = q.limit.unwrap_or(50);

    let (jobs, by_status) = tokio::join!(
        cem_db::messages::list(&st.pool, status, limit),
        cem_db::messages::count_by_status(&st.pool),
    );

    let jobs = match jobs {
        Ok(j) => j,
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };
    let by_status = by_status.unwrap_or_default();
    let total = by_status.values().sum();

    (
        StatusCode::OK,
        Json(ListJobsResponse {
            total,
            by_status,
            jobs: jobs.into_iter().map(to_job_summary).collect(),
        }),
    )
        .into_response()
}

fn to_job_summary(m: InboundMessage) -> JobSummary {
    JobSummary {
        id: m.id,
        external_webhook_id: m.external_webhook_id,
        sender_address: m.sender_address,
        subject: m.subject,
        processing_status: m.processing_status.to_string(),
        retry_count: m.retry_count,
        received_at: m.received_at,
        completed_at: m.completed_at,
    }
}

pub(crate) async fn get_job(State(st): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    match cem_db::messages::get(&st.pool, id).await {
        Ok(Some(message)) => (StatusCode::OK, Json(message)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "job not found"),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

pub(crate) async fn retry_job(State(st): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    match cem_db::messages::retry_failed(&st.pool, id).await {
        Ok(retried) => (StatusCode::OK, Json(RetryJobResponse { retried })).into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Review API (§6)
// ---------------------------------------------------------------------------

pub(crate) async fn list_reviews(State(st): State<Arc<AppState>>, Query(q): Query<ListReviewsQuery>) -> Response {
    match cem_review::queue::list_unresolved(&st.pool, q.limit.unwrap_or(50)).await {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

pub(crate) async fn review_stats(State(st): State<Arc<AppState>>) -> Response {
    match cem_review::queue::stats(&st.pool).await {
        Ok(stats) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "total_unresolved": stats.total_unresolved,
                "total_claimed": stats.total_claimed,
                "by_reason": stats.by_reason,
                "avg_resolution_minutes": stats.avg_resolution_minutes,
            })),
        )
            .into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

pub(crate) async fn claim_review(State(st): State<Arc<AppState>>, Path(id): Path<Uuid>, Json(req): Json<ClaimReviewRequest>) -> Response {
    match cem_review::queue::claim(&st.pool, id, &req.reviewer).await {
        Ok(Some(item)) => (StatusCode::OK, Json(item)).into_response(),
        Ok(None) => error_response(StatusCode::CONFLICT, "review item already claimed or resolved"),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

pub(crate) async fn claim_next_review(State(st): State<Arc<AppState>>, Json(req): Json<ClaimNextReviewRequest>) -> Response {
    match cem_review::queue::claim_next(&st.pool, &req.reviewer, req.priority_max).await {
        Ok(Some(item)) => (StatusCode::OK, Json(item)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "no unclaimed review items"),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

pub(crate) async fn resolve_review(State(st): State<Arc<AppState>>, Path(id): Path<Uuid>, Json(req): Json<ResolveReviewRequest>) -> Response {
    let resolution = match req.resolution.parse::<ReviewResolutionWire>() {
        Ok(r) => r.0,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, err),
    };
    let corrected_data: Option<ExtractedData> = match req.corrected_data.map(serde_json::from_value) {
        Some(Ok(d)) => Some(d),
        Some(Err(err)) => return error_response(StatusCode::BAD_REQUEST, format!("invalid corrected_data: {err}")),
        None => None,
    };

    match cem_review::resolve(&st.pool, id, resolution, req.notes.as_deref(), corrected_data.as_ref()).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => error_response(StatusCode::BAD_REQUEST, err.to_string()),
    }
}

struct ReviewResolutionWire(ReviewResolution);

impl FromStr for ReviewResolutionWire {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(match s {
            "approved" => ReviewResolution::Approved,
            "rejected" => ReviewResolution::Rejected,
            "corrected" => ReviewResolution::Corrected,
            "escalated" => ReviewResolution::Escalated,
            "spam" => ReviewResolution::Spam,
            other => return Err(format!("unknown resolution: {other}")),
        }))
    }
}

pub(crate) async fn review_email(State(st): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    let item = match cem_db::review::get(&st.pool, id).await {
        Ok(Some(item)) => item,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "review item not found"),
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };
    let message = match cem_db::messages::get(&st.pool, item.message_id).await {
        Ok(Some(m)) => m,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "underlying message not found"),
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };

    (
        StatusCode::OK,
        Json(ReviewEmailResponse {
            message_id: message.id,
            sender_address: message.sender_address,
            subject: message.subject,
            raw_html_body: message.raw_html_body,
            raw_text_body: message.raw_text_body,
            cleaned_body: message.cleaned_body,
        }),
    )
        .into_response()
}
