//! Webhook endpoints for Git providers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use gantry_core::webhook::normalize;
use gantry_core::{BuildRequest, GitProvider};
use gantry_scheduler::{AdmissionDecision, DropReason};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::{info, warn};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/github", post(github_webhook))
        .route("/gitlab", post(gitlab_webhook))
}

/// What happened to a delivery. Every variant is answered with 200.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookResponse {
    Admitted,
    Dropped { reason: DropReason },
    Ignored { event: String },
    Malformed,
}

/// Handle GitHub webhook events.
async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let event = header(&headers, "X-GitHub-Event").unwrap_or("unknown");
    if event == "ping" {
        info!("Ping event received - webhook is configured correctly");
        return Ok(Json(WebhookResponse::Ignored {
            event: event.to_string(),
        }));
    }
    process_webhook(&state, GitProvider::Github, event, &headers, &body)
        .await
        .map(Json)
}

/// Handle GitLab webhook events.
async fn gitlab_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let event = header(&headers, "X-Gitlab-Event").unwrap_or("unknown");
    process_webhook(&state, GitProvider::Gitlab, event, &headers, &body)
        .await
        .map(Json)
}

async fn process_webhook(
    state: &AppState,
    provider: GitProvider,
    event: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<WebhookResponse, ApiError> {
    let request = match normalize(provider, event, body) {
        Ok(Some(request)) => request,
        Ok(None) => {
            info!(provider = %provider, event = %event, "Unhandled event type");
            return Ok(WebhookResponse::Ignored {
                event: event.to_string(),
            });
        }
        Err(e) => {
            warn!(provider = %provider, event = %event, error = %e, "Dropping malformed webhook");
            state.admitter.record_malformed();
            return Ok(WebhookResponse::Malformed);
        }
    };

    info!(
        provider = %provider,
        event = %event,
        url = %request.repository_url,
        branch = %request.branch,
        commit = %request.commit,
        "Received webhook"
    );

    authenticate(state, provider, &request, headers, body)?;

    Ok(match state.admitter.submit(request).await? {
        AdmissionDecision::Admit => WebhookResponse::Admitted,
        AdmissionDecision::Drop(reason) => WebhookResponse::Dropped { reason },
    })
}

/// Check the delivery against the matched repository's webhook secret.
///
/// Repositories without a secret, and unregistered ones, pass through.
fn authenticate(
    state: &AppState,
    provider: GitProvider,
    request: &BuildRequest,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), ApiError> {
    let Some(repository) = state
        .admitter
        .registry()
        .repository_for_url(&request.repository_url)
    else {
        return Ok(());
    };
    let Some(secret) = repository.webhook_secret.as_deref() else {
        return Ok(());
    };

    let valid = match provider {
        GitProvider::Github => {
            verify_github_signature(secret, body, header(headers, "X-Hub-Signature-256"))
        }
        GitProvider::Gitlab => verify_gitlab_token(secret, header(headers, "X-Gitlab-Token")),
    };

    if !valid {
        warn!(
            provider = %provider,
            url = %request.repository_url,
            branch = %request.branch,
            "Invalid webhook signature"
        );
        return Err(ApiError::Unauthorized("invalid webhook signature".to_string()));
    }
    Ok(())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Verify GitHub webhook signature.
fn verify_github_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };

    // Signature format: "sha256=<hex>"
    let Some(sig_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    mac.verify_slice(&sig_bytes).is_ok()
}

/// GitLab sends the configured secret verbatim.
///
/// Both sides are reduced to fixed-length MACs so the comparison takes
/// the same time whatever the token.
fn verify_gitlab_token(secret: &str, token: Option<&str>) -> bool {
    let Some(token) = token else {
        return false;
    };

    let Ok(mut expected) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    expected.update(secret.as_bytes());
    let expected = expected.finalize().into_bytes();

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(token.as_bytes());

    mac.verify_slice(&expected).is_ok()
}
