//! Webhook HTTP surface: request parsing and response mapping around the
//! delivery controller.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::delivery::{
    DeliveryController, DeliveryError, DeliveryFailure, DeliveryOutcome, DeliveryRequest,
};

pub mod server;

/// Health check route.
pub const HEALTH_ENDPOINT: &str = "/health";
/// Webhook route.
pub const WEBHOOK_ENDPOINT: &str = "/webhook";

/// Generic body for unclassified failures; internal detail stays in the logs.
const INTERNAL_ERROR: &str = "Internal server error";

/// Inbound webhook body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Message text. Required.
    #[serde(default)]
    pub message: Option<String>,
    /// Explicit recipients. When absent, empty or not an array, configured
    /// defaults apply.
    #[serde(default, deserialize_with = "lenient_numbers")]
    pub phone_numbers: Option<Vec<String>>,
    /// Group chat search key.
    #[serde(default)]
    pub group_keyword: Option<String>,
}

impl WebhookPayload {
    /// Convert into the controller's input. An empty `groupKeyword` counts as absent.
    pub fn into_request(self) -> DeliveryRequest {
        DeliveryRequest {
            message: self.message.unwrap_or_default(),
            addressees: self.phone_numbers.unwrap_or_default(),
            conversation_hint: self.group_keyword.filter(|k| !k.is_empty()),
        }
    }
}

/// Accept any JSON for `phoneNumbers`; only an array yields recipients.
///
/// Non-string array entries are kept in their JSON text form so validation
/// reports them as offenders.
fn lenient_numbers<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(entries) = Value::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(Some(
        entries
            .into_iter()
            .map(|entry| match entry {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
    ))
}

/// Success body returned to webhook callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    /// Always `true`.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// `"group"` or `"individual"`.
    pub mode: &'static str,
    /// Attempted recipient count, or `"group chat"`.
    pub recipients: serde_json::Value,
    /// Recipients the message was attempted for.
    pub phone_numbers: Option<Vec<String>>,
    /// Group chat hint from the request.
    pub group_chat: Option<String>,
    /// Successful individual sends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub succeeded: Option<usize>,
    /// Failed individual sends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
    /// Per-recipient failure detail.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<DeliveryFailure>,
}

impl From<&DeliveryOutcome> for WebhookResponse {
    fn from(outcome: &DeliveryOutcome) -> Self {
        match outcome {
            DeliveryOutcome::GroupDelivered { conversation_hint } => Self {
                success: true,
                message: format!("Message sent to group chat: {conversation_hint}"),
                mode: outcome.mode(),
                recipients: json!("group chat"),
                phone_numbers: None,
                group_chat: Some(conversation_hint.clone()),
                succeeded: None,
                failed: None,
                failures: Vec::new(),
            },
            DeliveryOutcome::IndividualDelivered {
                addressees,
                succeeded,
                failed,
                failures,
                fallback_from,
            } => Self {
                success: true,
                message: format!(
                    "Message sent via individual messages: {succeeded} successful, {failed} failed"
                ),
                mode: outcome.mode(),
                recipients: json!(addressees.len()),
                phone_numbers: Some(addressees.iter().map(ToString::to_string).collect()),
                group_chat: fallback_from.clone(),
                succeeded: Some(*succeeded),
                failed: Some(*failed),
                failures: failures.clone(),
            },
        }
    }
}

/// Map a delivery error to a status code and `{ "error": ... }` body.
pub fn error_response(err: &DeliveryError) -> (StatusCode, Json<serde_json::Value>) {
    if err.is_client_error() {
        warn!(error = %err, "rejecting webhook request");
        (StatusCode::BAD_REQUEST, Json(json!({ "error": err.to_string() })))
    } else {
        error!(error = %err, "webhook delivery failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": INTERNAL_ERROR })),
        )
    }
}

/// Build the router serving `/health` and `/webhook`.
pub fn build_router(controller: Arc<DeliveryController>) -> Router {
    Router::new()
        .route(HEALTH_ENDPOINT, get(handle_health))
        .route(WEBHOOK_ENDPOINT, post(handle_webhook))
        .with_state(controller)
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn handle_webhook(
    State(controller): State<Arc<DeliveryController>>,
    payload: Result<Json<WebhookPayload>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(error = %rejection, "malformed webhook body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": rejection.body_text() })),
            )
                .into_response();
        }
    };

    let request = payload.into_request();
    info!(
        group = request.conversation_hint.as_deref().unwrap_or("-"),
        recipients = request.addressees.len(),
        "webhook received"
    );

    match controller.deliver(&request).await {
        Ok(outcome) => (StatusCode::OK, Json(WebhookResponse::from(&outcome))).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}
