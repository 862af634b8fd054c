//! `POST /webhook`: Ko-fi notification intake.
//!
//! Ko-fi posts `application/x-www-form-urlencoded` with a single `data` field
//! holding the notification as JSON text. The notification's
//! `verification_token` selects the subscribers.

use axum::Json;
use axum::extract::rejection::FormRejection;
use axum::extract::{Form, State};
use kofi_bridge_core::RoutingKey;
use kofi_bridge_core::metrics::{WEBHOOKS_RECEIVED_TOTAL, WEBHOOKS_REJECTED_TOTAL};
use metrics::counter;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::errors::ApiError;
use crate::server::AppState;

/// Detail returned when the notification carries no usable token.
pub const MISSING_TOKEN: &str = "Missing verification_token";

/// Field carrying the routing key inside the notification.
pub const TOKEN_FIELD: &str = "verification_token";

/// Form body posted by Ko-fi.
#[derive(Debug, Deserialize)]
pub struct WebhookForm {
    /// JSON-encoded notification.
    pub data: String,
}

/// Parse a notification and pull out its routing key.
///
/// The payload must be a JSON object with a non-empty string
/// `verification_token`.
pub fn parse_notification(data: &str) -> Result<(RoutingKey, Value), ApiError> {
    let payload: Value = serde_json::from_str(data)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON in data field: {e}")))?;
    if !payload.is_object() {
        return Err(ApiError::BadRequest(
            "data field must be a JSON object".into(),
        ));
    }
    let key = payload
        .get(TOKEN_FIELD)
        .and_then(Value::as_str)
        .and_then(|token| RoutingKey::new(token).ok())
        .ok_or_else(|| ApiError::BadRequest(MISSING_TOKEN.into()))?;
    Ok((key, payload))
}

/// POST /webhook
///
/// Delivers to every subscriber of the token and answers
/// `{"status":"success"}` regardless of how delivery went.
#[instrument(skip_all)]
pub async fn webhook_handler(
    State(state): State<AppState>,
    form: Result<Form<WebhookForm>, FormRejection>,
) -> Result<Json<Value>, ApiError> {
    counter!(WEBHOOKS_RECEIVED_TOTAL).increment(1);

    let (key, payload) = match form
        .map_err(ApiError::from)
        .and_then(|Form(form)| parse_notification(&form.data))
    {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(error = %e, "webhook rejected");
            counter!(WEBHOOKS_REJECTED_TOTAL, "reason" => e.kind()).increment(1);
            return Err(e);
        }
    };

    let report = state.registry.deliver(&key, &payload).await;
    info!(
        key = %key,
        recipients = report.recipients,
        delivered = report.delivered,
        pruned = report.pruned,
        "webhook relayed"
    );

    Ok(Json(json!({ "status": "success" })))
}
