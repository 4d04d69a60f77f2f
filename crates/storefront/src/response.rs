//! JSON response envelope.
//!
//! Every JSON response, success or failure, has the shape
//! `{ "success": bool, "message": string, ...payload }`. The payload must
//! serialize as a map; handlers usually pass a `json!` object.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

/// A response envelope with a flattened payload.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize = Value> {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub payload: T,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> Envelope<T> {
    /// `200 OK` with `success: true`.
    pub fn ok(message: impl Into<String>, payload: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            payload,
            status: StatusCode::OK,
        }
    }

    /// `201 Created` with `success: true`.
    pub fn created(message: impl Into<String>, payload: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(message, payload)
        }
    }

    /// A failure envelope with the given status.
    pub fn failure(status: StatusCode, message: impl Into<String>, payload: T) -> Self {
        Self {
            success: false,
            message: message.into(),
            payload,
            status,
        }
    }
}

impl Envelope {
    /// Success with no payload fields.
    pub fn message(message: impl Into<String>) -> Self {
        Self::ok(message, json!({}))
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_flattened() {
        let envelope = Envelope::created("Order created successfully", json!({ "orderId": 4 }));
        assert_eq!(envelope.status, StatusCode::CREATED);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "success": true,
                "message": "Order created successfully",
                "orderId": 4
            })
        );
    }

    #[test]
    fn test_message_only() {
        let value = serde_json::to_value(Envelope::message("Logged out")).unwrap();
        assert_eq!(value, json!({ "success": true, "message": "Logged out" }));
    }
}
