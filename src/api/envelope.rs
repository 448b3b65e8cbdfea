//! The `{success, data, error, meta}` wrapper every route responds with.

use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

const API_VERSION: &str = "v1";

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMeta {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "apiVersion")]
    pub api_version: &'static str,
}

pub fn meta_now() -> ResponseMeta {
    ResponseMeta {
        timestamp: Utc::now(),
        api_version: API_VERSION,
    }
}

/// Successful response body. Handlers build this via [`Envelope::ok`] and
/// return it directly; [`IntoResponse`] fixes the status at 200.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub meta: ResponseMeta,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            meta: meta_now(),
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
