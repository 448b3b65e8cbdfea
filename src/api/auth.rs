//! API-key bearer auth: `Authorization: Bearer <key>` or `?api_key=<key>`.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::domain::Agent;

use super::envelope::meta_now;
use super::state::AppState;

/// Inserted into request extensions by [`auth_middleware`]; handlers pull
/// it out with an `Extension<AuthContext>` parameter.
#[derive(Clone)]
pub struct AuthContext {
    pub agent: Agent,
}

#[derive(Debug)]
pub enum AuthRejection {
    MissingCredentials,
    InvalidApiKey,
}

#[derive(Serialize)]
struct RejectionBody {
    success: bool,
    error: &'static str,
    meta: super::envelope::ResponseMeta,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let message = match self {
            Self::MissingCredentials => "missing api key",
            Self::InvalidApiKey => "invalid api key",
        };
        let body = RejectionBody {
            success: false,
            error: message,
            meta: meta_now(),
        };
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

fn extract_api_key(headers: &HeaderMap, uri: &axum::http::Uri) -> Option<String> {
    if let Some(header) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = header.to_str() {
            if let Some(key) = value.strip_prefix("Bearer ") {
                return Some(key.to_string());
            }
        }
    }

    uri.query().and_then(|query| {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("api_key="))
            .map(|key| key.to_string())
    })
}

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    let api_key = extract_api_key(&headers, request.uri()).ok_or(AuthRejection::MissingCredentials)?;

    let agent = state
        .engine
        .repositories()
        .agents
        .get_by_api_key(&api_key)
        .await
        .map_err(|_| AuthRejection::InvalidApiKey)?
        .ok_or(AuthRejection::InvalidApiKey)?;

    request.extensions_mut().insert(AuthContext { agent });
    Ok(next.run(request).await)
}
