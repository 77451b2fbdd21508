use std::str;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64ct::{Base64, Encoding};
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;

use super::AppState;
use super::error::ApiError;

const ADMIN_USER: &str = "greensteps";

pub(super) async fn admin_basic_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    fn need_auth() -> Response {
        let authn = [("www-authenticate", "Basic realm=\"admin\"")];
        (StatusCode::UNAUTHORIZED, authn).into_response()
    }
    let Some(admin) = state.config.admin.as_ref() else {
        return need_auth();
    };
    let Some(authz) = req.headers().get("authorization") else {
        return need_auth();
    };

    let Ok(cred) = authz.to_str() else {
        return need_auth();
    };
    let Some(cred) = cred
        .strip_prefix("Basic ")
        .map(str::trim)
        .and_then(|b64| Base64::decode_vec(b64).ok())
        .and_then(|b| String::from_utf8(b).ok())
    else {
        return need_auth();
    };

    let Some((user, password)) = cred.split_once(':') else {
        return need_auth();
    };

    let password_ok: bool = password
        .as_bytes()
        .ct_eq(admin.password.expose_secret().as_bytes())
        .into();
    if user != ADMIN_USER || !password_ok {
        return need_auth();
    }

    next.run(req).await
}

/// Id of the user making the request, as asserted by the auth proxy.
#[derive(Clone, Debug)]
pub(crate) struct Requester(pub(crate) String);

/// Rejects requests without a user id header and records the id for
/// handlers.
pub(super) async fn require_user(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let header = state.config.server.user_header.as_str();
    let id = req
        .headers()
        .get(header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && !id.contains('\0'))
        .map(str::to_string);
    let Some(id) = id else {
        return ApiError::Unauthenticated.into_response();
    };
    req.extensions_mut().insert(Requester(id));
    next.run(req).await
}

impl<S: Send + Sync> FromRequestParts<S> for Requester {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Requester>()
            .cloned()
            .ok_or(ApiError::Unauthenticated)
    }
}
