//! Request authentication.
//!
//! Credentials come from the `Authorization` header, in one of three forms:
//!
//! - `Basic base64(email:password)`: a password login, granted `ReadWrite`
//! - `Bearer <secret>`
//! - `Token token="<secret>"`
//!
//! or, when the header is absent, from the `_tok` query parameter. The
//! [`authenticate`] middleware resolves them into a [`Principal`]; the
//! [`ReadAccess`] and [`ReadWriteAccess`] extractors enforce it per handler.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use tormgr_core::{Access, User};

use crate::error::ApiError;
use crate::state::AppState;

pub const TOKEN_QUERY_PARAM: &str = "_tok";

/// Credentials presented by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Password { email: String, password: String },
    Token(String),
}

/// The authenticated caller, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user: User,
    pub access: Access,
}

/// Extract credentials from the request.
///
/// `Ok(None)` means the client sent none. A header that is present but
/// unparseable is a bad request.
pub fn parse_credentials(
    headers: &HeaderMap,
    query: Option<&str>,
) -> Result<Option<Credentials>, ApiError> {
    if let Some(value) = headers.get(AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| ApiError::bad_request("Malformed Authorization header"))?;
        return parse_authorization(value).map(Some);
    }

    let token = query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(name, _)| name == TOKEN_QUERY_PARAM)
            .map(|(_, value)| value.into_owned())
    });
    Ok(token.filter(|t| !t.is_empty()).map(Credentials::Token))
}

fn parse_authorization(value: &str) -> Result<Credentials, ApiError> {
    let malformed = || ApiError::bad_request("Malformed Authorization header");
    let (scheme, rest) = value.trim().split_once(' ').ok_or_else(malformed)?;
    let rest = rest.trim();

    match scheme.to_ascii_lowercase().as_str() {
        "basic" => {
            let decoded = STANDARD.decode(rest).map_err(|_| malformed())?;
            let decoded = String::from_utf8(decoded).map_err(|_| malformed())?;
            let (email, password) = decoded.split_once(':').ok_or_else(malformed)?;
            Ok(Credentials::Password {
                email: email.to_string(),
                password: password.to_string(),
            })
        }
        "bearer" if !rest.is_empty() => Ok(Credentials::Token(rest.to_string())),
        "token" => {
            let secret = token_param(rest)
                .filter(|s| !s.is_empty())
                .ok_or_else(malformed)?;
            Ok(Credentials::Token(secret.to_string()))
        }
        _ => Err(malformed()),
    }
}

/// Value of the leading `token=` parameter of a `Token` header. A quoted
/// value ends at its closing quote, a bare one at the next comma or space;
/// any parameters after it are ignored.
fn token_param(params: &str) -> Option<&str> {
    let value = params.strip_prefix("token=")?;
    match value.strip_prefix('"') {
        Some(quoted) => quoted.split_once('"').map(|(secret, _)| secret),
        None => value
            .split(|c: char| c == ',' || c.is_whitespace())
            .next(),
    }
}

/// Resolve credentials into a [`Principal`].
///
/// `Ok(None)` for credentials that match nothing. A store or cache failure is
/// an error so that it is never mistaken for a rejection.
pub async fn resolve(
    state: &AppState,
    credentials: Credentials,
) -> Result<Option<Principal>, ApiError> {
    match credentials {
        Credentials::Password { email, password } => {
            let user = state
                .storage
                .users()
                .authenticate_with_password(&email, &password)
                .await
                .map_err(|e| {
                    tracing::warn!(error = %e, "password verification failed");
                    ApiError::unavailable("unable to verify credentials")
                })?;
            Ok(user.map(|user| Principal {
                user,
                access: Access::ReadWrite,
            }))
        }
        Credentials::Token(secret) => {
            let authenticated = state.tokens.authenticate(&secret).await.map_err(|e| {
                tracing::warn!(error = %e, "token verification failed");
                ApiError::unavailable("unable to verify credentials")
            })?;
            Ok(authenticated.map(|a| Principal {
                user: a.user,
                access: a.access,
            }))
        }
    }
}

/// Middleware attaching the caller's [`Principal`] when credentials are sent.
///
/// Requests without credentials pass through untouched; handlers that need a
/// principal reject them through the extractors.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let credentials = match parse_credentials(req.headers(), req.uri().query()) {
        Ok(Some(credentials)) => credentials,
        Ok(None) => return next.run(req).await,
        Err(e) => return e.into_response(),
    };

    match resolve(&state, credentials).await {
        Ok(Some(principal)) => {
            tracing::debug!(user = %principal.user, access = %principal.access, "authenticated");
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Ok(None) => ApiError::unauthorized("Invalid Credentials").into_response(),
        Err(e) => e.into_response(),
    }
}

fn require(parts: &Parts, required: Access) -> Result<Principal, ApiError> {
    let principal = parts
        .extensions
        .get::<Principal>()
        .cloned()
        .ok_or_else(ApiError::challenge)?;
    if !principal.access.allows(required) {
        return Err(ApiError::forbidden(format!(
            "{} access required",
            required
        )));
    }
    Ok(principal)
}

/// A caller allowed to read.
pub struct ReadAccess(pub Principal);

impl<S> FromRequestParts<S> for ReadAccess
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        require(parts, Access::Read).map(Self)
    }
}

/// A caller allowed to read and write.
pub struct ReadWriteAccess(pub Principal);

impl<S> FromRequestParts<S> for ReadWriteAccess
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        require(parts, Access::ReadWrite).map(Self)
    }
}
