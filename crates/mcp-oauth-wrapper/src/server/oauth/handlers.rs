//! OAuth 2.0 endpoint handlers.
//!
//! Each endpoint is split into a plain async function over the [`OAuthStore`] (easy to
//! test without a network) and a thin axum handler that decodes the request, logs
//! rejections and encodes the response.
//!
//! Implements:
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 6749: OAuth 2.0 Authorization Code Grant

use std::sync::Arc;

use axum::{
    Form, Json,
    body::Bytes,
    extract::{RawQuery, State, rejection::FormRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Basic};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use url::Url;

use super::store::{ACCESS_TOKEN_LIFETIME_SECS, OAuthStore};
use crate::error::{OAuthError, OAuthResult};
use crate::server::transport::{HttpState, paths};

const RESPONSE_TYPE_CODE: &str = "code";
const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";
const AUTH_METHOD_POST: &str = "client_secret_post";
const AUTH_METHOD_BASIC: &str = "client_secret_basic";

fn log_rejection(endpoint: &'static str, err: OAuthError) -> OAuthError {
    tracing::warn!(endpoint, error = err.error_code(), reason = %err, "Rejected OAuth request");
    err
}

/// Fallback for methods an endpoint does not accept.
pub async fn method_not_allowed() -> OAuthError {
    OAuthError::MethodNotAllowed
}

// ─── RFC 8414: Authorization Server Metadata ─────────────────────────────────

/// Discovery document describing this issuer.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub response_types_supported: &'static [&'static str],
    pub grant_types_supported: &'static [&'static str],
    pub token_endpoint_auth_methods_supported: &'static [&'static str],
}

impl AuthorizationServerMetadata {
    /// Build the document for an issuer base URL (no trailing slash).
    #[must_use]
    pub fn for_issuer(issuer: &str) -> Self {
        Self {
            issuer: issuer.to_owned(),
            authorization_endpoint: format!("{issuer}{}", paths::AUTHORIZE),
            token_endpoint: format!("{issuer}{}", paths::TOKEN),
            registration_endpoint: format!("{issuer}{}", paths::REGISTER),
            response_types_supported: &[RESPONSE_TYPE_CODE],
            grant_types_supported: &[GRANT_TYPE_AUTHORIZATION_CODE],
            token_endpoint_auth_methods_supported: &[AUTH_METHOD_POST, AUTH_METHOD_BASIC],
        }
    }
}

/// `GET /.well-known/oauth-authorization-server`
pub async fn handle_auth_server_metadata(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(AuthorizationServerMetadata::for_issuer(&state.config.public_url))
}

// ─── RFC 7591: Dynamic Client Registration ───────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    // Accepted for compatibility; only the defaults are ever granted.
    #[serde(default)]
    pub grant_types: Vec<String>,
    #[serde(default)]
    pub response_types: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub client_id: String,
    pub client_secret: String,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: &'static [&'static str],
    pub response_types: &'static [&'static str],
    pub token_endpoint_auth_method: &'static str,
    pub client_id_issued_at: i64,
    /// Always 0: the secret never expires.
    pub client_secret_expires_at: i64,
}

/// Validate registration metadata and mint a client.
pub async fn register(store: &OAuthStore, req: RegisterRequest) -> OAuthResult<RegisterResponse> {
    if req.redirect_uris.is_empty() {
        return Err(OAuthError::malformed("redirect_uris is required"));
    }
    if let Some(bad) = req.redirect_uris.iter().find(|uri| Url::parse(uri).is_err()) {
        return Err(OAuthError::malformed(format!("redirect_uri {bad:?} is not an absolute URL")));
    }

    if !req.grant_types.is_empty() || !req.response_types.is_empty() {
        tracing::debug!(
            grant_types = ?req.grant_types,
            response_types = ?req.response_types,
            "Ignoring requested grant/response types"
        );
    }

    let client = store.register_client(req.client_name, req.redirect_uris).await;

    tracing::info!(
        client_id = %client.client_id,
        client_name = %client.client_name,
        "Registered OAuth client"
    );

    Ok(RegisterResponse {
        client_id: client.client_id,
        client_secret: client.client_secret,
        client_name: client.client_name,
        redirect_uris: client.redirect_uris,
        grant_types: &[GRANT_TYPE_AUTHORIZATION_CODE],
        response_types: &[RESPONSE_TYPE_CODE],
        token_endpoint_auth_method: AUTH_METHOD_POST,
        client_id_issued_at: client.issued_at.timestamp(),
        client_secret_expires_at: 0,
    })
}

/// `POST /register`
///
/// The body is decoded as JSON whatever the declared content type.
pub async fn handle_register(
    State(state): State<Arc<HttpState>>,
    body: Bytes,
) -> Result<Response, OAuthError> {
    let req: RegisterRequest = serde_json::from_slice(&body).map_err(|e| {
        log_rejection("register", OAuthError::malformed(format!("invalid registration body: {e}")))
    })?;

    let response = register(&state.store, req).await.map_err(|e| log_rejection("register", e))?;

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

// ─── Authorization Endpoint ──────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct AuthorizeQuery {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub state: Option<String>,
}

impl AuthorizeQuery {
    /// Decode an authorization query string. The first occurrence of a repeated
    /// parameter wins; unknown parameters are ignored.
    #[must_use]
    pub fn parse(query: &str) -> Self {
        let mut parsed = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                "client_id" => &mut parsed.client_id,
                "redirect_uri" => &mut parsed.redirect_uri,
                "response_type" => &mut parsed.response_type,
                "state" => &mut parsed.state,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        parsed
    }
}

/// Validate an authorization request and issue a code.
///
/// Every valid request is pre-authorized: there is a single trusted upstream
/// credential, so no per-user consent applies. Returns the redirect target.
pub async fn authorize(store: &OAuthStore, query: &AuthorizeQuery) -> OAuthResult<Url> {
    let client_id = query.client_id.as_deref().unwrap_or_default();
    let Some(client) = store.get_client(client_id).await else {
        return Err(OAuthError::UnknownClient);
    };

    let redirect_uri = query.redirect_uri.as_deref().unwrap_or_default();
    if !client.has_redirect_uri(redirect_uri) {
        return Err(OAuthError::InvalidRedirect);
    }

    if query.response_type.as_deref() != Some(RESPONSE_TYPE_CODE) {
        return Err(OAuthError::UnsupportedResponseType);
    }

    let target = Url::parse(redirect_uri).map_err(|_| OAuthError::InvalidRedirect)?;
    let code = store.issue_code(&client.client_id, redirect_uri).await;

    tracing::info!(client_id = %client.client_id, "Auto-approved authorization");

    let state = query.state.as_deref().filter(|s| !s.is_empty());
    Ok(with_code_params(target, &code, state))
}

/// Merge `code` (and `state`, if any) into the redirect target's query string.
///
/// Existing parameters are kept; a pre-existing `code`, or `state` when one is
/// supplied, is replaced.
#[must_use]
pub fn with_code_params(mut target: Url, code: &str, state: Option<&str>) -> Url {
    let retained: Vec<(String, String)> = target
        .query_pairs()
        .filter(|(key, _)| key != "code" && !(state.is_some() && key == "state"))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    target.set_query(None);
    {
        let mut pairs = target.query_pairs_mut();
        pairs.extend_pairs(retained);
        pairs.append_pair("code", code);
        if let Some(state) = state {
            pairs.append_pair("state", state);
        }
    }

    target
}

/// `GET /authorize`
pub async fn handle_authorize_get(
    State(state): State<Arc<HttpState>>,
    RawQuery(query): RawQuery,
) -> Result<Response, OAuthError> {
    let query = AuthorizeQuery::parse(query.as_deref().unwrap_or_default());

    let target = authorize(&state.store, &query).await.map_err(|e| log_rejection("authorize", e))?;

    Ok((StatusCode::FOUND, [(header::LOCATION, target.to_string())]).into_response())
}

/// `GET /oauth/callback`
///
/// The client platform handles its own callback; this only acknowledges stray hits.
pub async fn handle_callback() -> &'static str {
    "OAuth callback received"
}

// ─── Token Endpoint ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// Client credentials from the form, or from HTTP Basic when the form lacks either half.
fn client_credentials(form: &TokenRequest, basic: Option<(String, String)>) -> (String, String) {
    let id = form.client_id.clone().unwrap_or_default();
    let secret = form.client_secret.clone().unwrap_or_default();

    if id.is_empty() || secret.is_empty() {
        if let Some(basic) = basic {
            return basic;
        }
    }
    (id, secret)
}

/// Exchange an authorization code for an access token.
///
/// The code is removed from the store as soon as it is looked up, so a failed
/// attempt burns it just like a successful one.
pub async fn exchange(
    store: &OAuthStore,
    form: &TokenRequest,
    basic: Option<(String, String)>,
) -> OAuthResult<TokenResponse> {
    if form.grant_type.as_deref() != Some(GRANT_TYPE_AUTHORIZATION_CODE) {
        return Err(OAuthError::UnsupportedGrantType);
    }

    let (client_id, client_secret) = client_credentials(form, basic);
    let Some(client) = store.get_client(&client_id).await else {
        return Err(OAuthError::InvalidClient);
    };
    if !bool::from(client.client_secret.as_bytes().ct_eq(client_secret.as_bytes())) {
        return Err(OAuthError::InvalidClient);
    }

    let code = form.code.as_deref().unwrap_or_default();
    let Some(auth_code) = store.redeem_code(code).await else {
        return Err(OAuthError::InvalidGrant("invalid authorization code"));
    };

    let redirect_uri = form.redirect_uri.as_deref().unwrap_or_default();
    if auth_code.client_id != client.client_id || auth_code.redirect_uri != redirect_uri {
        return Err(OAuthError::InvalidGrant(
            "authorization code was not issued for this client and redirect_uri",
        ));
    }

    if auth_code.is_expired_at(store.now()) {
        return Err(OAuthError::InvalidGrant("authorization code expired"));
    }

    let token = store.issue_token(&client.client_id).await;

    tracing::info!(client_id = %client.client_id, "Issued access token");

    Ok(TokenResponse {
        access_token: token.token,
        token_type: "Bearer",
        expires_in: ACCESS_TOKEN_LIFETIME_SECS,
    })
}

/// `POST /token`
pub async fn handle_token(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Result<Response, OAuthError> {
    let Form(form) = form.map_err(|e| {
        log_rejection("token", OAuthError::malformed(format!("invalid token request: {e}")))
    })?;

    let basic = headers
        .typed_get::<Authorization<Basic>>()
        .map(|auth| (auth.username().to_owned(), auth.password().to_owned()));

    let token = exchange(&state.store, &form, basic).await.map_err(|e| log_rejection("token", e))?;

    Ok(token_success(token))
}

/// Build a token response with required OAuth 2.0 cache headers (RFC 6749 §5.1).
fn token_success(token: TokenResponse) -> Response {
    let mut response = Json(token).into_response();

    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}
