use crate::{
    AppState,
    auth::token,
    errors::{Error, Result},
    types::Subject,
};
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{debug, instrument, trace};

/// Extract a bearer token from the Authorization header if present
/// Returns:
/// - None: No Authorization header, or a scheme other than Bearer (matched case-insensitively)
/// - Some(Ok(subject)): Valid token found and verified
/// - Some(Err(error)): Bearer token present but invalid
fn try_bearer_auth(parts: &Parts, state: &AppState) -> Option<Result<Subject>> {
    let auth_header = parts.headers.get(axum::http::header::AUTHORIZATION)?;

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::Unauthenticated {
                message: Some(format!("Invalid authorization header: {e}")),
            }));
        }
    };

    let (scheme, bearer) = auth_str.trim_start().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token::verify(bearer.trim(), &state.config.auth))
}

/// The authenticated caller. Rejects the request with 401 when no valid bearer token is present.
#[derive(Debug, Clone)]
pub struct AuthenticatedSubject(pub Subject);

impl FromRequestParts<AppState> for AuthenticatedSubject {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match try_bearer_auth(parts, state) {
            Some(Ok(subject)) => {
                debug!("Found bearer authenticated subject: {}", subject);
                Ok(AuthenticatedSubject(subject))
            }
            Some(Err(e)) => {
                trace!("Bearer authentication failed: {:?}", e);
                Err(e)
            }
            None => {
                trace!("No authentication credentials found in request");
                Err(Error::Unauthenticated { message: None })
            }
        }
    }
}

/// The caller if one authenticated. A missing token yields `None`.
///
/// Only the relationship routes use this. While `relationships.require_owner` is off they accept
/// anonymous callers, so an invalid token is treated as no token. With owner checks on, an invalid
/// token is a 401.
#[derive(Debug, Clone, Default)]
pub struct MaybeSubject(pub Option<Subject>);

impl FromRequestParts<AppState> for MaybeSubject {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match try_bearer_auth(parts, state) {
            Some(Ok(subject)) => Ok(MaybeSubject(Some(subject))),
            Some(Err(Error::Unauthenticated { message })) if !state.config.relationships.require_owner => {
                debug!("Ignoring invalid bearer token on an anonymous route: {:?}", message);
                Ok(MaybeSubject(None))
            }
            Some(Err(e)) => Err(e),
            None => Ok(MaybeSubject(None)),
        }
    }
}
