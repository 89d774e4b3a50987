//! JWT bearer token creation and verification.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::AuthConfig, errors::Error, types::Subject};

/// JWT claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (owner identifier)
    pub exp: i64,    // Expiration time
    pub iat: i64,    // Issued at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

impl Claims {
    pub fn new(subject: &Subject, config: &AuthConfig) -> Self {
        let now = Utc::now();
        let expiry = chrono::Duration::from_std(config.token_expiry).unwrap_or(chrono::Duration::hours(24));

        Self {
            sub: subject.as_str().to_string(),
            exp: (now + expiry).timestamp(),
            iat: now.timestamp(),
            iss: config.issuer.clone(),
            aud: config.audience.clone(),
        }
    }
}

fn secret_key(config: &AuthConfig) -> Result<&str, Error> {
    config
        .secret_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| Error::Internal {
            operation: "JWT: auth.secret_key is required".to_string(),
        })
}

/// Mint a bearer token for `subject`
pub fn issue(subject: &Subject, config: &AuthConfig) -> Result<String, Error> {
    let claims = Claims::new(subject, config);
    let key = EncodingKey::from_secret(secret_key(config)?.as_bytes());
    encode(&Header::new(Algorithm::HS256), &claims, &key).map_err(|e| Error::Internal {
        operation: format!("create JWT: {e}"),
    })
}

/// Verify a bearer token and return its subject
pub fn verify(token: &str, config: &AuthConfig) -> Result<Subject, Error> {
    let key = DecodingKey::from_secret(secret_key(config)?.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    if let Some(issuer) = &config.issuer {
        validation.set_issuer(&[issuer]);
    }
    match &config.audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        // Client errors (401) - malformed tokens, invalid claims, expired tokens
        jsonwebtoken::errors::ErrorKind::InvalidToken
        | jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::ExpiredSignature
        | jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_)
        | jsonwebtoken::errors::ErrorKind::InvalidIssuer
        | jsonwebtoken::errors::ErrorKind::InvalidAudience
        | jsonwebtoken::errors::ErrorKind::InvalidSubject
        | jsonwebtoken::errors::ErrorKind::ImmatureSignature
        | jsonwebtoken::errors::ErrorKind::Base64(_)
        | jsonwebtoken::errors::ErrorKind::Json(_)
        | jsonwebtoken::errors::ErrorKind::Utf8(_)
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => Error::Unauthenticated {
            message: Some("Invalid bearer token".to_string()),
        },

        // Server errors (500) - key issues, internal failures
        jsonwebtoken::errors::ErrorKind::InvalidEcdsaKey
        | jsonwebtoken::errors::ErrorKind::InvalidRsaKey(_)
        | jsonwebtoken::errors::ErrorKind::RsaFailedSigning
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithmName
        | jsonwebtoken::errors::ErrorKind::InvalidKeyFormat
        | jsonwebtoken::errors::ErrorKind::MissingAlgorithm
        | jsonwebtoken::errors::ErrorKind::Crypto(_) => Error::Internal {
            operation: format!("JWT verification: {e}"),
        },

        // Catch-all for any future error variants (default to server error for safety)
        _ => Error::Internal {
            operation: format!("JWT verification (unknown error): {e}"),
        },
    })?;

    if token_data.claims.sub.is_empty() {
        return Err(Error::Unauthenticated {
            message: Some("Bearer token has an empty subject".to_string()),
        });
    }

    Ok(Subject::new(token_data.claims.sub))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn create_test_config() -> AuthConfig {
        AuthConfig {
            secret_key: Some("test-secret-key-for-jwt".to_string()),
            token_expiry: Duration::from_secs(3600),
            ..Default::default()
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let config = create_test_config();
        let subject = Subject::new("auth0|u1");

        let token = issue(&subject, &config).unwrap();
        assert_eq!(verify(&token, &config).unwrap(), subject);
    }

    #[test]
    fn test_wrong_secret_is_unauthenticated() {
        let config = create_test_config();
        let token = issue(&Subject::new("u1"), &config).unwrap();

        let other = AuthConfig {
            secret_key: Some("another-secret".to_string()),
            ..create_test_config()
        };
        assert!(matches!(verify(&token, &other), Err(Error::Unauthenticated { .. })));
    }

    #[test]
    fn test_expired_token_is_unauthenticated() {
        let config = create_test_config();
        let claims = Claims {
            sub: "u1".to_string(),
            exp: Utc::now().timestamp() - 3600,
            iat: Utc::now().timestamp() - 7200,
            iss: None,
            aud: None,
        };
        let key = EncodingKey::from_secret(b"test-secret-key-for-jwt");
        let token = encode(&Header::new(Algorithm::HS256), &claims, &key).unwrap();

        assert!(matches!(verify(&token, &config), Err(Error::Unauthenticated { .. })));
    }

    #[test]
    fn test_issuer_and_audience_checked() {
        let config = AuthConfig {
            issuer: Some("https://issuer.example.com/".to_string()),
            audience: Some("hwctl".to_string()),
            ..create_test_config()
        };
        let token = issue(&Subject::new("u1"), &config).unwrap();
        assert!(verify(&token, &config).is_ok());

        let strict = AuthConfig {
            audience: Some("someone-else".to_string()),
            ..config.clone()
        };
        assert!(matches!(verify(&token, &strict), Err(Error::Unauthenticated { .. })));
    }

    #[test]
    fn test_garbage_token() {
        let config = create_test_config();
        assert!(matches!(verify("not.a.jwt", &config), Err(Error::Unauthenticated { .. })));
    }

    #[test]
    fn test_missing_secret_is_internal() {
        let config = AuthConfig::default();
        assert!(matches!(issue(&Subject::new("u1"), &config), Err(Error::Internal { .. })));
    }
}
