//! Session tokens: HS256 JWTs carried in an HTTP-only cookie or a bearer
//! header.

use axum::http::{header, HeaderMap};
use chrono::Utc;
use cookie::{Cookie, SameSite};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use daybook_shared::constants::SESSION_COOKIE;
use daybook_shared::UserId;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No session token")]
    Missing,

    #[error("Invalid session token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    #[error("Session subject is not a user id")]
    BadSubject,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    username: String,
    iat: i64,
    exp: i64,
}

/// Signing material and cookie attributes for sessions.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_days: i64,
    secure: bool,
}

impl SessionKeys {
    pub fn new(secret: &[u8], ttl_days: i64, secure: bool) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl_days: ttl_days.max(1),
            secure,
        }
    }

    pub fn issue(&self, user_id: UserId, username: &str) -> Result<String, SessionError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            iat: now,
            exp: now + self.ttl_days * 24 * 60 * 60,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<UserId, SessionError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        data.claims
            .sub
            .parse()
            .map_err(|_| SessionError::BadSubject)
    }

    /// Resolve the session in `headers`, if any.
    pub fn user_from_headers(&self, headers: &HeaderMap) -> Result<UserId, SessionError> {
        let token = token_from_headers(headers).ok_or(SessionError::Missing)?;
        self.verify(&token)
    }

    /// `Set-Cookie` value carrying `token`.
    pub fn cookie(&self, token: &str) -> String {
        Cookie::build((SESSION_COOKIE, token.to_string()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .path("/")
            .secure(self.secure)
            .max_age(time::Duration::days(self.ttl_days))
            .build()
            .to_string()
    }

    /// `Set-Cookie` value that expires the session cookie.
    pub fn cleared_cookie(&self) -> String {
        Cookie::build((SESSION_COOKIE, ""))
            .http_only(true)
            .same_site(SameSite::Strict)
            .path("/")
            .secure(self.secure)
            .max_age(time::Duration::ZERO)
            .expires(time::OffsetDateTime::UNIX_EPOCH)
            .build()
            .to_string()
    }
}

/// Session cookie first, then `Authorization: Bearer`.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE && !cookie.value().is_empty())
        .map(|cookie| cookie.value().to_string());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    })
}
