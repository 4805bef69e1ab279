//! Stateless session tokens and the cookie that carries them.
//!
//! A session is an HS256 JWT bound to one account id. Nothing is stored
//! server side: logout only tells the browser to drop the cookie, so a
//! copied token stays valid until its `exp`.

use anyhow::Context;
use axum::{
    extract::FromRef,
    http::{header::COOKIE, HeaderMap, HeaderValue},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{
    format_description::FormatItem, macros::format_description, Duration, OffsetDateTime,
    UtcOffset,
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    config::{CookieConfig, JwtConfig},
    state::AppState,
};

pub const SESSION_COOKIE_NAME: &str = "jwt";

/// IMF-fixdate, the `Expires` attribute format.
const COOKIE_DATE: &[FormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Session JWT payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid, // account id
    pub iat: u64,
    pub exp: u64,
    pub iss: String,
    pub aud: String,
}

/// A freshly signed token and the instant it stops being accepted.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::seconds(cfg.ttl_days.saturating_mul(86_400)),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user_id: Uuid) -> anyhow::Result<IssuedSession> {
        let now = OffsetDateTime::now_utc();
        let expires_at = now
            .checked_add(self.ttl)
            .context("session ttl out of range")?;
        let claims = SessionClaims {
            sub: user_id,
            iat: now.unix_timestamp() as u64,
            exp: expires_at.unix_timestamp() as u64,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding).context("sign session")?;
        debug!(user_id = %user_id, exp = claims.exp, "session signed");
        Ok(IssuedSession { token, expires_at })
    }

    /// Fails on a bad signature, a foreign issuer or audience, or a passed `exp`.
    pub fn verify(&self, token: &str) -> anyhow::Result<SessionClaims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<SessionClaims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, "session verified");
        Ok(data.claims)
    }
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        SessionKeys::new(&state.config.jwt)
    }
}

/// `Set-Cookie` value carrying a live session.
pub fn session_cookie(
    session: &IssuedSession,
    max_age: Duration,
    cfg: &CookieConfig,
) -> anyhow::Result<HeaderValue> {
    let expires = format_cookie_date(session.expires_at)?;
    let cookie = format!(
        "{SESSION_COOKIE_NAME}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}; Expires={expires}",
        session.token,
        max_age.whole_seconds(),
    );
    with_secure(cookie, cfg)
}

/// `Set-Cookie` value that makes the browser drop the session immediately.
pub fn cleared_session_cookie(cfg: &CookieConfig) -> anyhow::Result<HeaderValue> {
    let expires = format_cookie_date(OffsetDateTime::UNIX_EPOCH)?;
    let cookie = format!(
        "{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0; Expires={expires}"
    );
    with_secure(cookie, cfg)
}

fn with_secure(mut cookie: String, cfg: &CookieConfig) -> anyhow::Result<HeaderValue> {
    if cfg.secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).context("session cookie is not a valid header value")
}

fn format_cookie_date(at: OffsetDateTime) -> anyhow::Result<String> {
    at.to_offset(UtcOffset::UTC)
        .format(COOKIE_DATE)
        .context("format cookie date")
}

/// Reads the session token from the request's `Cookie` headers.
pub fn read_session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
