//! Device auth codes

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use trail_api::models::AuthCodeResponse;

use crate::errors::TrailError;
use crate::utils::redact;

/// Renewal fires this long before the code expires
pub const RENEWAL_MARGIN: Duration = Duration::from_secs(60);

/// What to do when the renewal instant has already passed at scheduling time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LateRenewalPolicy {
    /// Arm nothing and log a warning
    #[default]
    Skip,
    /// Renew right away
    Immediate,
}

/// An opaque bearer credential for one device, with its expiry
#[derive(Debug, Clone)]
pub struct AuthCode {
    code: SecretString,
    expires_at: DateTime<Utc>,
}

impl AuthCode {
    pub fn new(code: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            code: SecretString::from(code.into()),
            expires_at,
        }
    }

    /// Build an auth code from the server response. A missing field fails the
    /// step; an unreadable expiry is reported as [`TrailError::InvalidExpiry`].
    pub fn from_response(response: &AuthCodeResponse) -> Result<Self, TrailError> {
        let code = response
            .auth_code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| TrailError::AuthError("auth code response is missing authCode".to_string()))?;
        let expires = response
            .expires
            .as_ref()
            .filter(|v| !v.is_null())
            .ok_or_else(|| TrailError::AuthError("auth code response is missing expires".to_string()))?;

        Ok(Self::new(code, parse_expiry(expires)?))
    }

    /// The raw code, for the realtime handshake only
    pub fn expose(&self) -> &str {
        self.code.expose_secret()
    }

    /// The code shortened for logs
    pub fn redacted(&self) -> String {
        redact(self.code.expose_secret())
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Instant at which renewal should fire
    pub fn renewal_at(&self) -> DateTime<Utc> {
        self.expires_at - chrono::Duration::from_std(RENEWAL_MARGIN).unwrap_or_default()
    }

    /// Time left until renewal, or `None` when that instant is not strictly
    /// in the future.
    pub fn renewal_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
        let delay = self.renewal_at() - now;
        if delay <= chrono::Duration::zero() {
            return None;
        }
        delay.to_std().ok()
    }
}

/// Parse an expiry as sent by the server: RFC 3339, a naive UTC datetime, or
/// epoch milliseconds (number or numeric string).
pub fn parse_expiry(raw: &Value) -> Result<DateTime<Utc>, TrailError> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| TrailError::InvalidExpiry(n.to_string())),
        Value::String(s) => parse_expiry_str(s.trim()),
        other => Err(TrailError::InvalidExpiry(other.to_string())),
    }
}

fn parse_expiry_str(s: &str) -> Result<DateTime<Utc>, TrailError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(ms) = s.parse::<i64>() {
        if let Some(dt) = Utc.timestamp_millis_opt(ms).single() {
            return Ok(dt);
        }
    }
    Err(TrailError::InvalidExpiry(s.to_string()))
}
