use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Claims carried by access tokens.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Claims {
    /// Subject - the user id this token belongs to.
    pub sub: String,
    /// User's role (`user`, `admin`, `superadmin`).
    pub role: String,
    /// Expiration time as Unix timestamp.
    pub exp: i64,
    /// Issued-at as Unix timestamp.
    pub iat: i64,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == "admin" || self.role == "superadmin"
    }

    pub fn is_superadmin(&self) -> bool {
        self.role == "superadmin"
    }

    /// Whether the token expires within `seconds` of `now`. Drives the
    /// WebSocket `reauth` prompt.
    pub fn expires_within(&self, now: DateTime<Utc>, seconds: i64) -> bool {
        self.exp - now.timestamp() <= seconds
    }
}

/// Sign an access token for the given user and role.
pub fn sign(
    secret: &str,
    user_id: &str,
    role: &str,
    now: DateTime<Utc>,
    ttl_seconds: i64,
) -> Result<String, ServiceError> {
    let claims = Claims {
        sub: user_id.to_owned(),
        role: role.to_owned(),
        exp: now.timestamp() + ttl_seconds,
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| ServiceError::Internal(err.to_string()))
}

/// Verify a token signature and expiry, returning its claims.
pub fn verify(secret: &str, token: &str) -> Result<Claims, ServiceError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ServiceError::AuthRequired("invalid token".into()))?;

    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sign_and_verify_round_trip() {
        let now = Utc.with_ymd_and_hms(2025, 3, 2, 14, 0, 0).unwrap();
        let token = sign("secret", "user-1", "user", now, 3600).unwrap();
        let claims = verify("secret", &token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.role, "user");
        assert!(!claims.is_admin());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let token = sign("secret", "user-1", "user", now, 3600).unwrap();
        assert!(verify("other", &token).is_err());
    }

    #[test]
    fn near_expiry_detection() {
        let now = Utc.with_ymd_and_hms(2025, 3, 2, 14, 0, 0).unwrap();
        let claims = Claims {
            sub: "u".into(),
            role: "user".into(),
            exp: now.timestamp() + 90,
            iat: now.timestamp(),
        };
        assert!(claims.expires_within(now, 120));
        assert!(!claims.expires_within(now, 60));
    }
}
