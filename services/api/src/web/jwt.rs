//! services/api/src/web/jwt.rs
//!
//! Access-token creation and verification. Tokens are HS256-signed and
//! expire after a fixed 30 minutes.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Access-token lifetime.
pub const ACCESS_TOKEN_EXPIRE_MINUTES: i64 = 30;

/// The claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (the user id).
    pub sub: String,
    pub email: String,
    /// Expiration time (unix seconds).
    pub exp: i64,
    /// Issued at (unix seconds).
    pub iat: i64,
}

/// Creates a signed access token for a user.
pub fn create_access_token(
    secret: &str,
    user_id: &str,
    email: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        exp: (now + Duration::minutes(ACCESS_TOKEN_EXPIRE_MINUTES)).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verifies a token's signature and expiry, returning its claims.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip() {
        let token = create_access_token("secret", "user-1", "a@b.c").unwrap();
        let claims = verify_token("secret", &token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "a@b.c");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let token = create_access_token("secret", "user-1", "a@b.c").unwrap();
        assert!(verify_token("other-secret", &token).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let past = Utc::now() - Duration::hours(2);
        let claims = Claims {
            sub: "user-1".to_string(),
            email: "a@b.c".to_string(),
            exp: (past + Duration::minutes(ACCESS_TOKEN_EXPIRE_MINUTES)).timestamp(),
            iat: past.timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        assert!(verify_token("secret", &token).is_err());
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        assert!(verify_token("secret", "not-a-token").is_err());
    }
}
