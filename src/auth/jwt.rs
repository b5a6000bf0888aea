//! JWT session tokens
//!
//! Tokens are HS256-signed and carry everything route handlers need to
//! authorize a request without a user lookup: subject id, identifier,
//! display name (chat and bookings render it), and permission level. The
//! subscription tier is deliberately NOT a claim — the paywall reads it
//! from the user record so a webhook-driven upgrade applies immediately.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::PermissionLevel;
use crate::types::KalikeError;

/// Shortest JWT secret accepted, enforced both at startup validation and
/// when the validator is built
pub const MIN_SECRET_CHARS: usize = 32;

/// Claims carried in every session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User document id (hex ObjectId)
    pub sub: String,
    /// Email or username
    pub identifier: String,
    /// Shown in chat and bookings
    pub display_name: String,
    pub permission_level: PermissionLevel,
    /// Bumped on the user record to invalidate outstanding tokens
    pub version: u32,
    pub iat: u64,
    pub exp: u64,
}

/// Identity fields a fresh token is minted from
#[derive(Debug, Clone)]
pub struct TokenInput {
    pub user_id: String,
    pub identifier: String,
    pub display_name: String,
    pub permission_level: PermissionLevel,
}

/// Signs and verifies session tokens
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
}

impl JwtValidator {
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, KalikeError> {
        if secret.chars().count() < MIN_SECRET_CHARS {
            return Err(KalikeError::Config(format!(
                "JWT_SECRET must be at least {} characters",
                MIN_SECRET_CHARS
            )));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Dev-mode validator with a fixed secret, so local tokens survive
    /// server restarts
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            expiry_seconds: 3600,
        }
    }

    pub fn generate_token(&self, input: TokenInput) -> Result<String, KalikeError> {
        let now = unix_now()?;

        let claims = Claims {
            sub: input.user_id,
            identifier: input.identifier,
            display_name: input.display_name,
            permission_level: input.permission_level,
            version: 1,
            iat: now,
            exp: now + self.expiry_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| KalikeError::Auth(format!("Failed to sign token: {}", e)))
    }

    /// Decode and verify a token, returning its claims
    pub fn verify_token(&self, token: &str) -> Result<Claims, KalikeError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            let message = match err.kind() {
                ErrorKind::ExpiredSignature => "Token expired",
                ErrorKind::InvalidSignature => "Invalid signature",
                _ => "Invalid token",
            };
            KalikeError::Auth(message.to_string())
        })
    }
}

fn unix_now() -> Result<u64, KalikeError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| KalikeError::Auth(format!("System clock error: {}", e)))
}

/// Pull the token out of an Authorization header value.
/// Accepts "Bearer <token>" or a bare token; other schemes and a bare
/// "Bearer" with no token are rejected.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let token = match auth_header?.trim_start().strip_prefix("Bearer ") {
        Some(rest) => rest.trim(),
        None => {
            let bare = auth_header?.trim();
            if bare == "Bearer" || bare.contains(' ') {
                return None;
            }
            bare
        }
    };

    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> JwtValidator {
        JwtValidator::new("kalike-test-secret-of-sufficient-length!".into(), 3600).unwrap()
    }

    fn asha() -> TokenInput {
        TokenInput {
            user_id: "64f000000000000000000001".into(),
            identifier: "asha@example.com".into(),
            display_name: "Asha".into(),
            permission_level: PermissionLevel::Learner,
        }
    }

    #[test]
    fn test_round_trip() {
        let v = validator();
        let token = v.generate_token(asha()).unwrap();

        let claims = v.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "64f000000000000000000001");
        assert_eq!(claims.display_name, "Asha");
        assert_eq!(claims.permission_level, PermissionLevel::Learner);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_garbage_token_rejected() {
        let err = validator().verify_token("not-a-token").unwrap_err();
        assert!(matches!(err, KalikeError::Auth(_)));
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let token = validator().generate_token(asha()).unwrap();
        let other =
            JwtValidator::new("a-completely-different-32-char-secret!!!".into(), 3600).unwrap();
        assert!(other.verify_token(&token).is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(JwtValidator::new("short".into(), 3600).is_err());
        assert!(JwtValidator::new(String::new(), 3600).is_err());
    }

    #[test]
    fn test_header_extraction() {
        assert_eq!(
            extract_token_from_header(Some("Bearer abc123")),
            Some("abc123")
        );
        assert_eq!(extract_token_from_header(Some("abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Bearer")), None);
        assert_eq!(extract_token_from_header(Some("Bearer   ")), None);
        assert_eq!(extract_token_from_header(Some("")), None);
        assert_eq!(extract_token_from_header(None), None);
    }

    #[test]
    fn test_dev_validator_round_trips() {
        let v = JwtValidator::new_dev();
        let token = v.generate_token(asha()).unwrap();
        assert!(v.verify_token(&token).is_ok());
    }
}
