//! HS256 access/refresh tokens.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use jwt::{Claims, Header, RegisteredClaims, SignWithKey, Token, VerifyWithKey};
use serde_json::Value;
use sha2::Sha256;
use uuid::Uuid;

use crate::config::Settings;
use crate::types::ApiError;

const TOKEN_TYPE_CLAIM: &str = "token_type";
const USER_ID_CLAIM: &str = "user_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }

    fn lifetime(&self, settings: &Settings) -> Duration {
        match self {
            TokenType::Access => settings.access_token_lifetime,
            TokenType::Refresh => settings.refresh_token_lifetime,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenPayload {
    pub token_type: TokenType,
    pub user_id: i32,
    pub issued_at: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
}

fn key(settings: &Settings) -> Result<Hmac<Sha256>, ApiError> {
    Hmac::<Sha256>::new_from_slice(settings.secret_key.as_bytes()).map_err(|_| ApiError::Internal)
}

impl TokenPayload {
    pub fn new(token_type: TokenType, user_id: i32, settings: &Settings) -> TokenPayload {
        let issued_at = Utc::now();
        TokenPayload {
            token_type,
            user_id,
            issued_at,
            expiration: issued_at + token_type.lifetime(settings),
        }
    }

    fn to_claims(&self) -> Claims {
        let mut claims = Claims::new(RegisteredClaims {
            subject: Some(self.user_id.to_string()),
            issued_at: Some(self.issued_at.timestamp() as u64),
            expiration: Some(self.expiration.timestamp() as u64),
            json_web_token_id: Some(Uuid::new_v4().simple().to_string()),
            ..Default::default()
        });
        claims
            .private
            .insert(TOKEN_TYPE_CLAIM.into(), Value::from(self.token_type.as_str()));
        claims
            .private
            .insert(USER_ID_CLAIM.into(), Value::from(self.user_id));
        claims
    }

    fn from_claims(claims: &Claims) -> Option<TokenPayload> {
        let token_type = match claims.private.get(TOKEN_TYPE_CLAIM)?.as_str()? {
            "access" => TokenType::Access,
            "refresh" => TokenType::Refresh,
            _ => return None,
        };
        let user_id = claims
            .private
            .get(USER_ID_CLAIM)?
            .as_i64()
            .and_then(|id| i32::try_from(id).ok())?;
        Some(TokenPayload {
            token_type,
            user_id,
            issued_at: Utc
                .timestamp_opt(claims.registered.issued_at? as i64, 0)
                .single()?,
            expiration: Utc
                .timestamp_opt(claims.registered.expiration? as i64, 0)
                .single()?,
        })
    }

    pub fn sign(&self, settings: &Settings) -> Result<String, ApiError> {
        self.to_claims()
            .sign_with_key(&key(settings)?)
            .map_err(|e| {
                tracing::error!("failed to sign token: {}", e);
                ApiError::Internal
            })
    }

    /// Parses and checks signature, expiry and type. `None` for any failure.
    pub fn verify(token: &str, expected: TokenType, settings: &Settings) -> Option<TokenPayload> {
        let key = key(settings).ok()?;
        let token: Token<Header, Claims, _> = token.verify_with_key(&key).ok()?;
        let payload = TokenPayload::from_claims(token.claims())?;

        if payload.token_type != expected || payload.expiration <= Utc::now() {
            return None;
        }
        Some(payload)
    }
}

/// A fresh refresh/access pair for `user_id`.
pub fn issue_pair(user_id: i32, settings: &Settings) -> Result<(String, String), ApiError> {
    let refresh = TokenPayload::new(TokenType::Refresh, user_id, settings).sign(settings)?;
    let access = TokenPayload::new(TokenType::Access, user_id, settings).sign(settings)?;
    Ok((refresh, access))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::new(":memory:", "unit-test-secret")
    }

    #[test]
    fn access_token_round_trip() {
        let settings = settings();
        let token = TokenPayload::new(TokenType::Access, 7, &settings)
            .sign(&settings)
            .unwrap();
        let payload = TokenPayload::verify(&token, TokenType::Access, &settings).unwrap();
        assert_eq!(payload.user_id, 7);
        assert_eq!(payload.token_type, TokenType::Access);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let settings = settings();
        let (refresh, access) = issue_pair(3, &settings).unwrap();
        assert!(TokenPayload::verify(&refresh, TokenType::Access, &settings).is_none());
        assert!(TokenPayload::verify(&refresh, TokenType::Refresh, &settings).is_some());
        assert!(TokenPayload::verify(&access, TokenType::Refresh, &settings).is_none());
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let settings = settings();
        let other = Settings::new(":memory:", "someone-else");
        let token = TokenPayload::new(TokenType::Access, 1, &other)
            .sign(&other)
            .unwrap();
        assert!(TokenPayload::verify(&token, TokenType::Access, &settings).is_none());
        assert!(TokenPayload::verify("not.a.token", TokenType::Access, &settings).is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let settings = settings();
        let mut payload = TokenPayload::new(TokenType::Access, 1, &settings);
        payload.issued_at = Utc::now() - Duration::hours(2);
        payload.expiration = Utc::now() - Duration::hours(1);
        let token = payload.sign(&settings).unwrap();
        assert!(TokenPayload::verify(&token, TokenType::Access, &settings).is_none());
    }
}
