//! JWT validation at the hub boundary.
//!
//! Token issuance lives with the identity provider; the hub only checks that
//! a presented token is valid and that its claims match the session the
//! device is asking for. Generation helpers exist for tests and local
//! development.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use beacon_core::SessionKey;
use beacon_sync::{SyncError, SyncResult, TokenValidator};

use crate::error::HubError;

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user_id)
    pub sub: String,

    /// Workspace this token grants access to
    pub workspace_id: String,

    /// Device ID the token was issued to
    pub device_id: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// JWT ID (unique identifier for this token)
    pub jti: String,
}

/// JWT token manager.
pub struct JwtManager {
    secret: String,
    access_lifetime_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager.
    pub fn new(secret: String, access_lifetime_secs: i64) -> Self {
        JwtManager {
            secret,
            access_lifetime_secs,
        }
    }

    /// Generate an access token. Test/dev helper; production tokens come
    /// from the identity provider sharing the same secret.
    pub fn generate_access_token(
        &self,
        user_id: &str,
        workspace_id: &str,
        device_id: &str,
    ) -> Result<String, HubError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.access_lifetime_secs);

        let claims = Claims {
            sub: user_id.to_string(),
            workspace_id: workspace_id.to_string(),
            device_id: device_id.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| HubError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Validate and decode a token.
    pub fn validate_token(&self, token: &str) -> Result<Claims, HubError> {
        let validation = Validation::default();

        let token_data: TokenData<Claims> = decode(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| HubError::AuthFailed(format!("Invalid token: {}", e)))?;

        Ok(token_data.claims)
    }

    /// Validate a token and check that its claims cover the given workspace.
    pub fn authorize_workspace(&self, token: &str, workspace_id: &str) -> Result<Claims, HubError> {
        let claims = self.validate_token(token)?;

        if claims.workspace_id != workspace_id {
            return Err(HubError::AuthFailed(format!(
                "Token is not valid for workspace {}",
                workspace_id
            )));
        }

        Ok(claims)
    }
}

impl TokenValidator for JwtManager {
    fn validate(&self, token: &str, key: &SessionKey) -> SyncResult<()> {
        let claims = self
            .validate_token(token)
            .map_err(|e| SyncError::Auth(e.to_string()))?;

        if claims.workspace_id != key.workspace_id
            || claims.sub != key.user_id
            || claims.device_id != key.device_id
        {
            return Err(SyncError::Auth("Token claims do not match session".into()));
        }

        Ok(())
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> JwtManager {
        JwtManager::new("test-secret".to_string(), 3600)
    }

    #[test]
    fn test_jwt_roundtrip() {
        let token = manager()
            .generate_access_token("user-1", "ws-1", "dev-a")
            .unwrap();

        let claims = manager().validate_token(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.workspace_id, "ws-1");
        assert_eq!(claims.device_id, "dev-a");
    }

    #[test]
    fn test_workspace_authorization() {
        let token = manager()
            .generate_access_token("user-1", "ws-1", "dev-a")
            .unwrap();

        assert!(manager().authorize_workspace(&token, "ws-1").is_ok());
        assert!(manager().authorize_workspace(&token, "ws-2").is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = manager()
            .generate_access_token("user-1", "ws-1", "dev-a")
            .unwrap();

        let other = JwtManager::new("other-secret".to_string(), 3600);
        assert!(other.validate_token(&token).is_err());
    }

    #[test]
    fn test_session_key_validation() {
        let token = manager()
            .generate_access_token("user-1", "ws-1", "dev-a")
            .unwrap();

        let good = SessionKey {
            workspace_id: "ws-1".into(),
            user_id: "user-1".into(),
            device_id: "dev-a".into(),
        };
        assert!(TokenValidator::validate(&manager(), &token, &good).is_ok());

        let wrong_device = SessionKey {
            device_id: "dev-b".into(),
            ..good
        };
        assert!(matches!(
            TokenValidator::validate(&manager(), &token, &wrong_device),
            Err(SyncError::Auth(_))
        ));
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("Basic abc123"), None);
        assert_eq!(extract_bearer_token(""), None);
    }
}
