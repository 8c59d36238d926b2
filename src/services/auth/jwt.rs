use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, error};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AppError;
use crate::models::auth_jwt_claims::Claims;

pub const JWT_ISSUER: &str = "transaction-platform";

/// Signs and verifies bearer tokens. One instance is constructed at startup
/// and injected; test fixtures build their own with a throwaway secret.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expires_in_secs: u64,
}

impl JwtService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            expires_in_secs: config.jwt_expires_in_secs,
        }
    }

    pub fn expires_in_secs(&self) -> u64 {
        self.expires_in_secs
    }

    pub fn generate_token(
        &self,
        user_id: Uuid,
        username: &str,
        email: &str,
    ) -> Result<String, AppError> {
        let iat = Utc::now().timestamp() as usize;
        let exp = iat + self.expires_in_secs as usize;

        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            email: email.to_string(),
            iat,
            exp,
        };

        debug!("Generating JWT token for user {}", user_id);
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )
        .map_err(|e| {
            error!("Failed to generate JWT token: {}", e);
            AppError::Internal(format!("Token generation failed: {}", e))
        })
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AppError> {
        let validation = Validation::new(Algorithm::HS256);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(
            |err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::Unauthorized("Token has expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    AppError::Unauthorized("Invalid token format".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    AppError::Unauthorized("Invalid token signature".to_string())
                }
                jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(claim) => {
                    AppError::Unauthorized(format!("Token missing required claim: {}", claim))
                }
                _ => AppError::Unauthorized(format!("Token validation failed: {:?}", err.kind())),
            },
        )?;

        debug!(
            "JWT token verified successfully for user {}",
            token_data.claims.sub
        );
        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(expires_in_secs: u64) -> JwtService {
        JwtService::new(&AuthConfig {
            jwt_secret: "a-test-secret-that-is-32-bytes!!".to_string(),
            jwt_expires_in_secs: expires_in_secs,
        })
    }

    #[test]
    fn token_round_trip() {
        let svc = service(3600);
        let user_id = Uuid::new_v4();
        let token = svc.generate_token(user_id, "testuser", "t@example.com").unwrap();
        let claims = svc.verify_token(&token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.username, "testuser");
        assert_eq!(claims.email, "t@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = service(3600)
            .generate_token(Uuid::new_v4(), "u", "u@example.com")
            .unwrap();
        let other = JwtService::new(&AuthConfig {
            jwt_secret: "another-secret-also-32-bytes-long!".to_string(),
            jwt_expires_in_secs: 3600,
        });
        assert!(matches!(
            other.verify_token(&token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(service(3600).verify_token("not.a.token").is_err());
    }
}
