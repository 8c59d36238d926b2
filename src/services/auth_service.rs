use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::UserRepository;
use crate::error::AppError;
use crate::services::auth::password::{hash_password, verify_password};
use crate::services::auth::JwtService;

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 50;
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let username = self.username.trim();
        if username.len() < MIN_USERNAME_LEN || username.len() > MAX_USERNAME_LEN {
            return Err(AppError::Validation(format!(
                "username must be between {} and {} characters",
                MIN_USERNAME_LEN, MAX_USERNAME_LEN
            )));
        }
        if !looks_like_email(&self.email) {
            return Err(AppError::Validation("email is not valid".to_string()));
        }
        if self.password.len() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(())
    }
}

fn looks_like_email(raw: &str) -> bool {
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user: UserSummary,
}

#[derive(Clone)]
pub struct AuthService {
    users: std::sync::Arc<UserRepository>,
    jwt: JwtService,
}

impl AuthService {
    pub fn new(users: UserRepository, jwt: JwtService) -> Self {
        Self {
            users: std::sync::Arc::new(users),
            jwt,
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<UserSummary, AppError> {
        request.validate()?;
        let password_hash = hash_password(&request.password)?;
        let user = self
            .users
            .create(request.username.trim(), request.email.trim(), &password_hash)
            .await?;

        info!("Registered user {}", user.id);
        Ok(UserSummary {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
        })
    }

    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, AppError> {
        debug!("Login attempt for '{}'", request.username);

        // A missing user and a bad password produce the same response.
        let user = self
            .users
            .get_by_username(&request.username)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

        if !verify_password(&request.password, &user.password_hash)? {
            return Err(AppError::Unauthorized("Invalid credentials".to_string()));
        }

        let access_token = self
            .jwt
            .generate_token(user.id, &user.username, &user.email)?;

        Ok(LoginResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.expires_in_secs(),
            user: UserSummary {
                id: user.id,
                username: user.username,
                email: user.email,
                created_at: user.created_at,
            },
        })
    }

    pub async fn current_user(&self, user_id: &Uuid) -> Result<UserSummary, AppError> {
        let user = self.users.get_by_id(user_id).await?;
        Ok(UserSummary {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
        })
    }
}
