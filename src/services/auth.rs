//! Registration, login and bearer tokens.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::config::{AdminSeed, AuthSettings};
use crate::domain::aggregates::{Address, Customer, Role};
use crate::error::{Result, StoreError};
use crate::store::Storage;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(min = 7, max = 20))]
    pub phone: Option<String>,
    #[validate]
    pub default_address: Option<Address>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub customer: Customer,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Storage>,
    settings: AuthSettings,
}

impl AuthService {
    pub fn new(store: Arc<dyn Storage>, settings: AuthSettings) -> Self { Self { store, settings } }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterRequest) -> Result<AuthResponse> {
        input.validate()?;
        if self.store.customer_by_email(&input.email).await?.is_some() {
            return Err(StoreError::Conflict("Email is already registered".into()));
        }
        let hash = hash_password(&input.password)?;
        let customer = Customer::register(&input.name, &input.email, hash, Role::Customer);
        self.store.insert_customer(&customer).await?;
        tracing::info!(customer_id = %customer.id, "customer registered");
        Ok(AuthResponse { token: self.issue_token(&customer)?, customer })
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn login(&self, input: LoginRequest) -> Result<AuthResponse> {
        let invalid = || StoreError::Unauthorized("Invalid email or password".into());
        let customer = self.store.customer_by_email(&input.email).await?.ok_or_else(invalid)?;
        if !verify_password(&input.password, &customer.password_hash)? {
            return Err(invalid());
        }
        if customer.blocked {
            return Err(StoreError::Forbidden("Account is blocked".into()));
        }
        Ok(AuthResponse { token: self.issue_token(&customer)?, customer })
    }

    pub fn issue_token(&self, customer: &Customer) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: customer.id,
            email: customer.email.clone(),
            role: customer.role,
            exp: (now + self.settings.token_ttl).timestamp(),
            iat: now.timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.settings.jwt_secret.as_bytes()),
        )
        .map_err(|e| StoreError::Internal(format!("token encoding: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.settings.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|_| StoreError::Unauthorized("Invalid or expired token".into()))
    }

    /// Creates the configured admin account unless the email is already taken.
    pub async fn seed_admin(&self, seed: &AdminSeed) -> Result<bool> {
        if self.store.customer_by_email(&seed.email).await?.is_some() {
            return Ok(false);
        }
        let hash = hash_password(&seed.password)?;
        let admin = Customer::register("Admin", &seed.email, hash, Role::Admin);
        self.store.insert_customer(&admin).await?;
        tracing::info!(email = %admin.email, "admin account seeded");
        Ok(true)
    }

    pub async fn profile(&self, customer_id: Uuid) -> Result<Customer> {
        self.store.customer(customer_id).await?.ok_or_else(|| StoreError::not_found("Customer"))
    }

    #[instrument(skip(self, input))]
    pub async fn update_profile(&self, customer_id: Uuid, input: UpdateProfileRequest) -> Result<Customer> {
        input.validate()?;
        let mut customer = self.profile(customer_id).await?;
        customer.update_profile(input.name, input.phone, input.default_address);
        self.store.update_customer(&customer).await?;
        Ok(customer)
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::Internal(format!("password hashing: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| StoreError::Internal(format!("stored password hash: {}", e)))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> AuthService {
        AuthService::new(
            Arc::new(MemoryStore::new()),
            AuthSettings { jwt_secret: "0123456789abcdef-test".into(), token_ttl: chrono::Duration::hours(1) },
        )
    }

    fn register(email: &str) -> RegisterRequest {
        RegisterRequest { name: "Asha Rao".into(), email: email.into(), password: "correct-horse".into() }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let auth = service();
        let registered = auth.register(register("Asha@Example.com")).await.unwrap();
        assert_eq!(registered.customer.email, "asha@example.com");
        let claims = auth.verify(&registered.token).unwrap();
        assert_eq!(claims.sub, registered.customer.id);
        assert_eq!(claims.role, Role::Customer);

        let login = auth.login(LoginRequest { email: "asha@example.com".into(), password: "correct-horse".into() }).await;
        assert!(login.is_ok());
        let bad = auth.login(LoginRequest { email: "asha@example.com".into(), password: "wrong-pass".into() }).await;
        assert!(matches!(bad, Err(StoreError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let auth = service();
        auth.register(register("a@example.com")).await.unwrap();
        assert!(matches!(auth.register(register("A@example.com")).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_short_password_rejected() {
        let mut req = register("b@example.com");
        req.password = "short".into();
        assert!(matches!(service().register(req).await, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_seed_admin_once() {
        let auth = service();
        let seed = AdminSeed { email: "admin@example.com".into(), password: "admin-password".into() };
        assert!(auth.seed_admin(&seed).await.unwrap());
        assert!(!auth.seed_admin(&seed).await.unwrap());
    }

    #[test]
    fn test_tampered_token_rejected() {
        assert!(matches!(service().verify("not.a.token"), Err(StoreError::Unauthorized(_))));
    }
}
