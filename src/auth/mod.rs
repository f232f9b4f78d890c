
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite};
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};

use crate::WebRagError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User already registered")]
    AlreadyRegistered,
    #[error("No OTP record")]
    NoOtpRecord,
    #[error("Invalid OTP")]
    InvalidOtp,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Email service unavailable.")]
    EmailUnavailable,
    #[error("Error sending OTP")]
    OtpSendFailed,
    #[error("Authentication service unavailable.")]
    TokenUnavailable,
    #[error("Server error")]
    Internal(#[source] anyhow::Error),
}

/// Public view of a user row.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub username: String,
    pub email: String,
}

/// A successful verification or login.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, FromRow)]
struct UserRow {
    email: String,
    username: String,
    password_hash: Option<String>,
    otp: Option<i64>,
}

/// SQLite-backed user store.
///
/// A row with a non-null `otp` is a pending registration; verification
/// clears the OTP and sets the password hash, which is what makes a user
/// able to log in.
#[derive(Debug, Clone)]
pub struct UserStore {
    pool: Pool<Sqlite>,
}

impl UserStore {
    pub async fn open(path: &Path) -> crate::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                WebRagError::Config(format!("Failed to create user database directory: {e}"))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| WebRagError::Config(format!("Failed to open user database: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                email TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                password_hash TEXT,
                otp INTEGER,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| WebRagError::Config(format!("Failed to initialize user table: {e}")))?;

        info!("User store initialized at {:?}", path);
        Ok(Self { pool })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRow>, sqlx::Error> {
        sqlx::query_as::<_, UserRow>(
            "SELECT email, username, password_hash, otp FROM users WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }

    /// Insert or refresh a pending registration. Re-registering a pending
    /// user replaces their username and OTP.
    async fn upsert_pending(
        &self,
        email: &str,
        username: &str,
        otp: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (email, username, otp) VALUES (?1, ?2, ?3)
             ON CONFLICT(email) DO UPDATE SET username = excluded.username, otp = excluded.otp",
        )
        .bind(email)
        .bind(username)
        .bind(otp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Promote a pending registration to a full account.
    async fn set_password(&self, email: &str, password_hash: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET password_hash = ?2, otp = NULL WHERE email = ?1")
            .bind(email)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Find a verified user by username or email.
    async fn find_verified(
        &self,
        identifier: &str,
        email_candidate: &str,
    ) -> Result<Option<UserRow>, sqlx::Error> {
        sqlx::query_as::<_, UserRow>(
            "SELECT email, username, password_hash, otp FROM users
             WHERE (username = ?1 OR email = ?1 OR email = ?2) AND otp IS NULL",
        )
        .bind(identifier)
        .bind(email_candidate)
        .fetch_optional(&self.pool)
        .await
    }
}

/// Sends OTP emails through the Brevo transactional email API.
#[derive(Debug, Clone)]
pub struct OtpMailer {
    http: reqwest::Client,
    api_key: String,
    sender_email: String,
    endpoint: String,
}

impl OtpMailer {
    pub fn new(api_key: String, sender_email: String, endpoint: String) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| WebRagError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key,
            sender_email,
            endpoint,
        })
    }

    async fn send_otp(&self, recipient: &str, otp: i64) -> Result<(), AuthError> {
        let payload = json!({
            "sender": { "email": self.sender_email },
            "to": [{ "email": recipient }],
            "subject": "Your Verification OTP",
            "htmlContent": format!("<p>Your OTP is <strong>{otp}</strong></p>"),
            "textContent": format!("Your OTP is {otp}"),
        });

        let response = self
            .http
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .header("accept", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send OTP to {recipient}: {e}");
                AuthError::OtpSendFailed
            })?;

        if let Err(e) = response.error_for_status() {
            error!("Email API error while sending OTP to {recipient}: {e}");
            return Err(AuthError::OtpSendFailed);
        }

        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub email: String,
    pub exp: i64,
}

/// Issues HS256 access tokens.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    secret: String,
    expiry_minutes: i64,
}

impl TokenIssuer {
    pub fn new(secret: String, expiry_minutes: i64) -> Self {
        Self {
            secret,
            expiry_minutes,
        }
    }

    fn issue(&self, email: &str) -> Result<String, AuthError> {
        let exp = (Utc::now() + Duration::minutes(self.expiry_minutes)).timestamp();
        let claims = Claims {
            email: email.to_string(),
            exp,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AuthError::Internal(anyhow::anyhow!("Failed to issue token: {e}")))
    }
}

/// Collaborator authentication: register with an email, verify with the OTP
/// mailed to it, then log in with username or email plus password.
///
/// Mailer and token issuer are optional; without them the corresponding
/// endpoints report the service as unavailable instead of failing at startup.
pub struct AuthService {
    store: UserStore,
    mailer: Option<OtpMailer>,
    tokens: Option<TokenIssuer>,
}

impl AuthService {
    pub fn new(store: UserStore, mailer: Option<OtpMailer>, tokens: Option<TokenIssuer>) -> Self {
        Self {
            store,
            mailer,
            tokens,
        }
    }

    /// Start a registration: store a pending user and email them an OTP.
    pub async fn register(&self, username: &str, email: &str) -> Result<(), AuthError> {
        let Some(mailer) = &self.mailer else {
            error!("OTP mailer not configured; cannot send OTP emails");
            return Err(AuthError::EmailUnavailable);
        };

        let email = normalize_email(email);
        let username = username.trim();

        let existing = self
            .store
            .find_by_email(&email)
            .await
            .map_err(internal_db)?;
        if matches!(existing, Some(user) if user.otp.is_none()) {
            return Err(AuthError::AlreadyRegistered);
        }

        let otp = generate_otp();
        self.store
            .upsert_pending(&email, username, otp)
            .await
            .map_err(internal_db)?;

        mailer.send_otp(&email, otp).await?;
        info!("OTP sent to {email}");
        Ok(())
    }

    /// Complete a registration: check the OTP, set the password, and issue
    /// an access token.
    pub async fn verify_otp(
        &self,
        email: &str,
        otp: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let email = normalize_email(email);

        let user = self
            .store
            .find_by_email(&email)
            .await
            .map_err(internal_db)?;
        let Some(user) = user else {
            return Err(AuthError::NoOtpRecord);
        };
        let Some(expected_otp) = user.otp else {
            return Err(AuthError::NoOtpRecord);
        };

        let submitted: i64 = otp.trim().parse().map_err(|_| AuthError::InvalidOtp)?;
        if submitted != expected_otp {
            return Err(AuthError::InvalidOtp);
        }

        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
            .await
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Hashing task panicked: {e}")))?
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Failed to hash password: {e}")))?;

        self.store
            .set_password(&email, &hash)
            .await
            .map_err(internal_db)?;

        let token = self.issue_token(&email)?;
        Ok(AuthSession {
            token,
            user: UserProfile {
                username: user.username,
                email: user.email,
            },
        })
    }

    /// Log in with a username or email plus password.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<AuthSession, AuthError> {
        let identifier = identifier.trim();
        let email_candidate = normalize_email(identifier);

        let user = self
            .store
            .find_verified(identifier, &email_candidate)
            .await
            .map_err(internal_db)?;
        let Some(user) = user else {
            return Err(AuthError::InvalidCredentials);
        };
        let Some(stored_hash) = user.password_hash.clone() else {
            return Err(AuthError::InvalidCredentials);
        };

        let password = password.to_string();
        let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &stored_hash))
            .await
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Verify task panicked: {e}")))?
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Failed to verify password: {e}")))?;

        if !valid {
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.issue_token(&user.email)?;
        Ok(AuthSession {
            token,
            user: UserProfile {
                username: user.username,
                email: user.email,
            },
        })
    }

    fn issue_token(&self, email: &str) -> Result<String, AuthError> {
        let Some(tokens) = &self.tokens else {
            error!("JWT secret missing; cannot issue tokens");
            return Err(AuthError::TokenUnavailable);
        };
        tokens.issue(email)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Six-digit OTP.
fn generate_otp() -> i64 {
    rand::thread_rng().gen_range(100_000..1_000_000)
}

fn internal_db(e: sqlx::Error) -> AuthError {
    AuthError::Internal(anyhow::anyhow!("Database error: {e}"))
}
