//! User accounts and bearer tokens.
//!
//! Passwords are stored as `salt$hex(hmac-sha256(salt, password))` with a
//! random per-user salt. Tokens are HMAC-signed claims with a one-hour
//! expiry: `base64url(claims_json).hex(hmac-sha256(secret, payload))`. The
//! signing secret comes from the `ORACULO_SECRET` environment variable and
//! the server refuses to start without it.

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sqlx::SqlitePool;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const SECRET_ENV: &str = "ORACULO_SECRET";

const TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,
    pub username: String,
    pub exp: i64,
}

pub fn load_secret() -> Result<String> {
    std::env::var(SECRET_ENV)
        .map_err(|_| anyhow!("{SECRET_ENV} is not set; refusing to sign tokens"))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    let digest = hex::encode(hmac_sha256(salt.as_bytes(), password.as_bytes()));
    format!("{salt}${digest}")
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, digest_hex)) = stored.split_once('$') else {
        return false;
    };
    let Ok(expected) = hex::decode(digest_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(password.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

pub fn sign_token(secret: &str, id: i64, username: &str) -> Result<String> {
    let claims = Claims {
        id,
        username: username.to_string(),
        exp: chrono::Utc::now().timestamp() + TOKEN_TTL_SECS,
    };
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
    let signature = hex::encode(hmac_sha256(secret.as_bytes(), payload.as_bytes()));
    Ok(format!("{payload}.{signature}"))
}

/// Check the signature and expiry, returning the claims on success.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims> {
    let (payload, signature_hex) = token
        .split_once('.')
        .ok_or_else(|| anyhow!("malformed token"))?;
    let signature = hex::decode(signature_hex).context("malformed token signature")?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| anyhow!("invalid token signature"))?;

    let claims: Claims = serde_json::from_slice(
        &URL_SAFE_NO_PAD
            .decode(payload)
            .context("malformed token payload")?,
    )?;
    if claims.exp < chrono::Utc::now().timestamp() {
        bail!("token expired");
    }
    Ok(claims)
}

pub async fn create_user(pool: &SqlitePool, username: &str, password: &str) -> Result<()> {
    let hashed = hash_password(password);
    let result = sqlx::query("INSERT INTO users (username, password) VALUES (?, ?)")
        .bind(username)
        .bind(&hashed)
        .execute(pool)
        .await;
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.to_string().contains("UNIQUE constraint failed") => {
            bail!("username already exists")
        }
        Err(e) => Err(e.into()),
    }
}

/// Check credentials and mint a token. Unknown user and wrong password
/// produce the same error so login failures leak nothing.
pub async fn verify_login(
    pool: &SqlitePool,
    secret: &str,
    username: &str,
    password: &str,
) -> Result<String> {
    let row: Option<(i64, String)> =
        sqlx::query_as("SELECT id, password FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;
    let (id, stored) = match row {
        Some(row) => row,
        None => bail!("invalid credentials"),
    };
    if !verify_password(password, &stored) {
        bail!("invalid credentials");
    }
    sign_token(secret, id, username)
}
