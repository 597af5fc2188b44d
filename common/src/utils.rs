// Common Crate - utils.rs
// common/src/utils.rs
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use jsonwebtoken::{encode, decode, Header, Algorithm, Validation, EncodingKey, DecodingKey};
use serde::{Serialize, Deserialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use std::time::{SystemTime, UNIX_EPOCH};

/// Setup tracing for consistent logging across binaries.
///
/// The level comes from `LOG_LEVEL` (default `info`). Calling it again is a no-op.
pub fn setup_tracing() {
    let level = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|v| v.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

// JWT Claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,       // session id
    pub wallet: String,    // wallet_address
    pub exp: usize,        // expiration time
    pub iat: usize,        // issued at time
}

fn unix_now() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as usize
}

/// Issue an HS256 token binding `session_id` to `wallet_address`
pub fn generate_jwt_token(
    session_id: &Uuid,
    wallet_address: &str,
    secret: &[u8],
    ttl_secs: usize,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = unix_now();

    let claims = JwtClaims {
        sub: session_id.to_string(),
        wallet: wallet_address.to_string(),
        iat: now,
        exp: now + ttl_secs,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret)
    )
}

/// Validate a token (signature and expiry) and extract its session id and wallet
pub fn validate_jwt_token(token: &str, secret: &[u8]) -> Result<(Uuid, String), jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);

    let token_data = decode::<JwtClaims>(
        token,
        &DecodingKey::from_secret(secret),
        &validation
    )?;

    let uuid = Uuid::parse_str(&token_data.claims.sub)
        .map_err(|_| jsonwebtoken::errors::ErrorKind::InvalidSubject)?;

    Ok((uuid, token_data.claims.wallet))
}

/// Signature scheme shared by the development wallet and the dev backend.
///
/// `0x` + hex(SHA-256(lowercase(address) ‖ "\n" ‖ message)). Production wallets
/// sign with secp256k1 and only the real backend can check those.
pub fn digest_signature(address: &str, message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(address.to_ascii_lowercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(message.as_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}
