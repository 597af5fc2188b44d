// dev-backend/src/api/mod.rs
pub mod auth;

use common::Config;

/// Settings the auth handlers need
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: Vec<u8>,
    pub token_ttl_secs: usize,
    pub chain_id: u64,
}

impl From<&Config> for AuthSettings {
    fn from(config: &Config) -> Self {
        Self {
            jwt_secret: config.dev_backend.jwt_secret.as_bytes().to_vec(),
            token_ttl_secs: config.dev_backend.token_ttl_secs,
            chain_id: config.network.chain_id,
        }
    }
}

pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(auth::health).service(
        actix_web::web::scope("/api/auth")
            .service(auth::nonce)
            .service(auth::verify)
            .service(auth::verify_token)
    );
}
