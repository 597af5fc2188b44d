// dev-backend/src/api/auth.rs
use actix::Addr;
use actix_web::{get, post, web, http::header, HttpRequest, HttpResponse, Responder};
use common::{
    addresses_match, digest_signature, generate_jwt_token, is_well_formed_address, validate_jwt_token,
    ErrorBody, NonceResponse, TokenResponse, VerifyRequest, VerifyTokenResponse,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use crate::api::AuthSettings;
use crate::nonce_registry::{ConsumeNonce, IssueNonce, NonceCheck, NonceRegistryActor};

#[derive(Debug, Deserialize)]
pub struct WalletQuery {
    pub wallet: Option<String>,
}

fn internal_error() -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorBody::new("Internal server error"))
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[get("/system/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "dev-backend",
        "timestamp": chrono::Utc::now()
    }))
}

// Issue a nonce for the wallet to sign
#[get("/nonce")]
pub async fn nonce(
    query: web::Query<WalletQuery>,
    registry: web::Data<Addr<NonceRegistryActor>>,
) -> impl Responder {
    let wallet = match query.into_inner().wallet {
        Some(wallet) if is_well_formed_address(&wallet) => wallet,
        _ => {
            return HttpResponse::BadRequest().json(ErrorBody::new("Invalid wallet address"));
        }
    };

    match registry.send(IssueNonce { wallet }).await {
        Ok(nonce) => HttpResponse::Ok().json(NonceResponse { nonce }),
        Err(e) => {
            tracing::error!("Error issuing nonce: {}", e);
            internal_error()
        }
    }
}

// Check the signed message and hand out a token
#[post("/verify")]
pub async fn verify(
    body: web::Json<VerifyRequest>,
    registry: web::Data<Addr<NonceRegistryActor>>,
    settings: web::Data<AuthSettings>,
) -> impl Responder {
    let request = body.into_inner();

    if request.chain_id != settings.chain_id {
        tracing::warn!("Verify for {} on unsupported chain {}", request.wallet, request.chain_id);
        return HttpResponse::BadRequest().json(ErrorBody::new("Unsupported chain"));
    }

    if !request.message.contains(&request.wallet) || !request.message.contains(&request.nonce) {
        return HttpResponse::BadRequest().json(ErrorBody::new("Signed message does not match wallet and nonce"));
    }

    let check = match registry
        .send(ConsumeNonce { wallet: request.wallet.clone(), nonce: request.nonce.clone() })
        .await
    {
        Ok(check) => check,
        Err(e) => {
            tracing::error!("Error consuming nonce: {}", e);
            return internal_error();
        }
    };

    let rejection = match check {
        NonceCheck::Valid => None,
        NonceCheck::Unknown => Some("Nonce already used or never issued"),
        NonceCheck::Mismatch => Some("Invalid nonce"),
        NonceCheck::Expired => Some("Nonce expired"),
    };
    if let Some(message) = rejection {
        tracing::info!("Rejected verify for {}: {}", request.wallet, message);
        return HttpResponse::Unauthorized().json(ErrorBody::new(message));
    }

    if digest_signature(&request.wallet, &request.message) != request.signature.to_ascii_lowercase() {
        tracing::info!("Invalid signature from {}", request.wallet);
        return HttpResponse::Unauthorized().json(ErrorBody::new("Invalid signature"));
    }

    let session_id = Uuid::new_v4();
    match generate_jwt_token(&session_id, &request.wallet, &settings.jwt_secret, settings.token_ttl_secs) {
        Ok(token) => {
            tracing::info!("Authenticated {} (session {})", request.wallet, session_id);
            HttpResponse::Ok().json(TokenResponse { token })
        }
        Err(e) => {
            tracing::error!("Error issuing token: {}", e);
            internal_error()
        }
    }
}

// Check a previously issued token, optionally against a wallet
#[get("/verify-token")]
pub async fn verify_token(
    req: HttpRequest,
    query: web::Query<WalletQuery>,
    settings: web::Data<AuthSettings>,
) -> impl Responder {
    let Some(token) = bearer_token(&req) else {
        return HttpResponse::Unauthorized().json(ErrorBody::new("Missing bearer token"));
    };

    match validate_jwt_token(token, &settings.jwt_secret) {
        Ok((_, wallet)) => {
            let valid = query
                .wallet
                .as_deref()
                .map_or(true, |expected| addresses_match(expected, &wallet));
            if !valid {
                tracing::info!("Token for {} presented for another wallet", wallet);
            }
            HttpResponse::Ok().json(VerifyTokenResponse { valid })
        }
        Err(e) => {
            tracing::debug!("Token rejected: {}", e);
            HttpResponse::Unauthorized().json(ErrorBody::new("Invalid or expired token"))
        }
    }
}
