// dev-backend/src/nonce_registry.rs
use actix::{Actor, Context, Handler, Message, AsyncContext, MessageResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use crate::utils::token::{fingerprint, generate_nonce};

// Default nonce TTL in seconds (5 minutes)
const DEFAULT_NONCE_TTL: i64 = 300;
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Actor message: Issue a fresh nonce for a wallet, replacing any outstanding one
#[derive(Message)]
#[rtype(result = "String")]
pub struct IssueNonce {
    pub wallet: String,
}

/// Actor message: Consume the wallet's nonce. A nonce is only ever accepted once.
#[derive(Message)]
#[rtype(result = "NonceCheck")]
pub struct ConsumeNonce {
    pub wallet: String,
    pub nonce: String,
}

/// Actor message: Drop expired nonces
#[derive(Message)]
#[rtype(result = "usize")]
pub struct CleanupExpiredNonces;

/// Actor message: Get nonce metrics
#[derive(Message)]
#[rtype(result = "NonceMetrics")]
pub struct GetNonceMetrics;

/// Outcome of consuming a nonce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceCheck {
    Valid,
    /// Nothing outstanding for the wallet (never issued or already used)
    Unknown,
    Mismatch,
    Expired,
}

#[derive(Debug, Clone, Default)]
pub struct NonceMetrics {
    pub outstanding: usize,
    pub issued: usize,
    pub consumed: usize,
    pub rejected: usize,
    pub expired_count: usize,
}

struct IssuedNonce {
    nonce: String,
    issued_at: DateTime<Utc>,
}

impl IssuedNonce {
    fn is_expired(&self, ttl_seconds: i64) -> bool {
        Utc::now().signed_duration_since(self.issued_at).num_seconds() > ttl_seconds
    }
}

/// NonceRegistryActor for tracking one outstanding nonce per wallet
pub struct NonceRegistryActor {
    // Lowercased wallet address to its outstanding nonce
    nonces: Arc<DashMap<String, IssuedNonce>>,
    // Nonce TTL in seconds
    nonce_ttl: i64,
    metrics: NonceMetrics,
}

impl Default for NonceRegistryActor {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceRegistryActor {
    pub fn new() -> Self {
        Self {
            nonces: Arc::new(DashMap::new()),
            nonce_ttl: DEFAULT_NONCE_TTL,
            metrics: NonceMetrics::default(),
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: i64) -> Self {
        self.nonce_ttl = ttl_seconds;
        self
    }

    fn key(wallet: &str) -> String {
        wallet.to_ascii_lowercase()
    }

    /// Remove expired nonces and update metrics
    fn cleanup_nonces(&mut self) -> usize {
        let ttl = self.nonce_ttl;
        let before = self.nonces.len();
        self.nonces.retain(|_, issued| !issued.is_expired(ttl));
        let expired_count = before.saturating_sub(self.nonces.len());

        self.metrics.expired_count += expired_count;
        self.metrics.outstanding = self.nonces.len();
        expired_count
    }
}

impl Actor for NonceRegistryActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("NonceRegistryActor started with TTL: {}s", self.nonce_ttl);

        ctx.run_interval(CLEANUP_INTERVAL, |act, _ctx| {
            let expired_count = act.cleanup_nonces();
            if expired_count > 0 {
                tracing::info!("Cleaned up {} expired nonces", expired_count);
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            "NonceRegistryActor stopped. {} nonces issued, {} consumed, {} rejected",
            self.metrics.issued,
            self.metrics.consumed,
            self.metrics.rejected
        );
    }
}

impl Handler<IssueNonce> for NonceRegistryActor {
    type Result = MessageResult<IssueNonce>;

    fn handle(&mut self, msg: IssueNonce, _ctx: &mut Self::Context) -> Self::Result {
        let nonce = generate_nonce();

        self.nonces.insert(
            Self::key(&msg.wallet),
            IssuedNonce { nonce: nonce.clone(), issued_at: Utc::now() },
        );
        self.metrics.issued += 1;
        self.metrics.outstanding = self.nonces.len();

        tracing::info!("Issued nonce {} for {}", fingerprint(&nonce), msg.wallet);
        MessageResult(nonce)
    }
}

impl Handler<ConsumeNonce> for NonceRegistryActor {
    type Result = MessageResult<ConsumeNonce>;

    fn handle(&mut self, msg: ConsumeNonce, _ctx: &mut Self::Context) -> Self::Result {
        let key = Self::key(&msg.wallet);

        let check = match self.nonces.get(&key) {
            None => NonceCheck::Unknown,
            Some(issued) if issued.nonce != msg.nonce => NonceCheck::Mismatch,
            Some(issued) if issued.is_expired(self.nonce_ttl) => NonceCheck::Expired,
            Some(_) => NonceCheck::Valid,
        };

        // A wrong nonce leaves the outstanding one alone
        if matches!(check, NonceCheck::Valid | NonceCheck::Expired) {
            self.nonces.remove(&key);
        }

        if check == NonceCheck::Valid {
            self.metrics.consumed += 1;
        } else {
            self.metrics.rejected += 1;
            tracing::debug!("Rejected nonce {} for {}: {:?}", fingerprint(&msg.nonce), msg.wallet, check);
        }
        self.metrics.outstanding = self.nonces.len();

        MessageResult(check)
    }
}

impl Handler<CleanupExpiredNonces> for NonceRegistryActor {
    type Result = MessageResult<CleanupExpiredNonces>;

    fn handle(&mut self, _msg: CleanupExpiredNonces, _ctx: &mut Self::Context) -> Self::Result {
        let expired_count = self.cleanup_nonces();
        tracing::info!("Cleaned up {} expired nonces", expired_count);
        MessageResult(expired_count)
    }
}

impl Handler<GetNonceMetrics> for NonceRegistryActor {
    type Result = MessageResult<GetNonceMetrics>;

    fn handle(&mut self, _msg: GetNonceMetrics, _ctx: &mut Self::Context) -> Self::Result {
        self.metrics.outstanding = self.nonces.len();
        MessageResult(self.metrics.clone())
    }
}
