// dev-backend/src/utils/token.rs
use rand::{thread_rng, Rng};
use rand::distributions::Alphanumeric;
use sha2::{Sha256, Digest};
use std::time::{SystemTime, UNIX_EPOCH};

/// Random alphanumeric string of `length` characters
pub fn generate_secure_token(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Nonce with timestamp and random component
pub fn generate_nonce() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let random_part = generate_secure_token(16);
    format!("{}-{}", timestamp, random_part)
}

/// Hash a string using SHA-256
pub fn hash_string(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Short, non-reversible tag for logging a nonce
pub fn fingerprint(nonce: &str) -> String {
    hash_string(nonce)[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secure_token() {
        let token = generate_secure_token(32);
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generate_nonce() {
        let nonce = generate_nonce();
        let parts: Vec<&str> = nonce.split('-').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].parse::<u64>().is_ok());
        assert_eq!(parts[1].len(), 16);

        assert_ne!(nonce, generate_nonce());
    }

    #[test]
    fn test_hash_string() {
        let hash = hash_string("test string");
        assert_eq!(hash.len(), 64); // SHA-256 produces 64 hex characters
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint("abc123"), fingerprint("abc123"));
        assert_eq!(fingerprint("abc123").len(), 12);
    }
}
