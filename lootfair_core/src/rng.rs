use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

// Provably fair roll derivation:
// HMAC-SHA256(key = server_seed, msg = client_seed + "-" + nonce) -> first 4 bytes -> u32 / 2^32
// Seeds are used as their string bytes, so any stock HMAC tool can reproduce a roll.

pub type HmacSha256 = Hmac<Sha256>;

/// Bytes of OS randomness behind a fresh server seed (64 hex chars).
pub const SERVER_SEED_BYTES: usize = 32;
/// Bytes of OS randomness behind a generated client seed (32 hex chars).
pub const CLIENT_SEED_BYTES: usize = 16;

pub(crate) const ROLL_DIVISOR: f64 = 4_294_967_296.0; // 2^32

fn random_hex(len: usize) -> String {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

pub fn generate_server_seed() -> String {
    random_hex(SERVER_SEED_BYTES)
}

pub fn generate_client_seed() -> String {
    random_hex(CLIENT_SEED_BYTES)
}

/// SHA-256 of the raw server seed, lowercase hex. This is the commitment shown
/// to the player while the seed is active.
pub fn commitment_hash(server_seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(server_seed.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn roll_digest(server_seed: &str, client_seed: &str, nonce: u64) -> [u8; 32] {
    // HMAC accepts keys of any length; new_from_slice cannot fail here.
    let mut mac = HmacSha256::new_from_slice(server_seed.as_bytes()).expect("HMAC key");
    mac.update(client_seed.as_bytes());
    mac.update(b"-");
    mac.update(nonce.to_string().as_bytes());
    let res = mac.finalize().into_bytes();
    let mut out = [0u8; 32];
    out.copy_from_slice(&res);
    out
}

/// Leading 32 bits of the roll digest, big-endian.
pub fn roll_integer(server_seed: &str, client_seed: &str, nonce: u64) -> u32 {
    let digest = roll_digest(server_seed, client_seed, nonce);
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Deterministic roll in [0, 1). Exact: a u32 divided by 2^32 is representable in f64.
pub fn derive_roll(server_seed: &str, client_seed: &str, nonce: u64) -> f64 {
    roll_integer(server_seed, client_seed, nonce) as f64 / ROLL_DIVISOR
}

/// One roll's inputs, bundled for callers that pass transcripts around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvablyFairRng {
    pub server_seed: String, // secret while active
    pub client_seed: String,
    pub nonce: u64,
}

impl ProvablyFairRng {
    pub fn new(server_seed: impl Into<String>, client_seed: impl Into<String>, nonce: u64) -> Self {
        Self {
            server_seed: server_seed.into(),
            client_seed: client_seed.into(),
            nonce,
        }
    }

    pub fn server_seed_hash_hex(&self) -> String {
        commitment_hash(&self.server_seed)
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(roll_digest(&self.server_seed, &self.client_seed, self.nonce))
    }

    pub fn roll(&self) -> f64 {
        derive_roll(&self.server_seed, &self.client_seed, self.nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinism() {
        let rng1 = ProvablyFairRng::new("server", "client", 1);
        let rng2 = ProvablyFairRng::new("server", "client", 1);
        assert_eq!(rng1.server_seed_hash_hex(), rng2.server_seed_hash_hex());
        assert_eq!(rng1.digest_hex(), rng2.digest_hex());
        assert_eq!(rng1.roll(), rng2.roll());
    }

    #[test]
    fn known_vector() {
        let server = "a".repeat(64);
        let client = "b".repeat(32);
        let rng = ProvablyFairRng::new(server.as_str(), client.as_str(), 1);
        assert_eq!(
            rng.digest_hex(),
            "12ab9c7622126903d2372bd029ae3c3ca1872661ead435a6b47a5e6bc5589ed4"
        );
        assert_eq!(roll_integer(&server, &client, 1), 313_236_598);
        assert_eq!(rng.roll(), 0.07293107872828841);
        assert_eq!(derive_roll(&server, &client, 2), 0.7499371191952378);
    }

    #[test]
    fn commitment_hash_pinned() {
        assert_eq!(
            commitment_hash(&"a".repeat(64)),
            "ffe054fe7ae0cb6dc65c3af9b61d5209f439851db43d0ba5997337df154668eb"
        );
    }

    #[test]
    fn generated_seeds_have_expected_shape() {
        let server = generate_server_seed();
        let client = generate_client_seed();
        assert_eq!(server.len(), SERVER_SEED_BYTES * 2);
        assert_eq!(client.len(), CLIENT_SEED_BYTES * 2);
        assert!(server.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(server, generate_server_seed());
    }

    #[test]
    fn nonce_changes_roll() {
        let a = derive_roll("s", "c", 1);
        let b = derive_roll("s", "c", 2);
        assert_ne!(a, b);
    }
}
