//! Hashing and secret-generation helpers used by device auth (`spec.md` §3
//! "Supplemented persistence entities"). Grounded on `api/device_pairing.rs`'s
//! pairing-code/device-token generators; hashing uses HMAC-SHA256 rather than
//! `oauth/encryption.rs`'s reversible AES-256-GCM `TokenEncryptor` because
//! every stored secret here (device token, fingerprint, client IP) is only
//! ever compared for equality, never displayed back — a one-way hash is the
//! correct primitive, not reversible encryption.

use base64::Engine;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

/// HMAC-SHA256 of `value` under a fixed application key, hex-encoded.
pub fn hmac_hex(key: &[u8], value: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(value.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// 6-character alphanumeric invite code, ambiguous characters excluded.
pub fn generate_pairing_code() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// 256-bit device secret, base64-encoded. Returned to the device exactly
/// once at registration time; only its hash is ever stored.
pub fn generate_device_secret() -> String {
    use rand::RngCore;
    let mut secret = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    base64::engine::general_purpose::STANDARD.encode(secret)
}

/// 32-byte invite token, base64-encoded.
pub fn generate_invite_token() -> String {
    generate_device_secret()
}
