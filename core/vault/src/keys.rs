//! Token generation and record key derivation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt::Write as _;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use sidegate_common::{Cid, SecretToken};

/// Random bytes per access token.
pub const TOKEN_BYTES: usize = 32;

/// Namespace of vault records in the backing store.
pub const RECORD_PREFIX: &str = "vault/";

/// Hex digits in a record key.
const RECORD_KEY_LEN: usize = 64;

/// Generate a fresh access token from the OS RNG.
pub fn generate_token() -> SecretToken {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let token = SecretToken::new(URL_SAFE_NO_PAD.encode(bytes));
    bytes.zeroize();
    token
}

/// Derive the storage key of a record.
///
/// blake2b-256 over the CID and the serialized record, lowercase hex. The
/// serialized record includes its token, so every save yields a new key.
pub fn derive_key(cid: &Cid, serialized_record: &[u8]) -> String {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(cid.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(serialized_record);

    let digest = hasher.finalize();
    let mut key = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(key, "{:02x}", byte);
    }
    key
}

/// Store key of the record published under `key`.
///
/// `None` if `key` could not have come from [`derive_key`]; such keys name
/// no record.
pub fn storage_key(key: &str) -> Option<String> {
    let well_formed = key.len() == RECORD_KEY_LEN
        && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    well_formed.then(|| format!("{}{}", RECORD_PREFIX, key))
}

/// Compare a presented token with the stored one in constant time.
pub fn tokens_match(expected: &SecretToken, presented: &str) -> bool {
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}
