//! AES-256-GCM secret codec.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use tracing::debug;

use crate::error::{CryptoError, CryptoResult};

/// Raw key length in bytes.
pub const KEY_LEN: usize = 32;
/// Initialization vector length in bytes.
pub const IV_LEN: usize = 12;
/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

const SEPARATOR: char = ':';

/// Codec bound to one key.
///
/// Build it once per key (e.g. at startup for the platform secret) and reuse
/// it; every `encrypt` call draws a fresh random IV.
#[derive(Clone)]
pub struct SecretCodec {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCodec").finish_non_exhaustive()
    }
}

impl SecretCodec {
    /// Create a codec from a 64-character hex key.
    ///
    /// The key is taken as is; surrounding whitespace is an invalid key.
    pub fn from_hex_key(key_hex: &str) -> CryptoResult<Self> {
        let key = hex::decode(key_hex).map_err(|_| CryptoError::InvalidKeyLength)?;
        Self::from_key_bytes(&key)
    }

    /// Create a codec from raw key bytes.
    pub fn from_key_bytes(key: &[u8]) -> CryptoResult<Self> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength);
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength)?;
        Ok(Self { cipher })
    }

    /// Seal `plaintext` into `iv:ciphertext:authTag`.
    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        // aes-gcm appends the tag to the ciphertext
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        Ok(format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            hex::encode(nonce),
            hex::encode(ciphertext),
            hex::encode(tag)
        ))
    }

    /// Open an `iv:ciphertext:authTag` secret.
    ///
    /// Component lengths are checked before any decryption is attempted.
    pub fn decrypt(&self, encoded: &str) -> CryptoResult<String> {
        let parts: Vec<&str> = encoded.split(SEPARATOR).collect();
        let [iv_hex, ciphertext_hex, tag_hex] = parts.as_slice() else {
            return Err(CryptoError::malformed(format!(
                "expected 3 colon-separated parts, got {}",
                parts.len()
            )));
        };

        let iv = decode_part(iv_hex, "iv")?;
        if iv.len() != IV_LEN {
            return Err(CryptoError::InvalidIvLength);
        }
        let tag = decode_part(tag_hex, "auth tag")?;
        if tag.len() != TAG_LEN {
            return Err(CryptoError::InvalidTagLength);
        }
        let mut sealed = decode_part(ciphertext_hex, "ciphertext")?;
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map_err(|_| {
                debug!("Secret failed authentication");
                CryptoError::AuthenticationFailed
            })?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::NonUtf8Plaintext)
    }
}

fn decode_part(part: &str, name: &str) -> CryptoResult<Vec<u8>> {
    hex::decode(part).map_err(|_| CryptoError::malformed(format!("{name} is not valid hex")))
}

/// Encrypt with a hex key, validating the key on every call.
pub fn encrypt_secret(plaintext: &str, key_hex: &str) -> CryptoResult<String> {
    SecretCodec::from_hex_key(key_hex)?.encrypt(plaintext)
}

/// Decrypt with a hex key, validating the key on every call.
pub fn decrypt_secret(encoded: &str, key_hex: &str) -> CryptoResult<String> {
    SecretCodec::from_hex_key(key_hex)?.decrypt(encoded)
}
