//! Secret codec for provider keys and platform tokens.
//!
//! Secrets are sealed with AES-256-GCM under a 32-byte key supplied as 64 hex
//! characters and serialized as `<ivHex>:<ciphertextHex>:<authTagHex>`.

pub mod codec;
pub mod error;

pub use codec::{decrypt_secret, encrypt_secret, SecretCodec, IV_LEN, KEY_LEN, TAG_LEN};
pub use error::{CryptoError, CryptoResult};
