//! Codec error types.

use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Codec failures.
///
/// Everything except `AuthenticationFailed` is a configuration or input defect
/// and is never worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected 32 bytes")]
    InvalidKeyLength,

    #[error("Malformed encrypted secret: {0}")]
    MalformedEncoding(String),

    #[error("Invalid IV length: expected 12 bytes")]
    InvalidIvLength,

    #[error("Invalid auth tag length: expected 16 bytes")]
    InvalidTagLength,

    /// Wrong key and tampered data are deliberately indistinguishable.
    #[error("Secret authentication failed")]
    AuthenticationFailed,

    #[error("Decrypted secret is not valid UTF-8")]
    NonUtf8Plaintext,

    #[error("Encryption failed")]
    EncryptionFailed,
}

impl CryptoError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedEncoding(msg.into())
    }

    /// Validation errors point at bad configuration or bad stored data.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::AuthenticationFailed | Self::EncryptionFailed)
    }
}
