//! Flat error taxonomy for the core crate.
//!
//! One enum covers every failure mode a caller of `nostr-core` can hit:
//! bech32 codec errors, key/signature errors, BIP-39 mnemonic errors, and
//! NIP-44 encryption errors. Grouping them keeps the taxonomy exactly as
//! enumerable as the spec this crate follows, rather than one enum per
//! module that callers have to wrap themselves.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Key / crypto
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("event id does not match canonical hash")]
    InvalidEventId,
    #[error("signing failed: {0}")]
    SigningFailed(String),
    #[error("verification failed")]
    VerificationFailed,
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    // Bech32
    #[error("invalid bech32 string: {0}")]
    InvalidBech32(String),
    #[error("unexpected bech32 prefix: {0}")]
    UnknownPrefix(String),

    // NIP-39 mnemonic
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),
    #[error("invalid mnemonic word: {0}")]
    InvalidMnemonicWord(String),
    #[error("invalid mnemonic checksum")]
    InvalidMnemonicChecksum,

    // NIP-44
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("unsupported encryption version: {0}")]
    UnsupportedEncryptionVersion(u8),
    #[error("invalid payload format")]
    InvalidPayloadFormat,
    #[error("hmac verification failed")]
    HmacVerificationFailed,
    #[error("invalid padding")]
    InvalidPadding,
}

pub type Result<T> = std::result::Result<T, Error>;
