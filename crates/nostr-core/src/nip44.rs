//! NIP-44 v2: authenticated-but-unsigned sealed messages between two
//! Nostr keys.
//!
//! Conversation key derivation uses raw ECDH (the x-coordinate of the
//! shared point, not a hash of it) followed by `HKDF-Extract`; encryption
//! is ChaCha20 used directly as a stream cipher (no Poly1305 tag — the
//! HMAC below is the only authentication), the way NIP-44 v2 itself
//! specifies it rather than the AEAD shape `chacha20poly1305` would give.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use secp256k1::{PublicKey as FullPublicKey, Scalar};
use sha2::Sha256;

use crate::error::{Error, Result};
use crate::hexutil;
use crate::keys::{KeyPair, PublicKey};

type HmacSha256 = Hmac<Sha256>;

const VERSION: u8 = 2;
const SALT: &[u8] = b"nip44-v2";
const MIN_PLAINTEXT_LEN: usize = 1;
const MAX_PLAINTEXT_LEN: usize = 65_535;

/// 32-byte symmetric key shared by both ends of a conversation.
pub struct ConversationKey([u8; 32]);

impl ConversationKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Lift an x-only pubkey to a full point, trying even-y then odd-y, and
/// compute the ECDH shared x-coordinate with `secret`.
fn ecdh_shared_x(secret: &KeyPair, their_pubkey: &PublicKey) -> Result<[u8; 32]> {
    let secp = secp256k1::SECP256K1;
    let scalar = Scalar::from_be_bytes(*secret.secret_bytes())
        .map_err(|_| Error::InvalidPrivateKey)?;

    let mut compressed = [0u8; 33];
    compressed[0] = 0x02;
    compressed[1..].copy_from_slice(their_pubkey.as_bytes());

    let point = FullPublicKey::from_slice(&compressed).or_else(|_| {
        compressed[0] = 0x03;
        FullPublicKey::from_slice(&compressed)
    })
    .map_err(|_| Error::InvalidPublicKey)?;

    let shared_point = point
        .mul_tweak(secp, &scalar)
        .map_err(|_| Error::EncryptionFailed("ecdh scalar multiplication failed".into()))?;

    let serialized = shared_point.serialize();
    let mut x = [0u8; 32];
    x.copy_from_slice(&serialized[1..33]);
    Ok(x)
}

/// Derive the symmetric conversation key shared between `secret` and
/// `their_pubkey`. Symmetric: `derive(a_priv, b_pub) == derive(b_priv, a_pub)`.
pub fn conversation_key(secret: &KeyPair, their_pubkey: &PublicKey) -> Result<ConversationKey> {
    let shared_x = ecdh_shared_x(secret, their_pubkey)?;
    let (prk, _hkdf) = Hkdf::<Sha256>::extract(Some(SALT), &shared_x);
    let mut out = [0u8; 32];
    out.copy_from_slice(&prk);
    Ok(ConversationKey(out))
}

struct MessageKeys {
    chacha_key: [u8; 32],
    chacha_nonce: [u8; 12],
    hmac_key: [u8; 32],
}

fn expand_message_keys(conversation_key: &ConversationKey, nonce: &[u8; 32]) -> MessageKeys {
    let hk = Hkdf::<Sha256>::from_prk(conversation_key.as_bytes())
        .expect("conversation key is always 32 bytes, a valid PRK length");
    let mut expanded = [0u8; 76];
    hk.expand(nonce, &mut expanded)
        .expect("76 bytes is within HKDF-SHA256's output limit");

    let mut chacha_key = [0u8; 32];
    let mut chacha_nonce = [0u8; 12];
    let mut hmac_key = [0u8; 32];
    chacha_key.copy_from_slice(&expanded[0..32]);
    chacha_nonce.copy_from_slice(&expanded[32..44]);
    hmac_key.copy_from_slice(&expanded[44..76]);

    MessageKeys {
        chacha_key,
        chacha_nonce,
        hmac_key,
    }
}

fn padded_len(unpadded_len: usize) -> usize {
    if unpadded_len <= 32 {
        return 32;
    }
    // next_power = 2 ** (floor(log2(unpadded_len - 1)) + 1), via bit length
    // rather than float log2 so the bucket boundary can't shift by one due
    // to floating point rounding near a power of two.
    let x = unpadded_len - 1;
    let bit_length = usize::BITS - x.leading_zeros();
    let next_power = 1usize << bit_length;
    let chunk = if next_power <= 256 { 32 } else { next_power / 8 };
    chunk * ((unpadded_len - 1) / chunk + 1)
}

fn pad(plaintext: &[u8]) -> Vec<u8> {
    let u = plaintext.len();
    let total = padded_len(u);
    let mut out = Vec::with_capacity(2 + total);
    out.extend_from_slice(&(u as u16).to_be_bytes());
    out.extend_from_slice(plaintext);
    out.resize(2 + total, 0);
    out
}

fn unpad(padded: &[u8]) -> Result<Vec<u8>> {
    if padded.len() < 2 {
        return Err(Error::InvalidPadding);
    }
    let u = u16::from_be_bytes([padded[0], padded[1]]) as usize;
    let body_len = padded.len() - 2;
    if u < MIN_PLAINTEXT_LEN || u > body_len {
        return Err(Error::InvalidPadding);
    }
    if padded.len() != 2 + padded_len(u) {
        return Err(Error::InvalidPadding);
    }
    Ok(padded[2..2 + u].to_vec())
}

/// Seal `plaintext` for `their_pubkey`, authenticated by `sender`'s key.
pub fn seal(plaintext: &[u8], their_pubkey: &PublicKey, sender: &KeyPair) -> Result<String> {
    if plaintext.is_empty() || plaintext.len() > MAX_PLAINTEXT_LEN {
        return Err(Error::EncryptionFailed(format!(
            "plaintext length {} outside 1..={}",
            plaintext.len(),
            MAX_PLAINTEXT_LEN
        )));
    }

    let conv_key = conversation_key(sender, their_pubkey)?;
    let nonce = hexutil::random_bytes::<32>();
    let keys = expand_message_keys(&conv_key, &nonce);

    let padded = pad(plaintext);
    let mut ciphertext = padded;
    let mut cipher = ChaCha20::new(&keys.chacha_key.into(), &keys.chacha_nonce.into());
    cipher.apply_keystream(&mut ciphertext);

    let mut mac_input = Vec::with_capacity(32 + ciphertext.len());
    mac_input.extend_from_slice(&nonce);
    mac_input.extend_from_slice(&ciphertext);
    let mut mac_engine =
        HmacSha256::new_from_slice(&keys.hmac_key).expect("hmac accepts any key length");
    mac_engine.update(&mac_input);
    let mac = mac_engine.finalize().into_bytes();

    let mut payload = Vec::with_capacity(1 + 32 + ciphertext.len() + 32);
    payload.push(VERSION);
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&ciphertext);
    payload.extend_from_slice(&mac);

    Ok(base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        payload,
    ))
}

/// Open a payload produced by [`seal`], where `from_pubkey` is the key
/// claimed to have produced it and `recipient` is the opening party.
pub fn open(payload: &str, from_pubkey: &PublicKey, recipient: &KeyPair) -> Result<Vec<u8>> {
    let raw = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, payload)
        .map_err(|_| Error::InvalidPayloadFormat)?;

    if raw.len() < 1 + 32 + 32 + 32 {
        return Err(Error::InvalidPayloadFormat);
    }
    let version = raw[0];
    if version != VERSION {
        return Err(Error::UnsupportedEncryptionVersion(version));
    }

    let nonce: [u8; 32] = raw[1..33].try_into().expect("slice is exactly 32 bytes");
    let mac_received = &raw[raw.len() - 32..];
    let ciphertext = &raw[33..raw.len() - 32];

    let conv_key = conversation_key(recipient, from_pubkey)?;
    let keys = expand_message_keys(&conv_key, &nonce);

    let mut mac_input = Vec::with_capacity(32 + ciphertext.len());
    mac_input.extend_from_slice(&nonce);
    mac_input.extend_from_slice(ciphertext);
    let mut mac_engine =
        HmacSha256::new_from_slice(&keys.hmac_key).expect("hmac accepts any key length");
    mac_engine.update(&mac_input);
    let mac_computed = mac_engine.finalize().into_bytes();

    if !hexutil::constant_time_eq(mac_computed.as_slice(), mac_received) {
        return Err(Error::HmacVerificationFailed);
    }

    let mut padded = ciphertext.to_vec();
    let mut cipher = ChaCha20::new(&keys.chacha_key.into(), &keys.chacha_nonce.into());
    cipher.apply_keystream(&mut padded);

    unpad(&padded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_roundtrip() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let plaintext = b"Hello from Alice to Bob";

        let payload = seal(plaintext, &bob.public_key(), &alice).unwrap();
        let opened = open(&payload, &alice.public_key(), &bob).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn conversation_key_is_symmetric() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let k1 = conversation_key(&alice, &bob.public_key()).unwrap();
        let k2 = conversation_key(&bob, &alice.public_key()).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn padded_len_matches_spec_buckets() {
        assert_eq!(padded_len(1), 32);
        assert_eq!(padded_len(32), 32);
        assert_eq!(padded_len(33), 64);
        assert_eq!(padded_len(64), 64);
        assert_eq!(padded_len(65), 96);
        assert_eq!(padded_len(100), 128);
        assert_eq!(padded_len(200), 224);
        assert_eq!(padded_len(700), 768);
    }

    #[test]
    fn tampered_ciphertext_fails_with_hmac_error_not_padding_error() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let payload = seal(b"tamper me", &bob.public_key(), &alice).unwrap();

        let mut raw = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &payload)
            .unwrap();
        let mid = raw.len() / 2;
        raw[mid] ^= 0xff;
        let tampered = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, raw);

        let err = open(&tampered, &alice.public_key(), &bob).unwrap_err();
        assert_eq!(err, Error::HmacVerificationFailed);
    }

    #[test]
    fn wrong_version_rejected() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let payload = seal(b"hi", &bob.public_key(), &alice).unwrap();
        let mut raw = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &payload)
            .unwrap();
        raw[0] = 9;
        let tampered = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, raw);
        let err = open(&tampered, &alice.public_key(), &bob).unwrap_err();
        assert_eq!(err, Error::UnsupportedEncryptionVersion(9));
    }

    #[test]
    fn empty_plaintext_rejected() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        assert!(seal(b"", &bob.public_key(), &alice).is_err());
    }

    #[test]
    fn max_length_boundary_accepted() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let plaintext = vec![0x42u8; MAX_PLAINTEXT_LEN];
        let payload = seal(&plaintext, &bob.public_key(), &alice).unwrap();
        let opened = open(&payload, &alice.public_key(), &bob).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn over_length_rejected() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let plaintext = vec![0x42u8; MAX_PLAINTEXT_LEN + 1];
        assert!(seal(&plaintext, &bob.public_key(), &alice).is_err());
    }
}
