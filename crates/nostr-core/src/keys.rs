//! Key material: secp256k1 x-only keypairs and their bech32 (NIP-19) forms.

use secp256k1::{Keypair, Secp256k1, SecretKey, XOnlyPublicKey};
use zeroize::Zeroize;

use crate::bech32;
use crate::error::{Error, Result};
use crate::hexutil;

const NSEC_HRP: &str = "nsec";
const NPUB_HRP: &str = "npub";

/// A 32-byte x-only secp256k1 public key, as used throughout Nostr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self> {
        XOnlyPublicKey::from_slice(&bytes).map_err(|_| Error::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    pub fn from_hex(hex: &str) -> Result<Self> {
        Self::from_bytes(hexutil::decode_fixed(hex)?)
    }

    pub fn from_npub(npub: &str) -> Result<Self> {
        let data = bech32::decode_with_hrp(npub, NPUB_HRP)?;
        if data.len() != 32 {
            return Err(Error::InvalidPublicKey);
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&data);
        Self::from_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hexutil::encode(&self.0)
    }

    pub fn to_npub(&self) -> Result<String> {
        bech32::encode(NPUB_HRP, &self.0)
    }

    pub(crate) fn to_xonly(self) -> Result<XOnlyPublicKey> {
        XOnlyPublicKey::from_slice(&self.0).map_err(|_| Error::InvalidPublicKey)
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// An owned secp256k1 keypair: a 32-byte private scalar plus its derived
/// x-only public key. The private scalar is zeroed when the value is
/// dropped.
pub struct KeyPair {
    secret: [u8; 32],
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new keypair from a secure random scalar.
    pub fn generate() -> Self {
        loop {
            let candidate = hexutil::random_bytes::<32>();
            if let Ok(kp) = Self::from_secret_bytes(candidate) {
                return kp;
            }
        }
    }

    /// Construct from a raw 32-byte private scalar. Rejects `0` and any
    /// value outside `(0, curve order)` (the latter is enforced by
    /// `SecretKey::from_slice` itself).
    pub fn from_secret_bytes(secret: [u8; 32]) -> Result<Self> {
        let secp = secp256k1::SECP256K1;
        let sk = SecretKey::from_slice(&secret).map_err(|_| Error::InvalidPrivateKey)?;
        let keypair = Keypair::from_secret_key(secp, &sk);
        let (xonly, _parity) = keypair.x_only_public_key();
        Ok(Self {
            secret,
            public: PublicKey(xonly.serialize()),
        })
    }

    pub fn from_hex(hex: &str) -> Result<Self> {
        Self::from_secret_bytes(hexutil::decode_fixed(hex)?)
    }

    pub fn from_nsec(nsec: &str) -> Result<Self> {
        let data = bech32::decode_with_hrp(nsec, NSEC_HRP)?;
        if data.len() != 32 {
            return Err(Error::InvalidPrivateKey);
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&data);
        Self::from_secret_bytes(bytes)
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    pub fn secret_hex(&self) -> String {
        hexutil::encode(&self.secret)
    }

    pub fn nsec(&self) -> Result<String> {
        bech32::encode(NSEC_HRP, &self.secret)
    }

    pub fn npub(&self) -> Result<String> {
        self.public.to_npub()
    }

    pub(crate) fn to_keypair(&self, secp: &Secp256k1<secp256k1::All>) -> Result<Keypair> {
        let sk = SecretKey::from_slice(&self.secret).map_err(|_| Error::InvalidPrivateKey)?;
        Ok(Keypair::from_secret_key(secp, &sk))
    }

    pub(crate) fn to_secret_key(&self) -> Result<SecretKey> {
        SecretKey::from_slice(&self.secret).map_err(|_| Error::InvalidPrivateKey)
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl Clone for KeyPair {
    fn clone(&self) -> Self {
        Self {
            secret: self.secret,
            public: self.public,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_valid_keypair() {
        let kp = KeyPair::generate();
        assert_eq!(kp.secret_bytes().len(), 32);
    }

    #[test]
    fn nsec_npub_roundtrip() {
        let kp = KeyPair::generate();
        let nsec = kp.nsec().unwrap();
        let restored = KeyPair::from_nsec(&nsec).unwrap();
        assert_eq!(restored.secret_bytes(), kp.secret_bytes());
        assert_eq!(restored.public_key(), kp.public_key());

        let npub = kp.npub().unwrap();
        let pk = PublicKey::from_npub(&npub).unwrap();
        assert_eq!(pk, kp.public_key());
    }

    #[test]
    fn nsec_rejects_wrong_prefix() {
        let kp = KeyPair::generate();
        let npub = kp.npub().unwrap();
        assert!(KeyPair::from_nsec(&npub).is_err());
    }

    #[test]
    fn npub_rejects_wrong_prefix() {
        let kp = KeyPair::generate();
        let nsec = kp.nsec().unwrap();
        assert!(PublicKey::from_npub(&nsec).is_err());
    }

    #[test]
    fn zero_private_key_rejected() {
        assert!(KeyPair::from_secret_bytes([0u8; 32]).is_err());
    }

    #[test]
    fn nip06_official_vector() {
        // spec.md S1 — public key only; full derivation lives in mnemonic.rs
        let kp = KeyPair::from_hex(
            "7f7ff03d123792d6ac594bfa67bf6d0c0ab55b6b1fdb6249303fe861f1ccba9a",
        )
        .unwrap();
        assert_eq!(
            kp.public_key().to_hex(),
            "17162c921dc4d2518f9a101db33695df1afb56ab82f5ff3e5da6eec3ca5cd917"
        );
    }
}
