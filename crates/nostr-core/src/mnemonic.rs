//! NIP-06: deterministic key derivation from a BIP-39 mnemonic.
//!
//! Hand-rolls BIP-32 child key derivation on top of `secp256k1`'s scalar
//! tweak-add, rather than pulling in the `bitcoin` crate: the only
//! operation NIP-06 needs is hardened-and-normal CKDpriv along a fixed
//! depth-5 path, and doing it directly keeps control over the exact error
//! returned when a derivation step produces an invalid scalar (one in
//! 2^127 odds per BIP-32, but part of the contract).

use bip39::Mnemonic;
use hmac::{Hmac, Mac};
use sha2::Sha512;

use crate::error::{Error, Result};
use crate::keys::KeyPair;

type HmacSha512 = Hmac<Sha512>;

const SECP256K1_ORDER: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xfe, 0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41,
];

const HARDENED_OFFSET: u32 = 0x8000_0000;

/// The standard NIP-06 derivation path for account 0, key index 0.
pub fn path_for_account(account: u32) -> [u32; 5] {
    [
        44 | HARDENED_OFFSET,
        1237 | HARDENED_OFFSET,
        account | HARDENED_OFFSET,
        0,
        0,
    ]
}

struct ExtendedPrivateKey {
    key: [u8; 32],
    chain_code: [u8; 32],
}

impl ExtendedPrivateKey {
    fn master(seed: &[u8]) -> Result<Self> {
        let mut mac = HmacSha512::new_from_slice(b"Bitcoin seed")
            .map_err(|e| Error::InvalidMnemonic(e.to_string()))?;
        mac.update(seed);
        let i = mac.finalize().into_bytes();
        let (il, ir) = i.split_at(32);

        let mut key = [0u8; 32];
        let mut chain_code = [0u8; 32];
        key.copy_from_slice(il);
        chain_code.copy_from_slice(ir);

        if !is_valid_scalar(&key) {
            return Err(Error::InvalidMnemonic(
                "master key derivation produced an invalid scalar".into(),
            ));
        }
        Ok(Self { key, chain_code })
    }

    fn derive_child(&self, index: u32) -> Result<Self> {
        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|e| Error::InvalidMnemonic(e.to_string()))?;

        if index & HARDENED_OFFSET != 0 {
            mac.update(&[0u8]);
            mac.update(&self.key);
        } else {
            let sk = secp256k1::SecretKey::from_slice(&self.key)
                .map_err(|_| Error::InvalidPrivateKey)?;
            let pk = secp256k1::PublicKey::from_secret_key(secp256k1::SECP256K1, &sk);
            mac.update(&pk.serialize());
        }
        mac.update(&index.to_be_bytes());

        let i = mac.finalize().into_bytes();
        let (il, ir) = i.split_at(32);

        let child_key = add_scalars(il, &self.key)?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(ir);

        Ok(Self {
            key: child_key,
            chain_code,
        })
    }

    fn derive_path(&self, path: &[u32]) -> Result<Self> {
        let mut current = self.derive_child(path[0])?;
        for &index in &path[1..] {
            current = current.derive_child(index)?;
        }
        Ok(current)
    }
}

fn is_valid_scalar(bytes: &[u8; 32]) -> bool {
    if bytes.iter().all(|&b| b == 0) {
        return false;
    }
    bytes.as_slice() < SECP256K1_ORDER.as_slice()
}

/// Add two 256-bit big-endian scalars mod the secp256k1 group order.
fn add_scalars(a: &[u8], b: &[u8; 32]) -> Result<[u8; 32]> {
    let mut carry = 0u16;
    let mut sum = [0u8; 32];
    for i in (0..32).rev() {
        let s = carry + a[i] as u16 + b[i] as u16;
        sum[i] = (s & 0xff) as u8;
        carry = s >> 8;
    }
    if sum.as_slice() >= SECP256K1_ORDER.as_slice() {
        sum = subtract_order(&sum);
    }
    if !is_valid_scalar(&sum) {
        return Err(Error::InvalidMnemonic(
            "derived child scalar is invalid".into(),
        ));
    }
    Ok(sum)
}

fn subtract_order(value: &[u8; 32]) -> [u8; 32] {
    let mut borrow: i32 = 0;
    let mut out = [0u8; 32];
    for i in (0..32).rev() {
        let mut diff = value[i] as i32 - SECP256K1_ORDER[i] as i32 - borrow;
        if diff < 0 {
            diff += 256;
            borrow = 1;
        } else {
            borrow = 0;
        }
        out[i] = diff as u8;
    }
    out
}

/// Parse and validate a BIP-39 mnemonic phrase (English wordlist).
pub fn validate_mnemonic(phrase: &str) -> Result<()> {
    Mnemonic::parse_normalized(phrase)
        .map(|_| ())
        .map_err(|e| Error::InvalidMnemonic(e.to_string()))
}

/// Derive the NIP-06 keypair for `account` from a mnemonic and optional
/// BIP-39 passphrase.
pub fn derive_keypair(phrase: &str, passphrase: &str, account: u32) -> Result<KeyPair> {
    let mnemonic =
        Mnemonic::parse_normalized(phrase).map_err(|e| Error::InvalidMnemonic(e.to_string()))?;
    let seed = mnemonic.to_seed_normalized(passphrase);

    let master = ExtendedPrivateKey::master(&seed)?;
    let path = path_for_account(account);
    let derived = master.derive_path(&path)?;

    KeyPair::from_secret_bytes(derived.key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VECTOR_MNEMONIC: &str =
        "leader monkey parrot ring guide accident before fence cannon height naive bean";

    // A second 24-word NIP-06 vector is also documented upstream, but only
    // in truncated form (mnemonic and both keys elided in the middle); it
    // isn't reproduced here since there's no way to recover the full
    // values without guessing at cryptographic data. See DESIGN.md.

    #[test]
    fn nip06_official_vector() {
        let kp = derive_keypair(VECTOR_MNEMONIC, "", 0).unwrap();
        assert_eq!(
            kp.secret_hex(),
            "7f7ff03d123792d6ac594bfa67bf6d0c0ab55b6b1fdb6249303fe861f1ccba9a"
        );
        assert_eq!(
            kp.public_key().to_hex(),
            "17162c921dc4d2518f9a101db33695df1afb56ab82f5ff3e5da6eec3ca5cd917"
        );
        assert_eq!(
            kp.npub().unwrap(),
            "npub1zutzeysacnf9rru6zqwmxd54mud0k44tst6l70ja5mhv8jjumytsd2x7nu"
        );
    }

    #[test]
    fn different_accounts_derive_different_keys() {
        let a = derive_keypair(VECTOR_MNEMONIC, "", 0).unwrap();
        let b = derive_keypair(VECTOR_MNEMONIC, "", 1).unwrap();
        assert_ne!(a.secret_bytes(), b.secret_bytes());
    }

    #[test]
    fn passphrase_changes_derived_key() {
        let a = derive_keypair(VECTOR_MNEMONIC, "", 0).unwrap();
        let b = derive_keypair(VECTOR_MNEMONIC, "extra", 0).unwrap();
        assert_ne!(a.secret_bytes(), b.secret_bytes());
    }

    #[test]
    fn invalid_mnemonic_rejected() {
        assert!(validate_mnemonic("not a real bip39 mnemonic at all").is_err());
        assert!(derive_keypair("not a real bip39 mnemonic at all", "", 0).is_err());
    }

    #[test]
    fn valid_mnemonic_passes_validation() {
        assert!(validate_mnemonic(VECTOR_MNEMONIC).is_ok());
    }
}
