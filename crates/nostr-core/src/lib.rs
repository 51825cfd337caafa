//! Event cryptography, NIP-44 encryption, and NIP-59 gift wrap for Nostr
//! clients.
//!
//! This crate covers the parts of a Nostr client that are pure
//! cryptography and encoding: keys, event signing, NIP-44 sealed
//! messages, and NIP-59 gift wraps. Relay transport lives in the sibling
//! `nostr-relay` crate.

pub mod bech32;
pub mod error;
pub mod event;
pub mod hexutil;
pub mod keys;
pub mod mnemonic;
pub mod nip44;
pub mod nip59;

pub use error::{Error, Result};
pub use event::*;
pub use keys::*;
pub use nip44::*;
pub use nip59::*;
