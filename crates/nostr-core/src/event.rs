//! NIP-01: event canonicalization, id derivation, Schnorr signing and
//! verification.

use secp256k1::{schnorr, Message};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::hexutil;
use crate::keys::{KeyPair, PublicKey};

/// A signed Nostr event. Invariants (`id` matches the canonical hash,
/// `sig` verifies against `pubkey`) hold for every value a caller can
/// construct — signed events can only come from [`sign`] or
/// [`verify`]'s successful-parse path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

/// An event before it has an id or signature — a "rumor" when `kind == 14`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedEvent {
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

/// Write the JSON string escaping rules NIP-01 canonicalization requires:
/// quote, backslash, and control characters below 0x20 are escaped;
/// everything else — including forward slashes and non-ASCII text — is
/// emitted literally. `serde_json::to_string` escapes forward slashes
/// only when asked to, but the safer route for a wire format this
/// sensitive is to control every byte ourselves.
fn write_json_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_json_tags(out: &mut String, tags: &[Vec<String>]) {
    out.push('[');
    for (i, tag) in tags.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('[');
        for (j, field) in tag.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            write_json_string(out, field);
        }
        out.push(']');
    }
    out.push(']');
}

/// Produce the canonical byte form hashed for an event id:
/// `[0, pubkey, created_at, kind, tags, content]` with no superfluous
/// whitespace and the escaping rules in [`write_json_string`].
pub fn canonical_bytes(unsigned: &UnsignedEvent) -> String {
    let mut out = String::new();
    out.push_str("[0,");
    write_json_string(&mut out, &unsigned.pubkey);
    out.push(',');
    out.push_str(&unsigned.created_at.to_string());
    out.push(',');
    out.push_str(&unsigned.kind.to_string());
    out.push(',');
    write_json_tags(&mut out, &unsigned.tags);
    out.push(',');
    write_json_string(&mut out, &unsigned.content);
    out.push(']');
    out
}

/// The event id: `lowercase_hex(SHA256(canonical_bytes))`.
pub fn event_id(unsigned: &UnsignedEvent) -> String {
    let bytes = canonical_bytes(unsigned);
    let hash = Sha256::digest(bytes.as_bytes());
    hexutil::encode(&hash)
}

/// Sign an unsigned event, producing a complete signed [`Event`].
///
/// Uses BIP-340 Schnorr with a randomized auxiliary nonce, as NIP-01
/// requires — two signatures over the same event id will differ.
pub fn sign(unsigned: UnsignedEvent, key: &KeyPair) -> Result<Event> {
    if unsigned.pubkey != key.public_key().to_hex() {
        return Err(Error::SigningFailed(
            "unsigned event pubkey does not match signing key".into(),
        ));
    }

    let id = event_id(&unsigned);
    let id_bytes = hexutil::decode_fixed::<32>(&id)?;

    let secp = secp256k1::SECP256K1;
    let keypair = key.to_keypair(secp)?;
    let message = Message::from_digest(id_bytes);
    let aux_rand = hexutil::random_bytes::<32>();
    let sig = secp.sign_schnorr_with_aux_rand(&message, &keypair, &aux_rand);

    Ok(Event {
        id,
        pubkey: unsigned.pubkey,
        created_at: unsigned.created_at,
        kind: unsigned.kind,
        tags: unsigned.tags,
        content: unsigned.content,
        sig: hexutil::encode(sig.as_ref()),
    })
}

/// Verify that `event.id` matches its canonical hash and `event.sig` is a
/// valid Schnorr signature over that id by `event.pubkey`.
///
/// Returns `Ok(false)` when the id or signature simply doesn't match;
/// returns `Err` only when the fields themselves are malformed (bad hex,
/// wrong lengths).
pub fn verify(event: &Event) -> Result<bool> {
    let unsigned = UnsignedEvent {
        pubkey: event.pubkey.clone(),
        created_at: event.created_at,
        kind: event.kind,
        tags: event.tags.clone(),
        content: event.content.clone(),
    };

    let computed_id = event_id(&unsigned);
    if computed_id != event.id {
        return Err(Error::InvalidEventId);
    }

    let id_bytes = hexutil::decode_fixed::<32>(&event.id)?;
    let sig_bytes = hexutil::decode_fixed::<64>(&event.sig)?;
    let pubkey = PublicKey::from_hex(&event.pubkey)?;

    let sig = schnorr::Signature::from_slice(&sig_bytes).map_err(|_| Error::InvalidSignature)?;
    let message = Message::from_digest(id_bytes);
    let xonly = pubkey.to_xonly()?;

    let secp = secp256k1::SECP256K1;
    Ok(secp.verify_schnorr(&sig, &message, &xonly).is_ok())
}

/// NIP-01 event kind classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindClass {
    Regular,
    Replaceable,
    Ephemeral,
    Addressable,
}

/// Classify a kind per NIP-01's ranges. Every kind is one of these four;
/// anything outside the replaceable/ephemeral/addressable ranges is
/// Regular, not just the ranges NIP-01 happens to give examples for (the
/// convention leaves room for future regular kinds outside 1000..10000
/// and 4..45).
pub fn classify_kind(kind: u32) -> KindClass {
    if kind == 0 || kind == 3 || (10000..20000).contains(&kind) {
        KindClass::Replaceable
    } else if (20000..30000).contains(&kind) {
        KindClass::Ephemeral
    } else if (30000..40000).contains(&kind) {
        KindClass::Addressable
    } else {
        KindClass::Regular
    }
}

/// Sort events reverse-chronologically by `created_at`, breaking ties by
/// ascending `id`.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| match b.created_at.cmp(&a.created_at) {
        std::cmp::Ordering::Equal => a.id.cmp(&b.id),
        other => other,
    });
}
