//! NIP-59 gift wrap / NIP-17 private direct messages.
//!
//! Three layers: a *rumor* (an unsigned, kind-14 event — never itself
//! signed), a *seal* (kind 13, signed by the true sender, content is the
//! sealed rumor), and a *gift wrap* (kind 1059, signed by a one-shot
//! ephemeral key, content is the sealed seal). `created_at` on the seal
//! and wrap is independently randomized within the last two days so an
//! observer can't correlate gift wrap timing with the rumor's real
//! timestamp.

use crate::error::{Error, Result};
use crate::event::{self, Event, UnsignedEvent};
use crate::hexutil;
use crate::keys::{KeyPair, PublicKey};
use crate::nip44;

pub const KIND_SEAL: u32 = 13;
pub const KIND_PRIVATE_DIRECT_MESSAGE: u32 = 14;
pub const KIND_GIFT_WRAP: u32 = 1059;

const TWO_DAYS_SECS: i64 = 2 * 24 * 60 * 60;

/// An unsigned kind-14 event: the private message content, never
/// broadcast or signed on its own.
pub type Rumor = UnsignedEvent;

fn current_unix_time() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_secs() as i64
}

/// A timestamp randomized up to two days into the past, per NIP-59's
/// metadata-privacy recommendation.
fn random_past_timestamp() -> i64 {
    let offset = (hexutil::random_bytes::<4>()[0..4]
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | b as u32)
        % (TWO_DAYS_SECS as u32)) as i64;
    current_unix_time() - offset
}

/// Serialize a rumor as the signed-event field object minus `sig` (but
/// with `id` included) — what NIP-59 actually seals, distinct from the
/// `[0, pubkey, ...]` array used only for hashing.
fn rumor_json(rumor: &Rumor, id: &str) -> String {
    serde_json::json!({
        "id": id,
        "pubkey": rumor.pubkey,
        "created_at": rumor.created_at,
        "kind": rumor.kind,
        "tags": rumor.tags,
        "content": rumor.content,
    })
    .to_string()
}

#[derive(serde::Deserialize)]
struct RumorJson {
    id: String,
    pubkey: String,
    created_at: i64,
    kind: u32,
    tags: Vec<Vec<String>>,
    content: String,
}

/// Build the rumor for a single-recipient private message (kind 14).
pub fn build_rumor(
    sender_pubkey: &PublicKey,
    recipient_pubkey: &PublicKey,
    content: &str,
    reply_to: Option<&str>,
) -> Rumor {
    let mut tags = vec![vec!["p".to_string(), recipient_pubkey.to_hex()]];
    if let Some(event_id) = reply_to {
        tags.push(vec!["e".to_string(), event_id.to_string(), "reply".to_string()]);
    }
    UnsignedEvent {
        pubkey: sender_pubkey.to_hex(),
        created_at: current_unix_time(),
        kind: KIND_PRIVATE_DIRECT_MESSAGE,
        tags,
        content: content.to_string(),
    }
}

/// Build the rumor for a group private message, tagging every recipient.
pub fn build_group_rumor(
    sender_pubkey: &PublicKey,
    recipient_pubkeys: &[PublicKey],
    content: &str,
    subject: Option<&str>,
    reply_to: Option<&str>,
) -> Rumor {
    let mut tags: Vec<Vec<String>> = recipient_pubkeys
        .iter()
        .map(|pk| vec!["p".to_string(), pk.to_hex()])
        .collect();
    if let Some(subject) = subject {
        tags.push(vec!["subject".to_string(), subject.to_string()]);
    }
    if let Some(event_id) = reply_to {
        tags.push(vec!["e".to_string(), event_id.to_string(), "reply".to_string()]);
    }
    UnsignedEvent {
        pubkey: sender_pubkey.to_hex(),
        created_at: current_unix_time(),
        kind: KIND_PRIVATE_DIRECT_MESSAGE,
        tags,
        content: content.to_string(),
    }
}

/// Seal and gift-wrap `rumor` for a single recipient, signed by `sender`.
pub fn wrap(rumor: &Rumor, sender: &KeyPair, recipient_pubkey: &PublicKey) -> Result<Event> {
    let rumor_id = event::event_id(rumor);
    let rumor_payload = rumor_json(rumor, &rumor_id);

    let seal_payload = nip44::seal(rumor_payload.as_bytes(), recipient_pubkey, sender)?;
    let unsigned_seal = UnsignedEvent {
        pubkey: sender.public_key().to_hex(),
        created_at: random_past_timestamp(),
        kind: KIND_SEAL,
        tags: vec![],
        content: seal_payload,
    };
    let seal = event::sign(unsigned_seal, sender)?;

    let ephemeral = KeyPair::generate();
    let seal_json = serde_json::to_string(&seal)
        .map_err(|e| Error::EncryptionFailed(format!("seal serialization failed: {e}")))?;
    let wrap_payload = nip44::seal(seal_json.as_bytes(), recipient_pubkey, &ephemeral)?;

    let unsigned_wrap = UnsignedEvent {
        pubkey: ephemeral.public_key().to_hex(),
        created_at: random_past_timestamp(),
        kind: KIND_GIFT_WRAP,
        tags: vec![vec!["p".to_string(), recipient_pubkey.to_hex()]],
        content: wrap_payload,
    };
    event::sign(unsigned_wrap, &ephemeral)
}

/// Gift-wrap `rumor` once per recipient, plus once more for the sender's
/// own pubkey so the sender retains a readable copy.
pub fn wrap_for_group(
    rumor: &Rumor,
    sender: &KeyPair,
    recipient_pubkeys: &[PublicKey],
) -> Result<Vec<Event>> {
    let mut wraps = Vec::with_capacity(recipient_pubkeys.len() + 1);
    for recipient in recipient_pubkeys {
        wraps.push(wrap(rumor, sender, recipient)?);
    }
    wraps.push(wrap(rumor, sender, &sender.public_key())?);
    Ok(wraps)
}

/// Unwrap a gift wrap addressed to `recipient`, returning the
/// authenticated sender pubkey (from the seal's own signature, not the
/// wrap's ephemeral key) and the rumor.
pub fn unwrap(gift_wrap: &Event, recipient: &KeyPair) -> Result<(PublicKey, Rumor)> {
    if gift_wrap.kind != KIND_GIFT_WRAP {
        return Err(Error::VerificationFailed);
    }

    let wrap_sender = PublicKey::from_hex(&gift_wrap.pubkey)?;
    let seal_json = nip44::open(&gift_wrap.content, &wrap_sender, recipient)?;
    let seal: Event = serde_json::from_slice(&seal_json)
        .map_err(|_| Error::DecryptionFailed("seal is not valid JSON".into()))?;

    if seal.kind != KIND_SEAL {
        return Err(Error::VerificationFailed);
    }
    if !event::verify(&seal)? {
        return Err(Error::VerificationFailed);
    }

    let seal_sender = PublicKey::from_hex(&seal.pubkey)?;
    let rumor_json_bytes = nip44::open(&seal.content, &seal_sender, recipient)?;
    let parsed: RumorJson = serde_json::from_slice(&rumor_json_bytes)
        .map_err(|_| Error::DecryptionFailed("rumor is not valid JSON".into()))?;

    let rumor = Rumor {
        pubkey: parsed.pubkey,
        created_at: parsed.created_at,
        kind: parsed.kind,
        tags: parsed.tags,
        content: parsed.content,
    };

    let recomputed_id = event::event_id(&rumor);
    if recomputed_id != parsed.id {
        return Err(Error::InvalidEventId);
    }

    Ok((seal_sender, rumor))
}
