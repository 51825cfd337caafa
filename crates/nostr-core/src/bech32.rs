//! NIP-19 bech32 codec.
//!
//! A from-scratch implementation of the bech32 encoding used to wrap raw
//! key bytes in human-readable strings (`npub1…`, `nsec1…`). Not the
//! checksummed-for-typos BIP-173 variant with bech32m — Nostr sticks to the
//! original bech32 checksum constant for NIP-19.

use crate::error::{Error, Result};

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const GENERATOR: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];

fn polymod(values: &[u8]) -> u32 {
    let mut chk: u32 = 1;
    for &v in values {
        let top = chk >> 25;
        chk = ((chk & 0x1ffffff) << 5) ^ (v as u32);
        for i in 0..5 {
            if (top >> i) & 1 == 1 {
                chk ^= GENERATOR[i];
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &[u8]) -> Vec<u8> {
    let mut v = Vec::with_capacity(hrp.len() * 2 + 1);
    v.extend(hrp.iter().map(|c| c >> 5));
    v.push(0);
    v.extend(hrp.iter().map(|c| c & 31));
    v
}

fn create_checksum(hrp: &[u8], data: &[u8]) -> [u8; 6] {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0u8; 6]);
    let polymod = polymod(&values) ^ 1;
    let mut checksum = [0u8; 6];
    for (i, c) in checksum.iter_mut().enumerate() {
        *c = ((polymod >> (5 * (5 - i))) & 31) as u8;
    }
    checksum
}

fn verify_checksum(hrp: &[u8], data: &[u8]) -> bool {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    polymod(&values) == 1
}

/// Convert a byte slice into groups of `to_bits` bits, MSB-first.
fn convert_bits(data: &[u8], from_bits: u32, to_bits: u32, pad: bool) -> Result<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut out = Vec::new();
    let max_v = (1u32 << to_bits) - 1;
    let max_acc = (1u32 << (from_bits + to_bits - 1)) - 1;

    for &value in data {
        let value = value as u32;
        if (value >> from_bits) != 0 {
            return Err(Error::InvalidBech32("input value out of range".into()));
        }
        acc = ((acc << from_bits) | value) & max_acc;
        bits += from_bits;
        while bits >= to_bits {
            bits -= to_bits;
            out.push(((acc >> bits) & max_v) as u8);
        }
    }

    if pad {
        if bits > 0 {
            out.push(((acc << (to_bits - bits)) & max_v) as u8);
        }
    } else if bits >= from_bits || ((acc << (to_bits - bits)) & max_v) != 0 {
        return Err(Error::InvalidBech32("non-zero padding in input".into()));
    }

    Ok(out)
}

/// Encode `hrp` + raw 8-bit `data` as a bech32 string.
pub fn encode(hrp: &str, data: &[u8]) -> Result<String> {
    if hrp.is_empty() {
        return Err(Error::InvalidBech32("empty hrp".into()));
    }
    let hrp_bytes = hrp.as_bytes();
    let values = convert_bits(data, 8, 5, true)?;
    let checksum = create_checksum(hrp_bytes, &values);

    let mut out = String::with_capacity(hrp.len() + 1 + values.len() + 6);
    out.push_str(hrp);
    out.push('1');
    for &v in values.iter().chain(checksum.iter()) {
        out.push(CHARSET[v as usize] as char);
    }
    Ok(out)
}

/// Decode a bech32 string into its hrp and raw 8-bit payload.
pub fn decode(s: &str) -> Result<(String, Vec<u8>)> {
    if s.len() > 2000 {
        return Err(Error::InvalidBech32("string too long".into()));
    }
    let lower = s.to_lowercase();
    let is_mixed_case = s.chars().any(|c| c.is_ascii_uppercase())
        && s.chars().any(|c| c.is_ascii_lowercase());
    if is_mixed_case {
        return Err(Error::InvalidBech32("mixed case".into()));
    }

    let sep_pos = lower
        .rfind('1')
        .ok_or_else(|| Error::InvalidBech32("missing separator".into()))?;
    if sep_pos == 0 {
        return Err(Error::InvalidBech32("empty hrp".into()));
    }
    let (hrp, rest) = lower.split_at(sep_pos);
    let payload = &rest[1..];
    if payload.len() < 6 {
        return Err(Error::InvalidBech32("payload too short".into()));
    }

    let mut values = Vec::with_capacity(payload.len());
    for c in payload.chars() {
        let pos = CHARSET
            .iter()
            .position(|&x| x as char == c)
            .ok_or_else(|| Error::InvalidBech32(format!("invalid character: {c}")))?;
        values.push(pos as u8);
    }

    if !verify_checksum(hrp.as_bytes(), &values) {
        return Err(Error::InvalidBech32("checksum mismatch".into()));
    }

    let data = &values[..values.len() - 6];
    let bytes = convert_bits(data, 5, 8, false)?;
    if bytes.len() < 32 {
        log::warn!(
            "bech32 payload for hrp '{hrp}' decoded to only {} bytes",
            bytes.len()
        );
    }
    Ok((hrp.to_string(), bytes))
}

/// Decode a bech32 string, requiring it to carry the given hrp.
pub fn decode_with_hrp(s: &str, expected_hrp: &str) -> Result<Vec<u8>> {
    let (hrp, data) = decode(s)?;
    if hrp != expected_hrp {
        return Err(Error::UnknownPrefix(hrp));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let data = [0u8; 32];
        let s = encode("npub", &data).unwrap();
        assert!(s.starts_with("npub1"));
        let (hrp, decoded) = decode(&s).unwrap();
        assert_eq!(hrp, "npub");
        assert_eq!(decoded, data.to_vec());
    }

    #[test]
    fn decode_s2_vector() {
        // spec.md S2
        let s = "npub180cvv07tjdrrgpa0j7j7tmnyl2yr6yr7l8j4s3evf6u64th6gkwsyjh6w6";
        let (hrp, data) = decode(s).unwrap();
        assert_eq!(hrp, "npub");
        assert_eq!(
            crate::hexutil::encode(&data),
            "3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d"
        );
    }

    #[test]
    fn decode_case_insensitive() {
        let s = encode("npub", &[1u8; 32]).unwrap();
        let upper = s.to_uppercase();
        let (hrp, data) = decode(&upper).unwrap();
        assert_eq!(hrp, "npub");
        assert_eq!(data, vec![1u8; 32]);
    }

    #[test]
    fn decode_mixed_case_rejected() {
        let s = encode("npub", &[1u8; 32]).unwrap();
        let mut chars: Vec<char> = s.chars().collect();
        let idx = chars.len() - 1;
        chars[idx] = chars[idx].to_ascii_uppercase();
        let mixed: String = chars.into_iter().collect();
        assert!(decode(&mixed).is_err());
    }

    #[test]
    fn decode_bad_checksum_rejected() {
        let mut s = encode("npub", &[1u8; 32]).unwrap();
        let last = s.pop().unwrap();
        let replacement = if last == 'q' { 'p' } else { 'q' };
        s.push(replacement);
        assert!(decode(&s).is_err());
    }

    #[test]
    fn decode_missing_separator_rejected() {
        assert!(decode("notbech32atall").is_err());
    }

    #[test]
    fn decode_empty_hrp_rejected() {
        assert!(decode("1qqqqqqqqqqqqqqqqq").is_err());
    }

    #[test]
    fn decode_with_hrp_rejects_wrong_prefix() {
        let s = encode("nsec", &[2u8; 32]).unwrap();
        let err = decode_with_hrp(&s, "npub").unwrap_err();
        assert!(matches!(err, Error::UnknownPrefix(h) if h == "nsec"));
    }

    #[test]
    fn decode_with_hrp_accepts_matching_prefix() {
        let s = encode("nsec", &[2u8; 32]).unwrap();
        let data = decode_with_hrp(&s, "nsec").unwrap();
        assert_eq!(data, vec![2u8; 32]);
    }
}
