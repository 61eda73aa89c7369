//! Unified container encoding shared by addresses and viewing keys.
//!
//! A container is a sequence of `(typecode, length, data)` items, each field
//! a CompactSize, followed by the human-readable part right-padded with zero
//! bytes to 16 bytes. The whole payload is Bech32m encoded.

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32m, Hrp};

use crate::{Error, Result};

/// Length of the HRP padding block appended to every container
pub const PADDING_LEN: usize = 16;

/// One typed container item
pub(crate) type Item = (u32, Vec<u8>);

fn write_compact_size(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

fn read_compact_size(input: &mut &[u8]) -> Option<u64> {
    let (&tag, rest) = input.split_first()?;
    let (value, width) = match tag {
        0xfd => (u64::from(u16::from_le_bytes(rest.get(..2)?.try_into().ok()?)), 2),
        0xfe => (u64::from(u32::from_le_bytes(rest.get(..4)?.try_into().ok()?)), 4),
        0xff => (u64::from_le_bytes(rest.get(..8)?.try_into().ok()?), 8),
        small => (u64::from(small), 0),
    };
    // Non-canonical encodings are rejected.
    let canonical = match width {
        2 => value >= 0xfd,
        4 => value > 0xffff,
        8 => value > 0xffff_ffff,
        _ => true,
    };
    if !canonical {
        return None;
    }
    *input = &rest[width..];
    Some(value)
}

fn padding(hrp: &str) -> Result<[u8; PADDING_LEN]> {
    if hrp.len() > PADDING_LEN {
        return Err(Error::MalformedAddress(format!("HRP '{}' too long", hrp)));
    }
    let mut pad = [0u8; PADDING_LEN];
    pad[..hrp.len()].copy_from_slice(hrp.as_bytes());
    Ok(pad)
}

/// Encode items (already in ascending typecode order) under `hrp`.
pub(crate) fn encode(hrp: &str, items: &[Item]) -> Result<String> {
    let mut payload = Vec::new();
    for (typecode, data) in items {
        write_compact_size(&mut payload, u64::from(*typecode));
        write_compact_size(&mut payload, data.len() as u64);
        payload.extend_from_slice(data);
    }
    payload.extend_from_slice(&padding(hrp)?);

    let hrp = Hrp::parse(hrp)
        .map_err(|e| Error::MalformedAddress(format!("Invalid HRP: {e}")))?;
    bech32::encode::<Bech32m>(hrp, &payload)
        .map_err(|e| Error::MalformedAddress(format!("Bech32m encode failed: {e}")))
}

/// Decode a container, checking the HRP and padding.
///
/// Items must appear in strictly ascending typecode order.
pub(crate) fn decode(expected_hrp: &str, encoded: &str) -> Result<Vec<Item>> {
    let checked = CheckedHrpstring::new::<Bech32m>(encoded)
        .map_err(|e| Error::MalformedAddress(format!("Bech32m decode failed: {e}")))?;

    if checked.hrp().as_str() != expected_hrp {
        return Err(Error::MalformedAddress(format!(
            "Invalid HRP: expected '{}', got '{}'",
            expected_hrp,
            checked.hrp().as_str()
        )));
    }

    let payload: Vec<u8> = checked.byte_iter().collect();
    if payload.len() < PADDING_LEN {
        return Err(Error::MalformedAddress("container too short".to_string()));
    }
    let (body, pad) = payload.split_at(payload.len() - PADDING_LEN);
    if pad != padding(expected_hrp)? {
        return Err(Error::MalformedAddress("invalid container padding".to_string()));
    }

    let mut items = Vec::new();
    let mut cursor = body;
    let mut last_typecode: Option<u32> = None;
    while !cursor.is_empty() {
        let typecode = read_compact_size(&mut cursor)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| Error::MalformedAddress("invalid typecode".to_string()))?;
        let len = read_compact_size(&mut cursor)
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| Error::MalformedAddress("invalid item length".to_string()))?;
        if cursor.len() < len {
            return Err(Error::MalformedAddress("truncated item".to_string()));
        }

        if let Some(last) = last_typecode {
            if typecode == last {
                return Err(Error::MalformedAddress(format!(
                    "duplicate typecode {typecode:#04x}"
                )));
            }
            if typecode < last {
                return Err(Error::MalformedAddress("items out of order".to_string()));
            }
        }
        last_typecode = Some(typecode);

        let (data, rest) = cursor.split_at(len);
        items.push((typecode, data.to_vec()));
        cursor = rest;
    }

    if items.is_empty() {
        return Err(Error::MalformedAddress("container has no items".to_string()));
    }
    Ok(items)
}
