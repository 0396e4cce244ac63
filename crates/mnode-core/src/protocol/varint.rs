//! Variable-length integers ("compact size").
//!
//! | value range              | encoding                  |
//! |--------------------------|---------------------------|
//! | `0 ..= 252`              | one byte                  |
//! | `253 ..= 0xffff`         | `fd` + u16 little-endian  |
//! | `0x1_0000 ..= 0xffff_ffff` | `fe` + u32 little-endian |
//! | larger                   | `ff` + u64 little-endian  |

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VarIntError {
    #[error("input ended before the varint was complete")]
    Truncated,
    #[error("value {0} uses a longer encoding than necessary")]
    NonCanonical(u64),
}

/// Appends the encoding of `value` to `out`.
pub fn encode_into(value: u64, out: &mut Vec<u8>) {
    match value {
        0..=252 => out.push(value as u8),
        253..=0xffff => {
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

pub fn encode(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    encode_into(value, &mut out);
    out
}

/// Decodes a varint from the front of `input`, returning the value and the
/// number of bytes consumed.
pub fn decode(input: &[u8]) -> Result<(u64, usize), VarIntError> {
    let (&marker, rest) = input.split_first().ok_or(VarIntError::Truncated)?;
    let (value, width, min) = match marker {
        0xfd => (read_le(rest, 2)?, 2, 253),
        0xfe => (read_le(rest, 4)?, 4, 0x1_0000),
        0xff => (read_le(rest, 8)?, 8, 0x1_0000_0000),
        small => return Ok((u64::from(small), 1)),
    };
    if value < min {
        return Err(VarIntError::NonCanonical(value));
    }
    Ok((value, 1 + width))
}

fn read_le(bytes: &[u8], width: usize) -> Result<u64, VarIntError> {
    let slice = bytes.get(..width).ok_or(VarIntError::Truncated)?;
    Ok(slice
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}
