//! Masternode broadcast payload.
//!
//! The payload handed to `masternodebroadcast decode|relay` is a fixed
//! concatenation of fields.  All integers are little-endian except the port.
//!
//! ```text
//! 01                               format marker
//! txid(rev,32) idx(4) 00 ffffffff  collateral input
//! 00*10 ffff a.b.c.d port(BE,2)    IPv4-mapped service address
//! varint len ‖ collateral pubkey
//! varint len ‖ operator pubkey
//! varint len ‖ announce signature
//! sig_time(8) protocol(4)
//! txid(rev,32) idx(4) 00 ffffffff  collateral input, again, for the ping
//! block hash(rev,32) sig_time(8)
//! varint len ‖ ping signature
//! 00 01 00 01 00                   only when protocol >= 70208
//! ```
//!
//! Building is a pure function: the same [`BroadcastRequest`] always produces
//! the same bytes.

use std::net::Ipv4Addr;

use thiserror::Error;

use super::varint;
use crate::crypto::hash::hash160;
use crate::domain::identity::{IdentityError, MasternodeIdentity};

/// Leading byte of every payload.
pub const FORMAT_MARKER: u8 = 0x01;

/// Protocol version from which [`COMPAT_SUFFIX`] is appended.
pub const COMPAT_SUFFIX_MIN_PROTOCOL: u32 = 70208;

/// Trailing bytes required by protocol versions >= 70208.
pub const COMPAT_SUFFIX: [u8; 5] = [0x00, 0x01, 0x00, 0x01, 0x00];

/// Sequence number of the collateral input.
pub const MAX_SEQUENCE: u32 = 0xffff_ffff;

/// Serialized size of one collateral input.
pub const COLLATERAL_INPUT_LEN: usize = 32 + 4 + 1 + 4;

const IPV4_MAPPED_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("{field} must be 64 hex characters")]
    BadHash { field: &'static str },
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("payload ended inside {0}")]
    Truncated(&'static str),
    #[error("unexpected byte 0x{found:02x} at offset {offset}")]
    Unexpected { offset: usize, found: u8 },
    #[error("{0} trailing bytes after the payload")]
    Trailing(usize),
}

// ── Collateral input ──────────────────────────────────────────────────────────

/// Reference to the collateral output (`txid:index`).
///
/// `txid` is kept in display order, the way explorers and RPC print it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollateralInput {
    pub txid: [u8; 32],
    pub index: u32,
}

impl CollateralInput {
    pub fn from_hex(txid_hex: &str, index: u32) -> Result<Self, BuildError> {
        Ok(Self {
            txid: parse_hash(txid_hex, "collateral txid")?,
            index,
        })
    }

    pub fn txid_hex(&self) -> String {
        hex::encode(self.txid)
    }

    /// Serialized input with an empty script and the maximum sequence.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend(self.txid.iter().rev());
        out.extend_from_slice(&self.index.to_le_bytes());
        out.push(0x00);
        out.extend_from_slice(&MAX_SEQUENCE.to_le_bytes());
    }

    /// Text form the ping signature commits to.
    pub fn ping_text(&self) -> String {
        format!(
            "CTxIn(COutPoint({}, {}), scriptSig=)",
            self.txid_hex(),
            self.index
        )
    }
}

/// Decodes a 32-byte hash written as display-order hex.
pub fn parse_hash(hex_str: &str, field: &'static str) -> Result<[u8; 32], BuildError> {
    let mut out = [0u8; 32];
    hex::decode_to_slice(hex_str.trim(), &mut out).map_err(|_| BuildError::BadHash { field })?;
    Ok(out)
}

// ── Signed strings ────────────────────────────────────────────────────────────

/// String the collateral key signs on the hardware device.
///
/// `ip:port ‖ sig_time ‖ hex(rev(hash160(collateral))) ‖
/// hex(rev(hash160(operator))) ‖ protocol_version`.
pub fn announce_message(
    ip: Ipv4Addr,
    port: u16,
    sig_time: i64,
    collateral_pubkey: &[u8],
    operator_pubkey: &[u8],
    protocol_version: u32,
) -> String {
    format!(
        "{ip}:{port}{sig_time}{}{}{protocol_version}",
        reversed_hash160_hex(collateral_pubkey),
        reversed_hash160_hex(operator_pubkey),
    )
}

/// String the operator key signs locally.
///
/// `block_hash` is the display-order hex the backend returned.
pub fn ping_message(collateral: &CollateralInput, block_hash: &[u8; 32], sig_time: i64) -> String {
    format!("{}{}{sig_time}", collateral.ping_text(), hex::encode(block_hash))
}

fn reversed_hash160_hex(pubkey: &[u8]) -> String {
    let mut h = hash160(pubkey);
    h.reverse();
    hex::encode(h)
}

// ── Request / payload ─────────────────────────────────────────────────────────

/// Chain state a broadcast is anchored to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceContext {
    /// Height of the ping block.
    pub block_height: u64,
    /// Display-order hex of the ping block hash.
    pub block_hash: String,
    /// Unix seconds.
    pub sig_time: i64,
    pub protocol_version: u32,
}

/// The two signatures a broadcast carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signatures {
    /// Collateral key over [`announce_message`], made by the device.
    pub announce: Vec<u8>,
    /// Operator key over [`ping_message`], made locally.
    pub ping: Vec<u8>,
}

/// All inputs of [`build_broadcast`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastRequest {
    pub collateral: CollateralInput,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub collateral_pubkey: Vec<u8>,
    pub operator_pubkey: Vec<u8>,
    pub announce_signature: Vec<u8>,
    pub sig_time: i64,
    pub protocol_version: u32,
    /// Display order.
    pub ping_block_hash: [u8; 32],
    pub ping_signature: Vec<u8>,
}

impl BroadcastRequest {
    pub fn from_identity(
        identity: &MasternodeIdentity,
        context: &AnnounceContext,
        collateral_pubkey: Vec<u8>,
        operator_pubkey: Vec<u8>,
        signatures: Signatures,
    ) -> Result<Self, BuildError> {
        Ok(Self {
            collateral: CollateralInput::from_hex(
                &identity.collateral_txid,
                identity.collateral_index,
            )?,
            ip: identity.ipv4()?,
            port: identity.port,
            collateral_pubkey,
            operator_pubkey,
            announce_signature: signatures.announce,
            sig_time: context.sig_time,
            protocol_version: context.protocol_version,
            ping_block_hash: parse_hash(&context.block_hash, "ping block hash")?,
            ping_signature: signatures.ping,
        })
    }
}

/// Serialized broadcast, rebuilt for every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastPayload {
    bytes: Vec<u8>,
}

impl BroadcastPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercase hex, the form the backend's RPC accepts.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// The first collateral input, right after the format marker.
    pub fn collateral_input(&self) -> &[u8] {
        let end = (1 + COLLATERAL_INPUT_LEN).min(self.bytes.len());
        self.bytes.get(1..end).unwrap_or_default()
    }
}

/// Serializes `req` in the backend's broadcast layout.
pub fn build_broadcast(req: &BroadcastRequest) -> BroadcastPayload {
    let mut out = Vec::with_capacity(
        1 + 2 * COLLATERAL_INPUT_LEN
            + 18
            + req.collateral_pubkey.len()
            + req.operator_pubkey.len()
            + req.announce_signature.len()
            + req.ping_signature.len()
            + 64,
    );

    out.push(FORMAT_MARKER);

    req.collateral.write_to(&mut out);
    out.extend_from_slice(&IPV4_MAPPED_PREFIX);
    out.extend_from_slice(&req.ip.octets());
    out.extend_from_slice(&req.port.to_be_bytes());
    write_var_bytes(&req.collateral_pubkey, &mut out);
    write_var_bytes(&req.operator_pubkey, &mut out);
    write_var_bytes(&req.announce_signature, &mut out);
    out.extend_from_slice(&req.sig_time.to_le_bytes());
    out.extend_from_slice(&req.protocol_version.to_le_bytes());

    // Ping.
    req.collateral.write_to(&mut out);
    out.extend(req.ping_block_hash.iter().rev());
    out.extend_from_slice(&req.sig_time.to_le_bytes());
    write_var_bytes(&req.ping_signature, &mut out);

    if req.protocol_version >= COMPAT_SUFFIX_MIN_PROTOCOL {
        out.extend_from_slice(&COMPAT_SUFFIX);
    }

    BroadcastPayload { bytes: out }
}

fn write_var_bytes(data: &[u8], out: &mut Vec<u8>) {
    varint::encode_into(data.len() as u64, out);
    out.extend_from_slice(data);
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Reads a payload back into its fields.
///
/// `protocol_version` in the payload decides whether the compatibility
/// suffix must follow.  Any length prefix that runs past the end of
/// `bytes` is reported as [`ParseError::Truncated`].  Decoder for
/// verifying encoded payloads.
pub fn parse_broadcast(bytes: &[u8]) -> Result<BroadcastRequest, ParseError> {
    let mut r = Reader { bytes, pos: 0 };

    r.expect(FORMAT_MARKER)?;
    let collateral = r.collateral_input()?;
    let prefix = r.take(12, "service address")?;
    if prefix != IPV4_MAPPED_PREFIX {
        return Err(ParseError::Unexpected {
            offset: r.pos - 12,
            found: prefix[0],
        });
    }
    let octets = r.array::<4>("service address")?;
    let port = u16::from_be_bytes(r.array::<2>("port")?);
    let collateral_pubkey = r.var_bytes("collateral pubkey")?;
    let operator_pubkey = r.var_bytes("operator pubkey")?;
    let announce_signature = r.var_bytes("announce signature")?;
    let sig_time = i64::from_le_bytes(r.array::<8>("sig time")?);
    let protocol_version = u32::from_le_bytes(r.array::<4>("protocol version")?);

    let ping_collateral = r.collateral_input()?;
    if ping_collateral != collateral {
        return Err(ParseError::Unexpected {
            offset: r.pos - COLLATERAL_INPUT_LEN,
            found: bytes[r.pos - COLLATERAL_INPUT_LEN],
        });
    }
    let mut ping_block_hash = r.array::<32>("ping block hash")?;
    ping_block_hash.reverse();
    let _ping_sig_time = r.array::<8>("ping sig time")?;
    let ping_signature = r.var_bytes("ping signature")?;

    if protocol_version >= COMPAT_SUFFIX_MIN_PROTOCOL {
        let suffix = r.take(COMPAT_SUFFIX.len(), "compatibility suffix")?;
        if suffix != COMPAT_SUFFIX {
            return Err(ParseError::Unexpected {
                offset: r.pos - COMPAT_SUFFIX.len(),
                found: suffix[0],
            });
        }
    }
    if r.pos != bytes.len() {
        return Err(ParseError::Trailing(bytes.len() - r.pos));
    }

    Ok(BroadcastRequest {
        collateral,
        ip: Ipv4Addr::from(octets),
        port,
        collateral_pubkey,
        operator_pubkey,
        announce_signature,
        sig_time,
        protocol_version,
        ping_block_hash,
        ping_signature,
    })
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], ParseError> {
        let end = self.pos.checked_add(n).ok_or(ParseError::Truncated(what))?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(ParseError::Truncated(what))?;
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], ParseError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    fn expect(&mut self, byte: u8) -> Result<(), ParseError> {
        let found = self.take(1, "format marker")?[0];
        if found != byte {
            return Err(ParseError::Unexpected {
                offset: self.pos - 1,
                found,
            });
        }
        Ok(())
    }

    fn var_bytes(&mut self, what: &'static str) -> Result<Vec<u8>, ParseError> {
        let rest = self.bytes.get(self.pos..).unwrap_or_default();
        let (len, used) = varint::decode(rest).map_err(|_| ParseError::Truncated(what))?;
        self.pos += used;
        let len = usize::try_from(len).map_err(|_| ParseError::Truncated(what))?;
        Ok(self.take(len, what)?.to_vec())
    }

    fn collateral_input(&mut self) -> Result<CollateralInput, ParseError> {
        let mut txid = self.array::<32>("collateral input")?;
        txid.reverse();
        let index = u32::from_le_bytes(self.array::<4>("collateral input")?);
        let script_len = self.take(1, "collateral input")?[0];
        if script_len != 0 {
            return Err(ParseError::Unexpected {
                offset: self.pos - 1,
                found: script_len,
            });
        }
        let sequence = u32::from_le_bytes(self.array::<4>("collateral input")?);
        if sequence != MAX_SEQUENCE {
            return Err(ParseError::Unexpected {
                offset: self.pos - 4,
                found: self.bytes[self.pos - 4],
            });
        }
        Ok(CollateralInput { txid, index })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const TXID: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

    fn request(protocol_version: u32) -> BroadcastRequest {
        BroadcastRequest {
            collateral: CollateralInput::from_hex(TXID, 1).unwrap(),
            ip: Ipv4Addr::new(203, 0, 113, 5),
            port: 9999,
            collateral_pubkey: vec![0x02; 33],
            operator_pubkey: vec![0x04; 65],
            announce_signature: vec![0x1f; 65],
            sig_time: 1_500_000_000,
            protocol_version,
            ping_block_hash: [0xab; 32],
            ping_signature: vec![0x1b; 65],
        }
    }

    #[test]
    fn test_collateral_input_is_reversed_txid_then_le_index() {
        let mut out = Vec::new();
        CollateralInput::from_hex(TXID, 1).unwrap().write_to(&mut out);

        assert_eq!(out.len(), COLLATERAL_INPUT_LEN);
        assert_eq!(out[0], 0xff);
        assert_eq!(out[31], 0x00);
        assert_eq!(&out[32..36], &[1, 0, 0, 0]);
        assert_eq!(out[36], 0x00);
        assert_eq!(&out[37..41], &[0xff; 4]);
    }

    #[test]
    fn test_payload_starts_with_marker_and_service_address() {
        let payload = build_broadcast(&request(70208));
        let b = payload.as_bytes();

        assert_eq!(b[0], FORMAT_MARKER);
        let addr = &b[1 + COLLATERAL_INPUT_LEN..1 + COLLATERAL_INPUT_LEN + 18];
        assert_eq!(&addr[..12], &IPV4_MAPPED_PREFIX);
        assert_eq!(&addr[12..16], &[203, 0, 113, 5]);
        // 9999 = 0x270f, big-endian.
        assert_eq!(&addr[16..], &[0x27, 0x0f]);
    }

    #[test]
    fn test_layout_length_is_deterministic() {
        let a = build_broadcast(&request(70208));
        let b = build_broadcast(&request(70208));

        assert_eq!(a, b);
        // marker + 2 inputs + addr + (1+33) + (1+65) + (1+65) + 8 + 4
        //   + hash + 8 + (1+65) + suffix
        let expected = 1 + 2 * 41 + 18 + 34 + 66 + 66 + 8 + 4 + 32 + 8 + 66 + 5;
        assert_eq!(a.len(), expected);
    }

    #[test]
    fn test_suffix_depends_on_protocol_version() {
        let old = build_broadcast(&request(70207));
        let new = build_broadcast(&request(70208));
        let newer = build_broadcast(&request(70300));

        assert_eq!(new.len(), old.len() + 5);
        assert_eq!(newer.len(), old.len() + 5);
        assert!(new.as_bytes().ends_with(&COMPAT_SUFFIX));
        assert!(!old.as_bytes().ends_with(&COMPAT_SUFFIX));
    }

    #[test]
    fn test_parse_recovers_every_field() {
        let req = request(70208);
        let parsed = parse_broadcast(build_broadcast(&req).as_bytes()).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn test_parse_rejects_trailing_garbage() {
        let mut bytes = build_broadcast(&request(70207)).as_bytes().to_vec();
        bytes.push(0x00);
        assert_eq!(parse_broadcast(&bytes), Err(ParseError::Trailing(1)));
    }

    // ── Hostile length prefixes ──

    #[test]
    fn test_parse_rejects_length_prefix_past_usize_max() {
        // Arrange: a valid head, then a collateral pubkey claiming u64::MAX bytes.
        let mut bytes = vec![FORMAT_MARKER];
        CollateralInput::from_hex(TXID, 1).unwrap().write_to(&mut bytes);
        bytes.extend_from_slice(&IPV4_MAPPED_PREFIX);
        bytes.extend_from_slice(&[203, 0, 113, 5, 0x27, 0x0f]);
        bytes.push(0xff);
        bytes.extend_from_slice(&[0xff; 8]);

        // Act
        let result = parse_broadcast(&bytes);

        // Assert
        assert_eq!(result, Err(ParseError::Truncated("collateral pubkey")));
    }

    #[test]
    fn test_parse_rejects_length_prefix_longer_than_input() {
        // Arrange: the announce signature claims more bytes than remain.
        let mut bytes = vec![FORMAT_MARKER];
        CollateralInput::from_hex(TXID, 1).unwrap().write_to(&mut bytes);
        bytes.extend_from_slice(&IPV4_MAPPED_PREFIX);
        bytes.extend_from_slice(&[203, 0, 113, 5, 0x27, 0x0f]);
        bytes.push(33);
        bytes.extend_from_slice(&[0x02; 33]);
        bytes.push(65);
        bytes.extend_from_slice(&[0x04; 65]);
        bytes.push(65);
        bytes.extend_from_slice(&[0x1f; 10]);

        // Act
        let result = parse_broadcast(&bytes);

        // Assert
        assert_eq!(result, Err(ParseError::Truncated("announce signature")));
    }

    // ── Signed strings ──

    #[test]
    fn test_ping_message_format() {
        let input = CollateralInput::from_hex(TXID, 1).unwrap();
        let hash = [0xab; 32];

        let msg = ping_message(&input, &hash, 1_500_000_000);

        assert_eq!(
            msg,
            format!(
                "CTxIn(COutPoint({TXID}, 1), scriptSig=){}1500000000",
                "ab".repeat(32)
            )
        );
    }

    #[test]
    fn test_announce_message_format() {
        let msg = announce_message(
            Ipv4Addr::new(203, 0, 113, 5),
            9999,
            42,
            &[2; 33],
            &[4; 65],
            70208,
        );

        assert!(msg.starts_with("203.0.113.5:999942"));
        assert!(msg.ends_with("70208"));
        // two 40-char reversed key hashes between time and version
        assert_eq!(msg.len(), "203.0.113.5:999942".len() + 80 + 5);
    }

    #[test]
    fn test_bad_txid_is_rejected() {
        assert_eq!(
            CollateralInput::from_hex("zz", 0),
            Err(BuildError::BadHash {
                field: "collateral txid"
            })
        );
    }
}
