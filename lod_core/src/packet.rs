//! TilePacket: the self-describing binary record stored as the at-rest
//! value in both cache tiers.
//!
//! Layout (little-endian throughout):
//!
//! ```text
//! offset  size   field
//! 0       32     SHA-256 checksum of bytes [32..end]
//! 32      4      tile-data length N (u32)
//! 36      1      header count H (u8)
//! 37..    var    H header entries: u16 key-len, key, u16 value-len, value
//! end-N   N      raw tile bytes
//! ```
//!
//! A packet is corrupt if it is shorter than 33 bytes, its checksum doesn't
//! match, or the header block doesn't parse to exactly H entries ending
//! precisely where the tile bytes begin.

use crate::Blob;
use anyhow::{Result, bail};
use sha2::{Digest, Sha256};

const CHECKSUM_LEN: usize = 32;
const MAX_HEADERS: usize = 255;
const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// One header entry. Keys and values are arbitrary octets, not necessarily
/// valid UTF-8 — callers that know their headers are ASCII HTTP header
/// names/values can convert freely, but the packet format makes no such
/// assumption.
pub type Header = (Vec<u8>, Vec<u8>);

/// A validated, self-describing tile record: a header set plus tile bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TilePacket {
	headers: Vec<Header>,
	tile: Vec<u8>,
}

impl TilePacket {
	/// Builds a packet from raw tile bytes and a header set.
	///
	/// # Errors
	/// Rejects more than 255 headers or a key/value longer than 65535 bytes:
	/// the on-disk layout has no way to represent either.
	pub fn encode(tile: impl Into<Vec<u8>>, headers: impl IntoIterator<Item = Header>) -> Result<Self> {
		let headers: Vec<Header> = headers.into_iter().collect();
		if headers.len() > MAX_HEADERS {
			bail!("TilePacket cannot carry more than {MAX_HEADERS} headers, got {}", headers.len());
		}
		for (key, value) in &headers {
			if key.len() > MAX_FIELD_LEN || value.len() > MAX_FIELD_LEN {
				bail!("TilePacket header field exceeds {MAX_FIELD_LEN} bytes");
			}
		}
		Ok(Self { headers, tile: tile.into() })
	}

	/// An empty packet (no headers, no tile bytes) — cached for a `204 No
	/// Content` upstream response so repeated misses don't stampede upstream.
	pub fn empty() -> Self {
		Self { headers: Vec::new(), tile: Vec::new() }
	}

	pub fn tile_bytes(&self) -> &[u8] {
		&self.tile
	}

	pub fn headers(&self) -> &[Header] {
		&self.headers
	}

	pub fn is_empty_tile(&self) -> bool {
		self.tile.is_empty()
	}

	/// Serializes this packet to its on-disk layout.
	pub fn to_bytes(&self) -> Blob {
		let mut body = Vec::with_capacity(5 + self.tile.len());
		body.extend_from_slice(&(self.tile.len() as u32).to_le_bytes());
		body.push(self.headers.len() as u8);
		for (key, value) in &self.headers {
			body.extend_from_slice(&(key.len() as u16).to_le_bytes());
			body.extend_from_slice(key);
			body.extend_from_slice(&(value.len() as u16).to_le_bytes());
			body.extend_from_slice(value);
		}
		body.extend_from_slice(&self.tile);

		let mut out = Vec::with_capacity(CHECKSUM_LEN + body.len());
		out.extend_from_slice(Sha256::digest(&body).as_slice());
		out.extend_from_slice(&body);
		Blob::from(out)
	}

	/// Returns `true` iff `bytes` is at least 33 bytes and its checksum
	/// field matches the SHA-256 of everything that follows it. Total
	/// function: never panics, regardless of input.
	#[must_use]
	pub fn validate(bytes: &[u8]) -> bool {
		if bytes.len() < CHECKSUM_LEN + 1 {
			return false;
		}
		let (checksum, body) = bytes.split_at(CHECKSUM_LEN);
		checksum == Sha256::digest(body).as_slice()
	}

	/// Parses a byte buffer into a [`TilePacket`], validating it first.
	/// Returns `None` on any corruption — short buffer, bad checksum, or a
	/// header block that doesn't parse exactly.
	#[must_use]
	pub fn decode(bytes: &[u8]) -> Option<Self> {
		if !Self::validate(bytes) {
			return None;
		}
		let body = &bytes[CHECKSUM_LEN..];
		if body.len() < 5 {
			return None;
		}
		let tile_len = u32::from_le_bytes(body[0..4].try_into().ok()?) as usize;
		let header_count = body[4] as usize;

		let mut cursor = 5usize;
		let mut headers = Vec::with_capacity(header_count);
		for _ in 0..header_count {
			let key_len = read_u16(body, cursor)?;
			cursor += 2;
			let key = body.get(cursor..cursor + key_len)?.to_vec();
			cursor += key_len;
			let value_len = read_u16(body, cursor)?;
			cursor += 2;
			let value = body.get(cursor..cursor + value_len)?.to_vec();
			cursor += value_len;
			headers.push((key, value));
		}

		let tile_start = body.len().checked_sub(tile_len)?;
		if cursor != tile_start {
			// header block must occupy exactly [37 .. end-N)
			return None;
		}
		let tile = body[tile_start..].to_vec();
		Some(Self { headers, tile })
	}
}

fn read_u16(buf: &[u8], at: usize) -> Option<usize> {
	buf.get(at..at + 2).map(|s| u16::from_le_bytes([s[0], s[1]]) as usize)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn h(key: &str, value: &str) -> Header {
		(key.as_bytes().to_vec(), value.as_bytes().to_vec())
	}

	#[test]
	fn roundtrip_with_headers() {
		let packet = TilePacket::encode(
			b"some tile bytes".to_vec(),
			vec![h("Content-Type", "application/x-protobuf"), h("Content-Encoding", "gzip")],
		)
		.unwrap();
		let bytes = packet.to_bytes();
		let decoded = TilePacket::decode(bytes.as_slice()).unwrap();
		assert_eq!(decoded.tile_bytes(), b"some tile bytes");
		let mut got = decoded.headers().to_vec();
		let mut want = packet.headers().to_vec();
		got.sort();
		want.sort();
		assert_eq!(got, want);
	}

	#[test]
	fn roundtrip_empty() {
		let packet = TilePacket::empty();
		let bytes = packet.to_bytes();
		let decoded = TilePacket::decode(bytes.as_slice()).unwrap();
		assert!(decoded.is_empty_tile());
		assert!(decoded.headers().is_empty());
	}

	#[test]
	fn validate_rejects_short_buffers() {
		assert!(!TilePacket::validate(&[]));
		assert!(!TilePacket::validate(&[0u8; 10]));
	}

	#[test]
	fn validate_detects_bit_flip() {
		let packet = TilePacket::encode(b"abc".to_vec(), vec![h("x", "y")]).unwrap();
		let mut bytes = packet.to_bytes().into_vec();
		assert!(TilePacket::validate(&bytes));
		let last = bytes.len() - 1;
		bytes[last] ^= 0x01;
		assert!(!TilePacket::validate(&bytes));
	}

	#[test]
	fn decode_rejects_corrupt_header_block() {
		let packet = TilePacket::encode(b"abcdef".to_vec(), vec![h("k", "v")]).unwrap();
		let mut bytes = packet.to_bytes().into_vec();
		// Flip a byte inside the header-count field and fix the checksum so
		// validate() passes but the header block no longer parses cleanly.
		bytes[36] = 200; // bogus header count
		let body = bytes[32..].to_vec();
		let checksum = Sha256::digest(&body);
		bytes[0..32].copy_from_slice(&checksum);
		assert!(TilePacket::validate(&bytes));
		assert!(TilePacket::decode(&bytes).is_none());
	}

	#[test]
	fn encode_rejects_too_many_headers() {
		let headers: Vec<Header> = (0..256).map(|i| h(&format!("k{i}"), "v")).collect();
		assert!(TilePacket::encode(b"x".to_vec(), headers).is_err());
	}

	#[test]
	fn encode_rejects_oversized_field() {
		let huge_value = vec![0u8; MAX_FIELD_LEN + 1];
		assert!(TilePacket::encode(b"x".to_vec(), vec![(b"k".to_vec(), huge_value)]).is_err());
	}
}
