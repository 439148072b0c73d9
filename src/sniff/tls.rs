//! TLS ClientHello signature.
//!
//! TLS record format:
//! - Byte 0: Content type (0x16 = Handshake)
//! - Byte 1-2: Version (0x03 0x0X for SSL3/TLS)
//! - Byte 3-4: Length (big-endian)
//! - Byte 5: Handshake type (0x01 = ClientHello)

use super::Verdict;

pub const RECORD_TYPE_HANDSHAKE: u8 = 0x16;
pub const VERSION_MAJOR: u8 = 0x03;
pub const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;

const HEADER_LEN: usize = 6;

/// Classify `buf[offset..]` as a TLS ClientHello record.
///
/// A handshake record that is not a ClientHello is `Invalid`: it is clearly
/// TLS but nothing downstream can use it.
pub fn classify(buf: &[u8], offset: usize) -> Verdict {
    let hdr = &buf[offset.min(buf.len())..];
    match hdr.first() {
        None => return Verdict::InsufficientData,
        Some(&RECORD_TYPE_HANDSHAKE) => {}
        Some(_) => return Verdict::NoMatch,
    }
    match hdr.get(1) {
        Some(&VERSION_MAJOR) | None => {}
        Some(_) => return Verdict::NoMatch,
    }
    if hdr.len() < HEADER_LEN {
        return Verdict::InsufficientData;
    }
    if hdr[5] == HANDSHAKE_CLIENT_HELLO {
        Verdict::Match
    } else {
        Verdict::Invalid
    }
}
