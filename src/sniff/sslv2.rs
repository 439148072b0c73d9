//! Legacy SSLv2 record signature.
//!
//! An SSLv2 record opens with a two-byte length whose top bit is set,
//! followed by the message type. Nothing here is ever accepted; the
//! classifier exists so these clients are rejected instead of being read as
//! raw streams.

use super::Verdict;

const LENGTH_HIGH_BIT: u8 = 0x80;
const CLIENT_HELLO: u8 = 0x01;

/// Classify `buf[offset..]` as an SSLv2 record.
pub fn classify(buf: &[u8], offset: usize) -> Verdict {
    let hdr = &buf[offset.min(buf.len())..];
    match hdr.first() {
        None => return Verdict::InsufficientData,
        Some(b) if b & LENGTH_HIGH_BIT == 0 => return Verdict::NoMatch,
        Some(_) => {}
    }
    if hdr.len() < 3 {
        return Verdict::InsufficientData;
    }
    if hdr[2] == CLIENT_HELLO {
        return Verdict::Match;
    }
    // seen in the wild: 80 03 00 04 00 00 00 14 ...
    if hdr[1] == 0x03 {
        return match hdr.get(3) {
            Some(0x04) => Verdict::Invalid,
            Some(_) => Verdict::NoMatch,
            None => Verdict::InsufficientData,
        };
    }
    Verdict::NoMatch
}
