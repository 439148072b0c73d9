//! HTTP/1.x request-line signature.
//!
//! Matches `METHOD SP target ... HTTP/` without parsing anything further;
//! the request itself belongs to the HTTP engine.

use super::Verdict;

/// Undecided scans past this many buffered bytes are given up on.
pub const MAX_REQUEST_LINE_SCAN: usize = 8192;

const VERSION_TOKEN: &[u8] = b"HTTP/";

/// Highest byte value treated as a control byte inside a request line.
const MAX_CONTROL_BYTE: u8 = 19;

/// Candidate methods keyed by their first byte.
fn methods_for(first: u8) -> &'static [&'static [u8]] {
    match first {
        b'C' => &[b"CONNECT"],
        b'D' => &[b"DELETE"],
        b'G' => &[b"GET"],
        b'H' => &[b"HEAD"],
        b'L' => &[b"LOCK"],
        b'O' => &[b"OPTIONS"],
        b'P' => &[b"PATCH", b"POST", b"PURGE", b"PUT"],
        b'S' => &[b"SEARCH"],
        b'T' => &[b"TRACE"],
        b'U' => &[b"UNLOCK"],
        _ => &[],
    }
}

/// Classify `buf[offset..]` as the start of an HTTP request.
pub fn classify(buf: &[u8], offset: usize) -> Verdict {
    let Some(&first) = buf.get(offset) else {
        return Verdict::InsufficientData;
    };

    let mut partial = false;
    let mut method_len = None;
    for method in methods_for(first) {
        let available = (buf.len() - offset).min(method.len());
        if buf[offset..offset + available] != method[..available] {
            continue;
        }
        if available < method.len() {
            partial = true;
        } else {
            method_len = Some(method.len());
            break;
        }
    }

    let Some(method_len) = method_len else {
        return if partial {
            undecided(buf)
        } else {
            Verdict::NoMatch
        };
    };

    // exactly one space, then the first byte of the target
    let mut pos = offset + method_len;
    match buf.get(pos) {
        None => return undecided(buf),
        Some(b' ') => pos += 1,
        Some(_) => return Verdict::NoMatch,
    }
    match buf.get(pos) {
        None => return undecided(buf),
        Some(b' ') => return Verdict::NoMatch,
        Some(_) => {}
    }

    let rest = &buf[pos..];
    for (i, &byte) in rest.iter().enumerate() {
        if byte <= MAX_CONTROL_BYTE {
            return Verdict::NoMatch;
        }
        if rest[i..].starts_with(VERSION_TOKEN) {
            return Verdict::Match;
        }
    }
    undecided(buf)
}

fn undecided(buf: &[u8]) -> Verdict {
    if buf.len() > MAX_REQUEST_LINE_SCAN {
        Verdict::NoMatch
    } else {
        Verdict::InsufficientData
    }
}
