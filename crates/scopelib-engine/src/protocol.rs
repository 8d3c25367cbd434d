//! Command formatting, reply framing and reply parsing.
//!
//! Instruments in this family speak newline-terminated ASCII. Queries end in
//! `?`; a waveform fetch answers with a textual preamble followed by an
//! IEEE 488.2 definite-length block (`#<d><len><payload>`). Everything in this
//! module is pure and operates on byte buffers, so the poller can feed it
//! partial reads until [`decode_reply`] reports a complete reply.

use scopelib_core::error::{Error, Result};
use scopelib_core::model::CommandSpec;
use scopelib_core::types::{EnumMatch, NUM_CHANNELS};

/// The newline byte that terminates every command and line reply.
pub const TERMINATOR: u8 = b'\n';

/// Largest reply accepted before the exchange is abandoned.
pub const MAX_REPLY: usize = 64 * 1024;

/// How the end of a reply is recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Up to and including the first newline.
    Line,
    /// A definite-length binary block, optionally preceded by text.
    Block,
}

/// Turn a command into a query by appending `?` unless it already has one.
pub fn make_query(cmd: &str) -> String {
    if cmd.contains('?') {
        cmd.to_string()
    } else {
        format!("{cmd}?")
    }
}

/// Resolve a command template for a 1-based channel.
///
/// The channel is substituted only when the template has a `%d`
/// placeholder, and is validated against `1..=4` before anything is
/// formatted. Templates without a placeholder ignore `channel`.
pub fn format_command(spec: &CommandSpec, channel: usize) -> Result<String> {
    if spec.template.is_empty() {
        return Err(Error::Unsupported(format!("{:?}", spec.id)));
    }
    if !spec.has_channel() {
        return Ok(spec.template.to_string());
    }
    if !(1..=NUM_CHANNELS).contains(&channel) {
        return Err(Error::InvalidParameter(format!(
            "channel {channel} out of range for {:?}",
            spec.id
        )));
    }
    Ok(spec.template.replacen("%d", &channel.to_string(), 1))
}

/// Substitute a numeric argument (setup slot, not a channel) into a template.
pub fn format_argument(spec: &CommandSpec, value: i32) -> Result<String> {
    if spec.template.is_empty() {
        return Err(Error::Unsupported(format!("{:?}", spec.id)));
    }
    if spec.has_channel() {
        Ok(spec.template.replacen("%d", &value.to_string(), 1))
    } else {
        Ok(format!("{} {value}", spec.template))
    }
}

/// The text before the first newline, with a trailing `\r` removed.
pub fn first_line(reply: &str) -> &str {
    let line = reply.split('\n').next().unwrap_or("");
    line.strip_suffix('\r').unwrap_or(line)
}

/// Parse the leading integer token of a reply.
///
/// A reply such as `"1.0E+3"` is accepted and truncated toward zero, since
/// instruments report some integer settings in float notation.
pub fn leading_int(reply: &str) -> Result<i32> {
    let token = numeric_token(reply);
    if let Ok(v) = token.parse::<i32>() {
        return Ok(v);
    }
    match token.parse::<f64>() {
        Ok(v) if v.is_finite() && v.abs() <= i32::MAX as f64 => Ok(v.trunc() as i32),
        _ => Err(Error::Protocol(format!("expected integer, got {reply:?}"))),
    }
}

/// Parse the leading floating-point token of a reply.
pub fn leading_float(reply: &str) -> Result<f64> {
    numeric_token(reply)
        .parse::<f64>()
        .map_err(|_| Error::Protocol(format!("expected number, got {reply:?}")))
}

fn numeric_token(reply: &str) -> &str {
    let s = reply.trim_start();
    let end = s
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')))
        .unwrap_or(s.len());
    &s[..end]
}

/// Find the index of a reply in a keyword list.
///
/// The reply is trimmed of surrounding whitespace first. `None` means the
/// reply names no keyword; it is never mapped onto index 0.
pub fn match_keyword(reply: &str, keywords: &[&str], rule: EnumMatch) -> Option<usize> {
    let reply = first_line(reply).trim();
    if reply.is_empty() {
        return None;
    }
    match rule {
        EnumMatch::Exact => keywords.iter().position(|k| *k == reply),
        EnumMatch::Prefix => keywords.iter().position(|k| k.starts_with(reply)),
    }
}

/// The text between the first pair of double quotes.
pub fn quoted_text(reply: &str) -> Option<&str> {
    let start = reply.find('"')? + 1;
    let len = reply[start..].find('"')?;
    Some(&reply[start..start + len])
}

/// Locate the payload of a definite-length block.
///
/// `buf` must start at the `#`. Returns `(payload_offset, payload_len)`
/// relative to `buf`, or `None` when the header itself is still incomplete.
pub fn parse_block_header(buf: &[u8]) -> Result<Option<(usize, usize)>> {
    if buf.first() != Some(&b'#') {
        return Err(Error::Protocol("block header does not start with '#'".into()));
    }
    let Some(&width_byte) = buf.get(1) else {
        return Ok(None);
    };
    let width = match width_byte {
        b'1'..=b'9' => (width_byte - b'0') as usize,
        other => {
            return Err(Error::Protocol(format!(
                "invalid block header width {:?}",
                other as char
            )));
        }
    };
    let Some(digits) = buf.get(2..2 + width) else {
        return Ok(None);
    };
    let len = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| {
            Error::Protocol(format!(
                "invalid block length {:?}",
                String::from_utf8_lossy(digits)
            ))
        })?;
    Ok(Some((2 + width, len)))
}

/// Report how many bytes of `buf` form one complete reply.
///
/// Returns `Ok(None)` while more data is needed. Block replies consume a
/// trailing newline when one has already arrived; a block reply without any
/// `#` that ends in a newline is an ordinary line (the instrument answering
/// with an error message instead of data).
pub fn decode_reply(buf: &[u8], framing: Framing) -> Result<Option<usize>> {
    let line_end = || buf.iter().position(|&b| b == TERMINATOR).map(|p| p + 1);
    match framing {
        Framing::Line => Ok(line_end()),
        Framing::Block => {
            let Some(hash) = buf.iter().position(|&b| b == b'#') else {
                return Ok(line_end());
            };
            let Some((offset, len)) = parse_block_header(&buf[hash..])? else {
                return Ok(None);
            };
            let end = hash + offset + len;
            if buf.len() < end {
                return Ok(None);
            }
            if buf.get(end) == Some(&TERMINATOR) {
                Ok(Some(end + 1))
            } else {
                Ok(Some(end))
            }
        }
    }
}
