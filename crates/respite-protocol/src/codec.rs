//! Stateless RESP2/RESP3 wire codec.
//!
//! [`decode`] turns the bytes at a frame boundary into a [`RespValue`] whose
//! byte payloads borrow from the input, and reports how many bytes the frame
//! used. [`frame_len`] walks the same grammar without building aggregates,
//! which lets buffering read loops check partial input without allocating.
//! [`encode`] writes the canonical form of a frame into any [`BufMut`].
//!
//! When the input stops short of a full frame both decoders return
//! [`ProtocolError::Incomplete`] and consume nothing; callers buffer more
//! bytes and retry from the same frame start.

use std::borrow::Cow;
use std::fmt::{self, Write as _};

use bytes::BufMut;

use crate::{FrameKind, ProtocolError, RespValue};

/// Deepest aggregate nesting the decoder accepts.
pub const MAX_DEPTH: usize = 512;

/// Largest bulk payload the decoder accepts (512 MiB, the server default).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Longest CRLF-terminated line the decoder waits for.
pub const MAX_LINE_LEN: usize = 64 * 1024;

const CRLF: &[u8] = b"\r\n";

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decodes one frame from the start of `input`.
///
/// Returns the frame and the number of bytes it occupied. Trailing bytes
/// after the frame are left alone.
///
/// # Errors
/// [`ProtocolError::Incomplete`] if `input` holds only a prefix of a frame,
/// any other variant if the bytes violate the protocol.
pub fn decode(input: &[u8]) -> Result<(RespValue<'_>, usize), ProtocolError> {
    let mut parser = Parser { input, pos: 0 };
    let value = parser.frame(0)?;
    Ok((value, parser.pos))
}

/// Returns the length of the complete frame at the start of `input`.
///
/// Performs the same validation as [`decode`], so a successful `frame_len`
/// guarantees that decoding `&input[..len]` succeeds.
pub fn frame_len(input: &[u8]) -> Result<usize, ProtocolError> {
    let mut parser = Parser { input, pos: 0 };
    parser.skip(0)?;
    Ok(parser.pos)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

/// A frame header: its kind and the rest of its first line.
struct Header<'a> {
    kind: FrameKind,
    line: &'a [u8],
}

impl<'a> Parser<'a> {
    fn frame(&mut self, depth: usize) -> Result<RespValue<'a>, ProtocolError> {
        let header = self.header()?;
        if !header.kind.is_aggregate() {
            return self.scalar(header);
        }

        let Some(count) = self.count(&header, depth)? else {
            return Ok(RespValue::Array(None));
        };
        let value = match header.kind {
            FrameKind::Map => {
                let mut pairs = Vec::with_capacity(self.capacity_hint(count, 2));
                for _ in 0..count {
                    let key = self.frame(depth + 1)?;
                    let value = self.frame(depth + 1)?;
                    pairs.push((key, value));
                }
                RespValue::Map(pairs)
            }
            kind => {
                let mut items = Vec::with_capacity(self.capacity_hint(count, 1));
                for _ in 0..count {
                    items.push(self.frame(depth + 1)?);
                }
                match kind {
                    FrameKind::Set => RespValue::Set(items),
                    FrameKind::Push => RespValue::Push(items),
                    _ => RespValue::Array(Some(items)),
                }
            }
        };
        Ok(value)
    }

    fn skip(&mut self, depth: usize) -> Result<(), ProtocolError> {
        let header = self.header()?;
        if !header.kind.is_aggregate() {
            return self.scalar(header).map(drop);
        }

        let Some(count) = self.count(&header, depth)? else {
            return Ok(());
        };
        let children = if header.kind == FrameKind::Map {
            count.checked_mul(2).ok_or(ProtocolError::InvalidLength(i64::MAX))?
        } else {
            count
        };
        for _ in 0..children {
            self.skip(depth + 1)?;
        }
        Ok(())
    }

    fn header(&mut self) -> Result<Header<'a>, ProtocolError> {
        let Some(&marker) = self.input.get(self.pos) else {
            return Err(ProtocolError::Incomplete);
        };
        let kind = FrameKind::from_marker(marker).ok_or(ProtocolError::InvalidMarker(marker))?;
        let line = self.line(self.pos + 1)?;
        Ok(Header { kind, line })
    }

    /// Reads the CRLF-terminated line starting at `start` and moves past it.
    fn line(&mut self, start: usize) -> Result<&'a [u8], ProtocolError> {
        let rest = &self.input[start.min(self.input.len())..];
        let Some(cr) = memchr::memchr(b'\r', rest) else {
            if rest.len() > MAX_LINE_LEN {
                return Err(ProtocolError::LineTooLong {
                    len: rest.len(),
                    max: MAX_LINE_LEN,
                });
            }
            return Err(ProtocolError::Incomplete);
        };
        if cr > MAX_LINE_LEN {
            return Err(ProtocolError::LineTooLong {
                len: cr,
                max: MAX_LINE_LEN,
            });
        }
        match rest.get(cr + 1) {
            None => Err(ProtocolError::Incomplete),
            Some(b'\n') => {
                self.pos = start + cr + 2;
                Ok(&rest[..cr])
            }
            Some(_) => Err(ProtocolError::MissingCrlf),
        }
    }

    /// Reads a `len` byte payload plus its CRLF and moves past both.
    fn blob(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        let start = self.pos;
        let end = start + len;
        if self.input.len() < end + CRLF.len() {
            return Err(ProtocolError::Incomplete);
        }
        if &self.input[end..end + CRLF.len()] != CRLF {
            return Err(ProtocolError::MissingCrlf);
        }
        self.pos = end + CRLF.len();
        Ok(&self.input[start..end])
    }

    /// Parses an aggregate count. `None` is the `*-1` null array.
    fn count(&self, header: &Header<'_>, depth: usize) -> Result<Option<usize>, ProtocolError> {
        if depth >= MAX_DEPTH {
            return Err(ProtocolError::NestingTooDeep(MAX_DEPTH));
        }
        length(header.line, header.kind == FrameKind::Array)
    }

    /// Bounds up-front allocation by what the remaining input could hold.
    fn capacity_hint(&self, count: usize, per_item: usize) -> usize {
        // The smallest possible child frame is three bytes (`_\r\n`).
        let remaining = self.input.len().saturating_sub(self.pos);
        count.min(remaining / (3 * per_item))
    }

    fn scalar(&mut self, header: Header<'a>) -> Result<RespValue<'a>, ProtocolError> {
        let line = header.line;
        let value = match header.kind {
            FrameKind::Null => {
                if !line.is_empty() {
                    return Err(ProtocolError::InvalidNull);
                }
                RespValue::Null
            }
            FrameKind::SimpleString => RespValue::SimpleString(Cow::Borrowed(line)),
            FrameKind::Error => RespValue::Error(Cow::Borrowed(line)),
            FrameKind::Integer => RespValue::Integer(parse_i64(line)?),
            FrameKind::Double => RespValue::Double(parse_double(line)?),
            FrameKind::Boolean => match line {
                b"t" => RespValue::Boolean(true),
                b"f" => RespValue::Boolean(false),
                _ => return Err(ProtocolError::InvalidBoolean),
            },
            FrameKind::BigNumber => {
                if !is_big_number(line) {
                    return Err(ProtocolError::InvalidBigNumber);
                }
                RespValue::BigNumber(Cow::Borrowed(line))
            }
            FrameKind::BulkString => match bulk_length(line, true)? {
                None => RespValue::BulkString(None),
                Some(len) => RespValue::BulkString(Some(Cow::Borrowed(self.blob(len)?))),
            },
            FrameKind::BulkError => {
                let len = bulk_length(line, false)?.unwrap_or_default();
                RespValue::BulkError(Cow::Borrowed(self.blob(len)?))
            }
            FrameKind::VerbatimString => {
                let len = bulk_length(line, false)?.unwrap_or_default();
                let payload = self.blob(len)?;
                if payload.len() < 4 || payload[3] != b':' {
                    return Err(ProtocolError::InvalidVerbatim);
                }
                RespValue::VerbatimString {
                    format: [payload[0], payload[1], payload[2]],
                    text: Cow::Borrowed(&payload[4..]),
                }
            }
            FrameKind::Array | FrameKind::Map | FrameKind::Set | FrameKind::Push => {
                unreachable!("aggregates are handled by the caller")
            }
        };
        Ok(value)
    }
}

/// Parses a length or count prefix. `-1` maps to `None` when `nullable`.
fn length(line: &[u8], nullable: bool) -> Result<Option<usize>, ProtocolError> {
    // Plain decimal only: no `+` sign, no leading zeros.
    if matches!(line, [b'+', ..] | [b'0', _, ..] | [b'-', b'0', ..]) {
        return Err(ProtocolError::InvalidInteger);
    }
    match parse_i64(line)? {
        -1 if nullable => Ok(None),
        n if n < 0 => Err(ProtocolError::InvalidLength(n)),
        n => usize::try_from(n)
            .map(Some)
            .map_err(|_| ProtocolError::InvalidLength(n)),
    }
}

fn bulk_length(line: &[u8], nullable: bool) -> Result<Option<usize>, ProtocolError> {
    let len = length(line, nullable)?;
    if let Some(len) = len {
        if len > MAX_BULK_LEN {
            return Err(ProtocolError::BulkTooLarge {
                len,
                max: MAX_BULK_LEN,
            });
        }
    }
    Ok(len)
}

fn parse_i64(line: &[u8]) -> Result<i64, ProtocolError> {
    let (negative, digits) = match line {
        [b'-', rest @ ..] => (true, rest),
        [b'+', rest @ ..] => (false, rest),
        _ => (false, line),
    };
    if digits.is_empty() {
        return Err(ProtocolError::InvalidInteger);
    }

    // Accumulate negatively so i64::MIN parses without overflow.
    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(ProtocolError::InvalidInteger);
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_sub(i64::from(b - b'0')))
            .ok_or(ProtocolError::InvalidInteger)?;
    }
    if negative {
        Ok(value)
    } else {
        value.checked_neg().ok_or(ProtocolError::InvalidInteger)
    }
}

fn parse_double(line: &[u8]) -> Result<f64, ProtocolError> {
    match line {
        b"inf" | b"+inf" => return Ok(f64::INFINITY),
        b"-inf" => return Ok(f64::NEG_INFINITY),
        b"nan" | b"-nan" => return Ok(f64::NAN),
        _ => {}
    }
    std::str::from_utf8(line)
        .ok()
        .filter(|text| !text.is_empty())
        .and_then(|text| text.parse::<f64>().ok())
        .ok_or(ProtocolError::InvalidDouble)
}

fn is_big_number(line: &[u8]) -> bool {
    let digits = match line {
        [b'-' | b'+', rest @ ..] => rest,
        _ => line,
    };
    !digits.is_empty() && digits.iter().all(u8::is_ascii_digit)
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Writes the canonical wire form of `value` into `out`.
///
/// # Errors
/// Returns [`ProtocolError::InvalidSimpleString`] when a simple string,
/// error or big number contains CR or LF, and
/// [`ProtocolError::InvalidBigNumber`] when a big number is not a run of
/// digits. `out` may then hold a partial frame; callers that reuse the
/// buffer truncate it back.
pub fn encode<B: BufMut>(value: &RespValue<'_>, out: &mut B) -> Result<(), ProtocolError> {
    match value {
        RespValue::Null => out.put_slice(b"_\r\n"),
        RespValue::SimpleString(data) => put_line(out, b'+', data)?,
        RespValue::Error(data) => put_line(out, b'-', data)?,
        RespValue::Integer(n) => {
            out.put_u8(b':');
            put_decimal(out, *n);
            out.put_slice(CRLF);
        }
        RespValue::BulkString(None) => out.put_slice(b"$-1\r\n"),
        RespValue::BulkString(Some(data)) => put_blob(out, b'$', &[], data),
        RespValue::Array(None) => out.put_slice(b"*-1\r\n"),
        RespValue::Array(Some(items)) => put_aggregate(out, b'*', items)?,
        RespValue::Double(d) => put_double(out, *d),
        RespValue::Boolean(b) => out.put_slice(if *b { b"#t\r\n" } else { b"#f\r\n" }),
        RespValue::BigNumber(data) => {
            if !is_big_number(data) {
                return Err(ProtocolError::InvalidBigNumber);
            }
            put_line(out, b'(', data)?;
        }
        RespValue::BulkError(data) => put_blob(out, b'!', &[], data),
        RespValue::VerbatimString { format, text } => {
            let prefix = [format[0], format[1], format[2], b':'];
            put_blob(out, b'=', &prefix, text);
        }
        RespValue::Map(pairs) => {
            put_header(out, b'%', pairs.len());
            for (key, value) in pairs {
                encode(key, out)?;
                encode(value, out)?;
            }
        }
        RespValue::Set(items) => put_aggregate(out, b'~', items)?,
        RespValue::Push(items) => put_aggregate(out, b'>', items)?,
    }
    Ok(())
}

fn put_line<B: BufMut>(out: &mut B, marker: u8, data: &[u8]) -> Result<(), ProtocolError> {
    if memchr::memchr2(b'\r', b'\n', data).is_some() {
        return Err(ProtocolError::InvalidSimpleString);
    }
    out.put_u8(marker);
    out.put_slice(data);
    out.put_slice(CRLF);
    Ok(())
}

fn put_blob<B: BufMut>(out: &mut B, marker: u8, prefix: &[u8], data: &[u8]) {
    put_header(out, marker, prefix.len() + data.len());
    out.put_slice(prefix);
    out.put_slice(data);
    out.put_slice(CRLF);
}

fn put_aggregate<B: BufMut>(
    out: &mut B,
    marker: u8,
    items: &[RespValue<'_>],
) -> Result<(), ProtocolError> {
    put_header(out, marker, items.len());
    for item in items {
        encode(item, out)?;
    }
    Ok(())
}

fn put_header<B: BufMut>(out: &mut B, marker: u8, len: usize) {
    out.put_u8(marker);
    put_decimal(out, len as i64);
    out.put_slice(CRLF);
}

fn put_decimal<B: BufMut>(out: &mut B, value: i64) {
    // Digits go into a stack buffer back to front; u64::MAX has 20.
    let mut buf = [0u8; 20];
    let mut idx = buf.len();
    let mut rest = value.unsigned_abs();
    loop {
        idx -= 1;
        buf[idx] = b'0' + (rest % 10) as u8;
        rest /= 10;
        if rest == 0 {
            break;
        }
    }
    if value < 0 {
        out.put_u8(b'-');
    }
    out.put_slice(&buf[idx..]);
}

fn put_double<B: BufMut>(out: &mut B, value: f64) {
    out.put_u8(b',');
    if value.is_nan() {
        out.put_slice(b"nan");
    } else if value.is_infinite() {
        out.put_slice(if value > 0.0 { &b"inf"[..] } else { &b"-inf"[..] });
    } else {
        let mut text = StackText::new();
        // Plain notation for everyday magnitudes, exponent form otherwise so
        // the text stays short. Both forms round-trip exactly.
        let magnitude = value.abs();
        let written = if magnitude == 0.0 || (1e-5..1e16).contains(&magnitude) {
            write!(text, "{value}")
        } else {
            write!(text, "{value:e}")
        };
        debug_assert!(written.is_ok(), "f64 text fits in the stack buffer");
        out.put_slice(text.as_bytes());
    }
    out.put_slice(CRLF);
}

/// Fixed-size text sink so formatting a double does not allocate.
struct StackText {
    buf: [u8; 64],
    len: usize,
}

impl StackText {
    fn new() -> Self {
        Self { buf: [0; 64], len: 0 }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl fmt::Write for StackText {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.len + s.len();
        if end > self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.len..end].copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RespCodec
// ---------------------------------------------------------------------------

/// A `tokio_util` codec speaking RESP.
///
/// Adapts the stateless functions above to `FramedRead`/`FramedWrite`, for
/// hosts that already own a framed reader/writer pipeline. Decoded frames
/// are detached from the read buffer with [`RespValue::into_owned`] because
/// the pipeline reuses that buffer as soon as `decode` returns.
#[cfg(feature = "codec")]
#[derive(Debug, Clone, Copy, Default)]
pub struct RespCodec;

#[cfg(feature = "codec")]
impl tokio_util::codec::Decoder for RespCodec {
    type Item = RespValue<'static>;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut bytes::BytesMut) -> Result<Option<Self::Item>, ProtocolError> {
        let len = match frame_len(src) {
            Ok(len) => len,
            Err(ProtocolError::Incomplete) => return Ok(None),
            Err(e) => return Err(e),
        };
        let frame = src.split_to(len);
        let (value, _) = decode(&frame)?;
        Ok(Some(value.into_owned()))
    }

    fn decode_eof(&mut self, src: &mut bytes::BytesMut) -> Result<Option<Self::Item>, ProtocolError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream ended mid-frame",
            ))),
        }
    }
}

#[cfg(feature = "codec")]
impl<'v, 'a> tokio_util::codec::Encoder<&'v RespValue<'a>> for RespCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &'v RespValue<'a>, dst: &mut bytes::BytesMut) -> Result<(), ProtocolError> {
        let start = dst.len();
        encode(item, dst).inspect_err(|_| dst.truncate(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: &RespValue<'_>) -> Vec<u8> {
        let mut out = Vec::new();
        encode(value, &mut out).expect("encode should succeed");
        out
    }

    fn samples() -> Vec<RespValue<'static>> {
        vec![
            RespValue::Null,
            RespValue::simple("PONG"),
            RespValue::error("ERR unknown command"),
            RespValue::Integer(0),
            RespValue::Integer(i64::MIN),
            RespValue::Integer(i64::MAX),
            RespValue::bulk(""),
            RespValue::bulk("binary\r\nsafe\0"),
            RespValue::null_bulk(),
            RespValue::null_array(),
            RespValue::array(Vec::new()),
            RespValue::Double(3.25),
            RespValue::Double(-1e300),
            RespValue::Double(f64::INFINITY),
            RespValue::Boolean(true),
            RespValue::Boolean(false),
            RespValue::BigNumber(Cow::Borrowed(&b"-3492890328409238509324850943850943825024385"[..])),
            RespValue::BulkError(Cow::Borrowed(&b"SYNTAX invalid syntax"[..])),
            RespValue::VerbatimString {
                format: *b"txt",
                text: Cow::Borrowed(&b"Some string"[..]),
            },
            RespValue::Map(vec![
                (RespValue::simple("first"), RespValue::Integer(1)),
                (RespValue::bulk("second"), RespValue::null_bulk()),
            ]),
            RespValue::Set(vec![RespValue::Boolean(true), RespValue::Integer(2)]),
            RespValue::Push(vec![
                RespValue::bulk("message"),
                RespValue::bulk("channel"),
                RespValue::array(vec![RespValue::Null, RespValue::Double(0.5)]),
            ]),
        ]
    }

    // -- Scenarios ---------------------------------------------------------

    #[test]
    fn test_pong_scenario() {
        assert_eq!(encoded(&RespValue::simple("PONG")), b"+PONG\r\n");
        let (value, used) = decode(b"+PONG\r\n").unwrap();
        assert_eq!(value, RespValue::simple("PONG"));
        assert_eq!(used, 7);
    }

    #[test]
    fn test_null_bulk_scenario() {
        assert_eq!(encoded(&RespValue::null_bulk()), b"$-1\r\n");
        let (value, _) = decode(b"$-1\r\n").unwrap();
        assert_eq!(value, RespValue::BulkString(None));
    }

    #[test]
    fn test_integer_array_scenario() {
        let value = RespValue::array(vec![RespValue::Integer(1), RespValue::Integer(2)]);
        assert_eq!(encoded(&value), b"*2\r\n:1\r\n:2\r\n");
    }

    #[test]
    fn test_encodes_command() {
        let value = RespValue::command(["GET", "key"]);
        assert_eq!(encoded(&value), b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n");
    }

    // -- Properties --------------------------------------------------------

    #[test]
    fn test_round_trip() {
        for value in samples() {
            let bytes = encoded(&value);
            let (decoded, used) = decode(&bytes).unwrap();
            assert_eq!(decoded, value, "round trip of {bytes:?}");
            assert_eq!(used, bytes.len());
            assert_eq!(frame_len(&bytes).unwrap(), bytes.len());
        }
    }

    #[test]
    fn test_nan_round_trips_as_nan() {
        let bytes = encoded(&RespValue::Double(f64::NAN));
        assert_eq!(bytes, b",nan\r\n");
        match decode(&bytes).unwrap().0 {
            RespValue::Double(d) => assert!(d.is_nan()),
            other => panic!("expected double, got {other:?}"),
        }
    }

    #[test]
    fn test_every_strict_prefix_is_incomplete() {
        for value in samples() {
            let bytes = encoded(&value);
            for end in 0..bytes.len() {
                let prefix = &bytes[..end];
                assert!(
                    matches!(decode(prefix), Err(ProtocolError::Incomplete)),
                    "decode of prefix {prefix:?} should be incomplete"
                );
                assert!(
                    matches!(frame_len(prefix), Err(ProtocolError::Incomplete)),
                    "frame_len of prefix {prefix:?} should be incomplete"
                );
            }
            assert_eq!(decode(&bytes).unwrap().0, value);
        }
    }

    #[test]
    fn test_decode_borrows_from_input() {
        let input = b"$5\r\nhello\r\n:1\r\n".to_vec();
        let (value, used) = decode(&input).unwrap();
        assert_eq!(used, 11);
        match value {
            RespValue::BulkString(Some(Cow::Borrowed(data))) => {
                assert_eq!(data.as_ptr(), input[4..].as_ptr());
            }
            other => panic!("expected borrowed bulk string, got {other:?}"),
        }
    }

    #[test]
    fn test_double_forms() {
        assert_eq!(encoded(&RespValue::Double(1.5)), b",1.5\r\n");
        assert_eq!(encoded(&RespValue::Double(f64::NEG_INFINITY)), b",-inf\r\n");
        assert_eq!(decode(b",1.23e4\r\n").unwrap().0, RespValue::Double(12300.0));
        assert_eq!(decode(b",10\r\n").unwrap().0, RespValue::Double(10.0));
    }

    #[test]
    fn test_verbatim_wire_form() {
        let value = RespValue::VerbatimString {
            format: *b"mkd",
            text: Cow::Borrowed(&b"# hi"[..]),
        };
        assert_eq!(encoded(&value), b"=8\r\nmkd:# hi\r\n");
    }

    // -- Protocol violations -----------------------------------------------

    #[test]
    fn test_unknown_marker() {
        assert!(matches!(decode(b"?oops\r\n"), Err(ProtocolError::InvalidMarker(b'?'))));
        assert!(matches!(frame_len(b"|1\r\n"), Err(ProtocolError::InvalidMarker(b'|'))));
    }

    #[test]
    fn test_negative_lengths_other_than_null() {
        assert!(matches!(decode(b"$-2\r\n"), Err(ProtocolError::InvalidLength(-2))));
        assert!(matches!(decode(b"*-5\r\n"), Err(ProtocolError::InvalidLength(-5))));
        assert!(matches!(decode(b"%-1\r\n"), Err(ProtocolError::InvalidLength(-1))));
        assert!(matches!(decode(b"!-1\r\n"), Err(ProtocolError::InvalidLength(-1))));
    }

    #[test]
    fn test_bad_scalars() {
        assert!(matches!(decode(b":12a\r\n"), Err(ProtocolError::InvalidInteger)));
        assert!(matches!(decode(b":\r\n"), Err(ProtocolError::InvalidInteger)));
        assert!(matches!(decode(b":9223372036854775808\r\n"), Err(ProtocolError::InvalidInteger)));
        assert!(matches!(decode(b"#x\r\n"), Err(ProtocolError::InvalidBoolean)));
        assert!(matches!(decode(b",abc\r\n"), Err(ProtocolError::InvalidDouble)));
        assert!(matches!(decode(b"(12x\r\n"), Err(ProtocolError::InvalidBigNumber)));
        assert!(matches!(decode(b"=3\r\ntxt\r\n"), Err(ProtocolError::InvalidVerbatim)));
        assert!(matches!(decode(b"_x\r\n"), Err(ProtocolError::InvalidNull)));
    }

    #[test]
    fn test_missing_crlf_after_bulk() {
        assert!(matches!(decode(b"$3\r\nabcXY"), Err(ProtocolError::MissingCrlf)));
        assert!(matches!(decode(b"+OK\rX"), Err(ProtocolError::MissingCrlf)));
    }

    #[test]
    fn test_limits() {
        let mut deep = Vec::new();
        for _ in 0..MAX_DEPTH + 1 {
            deep.extend_from_slice(b"*1\r\n");
        }
        deep.extend_from_slice(b":1\r\n");
        assert!(matches!(decode(&deep), Err(ProtocolError::NestingTooDeep(MAX_DEPTH))));
        assert!(matches!(frame_len(&deep), Err(ProtocolError::NestingTooDeep(MAX_DEPTH))));

        let long = vec![b'a'; MAX_LINE_LEN + 2];
        let mut line = vec![b'+'];
        line.extend_from_slice(&long);
        assert!(matches!(decode(&line), Err(ProtocolError::LineTooLong { .. })));

        let huge = format!("${}\r\n", MAX_BULK_LEN + 1);
        assert!(matches!(decode(huge.as_bytes()), Err(ProtocolError::BulkTooLarge { .. })));
    }

    #[test]
    fn test_length_prefixes_are_plain_decimal() {
        for input in [&b"$+3\r\nabc\r\n"[..], b"*007\r\n", b"%-01\r\n", b"$03\r\nabc\r\n"] {
            assert!(
                matches!(decode(input), Err(ProtocolError::InvalidInteger)),
                "{:?}",
                String::from_utf8_lossy(input)
            );
            assert!(matches!(frame_len(input), Err(ProtocolError::InvalidInteger)));
        }
        assert_eq!(decode(b"$0\r\n\r\n").unwrap().0, RespValue::bulk(""));
        assert_eq!(decode(b"$-1\r\n").unwrap().0, RespValue::null_bulk());
        assert_eq!(decode(b":+7\r\n").unwrap().0, RespValue::Integer(7));
    }

    #[test]
    fn test_huge_count_does_not_preallocate() {
        // A count far beyond the input is just an incomplete frame.
        assert!(matches!(decode(b"*1000000000\r\n:1\r\n"), Err(ProtocolError::Incomplete)));
    }

    #[test]
    fn test_encode_rejects_line_breaks() {
        let mut out = Vec::new();
        let err = encode(&RespValue::simple("a\r\nb"), &mut out).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidSimpleString));
        let err = encode(&RespValue::BigNumber(Cow::Borrowed(&b"12.5"[..])), &mut out).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidBigNumber));
    }

    // -- tokio_util adapter ------------------------------------------------

    #[cfg(feature = "codec")]
    #[test]
    fn test_resp_codec_waits_for_whole_frame() {
        use bytes::BytesMut;
        use tokio_util::codec::{Decoder, Encoder};

        let mut codec = RespCodec;
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nfoo\r\n"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 13, "incomplete input must not be consumed");

        buf.extend_from_slice(b":7\r\n+next\r\n");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            frame,
            RespValue::array(vec![RespValue::bulk("foo"), RespValue::Integer(7)])
        );
        assert_eq!(&buf[..], b"+next\r\n");

        let mut out = BytesMut::new();
        codec.encode(&RespValue::simple("bad\n"), &mut out).unwrap_err();
        assert!(out.is_empty(), "failed encode must not leave partial bytes");
    }

    #[cfg(feature = "codec")]
    #[test]
    fn test_resp_codec_truncated_input_at_eof() {
        use bytes::BytesMut;
        use tokio_util::codec::Decoder;

        let mut codec = RespCodec;
        let mut empty = BytesMut::new();
        assert!(codec.decode_eof(&mut empty).unwrap().is_none());

        let mut buf = BytesMut::from(&b":1\r\n+partial"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some(RespValue::Integer(1)));
        match codec.decode_eof(&mut buf) {
            Err(ProtocolError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected an unexpected-eof error, got {other:?}"),
        }
    }
}
