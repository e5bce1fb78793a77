//! RESP frame model.
//!
//! A [`RespValue`] is one complete protocol unit. Byte payloads are
//! `Cow<'a, [u8]>`: frames produced by [`decode`](crate::decode) borrow from
//! the decoded buffer, frames built by callers may own or borrow their data.

use std::borrow::Cow;
use std::fmt;

/// The kind of a frame, one per leading marker byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Null,
    SimpleString,
    Error,
    Integer,
    BulkString,
    Array,
    Double,
    Boolean,
    BigNumber,
    BulkError,
    VerbatimString,
    Map,
    Set,
    Push,
}

impl FrameKind {
    /// Maps a leading marker byte to its frame kind.
    pub fn from_marker(marker: u8) -> Option<Self> {
        Some(match marker {
            b'_' => Self::Null,
            b'+' => Self::SimpleString,
            b'-' => Self::Error,
            b':' => Self::Integer,
            b'$' => Self::BulkString,
            b'*' => Self::Array,
            b',' => Self::Double,
            b'#' => Self::Boolean,
            b'(' => Self::BigNumber,
            b'!' => Self::BulkError,
            b'=' => Self::VerbatimString,
            b'%' => Self::Map,
            b'~' => Self::Set,
            b'>' => Self::Push,
            _ => return None,
        })
    }

    /// The marker byte that introduces this kind on the wire.
    pub fn marker(self) -> u8 {
        match self {
            Self::Null => b'_',
            Self::SimpleString => b'+',
            Self::Error => b'-',
            Self::Integer => b':',
            Self::BulkString => b'$',
            Self::Array => b'*',
            Self::Double => b',',
            Self::Boolean => b'#',
            Self::BigNumber => b'(',
            Self::BulkError => b'!',
            Self::VerbatimString => b'=',
            Self::Map => b'%',
            Self::Set => b'~',
            Self::Push => b'>',
        }
    }

    /// Returns `true` for kinds whose payload is a sequence of child frames.
    pub fn is_aggregate(self) -> bool {
        matches!(self, Self::Array | Self::Map | Self::Set | Self::Push)
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ('{}')", self, self.marker() as char)
    }
}

/// One RESP2/RESP3 frame.
///
/// Invariants the codec relies on:
/// - aggregates hold exactly the children their wire count announces
///   (a [`Map`](Self::Map) count is its pair count);
/// - null forms ([`Null`](Self::Null), `BulkString(None)`, `Array(None)`)
///   carry no payload;
/// - line payloads (simple strings, errors, big numbers) never contain CR
///   or LF, which [`encode`](crate::encode) enforces.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue<'a> {
    /// RESP3 null: `_\r\n`.
    Null,
    /// `+OK` style status line.
    SimpleString(Cow<'a, [u8]>),
    /// `-ERR ...` reply.
    Error(Cow<'a, [u8]>),
    /// `:123`.
    Integer(i64),
    /// Binary-safe `$` payload, `None` for the `$-1` null sentinel.
    BulkString(Option<Cow<'a, [u8]>>),
    /// `*` aggregate, `None` for the `*-1` null sentinel.
    Array(Option<Vec<RespValue<'a>>>),
    /// `,3.14`.
    Double(f64),
    /// `#t` / `#f`.
    Boolean(bool),
    /// `(` arbitrary precision integer, kept as its decimal digits.
    BigNumber(Cow<'a, [u8]>),
    /// `!` binary-safe error.
    BulkError(Cow<'a, [u8]>),
    /// `=` text with a three byte format hint such as `txt` or `mkd`.
    VerbatimString {
        format: [u8; 3],
        text: Cow<'a, [u8]>,
    },
    /// `%` key/value pairs in wire order.
    Map(Vec<(RespValue<'a>, RespValue<'a>)>),
    /// `~` unordered collection, kept in wire order.
    Set(Vec<RespValue<'a>>),
    /// `>` out-of-band push message.
    Push(Vec<RespValue<'a>>),
}

impl<'a> RespValue<'a> {
    /// Creates a simple string borrowing `data`.
    #[inline]
    pub fn simple(data: &'a (impl AsRef<[u8]> + ?Sized)) -> Self {
        Self::SimpleString(Cow::Borrowed(data.as_ref()))
    }

    /// Creates an error reply borrowing `data`.
    #[inline]
    pub fn error(data: &'a (impl AsRef<[u8]> + ?Sized)) -> Self {
        Self::Error(Cow::Borrowed(data.as_ref()))
    }

    /// Creates a bulk string borrowing `data`.
    #[inline]
    pub fn bulk(data: &'a (impl AsRef<[u8]> + ?Sized)) -> Self {
        Self::BulkString(Some(Cow::Borrowed(data.as_ref())))
    }

    /// Creates the `$-1` null bulk string.
    #[inline]
    pub const fn null_bulk() -> Self {
        Self::BulkString(None)
    }

    /// Creates an array frame.
    #[inline]
    pub fn array(items: Vec<RespValue<'a>>) -> Self {
        Self::Array(Some(items))
    }

    /// Creates the `*-1` null array.
    #[inline]
    pub const fn null_array() -> Self {
        Self::Array(None)
    }

    /// Builds a command array of bulk strings, e.g. `["GET", "key"]`.
    pub fn command<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = &'a A>,
        A: AsRef<[u8]> + ?Sized + 'a,
    {
        Self::Array(Some(args.into_iter().map(Self::bulk).collect()))
    }

    /// Returns the kind of this frame.
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Null => FrameKind::Null,
            Self::SimpleString(_) => FrameKind::SimpleString,
            Self::Error(_) => FrameKind::Error,
            Self::Integer(_) => FrameKind::Integer,
            Self::BulkString(_) => FrameKind::BulkString,
            Self::Array(_) => FrameKind::Array,
            Self::Double(_) => FrameKind::Double,
            Self::Boolean(_) => FrameKind::Boolean,
            Self::BigNumber(_) => FrameKind::BigNumber,
            Self::BulkError(_) => FrameKind::BulkError,
            Self::VerbatimString { .. } => FrameKind::VerbatimString,
            Self::Map(_) => FrameKind::Map,
            Self::Set(_) => FrameKind::Set,
            Self::Push(_) => FrameKind::Push,
        }
    }

    /// Returns `true` for any of the null forms.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::BulkString(None) | Self::Array(None))
    }

    /// Returns `true` for `-` and `!` error replies.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_) | Self::BulkError(_))
    }

    /// Returns the byte payload of string-like frames.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::SimpleString(data)
            | Self::Error(data)
            | Self::BigNumber(data)
            | Self::BulkError(data)
            | Self::BulkString(Some(data))
            | Self::VerbatimString { text: data, .. } => Some(&**data),
            _ => None,
        }
    }

    /// Returns the value of an integer frame.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the children of an array, set or push frame.
    pub fn as_slice(&self) -> Option<&[RespValue<'a>]> {
        match self {
            Self::Array(Some(items)) | Self::Set(items) | Self::Push(items) => Some(items),
            _ => None,
        }
    }

    /// Copies every borrowed payload so the frame no longer aliases the
    /// buffer it was decoded from.
    pub fn into_owned(self) -> RespValue<'static> {
        fn own(data: Cow<'_, [u8]>) -> Cow<'static, [u8]> {
            Cow::Owned(data.into_owned())
        }
        fn own_all(items: Vec<RespValue<'_>>) -> Vec<RespValue<'static>> {
            items.into_iter().map(RespValue::into_owned).collect()
        }

        match self {
            Self::Null => RespValue::Null,
            Self::SimpleString(data) => RespValue::SimpleString(own(data)),
            Self::Error(data) => RespValue::Error(own(data)),
            Self::Integer(n) => RespValue::Integer(n),
            Self::BulkString(data) => RespValue::BulkString(data.map(own)),
            Self::Array(items) => RespValue::Array(items.map(own_all)),
            Self::Double(d) => RespValue::Double(d),
            Self::Boolean(b) => RespValue::Boolean(b),
            Self::BigNumber(data) => RespValue::BigNumber(own(data)),
            Self::BulkError(data) => RespValue::BulkError(own(data)),
            Self::VerbatimString { format, text } => RespValue::VerbatimString {
                format,
                text: own(text),
            },
            Self::Map(pairs) => RespValue::Map(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect(),
            ),
            Self::Set(items) => RespValue::Set(own_all(items)),
            Self::Push(items) => RespValue::Push(own_all(items)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_table_is_a_bijection() {
        for marker in 0u8..=255 {
            if let Some(kind) = FrameKind::from_marker(marker) {
                assert_eq!(kind.marker(), marker);
            }
        }
        assert_eq!(FrameKind::from_marker(b'?'), None);
        assert_eq!(FrameKind::from_marker(b'|'), None);
    }

    #[test]
    fn test_null_forms() {
        assert!(RespValue::Null.is_null());
        assert!(RespValue::null_bulk().is_null());
        assert!(RespValue::null_array().is_null());
        assert!(!RespValue::array(Vec::new()).is_null());
        assert!(!RespValue::bulk("").is_null());
    }

    #[test]
    fn test_command_builds_bulk_array() {
        let cmd = RespValue::command(["GET", "key"]);
        let items = cmd.as_slice().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_bytes(), Some(&b"GET"[..]));
        assert_eq!(items[1].kind(), FrameKind::BulkString);
    }

    #[test]
    fn test_into_owned_detaches_payloads() {
        let buffer = b"hello".to_vec();
        let owned = RespValue::array(vec![RespValue::bulk(&buffer), RespValue::Integer(7)])
            .into_owned();
        drop(buffer);
        let items = owned.as_slice().unwrap();
        assert_eq!(items[0].as_bytes(), Some(&b"hello"[..]));
        assert!(matches!(&items[0], RespValue::BulkString(Some(Cow::Owned(_)))));
    }

    #[test]
    fn test_error_kinds() {
        assert!(RespValue::error("ERR nope").is_error());
        assert!(RespValue::BulkError(Cow::Borrowed(&b"SYNTAX"[..])).is_error());
        assert!(!RespValue::simple("OK").is_error());
    }

    #[test]
    fn test_kind_display_shows_marker() {
        assert_eq!(FrameKind::Map.to_string(), "Map ('%')");
        assert!(FrameKind::Push.is_aggregate());
        assert!(!FrameKind::BulkString.is_aggregate());
    }
}
