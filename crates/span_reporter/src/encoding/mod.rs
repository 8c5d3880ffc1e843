//! Span wire encodings.
//!
//! Each [`Encoding`] variant maps to a stateless encode function producing the
//! bytes of one span, plus the framing needed to join several encoded spans
//! into a single message:
//!
//! | Encoding | Span bytes | Message framing |
//! |----------|------------|-----------------|
//! | `Json`   | Zipkin v2 JSON object | `[` + spans joined by `,` + `]` |
//! | `Proto3` | one `ListOfSpans.spans` field entry | plain concatenation |
//! | `Thrift` | Zipkin v1 TBinaryProtocol struct | list header (type + i32 count) + spans |
//!
//! Adding an encoding means adding a variant and its encode function; nothing
//! else in the reporter dispatches on the concrete format.

mod json;
mod proto3;
mod thrift;

use crate::error::{ConfigError, EncodeError};
use crate::span::Span;
use bytes::Bytes;
use serde::Deserialize;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// Wire format of encoded spans and of the messages carrying them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Encoding {
    /// Zipkin v2 JSON
    #[default]
    Json,
    /// Zipkin proto3 `ListOfSpans`
    Proto3,
    /// Legacy Zipkin v1 thrift
    Thrift,
}

impl Encoding {
    /// Encodes one span.
    pub fn encode(self, span: &Span) -> Result<EncodedSpan, EncodeError> {
        if span.trace_id == 0 {
            return Err(EncodeError::MissingId { field: "trace_id" });
        }
        if span.id == 0 {
            return Err(EncodeError::MissingId { field: "id" });
        }
        let bytes = match self {
            Self::Json => json::encode(span)?,
            Self::Proto3 => proto3::encode(span),
            Self::Thrift => thrift::encode(span)?,
        };
        Ok(EncodedSpan::new(bytes))
    }

    /// Size of a message holding `count` spans whose encoded sizes sum to `span_bytes`.
    pub fn list_size_in_bytes(self, count: usize, span_bytes: usize) -> usize {
        match self {
            Self::Json => 2 + span_bytes + count.saturating_sub(1),
            Self::Proto3 => span_bytes,
            Self::Thrift => thrift::LIST_HEADER_LEN + span_bytes,
        }
    }

    /// Size of the message [`encode_list`](Self::encode_list) would produce.
    pub fn message_size_in_bytes(self, spans: &[EncodedSpan]) -> usize {
        let span_bytes = spans.iter().map(EncodedSpan::len).sum();
        self.list_size_in_bytes(spans.len(), span_bytes)
    }

    /// Joins encoded spans into one message.
    pub fn encode_list(self, spans: &[EncodedSpan]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.message_size_in_bytes(spans));
        match self {
            Self::Json => {
                out.push(b'[');
                for (i, span) in spans.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    out.extend_from_slice(span);
                }
                out.push(b']');
            }
            Self::Proto3 => {
                for span in spans {
                    out.extend_from_slice(span);
                }
            }
            Self::Thrift => {
                thrift::write_list_header(&mut out, spans.len());
                for span in spans {
                    out.extend_from_slice(span);
                }
            }
        }
        out
    }

    /// HTTP media type of a message in this encoding.
    pub fn media_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Proto3 => "application/x-protobuf",
            Self::Thrift => "application/x-thrift",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "JSON",
            Self::Proto3 => "PROTO3",
            Self::Thrift => "THRIFT",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "JSON" => Ok(Self::Json),
            "PROTO3" => Ok(Self::Proto3),
            "THRIFT" => Ok(Self::Thrift),
            _ => Err(ConfigError::UnknownEncoding(s.to_string())),
        }
    }
}

impl TryFrom<String> for Encoding {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The encoded bytes of one span. Immutable and cheap to move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSpan(Bytes);

impl EncodedSpan {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl Deref for EncodedSpan {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for EncodedSpan {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
