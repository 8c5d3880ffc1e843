//! Legacy Zipkin v1 thrift encoding (TBinaryProtocol).
//!
//! v2 spans are converted on the fly: the span kind becomes core annotations
//! (`cs`/`cr`, `sr`/`ss`, `ms`/`ws`, `wr`/`mr`), tags become string binary
//! annotations and the remote endpoint becomes an address annotation.

use crate::error::EncodeError;
use crate::span::{Endpoint, Span, SpanKind};
use bytes::BufMut;

const T_STOP: u8 = 0;
const T_BOOL: u8 = 2;
const T_I16: u8 = 6;
const T_I32: u8 = 8;
const T_I64: u8 = 10;
const T_STRING: u8 = 11;
const T_STRUCT: u8 = 12;
const T_LIST: u8 = 15;

const ANNOTATION_TYPE_BOOL: i32 = 0;
const ANNOTATION_TYPE_STRING: i32 = 6;

/// Element type byte plus i32 element count.
pub(super) const LIST_HEADER_LEN: usize = 5;

pub(super) fn write_list_header(out: &mut Vec<u8>, count: usize) {
    out.put_u8(T_STRUCT);
    out.put_i32(count as i32);
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn field(&mut self, ty: u8, id: i16) {
        self.buf.put_u8(ty);
        self.buf.put_i16(id);
    }

    fn i64_field(&mut self, id: i16, value: u64) {
        self.field(T_I64, id);
        self.buf.put_u64(value);
    }

    fn binary(&mut self, field: &'static str, value: &[u8]) -> Result<(), EncodeError> {
        let len = i32::try_from(value.len()).map_err(|_| EncodeError::FieldTooLong {
            field,
            len: value.len(),
        })?;
        self.buf.put_i32(len);
        self.buf.put_slice(value);
        Ok(())
    }

    fn string_field(&mut self, id: i16, field: &'static str, value: &str) -> Result<(), EncodeError> {
        self.field(T_STRING, id);
        self.binary(field, value.as_bytes())
    }

    fn list_begin(&mut self, id: i16, count: usize) {
        self.field(T_LIST, id);
        self.buf.put_u8(T_STRUCT);
        self.buf.put_i32(count as i32);
    }

    fn stop(&mut self) {
        self.buf.put_u8(T_STOP);
    }

    fn endpoint(&mut self, id: i16, endpoint: &Endpoint) -> Result<(), EncodeError> {
        self.field(T_STRUCT, id);
        self.field(T_I32, 1);
        self.buf.put_u32(endpoint.ipv4.map_or(0, u32::from));
        self.field(T_I16, 2);
        self.buf.put_u16(endpoint.port.unwrap_or(0));
        let service_name = endpoint.service_name.as_deref().unwrap_or("").to_lowercase();
        self.string_field(3, "endpoint.service_name", &service_name)?;
        if let Some(ipv6) = endpoint.ipv6 {
            self.field(T_STRING, 4);
            self.binary("endpoint.ipv6", &ipv6.octets())?;
        }
        self.stop();
        Ok(())
    }
}

struct V1Annotation<'a> {
    timestamp: u64,
    value: &'a str,
}

struct V1BinaryAnnotation<'a> {
    key: &'a str,
    value: &'a [u8],
    annotation_type: i32,
    host: Option<&'a Endpoint>,
}

fn core_annotations(span: &Span) -> Vec<V1Annotation<'_>> {
    let (Some(kind), true) = (span.kind, span.timestamp != 0) else {
        return Vec::new();
    };
    let end = span.timestamp.saturating_add(span.duration);
    let has_end = span.duration != 0;
    let (begin, finish) = match kind {
        SpanKind::Client => ("cs", "cr"),
        SpanKind::Server => ("sr", "ss"),
        SpanKind::Producer => ("ms", "ws"),
        SpanKind::Consumer if has_end => ("wr", "mr"),
        SpanKind::Consumer => ("mr", ""),
    };
    let mut out = vec![V1Annotation {
        timestamp: span.timestamp,
        value: begin,
    }];
    if has_end && !finish.is_empty() {
        out.push(V1Annotation {
            timestamp: end,
            value: finish,
        });
    }
    out
}

fn binary_annotations(span: &Span) -> Vec<V1BinaryAnnotation<'_>> {
    let local = span.local_endpoint.as_ref().filter(|e| !e.is_empty());
    let mut out: Vec<V1BinaryAnnotation<'_>> = span
        .tags
        .iter()
        .map(|(key, value)| V1BinaryAnnotation {
            key,
            value: value.as_bytes(),
            annotation_type: ANNOTATION_TYPE_STRING,
            host: local,
        })
        .collect();

    if span.kind.is_none() && span.annotations.is_empty() && local.is_some() {
        out.push(V1BinaryAnnotation {
            key: "lc",
            value: b"",
            annotation_type: ANNOTATION_TYPE_STRING,
            host: local,
        });
    }

    if let (Some(kind), Some(remote)) = (span.kind, span.remote_endpoint.as_ref().filter(|e| !e.is_empty())) {
        let key = match kind {
            SpanKind::Client => "sa",
            SpanKind::Server => "ca",
            SpanKind::Producer | SpanKind::Consumer => "ma",
        };
        out.push(V1BinaryAnnotation {
            key,
            value: &[1],
            annotation_type: ANNOTATION_TYPE_BOOL,
            host: Some(remote),
        });
    }
    out
}

pub(super) fn encode(span: &Span) -> Result<Vec<u8>, EncodeError> {
    let mut w = Writer {
        buf: Vec::with_capacity(256),
    };
    let local = span.local_endpoint.as_ref().filter(|e| !e.is_empty());

    w.i64_field(1, span.trace_id_low());
    w.string_field(3, "name", span.name.as_deref().unwrap_or(""))?;
    w.i64_field(4, span.id);
    if let Some(parent_id) = span.parent_id {
        w.i64_field(5, parent_id);
    }

    let mut annotations = core_annotations(span);
    annotations.extend(span.annotations.iter().map(|a| V1Annotation {
        timestamp: a.timestamp,
        value: &a.value,
    }));
    if !annotations.is_empty() {
        w.list_begin(6, annotations.len());
        for annotation in &annotations {
            w.i64_field(1, annotation.timestamp);
            w.string_field(2, "annotation.value", annotation.value)?;
            if let Some(host) = local {
                w.endpoint(3, host)?;
            }
            w.stop();
        }
    }

    let binary = binary_annotations(span);
    if !binary.is_empty() {
        w.list_begin(8, binary.len());
        for annotation in &binary {
            w.string_field(1, "binary_annotation.key", annotation.key)?;
            w.field(T_STRING, 2);
            w.binary("binary_annotation.value", annotation.value)?;
            w.field(T_I32, 3);
            w.buf.put_i32(annotation.annotation_type);
            if let Some(host) = annotation.host {
                w.endpoint(4, host)?;
            }
            w.stop();
        }
    }

    if span.debug {
        w.field(T_BOOL, 9);
        w.buf.put_u8(1);
    }
    // Shared server spans leave timing to the client side
    if !span.shared {
        if span.timestamp != 0 {
            w.i64_field(10, span.timestamp);
        }
        if span.duration != 0 {
            w.i64_field(11, span.duration);
        }
    }
    if span.trace_id_high() != 0 {
        w.i64_field(12, span.trace_id_high());
    }
    w.stop();
    Ok(w.buf)
}
