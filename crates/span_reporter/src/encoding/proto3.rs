//! Zipkin proto3 encoding.
//!
//! Each span is written as one `ListOfSpans.spans` entry (field 1, length
//! delimited), so concatenating encoded spans yields a valid `ListOfSpans`.

use crate::span::{Endpoint, Span, SpanKind};
use prost::Message;
use std::collections::BTreeMap;

#[derive(Clone, PartialEq, Message)]
pub(crate) struct ProtoSpan {
    #[prost(bytes = "vec", tag = "1")]
    pub trace_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub parent_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub id: Vec<u8>,
    #[prost(enumeration = "ProtoKind", tag = "4")]
    pub kind: i32,
    #[prost(string, tag = "5")]
    pub name: String,
    #[prost(fixed64, tag = "6")]
    pub timestamp: u64,
    #[prost(uint64, tag = "7")]
    pub duration: u64,
    #[prost(message, optional, tag = "8")]
    pub local_endpoint: Option<ProtoEndpoint>,
    #[prost(message, optional, tag = "9")]
    pub remote_endpoint: Option<ProtoEndpoint>,
    #[prost(message, repeated, tag = "10")]
    pub annotations: Vec<ProtoAnnotation>,
    #[prost(btree_map = "string, string", tag = "11")]
    pub tags: BTreeMap<String, String>,
    #[prost(bool, tag = "12")]
    pub debug: bool,
    #[prost(bool, tag = "13")]
    pub shared: bool,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct ProtoEndpoint {
    #[prost(string, tag = "1")]
    pub service_name: String,
    #[prost(bytes = "vec", tag = "2")]
    pub ipv4: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub ipv6: Vec<u8>,
    #[prost(int32, tag = "4")]
    pub port: i32,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct ProtoAnnotation {
    #[prost(fixed64, tag = "1")]
    pub timestamp: u64,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct ListOfSpans {
    #[prost(message, repeated, tag = "1")]
    pub spans: Vec<ProtoSpan>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub(crate) enum ProtoKind {
    Unspecified = 0,
    Client = 1,
    Server = 2,
    Producer = 3,
    Consumer = 4,
}

impl From<SpanKind> for ProtoKind {
    fn from(kind: SpanKind) -> Self {
        match kind {
            SpanKind::Client => Self::Client,
            SpanKind::Server => Self::Server,
            SpanKind::Producer => Self::Producer,
            SpanKind::Consumer => Self::Consumer,
        }
    }
}

fn endpoint(endpoint: Option<&Endpoint>) -> Option<ProtoEndpoint> {
    let endpoint = endpoint.filter(|e| !e.is_empty())?;
    Some(ProtoEndpoint {
        service_name: endpoint.service_name.clone().unwrap_or_default(),
        ipv4: endpoint.ipv4.map(|ip| ip.octets().to_vec()).unwrap_or_default(),
        ipv6: endpoint.ipv6.map(|ip| ip.octets().to_vec()).unwrap_or_default(),
        port: endpoint.port.map_or(0, i32::from),
    })
}

fn to_proto(span: &Span) -> ProtoSpan {
    let trace_id = if span.trace_id_high() == 0 {
        span.trace_id_low().to_be_bytes().to_vec()
    } else {
        span.trace_id.to_be_bytes().to_vec()
    };

    ProtoSpan {
        trace_id,
        parent_id: span
            .parent_id
            .map(|id| id.to_be_bytes().to_vec())
            .unwrap_or_default(),
        id: span.id.to_be_bytes().to_vec(),
        kind: span.kind.map_or(ProtoKind::Unspecified, ProtoKind::from) as i32,
        name: span.name.clone().unwrap_or_default(),
        timestamp: span.timestamp,
        duration: span.duration,
        local_endpoint: endpoint(span.local_endpoint.as_ref()),
        remote_endpoint: endpoint(span.remote_endpoint.as_ref()),
        annotations: span
            .annotations
            .iter()
            .map(|a| ProtoAnnotation {
                timestamp: a.timestamp,
                value: a.value.clone(),
            })
            .collect(),
        tags: span.tags.clone(),
        debug: span.debug,
        shared: span.shared,
    }
}

pub(super) fn encode(span: &Span) -> Vec<u8> {
    ListOfSpans {
        spans: vec![to_proto(span)],
    }
    .encode_to_vec()
}
