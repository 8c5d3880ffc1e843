//! Zipkin v2 JSON encoding.

use crate::error::EncodeError;
use crate::span::{Endpoint, Span};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonSpan<'a> {
    trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "is_zero")]
    timestamp: u64,
    #[serde(skip_serializing_if = "is_zero")]
    duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    local_endpoint: Option<JsonEndpoint<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_endpoint: Option<JsonEndpoint<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    annotations: Vec<JsonAnnotation<'a>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    tags: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "is_false")]
    debug: bool,
    #[serde(skip_serializing_if = "is_false")]
    shared: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonEndpoint<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    service_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ipv4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ipv6: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
}

#[derive(Serialize)]
struct JsonAnnotation<'a> {
    timestamp: u64,
    value: &'a str,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &u64) -> bool {
    *value == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

fn endpoint(endpoint: Option<&Endpoint>) -> Option<JsonEndpoint<'_>> {
    let endpoint = endpoint.filter(|e| !e.is_empty())?;
    Some(JsonEndpoint {
        service_name: endpoint.service_name.as_deref(),
        ipv4: endpoint.ipv4.map(|ip| ip.to_string()),
        ipv6: endpoint.ipv6.map(|ip| ip.to_string()),
        port: endpoint.port.filter(|p| *p != 0),
    })
}

pub(super) fn encode(span: &Span) -> Result<Vec<u8>, EncodeError> {
    let json = JsonSpan {
        trace_id: span.trace_id_hex(),
        parent_id: span.parent_id.map(|id| format!("{id:016x}")),
        id: format!("{:016x}", span.id),
        kind: span.kind.map(|k| k.as_str()),
        name: span.name.as_deref().filter(|n| !n.is_empty()),
        timestamp: span.timestamp,
        duration: span.duration,
        local_endpoint: endpoint(span.local_endpoint.as_ref()),
        remote_endpoint: endpoint(span.remote_endpoint.as_ref()),
        annotations: span
            .annotations
            .iter()
            .map(|a| JsonAnnotation {
                timestamp: a.timestamp,
                value: &a.value,
            })
            .collect(),
        tags: &span.tags,
        debug: span.debug,
        shared: span.shared,
    };
    Ok(serde_json::to_vec(&json)?)
}
