use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in epoch microseconds.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_micros() as u64)
}

/// Represents a single distributed tracing span (Zipkin v2 model)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Trace identifier; 64-bit when the high half is zero, 128-bit otherwise
    pub trace_id: u128,
    /// Parent span identifier (`None` for a root span)
    pub parent_id: Option<u64>,
    /// Span identifier
    pub id: u64,
    /// RPC or messaging role; `None` for local spans
    pub kind: Option<SpanKind>,
    /// Operation name
    pub name: Option<String>,
    /// Start time in epoch microseconds (0 = unset)
    pub timestamp: u64,
    /// Duration in microseconds (0 = unset)
    pub duration: u64,
    /// The host that recorded this span
    pub local_endpoint: Option<Endpoint>,
    /// The other side of an RPC or messaging span
    pub remote_endpoint: Option<Endpoint>,
    /// Timestamped events, in recording order
    pub annotations: Vec<Annotation>,
    /// String tags, sorted by key
    pub tags: BTreeMap<String, String>,
    /// Forces the span to be sampled
    pub debug: bool,
    /// Server side of a span whose id was created by the client
    pub shared: bool,
}

/// Span kind as understood by Zipkin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanKind {
    /// Client-side RPC span
    Client,
    /// Server-side RPC span
    Server,
    /// Producer span (messaging)
    Producer,
    /// Consumer span (messaging)
    Consumer,
}

impl SpanKind {
    /// Upper-case name used by the JSON and proto3 encodings.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "CLIENT",
            Self::Server => "SERVER",
            Self::Producer => "PRODUCER",
            Self::Consumer => "CONSUMER",
        }
    }
}

/// Network location of a service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub service_name: Option<String>,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub port: Option<u16>,
}

impl Endpoint {
    /// Creates an endpoint that only carries a service name.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: Some(service_name.into()),
            ..Self::default()
        }
    }

    pub fn with_ipv4(mut self, ip: Ipv4Addr) -> Self {
        self.ipv4 = Some(ip);
        self
    }

    pub fn with_ipv6(mut self, ip: Ipv6Addr) -> Self {
        self.ipv6 = Some(ip);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// True when no field is set; empty endpoints are omitted on the wire.
    pub fn is_empty(&self) -> bool {
        self.service_name.is_none() && self.ipv4.is_none() && self.ipv6.is_none() && self.port.is_none()
    }
}

/// A timestamped event on a span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Epoch microseconds
    pub timestamp: u64,
    pub value: String,
}

impl Span {
    /// Creates a new span started now
    pub fn new(trace_id: u128, id: u64, name: impl Into<String>) -> Self {
        Self {
            trace_id,
            parent_id: None,
            id,
            kind: None,
            name: Some(name.into()),
            timestamp: now_micros(),
            duration: 0,
            local_endpoint: None,
            remote_endpoint: None,
            annotations: Vec::new(),
            tags: BTreeMap::new(),
            debug: false,
            shared: false,
        }
    }

    pub fn with_parent(mut self, parent_id: u64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_local_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.local_endpoint = Some(endpoint);
        self
    }

    pub fn with_remote_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.remote_endpoint = Some(endpoint);
        self
    }

    /// Sets the start timestamp and duration explicitly (both in microseconds)
    pub fn with_timing(mut self, timestamp: u64, duration: u64) -> Self {
        self.timestamp = timestamp;
        self.duration = duration;
        self
    }

    /// Adds or replaces a tag
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    /// Records an event at the current time
    pub fn annotate(&mut self, value: impl Into<String>) {
        self.annotations.push(Annotation {
            timestamp: now_micros(),
            value: value.into(),
        });
    }

    /// Marks the span as completed, recording its duration
    pub fn finish(&mut self) {
        // Durations are at least one microsecond so a finished span is never "unset"
        self.duration = now_micros().saturating_sub(self.timestamp).max(1);
    }

    /// Lower-hex trace id: 16 characters for 64-bit ids, 32 otherwise
    pub fn trace_id_hex(&self) -> String {
        if self.trace_id >> 64 == 0 {
            format!("{:016x}", self.trace_id as u64)
        } else {
            format!("{:032x}", self.trace_id)
        }
    }

    /// High 64 bits of the trace id (0 for 64-bit trace ids)
    pub fn trace_id_high(&self) -> u64 {
        (self.trace_id >> 64) as u64
    }

    /// Low 64 bits of the trace id
    pub fn trace_id_low(&self) -> u64 {
        self.trace_id as u64
    }

    /// Local service name, if the local endpoint carries one
    pub fn local_service_name(&self) -> Option<&str> {
        self.local_endpoint.as_ref()?.service_name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_id_hex_width() {
        let short = Span::new(0xabc, 1, "op");
        assert_eq!(short.trace_id_hex(), "0000000000000abc");

        let long = Span::new((1u128 << 64) | 2, 1, "op");
        assert_eq!(long.trace_id_hex(), "00000000000000010000000000000002");
        assert_eq!(long.trace_id_high(), 1);
        assert_eq!(long.trace_id_low(), 2);
    }

    #[test]
    fn test_finish_records_duration() {
        let mut span = Span::new(1, 1, "op").with_timing(now_micros(), 0);
        span.finish();
        assert!(span.duration >= 1);
    }

    #[test]
    fn test_builders() {
        let mut span = Span::new(1, 2, "get")
            .with_parent(1)
            .with_kind(SpanKind::Client)
            .with_local_endpoint(Endpoint::new("frontend").with_port(8080));
        span.set_tag("http.path", "/api");
        span.annotate("foo");

        assert_eq!(span.parent_id, Some(1));
        assert_eq!(span.kind, Some(SpanKind::Client));
        assert_eq!(span.local_service_name(), Some("frontend"));
        assert_eq!(span.tags.get("http.path").map(String::as_str), Some("/api"));
        assert_eq!(span.annotations.len(), 1);
        assert!(Endpoint::default().is_empty());
    }
}
