//! Statsd and dogstatsd recorders over UDP.
//!
//! Metric names are `namespace.prefix.name`, with empty segments skipped.
//! Lines follow the statsd text protocol:
//!
//! ```text
//! namespace.counter:4|c
//! namespace.api./ping_GET:12.5|ms
//! namespace.queue_depth:3|g
//! namespace.counter:4|c|#tagkey:tagvalue      (dogstatsd only)
//! ```
//!
//! Sends are best effort. A dropped datagram is never reported to the
//! caller.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use aegis_core::{MetricsRecorder, SharedMetrics};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;

#[derive(Debug)]
struct StatsdClient {
    socket: UdpSocket,
    target: SocketAddr,
}

impl StatsdClient {
    fn connect(endpoint: &str) -> TelemetryResult<Self> {
        let target = endpoint
            .to_socket_addrs()
            .map_err(|e| TelemetryError::InvalidAddress(format!("{endpoint}: {e}")))?
            .next()
            .ok_or_else(|| TelemetryError::InvalidAddress(endpoint.to_string()))?;

        let bind: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket, target })
    }

    fn send(&self, line: &str) {
        let _ = self.socket.send_to(line.as_bytes(), self.target);
    }
}

/// Sends metrics to a single statsd endpoint.
///
/// Created with [`StatsdRecorder::new`] for plain statsd or
/// [`StatsdRecorder::dogstatsd`] for the tagged dialect. Plain statsd keeps
/// track of tags but never puts them on the wire.
#[derive(Debug, Clone)]
pub struct StatsdRecorder {
    client: Arc<StatsdClient>,
    namespace: Arc<str>,
    prefix: Option<Arc<str>>,
    tags: Vec<String>,
    dogstatsd: bool,
}

impl StatsdRecorder {
    /// Creates a plain statsd recorder for `endpoint` (`host:port`).
    pub fn new(endpoint: &str, namespace: &str) -> TelemetryResult<Self> {
        Self::build(endpoint, namespace, false, "StatsdRecorder")
    }

    /// Creates a dogstatsd recorder for `endpoint` (`host:port`).
    pub fn dogstatsd(endpoint: &str, namespace: &str) -> TelemetryResult<Self> {
        Self::build(endpoint, namespace, true, "DogstatsdRecorder")
    }

    fn build(
        endpoint: &str,
        namespace: &str,
        dogstatsd: bool,
        kind: &str,
    ) -> TelemetryResult<Self> {
        if endpoint.is_empty() {
            return Err(TelemetryError::InvalidConfig(format!(
                "Uninitialized {kind}: empty endpoint"
            )));
        }
        Ok(Self {
            client: Arc::new(StatsdClient::connect(endpoint)?),
            namespace: Arc::from(namespace),
            prefix: None,
            tags: Vec::new(),
            dogstatsd,
        })
    }

    /// Sets a prefix inserted between the namespace and every metric name.
    #[must_use]
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = (!prefix.is_empty()).then(|| Arc::from(prefix));
        self
    }

    /// Returns the `key:value` tags carried by this recorder.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the address datagrams are sent to.
    #[must_use]
    pub fn target(&self) -> SocketAddr {
        self.client.target
    }

    /// Returns a new recorder with one more tag.
    #[must_use]
    pub fn tagged(&self, key: &str, value: &str) -> Self {
        let mut tags = self.tags.clone();
        tags.push(flat_tag(key, value));
        Self {
            tags,
            ..self.clone()
        }
    }

    fn full_name(&self, name: &str) -> String {
        [Some(&*self.namespace), self.prefix.as_deref(), Some(name)]
            .into_iter()
            .flatten()
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Renders one protocol line.
    #[must_use]
    pub fn line(&self, name: &str, value: &str, kind: &str) -> String {
        let mut line = format!("{}:{}|{}", self.full_name(name), value, kind);
        if self.dogstatsd && !self.tags.is_empty() {
            line.push_str("|#");
            line.push_str(&self.tags.join(","));
        }
        line
    }

    fn emit(&self, name: &str, value: &str, kind: &str) {
        self.client.send(&self.line(name, value, kind));
    }
}

fn flat_tag(key: &str, value: &str) -> String {
    if value.is_empty() {
        key.to_string()
    } else {
        format!("{key}:{value}")
    }
}

impl MetricsRecorder for StatsdRecorder {
    fn increment_count_by(&self, name: &str, amount: i64) {
        self.emit(name, &amount.to_string(), "c");
    }

    fn measure_duration_ms(&self, name: &str, duration_ms: f64) {
        self.emit(name, &duration_ms.to_string(), "ms");
    }

    fn set_gauge(&self, name: &str, value: f64) {
        self.emit(name, &value.to_string(), "g");
    }

    fn with_tag(&self, key: &str, value: &str) -> SharedMetrics {
        Arc::new(self.tagged(key, value))
    }
}

/// Sends every metric to several statsd endpoints.
#[derive(Debug, Clone)]
pub struct MultiStatsdRecorder {
    recorders: Vec<StatsdRecorder>,
}

impl MultiStatsdRecorder {
    /// Creates one statsd client per endpoint.
    ///
    /// Fails if any endpoint is empty or unresolvable.
    pub fn new<S: AsRef<str>>(endpoints: &[S], namespace: &str) -> TelemetryResult<Self> {
        let recorders = endpoints
            .iter()
            .enumerate()
            .map(|(i, endpoint)| {
                let endpoint = endpoint.as_ref();
                if endpoint.is_empty() {
                    return Err(TelemetryError::InvalidConfig(format!(
                        "Uninitialized MultiStatsdRecorder {i}"
                    )));
                }
                StatsdRecorder::new(endpoint, namespace)
            })
            .collect::<TelemetryResult<Vec<_>>>()?;
        Ok(Self { recorders })
    }

    /// Sets the prefix on every endpoint.
    #[must_use]
    pub fn with_prefix(self, prefix: &str) -> Self {
        Self {
            recorders: self
                .recorders
                .into_iter()
                .map(|r| r.with_prefix(prefix))
                .collect(),
        }
    }

    /// Returns the number of endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recorders.len()
    }

    /// Returns true if there are no endpoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recorders.is_empty()
    }
}

impl MetricsRecorder for MultiStatsdRecorder {
    fn increment_count_by(&self, name: &str, amount: i64) {
        for recorder in &self.recorders {
            recorder.increment_count_by(name, amount);
        }
    }

    fn measure_duration_ms(&self, name: &str, duration_ms: f64) {
        for recorder in &self.recorders {
            recorder.measure_duration_ms(name, duration_ms);
        }
    }

    fn set_gauge(&self, name: &str, value: f64) {
        for recorder in &self.recorders {
            recorder.set_gauge(name, value);
        }
    }

    fn with_tag(&self, key: &str, value: &str) -> SharedMetrics {
        Arc::new(Self {
            recorders: self
                .recorders
                .iter()
                .map(|r| r.tagged(key, value))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn listener() -> (UdpSocket, String) {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        server
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = server.local_addr().unwrap().to_string();
        (server, addr)
    }

    fn receive(server: &UdpSocket) -> String {
        let mut buf = [0u8; 1024];
        let n = server.recv(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[test]
    fn test_counter_line() {
        let (server, addr) = listener();
        let recorder = StatsdRecorder::dogstatsd(&addr, "namespace").unwrap();
        recorder.increment_count_by("counter", 4);
        assert_eq!(receive(&server), "namespace.counter:4|c");
    }

    #[test]
    fn test_tagged_counter_line() {
        let (server, addr) = listener();
        let recorder = StatsdRecorder::dogstatsd(&addr, "namespace").unwrap();
        let tagged = recorder.with_tag("tagkey", "tagvalue");
        tagged.increment_count_by("counter", 4);
        assert_eq!(receive(&server), "namespace.counter:4|c|#tagkey:tagvalue");
    }

    #[test]
    fn test_tags_make_new_instance() {
        let (_server, addr) = listener();
        let recorder = StatsdRecorder::dogstatsd(&addr, "namespace").unwrap();
        let tagged = recorder.tagged("tagkey", "tagvalue").tagged("anotherkey", "anothervalue");

        assert!(recorder.tags().is_empty());
        assert_eq!(tagged.tags(), ["tagkey:tagvalue", "anotherkey:anothervalue"]);
    }

    #[test]
    fn test_plain_statsd_omits_tags_and_applies_prefix() {
        let (server, addr) = listener();
        let recorder = StatsdRecorder::new(&addr, "ns").unwrap().with_prefix("web");
        recorder.with_tag("url", "/ping").set_gauge("depth", 3.0);
        assert_eq!(receive(&server), "ns.web.depth:3|g");
    }

    #[test]
    fn test_timing_line() {
        let (_server, addr) = listener();
        let recorder = StatsdRecorder::new(&addr, "").unwrap();
        assert_eq!(recorder.line("api./ping_GET", "12.5", "ms"), "api./ping_GET:12.5|ms");
    }

    #[test]
    fn test_empty_endpoint_is_rejected() {
        assert!(StatsdRecorder::new("", "ns").is_err());
        assert!(MultiStatsdRecorder::new(&["127.0.0.1:8125", ""], "ns").is_err());
    }

    #[test]
    fn test_multi_sends_to_every_endpoint() {
        let (a, addr_a) = listener();
        let (b, addr_b) = listener();
        let multi = MultiStatsdRecorder::new(&[addr_a, addr_b], "ns").unwrap();
        assert_eq!(multi.len(), 2);

        multi.increment_count("hits");
        assert_eq!(receive(&a), "ns.hits:1|c");
        assert_eq!(receive(&b), "ns.hits:1|c");
    }
}
