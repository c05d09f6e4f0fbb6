//! Named events fanned out to sinks.
//!
//! An [`Event`] carries a name, static fields, and dynamic fields whose
//! closures are evaluated once per send. [`Event::send`] delivers a copy to
//! every sink on its own tokio task; [`Event::send_to`] targets one sink.
//!
//! ```rust,ignore
//! let event = Event::new("deploy", vec![Arc::new(LogEventSink::new(logger))]);
//! event.add_field("version", "1.4.2");
//! event.add_dynamic_field("uptime_s", move || started.elapsed().as_secs().into());
//! event.send();
//! ```

use aegis_core::{EventSink, FieldValue, Fields, SharedEventSink, SharedLogger};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type DynamicField = Arc<dyn Fn() -> FieldValue + Send + Sync>;

/// A named bundle of fields and the sinks it is delivered to.
pub struct Event {
    name: String,
    fields: RwLock<BTreeMap<String, FieldValue>>,
    dynamic_fields: RwLock<BTreeMap<String, DynamicField>>,
    sinks: Vec<SharedEventSink>,
}

impl Event {
    /// Creates an event delivered to `sinks` on [`send`](Self::send).
    pub fn new(name: impl Into<String>, sinks: Vec<SharedEventSink>) -> Self {
        Self {
            name: name.into(),
            fields: RwLock::new(BTreeMap::new()),
            dynamic_fields: RwLock::new(BTreeMap::new()),
            sinks,
        }
    }

    /// Returns the event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets a static field, replacing any previous value for `key`.
    pub fn add_field(&self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.write().insert(key.into(), value.into());
    }

    /// Sets a field whose value is computed on every send.
    ///
    /// A send to several sinks evaluates the closure once and delivers the
    /// same value to each.
    pub fn add_dynamic_field<F>(&self, key: impl Into<String>, compute: F)
    where
        F: Fn() -> FieldValue + Send + Sync + 'static,
    {
        self.dynamic_fields.write().insert(key.into(), Arc::new(compute));
    }

    /// Delivers the event to every sink asynchronously.
    pub fn send(&self) {
        let fields = self.snapshot();
        for sink in &self.sinks {
            deliver(Arc::clone(sink), self.name.clone(), fields.clone());
        }
    }

    /// Delivers the event to `sink` only.
    pub fn send_to(&self, sink: SharedEventSink) {
        deliver(sink, self.name.clone(), self.snapshot());
    }

    fn snapshot(&self) -> Fields {
        let dynamic: Vec<(String, FieldValue)> = self
            .dynamic_fields
            .read()
            .iter()
            .map(|(key, compute)| (key.clone(), compute()))
            .collect();

        let mut merged = self.fields.read().clone();
        merged.extend(dynamic);
        merged.into_iter().collect()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("fields", &*self.fields.read())
            .field("sinks", &self.sinks.len())
            .finish_non_exhaustive()
    }
}

// Spawns on the current runtime; without one the sink runs inline.
fn deliver(sink: SharedEventSink, name: String, fields: Fields) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move { sink.send_event(&name, fields) });
        }
        Err(_) => sink.send_event(&name, fields),
    }
}

/// Logs each event at info level with `msg` set to the event name.
#[derive(Clone)]
pub struct LogEventSink {
    logger: SharedLogger,
}

impl LogEventSink {
    /// Wraps `logger`.
    pub fn new(logger: SharedLogger) -> Self {
        Self { logger }
    }
}

impl fmt::Debug for LogEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogEventSink").finish_non_exhaustive()
    }
}

impl EventSink for LogEventSink {
    fn send_event(&self, name: &str, fields: Fields) {
        self.logger.log_info_message(name, fields);
    }
}

/// Posts each event as a JSON object to an HTTP collector.
///
/// The body is `{"name": <event name>, ...fields}`.
#[derive(Debug, Clone)]
pub struct HttpEventSink {
    url: String,
    client: reqwest::Client,
}

impl HttpEventSink {
    /// Creates a sink posting to `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Returns the collector URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Builds the JSON body for one event.
    #[must_use]
    pub fn body(name: &str, fields: &Fields) -> Value {
        let mut object = Map::new();
        object.insert("name".to_string(), Value::String(name.to_string()));
        for field in fields {
            let value = serde_json::to_value(&field.value).unwrap_or(Value::Null);
            object.insert(field.key.clone(), value);
        }
        Value::Object(object)
    }
}

impl EventSink for HttpEventSink {
    fn send_event(&self, name: &str, fields: Fields) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(event = name, "dropping event outside a runtime");
            return;
        };

        let request = self.client.post(&self.url).json(&Self::body(name, &fields));
        let event = name.to_string();
        runtime.spawn(async move {
            if let Err(e) = request.send().await {
                tracing::warn!(event = %event, error = %e, "failed to deliver event");
            }
        });
    }
}
