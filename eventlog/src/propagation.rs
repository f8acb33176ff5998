//! W3C trace-context propagation over record headers.
//!
//! Producers call [`inject_current`] to stamp the active span's context
//! into a header map; consumers call [`extract`] and parent their
//! processing span on the result.

use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::Context as OtelContext;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use std::collections::HashMap;
use tracing_opentelemetry::OpenTelemetrySpanExt;

struct HeaderMap<'a>(&'a mut HashMap<String, String>);

impl Injector for HeaderMap<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_string(), value);
    }
}

struct HeaderMapRef<'a>(&'a HashMap<String, String>);

impl Extractor for HeaderMapRef<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

/// Inject the current span's trace context into `headers`
/// (`traceparent`/`tracestate`).
pub fn inject_current(headers: &mut HashMap<String, String>) {
    let context = tracing::Span::current().context();
    let propagator = TraceContextPropagator::new();
    propagator.inject_context(&context, &mut HeaderMap(headers));
}

/// Extract a propagated trace context from `headers`; an absent or
/// malformed `traceparent` yields the empty root context.
#[must_use]
pub fn extract(headers: &HashMap<String, String>) -> OtelContext {
    let propagator = TraceContextPropagator::new();
    propagator.extract(&HeaderMapRef(headers))
}
