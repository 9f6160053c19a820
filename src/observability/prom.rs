use once_cell::sync::OnceCell;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

static REGISTRY: OnceCell<Registry> = OnceCell::new();

static SPANS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static SKIPPED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static CONNECTIONS: OnceCell<IntGauge> = OnceCell::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

pub fn init_prometheus() {
    let registry = registry();

    if SPANS_TOTAL.get().is_none() {
        if let Ok(spans) = IntCounterVec::new(
            Opts::new("sqltrace_spans_total", "Spans emitted per driver operation"),
            &["op"],
        ) {
            registry.register(Box::new(spans.clone())).ok();
            SPANS_TOTAL.set(spans).ok();
        }
    }

    if SKIPPED_TOTAL.get().is_none() {
        if let Ok(skipped) = IntCounterVec::new(
            Opts::new("sqltrace_skipped_total", "Driver calls observed without a span"),
            &["op", "reason"],
        ) {
            registry.register(Box::new(skipped.clone())).ok();
            SKIPPED_TOTAL.set(skipped).ok();
        }
    }

    if CONNECTIONS.get().is_none() {
        if let Ok(gauge) = IntGauge::new("sqltrace_connections", "Connections with dialect state") {
            registry.register(Box::new(gauge.clone())).ok();
            CONNECTIONS.set(gauge).ok();
        }
    }
}

pub fn inc_span(op: &str) {
    if let Some(c) = SPANS_TOTAL.get() {
        c.with_label_values(&[op]).inc();
    }
}

pub fn inc_skipped(op: &str, reason: &str) {
    if let Some(c) = SKIPPED_TOTAL.get() {
        c.with_label_values(&[op, reason]).inc();
    }
}

pub fn set_connections(n: usize) {
    if let Some(g) = CONNECTIONS.get() {
        g.set(i64::try_from(n).unwrap_or(i64::MAX));
    }
}

/// Text exposition of everything in the crate registry.
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&registry().gather(), &mut buf) {
        tracing::warn!(target: "sqltrace", "metrics encode failed: {}", e);
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}
