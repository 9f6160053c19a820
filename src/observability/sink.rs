use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::config::global;
use crate::observability::annotation::Annotation;

/// Where annotated spans go.
pub trait SpanSink: Send + Sync {
    fn emit(&self, category: &'static str, annotation: &Annotation);

    fn set_transaction_name(&self, _name: &str) {}

    /// Attaches a key/value pair to the current transaction.
    fn set_custom_variable(&self, _name: &str, _value: &str) {}
}

/// Emits every annotation as a `tracing` span under `sqltrace::span`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl SpanSink for TracingSink {
    fn emit(&self, category: &'static str, annotation: &Annotation) {
        let cfg = global();
        let span = tracing::info_span!(
            target: "sqltrace::span",
            "sql",
            service = cfg.service.name(),
            category,
            db.statement = %annotation.sql,
            params = tracing::field::Empty,
            host = tracing::field::Empty,
            bulk = tracing::field::Empty,
        );
        if let Some(params) = &annotation.params {
            span.record("params", tracing::field::debug(params));
        }
        if let Some(host) = &annotation.host {
            span.record("host", host.as_str());
        }
        if let Some(bulk) = annotation.bulk {
            span.record("bulk", bulk);
        }
        let _entered = span.enter();
        if cfg.log_each_statement {
            tracing::debug!(target: "sqltrace::sql", statement = %annotation.sql, "statement");
        }
    }

    fn set_transaction_name(&self, name: &str) {
        tracing::info!(target: "sqltrace", transaction = %name, "transaction named");
    }

    fn set_custom_variable(&self, name: &str, value: &str) {
        tracing::debug!(target: "sqltrace", variable = %name, value = %value, "custom variable");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSpan {
    pub category: &'static str,
    pub annotation: Annotation,
    pub recorded_at: OffsetDateTime,
}

/// Keeps everything in memory; handy for tests and for shipping spans in batches.
#[derive(Debug, Default)]
pub struct RecordingSink {
    spans: Mutex<Vec<RecordedSpan>>,
    transaction: Mutex<Option<String>>,
    variables: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spans(&self) -> Vec<RecordedSpan> {
        self.spans.lock().clone()
    }

    pub fn annotations(&self) -> Vec<Annotation> {
        self.spans.lock().iter().map(|s| s.annotation.clone()).collect()
    }

    pub fn drain(&self) -> Vec<RecordedSpan> {
        std::mem::take(&mut *self.spans.lock())
    }

    pub fn transaction_name(&self) -> Option<String> {
        self.transaction.lock().clone()
    }

    /// Latest value set for `name`.
    pub fn custom_variable(&self, name: &str) -> Option<String> {
        self.variables
            .lock()
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }
}

impl SpanSink for RecordingSink {
    fn emit(&self, category: &'static str, annotation: &Annotation) {
        self.spans.lock().push(RecordedSpan {
            category,
            annotation: annotation.clone(),
            recorded_at: OffsetDateTime::now_utc(),
        });
    }

    fn set_transaction_name(&self, name: &str) {
        *self.transaction.lock() = Some(name.to_string());
    }

    fn set_custom_variable(&self, name: &str, value: &str) {
        self.variables.lock().push((name.to_string(), value.to_string()));
    }
}
