use serde::Serialize;

use crate::core::value::Value;

/// Flat key/value record attached to a span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bulk: Option<bool>,
}

impl Annotation {
    pub fn statement(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self { sql: sql.into(), params: Some(params), host: None, bulk: None }
    }

    pub fn connect(host: impl Into<String>) -> Self {
        Self { sql: "connect".into(), params: None, host: Some(host.into()), bulk: None }
    }

    pub fn dispose() -> Self {
        Self { sql: "dispose".into(), params: None, host: None, bulk: None }
    }

    pub fn with_bulk(mut self, bulk: Option<bool>) -> Self {
        self.bulk = bulk;
        self
    }
}
