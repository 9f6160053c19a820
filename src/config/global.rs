use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::Deserialize;

// -------------------------------------------------------
// Service kind
// -------------------------------------------------------
/// Groups transactions the way the APM aggregates them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    #[default]
    Web,
    Cron,
}

impl ServiceKind {
    pub fn name(&self) -> &'static str {
        match self {
            ServiceKind::Web => "web",
            ServiceKind::Cron => "cron",
        }
    }
}

// -------------------------------------------------------
// Global Config Struct
// -------------------------------------------------------
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SqlTraceGlobalConfig {
    /// Development mode: crate logs at DEBUG instead of INFO
    pub development: bool,

    /// Service the current process reports under
    pub service: ServiceKind,

    /// Log each rewritten statement at DEBUG level
    pub log_each_statement: bool,
}

static GLOBAL: OnceCell<RwLock<SqlTraceGlobalConfig>> = OnceCell::new();

// -------------------------------------------------------
// INITIATE (GLOBAL INIT + TRACING SETUP)
// -------------------------------------------------------
pub fn initiate(cfg: SqlTraceGlobalConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = if cfg.development { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for directive in [format!("sqltrace={level}"), format!("sqltrace::sql={level}")] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();

    crate::observability::prom::init_prometheus();

    let service = cfg.service;
    let cell = GLOBAL.get_or_init(|| RwLock::new(SqlTraceGlobalConfig::default()));
    *cell.write() = cfg;

    tracing::info!(target: "sqltrace", service = service.name(), "sqltrace global initiated");
}

// -------------------------------------------------------
// GETTER
// -------------------------------------------------------
pub fn global() -> SqlTraceGlobalConfig {
    GLOBAL
        .get()
        .map(|g| g.read().clone())
        .unwrap_or_default()
}
