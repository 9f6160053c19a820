//! Span annotation for the SQL Server (`sqlsrv`) database driver.
//!
//! The driver rewrites the SQL it is handed before sending it: table
//! placeholders get the table prefix, paging becomes `TOP n` or
//! `OFFSET .. FETCH`, custom ids toggle `IDENTITY_INSERT` and temp tables get
//! `WITH (NOLOCK)`. This crate reproduces that text so each traced call reports
//! the statement the server really ran.

pub mod config;
pub mod core;
pub mod error;
pub mod instrumentation;
pub mod observability;
pub mod transaction;

pub use config::{global, initiate, ServiceKind, SqlTraceGlobalConfig};
pub use crate::core::{
    ColumnInfo, ColumnType, Columns, ConnectionId, Connector, DialectState, Fields, Registry,
    RewriteRequest, RewriteResult, ServerInfo, TempTablePredicate, Value,
};
pub use error::{Result, SqlTraceError};
pub use instrumentation::{CallContext, SqlsrvInstrumentation, CATEGORY_SQL};
pub use observability::{Annotation, RecordingSink, SpanSink, TracingSink};
pub use transaction::{page_type_for_script, AdhocTask, CronTaskNamer, ScheduledTask, TransactionNamer};
