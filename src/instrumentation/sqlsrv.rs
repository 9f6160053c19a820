//! Hook bodies for the observed `sqlsrv` driver methods.
//!
//! The host wraps each driver method and calls the matching hook with a
//! [`CallContext`] before the real call proceeds. Hooks never fail: a call
//! that cannot be annotated is logged, counted and yields no span.

use std::sync::Arc;

use crate::config::global;
use crate::core::dialect::{Connector, DialectState};
use crate::core::registry::{ConnectionId, Registry};
use crate::core::rewrite::{rewrite, RewriteRequest};
use crate::core::template::fix_table_names;
use crate::core::value::{Fields, Value};
use crate::error::SqlTraceError;
use crate::observability::{prom, Annotation, SpanSink};

/// Category for all SQL-related spans.
pub const CATEGORY_SQL: &str = "sql";

/// The driver object a hook was called on.
pub struct CallContext<'a, C: Connector + ?Sized> {
    pub connection: ConnectionId,
    pub driver: &'a C,
}

impl<'a, C: Connector + ?Sized> CallContext<'a, C> {
    pub fn new(connection: ConnectionId, driver: &'a C) -> Self {
        Self { connection, driver }
    }
}

impl<C: Connector + ?Sized> Clone for CallContext<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<C: Connector + ?Sized> Copy for CallContext<'_, C> {}

pub struct SqlsrvInstrumentation<S: SpanSink> {
    registry: Registry,
    sink: Arc<S>,
}

impl<S: SpanSink> SqlsrvInstrumentation<S> {
    pub fn new(sink: Arc<S>) -> Self {
        prom::init_prometheus();
        Self { registry: Registry::new(), sink }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    /// Before `connect`: registers the connection. Server info is not available yet.
    pub fn connect<C: Connector + ?Sized>(&self, ctx: CallContext<'_, C>, host: &str) -> Option<Annotation> {
        self.state(ctx, "connect")?;
        Some(self.emit("connect", Annotation::connect(host)))
    }

    /// After `connect` returned: gathers server info once.
    pub fn connected<C: Connector + ?Sized>(&self, ctx: CallContext<'_, C>) -> bool {
        if self.state(ctx, "connect").is_none() {
            return false;
        }
        match ctx.driver.server_info() {
            Some(info) => self.registry.mark_connected(ctx.connection, info),
            None => {
                tracing::debug!(target: "sqltrace", connection = ctx.connection.0, "driver reported no server info");
                false
            }
        }
    }

    pub fn dispose<C: Connector + ?Sized>(&self, ctx: CallContext<'_, C>) -> Option<Annotation> {
        self.state(ctx, "dispose")?;
        Some(self.emit("dispose", Annotation::dispose()))
    }

    /// Forgets a disposed connection. Hosts that reuse connection ids call this
    /// after `dispose`; otherwise state lives as long as the process.
    pub fn forget(&self, connection: ConnectionId) -> bool {
        let removed = self.registry.evict(connection);
        prom::set_connections(self.registry.len());
        removed
    }

    /// Arbitrary statements only get their table prefixes substituted.
    pub fn execute<C: Connector + ?Sized>(
        &self,
        ctx: CallContext<'_, C>,
        sql: &str,
        params: Vec<Value>,
    ) -> Option<Annotation> {
        let state = self.state(ctx, "execute")?;
        let sql = fix_table_names(sql, state.prefix());
        Some(self.emit("execute", Annotation::statement(sql, params)))
    }

    pub fn get_recordset_sql<C: Connector + ?Sized>(
        &self,
        ctx: CallContext<'_, C>,
        sql: &str,
        params: Vec<Value>,
        limit_from: Option<i64>,
        limit_num: Option<i64>,
    ) -> Option<Annotation> {
        self.observe(
            ctx,
            RewriteRequest::PagedSelect { sql: sql.to_string(), params, limit_from, limit_num },
        )
    }

    pub fn delete_records_select<C: Connector + ?Sized>(
        &self,
        ctx: CallContext<'_, C>,
        table: &str,
        select: Option<&str>,
        params: Vec<Value>,
    ) -> Option<Annotation> {
        self.observe(
            ctx,
            RewriteRequest::Delete {
                table: table.to_string(),
                select: select.map(str::to_string),
                params,
            },
        )
    }

    pub fn set_field_select<C: Connector + ?Sized>(
        &self,
        ctx: CallContext<'_, C>,
        table: &str,
        field: &str,
        value: Value,
        select: Option<&str>,
        params: Vec<Value>,
    ) -> Option<Annotation> {
        self.observe(
            ctx,
            RewriteRequest::UpdateFieldSelect {
                table: table.to_string(),
                field: field.to_string(),
                value,
                select: select.map(str::to_string),
                params,
            },
        )
    }

    pub fn insert_record_raw<C: Connector + ?Sized>(
        &self,
        ctx: CallContext<'_, C>,
        table: &str,
        fields: Fields,
        bulk: bool,
        custom_sequence: bool,
    ) -> Option<Annotation> {
        self.observe(
            ctx,
            RewriteRequest::InsertRaw { table: table.to_string(), fields, custom_sequence, bulk },
        )
    }

    pub fn update_record_raw<C: Connector + ?Sized>(
        &self,
        ctx: CallContext<'_, C>,
        table: &str,
        fields: Fields,
        bulk: bool,
    ) -> Option<Annotation> {
        self.observe(ctx, RewriteRequest::UpdateRaw { table: table.to_string(), fields, bulk })
    }

    fn observe<C: Connector + ?Sized>(
        &self,
        ctx: CallContext<'_, C>,
        request: RewriteRequest,
    ) -> Option<Annotation> {
        let op = request.kind().as_str();
        let state = self.state(ctx, op)?;
        let bulk = request.bulk();

        match rewrite(&state, ctx.driver, request) {
            Ok(res) => Some(self.emit(op, Annotation::statement(res.sql, res.params).with_bulk(bulk))),
            Err(e) => {
                self.skip(ctx.connection, op, &e);
                None
            }
        }
    }

    fn state<C: Connector + ?Sized>(&self, ctx: CallContext<'_, C>, op: &'static str) -> Option<Arc<DialectState>> {
        match self.registry.resolve(ctx.connection, ctx.driver) {
            Ok((state, created)) => {
                if created {
                    prom::set_connections(self.registry.len());
                }
                Some(state)
            }
            Err(e) => {
                self.skip(ctx.connection, op, &e);
                None
            }
        }
    }

    fn skip(&self, connection: ConnectionId, op: &'static str, err: &SqlTraceError) {
        prom::inc_skipped(op, err.reason());
        match err {
            SqlTraceError::Configuration(_) => {
                tracing::warn!(target: "sqltrace", connection = connection.0, op, error = %err, "connection cannot be instrumented");
            }
            SqlTraceError::InvalidOperation(_) => {
                tracing::debug!(target: "sqltrace", connection = connection.0, op, error = %err, "call not annotated");
            }
        }
    }

    fn emit(&self, op: &'static str, annotation: Annotation) -> Annotation {
        if global().log_each_statement {
            tracing::debug!(target: "sqltrace::sql", op, sql = %annotation.sql, "annotated");
        }
        self.sink.emit(CATEGORY_SQL, &annotation);
        prom::inc_span(op);
        annotation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dialect::{ServerInfo, TempTablePredicate};
    use crate::observability::RecordingSink;

    struct Driver;
    impl Connector for Driver {
        fn prefix(&self) -> String {
            "mdl_".into()
        }
        fn reserved_words(&self) -> Option<Vec<String>> {
            Some(vec!["where".into()])
        }
        fn temp_table_predicate(&self) -> Option<TempTablePredicate> {
            Some(Arc::new(|_: &str| false))
        }
        fn server_info(&self) -> Option<ServerInfo> {
            Some(ServerInfo::new(15))
        }
    }

    struct Opaque;
    impl Connector for Opaque {
        fn prefix(&self) -> String {
            "mdl_".into()
        }
    }

    #[test]
    fn execute_substitutes_prefix() {
        let inst = SqlsrvInstrumentation::new(Arc::new(RecordingSink::new()));
        let ctx = CallContext::new(ConnectionId(1), &Driver);
        let a = inst.execute(ctx, "TRUNCATE TABLE {cache_flags}", vec![]).unwrap();
        assert_eq!(a.sql, "TRUNCATE TABLE mdl_cache_flags");
        assert_eq!(inst.sink().spans()[0].category, CATEGORY_SQL);
    }

    #[test]
    fn unsupported_driver_yields_no_spans() {
        let inst = SqlsrvInstrumentation::new(Arc::new(RecordingSink::new()));
        let ctx = CallContext::new(ConnectionId(1), &Opaque);
        assert!(inst.connect(ctx, "db").is_none());
        assert!(inst.execute(ctx, "SELECT 1", vec![]).is_none());
        assert!(!inst.connected(ctx));
        assert!(inst.sink().spans().is_empty());
        assert!(inst.registry().is_empty());
    }

    #[test]
    fn connected_switches_paging_mode() {
        let inst = SqlsrvInstrumentation::new(Arc::new(RecordingSink::new()));
        let ctx = CallContext::new(ConnectionId(4), &Driver);
        inst.connect(ctx, "db");
        let before = inst.get_recordset_sql(ctx, "SELECT * FROM {t}", vec![], Some(0), Some(5)).unwrap();
        assert_eq!(before.sql, "SELECT TOP 5 * FROM mdl_t");

        assert!(inst.connected(ctx));
        assert!(!inst.connected(ctx));
        let after = inst.get_recordset_sql(ctx, "SELECT * FROM {t}", vec![], Some(0), Some(5)).unwrap();
        assert_eq!(after.sql, "SELECT * FROM mdl_t ORDER BY 1 OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY");
    }

    #[test]
    fn repeated_hooks_reuse_connection_state() {
        let inst = SqlsrvInstrumentation::new(Arc::new(RecordingSink::new()));
        let ctx = CallContext::new(ConnectionId(8), &Driver);
        inst.connect(ctx, "db").unwrap();
        inst.execute(ctx, "SELECT 1", vec![]).unwrap();
        inst.dispose(ctx).unwrap();

        let (_, created) = inst.registry().resolve(ConnectionId(8), &Driver).unwrap();
        assert!(!created);
        assert_eq!(inst.registry().len(), 1);
        assert!(prom::gather_text().contains("sqltrace_connections"));
    }

    #[test]
    fn forget_drops_state() {
        let inst = SqlsrvInstrumentation::new(Arc::new(RecordingSink::new()));
        let ctx = CallContext::new(ConnectionId(2), &Driver);
        inst.dispose(ctx).unwrap();
        assert!(inst.forget(ConnectionId(2)));
        assert!(inst.registry().is_empty());
    }
}
