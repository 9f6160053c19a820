//! Reconstruction of the SQL the sqlsrv driver sends for its higher-level calls.
//!
//! Structural changes (paging, identity toggles, lock hints) are applied to the
//! templated statement; table prefixes are always substituted last.

use std::fmt::Write as _;

use crate::core::dialect::{Connector, DialectState};
use crate::core::template::{add_no_lock_to_temp_tables, add_top, fix_table_names};
use crate::core::value::{Fields, Value};
use crate::error::{Result, SqlTraceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Delete,
    PagedSelect,
    InsertRaw,
    UpdateFieldSelect,
    UpdateRaw,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Delete => "delete_records_select",
            OperationKind::PagedSelect => "get_recordset_sql",
            OperationKind::InsertRaw => "insert_record_raw",
            OperationKind::UpdateFieldSelect => "set_field_select",
            OperationKind::UpdateRaw => "update_record_raw",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RewriteRequest {
    Delete {
        table: String,
        select: Option<String>,
        params: Vec<Value>,
    },
    PagedSelect {
        sql: String,
        params: Vec<Value>,
        limit_from: Option<i64>,
        limit_num: Option<i64>,
    },
    InsertRaw {
        table: String,
        fields: Fields,
        custom_sequence: bool,
        bulk: bool,
    },
    UpdateFieldSelect {
        table: String,
        field: String,
        value: Value,
        select: Option<String>,
        params: Vec<Value>,
    },
    UpdateRaw {
        table: String,
        fields: Fields,
        bulk: bool,
    },
}

impl RewriteRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            RewriteRequest::Delete { .. } => OperationKind::Delete,
            RewriteRequest::PagedSelect { .. } => OperationKind::PagedSelect,
            RewriteRequest::InsertRaw { .. } => OperationKind::InsertRaw,
            RewriteRequest::UpdateFieldSelect { .. } => OperationKind::UpdateFieldSelect,
            RewriteRequest::UpdateRaw { .. } => OperationKind::UpdateRaw,
        }
    }

    /// The bulk flag is reported on the span only; it never changes the SQL.
    pub fn bulk(&self) -> Option<bool> {
        match self {
            RewriteRequest::InsertRaw { bulk, .. } | RewriteRequest::UpdateRaw { bulk, .. } => Some(*bulk),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewriteResult {
    pub sql: String,
    /// In the order the placeholders appear in `sql`.
    pub params: Vec<Value>,
}

pub fn rewrite<C: Connector + ?Sized>(
    state: &DialectState,
    connector: &C,
    request: RewriteRequest,
) -> Result<RewriteResult> {
    match request {
        RewriteRequest::Delete { table, select, params } => Ok(RewriteResult {
            sql: delete_records_select(state, &table, select.as_deref()),
            params,
        }),
        RewriteRequest::PagedSelect { sql, params, limit_from, limit_num } => Ok(RewriteResult {
            sql: paged_select(state, &sql, limit_from, limit_num),
            params,
        }),
        RewriteRequest::InsertRaw { table, fields, custom_sequence, .. } => {
            let sql = insert_record_raw(state, connector, &table, &fields, custom_sequence)?;
            let params = fields.into_iter().map(|(_, v)| v).collect();
            Ok(RewriteResult { sql, params })
        }
        RewriteRequest::UpdateFieldSelect { table, field, value, select, params } => {
            set_field_select(state, connector, &table, &field, value, select.as_deref(), params)
        }
        RewriteRequest::UpdateRaw { table, fields, .. } => update_record_raw(state, &table, fields),
    }
}

/// `None`, `-1` and any other negative bound mean "no bound".
pub fn normalise_limits(limit_from: Option<i64>, limit_num: Option<i64>) -> (i64, i64) {
    (limit_from.unwrap_or(0).max(0), limit_num.unwrap_or(0).max(0))
}

fn has_select(select: Option<&str>) -> Option<&str> {
    select.map(str::trim).filter(|s| !s.is_empty())
}

pub fn delete_records_select(state: &DialectState, table: &str, select: Option<&str>) -> String {
    let mut sql = format!("DELETE FROM {{{table}}}");
    if let Some(select) = has_select(select) {
        let _ = write!(sql, " WHERE {select}");
    }
    fix_table_names(&sql, state.prefix())
}

pub fn paged_select(
    state: &DialectState,
    sql: &str,
    limit_from: Option<i64>,
    limit_num: Option<i64>,
) -> String {
    let (from, num) = normalise_limits(limit_from, limit_num);
    let mut sql = sql.to_string();

    if from > 0 || num > 0 {
        if state.supports_offset_fetch() {
            if sql.ends_with(';') {
                sql.pop();
            }
            if !sql.to_uppercase().contains("ORDER BY") {
                sql.push_str(" ORDER BY 1");
            }
            let _ = write!(sql, " OFFSET {from} ROWS");
            if num > 0 {
                let _ = write!(sql, " FETCH NEXT {num} ROWS ONLY");
            }
        } else if num >= 1 {
            // Rows before `from` are skipped client side.
            sql = add_top(&sql, from.saturating_add(num));
        }
    }

    let sql = add_no_lock_to_temp_tables(&sql, state);
    fix_table_names(&sql, state.prefix())
}

/// A field counts as present only with a non-null value.
fn field_value<'a>(fields: &'a [(String, Value)], name: &str) -> Option<&'a Value> {
    fields
        .iter()
        .find(|(field, _)| field == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_null())
}

pub fn insert_record_raw<C: Connector + ?Sized>(
    state: &DialectState,
    connector: &C,
    table: &str,
    fields: &[(String, Value)],
    custom_sequence: bool,
) -> Result<String> {
    if fields.is_empty() {
        return Err(SqlTraceError::invalid("can't insert a record with no params"));
    }

    let mut identity = false;
    if custom_sequence {
        if field_value(fields, "id").is_none() {
            return Err(SqlTraceError::invalid("null value in sequence column forbidden"));
        }
        let columns = connector.columns(table).ok_or(SqlTraceError::Configuration("columns"))?;
        identity = columns.get("id").map_or(false, |c| c.auto_increment);
    }

    let mut sql = String::new();
    if identity {
        let _ = writeln!(sql, "SET IDENTITY_INSERT {{{table}}} ON;");
    }
    let names = fields.iter().map(|(f, _)| f.as_str()).collect::<Vec<_>>().join(",");
    let marks = vec!["?"; fields.len()].join(",");
    let _ = write!(sql, "INSERT INTO {{{table}}} ({names}) VALUES({marks})");
    if identity {
        let _ = write!(sql, ";\nSET IDENTITY_INSERT {{{table}}} OFF");
    }

    Ok(fix_table_names(&sql, state.prefix()))
}

pub fn set_field_select<C: Connector + ?Sized>(
    state: &DialectState,
    connector: &C,
    table: &str,
    field: &str,
    value: Value,
    select: Option<&str>,
    mut params: Vec<Value>,
) -> Result<RewriteResult> {
    let columns = connector.columns(table).ok_or(SqlTraceError::Configuration("columns"))?;
    let column = columns
        .get(field)
        .ok_or_else(|| SqlTraceError::invalid(format!("unknown column {field} in {table}")))?;

    let value = connector.coerce_value(column, value);
    let assignment = if value.is_null() {
        format!("{field} = NULL")
    } else {
        params.insert(0, value);
        format!("{field} = ?")
    };

    let mut sql = format!("UPDATE {{{table}}} SET {assignment}");
    if let Some(select) = has_select(select) {
        let _ = write!(sql, " WHERE {select}");
    }

    Ok(RewriteResult { sql: fix_table_names(&sql, state.prefix()), params })
}

pub fn update_record_raw(state: &DialectState, table: &str, fields: Fields) -> Result<RewriteResult> {
    let Some(id) = field_value(&fields, "id").cloned() else {
        return Err(SqlTraceError::invalid("id field must be specified"));
    };

    let (names, mut params): (Vec<String>, Vec<Value>) =
        fields.into_iter().filter(|(field, _)| field != "id").unzip();
    if names.is_empty() {
        return Err(SqlTraceError::invalid("no fields found"));
    }
    params.push(id);

    let sets = names.iter().map(|f| format!("{f} = ?")).collect::<Vec<_>>().join(",");
    let sql = format!("UPDATE {{{table}}} SET {sets} WHERE id = ?");

    Ok(RewriteResult { sql: fix_table_names(&sql, state.prefix()), params })
}
