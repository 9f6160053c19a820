//! Text-level transforms over templated SQL, where tables are written `{name}`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::core::dialect::DialectState;

static TABLE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-z][a-z0-9_]*)\}").expect("table placeholder pattern"));

static TABLE_WITH_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\{([a-z][a-z0-9_]*)\})(\s+[A-Za-z0-9_]+)?").expect("table tail pattern")
});

static LEADING_SELECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^([\s(]*)SELECT\b(\s+(?:DISTINCT|ALL)\b)?").expect("leading select pattern")
});

static TOP_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*TOP\s*\(").expect("top call pattern"));

/// Replaces every `{name}` with `prefix` + `name`.
pub fn fix_table_names(sql: &str, prefix: &str) -> String {
    TABLE_PLACEHOLDER
        .replace_all(sql, |caps: &Captures| format!("{prefix}{}", &caps[1]))
        .into_owned()
}

/// Adds `WITH (NOLOCK)` after every temp-table reference.
///
/// A reserved word directly after the table (`{tmp} WHERE`) stays after the
/// hint; an alias (`{tmp} t`) is kept before it.
pub fn add_no_lock_to_temp_tables(sql: &str, state: &DialectState) -> String {
    TABLE_WITH_TAIL
        .replace_all(sql, |caps: &Captures| {
            let whole = &caps[0];
            if !state.is_temp_table(&caps[2]) {
                return whole.to_string();
            }
            match caps.get(3) {
                Some(tail) if state.is_reserved(tail.as_str()) => {
                    format!("{} WITH (NOLOCK){}", &caps[1], tail.as_str())
                }
                _ => format!("{whole} WITH (NOLOCK)"),
            }
        })
        .into_owned()
}

/// Turns the leading `SELECT [DISTINCT|ALL]` into `SELECT [DISTINCT|ALL] TOP fetch`.
///
/// Statements that already carry `TOP(` or do not start with SELECT are returned as-is.
pub fn add_top(sql: &str, fetch: i64) -> String {
    let Some(caps) = LEADING_SELECT.captures(sql) else {
        return sql.to_string();
    };
    let end = caps.get(0).map_or(0, |m| m.end());
    let rest = &sql[end..];
    if TOP_CALL.is_match(rest) {
        return sql.to_string();
    }
    let lead = caps.get(1).map_or("", |m| m.as_str());
    let modifier = caps.get(2).map_or("", |m| m.as_str());
    format!("{lead}SELECT{modifier} TOP {fetch}{rest}")
}
