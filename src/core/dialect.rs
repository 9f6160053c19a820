use ahash::{AHashMap, AHashSet};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

use crate::core::value::Value;
use crate::error::{Result, SqlTraceError};

/// Answers whether a bare table name (no prefix, no braces) is a session temp table.
pub type TempTablePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Column metadata keyed by column name.
pub type Columns = AHashMap<String, ColumnInfo>;

/// Server details gathered once the driver has connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerInfo {
    /// Major version, e.g. `13` for SQL Server 2016.
    pub version: u32,
}

impl ServerInfo {
    pub fn new(version: u32) -> Self {
        Self { version }
    }

    /// Reads the major version from a dotted version string such as `13.00.4001`.
    pub fn parse(version: &str) -> Option<Self> {
        let major = version.trim().split('.').next()?;
        major.parse().ok().map(Self::new)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Number,
    Float,
    Char,
    Text,
    Binary,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: ColumnType,
    pub auto_increment: bool,
}

/// What the instrumented driver has to expose so its SQL can be reproduced.
///
/// `reserved_words` and `temp_table_predicate` are optional capabilities; a
/// driver that cannot provide them cannot be instrumented and
/// [`DialectState::from_connector`] reports a configuration error.
pub trait Connector {
    fn prefix(&self) -> String;

    fn reserved_words(&self) -> Option<Vec<String>> {
        None
    }

    fn temp_table_predicate(&self) -> Option<TempTablePredicate> {
        None
    }

    /// Only meaningful once connected.
    fn server_info(&self) -> Option<ServerInfo> {
        None
    }

    /// Schema introspection for `table` (unprefixed).
    ///
    /// Not checked when the dialect state is built: only inserts with a custom
    /// sequence and `set_field_select` need it, and those calls report a
    /// configuration error when it is missing.
    fn columns(&self, _table: &str) -> Option<Columns> {
        None
    }

    /// Converts `value` into the representation the driver binds for `column`.
    fn coerce_value(&self, _column: &ColumnInfo, value: Value) -> Value {
        value
    }
}

/// Per-connection rewrite settings.
pub struct DialectState {
    prefix: String,
    reserved_words: AHashSet<String>,
    temp_tables: TempTablePredicate,
    server_info: OnceCell<ServerInfo>,
}

impl DialectState {
    pub fn new<I, W>(prefix: impl Into<String>, reserved_words: I, temp_tables: TempTablePredicate) -> Self
    where
        I: IntoIterator<Item = W>,
        W: AsRef<str>,
    {
        Self {
            prefix: prefix.into(),
            reserved_words: reserved_words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .collect(),
            temp_tables,
            server_info: OnceCell::new(),
        }
    }

    pub fn from_connector<C: Connector + ?Sized>(connector: &C) -> Result<Self> {
        let reserved = connector
            .reserved_words()
            .ok_or(SqlTraceError::Configuration("reserved_words"))?;
        let temp_tables = connector
            .temp_table_predicate()
            .ok_or(SqlTraceError::Configuration("temp_table_predicate"))?;
        Ok(Self::new(connector.prefix(), reserved, temp_tables))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_reserved(&self, word: &str) -> bool {
        self.reserved_words.contains(&word.trim().to_lowercase())
    }

    pub fn is_temp_table(&self, name: &str) -> bool {
        (self.temp_tables)(name)
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.get()
    }

    /// Records server details. The first call wins; returns whether this call set them.
    pub fn set_server_info(&self, info: ServerInfo) -> bool {
        self.server_info.set(info).is_ok()
    }

    /// `OFFSET ... FETCH` exists from SQL Server 2012 (v11) on; the driver only
    /// uses it above 11. Unknown versions fall back to `TOP`.
    pub fn supports_offset_fetch(&self) -> bool {
        self.server_info().map_or(false, |info| info.version > 11)
    }
}

impl fmt::Debug for DialectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialectState")
            .field("prefix", &self.prefix)
            .field("reserved_words", &self.reserved_words.len())
            .field("server_info", &self.server_info.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PrefixOnly;
    impl Connector for PrefixOnly {
        fn prefix(&self) -> String {
            "mdl_".into()
        }
    }

    struct Full;
    impl Connector for Full {
        fn prefix(&self) -> String {
            "mdl_".into()
        }
        fn reserved_words(&self) -> Option<Vec<String>> {
            Some(vec!["WHERE".into(), " on ".into()])
        }
        fn temp_table_predicate(&self) -> Option<TempTablePredicate> {
            Some(Arc::new(|name: &str| name.starts_with("tmp_")))
        }
    }

    #[test]
    fn missing_capability_is_a_configuration_error() {
        let err = DialectState::from_connector(&PrefixOnly).unwrap_err();
        assert_eq!(err, SqlTraceError::Configuration("reserved_words"));
    }

    #[test]
    fn reserved_words_are_normalised() {
        let state = DialectState::from_connector(&Full).unwrap();
        assert_eq!(state.prefix(), "mdl_");
        assert!(state.is_reserved("where"));
        assert!(state.is_reserved(" ON"));
        assert!(!state.is_reserved("alias"));
        assert!(state.is_temp_table("tmp_users"));
        assert!(!state.is_temp_table("user"));
    }

    #[test]
    fn server_info_is_write_once() {
        let state = DialectState::from_connector(&Full).unwrap();
        assert!(!state.supports_offset_fetch());
        assert!(state.set_server_info(ServerInfo::new(13)));
        assert!(!state.set_server_info(ServerInfo::new(10)));
        assert_eq!(state.server_info().map(|i| i.version), Some(13));
        assert!(state.supports_offset_fetch());
    }

    #[test]
    fn parse_reads_major_version() {
        assert_eq!(ServerInfo::parse("13.00.4001"), Some(ServerInfo { version: 13 }));
        assert_eq!(ServerInfo::parse(" 15 "), Some(ServerInfo::new(15)));
    }

    #[test]
    fn columns_capability_is_optional_at_build_time() {
        let state = DialectState::from_connector(&Full).unwrap();
        assert_eq!(state.prefix(), "mdl_");
        assert!(Full.columns("user").is_none());
    }

    #[test]
    fn version_eleven_is_legacy() {
        let state = DialectState::from_connector(&Full).unwrap();
        state.set_server_info(ServerInfo::parse("11.00.2100").unwrap());
        assert!(!state.supports_offset_fetch());
        assert_eq!(ServerInfo::parse("garbage"), None);
    }
}
