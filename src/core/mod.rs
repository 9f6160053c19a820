pub mod dialect;
pub mod registry;
pub mod rewrite;
pub mod template;
pub mod value;

pub use dialect::{ColumnInfo, ColumnType, Columns, Connector, DialectState, ServerInfo, TempTablePredicate};
pub use registry::{ConnectionId, Registry};
pub use rewrite::{rewrite, OperationKind, RewriteRequest, RewriteResult};
pub use value::{Fields, Value};
