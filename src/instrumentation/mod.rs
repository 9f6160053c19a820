pub mod sqlsrv;

pub use sqlsrv::{CallContext, SqlsrvInstrumentation, CATEGORY_SQL};
