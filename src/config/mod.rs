pub mod global;

pub use global::{global, initiate, ServiceKind, SqlTraceGlobalConfig};
