pub mod annotation;
pub mod prom;
pub mod sink;

pub use annotation::Annotation;
pub use sink::{RecordedSpan, RecordingSink, SpanSink, TracingSink};
