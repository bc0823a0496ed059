// Synthetic content: log records, log batches and trace trees
pub mod batch;
pub mod content;
pub mod trace;

pub use batch::{LogBatch, LogRecord, assemble};
pub use content::{Level, next_event, next_level};
pub use trace::{Span, Trace, TraceShape, build_trace};

/// Shutdown arrived while a unit of work was still being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("generation cancelled by shutdown")]
pub struct Cancelled;
