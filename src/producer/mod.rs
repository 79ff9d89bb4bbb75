//! Producer side: conditional appends and stream reads.

mod appender;
mod reader;

pub use appender::ConditionalAppender;
pub use reader::{ReadOutcome, StreamReader};
