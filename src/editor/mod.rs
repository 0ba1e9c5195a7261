//! Raw-mode line editing for interactive sessions.

mod buffer;
mod completion;
mod line_editor;
mod raw_mode;

pub use buffer::LineBuffer;
pub use completion::{common_prefix, Completer};
pub use line_editor::{LineEditor, ReadOutcome};
pub use raw_mode::RawMode;
