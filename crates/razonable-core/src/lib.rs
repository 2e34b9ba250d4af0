// ABOUTME: Core library for razonable, containing the record envelope and cursor vocabulary.
// ABOUTME: This crate has no I/O; the store crate builds persistence on top of these types.

pub mod clock;
pub mod cursor;
pub mod record;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cursor::{CursorError, Direction, Index, OrderValue, ResumePoint, SavedCursor};
pub use record::Record;
