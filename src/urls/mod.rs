//! The url table and its diagnostics.

mod conflict;
mod table;

pub use conflict::{UrlConflict, format_conflicts, print_conflicts};
pub use table::{UrlEntry, UrlEvent, UrlListener, UrlSnapshot, UrlTable};
