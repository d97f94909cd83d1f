//! Window capture engine.
//!
//! Enumerates top-level windows per virtual desktop and normalizes them into
//! snapshot entries. Acquisition is behind `WindowSource`; the shipped
//! adapter drives an external enumerator command.

mod hints;
mod source;

pub use hints::command_line_hint;
pub use source::{source_from_config, CommandWindowSource, NullWindowSource, WindowSource};
