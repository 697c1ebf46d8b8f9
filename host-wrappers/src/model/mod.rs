//! Representative wrapper types over a document-style object model.
//!
//! Each type is thin forwarding over [`WrapperCore`](crate::wrapper::WrapperCore):
//! scalar getters degrade to a documented default, mutators propagate
//! faults, object-valued properties are cached, and collections register
//! the elements they hand out.

mod application;
mod document;
mod format;
mod range;

pub use application::Application;
pub use document::{Document, Documents};
pub use format::{Border, Borders, Color, Font, LINE_STYLE, LineStyle, UNDERLINE, Underline};
pub use range::Range;
