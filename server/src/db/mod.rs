//! Database module for PostgreSQL persistence.

mod attachments;
mod documents;
mod pool;

pub use attachments::*;
pub use documents::*;
pub use pool::*;
