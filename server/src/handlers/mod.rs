//! Request handlers for documents and attachments.

mod attachments;
mod documents;

pub use attachments::*;
pub use documents::*;
