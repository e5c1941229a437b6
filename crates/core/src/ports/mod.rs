mod document_source;
mod pagination;

pub use document_source::*;
pub use pagination::*;
