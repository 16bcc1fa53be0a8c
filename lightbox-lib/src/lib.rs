//! Media indexing pipeline: scan a folder tree, extract per-file metadata
//! through the [`extract::Extractor`] boundary, persist it in the
//! [`store::MediaStore`], and stream freshly committed records to a display
//! surface via the [`feed::MediaFeed`].

pub mod error;
pub mod extract;
pub mod feed;
pub mod media;
pub mod retry;
pub mod scanner;
pub mod store;

pub use error::Error;
