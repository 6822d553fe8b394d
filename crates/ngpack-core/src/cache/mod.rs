//! Caches kept between incremental builds
//!
//! Everything here lives on the coordinating thread. Workers receive owned
//! copies of what they need and never see these structures.

mod diagnostic;
mod load_result;
mod source_file;

pub use diagnostic::DiagnosticCache;
pub use load_result::{cached_load, load_cache_key, LoadResult, LoadResultCache, Loader, OutputFile};
pub use source_file::SourceFileCache;
