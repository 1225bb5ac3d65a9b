//! Resume extraction and content-addressed caching (spec §4.6, C6).

pub mod extract;
pub mod formatter;
pub mod hashing;
pub mod normalize;
pub mod service;

pub use formatter::{HtmlFormatter, LlmHtmlFormatter, NullFormatter};
pub use service::{ResumeExtractor, ResumeText};
