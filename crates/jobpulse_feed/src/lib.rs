//! Feed builder & publisher (spec §4.4, C3/C4): composes the public job XML
//! feed from ATS data and the reference store, then uploads it to the
//! remote file drop.

pub mod builder;
pub mod classify;
pub mod publish;
pub mod service;
pub mod xml;

pub use builder::{BuildInput, BuiltFeed};
pub use classify::{ClassificationProvider, ClassificationTags, NullClassifier};
pub use service::{PublishOutcome, PublishService};
