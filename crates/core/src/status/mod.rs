//! Remote status fetching and normalization.

/// Decoding of the remote status body into snapshots.
pub mod parse;
/// Transport to the remote status endpoint.
pub mod source;

pub use parse::parse_status_body;
pub use source::{HttpStatusSource, StatusSource};
