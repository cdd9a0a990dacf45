//! The InfluxDB 2.x write path.
//!
//! A write request is addressed to a tenant through its query parameters and
//! carries line protocol in its body. The [`WriteService`] normalizes the
//! precision, resolves the tenant, decodes the body and hands the points to a
//! [`PointsWriter`]. The [`http::HttpDelegate`] exposes it over HTTP.

pub mod http;
pub mod mock;
mod service;
pub mod storage;
mod writer;

pub use service::{WriteError, WriteOutcome, WriteParams, WriteService};
pub use writer::{PointsWriter, PointsWriterError};
