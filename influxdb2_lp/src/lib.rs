//! Decoding of line protocol write bodies into owned [`Point`]s.
//!
//! Bodies may be gzip compressed and are bounded in size. Parsing is
//! delegated to the [`influxdb_line_protocol`] crate; this crate resolves
//! timestamps against the write precision and a default time.

mod decoder;
mod point;

pub use decoder::{ContentEncoding, DecodeError, Decoded, LineDecoder};
pub use point::{FieldValue, Point};
