use std::{borrow::Cow, io::Read, str::Utf8Error};

use influxdb2_types::{Precision, time::Time};
use influxdb_line_protocol::parse_lines;
use thiserror::Error;
use tracing::{debug, trace};

use crate::Point;

/// Errors returned while turning a request body into points.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The `Content-Encoding` is neither identity nor gzip.
    #[error("unsupported content encoding: {0}")]
    InvalidContentEncoding(String),

    /// Decoding a gzip-compressed stream of data failed.
    #[error("error decoding gzip stream: {0}")]
    InvalidGzip(std::io::Error),

    /// The (decompressed) body is larger than the configured maximum.
    #[error("max request size ({0} bytes) exceeded")]
    RequestSizeExceeded(usize),

    #[error("body content is not valid utf8: {0}")]
    NonUtf8Body(#[source] Utf8Error),

    /// The body is not well-formed line protocol.
    #[error("failed to parse line protocol (point {point}): {source}")]
    ParseFailed {
        /// 1-based index of the offending point within the body.
        point: usize,
        source: influxdb_line_protocol::Error,
    },

    /// An explicit timestamp cannot be represented in nanoseconds.
    #[error("timestamp {timestamp} at point {point} overflows at precision {precision:?}")]
    TimestampOverflow {
        point: usize,
        timestamp: i64,
        precision: Precision,
    },
}

impl DecodeError {
    /// Whether this error describes a malformed payload, as opposed to a
    /// transport-level problem.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::NonUtf8Body(_) | Self::ParseFailed { .. } | Self::TimestampOverflow { .. }
        )
    }
}

/// The `Content-Encoding` of a write body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContentEncoding {
    #[default]
    Identity,
    Gzip,
}

impl ContentEncoding {
    /// Interpret an optional `Content-Encoding` header value.
    pub fn from_header(value: Option<&str>) -> Result<Self, DecodeError> {
        match value {
            None | Some("") | Some("identity") => Ok(Self::Identity),
            Some("gzip") => Ok(Self::Gzip),
            Some(other) => Err(DecodeError::InvalidContentEncoding(other.to_string())),
        }
    }
}

/// The result of decoding a write body.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Points(Vec<Point>),
    /// The body held no points at all. This is not an error.
    Empty,
}

/// Decodes (optionally gzip compressed) line protocol bodies into
/// [`Point`]s, bounding the decompressed size at `max_body_bytes`.
#[derive(Debug, Clone, Copy)]
pub struct LineDecoder {
    max_body_bytes: usize,
}

impl LineDecoder {
    pub fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Decode `body` into points.
    ///
    /// `length_hint` is the declared content length of the request. It only
    /// sizes the decompression buffer and is ignored when absent or not
    /// positive. Points without a timestamp are assigned `default_time`
    /// truncated to `precision`; explicit timestamps are scaled from
    /// `precision` to nanoseconds.
    pub fn decode(
        &self,
        body: &[u8],
        encoding: ContentEncoding,
        length_hint: Option<i64>,
        precision: Precision,
        default_time: Time,
    ) -> Result<Decoded, DecodeError> {
        let data = match encoding {
            ContentEncoding::Identity => {
                if body.len() > self.max_body_bytes {
                    return Err(DecodeError::RequestSizeExceeded(self.max_body_bytes));
                }
                Cow::Borrowed(body)
            }
            // An empty gzip body carries no stream header, and so no points.
            ContentEncoding::Gzip if body.is_empty() => return Ok(Decoded::Empty),
            ContentEncoding::Gzip => Cow::Owned(self.gunzip(body, length_hint)?),
        };

        self.parse(&data, precision, default_time)
    }

    fn gunzip(&self, body: &[u8], length_hint: Option<i64>) -> Result<Vec<u8>, DecodeError> {
        let capacity = length_hint
            .and_then(|n| usize::try_from(n).ok())
            .filter(|&n| n > 0)
            .map(|n| n.min(self.max_body_bytes))
            .unwrap_or_default();

        // Read at most max_body_bytes + 1 bytes so a truncated read can be
        // told apart from a body of exactly the maximum size.
        let mut decoder =
            flate2::read::MultiGzDecoder::new(body).take(self.max_body_bytes as u64 + 1);
        let mut decoded = Vec::with_capacity(capacity);
        decoder
            .read_to_end(&mut decoded)
            .map_err(DecodeError::InvalidGzip)?;

        if decoded.len() > self.max_body_bytes {
            return Err(DecodeError::RequestSizeExceeded(self.max_body_bytes));
        }

        trace!(
            compressed = body.len(),
            decompressed = decoded.len(),
            "decompressed gzip body"
        );
        Ok(decoded)
    }

    fn parse(
        &self,
        data: &[u8],
        precision: Precision,
        default_time: Time,
    ) -> Result<Decoded, DecodeError> {
        let lp = std::str::from_utf8(data).map_err(DecodeError::NonUtf8Body)?;
        let default_timestamp = precision.truncate(default_time.timestamp_nanos());

        let points = parse_lines(lp)
            .enumerate()
            .map(|(idx, line)| {
                let point = idx + 1;
                let line = line.map_err(|source| DecodeError::ParseFailed { point, source })?;
                let timestamp = match line.timestamp {
                    Some(ts) => precision.to_nanos(ts).ok_or(DecodeError::TimestampOverflow {
                        point,
                        timestamp: ts,
                        precision,
                    })?,
                    None => default_timestamp,
                };
                Ok(Point::from_parsed(&line, timestamp))
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        debug!(
            body_size = data.len(),
            points = points.len(),
            %precision,
            "decoded line protocol"
        );

        if points.is_empty() {
            return Ok(Decoded::Empty);
        }
        Ok(Decoded::Points(points))
    }
}
