//! HTTP write endpoints.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use hyper::{
    Body, Method, Request, Response, StatusCode,
    header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE},
};
use influxdb2_lp::{ContentEncoding, DecodeError};
use influxdb2_tenant::TenantError;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::{PointsWriterError, WriteError, WriteOutcome, WriteParams, WriteService};

/// Errors returned by the [`HttpDelegate`].
#[derive(Debug, Error)]
pub enum Error {
    /// The requested path has no registered handler.
    #[error("not found")]
    NoHandler,

    /// The `Content-Encoding` header is invalid and cannot be read.
    #[error("invalid content-encoding header: {0}")]
    NonUtf8ContentHeader(hyper::header::ToStrError),

    /// The query string could not be decoded.
    #[error("failed to deserialise write parameters: {0}")]
    InvalidParams(#[from] serde::de::value::Error),

    /// The client disconnected.
    #[error("client disconnected")]
    ClientHangup(hyper::Error),

    /// The client sent a request body that exceeds the configured maximum.
    #[error("max request size ({0} bytes) exceeded")]
    RequestSizeExceeded(usize),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// The `code` of an InfluxDB v2 API error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "invalid")]
    Invalid,
    #[serde(rename = "not found")]
    NotFound,
    #[serde(rename = "request too large")]
    RequestTooLarge,
    #[serde(rename = "unavailable")]
    Unavailable,
    #[serde(rename = "internal error")]
    InternalError,
}

impl ErrorCode {
    pub fn as_status_code(&self) -> StatusCode {
        match self {
            Self::Invalid => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RequestTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse<'a> {
    code: ErrorCode,
    message: &'a str,
}

impl Error {
    /// Classify the error into a v2 API error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoHandler => ErrorCode::NotFound,
            Self::NonUtf8ContentHeader(_) | Self::InvalidParams(_) | Self::ClientHangup(_) => {
                ErrorCode::Invalid
            }
            Self::RequestSizeExceeded(_) => ErrorCode::RequestTooLarge,
            Self::Write(e) if e.is_cancelled() => ErrorCode::Unavailable,
            Self::Write(WriteError::InvalidPrecision(_)) => ErrorCode::Invalid,
            Self::Write(WriteError::TenantResolution(e)) => tenant_error_code(e),
            Self::Write(WriteError::Decode(DecodeError::RequestSizeExceeded(_))) => {
                ErrorCode::RequestTooLarge
            }
            Self::Write(WriteError::Decode(_)) => ErrorCode::Invalid,
            Self::Write(WriteError::Dispatch(PointsWriterError::FieldTypeConflict { .. })) => {
                ErrorCode::Invalid
            }
            Self::Write(WriteError::Dispatch(_) | WriteError::Cancelled) => {
                ErrorCode::InternalError
            }
        }
    }

    /// Convert the error into an appropriate [`StatusCode`] to be returned to
    /// the end user.
    pub fn as_status_code(&self) -> StatusCode {
        self.code().as_status_code()
    }

    /// Render the error as a JSON `{"code", "message"}` response.
    pub fn into_response(self) -> Response<Body> {
        let code = self.code();
        let message = self.to_string();
        let body = serde_json::to_vec(&ErrorResponse {
            code,
            message: &message,
        })
        .unwrap_or_else(|_| message.clone().into_bytes());

        Response::builder()
            .status(code.as_status_code())
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .body(Body::from(body))
            .unwrap_or_else(|_| Response::new(Body::from(message)))
    }
}

fn tenant_error_code(e: &TenantError) -> ErrorCode {
    if e.is_invalid_request() {
        ErrorCode::Invalid
    } else if e.is_not_found() {
        ErrorCode::NotFound
    } else {
        ErrorCode::InternalError
    }
}

/// Services requests to the write endpoints.
///
/// Each write runs under its own cancellation token, a child of the
/// delegate's shutdown token, which is cancelled once `write_timeout`
/// elapses. The timeout starts before the request body is read.
#[derive(Debug)]
pub struct HttpDelegate {
    max_request_bytes: usize,
    write_timeout: Duration,
    shutdown: CancellationToken,
    service: WriteService,
}

impl HttpDelegate {
    /// HTTP request bodies are limited to `max_request_bytes` in size, both
    /// before and after decompression.
    pub fn new(max_request_bytes: usize, write_timeout: Duration, service: WriteService) -> Self {
        Self {
            max_request_bytes,
            write_timeout,
            shutdown: CancellationToken::new(),
            service,
        }
    }

    /// Cancel in-flight writes when `shutdown` is cancelled.
    pub fn with_shutdown(self, shutdown: CancellationToken) -> Self {
        Self { shutdown, ..self }
    }

    /// Routes `req` to the appropriate handler, if any, returning the handler
    /// response.
    pub async fn route(&self, req: Request<Body>) -> Result<Response<Body>, Error> {
        match (req.method(), req.uri().path()) {
            (&Method::POST, "/api/v2/write" | "/write") => self.write_handler(req).await,
            (&Method::GET, "/health") => Ok(response_health()),
            _ => Err(Error::NoHandler),
        }
    }

    /// Like [`route`](Self::route), rendering errors as responses.
    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        match self.route(req).await {
            Ok(response) => response,
            Err(e) => {
                let status = e.as_status_code();
                if status.is_server_error() {
                    error!(error = %e, %method, %path, %status, "error handling request");
                } else {
                    warn!(error = %e, %method, %path, %status, "rejected request");
                }
                e.into_response()
            }
        }
    }

    async fn write_handler(&self, req: Request<Body>) -> Result<Response<Body>, Error> {
        let params: WriteParams = serde_urlencoded::from_str(req.uri().query().unwrap_or_default())?;
        let encoding = req
            .headers()
            .get(&CONTENT_ENCODING)
            .map(|v| v.to_str().map_err(Error::NonUtf8ContentHeader))
            .transpose()?;
        let encoding = ContentEncoding::from_header(encoding).map_err(WriteError::from)?;
        let length_hint = req
            .headers()
            .get(&CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok());

        trace!(?params, ?encoding, ?length_hint, "processing write request");

        // The deadline covers reading the body as well as the write itself.
        let cancel = self.shutdown.child_token();
        let _guard = cancel.clone().drop_guard();
        let deadline = tokio::time::sleep(self.write_timeout);
        tokio::pin!(deadline);

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WriteError::Cancelled.into()),
            _ = &mut deadline => {
                debug!(timeout = ?self.write_timeout, "timed out reading request body");
                return Err(WriteError::Cancelled.into());
            }
            res = self.read_body(req, length_hint) => res?,
        };

        let write = self
            .service
            .write(&params, &body, encoding, length_hint, &cancel);
        tokio::pin!(write);

        let outcome = tokio::select! {
            res = &mut write => res,
            _ = &mut deadline => {
                debug!(timeout = ?self.write_timeout, "write timed out");
                cancel.cancel();
                write.await
            }
        }?;

        Ok(match outcome {
            WriteOutcome::Accepted => response_no_content(),
            WriteOutcome::NothingToWrite => response_ok(),
        })
    }

    /// Read the raw request body, bounded by the configured maximum size.
    async fn read_body(
        &self,
        req: Request<Body>,
        length_hint: Option<i64>,
    ) -> Result<Bytes, Error> {
        let capacity = length_hint
            .and_then(|n| usize::try_from(n).ok())
            .filter(|&n| n <= self.max_request_bytes)
            .unwrap_or_default();

        let mut payload = req.into_body();
        let mut body = BytesMut::with_capacity(capacity);
        while let Some(chunk) = payload.next().await {
            let chunk = chunk.map_err(Error::ClientHangup)?;
            // limit max size of in-memory payload
            if (body.len() + chunk.len()) > self.max_request_bytes {
                return Err(Error::RequestSizeExceeded(self.max_request_bytes));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

fn response_no_content() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

fn response_ok() -> Response<Body> {
    Response::new(Body::empty())
}

fn response_health() -> Response<Body> {
    let mut response = Response::new(Body::from(r#"{"name":"influxdb2_ingest","status":"pass"}"#));
    response.headers_mut().insert(
        CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json; charset=utf-8"),
    );
    response
}
