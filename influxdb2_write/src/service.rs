use std::sync::Arc;

use influxdb2_lp::{ContentEncoding, DecodeError, Decoded, LineDecoder};
use influxdb2_tenant::{TenantError, TenantParams, TenantResolver};
use influxdb2_types::{
    InvalidPrecision, Precision,
    time::{SystemProvider, TimeProvider},
};
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{PointsWriter, PointsWriterError};

/// Errors returned by [`WriteService::write`].
#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    InvalidPrecision(#[from] InvalidPrecision),

    /// Neither addressing scheme resolved a tenant. Carries the error of the
    /// current `org`/`bucket` scheme.
    #[error("failed to resolve tenant: {0}")]
    TenantResolution(#[from] TenantError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The storage-write service rejected the points.
    #[error(transparent)]
    Dispatch(#[from] PointsWriterError),

    #[error("write cancelled")]
    Cancelled,
}

impl WriteError {
    /// Whether the request scope was cancelled before the write completed.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::TenantResolution(TenantError::Cancelled)
        )
    }
}

/// The query parameters of a write request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WriteParams {
    pub precision: Option<String>,
    #[serde(flatten)]
    pub tenant: TenantParams,
}

/// The successful outcomes of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The points were handed to, and accepted by, the storage-write service.
    Accepted,
    /// The body held no points; nothing was dispatched.
    NothingToWrite,
}

/// Runs a write request end to end: normalizes the precision, resolves the
/// tenant, decodes the body and dispatches the points.
#[derive(Debug)]
pub struct WriteService {
    resolver: TenantResolver,
    decoder: LineDecoder,
    writer: Arc<dyn PointsWriter>,
    time_provider: Arc<dyn TimeProvider>,
}

impl WriteService {
    /// Decompressed bodies are limited to `max_body_bytes`.
    pub fn new(
        resolver: TenantResolver,
        writer: Arc<dyn PointsWriter>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            resolver,
            decoder: LineDecoder::new(max_body_bytes),
            writer,
            time_provider: Arc::new(SystemProvider::new()),
        }
    }

    /// Use `time_provider` to timestamp points that carry no timestamp.
    pub fn with_time_provider(self, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            time_provider,
            ..self
        }
    }

    pub fn max_body_bytes(&self) -> usize {
        self.decoder.max_body_bytes()
    }

    /// Write `body` to the tenant named by `params`.
    ///
    /// Every directory lookup and the final dispatch observe `cancel`.
    pub async fn write(
        &self,
        params: &WriteParams,
        body: &[u8],
        encoding: ContentEncoding,
        length_hint: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<WriteOutcome, WriteError> {
        let precision = Precision::normalize(params.precision.as_deref().unwrap_or_default())?;
        let tenant = self.resolver.resolve(&params.tenant, cancel).await?;

        if cancel.is_cancelled() {
            return Err(WriteError::Cancelled);
        }

        let now = self.time_provider.now();
        let points = match self
            .decoder
            .decode(body, encoding, length_hint, precision, now)?
        {
            Decoded::Points(points) => points,
            Decoded::Empty => {
                debug!(
                    org_id = %tenant.org.id,
                    bucket_id = %tenant.bucket.id,
                    "nothing to write"
                );
                return Ok(WriteOutcome::NothingToWrite);
            }
        };

        let n_points = points.len();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WriteError::Cancelled),
            res = self.writer.write_points(tenant.org.id, tenant.bucket.id, points) => res?,
        }

        debug!(
            org_id = %tenant.org.id,
            bucket_id = %tenant.bucket.id,
            n_points,
            %precision,
            "write accepted"
        );
        Ok(WriteOutcome::Accepted)
    }
}
