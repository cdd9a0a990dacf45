use std::{error::Error, fmt::Debug};

use async_trait::async_trait;
use influxdb2_lp::Point;
use influxdb2_tsm::BlockType;
use influxdb2_types::Id;
use thiserror::Error;

/// Errors returned by a [`PointsWriter`].
#[derive(Debug, Error)]
pub enum PointsWriterError {
    /// A field was written with a different type than it already holds.
    #[error(
        "field type conflict: field {field:?} of series {series:?} is type {existing}, \
         got type {attempted}"
    )]
    FieldTypeConflict {
        series: String,
        field: String,
        existing: BlockType,
        attempted: BlockType,
    },

    /// Building or encoding a block failed.
    #[error("failed to build block: {0}")]
    Block(#[from] influxdb2_tsm::Error),

    /// An unknown error occurred while storing the points.
    #[error("internal storage error: {0}")]
    Internal(Box<dyn Error + Send + Sync>),
}

/// The storage-write service that accepted points are handed to.
#[async_trait]
pub trait PointsWriter: Debug + Send + Sync + 'static {
    /// Persist `points` into the bucket `bucket_id` owned by `org_id`.
    async fn write_points(
        &self,
        org_id: Id,
        bucket_id: Id,
        points: Vec<Point>,
    ) -> Result<(), PointsWriterError>;
}
