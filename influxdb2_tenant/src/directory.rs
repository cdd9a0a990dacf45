//! Abstract lookups against the organization, bucket and legacy mapping
//! directories.

use std::fmt::Debug;

use async_trait::async_trait;
use influxdb2_types::{
    Bucket, BucketFilter, DbrpMapping, DbrpMappingFilter, Id, Organization, OrganizationFilter,
};
use thiserror::Error;

/// Errors emitted by a directory lookup.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// No resource matched the lookup filter.
    #[error("{0} not found")]
    NotFound(String),

    /// The directory failed to service the lookup.
    #[error("directory lookup failed: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl DirectoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Read access to organizations.
#[async_trait]
pub trait OrganizationService: Debug + Send + Sync + 'static {
    /// Return the single organization matching `filter`.
    async fn find_organization(
        &self,
        filter: OrganizationFilter,
    ) -> Result<Organization, DirectoryError>;

    async fn find_organization_by_id(&self, id: Id) -> Result<Organization, DirectoryError> {
        self.find_organization(OrganizationFilter::by_id(id)).await
    }
}

/// Read access to buckets.
#[async_trait]
pub trait BucketService: Debug + Send + Sync + 'static {
    /// Return the single bucket matching `filter`.
    async fn find_bucket(&self, filter: BucketFilter) -> Result<Bucket, DirectoryError>;

    async fn find_bucket_by_id(&self, id: Id) -> Result<Bucket, DirectoryError> {
        self.find_bucket(BucketFilter::by_id(id)).await
    }
}

/// Read access to the legacy database/retention-policy mappings.
#[async_trait]
pub trait DbrpMappingService: Debug + Send + Sync + 'static {
    /// Return every mapping matching `filter`, in directory order.
    async fn find_many(&self, filter: DbrpMappingFilter)
    -> Result<Vec<DbrpMapping>, DirectoryError>;
}
