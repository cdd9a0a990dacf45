use std::{future::Future, sync::Arc};

use influxdb2_types::{
    Bucket, BucketFilter, DbrpMappingFilter, Id, IdError, Organization, OrganizationFilter, Tenant,
};
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::directory::{BucketService, DbrpMappingService, DirectoryError, OrganizationService};

/// Errors returned when a write's tenant cannot be resolved.
#[derive(Debug, Error)]
pub enum TenantError {
    /// Neither `org` nor `org_id` was provided.
    #[error("missing org or org_id parameter")]
    MissingOrganization,

    /// No `bucket` was provided.
    #[error("missing bucket parameter")]
    MissingBucket,

    /// No `db` was provided for a legacy write.
    #[error("missing db parameter")]
    MissingDatabase,

    /// The `org_id` parameter is not a well-formed ID.
    #[error("invalid org_id {value:?}: {source}")]
    InvalidOrgId { value: String, source: IdError },

    #[error("failed to find organization: {0}")]
    Organization(#[source] DirectoryError),

    #[error("failed to find bucket {bucket:?}: {source}")]
    Bucket {
        bucket: String,
        source: DirectoryError,
    },

    #[error("failed to look up DBRP mappings: {0}")]
    LegacyMapping(#[source] DirectoryError),

    /// Zero or more than one legacy mapping matched.
    #[error(
        "failed to find a unique DBRP mapping for db:{database:?}, rp:{retention_policy:?} ({matches} matches)"
    )]
    AmbiguousLegacyMapping {
        database: String,
        retention_policy: String,
        matches: usize,
    },

    /// The request scope was cancelled while a lookup was in flight.
    #[error("tenant resolution cancelled")]
    Cancelled,
}

impl TenantError {
    /// Whether this error is ultimately caused by a missing resource.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Organization(e) | Self::Bucket { source: e, .. } => e.is_not_found(),
            _ => false,
        }
    }

    /// Whether the caller supplied unusable parameters.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Self::MissingOrganization
                | Self::MissingBucket
                | Self::MissingDatabase
                | Self::InvalidOrgId { .. }
                | Self::AmbiguousLegacyMapping { .. }
        )
    }
}

/// The addressing parameters of a write request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TenantParams {
    /// Organization name, or ID if it parses as one.
    pub org: Option<String>,
    pub org_id: Option<String>,
    /// Bucket ID or name.
    pub bucket: Option<String>,
    /// Legacy database.
    pub db: Option<String>,
    /// Legacy retention policy.
    pub rp: Option<String>,
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

/// Resolves the `(Organization, Bucket)` pair targeted by a write.
///
/// The current `org`/`bucket` addressing is tried first; only when it fails
/// is the legacy `db`/`rp` mapping consulted. If both fail, the error from
/// the current scheme is returned.
#[derive(Debug, Clone)]
pub struct TenantResolver {
    orgs: Arc<dyn OrganizationService>,
    buckets: Arc<dyn BucketService>,
    dbrps: Arc<dyn DbrpMappingService>,
}

impl TenantResolver {
    pub fn new(
        orgs: Arc<dyn OrganizationService>,
        buckets: Arc<dyn BucketService>,
        dbrps: Arc<dyn DbrpMappingService>,
    ) -> Self {
        Self {
            orgs,
            buckets,
            dbrps,
        }
    }

    /// Resolve the tenant named by `params`, aborting if `cancel` fires.
    pub async fn resolve(
        &self,
        params: &TenantParams,
        cancel: &CancellationToken,
    ) -> Result<Tenant, TenantError> {
        let err = match self.resolve_current(params, cancel).await {
            Ok(tenant) => return Ok(tenant),
            Err(TenantError::Cancelled) => return Err(TenantError::Cancelled),
            Err(e) => e,
        };

        match self.resolve_legacy(params, cancel).await {
            Ok(tenant) => {
                debug!(
                    error = %err,
                    org_id = %tenant.org.id,
                    bucket_id = %tenant.bucket.id,
                    "resolved tenant through legacy DBRP mapping"
                );
                Ok(tenant)
            }
            Err(TenantError::Cancelled) => Err(TenantError::Cancelled),
            Err(legacy_err) => {
                debug!(error = %err, %legacy_err, "tenant resolution failed");
                Err(err)
            }
        }
    }

    async fn resolve_current(
        &self,
        params: &TenantParams,
        cancel: &CancellationToken,
    ) -> Result<Tenant, TenantError> {
        let org = self.find_organization(params, cancel).await?;
        let bucket = self.find_bucket(params, org.id, cancel).await?;
        Ok(Tenant { org, bucket })
    }

    async fn find_organization(
        &self,
        params: &TenantParams,
        cancel: &CancellationToken,
    ) -> Result<Organization, TenantError> {
        let mut filter = OrganizationFilter::default();
        if let Some(org) = non_empty(&params.org) {
            match org.parse::<Id>() {
                Ok(id) => filter.id = Some(id),
                Err(_) => filter.name = Some(org.to_string()),
            }
        }

        if let Some(org_id) = non_empty(&params.org_id) {
            let id = org_id.parse().map_err(|source| TenantError::InvalidOrgId {
                value: org_id.to_string(),
                source,
            })?;
            filter = OrganizationFilter::by_id(id);
        }

        if filter.is_empty() {
            return Err(TenantError::MissingOrganization);
        }

        trace!(?filter, "finding organization");
        observe(cancel, self.orgs.find_organization(filter))
            .await?
            .map_err(TenantError::Organization)
    }

    async fn find_bucket(
        &self,
        params: &TenantParams,
        org_id: Id,
        cancel: &CancellationToken,
    ) -> Result<Bucket, TenantError> {
        let bucket = non_empty(&params.bucket).ok_or(TenantError::MissingBucket)?;
        let bucket_err = |source| TenantError::Bucket {
            bucket: bucket.to_string(),
            source,
        };

        if let Ok(id) = bucket.parse::<Id>() {
            let filter = BucketFilter {
                org_id: Some(org_id),
                id: Some(id),
                name: None,
            };
            match observe(cancel, self.buckets.find_bucket(filter)).await? {
                Ok(b) => return Ok(b),
                Err(e) if e.is_not_found() => {
                    trace!(%bucket, "no bucket with this id, looking up by name");
                }
                Err(e) => return Err(bucket_err(e)),
            }
        }

        let filter = BucketFilter {
            org_id: Some(org_id),
            id: None,
            name: Some(bucket.to_string()),
        };
        observe(cancel, self.buckets.find_bucket(filter))
            .await?
            .map_err(bucket_err)
    }

    async fn resolve_legacy(
        &self,
        params: &TenantParams,
        cancel: &CancellationToken,
    ) -> Result<Tenant, TenantError> {
        let database = non_empty(&params.db).ok_or(TenantError::MissingDatabase)?;
        let retention_policy = params.rp.clone().unwrap_or_default();

        let filter = DbrpMappingFilter {
            database: Some(database.to_string()),
            retention_policy: Some(retention_policy.clone()),
            ..Default::default()
        };
        let mappings = observe(cancel, self.dbrps.find_many(filter))
            .await?
            .map_err(TenantError::LegacyMapping)?;

        let [mapping] = mappings.as_slice() else {
            return Err(TenantError::AmbiguousLegacyMapping {
                database: database.to_string(),
                retention_policy,
                matches: mappings.len(),
            });
        };

        let org = observe(cancel, self.orgs.find_organization_by_id(mapping.org_id))
            .await?
            .map_err(TenantError::Organization)?;
        let bucket = observe(cancel, self.buckets.find_bucket_by_id(mapping.bucket_id))
            .await?
            .map_err(|source| TenantError::Bucket {
                bucket: mapping.bucket_id.to_string(),
                source,
            })?;

        Ok(Tenant { org, bucket })
    }
}

/// Drive `fut` to completion unless `cancel` fires first.
async fn observe<F, T>(cancel: &CancellationToken, fut: F) -> Result<T, TenantError>
where
    F: Future<Output = T> + Send,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TenantError::Cancelled),
        v = fut => Ok(v),
    }
}
