//! In-memory implementations of the directory services, used by the
//! standalone server and by tests.

use std::{
    collections::HashMap,
    num::NonZeroU64,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use influxdb2_types::{
    Bucket, BucketFilter, DbrpMapping, DbrpMappingFilter, Id, Organization, OrganizationFilter,
};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::directory::{BucketService, DbrpMappingService, DirectoryError, OrganizationService};

/// IDs handed out by [`MemDirectory`] count up from here.
const ID_BASE: NonZeroU64 = NonZeroU64::new(0x05c1_9117_091a_1000).unwrap();

/// The kinds of lookup served by [`MemDirectory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookup {
    Organization,
    Bucket,
    DbrpMapping,
}

/// A single in-memory directory implementing [`OrganizationService`],
/// [`BucketService`] and [`DbrpMappingService`].
///
/// Lookups can be made to fail or to stall in order to exercise error and
/// cancellation paths.
#[derive(Debug, Default)]
pub struct MemDirectory {
    next_id: AtomicU64,
    orgs: RwLock<Vec<Organization>>,
    buckets: RwLock<Vec<Bucket>>,
    dbrps: RwLock<Vec<DbrpMapping>>,

    failures: Mutex<HashMap<Lookup, String>>,
    latency: Mutex<Option<Duration>>,
    lookups: Mutex<HashMap<Lookup, usize>>,
}

impl MemDirectory {
    fn next_id(&self) -> Id {
        Id::from(ID_BASE.saturating_add(self.next_id.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn create_organization(&self, name: impl Into<String>) -> Organization {
        let org = Organization {
            id: self.next_id(),
            name: name.into(),
        };
        debug!(org_id = %org.id, name = %org.name, "created organization");
        self.orgs.write().push(org.clone());
        org
    }

    pub fn create_bucket(&self, org_id: Id, name: impl Into<String>) -> Bucket {
        let bucket = Bucket {
            id: self.next_id(),
            org_id,
            name: name.into(),
        };
        debug!(%org_id, bucket_id = %bucket.id, name = %bucket.name, "created bucket");
        self.buckets.write().push(bucket.clone());
        bucket
    }

    pub fn create_dbrp_mapping(
        &self,
        database: impl Into<String>,
        retention_policy: impl Into<String>,
        org_id: Id,
        bucket_id: Id,
    ) -> DbrpMapping {
        let mapping = DbrpMapping {
            database: database.into(),
            retention_policy: retention_policy.into(),
            org_id,
            bucket_id,
        };
        self.dbrps.write().push(mapping.clone());
        mapping
    }

    /// Make every subsequent lookup of `kind` fail with an internal error.
    pub fn fail_lookups(&self, kind: Lookup, message: impl Into<String>) {
        self.failures.lock().insert(kind, message.into());
    }

    /// Delay every subsequent lookup by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// The number of lookups of `kind` served so far, including failed ones.
    pub fn lookup_count(&self, kind: Lookup) -> usize {
        self.lookups.lock().get(&kind).copied().unwrap_or_default()
    }

    async fn begin(&self, kind: Lookup) -> Result<(), DirectoryError> {
        *self.lookups.lock().entry(kind).or_default() += 1;

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        match self.failures.lock().get(&kind) {
            Some(message) => Err(DirectoryError::Internal(message.clone().into())),
            None => Ok(()),
        }
    }
}

fn describe(resource: &str, id: Option<Id>, name: Option<&str>) -> String {
    match (id, name) {
        (Some(id), _) => format!("{resource} {id}"),
        (None, Some(name)) => format!("{resource} {name:?}"),
        (None, None) => resource.to_string(),
    }
}

#[async_trait]
impl OrganizationService for MemDirectory {
    async fn find_organization(
        &self,
        filter: OrganizationFilter,
    ) -> Result<Organization, DirectoryError> {
        self.begin(Lookup::Organization).await?;
        self.orgs
            .read()
            .iter()
            .find(|org| filter.matches(org))
            .cloned()
            .ok_or_else(|| {
                DirectoryError::NotFound(describe("organization", filter.id, filter.name.as_deref()))
            })
    }
}

#[async_trait]
impl BucketService for MemDirectory {
    async fn find_bucket(&self, filter: BucketFilter) -> Result<Bucket, DirectoryError> {
        self.begin(Lookup::Bucket).await?;
        self.buckets
            .read()
            .iter()
            .find(|bucket| filter.matches(bucket))
            .cloned()
            .ok_or_else(|| {
                DirectoryError::NotFound(describe("bucket", filter.id, filter.name.as_deref()))
            })
    }
}

#[async_trait]
impl DbrpMappingService for MemDirectory {
    async fn find_many(
        &self,
        filter: DbrpMappingFilter,
    ) -> Result<Vec<DbrpMapping>, DirectoryError> {
        self.begin(Lookup::DbrpMapping).await?;
        Ok(self
            .dbrps
            .read()
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect())
    }
}
