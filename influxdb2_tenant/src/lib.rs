//! Tenant resolution for the InfluxDB 2.x write path.
//!
//! A write names its destination either with the current `org`/`org_id` +
//! `bucket` parameters, or with the 1.x `db`/`rp` parameters which are
//! translated through a legacy DBRP mapping. The [`TenantResolver`] turns
//! those parameters into exactly one `(Organization, Bucket)` pair by
//! consulting the directory services defined in [`directory`].

pub mod directory;
pub mod mem;
pub mod resolver;

pub use directory::{BucketService, DbrpMappingService, DirectoryError, OrganizationService};
pub use resolver::{TenantError, TenantParams, TenantResolver};
