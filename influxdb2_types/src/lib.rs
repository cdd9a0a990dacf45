//! Shared types for the InfluxDB 2.x write path: identifiers, the tenant
//! model (organizations, buckets and legacy database/retention-policy
//! mappings), lookup filters, write precision and the wall clock.

pub mod id;
pub mod precision;
pub mod time;

pub use id::{Id, IdError};
pub use precision::{InvalidPrecision, Precision};

use serde::{Deserialize, Serialize};

/// An organization, the top level of tenancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Id,
    pub name: String,
}

/// A named bucket of time series data owned by an [`Organization`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub id: Id,
    #[serde(rename = "orgID")]
    pub org_id: Id,
    pub name: String,
}

/// Translation of a 1.x `(database, retention policy)` pair onto a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbrpMapping {
    pub database: String,
    pub retention_policy: String,
    #[serde(rename = "orgID")]
    pub org_id: Id,
    #[serde(rename = "bucketID")]
    pub bucket_id: Id,
}

/// The `(Organization, Bucket)` pair a write is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub org: Organization,
    pub bucket: Bucket,
}

/// Selects organizations by ID and/or name. An empty filter matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizationFilter {
    pub id: Option<Id>,
    pub name: Option<String>,
}

impl OrganizationFilter {
    pub fn by_id(id: Id) -> Self {
        Self {
            id: Some(id),
            name: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.name.is_none()
    }

    pub fn matches(&self, org: &Organization) -> bool {
        !self.is_empty()
            && self.id.is_none_or(|id| id == org.id)
            && self.name.as_deref().is_none_or(|name| name == org.name)
    }
}

/// Selects buckets by ID and/or name, optionally scoped to an organization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketFilter {
    pub org_id: Option<Id>,
    pub id: Option<Id>,
    pub name: Option<String>,
}

impl BucketFilter {
    pub fn by_id(id: Id) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn matches(&self, bucket: &Bucket) -> bool {
        (self.id.is_some() || self.name.is_some())
            && self.org_id.is_none_or(|id| id == bucket.org_id)
            && self.id.is_none_or(|id| id == bucket.id)
            && self.name.as_deref().is_none_or(|name| name == bucket.name)
    }
}

/// Selects legacy mappings. Unset fields match any mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbrpMappingFilter {
    pub org_id: Option<Id>,
    pub bucket_id: Option<Id>,
    pub database: Option<String>,
    pub retention_policy: Option<String>,
}

impl DbrpMappingFilter {
    pub fn matches(&self, mapping: &DbrpMapping) -> bool {
        self.org_id.is_none_or(|id| id == mapping.org_id)
            && self.bucket_id.is_none_or(|id| id == mapping.bucket_id)
            && self
                .database
                .as_deref()
                .is_none_or(|db| db == mapping.database)
            && self
                .retention_policy
                .as_deref()
                .is_none_or(|rp| rp == mapping.retention_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(v: u64) -> Id {
        Id::new(v).unwrap()
    }

    #[test]
    fn organization_filter() {
        let org = Organization {
            id: id(1),
            name: "acme".to_string(),
        };

        assert!(!OrganizationFilter::default().matches(&org));
        assert!(OrganizationFilter::by_id(id(1)).matches(&org));
        assert!(!OrganizationFilter::by_id(id(2)).matches(&org));

        let by_name = OrganizationFilter {
            id: None,
            name: Some("acme".to_string()),
        };
        assert!(by_name.matches(&org));

        let both = OrganizationFilter {
            id: Some(id(2)),
            name: Some("acme".to_string()),
        };
        assert!(!both.matches(&org));
    }

    #[test]
    fn bucket_filter_is_org_scoped() {
        let bucket = Bucket {
            id: id(10),
            org_id: id(1),
            name: "telegraf".to_string(),
        };

        let scoped = |org, name: &str| BucketFilter {
            org_id: Some(id(org)),
            id: None,
            name: Some(name.to_string()),
        };
        assert!(scoped(1, "telegraf").matches(&bucket));
        assert!(!scoped(2, "telegraf").matches(&bucket));
        assert!(!scoped(1, "other").matches(&bucket));

        let org_only = BucketFilter {
            org_id: Some(id(1)),
            ..Default::default()
        };
        assert!(!org_only.matches(&bucket));
    }

    #[test]
    fn dbrp_filter() {
        let mapping = DbrpMapping {
            database: "mydb".to_string(),
            retention_policy: "autogen".to_string(),
            org_id: id(1),
            bucket_id: id(10),
        };

        assert!(DbrpMappingFilter::default().matches(&mapping));

        let filter = DbrpMappingFilter {
            database: Some("mydb".to_string()),
            retention_policy: Some("autogen".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&mapping));

        let other_rp = DbrpMappingFilter {
            retention_policy: Some("".to_string()),
            ..filter
        };
        assert!(!other_rp.matches(&mapping));
    }

    #[test]
    fn bucket_json_field_names() {
        let bucket = Bucket {
            id: id(10),
            org_id: id(1),
            name: "telegraf".to_string(),
        };
        let json = serde_json::to_value(&bucket).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "000000000000000a",
                "orgID": "0000000000000001",
                "name": "telegraf",
            })
        );
    }
}
