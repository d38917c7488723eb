//! Read-only cloud state providers.
//!
//! Each rule family owns a client trait covering the describe/get calls its
//! checks need. The engine is agnostic to the transport behind a trait —
//! the platform wires live AWS SDK clients here, tests and the CLI use the
//! in-memory [`snapshot::CloudSnapshot`].

pub mod snapshot;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use snapshot::CloudSnapshot;

#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("access denied for {0}")]
    AccessDenied(String),

    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("api error: {0}")]
    Api(String),
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

// ---------------------------------------------------------------------------
// S3

/// Default encryption configuration of a bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketEncryption {
    pub algorithm: String,
    pub kms_key_id: Option<String>,
}

/// The four public-access-block flags. All must be on for the
/// configuration to count as complete.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PublicAccessBlock {
    pub block_public_acls: bool,
    pub ignore_public_acls: bool,
    pub block_public_policy: bool,
    pub restrict_public_buckets: bool,
}

impl PublicAccessBlock {
    pub fn is_complete(&self) -> bool {
        self.block_public_acls
            && self.ignore_public_acls
            && self.block_public_policy
            && self.restrict_public_buckets
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BucketVersioning {
    pub enabled: bool,
    pub mfa_delete: bool,
}

#[async_trait]
pub trait S3Api: Send + Sync {
    /// `None` means no default encryption is configured.
    async fn get_bucket_encryption(&self, bucket: &str) -> ProviderResult<Option<BucketEncryption>>;

    /// `None` means no public access block exists on the bucket.
    async fn get_public_access_block(&self, bucket: &str) -> ProviderResult<Option<PublicAccessBlock>>;

    async fn get_bucket_versioning(&self, bucket: &str) -> ProviderResult<BucketVersioning>;

    /// Existence / reachability probe.
    async fn head_bucket(&self, bucket: &str) -> ProviderResult<bool>;
}

// ---------------------------------------------------------------------------
// IAM

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account_mfa_enabled: bool,
    pub root_access_keys_present: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub minimum_password_length: u32,
    pub require_symbols: bool,
    pub require_numbers: bool,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub max_password_age_days: Option<u32>,
    pub password_reuse_prevention: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyStatement {
    pub effect: String,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachedPolicy {
    pub name: String,
    pub arn: String,
    #[serde(default)]
    pub statements: Vec<PolicyStatement>,
}

#[async_trait]
pub trait IamApi: Send + Sync {
    async fn get_account_summary(&self) -> ProviderResult<AccountSummary>;

    /// `None` means the account has no password policy set.
    async fn get_password_policy(&self) -> ProviderResult<Option<PasswordPolicy>>;

    async fn list_attached_policies(&self) -> ProviderResult<Vec<AttachedPolicy>>;
}

// ---------------------------------------------------------------------------
// EC2

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressRule {
    pub protocol: String,
    pub from_port: Option<u16>,
    pub to_port: Option<u16>,
    #[serde(default)]
    pub cidr_blocks: Vec<String>,
    #[serde(default)]
    pub ipv6_cidr_blocks: Vec<String>,
}

impl IngressRule {
    /// World-open CIDRs attached to this rule, if any.
    pub fn open_cidrs(&self) -> Vec<&str> {
        self.cidr_blocks
            .iter()
            .filter(|c| c.as_str() == "0.0.0.0/0")
            .chain(self.ipv6_cidr_blocks.iter().filter(|c| c.as_str() == "::/0"))
            .map(String::as_str)
            .collect()
    }

    /// Whether `port` falls inside this rule's port range. A rule with no
    /// ports (e.g. `-1` all-traffic) covers every port.
    pub fn covers_port(&self, port: u16) -> bool {
        match (self.from_port, self.to_port) {
            (Some(from), Some(to)) => from <= port && port <= to,
            (Some(from), None) => from == port,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub group_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ingress_rules: Vec<IngressRule>,
}

#[async_trait]
pub trait Ec2Api: Send + Sync {
    async fn describe_security_group(&self, group_id: &str) -> ProviderResult<SecurityGroup>;
}

// ---------------------------------------------------------------------------
// CloudTrail

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trail {
    pub name: String,
    pub is_multi_region: bool,
    pub s3_bucket: String,
    pub log_file_validation_enabled: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrailStatus {
    pub is_logging: bool,
}

#[async_trait]
pub trait CloudTrailApi: Send + Sync {
    async fn describe_trails(&self) -> ProviderResult<Vec<Trail>>;

    async fn get_trail_status(&self, name: &str) -> ProviderResult<TrailStatus>;
}

// ---------------------------------------------------------------------------

/// The client bundle handed to the built-in rule set. Each rule clones the
/// handle for the one service it talks to.
#[derive(Clone)]
pub struct CloudProviders {
    pub s3: Arc<dyn S3Api>,
    pub iam: Arc<dyn IamApi>,
    pub ec2: Arc<dyn Ec2Api>,
    pub cloudtrail: Arc<dyn CloudTrailApi>,
}

impl CloudProviders {
    /// Wire every service to one in-memory snapshot.
    pub fn from_snapshot(snapshot: CloudSnapshot) -> Self {
        let shared = Arc::new(snapshot);
        Self {
            s3: shared.clone(),
            iam: shared.clone(),
            ec2: shared.clone(),
            cloudtrail: shared,
        }
    }
}
