//! In-memory account snapshot implementing every provider trait.
//!
//! Deserializable from JSON so the CLI can scan captured account state
//! offline. Lookups that miss return [`ProviderError::NotFound`], which is
//! how the error-conversion path of rule execution gets exercised.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    AccountSummary, AttachedPolicy, BucketEncryption, BucketVersioning, CloudTrailApi, Ec2Api,
    IamApi, IngressRule, PasswordPolicy, ProviderError, ProviderResult, PublicAccessBlock,
    S3Api, SecurityGroup, Trail, TrailStatus,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketState {
    pub encryption: Option<BucketEncryption>,
    pub public_access_block: Option<PublicAccessBlock>,
    #[serde(default)]
    pub versioning: BucketVersioning,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IamState {
    #[serde(default)]
    pub summary: AccountSummary,
    pub password_policy: Option<PasswordPolicy>,
    #[serde(default)]
    pub attached_policies: Vec<AttachedPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailRecord {
    #[serde(flatten)]
    pub trail: Trail,
    #[serde(default)]
    pub is_logging: bool,
}

/// Captured state of one account, keyed the way the provider traits look
/// things up (bucket name, security group id, trail name).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudSnapshot {
    #[serde(default)]
    pub buckets: HashMap<String, BucketState>,
    #[serde(default)]
    pub security_groups: HashMap<String, Vec<IngressRule>>,
    #[serde(default)]
    pub iam: IamState,
    #[serde(default)]
    pub trails: Vec<TrailRecord>,
}

impl CloudSnapshot {
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }
}

#[async_trait]
impl S3Api for CloudSnapshot {
    async fn get_bucket_encryption(&self, bucket: &str) -> ProviderResult<Option<BucketEncryption>> {
        Ok(self.bucket(bucket)?.encryption.clone())
    }

    async fn get_public_access_block(&self, bucket: &str) -> ProviderResult<Option<PublicAccessBlock>> {
        Ok(self.bucket(bucket)?.public_access_block)
    }

    async fn get_bucket_versioning(&self, bucket: &str) -> ProviderResult<BucketVersioning> {
        Ok(self.bucket(bucket)?.versioning)
    }

    async fn head_bucket(&self, bucket: &str) -> ProviderResult<bool> {
        Ok(self.buckets.contains_key(bucket))
    }
}

#[async_trait]
impl IamApi for CloudSnapshot {
    async fn get_account_summary(&self) -> ProviderResult<AccountSummary> {
        Ok(self.iam.summary)
    }

    async fn get_password_policy(&self) -> ProviderResult<Option<PasswordPolicy>> {
        Ok(self.iam.password_policy)
    }

    async fn list_attached_policies(&self) -> ProviderResult<Vec<AttachedPolicy>> {
        Ok(self.iam.attached_policies.clone())
    }
}

#[async_trait]
impl Ec2Api for CloudSnapshot {
    async fn describe_security_group(&self, group_id: &str) -> ProviderResult<SecurityGroup> {
        let rules = self
            .security_groups
            .get(group_id)
            .ok_or_else(|| ProviderError::NotFound(format!("security group {group_id}")))?;
        Ok(SecurityGroup {
            group_id: group_id.to_string(),
            description: String::new(),
            ingress_rules: rules.clone(),
        })
    }
}

#[async_trait]
impl CloudTrailApi for CloudSnapshot {
    async fn describe_trails(&self) -> ProviderResult<Vec<Trail>> {
        Ok(self.trails.iter().map(|r| r.trail.clone()).collect())
    }

    async fn get_trail_status(&self, name: &str) -> ProviderResult<TrailStatus> {
        let record = self
            .trails
            .iter()
            .find(|r| r.trail.name == name)
            .ok_or_else(|| ProviderError::NotFound(format!("trail {name}")))?;
        Ok(TrailStatus {
            is_logging: record.is_logging,
        })
    }
}

impl CloudSnapshot {
    fn bucket(&self, name: &str) -> ProviderResult<&BucketState> {
        self.buckets
            .get(name)
            .ok_or_else(|| ProviderError::NotFound(format!("bucket {name}")))
    }
}
