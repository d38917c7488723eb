//! S3 bucket checks: default encryption, public access block, versioning.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::model::{ComplianceFramework, ExecutionContext, Resource, Severity, ServiceFamily};
use crate::provider::{ProviderResult, S3Api};
use crate::rules::{
    CheckOutcome, ComplianceRule, EvidenceItem, EvidenceKind, RemediationStep, RiskLevel,
    RuleMetadata,
};

const BUCKET_TYPES: &[&str] = &["AWS::S3::Bucket"];

fn bucket_types() -> Vec<String> {
    BUCKET_TYPES.iter().map(|s| s.to_string()).collect()
}

/// S3-001: buckets must have default (server-side) encryption configured.
pub struct BucketEncryptionRule {
    s3: Arc<dyn S3Api>,
}

impl BucketEncryptionRule {
    pub fn new(s3: Arc<dyn S3Api>) -> Self {
        Self { s3 }
    }
}

#[async_trait]
impl ComplianceRule for BucketEncryptionRule {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "S3-001".into(),
            name: "S3 bucket default encryption".into(),
            description: "Buckets must have server-side encryption enabled by default".into(),
            frameworks: vec![ComplianceFramework::Soc2, ComplianceFramework::Cis],
            severity: Severity::High,
            resource_types: bucket_types(),
            service: ServiceFamily::S3,
        }
    }

    async fn probe(&self, resource: &Resource, _context: &ExecutionContext) -> bool {
        self.s3.head_bucket(resource.name()).await.unwrap_or(false)
    }

    async fn check(
        &self,
        resource: &Resource,
        _context: &ExecutionContext,
    ) -> ProviderResult<CheckOutcome> {
        let bucket = resource.name();
        match self.s3.get_bucket_encryption(bucket).await? {
            Some(encryption) => Ok(CheckOutcome::pass(format!(
                "Bucket {bucket} has default encryption enabled ({})",
                encryption.algorithm
            ))),
            None => Ok(CheckOutcome::fail(format!(
                "Bucket {bucket} has no default encryption configured"
            ))),
        }
    }

    async fn collect_evidence(
        &self,
        resource: &Resource,
        _context: &ExecutionContext,
    ) -> Vec<EvidenceItem> {
        let bucket = resource.name();
        match self.s3.get_bucket_encryption(bucket).await {
            Ok(encryption) => vec![EvidenceItem::new(
                EvidenceKind::Configuration,
                "s3:GetBucketEncryption",
                format!("Default encryption configuration of bucket {bucket}"),
                json!({
                    "configured": encryption.is_some(),
                    "algorithm": encryption.as_ref().map(|e| e.algorithm.clone()),
                    "kms_key_id": encryption.as_ref().and_then(|e| e.kms_key_id.clone()),
                }),
            )],
            Err(err) => vec![EvidenceItem::new(
                EvidenceKind::ApiResponse,
                "s3:GetBucketEncryption",
                format!("Could not read encryption configuration: {err}"),
                Value::Null,
            )],
        }
    }

    fn recommendations(&self, passed: bool) -> Vec<String> {
        if passed {
            vec!["Consider SSE-KMS with a customer-managed key for sensitive data.".into()]
        } else {
            vec![
                "Enable default server-side encryption on the bucket.".into(),
                "Use SSE-KMS with a customer-managed key where auditability of key usage matters.".into(),
            ]
        }
    }

    async fn remediation_steps(
        &self,
        resource: &Resource,
        _context: &ExecutionContext,
    ) -> Vec<RemediationStep> {
        let bucket = resource.name();
        vec![RemediationStep {
            order: 1,
            action: "Enable default encryption".into(),
            description: format!("Configure AES-256 default encryption on bucket {bucket}"),
            risk: RiskLevel::Low,
            command: Some(format!(
                "aws s3api put-bucket-encryption --bucket {bucket} \
                 --server-side-encryption-configuration \
                 '{{\"Rules\":[{{\"ApplyServerSideEncryptionByDefault\":{{\"SSEAlgorithm\":\"AES256\"}}}}]}}'"
            )),
            iac_snippet: Some(format!(
                "resource \"aws_s3_bucket_server_side_encryption_configuration\" \"this\" {{\n  \
                 bucket = \"{bucket}\"\n  rule {{\n    apply_server_side_encryption_by_default {{\n      \
                 sse_algorithm = \"AES256\"\n    }}\n  }}\n}}"
            )),
        }]
    }
}

/// S3-002: the public access block must exist with all four flags enabled.
pub struct PublicAccessBlockRule {
    s3: Arc<dyn S3Api>,
}

impl PublicAccessBlockRule {
    pub fn new(s3: Arc<dyn S3Api>) -> Self {
        Self { s3 }
    }
}

#[async_trait]
impl ComplianceRule for PublicAccessBlockRule {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "S3-002".into(),
            name: "S3 public access block".into(),
            description: "Buckets must block all public access via a complete public access block"
                .into(),
            frameworks: vec![ComplianceFramework::Cis, ComplianceFramework::Nist],
            severity: Severity::Critical,
            resource_types: bucket_types(),
            service: ServiceFamily::S3,
        }
    }

    async fn probe(&self, resource: &Resource, _context: &ExecutionContext) -> bool {
        self.s3.head_bucket(resource.name()).await.unwrap_or(false)
    }

    async fn check(
        &self,
        resource: &Resource,
        _context: &ExecutionContext,
    ) -> ProviderResult<CheckOutcome> {
        let bucket = resource.name();
        match self.s3.get_public_access_block(bucket).await? {
            Some(pab) if pab.is_complete() => Ok(CheckOutcome::pass(format!(
                "Bucket {bucket} blocks all public access"
            ))),
            Some(_) => Ok(CheckOutcome::fail(format!(
                "Bucket {bucket} has an incomplete public access block"
            ))),
            None => Ok(CheckOutcome::fail(format!(
                "Bucket {bucket} has no public access block configured"
            ))),
        }
    }

    async fn collect_evidence(
        &self,
        resource: &Resource,
        _context: &ExecutionContext,
    ) -> Vec<EvidenceItem> {
        let bucket = resource.name();
        match self.s3.get_public_access_block(bucket).await {
            Ok(pab) => vec![EvidenceItem::new(
                EvidenceKind::Configuration,
                "s3:GetPublicAccessBlock",
                format!("Public access block of bucket {bucket}"),
                serde_json::to_value(pab).unwrap_or(Value::Null),
            )],
            Err(err) => vec![EvidenceItem::new(
                EvidenceKind::ApiResponse,
                "s3:GetPublicAccessBlock",
                format!("Could not read public access block: {err}"),
                Value::Null,
            )],
        }
    }

    fn recommendations(&self, passed: bool) -> Vec<String> {
        if passed {
            Vec::new()
        } else {
            vec![
                "Enable all four public access block flags on the bucket.".into(),
                "Audit bucket policies and ACLs for grants to AllUsers or AuthenticatedUsers.".into(),
            ]
        }
    }

    async fn remediation_steps(
        &self,
        resource: &Resource,
        _context: &ExecutionContext,
    ) -> Vec<RemediationStep> {
        let bucket = resource.name();
        vec![
            RemediationStep {
                order: 1,
                action: "Enable public access block".into(),
                description: format!("Turn on all four public-access-block flags for {bucket}"),
                risk: RiskLevel::Medium,
                command: Some(format!(
                    "aws s3api put-public-access-block --bucket {bucket} \
                     --public-access-block-configuration \
                     BlockPublicAcls=true,IgnorePublicAcls=true,BlockPublicPolicy=true,RestrictPublicBuckets=true"
                )),
                iac_snippet: None,
            },
            RemediationStep {
                order: 2,
                action: "Review bucket policy".into(),
                description: format!(
                    "Check the bucket policy of {bucket} for statements that depend on public access"
                ),
                risk: RiskLevel::Low,
                command: Some(format!("aws s3api get-bucket-policy --bucket {bucket}")),
                iac_snippet: None,
            },
        ]
    }
}

/// S3-003: versioning must be enabled.
pub struct BucketVersioningRule {
    s3: Arc<dyn S3Api>,
}

impl BucketVersioningRule {
    pub fn new(s3: Arc<dyn S3Api>) -> Self {
        Self { s3 }
    }
}

#[async_trait]
impl ComplianceRule for BucketVersioningRule {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "S3-003".into(),
            name: "S3 bucket versioning".into(),
            description: "Buckets must have object versioning enabled".into(),
            frameworks: vec![ComplianceFramework::Soc2],
            severity: Severity::Medium,
            resource_types: bucket_types(),
            service: ServiceFamily::S3,
        }
    }

    async fn probe(&self, resource: &Resource, _context: &ExecutionContext) -> bool {
        self.s3.head_bucket(resource.name()).await.unwrap_or(false)
    }

    async fn check(
        &self,
        resource: &Resource,
        _context: &ExecutionContext,
    ) -> ProviderResult<CheckOutcome> {
        let bucket = resource.name();
        let versioning = self.s3.get_bucket_versioning(bucket).await?;
        if versioning.enabled {
            Ok(CheckOutcome::pass(format!(
                "Bucket {bucket} has versioning enabled"
            )))
        } else {
            Ok(CheckOutcome::fail(format!(
                "Bucket {bucket} does not have versioning enabled"
            )))
        }
    }

    async fn collect_evidence(
        &self,
        resource: &Resource,
        _context: &ExecutionContext,
    ) -> Vec<EvidenceItem> {
        let bucket = resource.name();
        match self.s3.get_bucket_versioning(bucket).await {
            Ok(versioning) => vec![EvidenceItem::new(
                EvidenceKind::Configuration,
                "s3:GetBucketVersioning",
                format!("Versioning state of bucket {bucket}"),
                json!({
                    "enabled": versioning.enabled,
                    "mfa_delete": versioning.mfa_delete,
                }),
            )],
            Err(err) => vec![EvidenceItem::new(
                EvidenceKind::ApiResponse,
                "s3:GetBucketVersioning",
                format!("Could not read versioning state: {err}"),
                Value::Null,
            )],
        }
    }

    fn recommendations(&self, passed: bool) -> Vec<String> {
        if passed {
            vec!["Pair versioning with a lifecycle rule to expire noncurrent versions.".into()]
        } else {
            vec!["Enable versioning so overwritten and deleted objects remain recoverable.".into()]
        }
    }

    async fn remediation_steps(
        &self,
        resource: &Resource,
        _context: &ExecutionContext,
    ) -> Vec<RemediationStep> {
        let bucket = resource.name();
        vec![RemediationStep {
            order: 1,
            action: "Enable versioning".into(),
            description: format!("Turn on object versioning for bucket {bucket}"),
            risk: RiskLevel::Low,
            command: Some(format!(
                "aws s3api put-bucket-versioning --bucket {bucket} \
                 --versioning-configuration Status=Enabled"
            )),
            iac_snippet: None,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::provider::snapshot::{BucketState, CloudSnapshot};
    use crate::provider::{BucketEncryption, BucketVersioning, PublicAccessBlock};
    use crate::rules::run_rule;
    use std::collections::HashMap;

    fn resource(bucket: &str) -> Resource {
        Resource {
            arn: format!("arn:aws:s3:::{bucket}"),
            resource_type: "AWS::S3::Bucket".into(),
            region: "us-east-1".into(),
            account_id: "123456789012".into(),
            tags: HashMap::new(),
        }
    }

    fn context() -> ExecutionContext {
        ExecutionContext::new("tenant-1", "123456789012", "us-east-1")
    }

    fn snapshot_with(bucket: &str, state: BucketState) -> Arc<CloudSnapshot> {
        let mut snapshot = CloudSnapshot::default();
        snapshot.buckets.insert(bucket.into(), state);
        Arc::new(snapshot)
    }

    #[tokio::test]
    async fn encryption_rule_passes_on_encrypted_bucket() {
        let snapshot = snapshot_with(
            "safe",
            BucketState {
                encryption: Some(BucketEncryption {
                    algorithm: "AES256".into(),
                    kms_key_id: None,
                }),
                ..BucketState::default()
            },
        );
        let rule = BucketEncryptionRule::new(snapshot);
        let outcome = rule.check(&resource("safe"), &context()).await.unwrap();
        assert!(outcome.passed);
        assert!(outcome.message.contains("AES256"));
    }

    #[tokio::test]
    async fn encryption_rule_fails_without_encryption() {
        let snapshot = snapshot_with("open", BucketState::default());
        let rule = BucketEncryptionRule::new(snapshot);
        let result = run_rule(&rule, &resource("open"), &context(), &EngineConfig::default()).await;
        assert!(!result.passed);
        assert_eq!(result.severity, Some(Severity::High));
        assert_eq!(result.evidence.len(), 1);
        assert_eq!(result.evidence[0].data["configured"], false);
    }

    #[tokio::test]
    async fn public_access_block_requires_all_four_flags() {
        let snapshot = snapshot_with(
            "partial",
            BucketState {
                public_access_block: Some(PublicAccessBlock {
                    block_public_acls: true,
                    ignore_public_acls: true,
                    block_public_policy: true,
                    restrict_public_buckets: false,
                }),
                ..BucketState::default()
            },
        );
        let rule = PublicAccessBlockRule::new(snapshot);
        let outcome = rule.check(&resource("partial"), &context()).await.unwrap();
        assert!(!outcome.passed);
        assert!(outcome.message.contains("incomplete"));
    }

    #[tokio::test]
    async fn missing_public_access_block_is_critical() {
        let snapshot = snapshot_with("open", BucketState::default());
        let rule = PublicAccessBlockRule::new(snapshot);
        let result = run_rule(&rule, &resource("open"), &context(), &EngineConfig::default()).await;
        assert!(!result.passed);
        assert_eq!(result.severity, Some(Severity::Critical));
    }

    #[tokio::test]
    async fn versioning_rule_tracks_bucket_state() {
        let snapshot = snapshot_with(
            "versioned",
            BucketState {
                versioning: BucketVersioning {
                    enabled: true,
                    mfa_delete: false,
                },
                ..BucketState::default()
            },
        );
        let rule = BucketVersioningRule::new(snapshot.clone());
        let outcome = rule.check(&resource("versioned"), &context()).await.unwrap();
        assert!(outcome.passed);

        let plain = snapshot_with("plain", BucketState::default());
        let rule = BucketVersioningRule::new(plain);
        let outcome = rule.check(&resource("plain"), &context()).await.unwrap();
        assert!(!outcome.passed);
    }

    #[tokio::test]
    async fn probe_fails_for_missing_bucket() {
        let snapshot = snapshot_with("exists", BucketState::default());
        let rule = BucketEncryptionRule::new(snapshot);
        assert!(rule.probe(&resource("exists"), &context()).await);
        assert!(!rule.probe(&resource("ghost"), &context()).await);
    }
}
