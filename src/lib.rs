//! Cloud Warden — multi-tenant cloud compliance rules engine.
//!
//! Registers checkable compliance rules, decides which rules apply to
//! which resources, executes them with bounded concurrency, collects
//! evidence, and aggregates pass/fail outcomes into per-resource
//! compliance scores and a cross-resource execution report.
//!
//! # Quick Start
//!
//! ```no_run
//! use cloudwarden::config::EngineConfig;
//! use cloudwarden::model::{ExecutionContext, Resource};
//! use cloudwarden::provider::{CloudProviders, CloudSnapshot};
//! use cloudwarden::RulesEngine;
//!
//! # async fn run(resources: Vec<Resource>) {
//! let providers = CloudProviders::from_snapshot(CloudSnapshot::default());
//! let mut engine = RulesEngine::new(providers);
//! let context = ExecutionContext::new("tenant-1", "123456789012", "us-east-1");
//! let report = engine
//!     .execute_rules(&resources, &context, &EngineConfig::default())
//!     .await;
//! println!("{} resource(s) aggregated", report.results.len());
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod output;
pub mod provider;
pub mod rules;

use config::EngineConfig;
use error::Result;
use model::{ExecutionContext, Resource};
use output::OutputFormat;
use provider::CloudProviders;

pub use engine::{EngineReport, RulesEngine};

/// Run one full scan: construct an engine with the built-in rule set and
/// execute it against the batch.
pub async fn scan(
    resources: &[Resource],
    context: &ExecutionContext,
    config: &EngineConfig,
    providers: CloudProviders,
) -> EngineReport {
    let mut engine = RulesEngine::new(providers);
    engine.execute_rules(resources, context, config).await
}

/// Render an engine report in the specified format.
pub fn render_report(report: &EngineReport, format: OutputFormat) -> Result<String> {
    output::render(report, format)
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::model::Severity;
    use crate::provider::snapshot::{BucketState, CloudSnapshot};
    use crate::provider::{AccountSummary, BucketVersioning, IngressRule};
    use std::collections::HashMap;

    fn resource(arn: &str, resource_type: &str) -> Resource {
        Resource {
            arn: arn.into(),
            resource_type: resource_type.into(),
            region: "us-east-1".into(),
            account_id: "123456789012".into(),
            tags: HashMap::new(),
        }
    }

    fn context() -> ExecutionContext {
        ExecutionContext::new("tenant-1", "123456789012", "us-east-1")
    }

    #[tokio::test]
    async fn unencrypted_public_versioned_bucket_scores_one_third() {
        let mut snapshot = CloudSnapshot::default();
        snapshot.buckets.insert(
            "exposed".into(),
            BucketState {
                encryption: None,
                public_access_block: None,
                versioning: BucketVersioning {
                    enabled: true,
                    mfa_delete: false,
                },
            },
        );
        let resources = vec![resource("arn:aws:s3:::exposed", "AWS::S3::Bucket")];
        let report = scan(
            &resources,
            &context(),
            &EngineConfig::default(),
            CloudProviders::from_snapshot(snapshot),
        )
        .await;

        let agg = &report.results[0];
        assert_eq!(agg.total_rules, 3);
        assert_eq!(agg.failed_rules, 2);
        assert_eq!(agg.passed_rules, 1);
        assert!((agg.compliance_score - 100.0 / 3.0).abs() < 0.1);
        assert_eq!(agg.overall_severity, Severity::Critical);

        let by_control: HashMap<&str, Severity> = agg
            .findings
            .iter()
            .map(|f| (f.control_id.as_str(), f.severity))
            .collect();
        assert_eq!(by_control["S3-001"], Severity::High);
        assert_eq!(by_control["S3-002"], Severity::Critical);
        assert!(!by_control.contains_key("S3-003"));
    }

    #[tokio::test]
    async fn world_open_ssh_fails_both_security_group_rules() {
        let mut snapshot = CloudSnapshot::default();
        snapshot.security_groups.insert(
            "sg-0abc".into(),
            vec![IngressRule {
                protocol: "tcp".into(),
                from_port: Some(22),
                to_port: Some(22),
                cidr_blocks: vec!["0.0.0.0/0".into()],
                ipv6_cidr_blocks: vec![],
            }],
        );
        let resources = vec![resource(
            "arn:aws:ec2:us-east-1:123456789012:security-group/sg-0abc",
            "AWS::EC2::SecurityGroup",
        )];
        let report = scan(
            &resources,
            &context(),
            &EngineConfig::default(),
            CloudProviders::from_snapshot(snapshot),
        )
        .await;

        let agg = &report.results[0];
        assert_eq!(agg.failed_rules, 2);

        let sg1 = agg.findings.iter().find(|f| f.control_id == "SG-001").unwrap();
        assert_eq!(sg1.severity, Severity::Critical);
        assert!(sg1.title.contains("tcp"));
        assert!(sg1.title.contains("port 22"));
        assert!(sg1.title.contains("0.0.0.0/0"));

        let sg2 = agg.findings.iter().find(|f| f.control_id == "SG-002").unwrap();
        assert_eq!(sg2.severity, Severity::Critical);
    }

    #[tokio::test]
    async fn root_mfa_enabled_passes_iam_001() {
        let mut snapshot = CloudSnapshot::default();
        snapshot.iam.summary = AccountSummary {
            account_mfa_enabled: true,
            root_access_keys_present: false,
        };
        let resources = vec![resource(
            "arn:aws:iam::123456789012:root",
            "AWS::IAM::Account",
        )];
        let mut engine = RulesEngine::new(CloudProviders::from_snapshot(snapshot));
        let result = engine
            .execute_rule("IAM-001", &resources[0], &context(), &EngineConfig::default())
            .await
            .unwrap();
        assert!(result.passed);
        assert_eq!(result.message, "Root account has MFA enabled");
    }

    #[tokio::test]
    async fn account_without_trails_fails_ct_rules() {
        let snapshot = CloudSnapshot::default();
        let resources = vec![resource(
            "arn:aws:cloudtrail:us-east-1:123456789012:trail/expected",
            "AWS::CloudTrail::Trail",
        )];
        let report = scan(
            &resources,
            &context(),
            &EngineConfig::default(),
            CloudProviders::from_snapshot(snapshot),
        )
        .await;

        let agg = &report.results[0];
        let ct1 = agg.findings.iter().find(|f| f.control_id == "CT-001").unwrap();
        assert_eq!(ct1.severity, Severity::Critical);
        assert_eq!(ct1.title, "No active multi-region CloudTrail found");

        let ct3 = agg.findings.iter().find(|f| f.control_id == "CT-003").unwrap();
        assert_eq!(ct3.title, "Log file validation disabled on trails: ");
    }

    #[tokio::test]
    async fn mixed_batch_scores_each_resource_over_its_own_rules() {
        let mut snapshot = CloudSnapshot::default();
        snapshot.buckets.insert("plain".into(), BucketState::default());
        snapshot.security_groups.insert("sg-quiet".into(), vec![]);

        let resources = vec![
            resource("arn:aws:s3:::plain", "AWS::S3::Bucket"),
            resource(
                "arn:aws:ec2:us-east-1:123456789012:security-group/sg-quiet",
                "AWS::EC2::SecurityGroup",
            ),
        ];
        let report = scan(
            &resources,
            &context(),
            &EngineConfig::default(),
            CloudProviders::from_snapshot(snapshot),
        )
        .await;

        // The plan is the union (3 S3 rules + 2 SG rules); each resource is
        // scored only over the rules that actually applied to it.
        let bucket = &report.results[0];
        assert_eq!(bucket.total_rules, 3);
        assert_eq!(bucket.compliance_score, 0.0);

        let group = &report.results[1];
        assert_eq!(group.total_rules, 2);
        assert_eq!(group.compliance_score, 100.0);

        let stats = &report.stats;
        assert_eq!(stats.total_rules, 10);
        assert_eq!(stats.skipped_rules, 5);
        assert_eq!(stats.executed_rules, 5);
    }
}
