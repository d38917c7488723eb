//! The rules engine orchestrator.
//!
//! One plan per batch; per resource, rules run group by group with a
//! strict barrier between groups. Results are collected in submission
//! order, so parallel and sequential runs produce identical orderings.
//! Usage counters are updated on this control thread after each awaited
//! completion, never inside the fan-out.

pub mod aggregate;
pub mod planner;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::error::{Result, WardenError};
use crate::model::{ComplianceFramework, ExecutionContext, Resource, Severity, ServiceFamily};
use crate::provider::CloudProviders;
use crate::rules::registry::RuleRegistry;
use crate::rules::{builtin, run_rule, validate, ComplianceRule, RuleExecutionResult, RuleMetadata};

pub use aggregate::{BatchStatistics, Finding, RemediationKind, ResourceAggregation};
pub use planner::{ExecutionPlan, RuleDependency};

/// What one `execute_rules` call returns: per-resource aggregations in
/// input order plus whole-run statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineReport {
    pub results: Vec<ResourceAggregation>,
    pub stats: BatchStatistics,
}

pub struct RulesEngine {
    registry: RuleRegistry,
}

impl RulesEngine {
    /// Construct an engine with the 11 built-in rules registered against
    /// the given providers.
    pub fn new(providers: CloudProviders) -> Self {
        let mut registry = RuleRegistry::new();
        for rule in builtin::all_rules(&providers) {
            registry.register_rule(rule);
        }
        Self { registry }
    }

    /// An engine with only the given rules. Useful for embedding a custom
    /// rule set.
    pub fn with_rules(rules: Vec<Arc<dyn ComplianceRule>>) -> Self {
        let mut registry = RuleRegistry::new();
        for rule in rules {
            registry.register_rule(rule);
        }
        Self { registry }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn register_rule(&mut self, rule: Arc<dyn ComplianceRule>) {
        self.registry.register_rule(rule);
    }

    pub fn all_rules(&self) -> Vec<RuleMetadata> {
        self.registry.all_rules()
    }

    pub fn rules_for_service(&self, service: ServiceFamily) -> Vec<RuleMetadata> {
        self.registry.rules_for_service(service)
    }

    pub fn rules_for_framework(&self, framework: ComplianceFramework) -> Vec<RuleMetadata> {
        self.registry.rules_for_framework(framework)
    }

    /// Execute the applicable rules against every resource in the batch.
    ///
    /// The plan's rule set is the union applicable across all resource
    /// types present; per resource, inapplicable rules self-report as
    /// skipped. One failing rule or unreachable resource never aborts the
    /// batch.
    pub async fn execute_rules(
        &mut self,
        resources: &[Resource],
        context: &ExecutionContext,
        config: &EngineConfig,
    ) -> EngineReport {
        let plan = planner::create_execution_plan(&self.registry, resources, config);
        tracing::info!(
            resources = resources.len(),
            rules = plan.rule_ids.len(),
            groups = plan.groups.len(),
            parallel = config.parallel,
            "executing compliance scan"
        );

        let mut aggregations = Vec::with_capacity(resources.len());
        let mut all_results = Vec::new();

        for resource in resources {
            let resource_results = self
                .execute_plan_for_resource(&plan, resource, context, config)
                .await;
            let aggregation =
                aggregate::aggregate_resource(&self.registry, resource, &resource_results, config);
            tracing::debug!(
                resource = %resource.arn,
                score = aggregation.compliance_score,
                findings = aggregation.findings.len(),
                "resource aggregated"
            );
            aggregations.push(aggregation);
            all_results.extend(resource_results);
        }

        let stats = aggregate::batch_statistics(&all_results);
        EngineReport {
            results: aggregations,
            stats,
        }
    }

    /// Execute one rule against one resource.
    ///
    /// An unknown rule id is a caller error and is signaled, not swallowed.
    /// A rule that fails its applicability test yields a skipped result
    /// without running the check.
    pub async fn execute_rule(
        &mut self,
        rule_id: &str,
        resource: &Resource,
        context: &ExecutionContext,
        config: &EngineConfig,
    ) -> Result<RuleExecutionResult> {
        let entry = self
            .registry
            .get(rule_id)
            .ok_or_else(|| WardenError::RuleNotFound(rule_id.to_string()))?;
        let executor = entry.executor.clone();

        if !validate(&*executor, resource, context).await {
            return Ok(RuleExecutionResult::skipped(
                &executor.metadata(),
                &resource.arn,
            ));
        }

        let result = run_with_deadline(executor, resource, context, config).await;
        self.registry.record_usage(rule_id);
        Ok(result)
    }

    /// Run the plan's groups against one resource. Every group is a
    /// cooperative fan-out; the join loop is a strict barrier, so no rule
    /// in group N+1 starts before all of group N finished.
    async fn execute_plan_for_resource(
        &mut self,
        plan: &ExecutionPlan,
        resource: &Resource,
        context: &ExecutionContext,
        config: &EngineConfig,
    ) -> Vec<RuleExecutionResult> {
        let mut results = Vec::with_capacity(plan.rule_ids.len());
        for group in &plan.groups {
            let mut handles = Vec::with_capacity(group.len());
            for rule_id in group {
                let executor = match self.registry.get(rule_id) {
                    Some(entry) => entry.executor.clone(),
                    None => continue,
                };
                let resource = resource.clone();
                let context = context.clone();
                let config = config.clone();
                handles.push((
                    rule_id.clone(),
                    tokio::spawn(async move {
                        run_with_deadline(executor, &resource, &context, &config).await
                    }),
                ));
            }

            for (rule_id, handle) in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::warn!(rule = %rule_id, error = %err, "rule task aborted");
                        aborted_result(&rule_id, &resource.arn, &err.to_string())
                    }
                };
                self.registry.record_usage(&rule_id);
                results.push(result);
            }
        }
        results
    }
}

/// Template execution wrapped in the configured deadline. Deadline expiry
/// is converted into a failed result — never an error to the caller.
async fn run_with_deadline(
    executor: Arc<dyn ComplianceRule>,
    resource: &Resource,
    context: &ExecutionContext,
    config: &EngineConfig,
) -> RuleExecutionResult {
    if config.timeout_secs == 0 {
        return run_rule(&*executor, resource, context, config).await;
    }
    let deadline = Duration::from_secs(config.timeout_secs);
    match tokio::time::timeout(deadline, run_rule(&*executor, resource, context, config)).await {
        Ok(result) => result,
        Err(_) => {
            let metadata = executor.metadata();
            tracing::warn!(
                rule = %metadata.id,
                resource = %resource.arn,
                timeout_secs = config.timeout_secs,
                "rule execution timed out"
            );
            let mut meta = Map::new();
            meta.insert(
                "service".into(),
                Value::String(metadata.service.as_str().into()),
            );
            meta.insert(
                "error".into(),
                Value::String(format!(
                    "timed out after {}s",
                    config.timeout_secs
                )),
            );
            RuleExecutionResult {
                rule_id: metadata.id.clone(),
                resource_arn: resource.arn.clone(),
                passed: false,
                severity: Some(Severity::High),
                message: format!(
                    "Rule {} execution timed out after {}s",
                    metadata.id, config.timeout_secs
                ),
                evidence: Vec::new(),
                recommendations: Vec::new(),
                metadata: meta,
                duration_ms: config.timeout_secs * 1000,
            }
        }
    }
}

fn aborted_result(rule_id: &str, resource_arn: &str, error: &str) -> RuleExecutionResult {
    let mut meta = Map::new();
    meta.insert("error".into(), Value::String(error.to_string()));
    RuleExecutionResult {
        rule_id: rule_id.to_string(),
        resource_arn: resource_arn.to_string(),
        passed: false,
        severity: Some(Severity::High),
        message: format!("Rule {rule_id} execution aborted: {error}"),
        evidence: Vec::new(),
        recommendations: Vec::new(),
        metadata: meta,
        duration_ms: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::snapshot::{BucketState, CloudSnapshot};
    use crate::provider::{BucketEncryption, BucketVersioning, PublicAccessBlock};
    use std::collections::HashMap;

    fn snapshot() -> CloudSnapshot {
        let mut snapshot = CloudSnapshot::default();
        snapshot.buckets.insert(
            "good".into(),
            BucketState {
                encryption: Some(BucketEncryption {
                    algorithm: "AES256".into(),
                    kms_key_id: None,
                }),
                public_access_block: Some(PublicAccessBlock {
                    block_public_acls: true,
                    ignore_public_acls: true,
                    block_public_policy: true,
                    restrict_public_buckets: true,
                }),
                versioning: BucketVersioning {
                    enabled: true,
                    mfa_delete: false,
                },
            },
        );
        snapshot.buckets.insert("bad".into(), BucketState::default());
        snapshot
    }

    fn engine() -> RulesEngine {
        RulesEngine::new(CloudProviders::from_snapshot(snapshot()))
    }

    fn bucket(name: &str) -> Resource {
        Resource {
            arn: format!("arn:aws:s3:::{name}"),
            resource_type: "AWS::S3::Bucket".into(),
            region: "us-east-1".into(),
            account_id: "123456789012".into(),
            tags: HashMap::new(),
        }
    }

    fn context() -> ExecutionContext {
        ExecutionContext::new("tenant-1", "123456789012", "us-east-1")
    }

    #[tokio::test]
    async fn unknown_rule_id_is_a_caller_error() {
        let mut engine = engine();
        let err = engine
            .execute_rule("NOPE", &bucket("good"), &context(), &EngineConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found in registry"));
    }

    #[tokio::test]
    async fn execute_rule_skips_inapplicable_resource() {
        let mut engine = engine();
        let sg = Resource {
            resource_type: "AWS::EC2::SecurityGroup".into(),
            ..bucket("good")
        };
        let result = engine
            .execute_rule("S3-001", &sg, &context(), &EngineConfig::default())
            .await
            .unwrap();
        assert!(result.passed);
        assert!(result.is_skipped());
        // Short-circuited before the check: no usage recorded.
        assert_eq!(engine.registry().get("S3-001").unwrap().usage.invocations, 0);
    }

    #[tokio::test]
    async fn execute_rule_records_usage() {
        let mut engine = engine();
        let result = engine
            .execute_rule("S3-001", &bucket("good"), &context(), &EngineConfig::default())
            .await
            .unwrap();
        assert!(result.passed);
        let usage = engine.registry().get("S3-001").unwrap().usage;
        assert_eq!(usage.invocations, 1);
        assert!(usage.last_used.is_some());
    }

    #[tokio::test]
    async fn batch_results_keep_resource_and_plan_order() {
        let mut engine = engine();
        let resources = vec![bucket("good"), bucket("bad")];
        let report = engine
            .execute_rules(&resources, &context(), &EngineConfig::default())
            .await;

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].resource_arn, "arn:aws:s3:::good");
        assert_eq!(report.results[1].resource_arn, "arn:aws:s3:::bad");
        assert_eq!(report.results[0].compliance_score, 100.0);
        assert!(report.results[1].compliance_score < 100.0);
    }

    #[tokio::test]
    async fn parallel_and_sequential_runs_agree() {
        let resources = vec![bucket("good"), bucket("bad")];

        let mut parallel_engine = engine();
        let parallel_report = parallel_engine
            .execute_rules(&resources, &context(), &EngineConfig::default())
            .await;

        let mut sequential_engine = engine();
        let sequential_config = EngineConfig {
            parallel: false,
            ..EngineConfig::default()
        };
        let sequential_report = sequential_engine
            .execute_rules(&resources, &context(), &sequential_config)
            .await;

        assert_eq!(parallel_report.results.len(), sequential_report.results.len());
        for (p, s) in parallel_report
            .results
            .iter()
            .zip(sequential_report.results.iter())
        {
            assert_eq!(p.resource_arn, s.resource_arn);
            assert_eq!(p.compliance_score, s.compliance_score);
            assert_eq!(p.overall_severity, s.overall_severity);
            let p_ids: Vec<&str> = p.findings.iter().map(|f| f.control_id.as_str()).collect();
            let s_ids: Vec<&str> = s.findings.iter().map(|f| f.control_id.as_str()).collect();
            assert_eq!(p_ids, s_ids);
        }
        assert_eq!(
            parallel_report.stats.failed_rules,
            sequential_report.stats.failed_rules
        );
    }

    #[tokio::test]
    async fn batch_usage_counters_count_every_execution() {
        let mut engine = engine();
        let resources = vec![bucket("good"), bucket("bad")];
        engine
            .execute_rules(&resources, &context(), &EngineConfig::default())
            .await;
        // 3 applicable S3 rules, 2 resources.
        assert_eq!(engine.registry().get("S3-001").unwrap().usage.invocations, 2);
        assert_eq!(engine.registry().get("S3-002").unwrap().usage.invocations, 2);
        // IAM rules were not in the plan at all.
        assert_eq!(engine.registry().get("IAM-001").unwrap().usage.invocations, 0);
    }

    #[tokio::test]
    async fn repeated_execution_is_idempotent() {
        let mut engine = engine();
        let config = EngineConfig::default();
        let first = engine
            .execute_rule("S3-002", &bucket("bad"), &context(), &config)
            .await
            .unwrap();
        let second = engine
            .execute_rule("S3-002", &bucket("bad"), &context(), &config)
            .await
            .unwrap();
        assert_eq!(first.passed, second.passed);
        assert_eq!(first.severity, second.severity);
        assert_eq!(first.message, second.message);
    }

    #[tokio::test]
    async fn statistics_balance_for_mixed_batch() {
        let mut engine = engine();
        let resources = vec![bucket("good"), bucket("bad")];
        let report = engine
            .execute_rules(&resources, &context(), &EngineConfig::default())
            .await;
        let stats = &report.stats;
        assert_eq!(stats.total_rules, 6);
        assert_eq!(stats.skipped_rules, 0);
        assert_eq!(stats.executed_rules, stats.total_rules - stats.skipped_rules);
        assert_eq!(
            stats.passed_rules + stats.failed_rules + stats.skipped_rules,
            stats.total_rules
        );
        assert_eq!(stats.failures_by_service.get("s3"), Some(&3));
    }
}
