//! The pluggable check abstraction.
//!
//! Every compliance check implements [`ComplianceRule`]; [`run_rule`] is
//! the shared, non-overridable execution path that calls the hooks in fixed
//! order. A rule execution never throws outward: provider failures are
//! converted into failed results at this layer, so one broken check can
//! never abort a batch.

pub mod builtin;
pub mod registry;
pub mod result;

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::model::{ExecutionContext, Resource, Severity};
use crate::provider::ProviderResult;

pub use result::{
    EvidenceItem, EvidenceKind, RemediationStep, RiskLevel, RuleExecutionResult, RuleMetadata,
};

/// Verdict of a rule-specific check.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub passed: bool,
    /// Overrides the rule's default severity when the check failed.
    pub severity: Option<Severity>,
    pub message: String,
}

impl CheckOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            severity: None,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            severity: None,
            message: message.into(),
        }
    }

    pub fn fail_with(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            passed: false,
            severity: Some(severity),
            message: message.into(),
        }
    }
}

/// One compliance check: applicability, evidence gathering, pass/fail
/// logic, and remediation guidance.
///
/// Implementations only provide the hooks; the execution order lives in
/// [`run_rule`] and cannot be overridden.
#[async_trait]
pub trait ComplianceRule: Send + Sync {
    /// Identity and classification of this rule.
    fn metadata(&self) -> RuleMetadata;

    /// Rule-specific reachability probe, typically an existence check
    /// against the provider. Type applicability is handled separately.
    async fn probe(&self, _resource: &Resource, _context: &ExecutionContext) -> bool {
        true
    }

    /// Issue the relevant read-only provider call(s) and evaluate the
    /// compliance predicate.
    async fn check(
        &self,
        resource: &Resource,
        context: &ExecutionContext,
    ) -> ProviderResult<CheckOutcome>;

    /// Package supporting state as evidence. Allowed to partially fail: a
    /// fetch error is itself recorded as an evidence item, never bubbled.
    async fn collect_evidence(
        &self,
        resource: &Resource,
        context: &ExecutionContext,
    ) -> Vec<EvidenceItem>;

    /// Fixed remediation guidance appropriate to the outcome.
    fn recommendations(&self, passed: bool) -> Vec<String>;

    /// Ordered advisory steps to apply the fix. Never executed here.
    async fn remediation_steps(
        &self,
        resource: &Resource,
        context: &ExecutionContext,
    ) -> Vec<RemediationStep>;
}

/// Whether the resource's type is in the rule's supported set and belongs
/// to the rule's declared service.
pub fn supports(metadata: &RuleMetadata, resource: &Resource) -> bool {
    metadata.service.covers_type(&resource.resource_type)
        && metadata
            .resource_types
            .iter()
            .any(|pattern| resource.matches_type(pattern))
}

/// Full applicability test: supported type, matching service, and a
/// successful rule-specific probe.
pub async fn validate(
    rule: &dyn ComplianceRule,
    resource: &Resource,
    context: &ExecutionContext,
) -> bool {
    let metadata = rule.metadata();
    supports(&metadata, resource) && rule.probe(resource, context).await
}

/// Shared execution path for every rule.
///
/// 1. Unsupported resource type → skipped result, immediately.
/// 2. Run the check, retrying provider errors up to `retry_count` times.
/// 3. A final provider error becomes a failed result (severity high, error
///    preserved in metadata) — never an `Err` to the caller.
/// 4. Evidence and recommendations are materialized only when requested.
pub async fn run_rule(
    rule: &dyn ComplianceRule,
    resource: &Resource,
    context: &ExecutionContext,
    config: &EngineConfig,
) -> RuleExecutionResult {
    let started = Instant::now();
    let metadata = rule.metadata();

    if !supports(&metadata, resource) {
        return RuleExecutionResult::skipped(&metadata, &resource.arn);
    }

    let mut attempt = 0;
    let outcome = loop {
        match rule.check(resource, context).await {
            Ok(outcome) => break Ok(outcome),
            Err(err) if attempt < config.retry_count => {
                attempt += 1;
                tracing::warn!(
                    rule = %metadata.id,
                    resource = %resource.arn,
                    error = %err,
                    attempt,
                    "check failed, retrying"
                );
            }
            Err(err) => break Err(err),
        }
    };

    let mut meta = Map::new();
    meta.insert("service".into(), Value::String(metadata.service.as_str().into()));

    let mut result = match outcome {
        Ok(outcome) => {
            let severity = if outcome.passed {
                None
            } else {
                Some(outcome.severity.unwrap_or(metadata.severity))
            };
            let evidence = if config.include_evidence {
                rule.collect_evidence(resource, context).await
            } else {
                Vec::new()
            };
            let recommendations = if config.include_recommendations {
                rule.recommendations(outcome.passed)
            } else {
                Vec::new()
            };
            RuleExecutionResult {
                rule_id: metadata.id.clone(),
                resource_arn: resource.arn.clone(),
                passed: outcome.passed,
                severity,
                message: outcome.message,
                evidence,
                recommendations,
                metadata: meta,
                duration_ms: 0,
            }
        }
        Err(err) => {
            tracing::debug!(
                rule = %metadata.id,
                resource = %resource.arn,
                error = %err,
                "converting provider error into failed result"
            );
            meta.insert("error".into(), Value::String(err.to_string()));
            RuleExecutionResult {
                rule_id: metadata.id.clone(),
                resource_arn: resource.arn.clone(),
                passed: false,
                severity: Some(Severity::High),
                message: format!("Rule {} execution failed: {err}", metadata.id),
                evidence: Vec::new(),
                recommendations: vec![
                    "Verify the resource configuration and that the scanner role has \
                     read access to it."
                        .into(),
                ],
                metadata: meta,
                duration_ms: 0,
            }
        }
    };

    result.duration_ms = started.elapsed().as_millis() as u64;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComplianceFramework, ServiceFamily};
    use crate::provider::ProviderError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn bucket() -> Resource {
        Resource {
            arn: "arn:aws:s3:::data".into(),
            resource_type: "AWS::S3::Bucket".into(),
            region: "us-east-1".into(),
            account_id: "123456789012".into(),
            tags: HashMap::new(),
        }
    }

    fn context() -> ExecutionContext {
        ExecutionContext::new("tenant-1", "123456789012", "us-east-1")
    }

    /// Check behavior is scripted per test: fail N times, then the verdict.
    struct ScriptedRule {
        failures: AtomicU32,
        verdict: bool,
    }

    impl ScriptedRule {
        fn passing() -> Self {
            Self {
                failures: AtomicU32::new(0),
                verdict: true,
            }
        }

        fn erroring(times: u32) -> Self {
            Self {
                failures: AtomicU32::new(times),
                verdict: true,
            }
        }
    }

    #[async_trait]
    impl ComplianceRule for ScriptedRule {
        fn metadata(&self) -> RuleMetadata {
            RuleMetadata {
                id: "TEST-001".into(),
                name: "Scripted".into(),
                description: "test rule".into(),
                frameworks: vec![ComplianceFramework::Soc2],
                severity: Severity::Medium,
                resource_types: vec!["AWS::S3::Bucket".into()],
                service: ServiceFamily::S3,
            }
        }

        async fn check(
            &self,
            _resource: &Resource,
            _context: &ExecutionContext,
        ) -> ProviderResult<CheckOutcome> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(ProviderError::Throttled("slow down".into()));
            }
            Ok(if self.verdict {
                CheckOutcome::pass("ok")
            } else {
                CheckOutcome::fail("not ok")
            })
        }

        async fn collect_evidence(
            &self,
            _resource: &Resource,
            _context: &ExecutionContext,
        ) -> Vec<EvidenceItem> {
            vec![EvidenceItem::new(
                EvidenceKind::Configuration,
                "test",
                "scripted evidence",
                Value::Null,
            )]
        }

        fn recommendations(&self, _passed: bool) -> Vec<String> {
            vec!["scripted recommendation".into()]
        }

        async fn remediation_steps(
            &self,
            _resource: &Resource,
            _context: &ExecutionContext,
        ) -> Vec<RemediationStep> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn unsupported_type_short_circuits_to_skipped() {
        let rule = ScriptedRule::passing();
        let resource = Resource {
            resource_type: "AWS::EC2::SecurityGroup".into(),
            ..bucket()
        };
        let result = run_rule(&rule, &resource, &context(), &EngineConfig::default()).await;
        assert!(result.passed);
        assert!(result.is_skipped());
    }

    #[tokio::test]
    async fn provider_error_converts_to_failed_high() {
        let rule = ScriptedRule::erroring(10);
        let result = run_rule(&rule, &bucket(), &context(), &EngineConfig::default()).await;
        assert!(!result.passed);
        assert_eq!(result.severity, Some(Severity::High));
        assert!(result.error().unwrap().contains("slow down"));
        assert!(result.evidence.is_empty());
        assert!(!result.recommendations.is_empty());
    }

    #[tokio::test]
    async fn retry_count_recovers_transient_errors() {
        let rule = ScriptedRule::erroring(2);
        let config = EngineConfig {
            retry_count: 2,
            ..EngineConfig::default()
        };
        let result = run_rule(&rule, &bucket(), &context(), &config).await;
        assert!(result.passed);
        assert!(result.error().is_none());
    }

    #[tokio::test]
    async fn evidence_and_recommendations_respect_config() {
        let rule = ScriptedRule::passing();
        let config = EngineConfig {
            include_evidence: false,
            include_recommendations: false,
            ..EngineConfig::default()
        };
        let result = run_rule(&rule, &bucket(), &context(), &config).await;
        assert!(result.evidence.is_empty());
        assert!(result.recommendations.is_empty());

        let result = run_rule(&rule, &bucket(), &context(), &EngineConfig::default()).await;
        assert_eq!(result.evidence.len(), 1);
        assert_eq!(result.recommendations.len(), 1);
    }
}
