//! Per-resource roll-ups and whole-run statistics.
//!
//! Findings are synthesized fresh on every aggregation call; nothing here
//! is persisted. Compliance scores are defined over the rules actually
//! evaluated against a resource, so skipped (inapplicable) results are
//! excluded before counting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::model::{ComplianceFramework, Resource, Severity};
use crate::rules::registry::RuleRegistry;
use crate::rules::{EvidenceItem, RuleExecutionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationKind {
    ManualGuidance,
    Automated,
}

/// The reportable record derived from one failed rule execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub resource_arn: String,
    pub framework: ComplianceFramework,
    /// The violated control — the rule id.
    pub control_id: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    pub evidence: Vec<EvidenceItem>,
    pub remediation: RemediationKind,
    /// Set for dry runs so downstream automation leaves the finding alone.
    pub advisory_only: bool,
}

/// One resource's compliance roll-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceAggregation {
    pub resource_arn: String,
    pub total_rules: usize,
    pub passed_rules: usize,
    pub failed_rules: usize,
    pub findings: Vec<Finding>,
    /// passed / total × 100; 100 when no rules applied.
    pub compliance_score: f64,
    /// Frameworks touched by the evaluated rules, deduplicated and sorted.
    pub frameworks: Vec<ComplianceFramework>,
    /// Highest severity among failed results; info when none failed.
    pub overall_severity: Severity,
    pub summary: String,
}

/// The whole run's roll-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub total_rules: usize,
    pub executed_rules: usize,
    pub passed_rules: usize,
    pub failed_rules: usize,
    pub skipped_rules: usize,
    pub total_duration_ms: u64,
    pub avg_duration_ms: f64,
    pub failures_by_severity: HashMap<Severity, usize>,
    pub failures_by_service: HashMap<String, usize>,
}

/// Roll one resource's results up into an aggregation, synthesizing one
/// finding per failed rule.
pub fn aggregate_resource(
    registry: &RuleRegistry,
    resource: &Resource,
    results: &[RuleExecutionResult],
    config: &EngineConfig,
) -> ResourceAggregation {
    let evaluated: Vec<&RuleExecutionResult> =
        results.iter().filter(|r| !r.is_skipped()).collect();

    let total_rules = evaluated.len();
    let passed_rules = evaluated.iter().filter(|r| r.passed).count();
    let failed_rules = total_rules - passed_rules;

    let findings: Vec<Finding> = evaluated
        .iter()
        .filter(|r| !r.passed)
        .map(|r| synthesize_finding(registry, r, config))
        .collect();

    let mut frameworks: Vec<ComplianceFramework> = evaluated
        .iter()
        .filter_map(|r| registry.get(&r.rule_id))
        .flat_map(|entry| entry.metadata.frameworks.iter().copied())
        .collect();
    frameworks.sort();
    frameworks.dedup();

    let overall_severity = evaluated
        .iter()
        .filter(|r| !r.passed)
        .filter_map(|r| r.severity)
        .max()
        .unwrap_or(Severity::Info);

    let compliance_score = if total_rules == 0 {
        100.0
    } else {
        passed_rules as f64 / total_rules as f64 * 100.0
    };

    let summary = format!(
        "{}: {passed_rules}/{total_rules} rules passed ({compliance_score:.1}%), highest severity: {overall_severity}",
        resource.arn
    );

    ResourceAggregation {
        resource_arn: resource.arn.clone(),
        total_rules,
        passed_rules,
        failed_rules,
        findings,
        compliance_score,
        frameworks,
        overall_severity,
        summary,
    }
}

fn synthesize_finding(
    registry: &RuleRegistry,
    result: &RuleExecutionResult,
    config: &EngineConfig,
) -> Finding {
    let entry = registry.get(&result.rule_id);
    let framework = entry
        .and_then(|e| e.metadata.frameworks.first().copied())
        .unwrap_or(ComplianceFramework::Soc2);
    let severity = result
        .severity
        .or_else(|| entry.map(|e| e.metadata.severity))
        .unwrap_or(Severity::High);

    Finding {
        id: Uuid::new_v4().to_string(),
        resource_arn: result.resource_arn.clone(),
        framework,
        control_id: result.rule_id.clone(),
        severity,
        title: result.message.clone(),
        description: result.message.clone(),
        recommendation: result.recommendations.join(" "),
        evidence: result.evidence.clone(),
        remediation: RemediationKind::ManualGuidance,
        advisory_only: config.dry_run,
    }
}

/// Compute whole-run statistics over the flat result list.
pub fn batch_statistics(results: &[RuleExecutionResult]) -> BatchStatistics {
    let total_rules = results.len();
    let skipped_rules = results.iter().filter(|r| r.is_skipped()).count();
    let executed_rules = total_rules - skipped_rules;
    let passed_rules = results
        .iter()
        .filter(|r| r.passed && !r.is_skipped())
        .count();
    let failed_rules = results.iter().filter(|r| !r.passed).count();

    let total_duration_ms: u64 = results.iter().map(|r| r.duration_ms).sum();
    let avg_duration_ms = if total_rules == 0 {
        0.0
    } else {
        total_duration_ms as f64 / total_rules as f64
    };

    let mut failures_by_severity: HashMap<Severity, usize> = HashMap::new();
    let mut failures_by_service: HashMap<String, usize> = HashMap::new();
    for result in results.iter().filter(|r| !r.passed) {
        let severity = result.severity.unwrap_or(Severity::High);
        *failures_by_severity.entry(severity).or_default() += 1;
        let service = result.service().unwrap_or("unknown").to_string();
        *failures_by_service.entry(service).or_default() += 1;
    }

    BatchStatistics {
        total_rules,
        executed_rules,
        passed_rules,
        failed_rules,
        skipped_rules,
        total_duration_ms,
        avg_duration_ms,
        failures_by_severity,
        failures_by_service,
    }
}
