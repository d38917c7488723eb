use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{ComplianceFramework, Severity, ServiceFamily};

/// Identity and classification of a rule. Created once at registration,
/// read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleMetadata {
    /// Unique rule identifier (e.g. "S3-001").
    pub id: String,
    /// Human-readable rule name.
    pub name: String,
    /// What the rule checks for.
    pub description: String,
    /// Compliance frameworks the rule maps to.
    pub frameworks: Vec<ComplianceFramework>,
    /// Default severity when the check fails.
    pub severity: Severity,
    /// Resource-type patterns the rule applies to.
    pub resource_types: Vec<String>,
    /// Owning service family.
    pub service: ServiceFamily,
}

/// Category tag of one piece of supporting data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Configuration,
    ApiResponse,
    Log,
    Metric,
    Policy,
}

/// One piece of supporting data for a check outcome. Owned by the result
/// that contains it; the engine persists nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub kind: EvidenceKind,
    pub description: String,
    pub data: Value,
    pub collected_at: DateTime<Utc>,
    /// Name of the API or subsystem the data came from.
    pub source: String,
}

impl EvidenceItem {
    pub fn new(kind: EvidenceKind, source: impl Into<String>, description: impl Into<String>, data: Value) -> Self {
        Self {
            kind,
            description: description.into(),
            data,
            collected_at: Utc::now(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// One advisory remediation step. Never executed by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationStep {
    pub order: u32,
    pub action: String,
    pub description: String,
    pub risk: RiskLevel,
    /// Literal command applying the fix, when one exists.
    pub command: Option<String>,
    /// Declarative-infrastructure snippet applying the fix.
    pub iac_snippet: Option<String>,
}

/// The outcome of one rule against one resource — the atomic unit the rest
/// of the system aggregates over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleExecutionResult {
    pub rule_id: String,
    pub resource_arn: String,
    pub passed: bool,
    /// Present when the check failed.
    pub severity: Option<Severity>,
    pub message: String,
    pub evidence: Vec<EvidenceItem>,
    pub recommendations: Vec<String>,
    /// Free-form metadata: skip flag, service, converted error message.
    pub metadata: Map<String, Value>,
    pub duration_ms: u64,
}

impl RuleExecutionResult {
    /// The "not applicable" outcome. Always passing, never a failure.
    pub fn skipped(rule: &RuleMetadata, resource_arn: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert("skipped".into(), Value::Bool(true));
        metadata.insert("service".into(), Value::String(rule.service.as_str().into()));
        Self {
            rule_id: rule.id.clone(),
            resource_arn: resource_arn.to_string(),
            passed: true,
            severity: None,
            message: format!("Rule {} not applicable to this resource type", rule.id),
            evidence: Vec::new(),
            recommendations: Vec::new(),
            metadata,
            duration_ms: 0,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.metadata
            .get("skipped")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn service(&self) -> Option<&str> {
        self.metadata.get("service").and_then(Value::as_str)
    }

    pub fn error(&self) -> Option<&str> {
        self.metadata.get("error").and_then(Value::as_str)
    }
}
