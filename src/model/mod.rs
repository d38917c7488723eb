//! Shared domain types consumed by every layer of the engine.
//!
//! A `Resource` is whatever the inventory collaborator discovered; the
//! engine never mutates one. An `ExecutionContext` identifies a single
//! scan run and is passed through unchanged to every rule invocation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One discovered cloud object a rule may be evaluated against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// ARN-like unique identifier.
    pub arn: String,
    /// Namespaced type tag, e.g. `AWS::S3::Bucket`.
    pub resource_type: String,
    pub region: String,
    pub account_id: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl Resource {
    /// The trailing segment of the ARN — bucket name, group id, trail name.
    pub fn name(&self) -> &str {
        self.arn
            .rsplit(|c| c == '/' || c == ':')
            .next()
            .unwrap_or(&self.arn)
    }

    /// Whether a rule's declared type pattern covers this resource.
    ///
    /// A pattern matches on equality or on suffix, tolerating an optional
    /// `AWS::`-style namespace prefix on either side, so `S3::Bucket`
    /// matches `AWS::S3::Bucket` and vice versa.
    pub fn matches_type(&self, pattern: &str) -> bool {
        type_pattern_matches(pattern, &self.resource_type)
    }
}

pub(crate) fn type_pattern_matches(pattern: &str, resource_type: &str) -> bool {
    if pattern == resource_type {
        return true;
    }
    let stripped_type = resource_type.strip_prefix("AWS::").unwrap_or(resource_type);
    let stripped_pattern = pattern.strip_prefix("AWS::").unwrap_or(pattern);
    stripped_pattern == stripped_type
        || resource_type.ends_with(pattern)
        || pattern.ends_with(stripped_type)
}

/// Per-run identity. Carries no mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub tenant_id: String,
    pub account_id: String,
    pub region: String,
    pub user_id: Option<String>,
    pub scan_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(tenant_id: impl Into<String>, account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            account_id: account_id.into(),
            region: region.into(),
            user_id: None,
            scan_id: None,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Owning service family of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceFamily {
    S3,
    Iam,
    Ec2,
    CloudTrail,
}

impl ServiceFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Iam => "iam",
            Self::Ec2 => "ec2",
            Self::CloudTrail => "cloudtrail",
        }
    }

    /// Whether a namespaced resource type belongs to this service,
    /// e.g. `AWS::S3::Bucket` → S3.
    pub fn covers_type(&self, resource_type: &str) -> bool {
        let stripped = resource_type.strip_prefix("AWS::").unwrap_or(resource_type);
        let service = stripped.split("::").next().unwrap_or(stripped);
        match self {
            Self::S3 => service.eq_ignore_ascii_case("s3"),
            Self::Iam => service.eq_ignore_ascii_case("iam"),
            Self::Ec2 => service.eq_ignore_ascii_case("ec2"),
            Self::CloudTrail => service.eq_ignore_ascii_case("cloudtrail"),
        }
    }

    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "s3" => Some(Self::S3),
            "iam" => Some(Self::Iam),
            "ec2" => Some(Self::Ec2),
            "cloudtrail" | "trail" => Some(Self::CloudTrail),
            _ => None,
        }
    }
}

impl std::fmt::Display for ServiceFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External compliance standard a rule maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceFramework {
    Soc2,
    Cis,
    Nist,
    Hipaa,
    PciDss,
}

impl ComplianceFramework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Soc2 => "SOC2",
            Self::Cis => "CIS",
            Self::Nist => "NIST",
            Self::Hipaa => "HIPAA",
            Self::PciDss => "PCI-DSS",
        }
    }

    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "soc2" => Some(Self::Soc2),
            "cis" => Some(Self::Cis),
            "nist" => Some(Self::Nist),
            "hipaa" => Some(Self::Hipaa),
            "pcidss" | "pci" => Some(Self::PciDss),
            _ => None,
        }
    }
}

impl std::fmt::Display for ComplianceFramework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
