//! IAM hygiene checks: root MFA, account password policy, wildcard grants.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::model::{ComplianceFramework, ExecutionContext, Resource, Severity, ServiceFamily};
use crate::provider::{IamApi, PasswordPolicy, ProviderResult};
use crate::rules::{
    CheckOutcome, ComplianceRule, EvidenceItem, EvidenceKind, RemediationStep, RiskLevel,
    RuleMetadata,
};

const ACCOUNT_TYPES: &[&str] = &["AWS::IAM::Account"];

const MIN_PASSWORD_LENGTH: u32 = 14;
const MAX_PASSWORD_AGE_DAYS: u32 = 90;
const MIN_REUSE_PREVENTION: u32 = 5;

fn account_types() -> Vec<String> {
    ACCOUNT_TYPES.iter().map(|s| s.to_string()).collect()
}

/// IAM-001: the root account must have MFA enabled.
pub struct RootMfaRule {
    iam: Arc<dyn IamApi>,
}

impl RootMfaRule {
    pub fn new(iam: Arc<dyn IamApi>) -> Self {
        Self { iam }
    }
}

#[async_trait]
impl ComplianceRule for RootMfaRule {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "IAM-001".into(),
            name: "Root account MFA".into(),
            description: "The root account must have multi-factor authentication enabled".into(),
            frameworks: vec![ComplianceFramework::Cis, ComplianceFramework::Soc2],
            severity: Severity::Critical,
            resource_types: account_types(),
            service: ServiceFamily::Iam,
        }
    }

    async fn check(
        &self,
        _resource: &Resource,
        _context: &ExecutionContext,
    ) -> ProviderResult<CheckOutcome> {
        let summary = self.iam.get_account_summary().await?;
        if summary.account_mfa_enabled {
            Ok(CheckOutcome::pass("Root account has MFA enabled"))
        } else {
            Ok(CheckOutcome::fail("Root account does not have MFA enabled"))
        }
    }

    async fn collect_evidence(
        &self,
        _resource: &Resource,
        _context: &ExecutionContext,
    ) -> Vec<EvidenceItem> {
        match self.iam.get_account_summary().await {
            Ok(summary) => vec![EvidenceItem::new(
                EvidenceKind::ApiResponse,
                "iam:GetAccountSummary",
                "Account summary MFA and root access key flags",
                json!({
                    "account_mfa_enabled": summary.account_mfa_enabled,
                    "root_access_keys_present": summary.root_access_keys_present,
                }),
            )],
            Err(err) => vec![EvidenceItem::new(
                EvidenceKind::ApiResponse,
                "iam:GetAccountSummary",
                format!("Could not read account summary: {err}"),
                Value::Null,
            )],
        }
    }

    fn recommendations(&self, passed: bool) -> Vec<String> {
        if passed {
            vec!["Prefer a hardware MFA device for the root account.".into()]
        } else {
            vec![
                "Enable MFA on the root account immediately.".into(),
                "Avoid using the root account for day-to-day operations.".into(),
            ]
        }
    }

    async fn remediation_steps(
        &self,
        _resource: &Resource,
        _context: &ExecutionContext,
    ) -> Vec<RemediationStep> {
        vec![RemediationStep {
            order: 1,
            action: "Enable root MFA".into(),
            description: "Sign in as root and register a virtual or hardware MFA device".into(),
            risk: RiskLevel::Low,
            command: None,
            iac_snippet: None,
        }]
    }
}

/// IAM-002: the account password policy must satisfy the baseline thresholds.
pub struct PasswordPolicyRule {
    iam: Arc<dyn IamApi>,
}

impl PasswordPolicyRule {
    pub fn new(iam: Arc<dyn IamApi>) -> Self {
        Self { iam }
    }

    fn violations(policy: &PasswordPolicy) -> Vec<String> {
        let mut violations = Vec::new();
        if policy.minimum_password_length < MIN_PASSWORD_LENGTH {
            violations.push(format!(
                "minimum length {} is below {MIN_PASSWORD_LENGTH}",
                policy.minimum_password_length
            ));
        }
        if !policy.require_symbols {
            violations.push("symbols not required".into());
        }
        if !policy.require_numbers {
            violations.push("numbers not required".into());
        }
        if !policy.require_uppercase {
            violations.push("uppercase characters not required".into());
        }
        if !policy.require_lowercase {
            violations.push("lowercase characters not required".into());
        }
        match policy.max_password_age_days {
            Some(age) if age <= MAX_PASSWORD_AGE_DAYS => {}
            Some(age) => violations.push(format!(
                "maximum password age {age} days exceeds {MAX_PASSWORD_AGE_DAYS}"
            )),
            None => violations.push("no maximum password age set".into()),
        }
        match policy.password_reuse_prevention {
            Some(count) if count >= MIN_REUSE_PREVENTION => {}
            Some(count) => violations.push(format!(
                "reuse prevention remembers only {count} passwords (minimum {MIN_REUSE_PREVENTION})"
            )),
            None => violations.push("password reuse prevention not set".into()),
        }
        violations
    }
}

#[async_trait]
impl ComplianceRule for PasswordPolicyRule {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "IAM-002".into(),
            name: "Account password policy".into(),
            description: "The account password policy must meet the security baseline".into(),
            frameworks: vec![ComplianceFramework::Cis],
            severity: Severity::Medium,
            resource_types: account_types(),
            service: ServiceFamily::Iam,
        }
    }

    async fn check(
        &self,
        _resource: &Resource,
        _context: &ExecutionContext,
    ) -> ProviderResult<CheckOutcome> {
        match self.iam.get_password_policy().await? {
            None => Ok(CheckOutcome::fail(
                "Account has no password policy configured",
            )),
            Some(policy) => {
                let violations = Self::violations(&policy);
                if violations.is_empty() {
                    Ok(CheckOutcome::pass(
                        "Account password policy meets the baseline",
                    ))
                } else {
                    Ok(CheckOutcome::fail(format!(
                        "Account password policy is below the baseline: {}",
                        violations.join("; ")
                    )))
                }
            }
        }
    }

    async fn collect_evidence(
        &self,
        _resource: &Resource,
        _context: &ExecutionContext,
    ) -> Vec<EvidenceItem> {
        match self.iam.get_password_policy().await {
            Ok(policy) => vec![EvidenceItem::new(
                EvidenceKind::Configuration,
                "iam:GetAccountPasswordPolicy",
                "Current account password policy",
                serde_json::to_value(&policy).unwrap_or(Value::Null),
            )],
            Err(err) => vec![EvidenceItem::new(
                EvidenceKind::ApiResponse,
                "iam:GetAccountPasswordPolicy",
                format!("Could not read password policy: {err}"),
                Value::Null,
            )],
        }
    }

    fn recommendations(&self, passed: bool) -> Vec<String> {
        if passed {
            Vec::new()
        } else {
            vec![format!(
                "Require at least {MIN_PASSWORD_LENGTH} characters with symbols, numbers and \
                 mixed case; cap password age at {MAX_PASSWORD_AGE_DAYS} days and remember the \
                 last {MIN_REUSE_PREVENTION} passwords."
            )]
        }
    }

    async fn remediation_steps(
        &self,
        _resource: &Resource,
        _context: &ExecutionContext,
    ) -> Vec<RemediationStep> {
        vec![RemediationStep {
            order: 1,
            action: "Update password policy".into(),
            description: "Apply the baseline account password policy".into(),
            risk: RiskLevel::Low,
            command: Some(format!(
                "aws iam update-account-password-policy \
                 --minimum-password-length {MIN_PASSWORD_LENGTH} \
                 --require-symbols --require-numbers \
                 --require-uppercase-characters --require-lowercase-characters \
                 --max-password-age {MAX_PASSWORD_AGE_DAYS} \
                 --password-reuse-prevention {MIN_REUSE_PREVENTION}"
            )),
            iac_snippet: None,
        }]
    }
}

/// IAM-003: attached policies must not combine wildcard actions with
/// wildcard resources.
pub struct WildcardPolicyRule {
    iam: Arc<dyn IamApi>,
}

impl WildcardPolicyRule {
    pub fn new(iam: Arc<dyn IamApi>) -> Self {
        Self { iam }
    }
}

#[async_trait]
impl ComplianceRule for WildcardPolicyRule {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "IAM-003".into(),
            name: "Wildcard policy grants".into(),
            description: "Attached policies must not grant wildcard actions on wildcard resources"
                .into(),
            frameworks: vec![ComplianceFramework::Soc2, ComplianceFramework::Nist],
            severity: Severity::High,
            resource_types: account_types(),
            service: ServiceFamily::Iam,
        }
    }

    async fn check(
        &self,
        _resource: &Resource,
        _context: &ExecutionContext,
    ) -> ProviderResult<CheckOutcome> {
        let policies = self.iam.list_attached_policies().await?;
        let offenders: Vec<&str> = policies
            .iter()
            .filter(|p| {
                p.statements.iter().any(|s| {
                    s.effect.eq_ignore_ascii_case("allow")
                        && s.actions.iter().any(|a| a == "*")
                        && s.resources.iter().any(|r| r == "*")
                })
            })
            .map(|p| p.name.as_str())
            .collect();

        if offenders.is_empty() {
            Ok(CheckOutcome::pass(
                "No attached policy grants wildcard actions on wildcard resources",
            ))
        } else {
            Ok(CheckOutcome::fail(format!(
                "Policies granting full wildcard access: {}",
                offenders.join(", ")
            )))
        }
    }

    async fn collect_evidence(
        &self,
        _resource: &Resource,
        _context: &ExecutionContext,
    ) -> Vec<EvidenceItem> {
        match self.iam.list_attached_policies().await {
            Ok(policies) => vec![EvidenceItem::new(
                EvidenceKind::Policy,
                "iam:ListAttachedPolicies",
                "Attached managed policies and their statements",
                serde_json::to_value(&policies).unwrap_or(Value::Null),
            )],
            Err(err) => vec![EvidenceItem::new(
                EvidenceKind::ApiResponse,
                "iam:ListAttachedPolicies",
                format!("Could not list attached policies: {err}"),
                Value::Null,
            )],
        }
    }

    fn recommendations(&self, passed: bool) -> Vec<String> {
        if passed {
            Vec::new()
        } else {
            vec![
                "Replace wildcard grants with least-privilege statements scoped to the \
                 actions and resources each workload needs."
                    .into(),
                "Use IAM Access Analyzer to generate policies from observed access.".into(),
            ]
        }
    }

    async fn remediation_steps(
        &self,
        _resource: &Resource,
        _context: &ExecutionContext,
    ) -> Vec<RemediationStep> {
        vec![
            RemediationStep {
                order: 1,
                action: "Identify wildcard policies".into(),
                description: "List attached policies whose statements allow * on *".into(),
                risk: RiskLevel::Low,
                command: Some("aws iam list-policies --scope Local".into()),
                iac_snippet: None,
            },
            RemediationStep {
                order: 2,
                action: "Scope down grants".into(),
                description: "Create least-privilege replacements and detach the wildcard versions"
                    .into(),
                risk: RiskLevel::High,
                command: None,
                iac_snippet: None,
            },
        ]
    }
}
