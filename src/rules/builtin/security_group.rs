//! Security group checks: world-open ingress, with SSH/RDP exposure
//! treated as critical.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{ComplianceFramework, ExecutionContext, Resource, Severity, ServiceFamily};
use crate::provider::{Ec2Api, ProviderResult, SecurityGroup};
use crate::rules::{
    CheckOutcome, ComplianceRule, EvidenceItem, EvidenceKind, RemediationStep, RiskLevel,
    RuleMetadata,
};

const GROUP_TYPES: &[&str] = &["AWS::EC2::SecurityGroup"];

/// Ports whose public exposure is always critical.
const SENSITIVE_PORTS: &[(u16, &str)] = &[(22, "SSH"), (3389, "RDP")];

fn group_types() -> Vec<String> {
    GROUP_TYPES.iter().map(|s| s.to_string()).collect()
}

/// World-open exposures of sensitive ports in one group.
fn sensitive_exposures(group: &SecurityGroup) -> Vec<String> {
    let mut exposures = Vec::new();
    for rule in &group.ingress_rules {
        for cidr in rule.open_cidrs() {
            for &(port, label) in SENSITIVE_PORTS {
                if rule.covers_port(port) {
                    exposures.push(format!(
                        "{label} ({} port {port}) from {cidr}",
                        rule.protocol
                    ));
                }
            }
        }
    }
    exposures
}

/// SG-001: SSH and RDP must never be reachable from the whole internet.
pub struct RestrictedPortExposureRule {
    ec2: Arc<dyn Ec2Api>,
}

impl RestrictedPortExposureRule {
    pub fn new(ec2: Arc<dyn Ec2Api>) -> Self {
        Self { ec2 }
    }
}

#[async_trait]
impl ComplianceRule for RestrictedPortExposureRule {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "SG-001".into(),
            name: "SSH/RDP exposure".into(),
            description: "Security groups must not expose SSH or RDP to 0.0.0.0/0 or ::/0".into(),
            frameworks: vec![ComplianceFramework::Cis, ComplianceFramework::Nist],
            severity: Severity::Critical,
            resource_types: group_types(),
            service: ServiceFamily::Ec2,
        }
    }

    async fn probe(&self, resource: &Resource, _context: &ExecutionContext) -> bool {
        self.ec2.describe_security_group(resource.name()).await.is_ok()
    }

    async fn check(
        &self,
        resource: &Resource,
        _context: &ExecutionContext,
    ) -> ProviderResult<CheckOutcome> {
        let group = self.ec2.describe_security_group(resource.name()).await?;
        let exposures = sensitive_exposures(&group);
        if exposures.is_empty() {
            Ok(CheckOutcome::pass(format!(
                "Security group {} does not expose SSH or RDP publicly",
                group.group_id
            )))
        } else {
            Ok(CheckOutcome::fail(format!(
                "Security group {} allows {}",
                group.group_id,
                exposures.join("; ")
            )))
        }
    }

    async fn collect_evidence(
        &self,
        resource: &Resource,
        _context: &ExecutionContext,
    ) -> Vec<EvidenceItem> {
        ingress_evidence(&*self.ec2, resource).await
    }

    fn recommendations(&self, passed: bool) -> Vec<String> {
        if passed {
            Vec::new()
        } else {
            vec![
                "Restrict SSH/RDP ingress to known admin CIDRs or a bastion host.".into(),
                "Prefer SSM Session Manager over direct SSH access.".into(),
            ]
        }
    }

    async fn remediation_steps(
        &self,
        resource: &Resource,
        _context: &ExecutionContext,
    ) -> Vec<RemediationStep> {
        let group = resource.name();
        vec![
            RemediationStep {
                order: 1,
                action: "Revoke world-open rule".into(),
                description: format!("Remove the 0.0.0.0/0 ingress rule for port 22 on {group}"),
                risk: RiskLevel::Medium,
                command: Some(format!(
                    "aws ec2 revoke-security-group-ingress --group-id {group} \
                     --protocol tcp --port 22 --cidr 0.0.0.0/0"
                )),
                iac_snippet: None,
            },
            RemediationStep {
                order: 2,
                action: "Add scoped rule".into(),
                description: format!("Re-allow port 22 on {group} from the admin CIDR only"),
                risk: RiskLevel::Low,
                command: Some(format!(
                    "aws ec2 authorize-security-group-ingress --group-id {group} \
                     --protocol tcp --port 22 --cidr <admin-cidr>"
                )),
                iac_snippet: None,
            },
        ]
    }
}

/// SG-002: no ingress rule may be open to the whole internet on any port.
/// Escalates to critical when the open range includes a sensitive port.
pub struct OpenIngressRule {
    ec2: Arc<dyn Ec2Api>,
}

impl OpenIngressRule {
    pub fn new(ec2: Arc<dyn Ec2Api>) -> Self {
        Self { ec2 }
    }
}

#[async_trait]
impl ComplianceRule for OpenIngressRule {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "SG-002".into(),
            name: "World-open ingress".into(),
            description: "Security groups must not permit ingress from 0.0.0.0/0 or ::/0".into(),
            frameworks: vec![ComplianceFramework::Soc2, ComplianceFramework::Cis],
            severity: Severity::High,
            resource_types: group_types(),
            service: ServiceFamily::Ec2,
        }
    }

    async fn probe(&self, resource: &Resource, _context: &ExecutionContext) -> bool {
        self.ec2.describe_security_group(resource.name()).await.is_ok()
    }

    async fn check(
        &self,
        resource: &Resource,
        _context: &ExecutionContext,
    ) -> ProviderResult<CheckOutcome> {
        let group = self.ec2.describe_security_group(resource.name()).await?;
        let mut open = Vec::new();
        for rule in &group.ingress_rules {
            for cidr in rule.open_cidrs() {
                let range = match (rule.from_port, rule.to_port) {
                    (Some(from), Some(to)) if from == to => format!("port {from}"),
                    (Some(from), Some(to)) => format!("ports {from}-{to}"),
                    _ => "all ports".into(),
                };
                open.push(format!("{} {range} from {cidr}", rule.protocol));
            }
        }

        if open.is_empty() {
            return Ok(CheckOutcome::pass(format!(
                "Security group {} has no world-open ingress rules",
                group.group_id
            )));
        }

        let message = format!(
            "Security group {} permits public ingress: {}",
            group.group_id,
            open.join("; ")
        );
        if sensitive_exposures(&group).is_empty() {
            Ok(CheckOutcome::fail(message))
        } else {
            Ok(CheckOutcome::fail_with(Severity::Critical, message))
        }
    }

    async fn collect_evidence(
        &self,
        resource: &Resource,
        _context: &ExecutionContext,
    ) -> Vec<EvidenceItem> {
        ingress_evidence(&*self.ec2, resource).await
    }

    fn recommendations(&self, passed: bool) -> Vec<String> {
        if passed {
            Vec::new()
        } else {
            vec![
                "Scope every ingress rule to the narrowest CIDR that still works.".into(),
                "Front public services with a load balancer and keep instance groups private.".into(),
            ]
        }
    }

    async fn remediation_steps(
        &self,
        resource: &Resource,
        _context: &ExecutionContext,
    ) -> Vec<RemediationStep> {
        let group = resource.name();
        vec![RemediationStep {
            order: 1,
            action: "Review ingress rules".into(),
            description: format!("Audit all world-open ingress rules on {group}"),
            risk: RiskLevel::Low,
            command: Some(format!(
                "aws ec2 describe-security-groups --group-ids {group}"
            )),
            iac_snippet: None,
        }]
    }
}

async fn ingress_evidence(ec2: &dyn Ec2Api, resource: &Resource) -> Vec<EvidenceItem> {
    match ec2.describe_security_group(resource.name()).await {
        Ok(group) => vec![EvidenceItem::new(
            EvidenceKind::Configuration,
            "ec2:DescribeSecurityGroups",
            format!("Ingress rules of security group {}", group.group_id),
            serde_json::to_value(&group.ingress_rules).unwrap_or(Value::Null),
        )],
        Err(err) => vec![EvidenceItem::new(
            EvidenceKind::ApiResponse,
            "ec2:DescribeSecurityGroups",
            format!("Could not describe security group: {err}"),
            Value::Null,
        )],
    }
}
