mod cloudtrail;
mod iam;
mod s3;
mod security_group;

use std::sync::Arc;

use super::ComplianceRule;
use crate::provider::CloudProviders;

pub use cloudtrail::{LogValidationRule, MultiRegionTrailRule, TrailStorageRule};
pub use iam::{PasswordPolicyRule, RootMfaRule, WildcardPolicyRule};
pub use s3::{BucketEncryptionRule, BucketVersioningRule, PublicAccessBlockRule};
pub use security_group::{OpenIngressRule, RestrictedPortExposureRule};

/// The built-in rule set, each rule holding its own client handle.
/// Registration order here is the planner's execution order.
pub fn all_rules(providers: &CloudProviders) -> Vec<Arc<dyn ComplianceRule>> {
    vec![
        Arc::new(BucketEncryptionRule::new(providers.s3.clone())),
        Arc::new(PublicAccessBlockRule::new(providers.s3.clone())),
        Arc::new(BucketVersioningRule::new(providers.s3.clone())),
        Arc::new(RootMfaRule::new(providers.iam.clone())),
        Arc::new(PasswordPolicyRule::new(providers.iam.clone())),
        Arc::new(WildcardPolicyRule::new(providers.iam.clone())),
        Arc::new(RestrictedPortExposureRule::new(providers.ec2.clone())),
        Arc::new(OpenIngressRule::new(providers.ec2.clone())),
        Arc::new(MultiRegionTrailRule::new(providers.cloudtrail.clone())),
        Arc::new(TrailStorageRule::new(providers.cloudtrail.clone())),
        Arc::new(LogValidationRule::new(providers.cloudtrail.clone())),
    ]
}
