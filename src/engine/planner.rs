//! Execution planning: which rules apply to a batch, in what order, and
//! how they are grouped for bounded concurrency.

use std::collections::BTreeSet;

use crate::config::EngineConfig;
use crate::model::{type_pattern_matches, Resource};
use crate::rules::registry::RuleRegistry;

/// Flat per-rule duration estimate. Not calibrated from historical timing.
pub const ESTIMATED_MS_PER_RULE: u64 = 500;

/// One entry of the dependency-ordered rule list. `depends_on` is always
/// empty today: rules are guaranteed independent and the order is the
/// registration-relative order.
#[derive(Debug, Clone)]
pub struct RuleDependency {
    pub rule_id: String,
    pub depends_on: Vec<String>,
    pub position: usize,
}

/// The planner's output for one batch.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Applicable rule ids in execution order.
    pub rule_ids: Vec<String>,
    pub dependency_order: Vec<RuleDependency>,
    pub estimated_duration_ms: u64,
    /// Rule ids partitioned into ordered groups; each group's rules may
    /// run concurrently, groups are separated by a strict barrier.
    pub groups: Vec<Vec<String>>,
}

/// Build the plan for one batch: filter the registry down to rules whose
/// type patterns cover a resource type present in the batch, keep the
/// registration order, and chunk for concurrency.
pub fn create_execution_plan(
    registry: &RuleRegistry,
    resources: &[Resource],
    config: &EngineConfig,
) -> ExecutionPlan {
    let present_types: BTreeSet<&str> = resources
        .iter()
        .map(|r| r.resource_type.as_str())
        .collect();

    let rule_ids: Vec<String> = registry
        .entries()
        .iter()
        .filter(|entry| {
            entry.metadata.resource_types.iter().any(|pattern| {
                present_types
                    .iter()
                    .any(|resource_type| type_pattern_matches(pattern, resource_type))
            })
        })
        .map(|entry| entry.metadata.id.clone())
        .collect();

    let dependency_order: Vec<RuleDependency> = rule_ids
        .iter()
        .enumerate()
        .map(|(position, rule_id)| RuleDependency {
            rule_id: rule_id.clone(),
            depends_on: Vec::new(),
            position,
        })
        .collect();

    let groups: Vec<Vec<String>> = if config.parallel {
        let chunk = config.max_concurrency.max(1);
        rule_ids.chunks(chunk).map(|c| c.to_vec()).collect()
    } else {
        rule_ids.iter().map(|id| vec![id.clone()]).collect()
    };

    ExecutionPlan {
        estimated_duration_ms: rule_ids.len() as u64 * ESTIMATED_MS_PER_RULE,
        rule_ids,
        dependency_order,
        groups,
    }
}
