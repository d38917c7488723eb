//! In-memory rule catalog.
//!
//! Insertion-ordered so the planner's "registration-relative" execution
//! order is deterministic. Append-only for the process lifetime; the only
//! mutation after construction is usage-counter bookkeeping, which the
//! orchestrator performs on its own control thread after each awaited
//! completion.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{ComplianceRule, RuleMetadata};
use crate::model::{ComplianceFramework, ServiceFamily};

#[derive(Debug, Clone, Copy, Default)]
pub struct UsageStats {
    pub invocations: u64,
    pub last_used: Option<DateTime<Utc>>,
}

pub struct RegistryEntry {
    pub metadata: RuleMetadata,
    pub executor: Arc<dyn ComplianceRule>,
    /// Always empty today: rules are guaranteed independent.
    pub depends_on: Vec<String>,
    pub usage: UsageStats,
}

#[derive(Default)]
pub struct RuleRegistry {
    entries: Vec<RegistryEntry>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rule, or overwrite the existing entry with the same id.
    /// Overwriting keeps the original registration position and resets
    /// usage counters.
    pub fn register_rule(&mut self, executor: Arc<dyn ComplianceRule>) {
        let metadata = executor.metadata();
        let entry = RegistryEntry {
            metadata,
            executor,
            depends_on: Vec::new(),
            usage: UsageStats::default(),
        };
        match self
            .entries
            .iter_mut()
            .find(|e| e.metadata.id == entry.metadata.id)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, rule_id: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.metadata.id == rule_id)
    }

    /// Entries in registration order.
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn all_rules(&self) -> Vec<RuleMetadata> {
        self.entries.iter().map(|e| e.metadata.clone()).collect()
    }

    pub fn rules_for_service(&self, service: ServiceFamily) -> Vec<RuleMetadata> {
        self.entries
            .iter()
            .filter(|e| e.metadata.service == service)
            .map(|e| e.metadata.clone())
            .collect()
    }

    pub fn rules_for_framework(&self, framework: ComplianceFramework) -> Vec<RuleMetadata> {
        self.entries
            .iter()
            .filter(|e| e.metadata.frameworks.contains(&framework))
            .map(|e| e.metadata.clone())
            .collect()
    }

    pub fn record_usage(&mut self, rule_id: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.metadata.id == rule_id) {
            entry.usage.invocations += 1;
            entry.usage.last_used = Some(Utc::now());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
