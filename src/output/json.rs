use crate::engine::EngineReport;
use crate::error::Result;

/// Render the report as pretty-printed JSON.
pub fn render(report: &EngineReport) -> Result<String> {
    let json = serde_json::to_string_pretty(report)?;
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BatchStatistics;
    use std::collections::HashMap;

    #[test]
    fn empty_report_renders() {
        let report = EngineReport {
            results: Vec::new(),
            stats: BatchStatistics {
                total_rules: 0,
                executed_rules: 0,
                passed_rules: 0,
                failed_rules: 0,
                skipped_rules: 0,
                total_duration_ms: 0,
                avg_duration_ms: 0.0,
                failures_by_severity: HashMap::new(),
                failures_by_service: HashMap::new(),
            },
        };
        let rendered = render(&report).unwrap();
        assert!(rendered.contains("\"total_rules\": 0"));
    }
}
