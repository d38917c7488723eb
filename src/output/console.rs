use crate::engine::{EngineReport, Finding};
use crate::model::Severity;

/// Render a report as console output: per-resource summaries, findings
/// grouped by severity (critical first), then run statistics.
pub fn render(report: &EngineReport) -> String {
    let mut output = String::new();

    output.push('\n');
    for aggregation in &report.results {
        output.push_str(&format!("  {}\n", aggregation.summary));
    }

    let mut findings: Vec<&Finding> = report
        .results
        .iter()
        .flat_map(|a| a.findings.iter())
        .collect();

    if findings.is_empty() {
        output.push_str("\n  No compliance findings.\n\n");
    } else {
        findings.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.resource_arn.cmp(&b.resource_arn))
        });

        output.push_str(&format!("\n  {} finding(s):\n\n", findings.len()));
        for finding in &findings {
            let severity_tag = match finding.severity {
                Severity::Critical => "[CRITICAL]",
                Severity::High => "[HIGH]    ",
                Severity::Medium => "[MEDIUM]  ",
                Severity::Low => "[LOW]     ",
                Severity::Info => "[INFO]    ",
            };
            output.push_str(&format!(
                "  {} {} {}\n",
                severity_tag, finding.control_id, finding.title
            ));
            output.push_str(&format!("           on {}\n", finding.resource_arn));
            if !finding.recommendation.is_empty() {
                output.push_str(&format!("           fix: {}\n", finding.recommendation));
            }
            output.push('\n');
        }
    }

    let stats = &report.stats;
    output.push_str(&format!(
        "  Rules: {} total, {} executed, {} passed, {} failed, {} skipped ({} ms)\n\n",
        stats.total_rules,
        stats.executed_rules,
        stats.passed_rules,
        stats.failed_rules,
        stats.skipped_rules,
        stats.total_duration_ms,
    ));

    output
}
