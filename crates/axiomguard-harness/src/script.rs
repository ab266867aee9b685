//! Severity-script runs for the CLI.

use axiomguard_kernel::{KernelConfig, ScriptTrace, Severity, SeverityScript, run_severity_script};

use crate::HarnessError;
use crate::structured_log::{LogEmitter, LogLevel};

/// Parse `"critical,high,low"` (any case, short forms allowed).
pub fn parse_severities(list: &str) -> Result<Vec<Severity>, HarnessError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Severity::from_str_loose(s).ok_or_else(|| HarnessError::BadSeverity(s.to_string())))
        .collect()
}

/// Run the script and write one `trajectory` record per sample.
pub fn run_and_log(
    config: &KernelConfig,
    script: &SeverityScript,
    log: &mut LogEmitter,
) -> Result<ScriptTrace, HarnessError> {
    let trace = run_severity_script(config, script);
    for point in &trace.points {
        let mut entry = log
            .entry(LogLevel::Info, "trajectory")
            .at(point.t_ms)
            .with_stability(point.score, point.status)
            .with_details(serde_json::json!({
                "sampling_probability": point.sampling_probability,
            }));
        if let Some(severity) = point.severity {
            entry = entry.with_severity(severity);
            entry.source = Some(format!("{}:{}", axiomguard_kernel::script::SCRIPT_ORIGIN, script.domain));
        }
        log.emit_entry(entry)?;
    }
    let summary = log
        .entry(LogLevel::Info, "script_end")
        .with_details(serde_json::json!({
            "final_score": trace.final_score(),
            "status_path": trace.status_path(),
            "corrections": trace.corrections,
            "emergency_caps": trace.emergency_caps,
        }));
    log.emit_entry(summary)?;
    log.flush()?;
    Ok(trace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_case_and_short_forms() {
        let parsed = parse_severities("CRITICAL, high,m ,low,").unwrap();
        assert_eq!(
            parsed,
            vec![Severity::Critical, Severity::High, Severity::Medium, Severity::Low]
        );
    }

    #[test]
    fn rejects_unknown_severity() {
        let err = parse_severities("high,catastrophic").unwrap_err();
        assert!(matches!(err, HarnessError::BadSeverity(s) if s == "catastrophic"));
    }

    #[test]
    fn logs_one_record_per_point_plus_summary() {
        let script = SeverityScript::new(vec![Severity::Critical, Severity::Low], 500);
        let mut log = LogEmitter::to_buffer("script-test");
        let trace = run_and_log(&KernelConfig::default(), &script, &mut log).unwrap();
        assert_eq!(log.entries().len(), trace.points.len() + 1);
        let injected = &log.entries()[1];
        assert_eq!(injected.source.as_deref(), Some("SCRIPT:INTEGRITY"));
        assert_eq!(injected.score, Some(85.0));
        assert_eq!(log.entries().last().unwrap().event, "script_end");
    }
}
