//! Output formatting for run results.
//!
//! Supports two summary formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: structured output for editor hosts, with the diff embedded

use colored::*;
use serde::Serialize;
use std::io::{self, Write};

use crate::plan::EditKind;
use crate::runner::{Failure, FailureKind, RunReport};

// =============================================================================
// JSON Format
// =============================================================================

/// JSON report: the run report plus the tool version.
#[derive(Serialize)]
pub struct JsonReport<'a> {
    pub version: &'static str,
    #[serde(flatten)]
    pub run: &'a RunReport,
}

pub fn to_json(report: &RunReport) -> anyhow::Result<String> {
    let json = JsonReport {
        version: env!("CARGO_PKG_VERSION"),
        run: report,
    };
    Ok(serde_json::to_string_pretty(&json)?)
}

/// Write the JSON report to stdout.
pub fn write_json(report: &RunReport) -> anyhow::Result<()> {
    let json = to_json(report)?;
    emit(&mut io::stdout().lock(), format!("{}\n", json).as_bytes())?;
    Ok(())
}

/// Write the concatenated diff to stdout.
pub fn write_diff(report: &RunReport) -> io::Result<()> {
    emit(&mut io::stdout().lock(), report.diff.as_bytes())
}

/// Treat a closed reader (`codedocgen | head`) as success.
pub fn ignore_broken_pipe(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

fn emit(out: &mut dyn Write, bytes: &[u8]) -> io::Result<()> {
    ignore_broken_pipe(out.write_all(bytes).and_then(|()| out.flush()))
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write a human-readable summary.
pub fn write_pretty(report: &RunReport, out: &mut dyn Write) -> io::Result<()> {
    // Header
    writeln!(out)?;
    writeln!(
        out,
        "  {} v{}",
        "codedocgen".cyan().bold(),
        env!("CARGO_PKG_VERSION")
    )?;
    writeln!(out)?;

    writeln!(
        out,
        "  {}{} ({} files)",
        "Scope:    ".dimmed(),
        report.scope,
        report.totals.files
    )?;
    writeln!(out, "  {}{}", "Provider: ".dimmed(), report.provider_id)?;
    writeln!(out, "  {}{}", "Mode:     ".dimmed(), report.mode)?;
    writeln!(out)?;

    write_files(report, out)?;
    write_totals(report, out)?;
    writeln!(out)?;

    if let Some(auth) = &report.auth_failure {
        writeln!(
            out,
            "  {} {} ({} unit{} not documented)",
            "AUTH".red().bold(),
            format!("{}: {}", auth.provider_id, auth.reason),
            auth.affected_units,
            plural(auth.affected_units)
        )?;
        writeln!(out)?;
    }

    if !report.failures.is_empty() {
        write_failures(&report.failures, out)?;
        writeln!(out)?;
    }

    write_final_status(report, out)?;
    writeln!(out)
}

fn write_files(report: &RunReport, out: &mut dyn Write) -> io::Result<()> {
    let changed: Vec<_> = report
        .files
        .iter()
        .filter(|f| {
            f.decisions
                .iter()
                .any(|d| d.kind != EditKind::Skip)
        })
        .collect();
    if changed.is_empty() {
        return Ok(());
    }

    writeln!(out, "  {} ({}):", "Files".bold(), changed.len())?;
    writeln!(out)?;
    for file in changed {
        write!(out, "    {}", file.file.blue())?;
        if file.written {
            write!(out, " {}", "(written)".dimmed())?;
        }
        writeln!(out)?;
        for decision in file.decisions.iter().filter(|d| d.kind != EditKind::Skip) {
            let tag = match decision.kind {
                EditKind::Insert => "insert ".green(),
                EditKind::Replace => "replace".yellow(),
                EditKind::Skip => "skip   ".dimmed(),
            };
            writeln!(
                out,
                "      {} {}{}",
                tag,
                decision.name_path,
                format!(":{}", decision.line).dimmed()
            )?;
        }
    }
    writeln!(out)
}

fn write_totals(report: &RunReport, out: &mut dyn Write) -> io::Result<()> {
    let t = &report.totals;
    writeln!(out, "  {}", "Summary:".bold())?;
    writeln!(out, "    {:<18} {}", "units", t.units)?;
    writeln!(
        out,
        "    {:<18} {} ({} insert, {} replace)",
        "edits", t.edits, t.inserts, t.replaces
    )?;
    writeln!(out, "    {:<18} {}", "already documented", t.skips)?;
    writeln!(out, "    {:<18} {}", "synthesized", t.synthesis_calls)?;
    writeln!(out, "    {:<18} {}", "cache hits", t.cache_hits)?;
    if report.mode == "inplace" {
        writeln!(out, "    {:<18} {}", "files written", t.files_written)?;
    }
    if report.pruned > 0 {
        writeln!(out, "    {:<18} {}", "cache pruned", report.pruned)?;
    }
    Ok(())
}

fn write_failures(failures: &[Failure], out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "  {} ({}):", "Failures".bold(), failures.len())?;
    writeln!(out)?;

    for f in failures {
        let tag = match f.kind {
            FailureKind::Io => "IO   ",
            FailureKind::Parse => "PARSE",
            FailureKind::Plan => "PLAN ",
            FailureKind::Synthesis => "SYNTH",
        };
        write!(out, "    {}   {}", tag.red(), f.file.blue())?;
        if let Some(unit) = &f.unit {
            write!(out, "{}", format!(" {}", unit).dimmed())?;
        }
        writeln!(out)?;

        // Message on next line, indented
        writeln!(out, "            {}", f.message)?;
    }
    Ok(())
}

fn write_final_status(report: &RunReport, out: &mut dyn Write) -> io::Result<()> {
    let t = &report.totals;
    let failed = report.failures.len() + report.auth_failure.is_some() as usize;
    if failed == 0 {
        write!(out, "  {}", "✓ DONE".green())?;
    } else {
        write!(out, "  {}", "✗ DONE WITH FAILURES".yellow())?;
    }
    writeln!(
        out,
        "  {}",
        format!(
            "{} file{}, {} edit{}",
            t.files,
            plural(t.files),
            t.edits,
            plural(t.edits)
        )
        .dimmed()
    )
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStats;
    use crate::plan::UnitDecision;
    use crate::runner::{FileReport, Totals};

    fn sample() -> RunReport {
        RunReport {
            scope: "workspace",
            mode: "diff",
            provider_id: "local".to_string(),
            totals: Totals {
                files: 2,
                files_failed: 1,
                units: 1,
                edits: 1,
                inserts: 1,
                synthesis_calls: 1,
                ..Default::default()
            },
            files: vec![FileReport {
                file: "src/sum.js".to_string(),
                ok: true,
                units: 1,
                decisions: vec![UnitDecision {
                    name_path: "sum".to_string(),
                    line: 1,
                    kind: EditKind::Insert,
                    provider_id: "local".to_string(),
                }],
                synthesized: 1,
                ..Default::default()
            }],
            failures: vec![Failure {
                file: "src/broken.py".to_string(),
                unit: None,
                kind: FailureKind::Parse,
                message: "syntax error at line 1, column 8".to_string(),
            }],
            auth_failure: None,
            cache: CacheStats::default(),
            pruned: 0,
            diff: "--- a/src/sum.js\n+++ b/src/sum.js\n".to_string(),
        }
    }

    #[test]
    fn test_json_report_shape() {
        let json: serde_json::Value = serde_json::from_str(&to_json(&sample()).unwrap()).unwrap();
        assert_eq!(json["scope"], "workspace");
        assert_eq!(json["totals"]["inserts"], 1);
        assert_eq!(json["files"][0]["decisions"][0]["kind"], "insert");
        assert_eq!(json["failures"][0]["kind"], "parse");
        assert!(json["failures"][0].get("unit").is_none());
        assert!(json["diff"].as_str().unwrap().starts_with("--- a/src/sum.js"));
        assert!(json.get("auth_failure").is_none());
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn test_closed_stdout_is_not_an_error() {
        assert!(emit(&mut ClosedPipe, b"{}\n").is_ok());
        assert!(ignore_broken_pipe(write_pretty(&sample(), &mut ClosedPipe)).is_ok());

        let other = Err(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(ignore_broken_pipe(other).is_err());
    }

    #[test]
    fn test_pretty_lists_edits_and_failures() {
        colored::control::set_override(false);
        let mut out = Vec::new();
        write_pretty(&sample(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("src/sum.js"));
        assert!(text.contains("insert  sum:1"));
        assert!(text.contains("PARSE   src/broken.py"));
        assert!(text.contains("DONE WITH FAILURES"));
    }
}
