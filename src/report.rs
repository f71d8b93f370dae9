// src/report.rs

//! Plain-text report at `.tuttle/report.txt`.

use std::fmt::Write as _;
use std::fs;

use anyhow::Context;
use chrono::SecondsFormat;

use crate::errors::Result;
use crate::invalidation::Invalidation;
use crate::state::StateDir;
use crate::workflow::{Execution, Process, ProcessIdx, WorkflowGraph};

/// Render the report: last invalidations, executed processes in completion
/// order, then the whole workflow in topological order.
pub fn render(state: &StateDir, graph: &WorkflowGraph, invalidations: &[Invalidation]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Tuttle report");
    let _ = writeln!(out, "=============");

    section(&mut out, "Invalidated resources");
    if invalidations.is_empty() {
        let _ = writeln!(out, "(none)");
    }
    for entry in invalidations {
        let _ = writeln!(out, "* {} - {}", entry.url, entry.reason);
    }

    section(&mut out, "Executed processes");
    let mut executed: Vec<(ProcessIdx, &Process)> = graph
        .processes()
        .iter()
        .enumerate()
        .filter(|(_, p)| p.execution.is_started())
        .collect();
    executed.sort_by_key(|(idx, p)| (p.execution.end.is_none(), p.execution.end, *idx));
    if executed.is_empty() {
        let _ = writeln!(out, "(none)");
    }
    for (_, process) in executed {
        let _ = writeln!(
            out,
            "* {} [{}] {}",
            process.id,
            status(&process.execution),
            duration(&process.execution)
        );
        if let Some(message) = &process.execution.error_message {
            let _ = writeln!(out, "    error: {message}");
        }
        let _ = writeln!(out, "    stdout: {}", state.stdout_path(&process.id).display());
        let _ = writeln!(out, "    stderr: {}", state.stderr_path(&process.id).display());
    }

    section(&mut out, "Workflow");
    for item in graph.topological_order() {
        let Ok(idx) = item else {
            break;
        };
        let process = graph.process(idx);
        let _ = writeln!(
            out,
            "* {} ({}) - {}",
            process.id,
            process.processor,
            status(&process.execution)
        );
        if let Some(start) = process.execution.start {
            let _ = writeln!(
                out,
                "    started: {}",
                start.to_rfc3339_opts(SecondsFormat::Secs, true)
            );
        }
        for &input in process.inputs.iter() {
            let _ = writeln!(out, "    < {}", graph.resource(input).url);
        }
        for &output in process.outputs.iter() {
            let node = graph.resource(output);
            let mark = if graph.signature(&node.url).is_some() {
                ""
            } else {
                " (not available)"
            };
            let _ = writeln!(out, "    > {}{mark}", node.url);
        }
    }

    out
}

/// Regenerate the report file.
pub fn write_report(state: &StateDir, graph: &WorkflowGraph, invalidations: &[Invalidation]) -> Result<()> {
    state.ensure()?;
    let path = state.report_path();
    fs::write(&path, render(state, graph, invalidations))
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{}", "-".repeat(title.len()));
}

fn status(execution: &Execution) -> &'static str {
    match execution.success {
        Some(true) => "OK",
        Some(false) => "FAILED",
        None if execution.is_started() => "RUNNING",
        None => "NOT RUN",
    }
}

fn duration(execution: &Execution) -> String {
    match execution.duration() {
        Some(d) => format!("{:.1}s", d.as_secs_f64()),
        None => "-".to_string(),
    }
}
