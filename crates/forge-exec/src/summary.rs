//! The final grouped summary (§6): banners padded to a fixed 79-column target, operations
//! grouped by terminal status, with detailed sub-banners for the groups worth digging into.

use forge_core::identifier::OperationId;
use forge_core::operation::OperationGraph;
use forge_core::record::{ExecutionRecord, Status};
use std::collections::HashMap;
use std::fmt::Write as _;

const BANNER_WIDTH: usize = 79;

fn banner(label: &str) -> String {
    let decorated = format!(" {label} ");
    if decorated.len() >= BANNER_WIDTH {
        return decorated;
    }
    let filler = BANNER_WIDTH - decorated.len();
    let left = filler / 2;
    let right = filler - left;
    format!("{}{}{}", "=".repeat(left), decorated, "=".repeat(right))
}

pub fn render_summary(
    graph: &OperationGraph,
    records: &HashMap<OperationId, ExecutionRecord>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", banner("SUMMARY"));

    let groups: [(&str, fn(Status) -> bool, bool); 6] = [
        ("Skipped", |s| s == Status::Skipped, false),
        ("From cache", |s| s == Status::FromCache, false),
        ("Success", |s| s == Status::Success, false),
        (
            "Success with warnings",
            |s| s == Status::SuccessWithWarning,
            true,
        ),
        ("Blocked", |s| s == Status::Blocked, false),
        ("Failure", |s| s == Status::Failure, true),
    ];

    for (label, predicate, detailed) in groups {
        let mut members: Vec<&OperationId> = records
            .iter()
            .filter(|(_, record)| predicate(record.status()))
            .map(|(id, _)| id)
            .collect();
        if members.is_empty() {
            continue;
        }
        members.sort();

        let _ = writeln!(out, "{}", banner(label));
        for id in members {
            let record = &records[id];
            if detailed {
                let name = graph.operation(id).map(|op| op.name()).unwrap_or_else(|| id.name().to_string());
                let _ = writeln!(
                    out,
                    "{}",
                    banner(&format!("{name} ({:.3}s)", record.stopwatch().elapsed().as_secs_f64()))
                );
                if let Some(error) = record.error() {
                    if !error.already_reported() {
                        let _ = writeln!(out, "{error}");
                    }
                }
                if !record.output().is_empty() {
                    if !record.output().stdout().is_empty() {
                        let _ = writeln!(out, "stdout:\n{}", record.output().stdout());
                    }
                    if !record.output().stderr().is_empty() {
                        let _ = writeln!(out, "stderr:\n{}", record.output().stderr());
                    }
                }
            } else {
                let _ = writeln!(out, "  {id}");
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_pads_to_the_fixed_width() {
        let line = banner("SUMMARY");
        assert_eq!(line.chars().count(), BANNER_WIDTH);
        assert!(line.contains("SUMMARY"));
    }

    #[test]
    fn banner_does_not_truncate_a_label_longer_than_the_target() {
        let long_label = "x".repeat(100);
        let line = banner(&long_label);
        assert!(line.contains(&long_label));
    }
}
