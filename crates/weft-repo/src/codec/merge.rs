//! Encode/decode of the `## Provides` and optional `## Gate` sections
//! carried on merge commits that land a task branch onto `flow`.

use std::collections::BTreeSet;

use super::model::{GatePolicy, GateVerdict, MergeRecord};
use super::{extract_field, extract_list, parse_commit_doc, render_commit_doc, section_lines,
    CommitDoc, Section};

pub fn encode_merge_message(task_branch: &str, record: &MergeRecord) -> String {
    let title = format!("Merge {task_branch} into flow");

    let mut sections = vec![Section {
        header: "Provides".to_string(),
        lines: record.provides.iter().map(|p| format!("- {p}")).collect(),
    }];

    if let Some((policy, verdict)) = &record.gate {
        let mut lines = vec![format!("Policy: {policy}")];
        match verdict {
            GateVerdict::Passed => lines.push("Verdict: passed".to_string()),
            GateVerdict::Failed { output } => {
                lines.push("Verdict: failed".to_string());
                if let Some(output) = output {
                    lines.push("Output:".to_string());
                    lines.push("```".to_string());
                    lines.extend(output.lines().map(str::to_string));
                    lines.push("```".to_string());
                }
            }
        }
        sections.push(Section { header: "Gate".to_string(), lines });
    }

    render_commit_doc(&CommitDoc { title, sections })
}

pub fn decode_merge_message(message: &str) -> MergeRecord {
    let doc = parse_commit_doc(message);
    let provides = extract_list(section_lines(&doc, "Provides").unwrap_or(&[]), "");

    let gate = section_lines(&doc, "Gate").map(|lines| {
        let policy = extract_field(lines, "Policy")
            .and_then(|p| p.parse::<GatePolicy>().ok())
            .unwrap_or(GatePolicy::Auto);
        let verdict = match extract_field(lines, "Verdict").as_deref() {
            Some("passed") => GateVerdict::Passed,
            _ => {
                let output = extract_code_fence(lines);
                GateVerdict::Failed { output }
            }
        };
        (policy, verdict)
    });

    MergeRecord { provides, gate }
}

fn extract_code_fence(lines: &[String]) -> Option<String> {
    let start = lines.iter().position(|l| l.trim() == "```")?;
    let end = lines[start + 1..].iter().position(|l| l.trim() == "```")? + start + 1;
    Some(lines[start + 1..end].join("\n"))
}

/// Union of all `## Provides` bullet items across a set of merge commit
/// messages reachable from `flow`; the Provides Frontier precondition tasks
/// gate their string `preconditions` against.
pub fn provides_frontier<'a>(merge_messages: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    let mut frontier = BTreeSet::new();
    for message in merge_messages {
        frontier.extend(decode_merge_message(message).provides);
    }
    frontier
}
